//! "Alfred": a one-line quick command. `Kim Lee` starts or finishes the
//! break of each named employee; `Kim Lee cancel` clears their records for
//! the day instead.

use serde::Serialize;
use shared::{
    domain::{CalendarDate, EmployeeId},
    error::{BoardError, ErrorReport},
};
use tracing::info;

use crate::board::{BreakBoard, BreakTransition};

pub const DEFAULT_CANCEL_KEYWORD: &str = "cancel";
/// Always honoured alongside the configured keyword.
const KOREAN_CANCEL_KEYWORD: &str = "취소";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlfredCommand {
    pub names: Vec<String>,
    pub cancel: bool,
}

impl AlfredCommand {
    /// `None` for blank input.
    pub fn parse(text: &str, cancel_keyword: &str) -> Option<Self> {
        let mut names: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        let last = names.last()?;
        let cancel = last == cancel_keyword || last == KOREAN_CANCEL_KEYWORD;
        if cancel {
            names.pop();
        }
        Some(Self { names, cancel })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AlfredAction {
    Recorded { transition: BreakTransition },
    Cancelled { removed: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlfredOutcome {
    pub name: String,
    pub employee_id: EmployeeId,
    pub result: Result<AlfredAction, BoardError>,
}

impl AlfredOutcome {
    fn changed(&self) -> bool {
        matches!(
            self.result,
            Ok(AlfredAction::Recorded { .. }) | Ok(AlfredAction::Cancelled { removed: true })
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlfredReport {
    pub outcomes: Vec<AlfredOutcome>,
    pub unresolved: Vec<String>,
}

impl AlfredReport {
    /// Whether any outcome touched board state.
    pub fn changed(&self) -> bool {
        self.outcomes.iter().any(AlfredOutcome::changed)
    }

    pub fn errors(&self) -> impl Iterator<Item = (&str, ErrorReport)> + '_ {
        self.outcomes.iter().filter_map(|outcome| match &outcome.result {
            Err(err) => Some((outcome.name.as_str(), ErrorReport::from(err))),
            Ok(_) => None,
        })
    }
}

/// Applies the command name by name. One name failing does not stop the rest.
pub fn run(board: &mut BreakBoard, command: &AlfredCommand, date: CalendarDate) -> AlfredReport {
    let mut report = AlfredReport::default();

    for name in &command.names {
        let Some(employee_id) = board.employee_by_name(name).map(|e| e.id) else {
            report.unresolved.push(name.clone());
            continue;
        };

        let result = if command.cancel {
            board
                .cancel_break(employee_id, date)
                .map(|removed| AlfredAction::Cancelled { removed })
        } else {
            board
                .record_break(employee_id, date)
                .map(|transition| AlfredAction::Recorded { transition })
        };
        report.outcomes.push(AlfredOutcome {
            name: name.clone(),
            employee_id,
            result,
        });
    }

    if !report.unresolved.is_empty() {
        info!(names = %report.unresolved.join(", "), "alfred: no employee with these names");
    }
    report
}
