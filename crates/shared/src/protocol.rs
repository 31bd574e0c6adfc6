use serde::{Deserialize, Serialize};

use crate::domain::{BreakRecord, CalendarDate, ClockTime, Employee, EmployeeId, Team, Vacation};

/// Everything the board persists, locally and on the remote mirror.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub employees: Vec<Employee>,
    #[serde(default)]
    pub teams: Vec<Team>,
    #[serde(default)]
    pub vacations: Vec<Vacation>,
    #[serde(default)]
    pub break_records: Vec<BreakRecord>,
    /// Epoch millis of the save that produced this snapshot.
    #[serde(default)]
    pub last_updated: i64,
}

impl Snapshot {
    pub fn is_newer_than(&self, other_last_updated: i64) -> bool {
        self.last_updated > other_last_updated
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EmployeeStatus {
    Available,
    OnBreak {
        since: ClockTime,
    },
    BreakDone {
        down: ClockTime,
        up: ClockTime,
        minutes: i64,
    },
    OnVacation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub employee_id: EmployeeId,
    pub name: String,
    pub status: EmployeeStatus,
    pub on_vacation: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRoster {
    pub team: String,
    pub members: Vec<RosterEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    pub date: CalendarDate,
    pub teams: Vec<TeamRoster>,
}

impl Roster {
    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    pub fn team(&self, name: &str) -> Option<&TeamRoster> {
        self.teams.iter().find(|t| t.team == name)
    }
}
