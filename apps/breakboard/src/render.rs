use std::fmt::Write as _;

use client_core::{AlfredAction, AlfredReport, BreakTransition};
use shared::{
    domain::Employee,
    protocol::{EmployeeStatus, Roster},
};

pub fn status_line(status: &EmployeeStatus) -> String {
    match status {
        EmployeeStatus::Available => "available".to_string(),
        EmployeeStatus::OnBreak { since } => format!("on break since {since}"),
        EmployeeStatus::BreakDone { down, up, minutes } => {
            format!("{down} ~ {up} ({minutes} min)")
        }
        EmployeeStatus::OnVacation => "on vacation".to_string(),
    }
}

pub fn roster_text(roster: &Roster) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", roster.date.display_label());
    if roster.is_empty() {
        out.push_str("No team is working today.\n");
        return out;
    }

    for team in &roster.teams {
        let _ = writeln!(out, "\n[{}]", team.team);
        for member in &team.members {
            let _ = writeln!(
                out,
                "  {:<16} {}",
                member.name,
                status_line(&member.status)
            );
        }
    }
    out
}

pub fn employees_text(employees: &[Employee]) -> String {
    if employees.is_empty() {
        return "No employees registered.\n".to_string();
    }
    let mut out = String::new();
    for employee in employees {
        let off = if employee.off_days.is_empty() {
            "-".to_string()
        } else {
            employee.off_days.to_string()
        };
        let _ = writeln!(
            out,
            "{:>14}  {:<16} {:<12} off: {off}",
            employee.id, employee.name, employee.team
        );
    }
    out
}

pub fn transition_text(name: &str, transition: &BreakTransition) -> String {
    match transition {
        BreakTransition::Started { at } => format!("{name}: break started at {at}"),
        BreakTransition::Finished { down, up, minutes } => {
            format!("{name}: back at {up} ({down} ~ {up}, {minutes} min)")
        }
    }
}

pub fn alfred_text(report: &AlfredReport) -> String {
    let mut out = String::new();
    for outcome in &report.outcomes {
        let line = match &outcome.result {
            Ok(AlfredAction::Recorded { transition }) => transition_text(&outcome.name, transition),
            Ok(AlfredAction::Cancelled { removed: true }) => {
                format!("{}: break record cleared", outcome.name)
            }
            Ok(AlfredAction::Cancelled { removed: false }) => {
                format!("{}: nothing to clear", outcome.name)
            }
            Err(err) => format!("{}: {err}", outcome.name),
        };
        let _ = writeln!(out, "{line}");
    }
    if !report.unresolved.is_empty() {
        let _ = writeln!(out, "not found: {}", report.unresolved.join(", "));
    }
    out
}
