use std::sync::Arc;

use serde::Serialize;
use shared::{
    domain::{
        BreakRecord, CalendarDate, ClockTime, Employee, EmployeeId, MonthDay, RecordId, Team,
        Vacation, VacationId, WeekdaySet,
    },
    error::BoardError,
    protocol::{EmployeeStatus, Roster, RosterEntry, Snapshot, TeamRoster},
};

use crate::{admin::AdminAccess, clock::Clock};

/// Roster heading for employees stored without a team.
pub const UNASSIGNED_TEAM: &str = "Unassigned";

/// What a successful `record_break` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BreakTransition {
    Started {
        at: ClockTime,
    },
    Finished {
        down: ClockTime,
        up: ClockTime,
        minutes: i64,
    },
}

/// In-memory owner of employees, teams, vacations and break records, plus
/// the date currently being viewed. Every mutation either applies fully or
/// returns an error without touching state.
pub struct BreakBoard {
    employees: Vec<Employee>,
    teams: Vec<Team>,
    vacations: Vec<Vacation>,
    break_records: Vec<BreakRecord>,
    viewed_date: CalendarDate,
    last_updated: i64,
    last_issued_id: i64,
    clock: Arc<dyn Clock>,
}

impl BreakBoard {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::from_snapshot(Snapshot::default(), clock)
    }

    pub fn from_snapshot(snapshot: Snapshot, clock: Arc<dyn Clock>) -> Self {
        let viewed_date = clock.today();
        let mut board = Self {
            employees: Vec::new(),
            teams: Vec::new(),
            vacations: Vec::new(),
            break_records: Vec::new(),
            viewed_date,
            last_updated: 0,
            last_issued_id: 0,
            clock,
        };
        board.replace_with(snapshot);
        board
    }

    /// Swaps in another snapshot wholesale. The viewed date is kept.
    pub fn replace_with(&mut self, snapshot: Snapshot) {
        let highest_id = snapshot
            .employees
            .iter()
            .map(|e| e.id.0)
            .chain(snapshot.vacations.iter().map(|v| v.id.0))
            .chain(snapshot.break_records.iter().map(|r| r.id.0))
            .max()
            .unwrap_or(0);

        self.employees = snapshot.employees;
        self.teams = snapshot.teams;
        self.vacations = snapshot.vacations;
        self.break_records = snapshot.break_records;
        self.last_updated = snapshot.last_updated;
        self.last_issued_id = self.last_issued_id.max(highest_id);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            employees: self.employees.clone(),
            teams: self.teams.clone(),
            vacations: self.vacations.clone(),
            break_records: self.break_records.clone(),
            last_updated: self.last_updated,
        }
    }

    /// Advances `last_updated` (never backwards) and returns the snapshot to persist.
    /// Saturates at `i64::MAX` for snapshots already stamped there.
    pub fn stamp(&mut self) -> Snapshot {
        self.last_updated = self
            .clock
            .epoch_millis()
            .max(self.last_updated.saturating_add(1));
        self.snapshot()
    }

    pub fn employees(&self) -> &[Employee] {
        &self.employees
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    pub fn vacations(&self) -> &[Vacation] {
        &self.vacations
    }

    pub fn break_records(&self) -> &[BreakRecord] {
        &self.break_records
    }

    pub fn last_updated(&self) -> i64 {
        self.last_updated
    }

    pub fn viewed_date(&self) -> CalendarDate {
        self.viewed_date
    }

    pub fn set_viewed_date(&mut self, date: CalendarDate) {
        self.viewed_date = date;
    }

    pub fn employee(&self, id: EmployeeId) -> Option<&Employee> {
        self.employees.iter().find(|e| e.id == id)
    }

    /// First employee whose name matches exactly.
    pub fn employee_by_name(&self, name: &str) -> Option<&Employee> {
        self.employees.iter().find(|e| e.name == name)
    }

    pub fn break_record(
        &self,
        employee_id: EmployeeId,
        date: CalendarDate,
    ) -> Option<&BreakRecord> {
        self.break_records
            .iter()
            .find(|r| r.employee_id == employee_id && r.date == date)
    }

    pub fn is_on_vacation(&self, employee_id: EmployeeId, date: MonthDay) -> bool {
        self.vacations
            .iter()
            .any(|v| v.employee_id == employee_id && v.date == date)
    }

    pub fn add_employee(
        &mut self,
        name: &str,
        team: &str,
        off_days: WeekdaySet,
    ) -> Result<EmployeeId, BoardError> {
        let (name, team) = require_name_and_team(name, team)?;
        let id = EmployeeId(self.next_id()?);
        self.ensure_team(team);
        self.employees.push(Employee {
            id,
            name: name.to_string(),
            team: team.to_string(),
            off_days,
        });
        Ok(id)
    }

    pub fn edit_employee(
        &mut self,
        id: EmployeeId,
        name: &str,
        team: &str,
        off_days: WeekdaySet,
    ) -> Result<(), BoardError> {
        let (name, team) = require_name_and_team(name, team)?;
        let index = self.employee_index(id)?;
        self.ensure_team(team);
        let employee = &mut self.employees[index];
        employee.name = name.to_string();
        employee.team = team.to_string();
        employee.off_days = off_days;
        Ok(())
    }

    /// Removes the employee only; their break records and vacations stay behind.
    pub fn delete_employee(&mut self, id: EmployeeId) -> Result<Employee, BoardError> {
        let index = self.employee_index(id)?;
        Ok(self.employees.remove(index))
    }

    /// Returns how many employees were moved to the new name.
    pub fn rename_team(&mut self, old_name: &str, new_name: &str) -> Result<usize, BoardError> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(BoardError::validation("team name is required"));
        }
        let index = self
            .teams
            .iter()
            .position(|t| t.name == old_name)
            .ok_or_else(|| BoardError::TeamNotFound(old_name.to_string()))?;
        if new_name != old_name && self.teams.iter().any(|t| t.name == new_name) {
            return Err(BoardError::validation(format!(
                "team '{new_name}' already exists"
            )));
        }

        self.teams[index].name = new_name.to_string();
        let mut moved = 0;
        for employee in self.employees.iter_mut().filter(|e| e.team == old_name) {
            employee.team = new_name.to_string();
            moved += 1;
        }
        Ok(moved)
    }

    /// Returns `true` when the employee is now marked off on `date`.
    pub fn toggle_vacation(
        &mut self,
        employee_id: EmployeeId,
        date: MonthDay,
    ) -> Result<bool, BoardError> {
        self.employee_index(employee_id)?;
        if let Some(index) = self
            .vacations
            .iter()
            .position(|v| v.employee_id == employee_id && v.date == date)
        {
            self.vacations.remove(index);
            return Ok(false);
        }

        let id = VacationId(self.next_id()?);
        self.vacations.push(Vacation {
            id,
            employee_id,
            date,
        });
        Ok(true)
    }

    pub fn record_break(
        &mut self,
        employee_id: EmployeeId,
        date: CalendarDate,
    ) -> Result<BreakTransition, BoardError> {
        self.employee_index(employee_id)?;
        let now = self.clock.time_of_day();

        let Some(index) = self.record_index(employee_id, date) else {
            let id = RecordId(self.next_id()?);
            self.break_records.push(BreakRecord {
                id,
                employee_id,
                date,
                break_down: Some(now),
                break_up: None,
            });
            return Ok(BreakTransition::Started { at: now });
        };

        let record = &mut self.break_records[index];
        match (record.break_down, record.break_up) {
            (_, Some(_)) => Err(BoardError::AlreadyCompleted { employee_id, date }),
            (None, None) => {
                record.break_down = Some(now);
                Ok(BreakTransition::Started { at: now })
            }
            (Some(down), None) => {
                record.break_up = Some(now);
                Ok(BreakTransition::Finished {
                    down,
                    up: now,
                    minutes: down.minutes_until(now),
                })
            }
        }
    }

    /// Returns whether a record was removed.
    pub fn cancel_break(
        &mut self,
        employee_id: EmployeeId,
        date: CalendarDate,
    ) -> Result<bool, BoardError> {
        self.employee_index(employee_id)?;
        match self.record_index(employee_id, date) {
            Some(index) => {
                self.break_records.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Writes both times as given, creating the record if needed.
    pub fn admin_upsert_break(
        &mut self,
        _access: &AdminAccess,
        employee_id: EmployeeId,
        date: CalendarDate,
        down: Option<ClockTime>,
        up: Option<ClockTime>,
    ) -> Result<RecordId, BoardError> {
        self.employee_index(employee_id)?;
        if let Some(index) = self.record_index(employee_id, date) {
            let record = &mut self.break_records[index];
            record.break_down = down;
            record.break_up = up;
            return Ok(record.id);
        }

        let id = RecordId(self.next_id()?);
        self.break_records.push(BreakRecord {
            id,
            employee_id,
            date,
            break_down: down,
            break_up: up,
        });
        Ok(id)
    }

    pub fn status_of(&self, employee_id: EmployeeId, date: CalendarDate) -> EmployeeStatus {
        if self.is_on_vacation(employee_id, date.month_day()) {
            return EmployeeStatus::OnVacation;
        }
        let Some(record) = self.break_record(employee_id, date) else {
            return EmployeeStatus::Available;
        };
        match (record.break_down, record.break_up) {
            (Some(since), None) => EmployeeStatus::OnBreak { since },
            (Some(down), Some(up)) => EmployeeStatus::BreakDone {
                down,
                up,
                minutes: down.minutes_until(up),
            },
            _ => EmployeeStatus::Available,
        }
    }

    /// Working employees per team for `date`. Teams keep list order, then
    /// teams only referenced by employees in first-seen order. Vacationers
    /// sink to the end of their team; empty teams are left out.
    pub fn compute_roster(&self, date: CalendarDate) -> Roster {
        let mut groups: Vec<(&str, Vec<&Employee>)> = self
            .teams
            .iter()
            .map(|t| (t.name.as_str(), Vec::new()))
            .collect();

        for employee in self.employees.iter().filter(|e| !e.is_off_on(date)) {
            let team = match employee.team.trim() {
                "" => UNASSIGNED_TEAM,
                _ => employee.team.as_str(),
            };
            match groups.iter_mut().find(|(name, _)| *name == team) {
                Some((_, members)) => members.push(employee),
                None => groups.push((team, vec![employee])),
            }
        }

        let teams = groups
            .into_iter()
            .filter(|(_, members)| !members.is_empty())
            .map(|(team, members)| {
                let (mut working, away): (Vec<_>, Vec<_>) = members
                    .into_iter()
                    .map(|employee| self.roster_entry(employee, date))
                    .partition(|entry| !entry.on_vacation);
                working.extend(away);
                TeamRoster {
                    team: team.to_string(),
                    members: working,
                }
            })
            .collect();

        Roster { date, teams }
    }

    fn roster_entry(&self, employee: &Employee, date: CalendarDate) -> RosterEntry {
        let status = self.status_of(employee.id, date);
        RosterEntry {
            employee_id: employee.id,
            name: employee.name.clone(),
            on_vacation: status == EmployeeStatus::OnVacation,
            status,
        }
    }

    fn ensure_team(&mut self, name: &str) {
        if !self.teams.iter().any(|t| t.name == name) {
            self.teams.push(Team::named(name));
        }
    }

    fn employee_index(&self, id: EmployeeId) -> Result<usize, BoardError> {
        self.employees
            .iter()
            .position(|e| e.id == id)
            .ok_or(BoardError::EmployeeNotFound(id))
    }

    fn record_index(&self, employee_id: EmployeeId, date: CalendarDate) -> Option<usize> {
        self.break_records
            .iter()
            .position(|r| r.employee_id == employee_id && r.date == date)
    }

    // Ids share one counter seeded from the clock and never repeat a value
    // already present in any list.
    fn next_id(&mut self) -> Result<i64, BoardError> {
        let following = self
            .last_issued_id
            .checked_add(1)
            .ok_or_else(|| BoardError::validation("no identifiers left to issue"))?;
        let id = self.clock.epoch_millis().max(following);
        self.last_issued_id = id;
        Ok(id)
    }
}

fn require_name_and_team<'a>(
    name: &'a str,
    team: &'a str,
) -> Result<(&'a str, &'a str), BoardError> {
    let name = name.trim();
    let team = team.trim();
    if name.is_empty() || team.is_empty() {
        return Err(BoardError::validation("employee name and team are required"));
    }
    Ok((name, team))
}

#[cfg(test)]
#[path = "tests/board_tests.rs"]
mod tests;
