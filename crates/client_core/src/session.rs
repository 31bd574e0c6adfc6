use std::sync::Arc;

use shared::{
    domain::{CalendarDate, ClockTime, Employee, EmployeeId, MonthDay, RecordId, WeekdaySet},
    error::{BoardError, PersistenceWarning},
    protocol::{Roster, Snapshot},
};
use storage::Storage;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    admin::AdminAccess,
    alfred::{self, AlfredCommand, AlfredReport},
    board::{BreakBoard, BreakTransition},
    clock::Clock,
    remote::RemoteSync,
};

/// Result of a mutation that was applied in memory. `warning` is set when
/// the local save failed afterwards.
#[derive(Debug)]
pub struct Committed<T> {
    pub value: T,
    pub warning: Option<PersistenceWarning>,
}

/// A [`BreakBoard`] bound to its local store and optional remote mirror.
/// Every successful mutation is saved locally before the call returns and
/// pushed to the remote in the background.
pub struct BoardSession {
    board: BreakBoard,
    storage: Storage,
    storage_key: String,
    remote: Arc<dyn RemoteSync>,
    pushes: Vec<JoinHandle<()>>,
}

impl BoardSession {
    /// Loads the local snapshot. A missing or unreadable snapshot yields an
    /// empty board; the remote is not consulted here.
    pub async fn open(
        storage: Storage,
        storage_key: impl Into<String>,
        remote: Arc<dyn RemoteSync>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let storage_key = storage_key.into();
        let snapshot = match storage.load_snapshot(&storage_key).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!(key = %storage_key, "no local snapshot, starting empty");
                Snapshot::default()
            }
            Err(err) => {
                warn!(key = %storage_key, "local snapshot unreadable, starting empty: {err:#}");
                Snapshot::default()
            }
        };

        Self {
            board: BreakBoard::from_snapshot(snapshot, clock),
            storage,
            storage_key,
            remote,
            pushes: Vec::new(),
        }
    }

    pub fn board(&self) -> &BreakBoard {
        &self.board
    }

    pub fn set_viewed_date(&mut self, date: CalendarDate) {
        self.board.set_viewed_date(date);
    }

    /// Roster for the viewed date.
    pub fn roster(&self) -> Roster {
        self.board.compute_roster(self.board.viewed_date())
    }

    /// Runs `f` against the board and saves if it succeeded.
    pub async fn mutate<T, F>(&mut self, f: F) -> Result<Committed<T>, BoardError>
    where
        F: FnOnce(&mut BreakBoard) -> Result<T, BoardError>,
    {
        let value = f(&mut self.board)?;
        let warning = self.save().await;
        Ok(Committed { value, warning })
    }

    /// Persists the current lists locally and starts a remote push.
    pub async fn save(&mut self) -> Option<PersistenceWarning> {
        let snapshot = self.board.stamp();
        let warning = match self
            .storage
            .save_snapshot(&self.storage_key, &snapshot)
            .await
        {
            Ok(()) => None,
            Err(err) => {
                warn!(key = %self.storage_key, "local save failed: {err:#}");
                Some(PersistenceWarning::new(format!("{err:#}")))
            }
        };
        self.push_in_background(snapshot);
        warning
    }

    fn push_in_background(&mut self, snapshot: Snapshot) {
        if !self.remote.is_enabled() {
            return;
        }
        self.pushes.retain(|handle| !handle.is_finished());
        let remote = Arc::clone(&self.remote);
        self.pushes.push(tokio::spawn(async move {
            if let Err(err) = remote.push(&snapshot).await {
                warn!("remote push failed: {err:#}");
            }
        }));
    }

    /// Waits for pushes still in flight. Call before the runtime shuts down.
    pub async fn flush_remote(&mut self) {
        for handle in self.pushes.drain(..) {
            let _ = handle.await;
        }
    }

    /// Starts fetching the remote snapshot without waiting for it. Failures
    /// are logged and resolve to `None`.
    pub fn fetch_remote_in_background(&self) -> JoinHandle<Option<Snapshot>> {
        let remote = Arc::clone(&self.remote);
        tokio::spawn(async move {
            match remote.fetch().await {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!("remote fetch failed, staying on local data: {err:#}");
                    None
                }
            }
        })
    }

    /// Replaces local state with `snapshot` if it is strictly newer. The
    /// adopted snapshot is saved locally but not pushed back.
    pub async fn adopt_remote(&mut self, snapshot: Snapshot) -> Option<PersistenceWarning> {
        if !snapshot.is_newer_than(self.board.last_updated()) {
            debug!(
                remote = snapshot.last_updated,
                local = self.board.last_updated(),
                "remote snapshot is not newer, keeping local"
            );
            return None;
        }

        info!(
            remote = snapshot.last_updated,
            local = self.board.last_updated(),
            "adopting newer remote snapshot"
        );
        self.board.replace_with(snapshot);
        let current = self.board.snapshot();
        match self.storage.save_snapshot(&self.storage_key, &current).await {
            Ok(()) => None,
            Err(err) => {
                warn!(key = %self.storage_key, "saving adopted snapshot failed: {err:#}");
                Some(PersistenceWarning::new(format!("{err:#}")))
            }
        }
    }

    /// Fetches the remote and adopts it when newer. Returns whether local
    /// state changed.
    pub async fn reconcile_remote(&mut self) -> bool {
        if !self.remote.is_enabled() {
            return false;
        }
        let before = self.board.last_updated();
        let fetched = self.fetch_remote_in_background().await.unwrap_or_else(|err| {
            warn!("remote fetch task failed: {err}");
            None
        });
        if let Some(snapshot) = fetched {
            self.adopt_remote(snapshot).await;
        }
        self.board.last_updated() != before
    }

    pub async fn add_employee(
        &mut self,
        name: &str,
        team: &str,
        off_days: WeekdaySet,
    ) -> Result<Committed<EmployeeId>, BoardError> {
        self.mutate(|board| board.add_employee(name, team, off_days)).await
    }

    pub async fn edit_employee(
        &mut self,
        id: EmployeeId,
        name: &str,
        team: &str,
        off_days: WeekdaySet,
    ) -> Result<Committed<()>, BoardError> {
        self.mutate(|board| board.edit_employee(id, name, team, off_days)).await
    }

    pub async fn delete_employee(
        &mut self,
        id: EmployeeId,
    ) -> Result<Committed<Employee>, BoardError> {
        self.mutate(|board| board.delete_employee(id)).await
    }

    pub async fn rename_team(
        &mut self,
        old_name: &str,
        new_name: &str,
    ) -> Result<Committed<usize>, BoardError> {
        self.mutate(|board| board.rename_team(old_name, new_name)).await
    }

    pub async fn toggle_vacation(
        &mut self,
        employee_id: EmployeeId,
        date: MonthDay,
    ) -> Result<Committed<bool>, BoardError> {
        self.mutate(|board| board.toggle_vacation(employee_id, date)).await
    }

    pub async fn record_break(
        &mut self,
        employee_id: EmployeeId,
        date: CalendarDate,
    ) -> Result<Committed<BreakTransition>, BoardError> {
        self.mutate(|board| board.record_break(employee_id, date)).await
    }

    pub async fn cancel_break(
        &mut self,
        employee_id: EmployeeId,
        date: CalendarDate,
    ) -> Result<Committed<bool>, BoardError> {
        self.mutate(|board| board.cancel_break(employee_id, date)).await
    }

    pub async fn admin_upsert_break(
        &mut self,
        access: &AdminAccess,
        employee_id: EmployeeId,
        date: CalendarDate,
        down: Option<ClockTime>,
        up: Option<ClockTime>,
    ) -> Result<Committed<RecordId>, BoardError> {
        self.mutate(|board| board.admin_upsert_break(access, employee_id, date, down, up)).await
    }

    /// Runs an Alfred line against the viewed date. Saves once, and only if
    /// something changed.
    pub async fn run_alfred(
        &mut self,
        text: &str,
        cancel_keyword: &str,
    ) -> Committed<AlfredReport> {
        let Some(command) = AlfredCommand::parse(text, cancel_keyword) else {
            return Committed {
                value: AlfredReport::default(),
                warning: None,
            };
        };
        let date = self.board.viewed_date();
        let report = alfred::run(&mut self.board, &command, date);
        let warning = if report.changed() {
            self.save().await
        } else {
            None
        };
        Committed {
            value: report,
            warning,
        }
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
