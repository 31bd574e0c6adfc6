use std::sync::Mutex;

use chrono::{Duration, Local, NaiveDateTime, Utc};
use shared::domain::{CalendarDate, ClockTime};

/// Source of "now" for break stamps, ids and snapshot timestamps.
pub trait Clock: Send + Sync {
    /// Local wall-clock time.
    fn now(&self) -> NaiveDateTime;

    fn epoch_millis(&self) -> i64;

    fn today(&self) -> CalendarDate {
        CalendarDate(self.now().date())
    }

    fn time_of_day(&self) -> ClockTime {
        ClockTime::truncate(self.now().time())
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn epoch_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance_minutes(&self, minutes: i64) {
        let mut guard = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *guard += Duration::minutes(minutes);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn epoch_millis(&self) -> i64 {
        self.now().and_utc().timestamp_millis()
    }
}
