/// Wall-clock abstraction so the phase scheduler is testable without real
/// sleeps (§9 design notes: "suspension is a first-class scheduler
/// operation").
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today_in_zone(&self, zone: Tz) -> NaiveDate {
        self.now().with_timezone(&zone).date_naive()
    }

    fn local_time_in_zone(&self, zone: Tz) -> NaiveTime {
        self.now().with_timezone(&zone).time()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl SystemClock {
    /// Sleeps until `deadline`, returning immediately if it has already passed.
    pub async fn sleep_until(&self, deadline: DateTime<Utc>) {
        let now = self.now();
        if deadline > now {
            let remaining = (deadline - now).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(remaining).await;
        }
    }
}

/// Deterministic clock for tests: advances only when told to.
#[derive(Clone, Default)]
pub struct FakeClock {
    current: Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl FakeClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { current: Arc::new(RwLock::new(Some(start))) }
    }

    pub fn advance(&self, duration: Duration) {
        let mut guard = self.current.write().unwrap();
        let base = guard.unwrap_or_else(Utc::now);
        *guard = Some(base + chrono::Duration::from_std(duration).unwrap_or_default());
    }

    pub fn set(&self, time: DateTime<Utc>) {
        *self.current.write().unwrap() = Some(time);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        self.current.read().unwrap().unwrap_or_else(Utc::now)
    }
}
