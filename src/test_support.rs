use crate::state::{Clock, IdGenerator};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Mutex as AsyncMutex;

/// Process-wide lock for tests that mutate environment variables.
/// Use `.blocking_lock()` in sync tests and `.lock().await` in async tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Clock that advances one second on every reading.
pub struct StepClock {
    now: Mutex<DateTime<Utc>>,
}

impl StepClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        }
    }
}

impl Clock for StepClock {
    fn now(&self) -> DateTime<Utc> {
        let mut now = self.now.lock().unwrap();
        *now += Duration::seconds(1);
        *now
    }
}

/// Ids `t<n>` counting up from a start value.
pub struct SeqIds(AtomicUsize);

impl SeqIds {
    pub fn starting_at(first: usize) -> Self {
        Self(AtomicUsize::new(first))
    }
}

impl IdGenerator for SeqIds {
    fn next_id(&self) -> String {
        format!("t{}", self.0.fetch_add(1, Ordering::SeqCst))
    }
}
