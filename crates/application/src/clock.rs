use chrono::{DateTime, Utc};
use domain::time::round_to_millis;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        round_to_millis(Utc::now())
    }
}
