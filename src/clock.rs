use chrono::{Local, NaiveDate, NaiveDateTime};
use std::fmt;
use std::sync::Arc;

type NowFn = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Wall-clock source handed to everything that derives values from "now".
#[derive(Clone)]
pub struct Clock {
    now: NowFn,
}

impl Clock {
    pub fn system() -> Self {
        Self::from_fn(|| Local::now().naive_local())
    }

    pub fn fixed(at: NaiveDateTime) -> Self {
        Self::from_fn(move || at)
    }

    pub fn from_fn(now: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        Self { now: Arc::new(now) }
    }

    pub fn now(&self) -> NaiveDateTime {
        (self.now)()
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock").field("now", &self.now()).finish()
    }
}
