//! Injectable wall clock and sleep, so timestamp capture and the polling
//! loop are testable without real waiting.

use std::future::Future;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};

pub trait Clock: Send + Sync {
    /// Local wall-clock time. The portal renders local times with no zone,
    /// so all reconciliation math stays in naive local time.
    fn now(&self) -> NaiveDateTime;

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}
