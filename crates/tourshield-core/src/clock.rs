//! Time sources.
//!
//! Every deadline in the engine (staleness, SLA, dispatch retry, ETA decay)
//! is computed from a [`Clock`] reading, so tests drive time explicitly with
//! [`ManualClock`] instead of sleeping.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall clock that never reports an instant earlier than one it already
/// returned.
#[derive(Debug, Default)]
pub struct SystemClock {
  last: Mutex<Option<DateTime<Utc>>>,
}

impl SystemClock {
  pub fn new() -> Self { Self::default() }
}

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    let mut last = self.last.lock();
    let now = match *last {
      Some(prev) if prev > Utc::now() => prev,
      _ => Utc::now(),
    };
    *last = Some(now);
    now
  }
}

/// A clock that only moves when told to. Cloning shares the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
  now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
  pub fn new(start: DateTime<Utc>) -> Self {
    Self { now: Arc::new(Mutex::new(start)) }
  }

  pub fn advance(&self, by: Duration) {
    let mut now = self.now.lock();
    *now += by;
  }

  pub fn advance_secs(&self, secs: i64) { self.advance(Duration::seconds(secs)) }

  pub fn set(&self, to: DateTime<Utc>) { *self.now.lock() = to; }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> { *self.now.lock() }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn manual_clock_is_shared_between_clones() {
    let start = Utc::now();
    let a = ManualClock::new(start);
    let b = a.clone();
    a.advance_secs(90);
    assert_eq!(b.now(), start + Duration::seconds(90));
  }

  #[test]
  fn system_clock_is_non_decreasing() {
    let clock = SystemClock::new();
    let mut prev = clock.now();
    for _ in 0..100 {
      let next = clock.now();
      assert!(next >= prev);
      prev = next;
    }
  }
}
