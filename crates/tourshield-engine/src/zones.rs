//! The live zone index.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tourshield_core::{
  Error, Result,
  geo::Position,
  zone::{ZoneMatch, ZoneSet},
};
use tracing::info;

/// Holds the active [`ZoneSet`] behind a pointer that is swapped whole.
///
/// Readers take an `Arc` snapshot and answer the entire lookup from it, so a
/// concurrent [`replace`](Self::replace) is observed either completely or not
/// at all. The read guard covers only the pointer clone; no geometry runs
/// under the lock.
#[derive(Debug)]
pub struct ZoneIndex {
  current: RwLock<Arc<ZoneSet>>,
}

impl ZoneIndex {
  pub fn new(initial: ZoneSet) -> Self { Self { current: RwLock::new(Arc::new(initial)) } }

  pub fn snapshot(&self) -> Arc<ZoneSet> { Arc::clone(&self.current.read()) }

  pub fn version(&self) -> u64 { self.current.read().version }

  pub fn lookup(&self, position: &Position, at: DateTime<Utc>) -> ZoneMatch {
    self.snapshot().lookup(position, at)
  }

  /// Validate `set` and make it live. Returns the new version.
  pub fn replace(&self, set: ZoneSet) -> Result<u64> {
    set.validate()?;
    let mut current = self.current.write();
    if set.version <= current.version {
      return Err(Error::StaleZoneVersion { offered: set.version, active: current.version });
    }
    let (version, zones) = (set.version, set.zones.len());
    *current = Arc::new(set);
    info!(version, zones, "zone set replaced");
    Ok(version)
  }
}

#[cfg(test)]
mod tests {
  use std::thread;

  use tourshield_core::zone::{Region, RiskLevel, Zone};

  use super::*;

  fn circle_set(version: u64, risk: RiskLevel) -> ZoneSet {
    ZoneSet {
      version,
      utc_offset_minutes: 0,
      zones: vec![Zone {
        zone_id:     "falls".into(),
        name:        "Falls".into(),
        region:      Region::Circle {
          center:   Position { lat: 25.3, lon: 91.7 },
          radius_m: 2_000.0,
        },
        risk,
        time_window: None,
      }],
    }
  }

  #[test]
  fn snapshot_survives_replacement() {
    let index = ZoneIndex::new(circle_set(1, RiskLevel::Safe));
    let old = index.snapshot();
    index.replace(circle_set(2, RiskLevel::High)).unwrap();

    let p = Position { lat: 25.3, lon: 91.7 };
    let before = old.lookup(&p, Utc::now());
    assert_eq!((before.version, before.risk), (1, RiskLevel::Safe));
    let after = index.lookup(&p, Utc::now());
    assert_eq!((after.version, after.risk), (2, RiskLevel::High));
  }

  #[test]
  fn stale_version_is_rejected() {
    let index = ZoneIndex::new(circle_set(4, RiskLevel::Safe));
    let err = index.replace(circle_set(4, RiskLevel::High)).unwrap_err();
    assert!(matches!(err, Error::StaleZoneVersion { offered: 4, active: 4 }));
    assert_eq!(index.version(), 4);
  }

  #[test]
  fn readers_never_see_a_mixed_set() {
    let index = Arc::new(ZoneIndex::new(circle_set(1, RiskLevel::Safe)));
    let p = Position { lat: 25.3, lon: 91.7 };

    let readers: Vec<_> = (0..4)
      .map(|_| {
        let index = Arc::clone(&index);
        thread::spawn(move || {
          for _ in 0..500 {
            let m = index.lookup(&p, Utc::now());
            // Odd versions are safe, even versions high.
            let expected = if m.version % 2 == 1 { RiskLevel::Safe } else { RiskLevel::High };
            assert_eq!(m.risk, expected);
          }
        })
      })
      .collect();

    for v in 2..200 {
      let risk = if v % 2 == 1 { RiskLevel::Safe } else { RiskLevel::High };
      index.replace(circle_set(v, risk)).unwrap();
    }
    for r in readers {
      r.join().unwrap();
    }
  }
}
