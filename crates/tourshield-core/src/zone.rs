//! Geofenced risk zones.
//!
//! A [`ZoneSet`] is immutable once built; the engine replaces whole sets
//! atomically and tags every lookup with the version it was answered from.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{Error, Result, geo::Position};

/// Zone id reported when no configured zone contains a position.
pub const UNCLASSIFIED_ZONE_ID: &str = "unclassified";

/// Risk classification of a zone. Ordered from least to most dangerous.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RiskLevel {
  Safe,
  Moderate,
  High,
}

/// The geometric extent of a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Region {
  /// Ordered vertices; the ring is closed implicitly.
  Polygon { vertices: Vec<Position> },
  Circle { center: Position, radius_m: f64 },
}

impl Region {
  pub fn contains(&self, p: &Position) -> bool {
    match self {
      Region::Circle { center, radius_m } => center.distance_m(p) <= *radius_m,
      Region::Polygon { vertices } => {
        // Ray casting on (lon, lat); adequate at city scale.
        if vertices.len() < 3 {
          return false;
        }
        let (x, y) = (p.lon, p.lat);
        let mut inside = false;
        let mut j = vertices.len() - 1;
        for i in 0..vertices.len() {
          let (xi, yi) = (vertices[i].lon, vertices[i].lat);
          let (xj, yj) = (vertices[j].lon, vertices[j].lat);
          if ((yi > y) != (yj > y)) && (x < (xj - xi) * (y - yi) / (yj - yi) + xi)
          {
            inside = !inside;
          }
          j = i;
        }
        inside
      }
    }
  }
}

/// Local-hour range during which a zone's classification applies.
/// `start_hour == end_hour` covers the whole day; `start > end` wraps
/// midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
  pub start_hour: u8,
  pub end_hour:   u8,
}

impl TimeWindow {
  pub fn contains_hour(&self, hour: u32) -> bool {
    let (start, end) = (u32::from(self.start_hour), u32::from(self.end_hour));
    match start.cmp(&end) {
      std::cmp::Ordering::Equal => true,
      std::cmp::Ordering::Less => hour >= start && hour < end,
      std::cmp::Ordering::Greater => hour >= start || hour < end,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
  pub zone_id:     String,
  pub name:        String,
  pub region:      Region,
  pub risk:        RiskLevel,
  #[serde(default)]
  pub time_window: Option<TimeWindow>,
}

/// A versioned, immutable collection of zones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneSet {
  pub version:            u64,
  /// Offset of the region's local time from UTC, used for time windows and
  /// night-time scoring.
  #[serde(default)]
  pub utc_offset_minutes: i32,
  pub zones:              Vec<Zone>,
}

/// The answer to a point-in-zone query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneMatch {
  pub zone_id:    String,
  pub name:       String,
  pub risk:       RiskLevel,
  /// Version of the zone set that answered the query.
  pub version:    u64,
  pub classified: bool,
}

impl ZoneSet {
  /// The empty set every engine starts from.
  pub fn empty() -> Self {
    Self { version: 0, utc_offset_minutes: 0, zones: Vec::new() }
  }

  /// Check geometry and ids before the set is allowed to go live.
  pub fn validate(&self) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for zone in &self.zones {
      if zone.zone_id == UNCLASSIFIED_ZONE_ID || !seen.insert(&zone.zone_id) {
        return Err(Error::InvalidZone(format!(
          "duplicate or reserved zone id {:?}",
          zone.zone_id
        )));
      }
      match &zone.region {
        Region::Polygon { vertices } if vertices.len() < 3 => {
          return Err(Error::InvalidZone(format!(
            "zone {:?} polygon needs at least 3 vertices",
            zone.zone_id
          )));
        }
        Region::Circle { radius_m, .. } if !(*radius_m > 0.0) => {
          return Err(Error::InvalidZone(format!(
            "zone {:?} radius must be positive",
            zone.zone_id
          )));
        }
        _ => {}
      }
      if let Some(w) = zone.time_window
        && (w.start_hour > 23 || w.end_hour > 23)
      {
        return Err(Error::InvalidZone(format!(
          "zone {:?} time window hours must be 0-23",
          zone.zone_id
        )));
      }
    }
    Ok(())
  }

  /// Hour of day at `at` in the region's local time.
  pub fn local_hour(&self, at: DateTime<Utc>) -> u32 {
    (at + Duration::minutes(i64::from(self.utc_offset_minutes))).hour()
  }

  /// The highest-risk zone containing `position` whose window covers `at`.
  /// Ties are broken by zone id so results are deterministic.
  pub fn lookup(&self, position: &Position, at: DateTime<Utc>) -> ZoneMatch {
    let hour = self.local_hour(at);
    let best = self
      .zones
      .iter()
      .filter(|z| z.time_window.is_none_or(|w| w.contains_hour(hour)))
      .filter(|z| z.region.contains(position))
      .min_by(|a, b| b.risk.cmp(&a.risk).then_with(|| a.zone_id.cmp(&b.zone_id)));

    match best {
      Some(zone) => ZoneMatch {
        zone_id:    zone.zone_id.clone(),
        name:       zone.name.clone(),
        risk:       zone.risk,
        version:    self.version,
        classified: true,
      },
      None => ZoneMatch {
        zone_id:    UNCLASSIFIED_ZONE_ID.to_owned(),
        name:       "Unclassified".to_owned(),
        risk:       RiskLevel::Moderate,
        version:    self.version,
        classified: false,
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn square(zone_id: &str, risk: RiskLevel, window: Option<TimeWindow>) -> Zone {
    Zone {
      zone_id: zone_id.into(),
      name: zone_id.to_uppercase(),
      region: Region::Polygon {
        vertices: vec![
          Position { lat: 26.0, lon: 93.0 },
          Position { lat: 26.0, lon: 93.2 },
          Position { lat: 26.2, lon: 93.2 },
          Position { lat: 26.2, lon: 93.0 },
        ],
      },
      risk,
      time_window: window,
    }
  }

  fn noon() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 12, 5, 12, 0, 0).unwrap() }

  #[test]
  fn unmatched_position_is_unclassified_moderate() {
    let set = ZoneSet { version: 3, utc_offset_minutes: 0, zones: vec![] };
    let m = set.lookup(&Position { lat: 0.0, lon: 0.0 }, noon());
    assert_eq!(m.zone_id, UNCLASSIFIED_ZONE_ID);
    assert_eq!(m.risk, RiskLevel::Moderate);
    assert_eq!(m.version, 3);
    assert!(!m.classified);
  }

  #[test]
  fn highest_risk_zone_wins() {
    let set = ZoneSet {
      version:            1,
      utc_offset_minutes: 0,
      zones:              vec![
        square("park", RiskLevel::Safe, None),
        square("ravine", RiskLevel::High, None),
        square("market", RiskLevel::Moderate, None),
      ],
    };
    let m = set.lookup(&Position { lat: 26.1, lon: 93.1 }, noon());
    assert_eq!(m.zone_id, "ravine");
    assert_eq!(m.risk, RiskLevel::High);
  }

  #[test]
  fn equal_risk_breaks_tie_by_id() {
    let set = ZoneSet {
      version:            1,
      utc_offset_minutes: 0,
      zones:              vec![
        square("zeta", RiskLevel::High, None),
        square("alpha", RiskLevel::High, None),
      ],
    };
    let m = set.lookup(&Position { lat: 26.1, lon: 93.1 }, noon());
    assert_eq!(m.zone_id, "alpha");
  }

  #[test]
  fn time_window_gates_zone() {
    let night = TimeWindow { start_hour: 20, end_hour: 6 };
    let set = ZoneSet {
      version:            1,
      utc_offset_minutes: 0,
      zones:              vec![square("forest", RiskLevel::High, Some(night))],
    };
    let inside = Position { lat: 26.1, lon: 93.1 };
    assert!(!set.lookup(&inside, noon()).classified);
    let late = Utc.with_ymd_and_hms(2024, 12, 5, 22, 30, 0).unwrap();
    assert_eq!(set.lookup(&inside, late).zone_id, "forest");
  }

  #[test]
  fn utc_offset_shifts_local_hour() {
    // 15:00 UTC is 20:30 at +05:30.
    let set = ZoneSet { version: 1, utc_offset_minutes: 330, zones: vec![] };
    let at = Utc.with_ymd_and_hms(2024, 12, 5, 15, 0, 0).unwrap();
    assert_eq!(set.local_hour(at), 20);
  }

  #[test]
  fn wrapping_window() {
    let w = TimeWindow { start_hour: 22, end_hour: 4 };
    assert!(w.contains_hour(23));
    assert!(w.contains_hour(0));
    assert!(w.contains_hour(3));
    assert!(!w.contains_hour(4));
    assert!(!w.contains_hour(12));
    assert!(TimeWindow { start_hour: 5, end_hour: 5 }.contains_hour(17));
  }

  #[test]
  fn circle_region_uses_metres() {
    let center = Position { lat: 26.5775, lon: 93.1714 };
    let region = Region::Circle { center, radius_m: 500.0 };
    assert!(region.contains(&center.offset_north(400.0)));
    assert!(!region.contains(&center.offset_north(600.0)));
  }

  #[test]
  fn validate_rejects_bad_sets() {
    let mut set = ZoneSet {
      version:            1,
      utc_offset_minutes: 0,
      zones:              vec![square("a", RiskLevel::Safe, None)],
    };
    assert!(set.validate().is_ok());

    set.zones.push(square("a", RiskLevel::High, None));
    assert!(matches!(set.validate(), Err(Error::InvalidZone(_))));

    set.zones.pop();
    set.zones.push(Zone {
      zone_id:     "dot".into(),
      name:        "Dot".into(),
      region:      Region::Circle { center: Position { lat: 0.0, lon: 0.0 }, radius_m: 0.0 },
      risk:        RiskLevel::High,
      time_window: None,
    });
    assert!(matches!(set.validate(), Err(Error::InvalidZone(_))));
  }

  #[test]
  fn risk_level_parses_from_column_text() {
    assert_eq!("high".parse::<RiskLevel>().unwrap(), RiskLevel::High);
    assert_eq!(RiskLevel::Moderate.to_string(), "moderate");
  }
}
