//! Geographic positions and distances.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// A WGS-84 coordinate pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
  pub lat: f64,
  pub lon: f64,
}

impl Position {
  /// Build a position, rejecting non-finite or out-of-range coordinates.
  pub fn new(lat: f64, lon: f64) -> Result<Self> {
    let valid = lat.is_finite()
      && lon.is_finite()
      && (-90.0..=90.0).contains(&lat)
      && (-180.0..=180.0).contains(&lon);
    if !valid {
      return Err(Error::InvalidPosition { lat, lon });
    }
    Ok(Self { lat, lon })
  }

  /// Great-circle distance to `other` in metres.
  pub fn distance_m(&self, other: &Position) -> f64 {
    let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (other.lon - self.lon).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
      + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
  }

  /// The point `metres` due north of `self`. Handy for building fixtures.
  pub fn offset_north(&self, metres: f64) -> Position {
    let dlat = (metres / EARTH_RADIUS_M).to_degrees();
    Position { lat: self.lat + dlat, lon: self.lon }
  }
}

/// A position observed at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fix {
  pub position: Position,
  pub at:       DateTime<Utc>,
}
