//! Responder units: the police, rescue and medical teams alerts are
//! dispatched to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::{authority::Department, geo::Position};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UnitStatus {
  Available,
  /// Serving exactly the alert in `assigned_alert_id`.
  Dispatched,
  /// Off the board for reasons outside the engine (refuelling, off duty).
  Busy,
}

/// A unit serves at most one alert; `assigned_alert_id` is set exactly when
/// `status` is [`UnitStatus::Dispatched`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponderUnit {
  pub unit_id:           String,
  pub department:        Department,
  pub position:          Position,
  pub position_at:       DateTime<Utc>,
  pub status:            UnitStatus,
  pub assigned_alert_id: Option<Uuid>,
}

impl ResponderUnit {
  pub fn new(
    unit_id: impl Into<String>,
    department: Department,
    position: Position,
    at: DateTime<Utc>,
  ) -> Self {
    Self {
      unit_id: unit_id.into(),
      department,
      position,
      position_at: at,
      status: UnitStatus::Available,
      assigned_alert_id: None,
    }
  }

  pub fn is_available(&self) -> bool { self.status == UnitStatus::Available }

  /// `assigned_alert_id` is set exactly when the unit is dispatched.
  pub fn invariant_holds(&self) -> bool {
    (self.status == UnitStatus::Dispatched) == self.assigned_alert_id.is_some()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn new_unit_is_available_and_unassigned() {
    let u = ResponderUnit::new(
      "U1",
      Department::Police,
      Position { lat: 26.1, lon: 91.7 },
      Utc::now(),
    );
    assert!(u.is_available());
    assert!(u.invariant_holds());
  }
}
