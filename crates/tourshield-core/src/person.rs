//! Tracked persons, the tourists whose safety the engine monitors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::geo::Fix;

/// Signal health of a tracked person, derived from report recency.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PersonStatus {
  Active,
  Stale,
  Offline,
}

/// Someone to inform when the person is in trouble. Order in the profile is
/// the notification order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
  pub name:     String,
  pub phone:    String,
  #[serde(default)]
  pub relation: Option<String>,
}

/// Descriptive data captured at registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonProfile {
  pub full_name:          String,
  pub phone:              String,
  #[serde(default)]
  pub email:              Option<String>,
  #[serde(default)]
  pub nationality:        Option<String>,
  #[serde(default)]
  pub blood_group:        Option<String>,
  /// Planned destinations, in visiting order.
  #[serde(default)]
  pub itinerary:          Vec<String>,
  /// Planned departure; drives retention expiry.
  #[serde(default)]
  pub departs_at:         Option<DateTime<Utc>>,
  #[serde(default)]
  pub emergency_contacts: Vec<EmergencyContact>,
}

/// Input to registration. The digital ID is checked and fingerprinted, then
/// discarded.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
  pub profile:    PersonProfile,
  pub digital_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedPerson {
  pub person_id:              Uuid,
  pub registered_at:          DateTime<Utc>,
  pub profile:                PersonProfile,
  pub digital_id_fingerprint: String,
  /// Most recently accepted position. `None` until the first report.
  pub last_fix:               Option<Fix>,
  /// Latest accepted report timestamp; never moves backwards.
  pub last_report_at:         Option<DateTime<Utc>>,
  pub safety_score:           u8,
  pub status:                 PersonStatus,
}

impl TrackedPerson {
  pub fn new(
    profile: PersonProfile,
    digital_id_fingerprint: String,
    initial_score: u8,
    at: DateTime<Utc>,
  ) -> Self {
    Self {
      person_id: Uuid::new_v4(),
      registered_at: at,
      profile,
      digital_id_fingerprint,
      last_fix: None,
      last_report_at: None,
      safety_score: initial_score.min(100),
      status: PersonStatus::Active,
    }
  }

  /// The instant recency is measured from.
  pub fn last_seen(&self) -> DateTime<Utc> { self.last_report_at.unwrap_or(self.registered_at) }

  pub fn emergency_contacts(&self) -> &[EmergencyContact] { &self.profile.emergency_contacts }
}
