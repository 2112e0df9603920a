//! Request and response shapes for engine operations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tourshield_core::{
  alert::{Alert, AlertState, Priority},
  authority::Department,
  geo::Fix,
  person::{PersonStatus, TrackedPerson},
  zone::ZoneMatch,
};
use uuid::Uuid;

use crate::fanout::FailedDelivery;

/// Extra detail a person may attach to an SOS.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SosRequest {
  /// Where the SOS was raised; the last accepted fix when absent.
  pub lat:      Option<f64>,
  pub lon:      Option<f64>,
  pub priority: Option<Priority>,
  pub note:     Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerReceipt {
  pub alert_id:         Uuid,
  /// `true` when the trigger was folded into an existing alert.
  pub merged:           bool,
  pub state:            AlertState,
  pub assigned_unit_id: Option<String>,
}

impl TriggerReceipt {
  pub fn new(alert: &Alert, merged: bool) -> Self {
    Self {
      alert_id: alert.alert_id,
      merged,
      state: alert.state,
      assigned_unit_id: alert.assigned_unit_id.clone(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationReceipt {
  pub person_id:    Uuid,
  pub accepted_at:  DateTime<Utc>,
  pub safety_score: u8,
  pub status:       PersonStatus,
  pub zone:         ZoneMatch,
  /// Set when this report pushed the score under the critical threshold.
  pub alert:        Option<TriggerReceipt>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AlertFilter {
  pub person_id: Option<Uuid>,
  pub state:     Option<AlertState>,
  pub open_only: bool,
}

impl AlertFilter {
  pub fn matches(&self, alert: &Alert) -> bool {
    self.person_id.is_none_or(|p| p == alert.person_id)
      && self.state.is_none_or(|s| s == alert.state)
      && (!self.open_only || alert.is_open())
  }
}

// ─── Dashboard ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
  pub active:  usize,
  pub stale:   usize,
  pub offline: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonSummary {
  pub person_id:    Uuid,
  pub full_name:    String,
  pub safety_score: u8,
  pub status:       PersonStatus,
  pub last_fix:     Option<Fix>,
}

impl From<&TrackedPerson> for PersonSummary {
  fn from(p: &TrackedPerson) -> Self {
    Self {
      person_id:    p.person_id,
      full_name:    p.profile.full_name.clone(),
      safety_score: p.safety_score,
      status:       p.status,
      last_fix:     p.last_fix,
    }
  }
}

/// One department's view of the live picture.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
  pub department:        Department,
  pub generated_at:      DateTime<Utc>,
  pub tracked_persons:   usize,
  pub persons:           StatusCounts,
  pub alerts_by_state:   BTreeMap<String, usize>,
  pub escalated_alerts:  usize,
  /// Open alerts this department may see, most urgent first.
  pub alerts:            Vec<Alert>,
  /// Persons this department should keep an eye on.
  pub watchlist:         Vec<PersonSummary>,
  /// Control room only.
  pub failed_deliveries: Option<Vec<FailedDelivery>>,
}

// ─── E-FIR ───────────────────────────────────────────────────────────────────

/// Electronic first information report for a person who stopped reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingPersonReport {
  pub report_id: Uuid,
  pub filed_by:  String,
  pub filed_at:  DateTime<Utc>,
  pub last_seen: DateTime<Utc>,
  pub person:    TrackedPerson,
  pub alerts:    Vec<Alert>,
  pub narrative: String,
}

impl MissingPersonReport {
  pub fn new(
    person: TrackedPerson,
    filed_by: impl Into<String>,
    filed_at: DateTime<Utc>,
    alerts: Vec<Alert>,
  ) -> Self {
    let last_seen = person.last_seen();
    let place = match person.last_fix {
      Some(fix) => format!("at {:.5}, {:.5}", fix.position.lat, fix.position.lon),
      None => "with no recorded position".to_owned(),
    };
    let itinerary = if person.profile.itinerary.is_empty() {
      String::new()
    } else {
      format!(" Planned itinerary: {}.", person.profile.itinerary.join(", "))
    };
    let narrative = format!(
      "{} ({}) was last seen {} {}. Safety score {} and signal {} when filed; {} alert(s) on record.{}",
      person.profile.full_name,
      person.profile.phone,
      last_seen.format("%Y-%m-%d %H:%M UTC"),
      place,
      person.safety_score,
      person.status,
      alerts.len(),
      itinerary,
    );
    Self {
      report_id: Uuid::new_v4(),
      filed_by: filed_by.into(),
      filed_at,
      last_seen,
      person,
      alerts,
      narrative,
    }
  }
}

// ─── Tick ────────────────────────────────────────────────────────────────────

/// What one engine tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
  pub status_changes:    usize,
  pub auto_alerts:       usize,
  pub dispatched:        usize,
  pub transitions:       usize,
  pub escalated:         usize,
  pub archived_alerts:   usize,
  pub expired_persons:   usize,
  pub pruned_deliveries: usize,
}

impl TickReport {
  pub fn is_quiet(&self) -> bool { *self == Self::default() }
}
