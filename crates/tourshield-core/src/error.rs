//! Error types for `tourshield-core`.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::alert::AlertState;

#[derive(Debug, Error)]
pub enum Error {
  #[error(
    "location report for {person_id} at {at} is older than last accepted {last}"
  )]
  OutOfOrder {
    person_id: Uuid,
    at:        DateTime<Utc>,
    last:      DateTime<Utc>,
  },

  #[error("location report for {person_id} at {at} is ahead of engine time {now}")]
  FutureReport {
    person_id: Uuid,
    at:        DateTime<Utc>,
    now:       DateTime<Utc>,
  },

  #[error("person not found: {0}")]
  UnknownPerson(Uuid),

  #[error("alert not found: {0}")]
  UnknownAlert(Uuid),

  #[error("responder unit not found: {0}")]
  UnknownUnit(String),

  #[error("illegal alert transition {from} -> {to}")]
  InvalidTransition { from: AlertState, to: AlertState },

  #[error("alert {0} has a corrupt history")]
  CorruptHistory(Uuid),

  #[error("no responder units available")]
  NoUnitsAvailable,

  /// A trigger was merged into an existing alert. Callers see this as a
  /// successful trigger carrying the existing alert id.
  #[error("trigger merged into open alert {0}")]
  DuplicateTrigger(Uuid),

  #[error("delivery of notification {0} failed after retry budget")]
  DeliveryFailed(String),

  #[error("invalid position: lat {lat}, lon {lon}")]
  InvalidPosition { lat: f64, lon: f64 },

  #[error("digital id rejected by verifier")]
  InvalidDigitalId,

  #[error("invalid zone set: {0}")]
  InvalidZone(String),

  #[error("zone set version {offered} is not newer than active version {active}")]
  StaleZoneVersion { offered: u64, active: u64 },

  #[error("person {0} still has an open alert")]
  PersonHasOpenAlert(Uuid),

  #[error("person {0} is reporting normally")]
  PersonNotMissing(Uuid),

  #[error("person {0} has no known location")]
  NoKnownLocation(Uuid),

  #[error("responder unit {0} is dispatched")]
  UnitDispatched(String),

  #[error("responder unit {0} is not dispatched")]
  UnitNotDispatched(String),

  #[error("responder unit {0} already exists")]
  DuplicateUnit(String),

  #[error("archive error: {0}")]
  Archive(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Whether the engine retries this error on its own schedule.
  pub fn is_recoverable(&self) -> bool {
    matches!(self, Self::NoUnitsAvailable | Self::DeliveryFailed(_))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
