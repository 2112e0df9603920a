//! The live registry of tracked persons and the location-report path.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tourshield_core::{
  Error, Result,
  geo::{Fix, Position},
  person::{EmergencyContact, PersonStatus, TrackedPerson},
};
use uuid::Uuid;

use crate::{config::IngestConfig, scoring::ScoreState};

/// Everything the engine keeps per person, guarded by one mutex so updates
/// to a person are serialized.
#[derive(Debug)]
pub struct PersonSlot {
  pub person:  TrackedPerson,
  pub scoring: ScoreState,
  event_seq:   u64,
}

impl PersonSlot {
  fn new(person: TrackedPerson) -> Self {
    Self { person, scoring: ScoreState::default(), event_seq: 0 }
  }

  /// Sequence number for the next event about this person.
  pub fn next_seq(&mut self) -> u64 {
    self.event_seq += 1;
    self.event_seq
  }
}

pub type SharedSlot = Arc<Mutex<PersonSlot>>;

#[derive(Debug)]
pub struct LocationIngest {
  config:  IngestConfig,
  persons: RwLock<HashMap<Uuid, SharedSlot>>,
}

impl LocationIngest {
  pub fn new(config: IngestConfig) -> Self {
    Self { config, persons: RwLock::new(HashMap::new()) }
  }

  pub fn config(&self) -> &IngestConfig { &self.config }

  pub fn insert(&self, person: TrackedPerson) -> SharedSlot {
    let slot = Arc::new(Mutex::new(PersonSlot::new(person)));
    let id = slot.lock().person.person_id;
    self.persons.write().insert(id, Arc::clone(&slot));
    slot
  }

  pub fn remove(&self, person_id: Uuid) -> Option<TrackedPerson> {
    let slot = self.persons.write().remove(&person_id)?;
    Some(slot.lock().person.clone())
  }

  pub fn slot(&self, person_id: Uuid) -> Result<SharedSlot> {
    self.persons.read().get(&person_id).cloned().ok_or(Error::UnknownPerson(person_id))
  }

  pub fn get(&self, person_id: Uuid) -> Option<TrackedPerson> {
    let slot = self.persons.read().get(&person_id).cloned()?;
    Some(slot.lock().person.clone())
  }

  /// Emergency contacts of a live person, in registration order.
  pub fn contacts(&self, person_id: Uuid) -> Vec<EmergencyContact> {
    let Some(slot) = self.persons.read().get(&person_id).cloned() else { return Vec::new() };
    let contacts = slot.lock().person.emergency_contacts().to_vec();
    contacts
  }

  /// Every live slot. The registry lock is released before the caller locks
  /// any slot.
  pub fn slots(&self) -> Vec<SharedSlot> { self.persons.read().values().cloned().collect() }

  pub fn persons(&self) -> Vec<TrackedPerson> {
    self.slots().iter().map(|s| s.lock().person.clone()).collect()
  }

  pub fn len(&self) -> usize { self.persons.read().len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  /// Apply a report to a locked slot, returning the status the person had
  /// before it.
  ///
  /// Reports older than the last accepted one by more than the tolerance are
  /// rejected and leave the slot untouched, as are reports dated more than
  /// the tolerance past `now`.
  pub fn accept(
    &self,
    slot: &mut PersonSlot,
    position: Position,
    at: DateTime<Utc>,
    now: DateTime<Utc>,
  ) -> Result<PersonStatus> {
    let person = &mut slot.person;
    if at > now + self.config.tolerance() {
      return Err(Error::FutureReport { person_id: person.person_id, at, now });
    }
    if let Some(last) = person.last_report_at
      && at < last - self.config.tolerance()
    {
      return Err(Error::OutOfOrder { person_id: person.person_id, at, last });
    }

    person.last_fix = Some(Fix { position, at });
    person.last_report_at = Some(person.last_report_at.map_or(at, |last| last.max(at)));
    let previous = person.status;
    person.status = PersonStatus::Active;
    Ok(previous)
  }

  /// Status a person should have at `now` given report recency.
  pub fn status_at(&self, person: &TrackedPerson, now: DateTime<Utc>) -> PersonStatus {
    let silent = now - person.last_seen();
    if silent > self.config.offline_after() {
      PersonStatus::Offline
    } else if silent > self.config.stale_after() {
      PersonStatus::Stale
    } else {
      PersonStatus::Active
    }
  }

  /// Whether the person left long enough ago to drop out of the registry.
  pub fn is_expired(&self, person: &TrackedPerson, now: DateTime<Utc>) -> bool {
    person.profile.departs_at.is_some_and(|d| now - d > self.config.retention())
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};
  use tourshield_core::person::PersonProfile;

  use super::*;

  fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 12, 5, 9, 0, 0).unwrap() }

  fn person() -> TrackedPerson {
    let profile = PersonProfile {
      full_name:          "Asha Rao".into(),
      phone:              "+91-9000000001".into(),
      email:              None,
      nationality:        Some("IN".into()),
      blood_group:        None,
      itinerary:          vec!["Shillong".into()],
      departs_at:         Some(t0() + Duration::days(3)),
      emergency_contacts: vec![],
    };
    TrackedPerson::new(profile, "f".repeat(64), 85, t0())
  }

  fn pos() -> Position { Position { lat: 25.57, lon: 91.88 } }

  #[test]
  fn out_of_order_beyond_tolerance_is_rejected() {
    let ingest = LocationIngest::new(IngestConfig::default());
    let slot = ingest.insert(person());
    let mut s = slot.lock();

    let now = t0() + Duration::seconds(60);
    ingest.accept(&mut s, pos(), now, now).unwrap();
    let fix = s.person.last_fix;

    let err = ingest.accept(&mut s, pos().offset_north(50.0), t0() + Duration::seconds(54), now);
    assert!(matches!(err, Err(Error::OutOfOrder { .. })));
    assert_eq!(s.person.last_fix, fix);
  }

  #[test]
  fn report_dated_past_now_is_rejected() {
    let ingest = LocationIngest::new(IngestConfig::default());
    let slot = ingest.insert(person());
    let mut s = slot.lock();
    let now = t0() + Duration::seconds(60);

    ingest.accept(&mut s, pos(), t0() + Duration::seconds(64), now).unwrap();
    let err = ingest.accept(&mut s, pos(), now + Duration::days(365), now);
    assert!(matches!(err, Err(Error::FutureReport { .. })));
    assert_eq!(s.person.last_report_at, Some(t0() + Duration::seconds(64)));
  }

  #[test]
  fn late_report_within_tolerance_keeps_latest_timestamp() {
    let ingest = LocationIngest::new(IngestConfig::default());
    let slot = ingest.insert(person());
    let mut s = slot.lock();

    let now = t0() + Duration::seconds(60);
    ingest.accept(&mut s, pos(), now, now).unwrap();
    ingest.accept(&mut s, pos(), t0() + Duration::seconds(57), now).unwrap();
    assert_eq!(s.person.last_report_at, Some(t0() + Duration::seconds(60)));
    assert_eq!(s.person.last_fix.unwrap().at, t0() + Duration::seconds(57));
  }

  #[test]
  fn status_follows_recency() {
    let ingest = LocationIngest::new(IngestConfig::default());
    let p = person();
    assert_eq!(ingest.status_at(&p, t0() + Duration::seconds(120)), PersonStatus::Active);
    assert_eq!(ingest.status_at(&p, t0() + Duration::seconds(121)), PersonStatus::Stale);
    assert_eq!(ingest.status_at(&p, t0() + Duration::seconds(601)), PersonStatus::Offline);
  }

  #[test]
  fn accept_reactivates_and_reports_previous_status() {
    let ingest = LocationIngest::new(IngestConfig::default());
    let slot = ingest.insert(person());
    let mut s = slot.lock();
    s.person.status = PersonStatus::Offline;
    let at = t0() + Duration::minutes(30);
    let prev = ingest.accept(&mut s, pos(), at, at).unwrap();
    assert_eq!(prev, PersonStatus::Offline);
    assert_eq!(s.person.status, PersonStatus::Active);
  }

  #[test]
  fn expiry_after_departure_plus_retention() {
    let ingest = LocationIngest::new(IngestConfig::default());
    let p = person();
    assert!(!ingest.is_expired(&p, t0() + Duration::days(4)));
    assert!(ingest.is_expired(&p, t0() + Duration::days(4) + Duration::seconds(1)));
  }

  #[test]
  fn unknown_person() {
    let ingest = LocationIngest::new(IngestConfig::default());
    assert!(matches!(ingest.slot(Uuid::nil()), Err(Error::UnknownPerson(_))));
  }
}
