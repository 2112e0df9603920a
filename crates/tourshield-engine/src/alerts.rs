//! The live alert book: slots, the open-alert index, and retry deadlines.
//!
//! Lock order is index, then alert slot. Nothing here takes the unit pool;
//! callers that need it take it after the alert slot.

use std::{
  collections::{BTreeMap, HashMap},
  sync::Arc,
};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tourshield_core::{
  Error, Result,
  alert::{Alert, AlertOrigin, Priority},
  geo::Position,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::AlertConfig;

pub type SharedAlert = Arc<Mutex<Alert>>;

/// What became of a trigger.
#[derive(Debug, Clone)]
pub enum TriggerOutcome {
  Created(Alert),
  /// Folded into an existing alert; the snapshot is that alert.
  Merged(Alert),
}

impl TriggerOutcome {
  pub fn alert(&self) -> &Alert {
    match self {
      Self::Created(a) | Self::Merged(a) => a,
    }
  }

  pub fn is_merged(&self) -> bool { matches!(self, Self::Merged(_)) }
}

#[derive(Debug, Default)]
struct PersonAlerts {
  open:         Option<Uuid>,
  last_created: Option<(Uuid, DateTime<Utc>)>,
}

#[derive(Debug)]
pub struct AlertBook {
  config:    AlertConfig,
  alerts:    RwLock<HashMap<Uuid, SharedAlert>>,
  by_person: Mutex<HashMap<Uuid, PersonAlerts>>,
  retries:   Mutex<BTreeMap<Uuid, DateTime<Utc>>>,
}

impl AlertBook {
  pub fn new(config: AlertConfig) -> Self {
    Self {
      config,
      alerts: RwLock::new(HashMap::new()),
      by_person: Mutex::new(HashMap::new()),
      retries: Mutex::new(BTreeMap::new()),
    }
  }

  pub fn config(&self) -> &AlertConfig { &self.config }

  /// Create an alert for `person_id`, or fold the trigger into the open one.
  ///
  /// Auto-threshold triggers inside the cool-down after the person's most
  /// recent alert are folded into that alert even when it is resolved.
  pub fn trigger(
    &self,
    person_id: Uuid,
    origin: AlertOrigin,
    priority: Priority,
    location: Position,
    now: DateTime<Utc>,
  ) -> TriggerOutcome {
    let mut index = self.by_person.lock();
    let entry = index.entry(person_id).or_default();

    if let Some(open_id) = entry.open
      && let Some(slot) = self.slot(open_id)
    {
      let mut alert = slot.lock();
      if alert.is_open() {
        alert.merge_trigger(now);
        info!(alert_id = %open_id, %person_id, %origin, merged = alert.merged_triggers, "trigger merged into open alert");
        return TriggerOutcome::Merged(alert.clone());
      }
    }

    if origin == AlertOrigin::AutoThreshold
      && let Some((last_id, created_at)) = entry.last_created
      && now - created_at < self.config.cooldown()
      && let Some(slot) = self.slot(last_id)
    {
      let mut alert = slot.lock();
      alert.merge_trigger(now);
      debug!(alert_id = %last_id, %person_id, "auto trigger suppressed by cool-down");
      return TriggerOutcome::Merged(alert.clone());
    }

    let alert = Alert::new(person_id, origin, priority, location, now);
    let alert_id = alert.alert_id;
    self.alerts.write().insert(alert_id, Arc::new(Mutex::new(alert.clone())));
    entry.open = Some(alert_id);
    entry.last_created = Some((alert_id, now));
    info!(%alert_id, %person_id, %origin, %priority, "alert created");
    TriggerOutcome::Created(alert)
  }

  pub fn slot(&self, alert_id: Uuid) -> Option<SharedAlert> {
    self.alerts.read().get(&alert_id).cloned()
  }

  pub fn require(&self, alert_id: Uuid) -> Result<SharedAlert> {
    self.slot(alert_id).ok_or(Error::UnknownAlert(alert_id))
  }

  pub fn get(&self, alert_id: Uuid) -> Option<Alert> {
    self.slot(alert_id).map(|s| s.lock().clone())
  }

  pub fn all(&self) -> Vec<Alert> {
    let slots: Vec<_> = self.alerts.read().values().cloned().collect();
    slots.iter().map(|s| s.lock().clone()).collect()
  }

  /// Ids of alerts not yet resolved, oldest first.
  pub fn open_ids(&self) -> Vec<Uuid> {
    let slots: Vec<_> = self.alerts.read().values().cloned().collect();
    let mut open: Vec<_> = slots
      .iter()
      .filter_map(|s| {
        let a = s.lock();
        a.is_open().then_some((a.created_at, a.alert_id))
      })
      .collect();
    open.sort();
    open.into_iter().map(|(_, id)| id).collect()
  }

  pub fn open_alert_for(&self, person_id: Uuid) -> Option<Uuid> {
    let index = self.by_person.lock();
    let open_id = index.get(&person_id)?.open?;
    let slot = self.slot(open_id)?;
    let open = slot.lock().is_open();
    open.then_some(open_id)
  }

  pub fn has_open_alert(&self, person_id: Uuid) -> bool { self.open_alert_for(person_id).is_some() }

  /// Drop the open marker once `alert_id` reached a terminal state.
  pub fn closed(&self, person_id: Uuid, alert_id: Uuid) {
    if let Some(entry) = self.by_person.lock().get_mut(&person_id)
      && entry.open == Some(alert_id)
    {
      entry.open = None;
    }
    self.retries.lock().remove(&alert_id);
  }

  /// Forget a person entirely once they leave the registry.
  pub fn forget_person(&self, person_id: Uuid) { self.by_person.lock().remove(&person_id); }

  // ── Dispatch retries ──────────────────────────────────────────────────

  pub fn schedule_retry(&self, alert_id: Uuid, at: DateTime<Utc>) {
    self.retries.lock().insert(alert_id, at);
  }

  pub fn clear_retry(&self, alert_id: Uuid) { self.retries.lock().remove(&alert_id); }

  pub fn retry_at(&self, alert_id: Uuid) -> Option<DateTime<Utc>> {
    self.retries.lock().get(&alert_id).copied()
  }

  /// Alerts whose retry deadline has passed.
  pub fn due_retries(&self, now: DateTime<Utc>) -> Vec<Uuid> {
    self.retries.lock().iter().filter(|(_, at)| **at <= now).map(|(id, _)| *id).collect()
  }

  // ── Archival ──────────────────────────────────────────────────────────

  /// Remove and return resolved alerts past the archival window.
  pub fn take_archivable(&self, now: DateTime<Utc>) -> Vec<Alert> {
    let cutoff = now - self.config.archive_after();
    let mut alerts = self.alerts.write();
    let due: Vec<Uuid> = alerts
      .iter()
      .filter(|(_, s)| s.lock().resolved_at.is_some_and(|at| at <= cutoff))
      .map(|(id, _)| *id)
      .collect();
    due
      .into_iter()
      .filter_map(|id| alerts.remove(&id))
      .map(|s| s.lock().clone())
      .collect()
  }

  /// Put an alert back after a failed archive write.
  pub fn restore(&self, alert: Alert) {
    self.alerts.write().insert(alert.alert_id, Arc::new(Mutex::new(alert)));
  }
}
