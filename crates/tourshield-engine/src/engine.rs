//! The engine facade.
//!
//! [`Engine`] owns every live registry and exposes the inbound operations.
//! Each operation validates, applies the entity change under that entity's
//! lock, and queues notifications; none of them waits on delivery. Deadlines
//! (staleness, dispatch retry, SLA, ETA progress, archival) are evaluated by
//! [`Engine::tick`], which [`Engine::spawn_driver`] runs on an interval.

use std::{sync::Arc, time::Duration as StdDuration};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tourshield_core::{
  Error, Result,
  alert::{Alert, AlertOrigin, AlertState, HistoryEntry, Priority, Resolution, Transition},
  authority::Department,
  clock::{Clock, SystemClock},
  geo::Position,
  identity::{FormatVerifier, IdentityVerifier, fingerprint},
  notification::{DeliveryState, NotificationEvent, NotificationId, Payload, RecipientClass},
  person::{PersonStatus, Registration, TrackedPerson},
  store::AlertArchive,
  unit::ResponderUnit,
  zone::ZoneSet,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
  alerts::{AlertBook, TriggerOutcome},
  config::EngineConfig,
  dispatch::{Assignment, DispatchCoordinator, DistanceProvider, StraightLine},
  fanout::{FailedDelivery, Fanout, FanoutWorker, Scope, Subscriber},
  ingest::{LocationIngest, PersonSlot},
  scoring::{ScoreEngine, ScoreUpdate},
  views::{
    AlertFilter, Dashboard, LocationReceipt, MissingPersonReport, PersonSummary, SosRequest,
    StatusCounts, TickReport, TriggerReceipt,
  },
  zones::ZoneIndex,
};

fn archive_err(e: impl std::error::Error) -> Error { Error::Archive(e.to_string()) }

// ─── Builder ─────────────────────────────────────────────────────────────────

pub struct EngineBuilder<A> {
  archive:  Arc<A>,
  config:   EngineConfig,
  clock:    Option<Arc<dyn Clock>>,
  verifier: Option<Arc<dyn IdentityVerifier>>,
  distance: Option<Arc<dyn DistanceProvider>>,
  zones:    Option<ZoneSet>,
}

impl<A: AlertArchive> EngineBuilder<A> {
  pub fn config(mut self, config: EngineConfig) -> Self {
    self.config = config;
    self
  }

  pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = Some(clock);
    self
  }

  pub fn verifier(mut self, verifier: Arc<dyn IdentityVerifier>) -> Self {
    self.verifier = Some(verifier);
    self
  }

  pub fn distance(mut self, distance: Arc<dyn DistanceProvider>) -> Self {
    self.distance = Some(distance);
    self
  }

  /// Initial zone set. Must pass validation; the empty set is used otherwise.
  pub fn zones(mut self, zones: ZoneSet) -> Self {
    self.zones = Some(zones);
    self
  }

  pub fn build(self) -> Result<Engine<A>> {
    let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
    let zones = self.zones.unwrap_or_else(ZoneSet::empty);
    zones.validate()?;
    let (fanout, worker) = Fanout::new(self.config.fanout.clone(), Arc::clone(&clock));

    Ok(Engine {
      zones: ZoneIndex::new(zones),
      ingest: LocationIngest::new(self.config.ingest.clone()),
      scoring: ScoreEngine::new(self.config.scoring.clone()),
      alerts: AlertBook::new(self.config.alerts.clone()),
      dispatch: DispatchCoordinator::new(
        self.config.dispatch.clone(),
        self.distance.unwrap_or_else(|| Arc::new(StraightLine)),
      ),
      verifier: self.verifier.unwrap_or_else(|| Arc::new(FormatVerifier::default())),
      fanout,
      fanout_worker: Mutex::new(Some(worker)),
      archive: self.archive,
      config: self.config,
      clock,
    })
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct Engine<A> {
  config:        EngineConfig,
  clock:         Arc<dyn Clock>,
  verifier:      Arc<dyn IdentityVerifier>,
  zones:         ZoneIndex,
  ingest:        LocationIngest,
  scoring:       ScoreEngine,
  alerts:        AlertBook,
  dispatch:      DispatchCoordinator,
  fanout:        Arc<Fanout>,
  fanout_worker: Mutex<Option<FanoutWorker>>,
  archive:       Arc<A>,
}

impl<A: AlertArchive> Engine<A> {
  pub fn builder(archive: Arc<A>) -> EngineBuilder<A> {
    EngineBuilder {
      archive,
      config: EngineConfig::default(),
      clock: None,
      verifier: None,
      distance: None,
      zones: None,
    }
  }

  pub fn config(&self) -> &EngineConfig { &self.config }

  pub fn now(&self) -> DateTime<Utc> { self.clock.now() }

  pub fn archive(&self) -> &Arc<A> { &self.archive }

  // ── Background work ───────────────────────────────────────────────────

  pub fn subscribe(&self, class: RecipientClass, scope: Scope, subscriber: Arc<dyn Subscriber>) {
    self.fanout.subscribe(class, scope, subscriber);
  }

  /// Start delivering queued notifications. Returns `None` if delivery was
  /// already started.
  pub fn spawn_fanout(&self) -> Option<JoinHandle<()>> {
    let worker = self.fanout_worker.lock().take()?;
    Some(self.fanout.spawn(worker))
  }

  /// Start notification delivery (if not running) and a task calling
  /// [`tick`](Self::tick) every `period`.
  pub fn spawn_driver(self: &Arc<Self>, period: StdDuration) -> JoinHandle<()>
  where
    A: 'static,
  {
    self.spawn_fanout();
    let engine = Arc::clone(self);
    tokio::spawn(async move {
      let mut interval = tokio::time::interval(period);
      interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        interval.tick().await;
        let report = engine.tick().await;
        if !report.is_quiet() {
          info!(?report, "tick");
        }
      }
    })
  }

  // ── Persons ───────────────────────────────────────────────────────────

  pub fn register_person(&self, registration: Registration) -> Result<TrackedPerson> {
    if !self.verifier.verify(&registration.digital_id) {
      warn!(name = %registration.profile.full_name, "digital id rejected");
      return Err(Error::InvalidDigitalId);
    }
    let person = TrackedPerson::new(
      registration.profile,
      fingerprint(&registration.digital_id),
      self.config.scoring.initial_score,
      self.clock.now(),
    );
    self.ingest.insert(person.clone());
    info!(person_id = %person.person_id, score = person.safety_score, "person registered");
    Ok(person)
  }

  /// Live person, falling back to the archive.
  pub async fn get_person(&self, person_id: Uuid) -> Result<TrackedPerson> {
    if let Some(person) = self.ingest.get(person_id) {
      return Ok(person);
    }
    self
      .archive
      .get_person(person_id)
      .await
      .map_err(archive_err)?
      .ok_or(Error::UnknownPerson(person_id))
  }

  pub fn persons(&self) -> Vec<TrackedPerson> { self.ingest.persons() }

  pub async fn deregister_person(&self, person_id: Uuid) -> Result<TrackedPerson> {
    self.ingest.slot(person_id)?;
    if self.alerts.has_open_alert(person_id) {
      return Err(Error::PersonHasOpenAlert(person_id));
    }
    self.retire_person(person_id).await
  }

  async fn retire_person(&self, person_id: Uuid) -> Result<TrackedPerson> {
    let person = self.ingest.remove(person_id).ok_or(Error::UnknownPerson(person_id))?;
    if let Err(e) = self.archive.archive_person(person.clone()).await {
      error!(%person_id, error = %e, "archiving person failed; keeping live");
      self.ingest.insert(person);
      return Err(archive_err(e));
    }
    self.alerts.forget_person(person_id);
    info!(%person_id, "person archived");
    Ok(person)
  }

  // ── Location reports ──────────────────────────────────────────────────

  pub fn report_location(
    &self,
    person_id: Uuid,
    lat: f64,
    lon: f64,
    at: DateTime<Utc>,
  ) -> Result<LocationReceipt> {
    let position = Position::new(lat, lon)?;
    let slot = self.ingest.slot(person_id)?;
    let zones = self.zones.snapshot();
    let mut events = Vec::new();

    let (score, status, zone) = {
      let mut s = slot.lock();
      let previous = self.ingest.accept(&mut s, position, at, self.clock.now())?;
      if previous != PersonStatus::Active {
        info!(%person_id, from = %previous, "person reporting again");
        events.extend(self.status_events(&mut s, previous, PersonStatus::Active, at));
      }

      let zone = zones.lookup(&position, at);
      let current = s.person.safety_score;
      let update =
        self.scoring.recompute(&mut s.scoring, current, zone.clone(), zones.local_hour(at), at);
      s.person.safety_score = update.new;
      if update.changed() {
        events.extend(self.score_events(&mut s, &update, at));
      }
      (s.person.safety_score, s.person.status, zone)
    };

    for event in events {
      self.fanout.publish(event);
    }

    let alert = (self.scoring.is_critical(score) && !self.alerts.has_open_alert(person_id))
      .then(|| {
        self.raise(person_id, AlertOrigin::AutoThreshold, self.scoring.priority_for(score), position)
      });

    Ok(LocationReceipt {
      person_id,
      accepted_at: at,
      safety_score: score,
      status,
      zone,
      alert,
    })
  }

  fn status_events(
    &self,
    slot: &mut PersonSlot,
    from: PersonStatus,
    to: PersonStatus,
    at: DateTime<Utc>,
  ) -> [NotificationEvent; 2] {
    let person_id = slot.person.person_id;
    let id = NotificationId::for_person(person_id, "status", slot.next_seq());
    let payload = Payload::PersonStatusChanged { person_id, from, to };
    [
      NotificationEvent::new(id.clone(), RecipientClass::Authority, payload.clone(), at),
      NotificationEvent::new(id, RecipientClass::Person, payload, at),
    ]
  }

  fn score_events(
    &self,
    slot: &mut PersonSlot,
    update: &ScoreUpdate,
    at: DateTime<Utc>,
  ) -> [NotificationEvent; 2] {
    let person_id = slot.person.person_id;
    let id = NotificationId::for_person(person_id, "score", slot.next_seq());
    let payload =
      Payload::ScoreChanged { person_id, old_score: update.old, new_score: update.new };
    [
      NotificationEvent::new(id.clone(), RecipientClass::Authority, payload.clone(), at)
        .routed_to(Department::Tourism),
      NotificationEvent::new(id, RecipientClass::Person, payload, at),
    ]
  }

  // ── Alerts ────────────────────────────────────────────────────────────

  pub fn trigger_sos(&self, person_id: Uuid, request: SosRequest) -> Result<TriggerReceipt> {
    let person = self.ingest.get(person_id).ok_or(Error::UnknownPerson(person_id))?;
    let location = match (request.lat, request.lon) {
      (Some(lat), Some(lon)) => Position::new(lat, lon)?,
      _ => person.last_fix.map(|f| f.position).ok_or(Error::NoKnownLocation(person_id))?,
    };
    let priority = request.priority.unwrap_or(Priority::High);
    warn!(%person_id, %priority, note = request.note.as_deref(), "sos received");
    Ok(self.raise(person_id, AlertOrigin::Manual, priority, location))
  }

  fn raise(
    &self,
    person_id: Uuid,
    origin: AlertOrigin,
    priority: Priority,
    location: Position,
  ) -> TriggerReceipt {
    let outcome = self.alerts.trigger(person_id, origin, priority, location, self.clock.now());
    let alert_id = outcome.alert().alert_id;
    if let TriggerOutcome::Created(alert) = &outcome {
      if let Some(created) = alert.history.first() {
        self.announce(created, alert);
      }
      self.try_dispatch(alert_id);
    }
    let current = self.alerts.get(alert_id);
    TriggerReceipt::new(current.as_ref().unwrap_or(outcome.alert()), outcome.is_merged())
  }

  /// Assign a unit to a still-triggered alert, scheduling a retry when the
  /// pool is empty.
  fn try_dispatch(&self, alert_id: Uuid) -> Option<Assignment> {
    let slot = self.alerts.slot(alert_id)?;
    let now = self.clock.now();

    let result = {
      let mut alert = slot.lock();
      if !alert.is_open() || alert.stage != AlertState::Triggered {
        self.alerts.clear_retry(alert_id);
        return None;
      }
      self.dispatch.assign(&mut alert, now).and_then(|assignment| {
        let entry = alert.history.last().cloned().ok_or(Error::CorruptHistory(alert_id))?;
        Ok((assignment, entry, alert.clone()))
      })
    };

    match result {
      Ok((assignment, entry, snapshot)) => {
        self.alerts.clear_retry(alert_id);
        self.announce(&entry, &snapshot);
        Some(assignment)
      }
      Err(Error::NoUnitsAvailable) => {
        let retry_at = now + self.alerts.config().dispatch_retry();
        self.alerts.schedule_retry(alert_id, retry_at);
        warn!(%alert_id, %retry_at, "no units available; dispatch retry scheduled");
        None
      }
      Err(e) => {
        error!(%alert_id, error = %e, "dispatch failed");
        None
      }
    }
  }

  /// Apply the transition built by `make` to a live alert, releasing its unit
  /// if the transition ended the assignment.
  fn transition(
    &self,
    alert_id: Uuid,
    make: impl FnOnce(&Alert) -> Transition,
  ) -> Result<Alert> {
    let slot = self.alerts.require(alert_id)?;
    let now = self.clock.now();

    let (entry, snapshot) = {
      let mut alert = slot.lock();
      let unit = alert.assigned_unit_id.clone();
      let transition = make(&alert);
      let entry = alert.apply(transition, now)?.clone();
      if let Some(unit_id) = unit
        && alert.assigned_unit_id.is_none()
      {
        self.dispatch.release(&unit_id, alert_id);
      }
      (entry, alert.clone())
    };

    if snapshot.state.is_terminal() {
      self.alerts.closed(snapshot.person_id, alert_id);
    }
    info!(
      %alert_id,
      from = ?entry.from,
      to = %entry.to,
      actor = entry.actor.as_deref(),
      "alert transition"
    );
    self.announce(&entry, &snapshot);
    Ok(snapshot)
  }

  pub fn cancel_alert(&self, alert_id: Uuid, operator: &str) -> Result<Alert> {
    self.transition(alert_id, |_| Transition::resolve(Resolution::Cancelled).by(operator))
  }

  /// Close an alert. An escalated alert whose unit never arrived is closed
  /// as handed off to the higher-authority queue.
  pub fn confirm_resolved(&self, alert_id: Uuid, operator: &str) -> Result<Alert> {
    self.transition(alert_id, |alert| {
      let resolution = if alert.state == AlertState::Escalated && alert.stage != AlertState::Arrived
      {
        Resolution::HandedOff
      } else {
        Resolution::Confirmed
      };
      Transition::resolve(resolution).by(operator)
    })
  }

  pub fn escalate_alert(&self, alert_id: Uuid, operator: &str) -> Result<Alert> {
    self.transition(alert_id, |_| Transition::escalate("manual escalation").by(operator))
  }

  /// Live alert, falling back to the archive.
  pub async fn get_alert(&self, alert_id: Uuid) -> Result<Alert> {
    if let Some(alert) = self.alerts.get(alert_id) {
      return Ok(alert);
    }
    self
      .archive
      .get_alert(alert_id)
      .await
      .map_err(archive_err)?
      .ok_or(Error::UnknownAlert(alert_id))
  }

  /// Live alerts visible to `department`, newest first.
  pub fn list_alerts(&self, department: Department, filter: &AlertFilter) -> Vec<Alert> {
    let mut alerts: Vec<Alert> = self
      .alerts
      .all()
      .into_iter()
      .filter(|a| department.sees_alert(a) && filter.matches(a))
      .collect();
    alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    alerts
  }

  fn announce(&self, entry: &HistoryEntry, snapshot: &Alert) {
    let id = NotificationId::for_alert(snapshot.alert_id, entry.version);
    let payload = Payload::AlertTransition {
      alert_id: snapshot.alert_id,
      from:     entry.from,
      to:       entry.to,
      snapshot: Box::new(snapshot.clone()),
    };
    let authority =
      NotificationEvent::new(id.clone(), RecipientClass::Authority, payload.clone(), entry.at);
    let authority =
      if snapshot.is_escalated() { authority.routed_to(Department::Control) } else { authority };

    self.fanout.publish(authority);
    self.fanout.publish(NotificationEvent::new(
      id.clone(),
      RecipientClass::Person,
      payload.clone(),
      entry.at,
    ));
    let contacts = self.ingest.contacts(snapshot.person_id);
    if contacts.is_empty() {
      debug!(alert_id = %snapshot.alert_id, "no emergency contacts on file");
      return;
    }
    self.fanout.publish(
      NotificationEvent::new(id, RecipientClass::Contact, payload, entry.at).addressed_to(contacts),
    );
  }

  // ── Zones ─────────────────────────────────────────────────────────────

  /// Make `zones` live. Scores computed against the old set are refreshed on
  /// the next tick.
  pub fn update_zone_set(&self, zones: ZoneSet) -> Result<u64> { self.zones.replace(zones) }

  pub fn zone_set(&self) -> Arc<ZoneSet> { self.zones.snapshot() }

  // ── Units ─────────────────────────────────────────────────────────────

  pub fn add_unit(
    &self,
    unit_id: &str,
    department: Department,
    lat: f64,
    lon: f64,
  ) -> Result<ResponderUnit> {
    let position = Position::new(lat, lon)?;
    self.dispatch.add_unit(ResponderUnit::new(unit_id, department, position, self.clock.now()))
  }

  pub fn units(&self) -> Vec<ResponderUnit> { self.dispatch.units() }

  pub fn report_unit_position(
    &self,
    unit_id: &str,
    lat: f64,
    lon: f64,
    at: DateTime<Utc>,
  ) -> Result<ResponderUnit> {
    let position = Position::new(lat, lon)?;
    self.dispatch.report_position(unit_id, position, at)
  }

  pub fn set_unit_busy(&self, unit_id: &str) -> Result<ResponderUnit> {
    self.dispatch.set_busy(unit_id, true)
  }

  /// Put a unit back on the board; triggered alerts waiting for one pick it
  /// up on their next retry.
  pub fn set_unit_available(&self, unit_id: &str) -> Result<ResponderUnit> {
    self.dispatch.set_busy(unit_id, false)
  }

  /// The unit reports it reached its alert.
  pub fn unit_on_scene(&self, unit_id: &str) -> Result<Alert> {
    let unit = self.dispatch.unit(unit_id)?;
    let alert_id = unit.assigned_alert_id.ok_or_else(|| Error::UnitNotDispatched(unit_id.to_owned()))?;
    self.transition(alert_id, |_| {
      Transition::to(AlertState::Arrived).by(unit_id).with_note("unit on scene")
    })
  }

  // ── Views ─────────────────────────────────────────────────────────────

  pub fn dashboard(&self, department: Department) -> Dashboard {
    let persons = self.ingest.persons();
    let mut counts = StatusCounts::default();
    for p in &persons {
      match p.status {
        PersonStatus::Active => counts.active += 1,
        PersonStatus::Stale => counts.stale += 1,
        PersonStatus::Offline => counts.offline += 1,
      }
    }

    let mut alerts: Vec<Alert> = self
      .alerts
      .all()
      .into_iter()
      .filter(|a| a.is_open() && department.sees_alert(a))
      .collect();
    alerts.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));

    let mut alerts_by_state = std::collections::BTreeMap::new();
    for a in &alerts {
      *alerts_by_state.entry(a.state.to_string()).or_insert(0) += 1;
    }
    let escalated_alerts = alerts.iter().filter(|a| a.is_escalated()).count();

    let low_score = |p: &TrackedPerson| self.scoring.is_critical(p.safety_score);
    let silent = |p: &TrackedPerson| p.status != PersonStatus::Active;
    let mut watchlist: Vec<PersonSummary> = persons
      .iter()
      .filter(|p| match department {
        Department::Police => silent(p),
        Department::Tourism => low_score(p),
        Department::Control => silent(p) || low_score(p),
      })
      .map(PersonSummary::from)
      .collect();
    watchlist.sort_by_key(|p| p.safety_score);

    Dashboard {
      department,
      generated_at: self.clock.now(),
      tracked_persons: persons.len(),
      persons: counts,
      alerts_by_state,
      escalated_alerts,
      alerts,
      watchlist,
      failed_deliveries: department.sees_delivery_health().then(|| self.fanout.failures()),
    }
  }

  pub fn delivery_health(&self) -> Vec<FailedDelivery> { self.fanout.failures() }

  pub fn delivery_state(&self, id: &NotificationId) -> Option<DeliveryState> {
    self.fanout.delivery_state(id)
  }

  /// File an E-FIR for a person who stopped reporting.
  pub async fn missing_person_report(
    &self,
    person_id: Uuid,
    filed_by: &str,
  ) -> Result<MissingPersonReport> {
    let now = self.clock.now();
    let mut person = self.ingest.get(person_id).ok_or(Error::UnknownPerson(person_id))?;
    person.status = self.ingest.status_at(&person, now);
    if person.status == PersonStatus::Active {
      return Err(Error::PersonNotMissing(person_id));
    }

    let mut alerts: Vec<Alert> =
      self.alerts.all().into_iter().filter(|a| a.person_id == person_id).collect();
    alerts.extend(self.archive.alerts_for_person(person_id).await.map_err(archive_err)?);
    alerts.sort_by_key(|a| a.created_at);

    info!(%person_id, filed_by, "missing person report filed");
    Ok(MissingPersonReport::new(person, filed_by, now, alerts))
  }

  // ── Tick ──────────────────────────────────────────────────────────────

  /// Evaluate every deadline against the clock.
  pub async fn tick(&self) -> TickReport {
    let now = self.clock.now();
    let mut report = TickReport::default();

    let expired = self.sweep_persons(now, &mut report);

    for alert_id in self.alerts.due_retries(now) {
      if self.try_dispatch(alert_id).is_some() {
        report.dispatched += 1;
      }
    }

    self.progress_alerts(now, &mut report);
    self.escalate_overdue(now, &mut report);

    for alert in self.alerts.take_archivable(now) {
      let alert_id = alert.alert_id;
      match self.archive.archive_alert(alert.clone()).await {
        Ok(()) => {
          report.archived_alerts += 1;
          info!(%alert_id, "alert archived");
        }
        Err(e) => {
          error!(%alert_id, error = %e, "archiving alert failed; keeping live");
          self.alerts.restore(alert);
        }
      }
    }

    for person_id in expired {
      if self.alerts.has_open_alert(person_id) {
        continue;
      }
      if self.retire_person(person_id).await.is_ok() {
        report.expired_persons += 1;
      }
    }

    report.pruned_deliveries = self.fanout.prune(now);
    report
  }

  /// Update statuses and scores from recency and zone changes. Returns the
  /// persons past their retention window.
  fn sweep_persons(&self, now: DateTime<Utc>, report: &mut TickReport) -> Vec<Uuid> {
    let zones = self.zones.snapshot();
    let mut triggers = Vec::new();
    let mut expired = Vec::new();

    for slot in self.ingest.slots() {
      let mut events = Vec::new();
      {
        let mut s = slot.lock();
        let person_id = s.person.person_id;
        let previous = s.person.status;
        let status = self.ingest.status_at(&s.person, now);
        if status != previous {
          s.person.status = status;
          report.status_changes += 1;
          warn!(%person_id, from = %previous, to = %status, "person signal changed");
          events.extend(self.status_events(&mut s, previous, status, now));
        }

        let current = s.person.safety_score;
        let update = if status == PersonStatus::Offline {
          Some(self.scoring.decay(current))
        } else if s.scoring.zone_version.is_some_and(|v| v != zones.version)
          && let Some(fix) = s.person.last_fix
        {
          debug!(%person_id, version = zones.version, "rescoring against new zone set");
          let zone = zones.lookup(&fix.position, now);
          Some(self.scoring.recompute(&mut s.scoring, current, zone, zones.local_hour(now), now))
        } else {
          None
        };

        if let Some(update) = update.filter(ScoreUpdate::changed) {
          s.person.safety_score = update.new;
          events.extend(self.score_events(&mut s, &update, now));
          let crossed =
            !self.scoring.is_critical(update.old) && self.scoring.is_critical(update.new);
          if crossed && let Some(fix) = s.person.last_fix {
            triggers.push((person_id, update.new, fix.position));
          }
        }

        if self.ingest.is_expired(&s.person, now) {
          expired.push(person_id);
        }
      }
      for event in events {
        self.fanout.publish(event);
      }
    }

    for (person_id, score, position) in triggers {
      if !self.alerts.has_open_alert(person_id) {
        let receipt =
          self.raise(person_id, AlertOrigin::AutoThreshold, self.scoring.priority_for(score), position);
        if !receipt.merged {
          report.auto_alerts += 1;
        }
      }
    }
    expired
  }

  fn progress_alerts(&self, now: DateTime<Utc>, report: &mut TickReport) {
    for alert_id in self.alerts.open_ids() {
      let Some(slot) = self.alerts.slot(alert_id) else { continue };
      let steps = {
        let mut alert = slot.lock();
        match self.dispatch.advance(&mut alert, self.alerts.config(), now) {
          Ok(steps) => steps,
          Err(e) => {
            error!(%alert_id, error = %e, "progress update failed");
            continue;
          }
        }
      };
      for (entry, snapshot) in &steps {
        info!(%alert_id, to = %entry.to, "alert progressed");
        self.announce(entry, snapshot);
      }
      report.transitions += steps.len();
    }
  }

  fn escalate_overdue(&self, now: DateTime<Utc>, report: &mut TickReport) {
    for alert_id in self.alerts.open_ids() {
      let Some(slot) = self.alerts.slot(alert_id) else { continue };
      let escalated = {
        let mut alert = slot.lock();
        let sla = self.alerts.config().sla(alert.priority);
        let overdue = alert.is_open()
          && !alert.is_escalated()
          && alert.stage != AlertState::Arrived
          && now - alert.created_at > sla;
        if !overdue {
          continue;
        }
        let reason = format!("no unit on scene within {} min", sla.num_minutes());
        match alert.apply(Transition::escalate(reason), now) {
          Ok(entry) => (entry.clone(), alert.clone()),
          Err(e) => {
            error!(%alert_id, error = %e, "escalation failed");
            continue;
          }
        }
      };
      let (entry, snapshot) = escalated;
      warn!(%alert_id, priority = %snapshot.priority, stage = %snapshot.stage, "alert escalated to control room");
      self.announce(&entry, &snapshot);
      report.escalated += 1;
    }
  }
}
