//! Emergency alerts and their lifecycle state machine.
//!
//! An [`Alert`] only changes through [`Alert::apply`], which validates the
//! edge against the state graph, appends a [`HistoryEntry`], and updates the
//! derived fields. Because every derived field is a function of the history,
//! [`Alert::replay`] can rebuild an alert from its creation header.
//!
//! ```text
//! Triggered ─► Dispatched ─► EnRoute ─► Approaching ─► Arrived ─► Resolved
//!     │            │            └──────────┴─────────────►┘
//!     └────────────┴──► Escalated (once, from any non-terminal state)
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result, geo::Position};

// ─── Enumerations ────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertState {
  Triggered,
  Dispatched,
  EnRoute,
  Approaching,
  Arrived,
  Escalated,
  Resolved,
}

impl AlertState {
  pub fn is_terminal(self) -> bool { matches!(self, Self::Resolved) }

  /// Position along the response path; `None` for the orthogonal and
  /// terminal states.
  pub fn progress_rank(self) -> Option<u8> {
    match self {
      Self::Triggered => Some(0),
      Self::Dispatched => Some(1),
      Self::EnRoute => Some(2),
      Self::Approaching => Some(3),
      Self::Arrived => Some(4),
      Self::Escalated | Self::Resolved => None,
    }
  }
}

/// Forward edges along the response path.
fn progress_edge(from: AlertState, to: AlertState) -> bool {
  use AlertState::*;
  matches!(
    (from, to),
    (Triggered, Dispatched)
      | (Dispatched, EnRoute)
      | (Dispatched, Arrived)
      | (EnRoute, Approaching)
      | (EnRoute, Arrived)
      | (Approaching, Arrived)
  )
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertOrigin {
  /// SOS raised by the person.
  Manual,
  /// Raised by the scoring engine crossing the critical threshold.
  AutoThreshold,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Priority {
  Low,
  Medium,
  High,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Resolution {
  /// An operator confirmed the incident is over.
  Confirmed,
  /// An operator called the alert off.
  Cancelled,
  /// Closed by the higher-authority queue after escalation.
  HandedOff,
}

// ─── Transitions and history ─────────────────────────────────────────────────

/// A requested state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
  pub to:         AlertState,
  pub actor:      Option<String>,
  /// Required when moving to `Dispatched`.
  pub unit_id:    Option<String>,
  /// Required when moving to `Resolved`.
  pub resolution: Option<Resolution>,
  pub note:       Option<String>,
}

impl Transition {
  pub fn to(state: AlertState) -> Self {
    Self { to: state, actor: None, unit_id: None, resolution: None, note: None }
  }

  pub fn dispatch(unit_id: impl Into<String>) -> Self {
    Self { unit_id: Some(unit_id.into()), ..Self::to(AlertState::Dispatched) }
  }

  pub fn escalate(reason: impl Into<String>) -> Self {
    Self { note: Some(reason.into()), ..Self::to(AlertState::Escalated) }
  }

  pub fn resolve(resolution: Resolution) -> Self {
    Self { resolution: Some(resolution), ..Self::to(AlertState::Resolved) }
  }

  pub fn by(mut self, actor: impl Into<String>) -> Self {
    self.actor = Some(actor.into());
    self
  }

  pub fn with_note(mut self, note: impl Into<String>) -> Self {
    self.note = Some(note.into());
    self
  }
}

/// One line of an alert's append-only log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
  /// 1-based; equals the alert's state version after this entry.
  pub version:    u32,
  /// `None` only for the creation entry.
  pub from:       Option<AlertState>,
  pub to:         AlertState,
  pub at:         DateTime<Utc>,
  pub actor:      Option<String>,
  pub unit_id:    Option<String>,
  pub resolution: Option<Resolution>,
  pub note:       Option<String>,
}

impl From<&HistoryEntry> for Transition {
  fn from(e: &HistoryEntry) -> Self {
    Self {
      to:         e.to,
      actor:      e.actor.clone(),
      unit_id:    e.unit_id.clone(),
      resolution: e.resolution,
      note:       e.note.clone(),
    }
  }
}

// ─── ETA tracking ────────────────────────────────────────────────────────────

/// Travel estimate for the unit assigned to an alert. Decayed by elapsed time
/// on each tick and recomputed from the unit's position at a bounded rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Eta {
  pub seconds:         f64,
  pub initial_seconds: f64,
  /// Instant `seconds` was last decayed to.
  pub updated_at:      DateTime<Utc>,
  /// Instant `seconds` was last recomputed from a true position.
  pub refreshed_at:    DateTime<Utc>,
}

impl Eta {
  pub fn new(seconds: f64, at: DateTime<Utc>) -> Self {
    let seconds = seconds.max(0.0);
    Self { seconds, initial_seconds: seconds, updated_at: at, refreshed_at: at }
  }

  /// Subtract the time elapsed since the last update.
  pub fn decay(&mut self, now: DateTime<Utc>) {
    let elapsed = (now - self.updated_at).num_milliseconds().max(0) as f64 / 1000.0;
    self.seconds = (self.seconds - elapsed).max(0.0);
    self.updated_at = now;
  }

  /// Replace the estimate with one computed from a true position.
  pub fn refresh(&mut self, seconds: f64, now: DateTime<Utc>) {
    self.seconds = seconds.max(0.0);
    self.updated_at = now;
    self.refreshed_at = now;
  }

  /// Remaining share of the initial estimate, in [0, 1].
  pub fn remaining_fraction(&self) -> f64 {
    if self.initial_seconds <= 0.0 {
      0.0
    } else {
      (self.seconds / self.initial_seconds).clamp(0.0, 1.0)
    }
  }
}

// ─── Alert ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
  pub alert_id:          Uuid,
  pub person_id:         Uuid,
  pub origin:            AlertOrigin,
  pub priority:          Priority,
  pub state:             AlertState,
  /// Furthest point reached along the response path. Survives escalation.
  pub stage:             AlertState,
  pub created_at:        DateTime<Utc>,
  /// Where the person was when the alert was raised.
  pub location:          Position,
  pub assigned_unit_id:  Option<String>,
  pub eta:               Option<Eta>,
  pub escalated_at:      Option<DateTime<Utc>>,
  pub resolution:        Option<Resolution>,
  pub resolved_at:       Option<DateTime<Utc>>,
  /// Triggers folded into this alert by deduplication.
  pub merged_triggers:   u32,
  pub last_triggered_at: DateTime<Utc>,
  pub history:           Vec<HistoryEntry>,
}

impl Alert {
  pub fn new(
    person_id: Uuid,
    origin: AlertOrigin,
    priority: Priority,
    location: Position,
    at: DateTime<Utc>,
  ) -> Self {
    Self {
      alert_id: Uuid::new_v4(),
      person_id,
      origin,
      priority,
      state: AlertState::Triggered,
      stage: AlertState::Triggered,
      created_at: at,
      location,
      assigned_unit_id: None,
      eta: None,
      escalated_at: None,
      resolution: None,
      resolved_at: None,
      merged_triggers: 0,
      last_triggered_at: at,
      history: vec![HistoryEntry {
        version:    1,
        from:       None,
        to:         AlertState::Triggered,
        at,
        actor:      None,
        unit_id:    None,
        resolution: None,
        note:       Some(origin.to_string()),
      }],
    }
  }

  /// Number of history entries; together with the alert id this is the
  /// notification deduplication key.
  pub fn state_version(&self) -> u32 { self.history.len() as u32 }

  pub fn is_open(&self) -> bool { !self.state.is_terminal() }

  pub fn is_escalated(&self) -> bool { self.escalated_at.is_some() }

  /// Whether `t` is a legal edge from the current state.
  pub fn permits(&self, t: &Transition) -> bool {
    use AlertState::*;
    if self.state.is_terminal() {
      return false;
    }
    match t.to {
      Escalated => !self.is_escalated(),
      Resolved => match t.resolution {
        Some(Resolution::Cancelled) => true,
        Some(Resolution::Confirmed) => self.stage == Arrived,
        Some(Resolution::HandedOff) => self.state == Escalated,
        None => false,
      },
      Dispatched if t.unit_id.is_none() => false,
      to => {
        let from = if self.state == Escalated { self.stage } else { self.state };
        progress_edge(from, to)
      }
    }
  }

  /// Validate and apply `t` at `at`, returning the appended entry.
  ///
  /// An `at` not after the previous entry is moved one microsecond past it so
  /// the history stays strictly increasing. Illegal edges fail with
  /// [`Error::InvalidTransition`] and leave the alert untouched.
  pub fn apply(&mut self, t: Transition, at: DateTime<Utc>) -> Result<&HistoryEntry> {
    if !self.permits(&t) {
      return Err(Error::InvalidTransition { from: self.state, to: t.to });
    }

    let at = match self.history.last() {
      Some(prev) if at <= prev.at => prev.at + Duration::microseconds(1),
      _ => at,
    };

    match t.to {
      AlertState::Dispatched => {
        self.assigned_unit_id = t.unit_id.clone();
        self.stage = AlertState::Dispatched;
      }
      AlertState::EnRoute | AlertState::Approaching => self.stage = t.to,
      AlertState::Arrived => {
        self.stage = AlertState::Arrived;
        self.assigned_unit_id = None;
        self.eta = None;
      }
      AlertState::Escalated => self.escalated_at = Some(at),
      AlertState::Resolved => {
        self.resolution = t.resolution;
        self.resolved_at = Some(at);
        self.assigned_unit_id = None;
        self.eta = None;
      }
      AlertState::Triggered => {}
    }

    let entry = HistoryEntry {
      version: self.state_version() + 1,
      from: Some(self.state),
      to: t.to,
      at,
      actor: t.actor,
      unit_id: t.unit_id,
      resolution: t.resolution,
      note: t.note,
    };
    self.state = t.to;
    let idx = self.history.len();
    self.history.push(entry);
    Ok(&self.history[idx])
  }

  /// Fold another trigger for the same person into this alert.
  pub fn merge_trigger(&mut self, at: DateTime<Utc>) {
    self.merged_triggers += 1;
    self.last_triggered_at = self.last_triggered_at.max(at);
  }

  /// Rebuild this alert from its creation header by re-applying every
  /// history entry. The live ETA is carried over since it is not a
  /// transition.
  pub fn replay(&self) -> Result<Alert> {
    let Some(created) = self.history.first() else {
      return Err(Error::CorruptHistory(self.alert_id));
    };
    if created.from.is_some() || created.to != AlertState::Triggered {
      return Err(Error::CorruptHistory(self.alert_id));
    }

    let mut rebuilt = Alert {
      alert_id:          self.alert_id,
      person_id:         self.person_id,
      origin:            self.origin,
      priority:          self.priority,
      state:             AlertState::Triggered,
      stage:             AlertState::Triggered,
      created_at:        self.created_at,
      location:          self.location,
      assigned_unit_id:  None,
      eta:               None,
      escalated_at:      None,
      resolution:        None,
      resolved_at:       None,
      merged_triggers:   self.merged_triggers,
      last_triggered_at: self.last_triggered_at,
      history:           vec![created.clone()],
    };

    for entry in &self.history[1..] {
      let applied = rebuilt.apply(Transition::from(entry), entry.at)?;
      if applied.at != entry.at || applied.version != entry.version {
        return Err(Error::CorruptHistory(self.alert_id));
      }
    }
    rebuilt.eta = self.eta.clone();
    Ok(rebuilt)
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
