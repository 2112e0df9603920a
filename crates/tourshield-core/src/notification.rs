//! Notification events delivered by the fan-out.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::{
  alert::{Alert, AlertState},
  authority::Department,
  person::{EmergencyContact, PersonStatus},
};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecipientClass {
  /// Authority consoles (police, tourism, control room).
  Authority,
  /// The tracked person's own device.
  Person,
  /// The tracked person's emergency contacts.
  Contact,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryState {
  Pending,
  Delivered,
  Failed,
}

/// Deduplication key. Two events with the same id carry the same news;
/// subscribers may discard the second.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(String);

impl NotificationId {
  /// Alert transitions are keyed by alert id plus state version.
  pub fn for_alert(alert_id: Uuid, state_version: u32) -> Self {
    Self(format!("{alert_id}:v{state_version}"))
  }

  /// Person-level events are keyed by a per-person sequence number.
  pub fn for_person(person_id: Uuid, kind: &str, seq: u64) -> Self {
    Self(format!("{person_id}:{kind}:{seq}"))
  }

  pub fn for_failure(of: &NotificationId, class: RecipientClass, subscriber: &str) -> Self {
    Self(format!("{}:failed:{class}:{subscriber}", of.0))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for NotificationId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
  ScoreChanged {
    person_id: Uuid,
    old_score: u8,
    new_score: u8,
  },
  AlertTransition {
    alert_id: Uuid,
    from:     Option<AlertState>,
    to:       AlertState,
    snapshot: Box<Alert>,
  },
  PersonStatusChanged {
    person_id: Uuid,
    from:      PersonStatus,
    to:        PersonStatus,
  },
  /// Delivery-health warning for the authority console.
  DeliveryFailed {
    notification_id: NotificationId,
    recipient_class: RecipientClass,
    subscriber:      String,
    attempts:        u32,
  },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
  pub id:              NotificationId,
  pub recipient_class: RecipientClass,
  /// Person the event concerns; scopes person and contact subscriptions.
  pub person_id:       Option<Uuid>,
  /// Authority department the event is routed to; `None` reaches all.
  pub department:      Option<Department>,
  /// Who a contact-class event is for, in the person's priority order.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub recipients:      Vec<EmergencyContact>,
  pub payload:         Payload,
  pub delivery_state:  DeliveryState,
  pub created_at:      DateTime<Utc>,
}

impl NotificationEvent {
  pub fn new(
    id: NotificationId,
    recipient_class: RecipientClass,
    payload: Payload,
    at: DateTime<Utc>,
  ) -> Self {
    let person_id = match &payload {
      Payload::ScoreChanged { person_id, .. }
      | Payload::PersonStatusChanged { person_id, .. } => Some(*person_id),
      Payload::AlertTransition { snapshot, .. } => Some(snapshot.person_id),
      Payload::DeliveryFailed { .. } => None,
    };
    Self {
      id,
      recipient_class,
      person_id,
      department: None,
      recipients: Vec::new(),
      payload,
      delivery_state: DeliveryState::Pending,
      created_at: at,
    }
  }

  pub fn routed_to(mut self, department: Department) -> Self {
    self.department = Some(department);
    self
  }

  pub fn addressed_to(mut self, recipients: Vec<EmergencyContact>) -> Self {
    self.recipients = recipients;
    self
  }
}
