//! Authority departments and what each one may see.
//!
//! The police, tourism and control-room consoles are one data model viewed
//! through different capabilities, not three models.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{alert::Alert, notification::NotificationEvent};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Department {
  Police,
  Tourism,
  /// The emergency control room; the higher-authority queue escalations go
  /// to.
  Control,
}

impl Department {
  /// Escalated alerts belong to the control room.
  pub fn sees_alert(self, alert: &Alert) -> bool {
    self == Self::Control || !alert.is_escalated()
  }

  /// Whether an authority-class event routed to `event.department` reaches
  /// this department. Unrouted events reach everyone.
  pub fn sees_event(self, event: &NotificationEvent) -> bool {
    self == Self::Control || event.department.is_none_or(|d| d == self)
  }

  pub fn sees_delivery_health(self) -> bool { self == Self::Control }

  /// Only the police may file missing-person reports.
  pub fn may_file_efir(self) -> bool { matches!(self, Self::Police | Self::Control) }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use uuid::Uuid;

  use super::*;
  use crate::{
    alert::{AlertOrigin, Priority, Transition},
    geo::Position,
    notification::{NotificationId, Payload, RecipientClass},
  };

  #[test]
  fn escalated_alerts_are_control_only() {
    let now = Utc::now();
    let mut a = Alert::new(
      Uuid::new_v4(),
      AlertOrigin::Manual,
      Priority::High,
      Position { lat: 0.0, lon: 0.0 },
      now,
    );
    assert!(Department::Tourism.sees_alert(&a));
    a.apply(Transition::escalate("manual"), now).unwrap();
    assert!(!Department::Tourism.sees_alert(&a));
    assert!(!Department::Police.sees_alert(&a));
    assert!(Department::Control.sees_alert(&a));
  }

  #[test]
  fn routed_events_reach_their_department() {
    let person_id = Uuid::new_v4();
    let event = NotificationEvent::new(
      NotificationId::for_person(person_id, "score", 1),
      RecipientClass::Authority,
      Payload::ScoreChanged { person_id, old_score: 80, new_score: 65 },
      Utc::now(),
    )
    .routed_to(Department::Tourism);
    assert!(Department::Tourism.sees_event(&event));
    assert!(!Department::Police.sees_event(&event));
    assert!(Department::Control.sees_event(&event));
  }
}
