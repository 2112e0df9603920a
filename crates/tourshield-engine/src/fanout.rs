//! Notification fan-out.
//!
//! Events are queued by [`Fanout::publish`] and routed by a worker task to
//! every matching subscription. Each (event, recipient class, subscriber)
//! triple is delivered at least once: failures are retried with exponential
//! backoff, and a ledger keeps already-delivered triples from being sent
//! again. A delivery that exhausts its attempts is recorded in the
//! delivery-health list and announced to the control room with a
//! `DeliveryFailed` event.
//!
//! Settled ledger entries are pruned by [`Fanout::prune`] once they are older
//! than the retention window, and only the newest failures are kept.

use std::{
  collections::{HashMap, HashSet, VecDeque},
  sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tourshield_core::{
  authority::Department,
  clock::Clock,
  notification::{DeliveryState, NotificationEvent, NotificationId, Payload, RecipientClass},
};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::FanoutConfig;

// ─── Subscribers ─────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct DeliveryError(pub String);

/// A delivery endpoint: a webhook, a push gateway, a log, a test channel.
#[async_trait]
pub trait Subscriber: Send + Sync {
  /// Stable name; part of the delivery ledger key.
  fn name(&self) -> &str;

  async fn deliver(&self, event: &NotificationEvent) -> Result<(), DeliveryError>;
}

/// Which events of a recipient class a subscription receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
  All,
  /// Events concerning one person.
  Person(Uuid),
  /// Authority events visible to one department.
  Department(Department),
}

impl Scope {
  pub fn matches(&self, event: &NotificationEvent) -> bool {
    match self {
      Scope::All => true,
      Scope::Person(id) => event.person_id == Some(*id),
      Scope::Department(dept) => dept.sees_event(event),
    }
  }
}

struct Subscription {
  class:      RecipientClass,
  scope:      Scope,
  subscriber: Arc<dyn Subscriber>,
}

/// Remembers the most recent notification ids so a subscriber can drop
/// redelivered events. The oldest id is forgotten once `capacity` is reached.
#[derive(Debug)]
pub struct Dedup {
  capacity: usize,
  seen:     Mutex<DedupWindow>,
}

#[derive(Debug, Default)]
struct DedupWindow {
  ids:   HashSet<NotificationId>,
  order: VecDeque<NotificationId>,
}

impl Default for Dedup {
  fn default() -> Self { Self::with_capacity(4_096) }
}

impl Dedup {
  pub fn new() -> Self { Self::default() }

  pub fn with_capacity(capacity: usize) -> Self {
    Self { capacity: capacity.max(1), seen: Mutex::new(DedupWindow::default()) }
  }

  /// `true` the first time `id` is offered, `false` while it is remembered.
  pub fn first_sighting(&self, id: &NotificationId) -> bool {
    let mut window = self.seen.lock();
    if !window.ids.insert(id.clone()) {
      return false;
    }
    window.order.push_back(id.clone());
    while window.order.len() > self.capacity {
      if let Some(old) = window.order.pop_front() {
        window.ids.remove(&old);
      }
    }
    true
  }

  pub fn len(&self) -> usize { self.seen.lock().order.len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

/// Forwards each distinct event into an unbounded channel.
pub struct ChannelSubscriber {
  name:  String,
  tx:    mpsc::UnboundedSender<NotificationEvent>,
  dedup: Dedup,
}

impl ChannelSubscriber {
  pub fn new(name: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<NotificationEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { name: name.into(), tx, dedup: Dedup::new() }, rx)
  }
}

#[async_trait]
impl Subscriber for ChannelSubscriber {
  fn name(&self) -> &str { &self.name }

  async fn deliver(&self, event: &NotificationEvent) -> Result<(), DeliveryError> {
    if !self.dedup.first_sighting(&event.id) {
      return Ok(());
    }
    self.tx.send(event.clone()).map_err(|_| DeliveryError(format!("{} channel closed", self.name)))
  }
}

// ─── Fan-out ─────────────────────────────────────────────────────────────────

/// A delivery that ran out of attempts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedDelivery {
  pub notification_id: NotificationId,
  pub recipient_class: RecipientClass,
  pub subscriber:      String,
  pub attempts:        u32,
  pub last_error:      String,
  pub failed_at:       DateTime<Utc>,
}

type LedgerKey = (NotificationId, RecipientClass, String);

/// Deliveries of one notification, by (recipient class, subscriber).
#[derive(Debug)]
struct LedgerEntry {
  deliveries: HashMap<(RecipientClass, String), DeliveryState>,
  touched_at: DateTime<Utc>,
}

impl LedgerEntry {
  fn settled(&self) -> bool { !self.deliveries.values().any(|s| *s == DeliveryState::Pending) }
}

/// Receiving half of the publish queue; hand it to [`Fanout::spawn`].
pub struct FanoutWorker {
  rx: mpsc::UnboundedReceiver<NotificationEvent>,
}

pub struct Fanout {
  config:        FanoutConfig,
  clock:         Arc<dyn Clock>,
  subscriptions: RwLock<Vec<Subscription>>,
  ledger:        Mutex<HashMap<NotificationId, LedgerEntry>>,
  failures:      Mutex<VecDeque<FailedDelivery>>,
  queue:         mpsc::UnboundedSender<NotificationEvent>,
}

impl Fanout {
  /// Events published before the worker is spawned wait in the queue.
  pub fn new(config: FanoutConfig, clock: Arc<dyn Clock>) -> (Arc<Self>, FanoutWorker) {
    let (queue, rx) = mpsc::unbounded_channel();
    let fanout = Arc::new(Self {
      config,
      clock,
      subscriptions: RwLock::new(Vec::new()),
      ledger: Mutex::new(HashMap::new()),
      failures: Mutex::new(VecDeque::new()),
      queue,
    });
    (fanout, FanoutWorker { rx })
  }

  pub fn subscribe(&self, class: RecipientClass, scope: Scope, subscriber: Arc<dyn Subscriber>) {
    debug!(%class, ?scope, subscriber = subscriber.name(), "subscription added");
    self.subscriptions.write().push(Subscription { class, scope, subscriber });
  }

  /// Queue `event` for delivery. Never waits on subscribers.
  pub fn publish(&self, event: NotificationEvent) {
    if let Err(mpsc::error::SendError(event)) = self.queue.send(event) {
      error!(notification_id = %event.id, class = %event.recipient_class, "fan-out worker gone; event not delivered");
    }
  }

  /// Start routing queued events.
  pub fn spawn(self: &Arc<Self>, worker: FanoutWorker) -> JoinHandle<()> {
    let fanout = Arc::clone(self);
    let mut rx = worker.rx;
    tokio::spawn(async move {
      while let Some(event) = rx.recv().await {
        fanout.route(event);
      }
    })
  }

  fn route(self: &Arc<Self>, event: NotificationEvent) {
    let targets: Vec<Arc<dyn Subscriber>> = self
      .subscriptions
      .read()
      .iter()
      .filter(|s| s.class == event.recipient_class && s.scope.matches(&event))
      .map(|s| Arc::clone(&s.subscriber))
      .collect();

    for subscriber in targets {
      let key = (event.id.clone(), event.recipient_class, subscriber.name().to_owned());
      if !self.claim(&key) {
        debug!(notification_id = %event.id, subscriber = subscriber.name(), "already delivered or in flight");
        continue;
      }
      let fanout = Arc::clone(self);
      let event = event.clone();
      tokio::spawn(async move { fanout.deliver(subscriber, event, key).await });
    }
  }

  /// Mark `key` pending unless it is already pending or delivered.
  fn claim(&self, key: &LedgerKey) -> bool {
    let (id, class, name) = key;
    let now = self.clock.now();
    let mut ledger = self.ledger.lock();
    let entry = ledger
      .entry(id.clone())
      .or_insert_with(|| LedgerEntry { deliveries: HashMap::new(), touched_at: now });
    let slot = (*class, name.clone());
    if matches!(entry.deliveries.get(&slot), Some(DeliveryState::Pending | DeliveryState::Delivered)) {
      return false;
    }
    entry.deliveries.insert(slot, DeliveryState::Pending);
    entry.touched_at = now;
    true
  }

  fn settle(&self, key: LedgerKey, state: DeliveryState) {
    let (id, class, name) = key;
    let now = self.clock.now();
    let mut ledger = self.ledger.lock();
    let entry = ledger
      .entry(id)
      .or_insert_with(|| LedgerEntry { deliveries: HashMap::new(), touched_at: now });
    entry.deliveries.insert((class, name), state);
    entry.touched_at = now;
  }

  async fn deliver(
    self: Arc<Self>,
    subscriber: Arc<dyn Subscriber>,
    event: NotificationEvent,
    key: LedgerKey,
  ) {
    let max_attempts = self.config.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
      match subscriber.deliver(&event).await {
        Ok(()) => {
          self.settle(key, DeliveryState::Delivered);
          debug!(notification_id = %event.id, subscriber = subscriber.name(), attempt, "delivered");
          return;
        }
        Err(e) => {
          warn!(
            notification_id = %event.id,
            subscriber = subscriber.name(),
            attempt,
            error = %e,
            "delivery attempt failed"
          );
          last_error = e.0;
          if attempt < max_attempts {
            tokio::time::sleep(self.config.backoff(attempt)).await;
          }
        }
      }
    }

    self.settle(key, DeliveryState::Failed);
    {
      let mut failures = self.failures.lock();
      failures.push_back(FailedDelivery {
        notification_id: event.id.clone(),
        recipient_class: event.recipient_class,
        subscriber: subscriber.name().to_owned(),
        attempts: max_attempts,
        last_error,
        failed_at: self.clock.now(),
      });
      while failures.len() > self.config.max_failures {
        failures.pop_front();
      }
    }

    if matches!(event.payload, Payload::DeliveryFailed { .. }) {
      error!(notification_id = %event.id, subscriber = subscriber.name(), "delivery-failure warning undeliverable");
      return;
    }
    error!(
      notification_id = %event.id,
      class = %event.recipient_class,
      subscriber = subscriber.name(),
      attempts = max_attempts,
      "delivery abandoned"
    );
    let warning = NotificationEvent::new(
      NotificationId::for_failure(&event.id, event.recipient_class, subscriber.name()),
      RecipientClass::Authority,
      Payload::DeliveryFailed {
        notification_id: event.id.clone(),
        recipient_class: event.recipient_class,
        subscriber:      subscriber.name().to_owned(),
        attempts:        max_attempts,
      },
      self.clock.now(),
    )
    .routed_to(Department::Control);
    self.publish(warning);
  }

  /// Aggregate state of every delivery of `id`: failed if any failed,
  /// pending while any is in flight.
  pub fn delivery_state(&self, id: &NotificationId) -> Option<DeliveryState> {
    let ledger = self.ledger.lock();
    let states = &ledger.get(id)?.deliveries;
    if states.is_empty() {
      None
    } else if states.values().any(|s| *s == DeliveryState::Failed) {
      Some(DeliveryState::Failed)
    } else if states.values().any(|s| *s == DeliveryState::Pending) {
      Some(DeliveryState::Pending)
    } else {
      Some(DeliveryState::Delivered)
    }
  }

  /// Drop ledger entries with nothing in flight that were last touched
  /// before the retention window. Returns how many were dropped.
  pub fn prune(&self, now: DateTime<Utc>) -> usize {
    let cutoff = now - self.config.ledger_retention();
    let mut ledger = self.ledger.lock();
    let before = ledger.len();
    ledger.retain(|_, entry| !entry.settled() || entry.touched_at >= cutoff);
    before - ledger.len()
  }

  /// Number of notifications the ledger currently tracks.
  pub fn ledger_len(&self) -> usize { self.ledger.lock().len() }

  pub fn failures(&self) -> Vec<FailedDelivery> { self.failures.lock().iter().cloned().collect() }
}
