//! The `AlertArchive` trait.
//!
//! Live state is held in memory by the engine. Resolved alerts past their
//! archival window and departed persons are handed to an archive backend
//! (e.g. `tourshield-store-sqlite`) and looked up there afterwards.

use std::future::Future;

use uuid::Uuid;

use crate::{alert::Alert, person::TrackedPerson};

/// Abstraction over a cold-storage backend for finished work.
///
/// Archived records are immutable: an alert is archived once, after it
/// reached a terminal state, and is never updated again.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait AlertArchive: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Alerts ────────────────────────────────────────────────────────────

  /// Persist a terminal alert together with its full history.
  fn archive_alert(
    &self,
    alert: Alert,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Load an archived alert, rebuilt from its stored history.
  fn get_alert(
    &self,
    alert_id: Uuid,
  ) -> impl Future<Output = Result<Option<Alert>, Self::Error>> + Send + '_;

  /// Archived alerts for one person, oldest first.
  fn alerts_for_person(
    &self,
    person_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Alert>, Self::Error>> + Send + '_;

  // ── Persons ───────────────────────────────────────────────────────────

  /// Persist a person leaving the live registry.
  fn archive_person(
    &self,
    person: TrackedPerson,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_person(
    &self,
    person_id: Uuid,
  ) -> impl Future<Output = Result<Option<TrackedPerson>, Self::Error>> + Send + '_;
}
