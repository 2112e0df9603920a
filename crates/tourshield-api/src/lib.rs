//! JSON REST API for TourShield.
//!
//! Exposes an axum [`Router`] over an [`Engine`] backed by any
//! [`AlertArchive`]. Person-facing routes (registration, location reports,
//! SOS) are open; authority routes require an operator login. TLS and
//! transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", tourshield_api::api_router(state))
//! ```

pub mod alerts;
pub mod auth;
pub mod error;
pub mod persons;
pub mod units;
pub mod views;
pub mod zones;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post, put},
};
use tourshield_core::store::AlertArchive;
use tourshield_engine::Engine;

pub use auth::{Operator, OperatorAccount, OperatorDirectory};
pub use error::ApiError;

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct ApiState<A> {
  pub engine:    Arc<Engine<A>>,
  pub operators: Arc<OperatorDirectory>,
}

impl<A> Clone for ApiState<A> {
  fn clone(&self) -> Self {
    Self {
      engine:    Arc::clone(&self.engine),
      operators: Arc::clone(&self.operators),
    }
  }
}

impl<A> ApiState<A> {
  pub fn new(engine: Arc<Engine<A>>, operators: OperatorDirectory) -> Self {
    Self { engine, operators: Arc::new(operators) }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<A>(state: ApiState<A>) -> Router<()>
where
  A: AlertArchive + 'static,
{
  Router::new()
    // Persons
    .route("/persons", get(persons::list::<A>).post(persons::register::<A>))
    .route("/persons/{id}", get(persons::get_one::<A>).delete(persons::deregister::<A>))
    .route("/persons/{id}/locations", post(persons::report_location::<A>))
    .route("/persons/{id}/sos", post(persons::sos::<A>))
    .route("/persons/{id}/efir", get(persons::efir::<A>))
    // Alerts
    .route("/alerts", get(alerts::list::<A>))
    .route("/alerts/{id}", get(alerts::get_one::<A>))
    .route("/alerts/{id}/cancel", post(alerts::cancel::<A>))
    .route("/alerts/{id}/resolve", post(alerts::resolve::<A>))
    .route("/alerts/{id}/escalate", post(alerts::escalate::<A>))
    // Zones
    .route("/zones", get(zones::get_current::<A>).put(zones::replace::<A>))
    // Units
    .route("/units", get(units::list::<A>).post(units::create::<A>))
    .route("/units/{id}/position", post(units::report_position::<A>))
    .route("/units/{id}/availability", put(units::set_availability::<A>))
    .route("/units/{id}/on-scene", post(units::on_scene::<A>))
    // Views
    .route("/dashboard", get(views::dashboard::<A>))
    .route("/deliveries/failed", get(views::failed_deliveries::<A>))
    .with_state(state)
}

#[cfg(test)]
mod tests;
