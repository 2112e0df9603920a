//! The TourShield safety engine.
//!
//! Ties the domain model from `tourshield-core` into a running system: a
//! zone index, the location-ingest and scoring path, the alert book with its
//! dispatch coordinator, and the notification fan-out. [`Engine`] is the
//! single entry point; it is generic over the [`AlertArchive`] that finished
//! alerts and departed persons are moved to.
//!
//! [`AlertArchive`]: tourshield_core::store::AlertArchive

pub mod alerts;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod fanout;
pub mod ingest;
pub mod scoring;
pub mod views;
pub mod zones;

pub use config::EngineConfig;
pub use engine::{Engine, EngineBuilder};
