//! Core types and trait definitions for the TourShield safety engine.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Every other crate depends on it; it holds the domain model, the alert
//! state machine, zone geometry, and the seams (clock, identity oracle,
//! archive) that the engine is generic over.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod alert;
pub mod authority;
pub mod clock;
pub mod error;
pub mod geo;
pub mod identity;
pub mod notification;
pub mod person;
pub mod store;
pub mod unit;
pub mod zone;

pub use error::{Error, Result};
