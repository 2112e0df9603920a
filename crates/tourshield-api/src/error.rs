//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tourshield_core::Error as CoreError;
use tracing::error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Engine(#[from] CoreError),

  #[error("unauthorized")]
  Unauthorized,

  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("bad request: {0}")]
  BadRequest(String),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
      ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Engine(e) => match e {
        CoreError::UnknownPerson(_)
        | CoreError::UnknownAlert(_)
        | CoreError::UnknownUnit(_) => StatusCode::NOT_FOUND,

        CoreError::OutOfOrder { .. }
        | CoreError::InvalidTransition { .. }
        | CoreError::StaleZoneVersion { .. }
        | CoreError::PersonHasOpenAlert(_)
        | CoreError::PersonNotMissing(_)
        | CoreError::UnitDispatched(_)
        | CoreError::UnitNotDispatched(_)
        | CoreError::DuplicateUnit(_)
        | CoreError::DuplicateTrigger(_) => StatusCode::CONFLICT,

        CoreError::InvalidPosition { .. }
        | CoreError::FutureReport { .. }
        | CoreError::InvalidDigitalId
        | CoreError::InvalidZone(_)
        | CoreError::NoKnownLocation(_) => StatusCode::BAD_REQUEST,

        CoreError::NoUnitsAvailable => StatusCode::SERVICE_UNAVAILABLE,
        CoreError::DeliveryFailed(_) => StatusCode::BAD_GATEWAY,

        CoreError::CorruptHistory(_)
        | CoreError::Archive(_)
        | CoreError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
      },
    }
  }

  /// Machine-readable error kind, e.g. `out_of_order`.
  pub fn kind(&self) -> &'static str {
    match self {
      ApiError::Unauthorized => "unauthorized",
      ApiError::Forbidden(_) => "forbidden",
      ApiError::BadRequest(_) => "bad_request",
      ApiError::Engine(e) => match e {
        CoreError::OutOfOrder { .. } => "out_of_order",
        CoreError::FutureReport { .. } => "future_report",
        CoreError::UnknownPerson(_) => "unknown_person",
        CoreError::UnknownAlert(_) => "unknown_alert",
        CoreError::UnknownUnit(_) => "unknown_unit",
        CoreError::InvalidTransition { .. } => "invalid_transition",
        CoreError::CorruptHistory(_) => "corrupt_history",
        CoreError::NoUnitsAvailable => "no_units_available",
        CoreError::DuplicateTrigger(_) => "duplicate_trigger",
        CoreError::DeliveryFailed(_) => "delivery_failed",
        CoreError::InvalidPosition { .. } => "invalid_position",
        CoreError::InvalidDigitalId => "invalid_digital_id",
        CoreError::InvalidZone(_) => "invalid_zone",
        CoreError::StaleZoneVersion { .. } => "stale_zone_version",
        CoreError::PersonHasOpenAlert(_) => "person_has_open_alert",
        CoreError::PersonNotMissing(_) => "person_not_missing",
        CoreError::NoKnownLocation(_) => "no_known_location",
        CoreError::UnitDispatched(_) => "unit_dispatched",
        CoreError::UnitNotDispatched(_) => "unit_not_dispatched",
        CoreError::DuplicateUnit(_) => "duplicate_unit",
        CoreError::Archive(_) => "archive",
        CoreError::Serialization(_) => "serialization",
      },
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!(error = %self, "request failed");
    }
    let body = Json(json!({ "error": self.to_string(), "kind": self.kind() }));
    let mut res = (status, body).into_response();
    if status == StatusCode::UNAUTHORIZED {
      res.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"tourshield\""),
      );
    }
    res
  }
}
