//! Handlers for `/persons` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/persons` | Operator; live persons only |
//! | `POST`   | `/persons` | Body: [`Registration`]; 201 |
//! | `GET`    | `/persons/:id` | Live or archived; 404 if neither |
//! | `DELETE` | `/persons/:id` | Operator; 409 while an alert is open |
//! | `POST`   | `/persons/:id/locations` | Body: `{"lat":..,"lon":..,"at":..}` |
//! | `POST`   | `/persons/:id/sos` | Body: [`SosRequest`]; 201, or 200 if merged |
//! | `GET`    | `/persons/:id/efir` | Police or control operator |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tourshield_core::{
  person::{Registration, TrackedPerson},
  store::AlertArchive,
};
use tourshield_engine::views::{LocationReceipt, MissingPersonReport, SosRequest};
use uuid::Uuid;

use crate::{ApiState, auth::Operator, error::ApiError};

/// `GET /persons`
pub async fn list<A>(
  State(state): State<ApiState<A>>,
  _operator: Operator,
) -> Json<Vec<TrackedPerson>>
where
  A: AlertArchive + 'static,
{
  Json(state.engine.persons())
}

/// `POST /persons`
pub async fn register<A>(
  State(state): State<ApiState<A>>,
  Json(body): Json<Registration>,
) -> Result<impl IntoResponse, ApiError>
where
  A: AlertArchive + 'static,
{
  let person = state.engine.register_person(body)?;
  Ok((StatusCode::CREATED, Json(person)))
}

/// `GET /persons/:id`
pub async fn get_one<A>(
  State(state): State<ApiState<A>>,
  Path(id): Path<Uuid>,
) -> Result<Json<TrackedPerson>, ApiError>
where
  A: AlertArchive + 'static,
{
  Ok(Json(state.engine.get_person(id).await?))
}

/// `DELETE /persons/:id`
pub async fn deregister<A>(
  State(state): State<ApiState<A>>,
  operator: Operator,
  Path(id): Path<Uuid>,
) -> Result<Json<TrackedPerson>, ApiError>
where
  A: AlertArchive + 'static,
{
  let person = state.engine.deregister_person(id).await?;
  tracing::info!(person_id = %id, operator = %operator.username, "person deregistered");
  Ok(Json(person))
}

// ─── Location reports ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LocationBody {
  pub lat: f64,
  pub lon: f64,
  /// Device timestamp; the server clock when absent.
  #[serde(default)]
  pub at:  Option<DateTime<Utc>>,
}

/// `POST /persons/:id/locations`
pub async fn report_location<A>(
  State(state): State<ApiState<A>>,
  Path(id): Path<Uuid>,
  Json(body): Json<LocationBody>,
) -> Result<Json<LocationReceipt>, ApiError>
where
  A: AlertArchive + 'static,
{
  let at = body.at.unwrap_or_else(|| state.engine.now());
  Ok(Json(state.engine.report_location(id, body.lat, body.lon, at)?))
}

/// `POST /persons/:id/sos`
pub async fn sos<A>(
  State(state): State<ApiState<A>>,
  Path(id): Path<Uuid>,
  body: Option<Json<SosRequest>>,
) -> Result<impl IntoResponse, ApiError>
where
  A: AlertArchive + 'static,
{
  let request = body.map(|Json(b)| b).unwrap_or_default();
  let receipt = state.engine.trigger_sos(id, request)?;
  let status = if receipt.merged { StatusCode::OK } else { StatusCode::CREATED };
  Ok((status, Json(receipt)))
}

/// `GET /persons/:id/efir`
pub async fn efir<A>(
  State(state): State<ApiState<A>>,
  operator: Operator,
  Path(id): Path<Uuid>,
) -> Result<Json<MissingPersonReport>, ApiError>
where
  A: AlertArchive + 'static,
{
  if !operator.department.may_file_efir() {
    return Err(ApiError::Forbidden(format!(
      "{} operators may not file missing-person reports",
      operator.department
    )));
  }
  let report = state.engine.missing_person_report(id, &operator.username).await?;
  Ok(Json(report))
}
