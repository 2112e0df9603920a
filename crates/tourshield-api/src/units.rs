//! Handlers for `/units` endpoints. All require an operator.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/units` | |
//! | `POST` | `/units` | Body: `{"unit_id":"U1","department":"police","lat":..,"lon":..}`; 201 |
//! | `POST` | `/units/:id/position` | Body: `{"lat":..,"lon":..,"at":..}` |
//! | `PUT`  | `/units/:id/availability` | Body: `{"available":false}`; 409 while dispatched |
//! | `POST` | `/units/:id/on-scene` | Marks the unit's alert Arrived |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use tourshield_core::{
  alert::Alert, authority::Department, store::AlertArchive, unit::ResponderUnit,
};

use crate::{ApiState, auth::Operator, error::ApiError, persons::LocationBody};

/// `GET /units`
pub async fn list<A>(
  State(state): State<ApiState<A>>,
  _operator: Operator,
) -> Json<Vec<ResponderUnit>>
where
  A: AlertArchive + 'static,
{
  Json(state.engine.units())
}

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub unit_id:    String,
  pub department: Department,
  pub lat:        f64,
  pub lon:        f64,
}

/// `POST /units`
pub async fn create<A>(
  State(state): State<ApiState<A>>,
  operator: Operator,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  A: AlertArchive + 'static,
{
  operator.require(&[Department::Police, Department::Control])?;
  if body.unit_id.trim().is_empty() {
    return Err(ApiError::BadRequest("unit_id must not be empty".into()));
  }
  let unit = state
    .engine
    .add_unit(&body.unit_id, body.department, body.lat, body.lon)?;
  Ok((StatusCode::CREATED, Json(unit)))
}

/// `POST /units/:id/position`
pub async fn report_position<A>(
  State(state): State<ApiState<A>>,
  _operator: Operator,
  Path(id): Path<String>,
  Json(body): Json<LocationBody>,
) -> Result<Json<ResponderUnit>, ApiError>
where
  A: AlertArchive + 'static,
{
  let at = body.at.unwrap_or_else(|| state.engine.now());
  Ok(Json(state.engine.report_unit_position(&id, body.lat, body.lon, at)?))
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityBody {
  pub available: bool,
}

/// `PUT /units/:id/availability`
pub async fn set_availability<A>(
  State(state): State<ApiState<A>>,
  _operator: Operator,
  Path(id): Path<String>,
  Json(body): Json<AvailabilityBody>,
) -> Result<Json<ResponderUnit>, ApiError>
where
  A: AlertArchive + 'static,
{
  let unit = if body.available {
    state.engine.set_unit_available(&id)?
  } else {
    state.engine.set_unit_busy(&id)?
  };
  Ok(Json(unit))
}

/// `POST /units/:id/on-scene`
pub async fn on_scene<A>(
  State(state): State<ApiState<A>>,
  _operator: Operator,
  Path(id): Path<String>,
) -> Result<Json<Alert>, ApiError>
where
  A: AlertArchive + 'static,
{
  Ok(Json(state.engine.unit_on_scene(&id)?))
}
