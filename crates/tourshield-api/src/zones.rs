//! Handlers for `/zones`.
//!
//! `GET` returns the active zone snapshot. `PUT` replaces it; the body is a
//! full [`ZoneSet`] whose `version` must be newer than the active one.

use axum::{Json, extract::State};
use serde::Serialize;
use tourshield_core::{authority::Department, store::AlertArchive, zone::ZoneSet};

use crate::{ApiState, auth::Operator, error::ApiError};

/// `GET /zones`
pub async fn get_current<A>(State(state): State<ApiState<A>>) -> Json<ZoneSet>
where
  A: AlertArchive + 'static,
{
  Json(state.engine.zone_set().as_ref().clone())
}

#[derive(Debug, Serialize)]
pub struct ZoneVersion {
  pub version: u64,
}

/// `PUT /zones`
pub async fn replace<A>(
  State(state): State<ApiState<A>>,
  operator: Operator,
  Json(zones): Json<ZoneSet>,
) -> Result<Json<ZoneVersion>, ApiError>
where
  A: AlertArchive + 'static,
{
  operator.require(&[Department::Tourism, Department::Control])?;
  let version = state.engine.update_zone_set(zones)?;
  Ok(Json(ZoneVersion { version }))
}
