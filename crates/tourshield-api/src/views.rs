//! Department-scoped read views.

use axum::{Json, extract::State};
use tourshield_core::store::AlertArchive;
use tourshield_engine::{fanout::FailedDelivery, views::Dashboard};

use crate::{ApiState, auth::Operator, error::ApiError};

/// `GET /dashboard`: the console for the operator's own department.
pub async fn dashboard<A>(
  State(state): State<ApiState<A>>,
  operator: Operator,
) -> Json<Dashboard>
where
  A: AlertArchive + 'static,
{
  Json(state.engine.dashboard(operator.department))
}

/// `GET /deliveries/failed`: control room only.
pub async fn failed_deliveries<A>(
  State(state): State<ApiState<A>>,
  operator: Operator,
) -> Result<Json<Vec<FailedDelivery>>, ApiError>
where
  A: AlertArchive + 'static,
{
  if !operator.department.sees_delivery_health() {
    return Err(ApiError::Forbidden("delivery health is a control-room view".into()));
  }
  Ok(Json(state.engine.delivery_health()))
}
