//! Handlers for `/alerts` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/alerts` | Operator; `?person_id=&state=&open_only=`, scoped to the operator's department |
//! | `GET`  | `/alerts/:id` | Live or archived |
//! | `POST` | `/alerts/:id/cancel` | Operator |
//! | `POST` | `/alerts/:id/resolve` | Operator; needs arrival, or hands off an escalated alert |
//! | `POST` | `/alerts/:id/escalate` | Operator; once per alert |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use tourshield_core::{alert::Alert, store::AlertArchive};
use tourshield_engine::views::AlertFilter;
use uuid::Uuid;

use crate::{ApiState, auth::Operator, error::ApiError};

/// `GET /alerts`
pub async fn list<A>(
  State(state): State<ApiState<A>>,
  operator: Operator,
  Query(filter): Query<AlertFilter>,
) -> Json<Vec<Alert>>
where
  A: AlertArchive + 'static,
{
  Json(state.engine.list_alerts(operator.department, &filter))
}

/// `GET /alerts/:id`
pub async fn get_one<A>(
  State(state): State<ApiState<A>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Alert>, ApiError>
where
  A: AlertArchive + 'static,
{
  Ok(Json(state.engine.get_alert(id).await?))
}

/// `POST /alerts/:id/cancel`
pub async fn cancel<A>(
  State(state): State<ApiState<A>>,
  operator: Operator,
  Path(id): Path<Uuid>,
) -> Result<Json<Alert>, ApiError>
where
  A: AlertArchive + 'static,
{
  Ok(Json(state.engine.cancel_alert(id, &operator.username)?))
}

/// `POST /alerts/:id/resolve`
pub async fn resolve<A>(
  State(state): State<ApiState<A>>,
  operator: Operator,
  Path(id): Path<Uuid>,
) -> Result<Json<Alert>, ApiError>
where
  A: AlertArchive + 'static,
{
  Ok(Json(state.engine.confirm_resolved(id, &operator.username)?))
}

/// `POST /alerts/:id/escalate`
pub async fn escalate<A>(
  State(state): State<ApiState<A>>,
  operator: Operator,
  Path(id): Path<Uuid>,
) -> Result<Json<Alert>, ApiError>
where
  A: AlertArchive + 'static,
{
  Ok(Json(state.engine.escalate_alert(id, &operator.username)?))
}
