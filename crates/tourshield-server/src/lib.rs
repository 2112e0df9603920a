//! Wiring for the TourShield server: configuration, the SQLite-backed
//! engine, notification transports and the HTTP router.

pub mod config;
pub mod subscribers;

use std::{sync::Arc, time::Duration};

use anyhow::Context as _;
use axum::{Router, routing::get};
use tourshield_api::{ApiState, OperatorDirectory, api_router};
use tourshield_core::{clock::Clock, notification::RecipientClass};
use tourshield_engine::{Engine, fanout::Scope};
use tourshield_store_sqlite::SqliteArchive;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use config::ServerConfig;
use subscribers::{LogSubscriber, WebhookSubscriber};

pub type ServerEngine = Engine<SqliteArchive>;

/// Open the archive, build the engine and register the outbound transports.
pub async fn build_engine(
  config: &ServerConfig,
  clock: Arc<dyn Clock>,
) -> anyhow::Result<Arc<ServerEngine>> {
  let store_path = config.store_path();
  let archive = SqliteArchive::open(&store_path)
    .await
    .with_context(|| format!("failed to open archive at {store_path:?}"))?;

  let zones = config.zones()?;
  info!(version = zones.version, zones = zones.zones.len(), "zone set loaded");

  let engine = Engine::builder(Arc::new(archive))
    .config(config.engine.clone())
    .clock(clock)
    .zones(zones)
    .build()
    .context("invalid engine configuration")?;

  engine.subscribe(RecipientClass::Authority, Scope::All, Arc::new(LogSubscriber));
  let timeout = Duration::from_secs(config.webhooks.timeout_secs);
  for (class, url) in config.webhooks.targets() {
    let hook = WebhookSubscriber::new(format!("webhook-{class}"), url, timeout)?;
    engine.subscribe(class, Scope::All, Arc::new(hook));
    info!(%class, url, "webhook registered");
  }

  Ok(Arc::new(engine))
}

/// The full HTTP surface: `/api/*` plus a liveness probe.
pub fn build_app(engine: Arc<ServerEngine>, config: &ServerConfig) -> Router {
  if config.operators.is_empty() {
    warn!("no operators configured; authority routes will reject every request");
  }
  let state = ApiState::new(engine, OperatorDirectory::new(config.operators.clone()));

  Router::new()
    .route("/health", get(|| async { "ok" }))
    .nest("/api", api_router(state))
    .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;

  use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
  };
  use chrono::{TimeZone, Utc};
  use serde_json::{Value, json};
  use tourshield_api::OperatorAccount;
  use tourshield_core::{authority::Department, clock::ManualClock};
  use tower::ServiceExt as _;
  use uuid::Uuid;

  use super::*;

  fn temp_store() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tourshield-srv-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join("archive.db")
  }

  fn operator_hash(password: &str) -> String {
    use argon2::{
      Algorithm, Argon2, Params, PasswordHasher, Version, password_hash::SaltString,
    };
    let params = Params::new(1024, 1, 1, None).unwrap();
    let salt = SaltString::generate(&mut rand_core::OsRng);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
      .hash_password(password.as_bytes(), &salt)
      .unwrap()
      .to_string()
  }

  async fn call(app: &Router, method: Method, uri: &str, auth: bool, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if auth {
      req = req.header(header::AUTHORIZATION, "Basic Y29udHJvbDpwdw==");
    }
    let req = match body {
      Some(v) => req
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(v.to_string()))
        .unwrap(),
      None => req.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
  }

  #[tokio::test]
  async fn resolved_alert_moves_to_archive_and_stays_readable() {
    let mut config = ServerConfig::default();
    config.server.store_path = temp_store();
    config.engine.alerts.archive_after_secs = 60;
    // Matches the `control:pw` Basic header sent by `call`.
    config.operators.push(OperatorAccount {
      username:      "control".into(),
      password_hash: operator_hash("pw"),
      department:    Department::Control,
    });

    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 12, 5, 10, 0, 0).unwrap());
    let engine = build_engine(&config, Arc::new(clock.clone())).await.unwrap();
    let app = build_app(engine.clone(), &config);

    let (status, _) = call(&app, Method::GET, "/health", false, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, person) = call(
      &app,
      Method::POST,
      "/api/persons",
      false,
      Some(json!({
        "profile": { "full_name": "Asha", "phone": "+91-9000000001" },
        "digital_id": "TID-2024-000123"
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let person_id = person["person_id"].as_str().unwrap().to_owned();

    let (status, receipt) = call(
      &app,
      Method::POST,
      &format!("/api/persons/{person_id}/sos"),
      false,
      Some(json!({ "lat": 25.5788, "lon": 91.8933 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{receipt}");
    let alert_id = receipt["alert_id"].as_str().unwrap().to_owned();

    let (status, _) =
      call(&app, Method::POST, &format!("/api/alerts/{alert_id}/cancel"), true, None).await;
    assert_eq!(status, StatusCode::OK);

    clock.advance_secs(61);
    let report = engine.tick().await;
    assert_eq!(report.archived_alerts, 1);

    let (status, alert) = call(&app, Method::GET, &format!("/api/alerts/{alert_id}"), false, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(alert["state"], "resolved");
    assert_eq!(alert["resolution"], "cancelled");

    // Archived alerts are no longer live, so operator actions miss them.
    let (status, _) =
      call(&app, Method::POST, &format!("/api/alerts/{alert_id}/cancel"), true, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let _ = std::fs::remove_dir_all(config.server.store_path.parent().unwrap());
  }
}
