//! Router tests against an engine backed by an in-memory SQLite archive.

use std::sync::Arc;

use argon2::{Algorithm, Argon2, Params, PasswordHasher, Version, password_hash::SaltString};
use axum::{
  Router,
  body::Body,
  http::{Method, Request, StatusCode, header},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use chrono::{DateTime, TimeZone, Utc};
use rand_core::OsRng;
use serde_json::{Value, json};
use tourshield_core::{
  authority::Department,
  clock::ManualClock,
  geo::Position,
  zone::{Region, RiskLevel, Zone, ZoneSet},
};
use tourshield_engine::Engine;
use tourshield_store_sqlite::SqliteArchive;
use tower::ServiceExt as _;

use crate::{ApiState, OperatorAccount, OperatorDirectory, api_router};

// ─── Fixtures ────────────────────────────────────────────────────────────────

const PASSWORD: &str = "s3cret";

fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 12, 5, 10, 0, 0).unwrap() }

fn town() -> Position { Position { lat: 25.5788, lon: 91.8933 } }

fn zone_set(version: u64) -> ZoneSet {
  ZoneSet {
    version,
    utc_offset_minutes: 0,
    zones: vec![Zone {
      zone_id:     "old-town".into(),
      name:        "Old Town".into(),
      region:      Region::Circle { center: town(), radius_m: 1_000.0 },
      risk:        RiskLevel::Safe,
      time_window: None,
    }],
  }
}

/// Cheap argon2 parameters; verification reads them back from the PHC string.
fn hash(password: &str) -> String {
  let params = Params::new(1024, 1, 1, None).unwrap();
  let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
  let salt = SaltString::generate(&mut OsRng);
  argon.hash_password(password.as_bytes(), &salt).unwrap().to_string()
}

struct Harness {
  app:   Router,
  clock: ManualClock,
}

async fn harness() -> Harness {
  let clock = ManualClock::new(t0());
  let archive = SqliteArchive::open_in_memory().await.unwrap();
  let engine = Engine::builder(Arc::new(archive))
    .clock(Arc::new(clock.clone()))
    .zones(zone_set(1))
    .build()
    .unwrap();

  let operators = OperatorDirectory::new(
    [
      ("police", Department::Police),
      ("tourism", Department::Tourism),
      ("control", Department::Control),
    ]
    .map(|(username, department)| OperatorAccount {
      username: username.into(),
      password_hash: hash(PASSWORD),
      department,
    }),
  );

  let app = api_router(ApiState::new(Arc::new(engine), operators));
  Harness { app, clock }
}

fn basic(user: &str) -> String { format!("Basic {}", B64.encode(format!("{user}:{PASSWORD}"))) }

impl Harness {
  async fn call(
    &self,
    method: Method,
    uri: &str,
    operator: Option<&str>,
    body: Option<Value>,
  ) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(user) = operator {
      req = req.header(header::AUTHORIZATION, basic(user));
    }
    let req = match body {
      Some(v) => req
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(v.to_string()))
        .unwrap(),
      None => req.body(Body::empty()).unwrap(),
    };

    let resp = self.app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
      .await
      .unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
  }

  async fn register(&self, name: &str) -> String {
    let (status, body) = self
      .call(
        Method::POST,
        "/persons",
        None,
        Some(json!({
          "profile": {
            "full_name": name,
            "phone": "+91-9000000001",
            "itinerary": ["Shillong"],
            "emergency_contacts": [{ "name": "Ravi", "phone": "+91-9000000002" }]
          },
          "digital_id": "TID-2024-000123"
        })),
      )
      .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["person_id"].as_str().unwrap().to_owned()
  }

  async fn report(&self, person: &str, at: DateTime<Utc>) -> (StatusCode, Value) {
    self
      .call(
        Method::POST,
        &format!("/persons/{person}/locations"),
        None,
        Some(json!({ "lat": town().lat, "lon": town().lon, "at": at })),
      )
      .await
  }

  async fn add_unit(&self, unit_id: &str, metres_south: f64) {
    let p = town().offset_north(-metres_south);
    let (status, body) = self
      .call(
        Method::POST,
        "/units",
        Some("police"),
        Some(json!({ "unit_id": unit_id, "department": "police", "lat": p.lat, "lon": p.lon })),
      )
      .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
  }
}

// ─── Persons ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn register_and_fetch_person() {
  let h = harness().await;
  let id = h.register("Asha").await;

  let (status, body) = h.call(Method::GET, &format!("/persons/{id}"), None, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["profile"]["full_name"], "Asha");
  assert_eq!(body["safety_score"], 85);
  // Only the fingerprint of the digital id is kept.
  assert!(!body.to_string().contains("TID-2024-000123"));
}

#[tokio::test]
async fn unknown_person_is_404() {
  let h = harness().await;
  let (status, body) = h
    .call(Method::GET, &format!("/persons/{}", uuid::Uuid::new_v4()), None, None)
    .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(body["kind"], "unknown_person");
}

#[tokio::test]
async fn rejected_digital_id_is_400() {
  let h = harness().await;
  let (status, body) = h
    .call(
      Method::POST,
      "/persons",
      None,
      Some(json!({ "profile": { "full_name": "X", "phone": "1" }, "digital_id": "short" })),
    )
    .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["kind"], "invalid_digital_id");
}

#[tokio::test]
async fn location_reports_and_out_of_order() {
  let h = harness().await;
  let id = h.register("Asha").await;

  let (status, body) = h.report(&id, t0()).await;
  assert_eq!(status, StatusCode::OK, "{body}");
  assert_eq!(body["status"], "active");
  assert_eq!(body["zone"]["zone_id"], "old-town");

  h.clock.advance_secs(60);
  let (status, _) = h.report(&id, t0() + chrono::Duration::seconds(60)).await;
  assert_eq!(status, StatusCode::OK);

  // Beyond the 5 s tolerance behind the last accepted report.
  let (status, body) = h.report(&id, t0() + chrono::Duration::seconds(30)).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["kind"], "out_of_order");

  let (status, body) = h.report(&id, t0() + chrono::Duration::days(1)).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["kind"], "future_report");
}

#[tokio::test]
async fn invalid_coordinates_are_400() {
  let h = harness().await;
  let id = h.register("Asha").await;
  let (status, body) = h
    .call(
      Method::POST,
      &format!("/persons/{id}/locations"),
      None,
      Some(json!({ "lat": 95.0, "lon": 10.0 })),
    )
    .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["kind"], "invalid_position");
}

// ─── SOS and alerts ──────────────────────────────────────────────────────────

#[tokio::test]
async fn sos_dispatches_nearest_unit_and_merges_repeats() {
  let h = harness().await;
  let id = h.register("Asha").await;
  h.report(&id, t0()).await;
  h.add_unit("U1", 1_000.0).await;
  h.add_unit("U2", 3_000.0).await;

  let (status, first) = h.call(Method::POST, &format!("/persons/{id}/sos"), None, None).await;
  assert_eq!(status, StatusCode::CREATED, "{first}");
  assert_eq!(first["state"], "dispatched");
  assert_eq!(first["assigned_unit_id"], "U1");
  assert_eq!(first["merged"], false);

  let (status, second) = h
    .call(Method::POST, &format!("/persons/{id}/sos"), None, Some(json!({ "note": "again" })))
    .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(second["merged"], true);
  assert_eq!(second["alert_id"], first["alert_id"]);

  let alert_id = first["alert_id"].as_str().unwrap();
  let (status, alert) = h.call(Method::GET, &format!("/alerts/{alert_id}"), None, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(alert["merged_triggers"], 1);
  assert_eq!(alert["history"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn sos_without_any_location_is_400() {
  let h = harness().await;
  let id = h.register("Asha").await;
  let (status, body) = h.call(Method::POST, &format!("/persons/{id}/sos"), None, None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["kind"], "no_known_location");
}

#[tokio::test]
async fn operator_routes_require_credentials() {
  let h = harness().await;
  let (status, _) = h.call(Method::GET, "/alerts", None, None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);

  let (status, body) = h
    .call(Method::GET, "/dashboard", Some("nobody"), None)
    .await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert_eq!(body["kind"], "unauthorized");
}

#[tokio::test]
async fn cancel_then_cancel_again_conflicts() {
  let h = harness().await;
  let id = h.register("Asha").await;
  h.report(&id, t0()).await;
  let (_, receipt) = h.call(Method::POST, &format!("/persons/{id}/sos"), None, None).await;
  let alert_id = receipt["alert_id"].as_str().unwrap().to_owned();
  assert_eq!(receipt["state"], "triggered");

  // Open alert blocks deregistration.
  let (status, body) = h
    .call(Method::DELETE, &format!("/persons/{id}"), Some("control"), None)
    .await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["kind"], "person_has_open_alert");

  let (status, alert) = h
    .call(Method::POST, &format!("/alerts/{alert_id}/cancel"), Some("police"), None)
    .await;
  assert_eq!(status, StatusCode::OK, "{alert}");
  assert_eq!(alert["state"], "resolved");
  assert_eq!(alert["resolution"], "cancelled");
  assert_eq!(alert["history"][1]["actor"], "police");

  let (status, body) = h
    .call(Method::POST, &format!("/alerts/{alert_id}/cancel"), Some("police"), None)
    .await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["kind"], "invalid_transition");

  let (status, person) = h
    .call(Method::DELETE, &format!("/persons/{id}"), Some("control"), None)
    .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(person["person_id"], id.as_str());

  // Still readable from the archive.
  let (status, _) = h.call(Method::GET, &format!("/persons/{id}"), None, None).await;
  assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn escalated_alerts_leave_the_tourism_view() {
  let h = harness().await;
  let id = h.register("Asha").await;
  h.report(&id, t0()).await;
  let (_, receipt) = h.call(Method::POST, &format!("/persons/{id}/sos"), None, None).await;
  let alert_id = receipt["alert_id"].as_str().unwrap().to_owned();

  let (_, tourism) = h.call(Method::GET, "/alerts", Some("tourism"), None).await;
  assert_eq!(tourism.as_array().unwrap().len(), 1);

  let (status, _) = h
    .call(Method::POST, &format!("/alerts/{alert_id}/escalate"), Some("control"), None)
    .await;
  assert_eq!(status, StatusCode::OK);
  let (status, _) = h
    .call(Method::POST, &format!("/alerts/{alert_id}/escalate"), Some("control"), None)
    .await;
  assert_eq!(status, StatusCode::CONFLICT);

  let (_, tourism) = h.call(Method::GET, "/alerts", Some("tourism"), None).await;
  assert!(tourism.as_array().unwrap().is_empty());
  let (_, control) = h
    .call(Method::GET, "/alerts?open_only=true", Some("control"), None)
    .await;
  assert_eq!(control.as_array().unwrap().len(), 1);

  // Escalated without arrival closes as a handoff.
  let (_, alert) = h
    .call(Method::POST, &format!("/alerts/{alert_id}/resolve"), Some("control"), None)
    .await;
  assert_eq!(alert["resolution"], "handed_off");
}

// ─── Units ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unit_lifecycle() {
  let h = harness().await;
  h.add_unit("U1", 500.0).await;

  let (status, body) = h
    .call(
      Method::POST,
      "/units",
      Some("police"),
      Some(json!({ "unit_id": "U1", "department": "police", "lat": 0.0, "lon": 0.0 })),
    )
    .await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["kind"], "duplicate_unit");

  let (status, body) = h.call(Method::POST, "/units/U1/on-scene", Some("police"), None).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["kind"], "unit_not_dispatched");

  let (status, unit) = h
    .call(Method::PUT, "/units/U1/availability", Some("police"), Some(json!({ "available": false })))
    .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(unit["status"], "busy");

  let (status, body) = h
    .call(Method::POST, "/units/U9/position", Some("police"), Some(json!({ "lat": 1.0, "lon": 1.0 })))
    .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(body["kind"], "unknown_unit");

  let (status, _) = h
    .call(
      Method::POST,
      "/units",
      Some("tourism"),
      Some(json!({ "unit_id": "T1", "department": "tourism", "lat": 0.0, "lon": 0.0 })),
    )
    .await;
  assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn on_scene_then_resolve_confirms() {
  let h = harness().await;
  let id = h.register("Asha").await;
  h.report(&id, t0()).await;
  h.add_unit("U1", 800.0).await;
  let (_, receipt) = h.call(Method::POST, &format!("/persons/{id}/sos"), None, None).await;
  let alert_id = receipt["alert_id"].as_str().unwrap().to_owned();

  let (status, alert) = h.call(Method::POST, "/units/U1/on-scene", Some("police"), None).await;
  assert_eq!(status, StatusCode::OK, "{alert}");
  assert_eq!(alert["state"], "arrived");

  let (_, alert) = h
    .call(Method::POST, &format!("/alerts/{alert_id}/resolve"), Some("police"), None)
    .await;
  assert_eq!(alert["resolution"], "confirmed");

  let (_, units) = h.call(Method::GET, "/units", Some("police"), None).await;
  assert_eq!(units[0]["status"], "available");
}

// ─── Zones ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn zone_replacement_needs_newer_version() {
  let h = harness().await;
  let (_, current) = h.call(Method::GET, "/zones", None, None).await;
  assert_eq!(current["version"], 1);

  let stale = serde_json::to_value(zone_set(1)).unwrap();
  let (status, body) = h.call(Method::PUT, "/zones", Some("control"), Some(stale)).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["kind"], "stale_zone_version");

  let newer = serde_json::to_value(zone_set(2)).unwrap();
  let (status, _) = h.call(Method::PUT, "/zones", Some("police"), Some(newer.clone())).await;
  assert_eq!(status, StatusCode::FORBIDDEN);

  let (status, body) = h.call(Method::PUT, "/zones", Some("tourism"), Some(newer)).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["version"], 2);
}

// ─── Views ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn dashboards_are_department_scoped() {
  let h = harness().await;
  h.register("Asha").await;

  let (status, tourism) = h.call(Method::GET, "/dashboard", Some("tourism"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(tourism["department"], "tourism");
  assert_eq!(tourism["tracked_persons"], 1);
  assert!(tourism["failed_deliveries"].is_null());

  let (_, control) = h.call(Method::GET, "/dashboard", Some("control"), None).await;
  assert!(control["failed_deliveries"].is_array());

  let (status, _) = h.call(Method::GET, "/deliveries/failed", Some("tourism"), None).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  let (status, failed) = h.call(Method::GET, "/deliveries/failed", Some("control"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert!(failed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn efir_for_silent_person_only() {
  let h = harness().await;
  let id = h.register("Asha").await;
  h.report(&id, t0()).await;
  let uri = format!("/persons/{id}/efir");

  let (status, body) = h.call(Method::GET, &uri, Some("police"), None).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["kind"], "person_not_missing");

  h.clock.advance_secs(700);
  let (status, _) = h.call(Method::GET, &uri, Some("tourism"), None).await;
  assert_eq!(status, StatusCode::FORBIDDEN);

  let (status, report) = h.call(Method::GET, &uri, Some("police"), None).await;
  assert_eq!(status, StatusCode::OK, "{report}");
  assert_eq!(report["filed_by"], "police");
  assert_eq!(report["person"]["status"], "offline");
  assert!(report["narrative"].as_str().unwrap().contains("Asha"));
}
