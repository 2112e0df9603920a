//! [`SqliteArchive`]: the SQLite implementation of [`AlertArchive`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use tracing::debug;
use uuid::Uuid;

use tourshield_core::{alert::Alert, person::TrackedPerson, store::AlertArchive};

use crate::{
  Error, Result,
  encode::{
    ALERT_COLUMNS, PERSON_COLUMNS, RawAlert, RawHistory, RawPerson, encode_dt,
    encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Archive ─────────────────────────────────────────────────────────────────

/// Cold storage for finished alerts and departed persons, backed by a single
/// SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteArchive {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteArchive {
  /// Open (or create) an archive at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let archive = Self { conn };
    archive.init_schema().await?;
    Ok(archive)
  }

  /// Open an in-memory archive for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let archive = Self { conn };
    archive.init_schema().await?;
    Ok(archive)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Load the stored history of each alert header, oldest entry first.
  async fn hydrate(&self, headers: Vec<RawAlert>) -> Result<Vec<Alert>> {
    let ids: Vec<String> = headers.iter().map(|h| h.alert_id.clone()).collect();

    let histories: Vec<Vec<RawHistory>> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT version, from_state, to_state, at, actor, unit_id,
                  resolution, note
             FROM alert_history
            WHERE alert_id = ?1
            ORDER BY version",
        )?;
        let mut out = Vec::with_capacity(ids.len());
        for id in &ids {
          let rows = stmt
            .query_map(rusqlite::params![id], RawHistory::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          out.push(rows);
        }
        Ok(out)
      })
      .await?;

    headers
      .into_iter()
      .zip(histories)
      .map(|(header, history)| header.into_alert(history))
      .collect()
  }
}

// ─── AlertArchive impl ───────────────────────────────────────────────────────

impl AlertArchive for SqliteArchive {
  type Error = Error;

  // ── Alerts ────────────────────────────────────────────────────────────────

  async fn archive_alert(&self, alert: Alert) -> Result<()> {
    let alert_id = alert.alert_id;
    let id_str = encode_uuid(alert_id);
    let person_str = encode_uuid(alert.person_id);
    let origin = alert.origin.to_string();
    let priority = alert.priority.to_string();
    let state = alert.state.to_string();
    let created_at = encode_dt(alert.created_at);
    let location = alert.location;
    let merged_triggers = alert.merged_triggers;
    let resolution = alert.resolution.map(|r| r.to_string());
    let resolved_at = alert.resolved_at.map(encode_dt);
    let escalated_at = alert.escalated_at.map(encode_dt);
    let last_triggered_at = encode_dt(alert.last_triggered_at);
    let archived_at = encode_dt(Utc::now());
    let history: Vec<RawHistory> = alert.history.iter().map(RawHistory::from_entry).collect();

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let exists = tx
          .query_row(
            "SELECT 1 FROM alerts WHERE alert_id = ?1",
            rusqlite::params![id_str],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if exists {
          return Ok(false);
        }

        tx.execute(
          "INSERT INTO alerts (
             alert_id, person_id, origin, priority, state, created_at,
             lat, lon, resolution, resolved_at, escalated_at,
             merged_triggers, last_triggered_at, archived_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
          rusqlite::params![
            id_str,
            person_str,
            origin,
            priority,
            state,
            created_at,
            location.lat,
            location.lon,
            resolution,
            resolved_at,
            escalated_at,
            merged_triggers,
            last_triggered_at,
            archived_at,
          ],
        )?;

        {
          let mut stmt = tx.prepare(
            "INSERT INTO alert_history (
               alert_id, version, from_state, to_state, at, actor, unit_id,
               resolution, note
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          )?;
          for h in &history {
            stmt.execute(rusqlite::params![
              id_str,
              h.version,
              h.from_state,
              h.to_state,
              h.at,
              h.actor,
              h.unit_id,
              h.resolution,
              h.note,
            ])?;
          }
        }

        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !inserted {
      return Err(Error::AlreadyArchived(alert_id));
    }
    debug!(%alert_id, "alert archived");
    Ok(())
  }

  async fn get_alert(&self, alert_id: Uuid) -> Result<Option<Alert>> {
    let id_str = encode_uuid(alert_id);

    let raw: Option<RawAlert> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE alert_id = ?1"),
            rusqlite::params![id_str],
            RawAlert::from_row,
          )
          .optional()?)
      })
      .await?;

    let Some(raw) = raw else { return Ok(None) };
    Ok(self.hydrate(vec![raw]).await?.pop())
  }

  async fn alerts_for_person(&self, person_id: Uuid) -> Result<Vec<Alert>> {
    let person_str = encode_uuid(person_id);

    let raws: Vec<RawAlert> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ALERT_COLUMNS} FROM alerts
            WHERE person_id = ?1"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![person_str], RawAlert::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    // RFC 3339 strings with uneven sub-second digits do not sort as text.
    let mut alerts = self.hydrate(raws).await?;
    alerts.sort_by_key(|a| (a.created_at, a.alert_id));
    Ok(alerts)
  }

  // ── Persons ───────────────────────────────────────────────────────────────

  async fn archive_person(&self, person: TrackedPerson) -> Result<()> {
    let raw = RawPerson::from_person(&person)?;
    let archived_at = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO persons (
             person_id, registered_at, profile_json, fingerprint,
             last_fix_json, last_report_at, safety_score, status, archived_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
           ON CONFLICT (person_id) DO UPDATE SET
             last_fix_json  = excluded.last_fix_json,
             last_report_at = excluded.last_report_at,
             safety_score   = excluded.safety_score,
             status         = excluded.status,
             archived_at    = excluded.archived_at",
          rusqlite::params![
            raw.person_id,
            raw.registered_at,
            raw.profile_json,
            raw.fingerprint,
            raw.last_fix_json,
            raw.last_report_at,
            raw.safety_score,
            raw.status,
            archived_at,
          ],
        )?;
        Ok(())
      })
      .await?;

    debug!(person_id = %person.person_id, "person archived");
    Ok(())
  }

  async fn get_person(&self, person_id: Uuid) -> Result<Option<TrackedPerson>> {
    let id_str = encode_uuid(person_id);

    let raw: Option<RawPerson> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {PERSON_COLUMNS} FROM persons WHERE person_id = ?1"),
            rusqlite::params![id_str],
            RawPerson::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawPerson::into_person).transpose()
  }
}
