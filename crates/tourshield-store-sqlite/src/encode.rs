//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, UUIDs are hyphenated lowercase, and the
//! enums use their snake_case `Display` form. Profiles and fixes are stored as
//! compact JSON.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use tourshield_core::{
  alert::{Alert, AlertOrigin, AlertState, HistoryEntry, Priority, Resolution},
  geo::{Fix, Position},
  person::{PersonProfile, PersonStatus, TrackedPerson},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

/// Parse a snake_case enum column.
fn decode_enum<T: FromStr>(column: &'static str, s: &str) -> Result<T> {
  s.parse()
    .map_err(|_| Error::UnknownVariant { column, value: s.to_owned() })
}

// ─── Alert rows ──────────────────────────────────────────────────────────────

/// Raw `alerts` row as read from SQLite.
pub struct RawAlert {
  pub alert_id:          String,
  pub person_id:         String,
  pub origin:            String,
  pub priority:          String,
  pub state:             String,
  pub created_at:        String,
  pub lat:               f64,
  pub lon:               f64,
  pub resolution:        Option<String>,
  pub resolved_at:       Option<String>,
  pub escalated_at:      Option<String>,
  pub merged_triggers:   u32,
  pub last_triggered_at: String,
}

pub const ALERT_COLUMNS: &str = "alert_id, person_id, origin, priority, state, \
  created_at, lat, lon, resolution, resolved_at, escalated_at, \
  merged_triggers, last_triggered_at";

impl RawAlert {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      alert_id:          row.get(0)?,
      person_id:         row.get(1)?,
      origin:            row.get(2)?,
      priority:          row.get(3)?,
      state:             row.get(4)?,
      created_at:        row.get(5)?,
      lat:               row.get(6)?,
      lon:               row.get(7)?,
      resolution:        row.get(8)?,
      resolved_at:       row.get(9)?,
      escalated_at:      row.get(10)?,
      merged_triggers:   row.get(11)?,
      last_triggered_at: row.get(12)?,
    })
  }

  /// Rebuild the alert by replaying `history` from its creation entry, then
  /// check the stored header against the result.
  pub fn into_alert(self, history: Vec<RawHistory>) -> Result<Alert> {
    let history = history
      .into_iter()
      .map(RawHistory::into_entry)
      .collect::<Result<Vec<_>>>()?;

    let alert_id = decode_uuid(&self.alert_id)?;
    let stored = Alert {
      alert_id,
      person_id:         decode_uuid(&self.person_id)?,
      origin:            decode_enum::<AlertOrigin>("origin", &self.origin)?,
      priority:          decode_enum::<Priority>("priority", &self.priority)?,
      state:             decode_enum::<AlertState>("state", &self.state)?,
      stage:             AlertState::Triggered,
      created_at:        decode_dt(&self.created_at)?,
      location:          Position { lat: self.lat, lon: self.lon },
      assigned_unit_id:  None,
      eta:               None,
      escalated_at:      decode_opt_dt(self.escalated_at)?,
      resolution:        self
        .resolution
        .as_deref()
        .map(|s| decode_enum::<Resolution>("resolution", s))
        .transpose()?,
      resolved_at:       decode_opt_dt(self.resolved_at)?,
      merged_triggers:   self.merged_triggers,
      last_triggered_at: decode_dt(&self.last_triggered_at)?,
      history,
    };

    let rebuilt = stored.replay()?;
    let agrees = rebuilt.state == stored.state
      && rebuilt.resolution == stored.resolution
      && rebuilt.resolved_at == stored.resolved_at
      && rebuilt.escalated_at == stored.escalated_at;
    if !agrees {
      return Err(Error::HistoryMismatch(alert_id));
    }
    Ok(rebuilt)
  }
}

/// Raw `alert_history` row as read from SQLite.
pub struct RawHistory {
  pub version:    u32,
  pub from_state: Option<String>,
  pub to_state:   String,
  pub at:         String,
  pub actor:      Option<String>,
  pub unit_id:    Option<String>,
  pub resolution: Option<String>,
  pub note:       Option<String>,
}

impl RawHistory {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      version:    row.get(0)?,
      from_state: row.get(1)?,
      to_state:   row.get(2)?,
      at:         row.get(3)?,
      actor:      row.get(4)?,
      unit_id:    row.get(5)?,
      resolution: row.get(6)?,
      note:       row.get(7)?,
    })
  }

  pub fn from_entry(e: &HistoryEntry) -> Self {
    Self {
      version:    e.version,
      from_state: e.from.map(|s| s.to_string()),
      to_state:   e.to.to_string(),
      at:         encode_dt(e.at),
      actor:      e.actor.clone(),
      unit_id:    e.unit_id.clone(),
      resolution: e.resolution.map(|r| r.to_string()),
      note:       e.note.clone(),
    }
  }

  pub fn into_entry(self) -> Result<HistoryEntry> {
    Ok(HistoryEntry {
      version:    self.version,
      from:       self
        .from_state
        .as_deref()
        .map(|s| decode_enum::<AlertState>("from_state", s))
        .transpose()?,
      to:         decode_enum::<AlertState>("to_state", &self.to_state)?,
      at:         decode_dt(&self.at)?,
      actor:      self.actor,
      unit_id:    self.unit_id,
      resolution: self
        .resolution
        .as_deref()
        .map(|s| decode_enum::<Resolution>("resolution", s))
        .transpose()?,
      note:       self.note,
    })
  }
}

// ─── Person rows ─────────────────────────────────────────────────────────────

/// Raw `persons` row as read from SQLite.
pub struct RawPerson {
  pub person_id:      String,
  pub registered_at:  String,
  pub profile_json:   String,
  pub fingerprint:    String,
  pub last_fix_json:  Option<String>,
  pub last_report_at: Option<String>,
  pub safety_score:   u8,
  pub status:         String,
}

pub const PERSON_COLUMNS: &str = "person_id, registered_at, profile_json, \
  fingerprint, last_fix_json, last_report_at, safety_score, status";

impl RawPerson {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      person_id:      row.get(0)?,
      registered_at:  row.get(1)?,
      profile_json:   row.get(2)?,
      fingerprint:    row.get(3)?,
      last_fix_json:  row.get(4)?,
      last_report_at: row.get(5)?,
      safety_score:   row.get(6)?,
      status:         row.get(7)?,
    })
  }

  pub fn from_person(p: &TrackedPerson) -> Result<Self> {
    Ok(Self {
      person_id:      encode_uuid(p.person_id),
      registered_at:  encode_dt(p.registered_at),
      profile_json:   serde_json::to_string(&p.profile)?,
      fingerprint:    p.digital_id_fingerprint.clone(),
      last_fix_json:  p.last_fix.as_ref().map(serde_json::to_string).transpose()?,
      last_report_at: p.last_report_at.map(encode_dt),
      safety_score:   p.safety_score,
      status:         p.status.to_string(),
    })
  }

  pub fn into_person(self) -> Result<TrackedPerson> {
    let profile: PersonProfile = serde_json::from_str(&self.profile_json)?;
    let last_fix: Option<Fix> = self
      .last_fix_json
      .as_deref()
      .map(serde_json::from_str)
      .transpose()?;
    Ok(TrackedPerson {
      person_id: decode_uuid(&self.person_id)?,
      registered_at: decode_dt(&self.registered_at)?,
      profile,
      digital_id_fingerprint: self.fingerprint,
      last_fix,
      last_report_at: decode_opt_dt(self.last_report_at)?,
      safety_score: self.safety_score,
      status: decode_enum::<PersonStatus>("status", &self.status)?,
    })
  }
}
