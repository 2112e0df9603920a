//! Error type for `tourshield-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] tourshield_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A text column held a value no enum variant answers to.
  #[error("unknown {column} value: {value:?}")]
  UnknownVariant { column: &'static str, value: String },

  #[error("alert {0} is already archived")]
  AlreadyArchived(uuid::Uuid),

  /// The stored header disagrees with what its history replays to.
  #[error("archived alert {0} does not match its history")]
  HistoryMismatch(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
