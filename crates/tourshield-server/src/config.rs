//! Server configuration, deserialised from `config.toml` plus
//! `TOURSHIELD_*` environment overrides.
//!
//! ```toml
//! [server]
//! host       = "0.0.0.0"
//! port       = 8080
//! store_path = "~/.local/share/tourshield/archive.db"
//! zones_file = "zones.json"
//!
//! [[operators]]
//! username      = "control-desk"
//! password_hash = "$argon2id$v=19$..."
//! department    = "control"
//!
//! [webhooks]
//! authority = "https://console.example/hooks/tourshield"
//!
//! [engine.alerts]
//! cooldown_secs = 300
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;
use tourshield_api::OperatorAccount;
use tourshield_core::{notification::RecipientClass, zone::ZoneSet};
use tourshield_engine::EngineConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub server:    ServerSection,
  pub operators: Vec<OperatorAccount>,
  pub webhooks:  WebhookConfig,
  pub engine:    EngineConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
  pub host:             String,
  pub port:             u16,
  pub store_path:       PathBuf,
  /// JSON [`ZoneSet`]; the engine starts with no zones when unset.
  pub zones_file:       Option<PathBuf>,
  /// Period of the deadline driver.
  pub tick_interval_ms: u64,
}

impl Default for ServerSection {
  fn default() -> Self {
    Self {
      host:             "127.0.0.1".into(),
      port:             8080,
      store_path:       PathBuf::from("tourshield.db"),
      zones_file:       None,
      tick_interval_ms: 1_000,
    }
  }
}

/// Outbound webhook endpoint per recipient class.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
  pub authority:    Option<String>,
  pub person:       Option<String>,
  pub contact:      Option<String>,
  pub timeout_secs: u64,
}

impl Default for WebhookConfig {
  fn default() -> Self {
    Self { authority: None, person: None, contact: None, timeout_secs: 10 }
  }
}

impl WebhookConfig {
  pub fn targets(&self) -> impl Iterator<Item = (RecipientClass, &str)> {
    [
      (RecipientClass::Authority, &self.authority),
      (RecipientClass::Person, &self.person),
      (RecipientClass::Contact, &self.contact),
    ]
    .into_iter()
    .filter_map(|(class, url)| url.as_deref().map(|u| (class, u)))
  }
}

impl ServerConfig {
  /// Layer the optional file at `path` under `TOURSHIELD_*` variables,
  /// e.g. `TOURSHIELD_SERVER__PORT=9000`.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("TOURSHIELD")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .context("failed to read configuration")?;

    settings
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }

  pub fn store_path(&self) -> PathBuf { expand_tilde(&self.server.store_path) }

  /// The configured zone set, or an empty one.
  pub fn zones(&self) -> anyhow::Result<ZoneSet> {
    let Some(path) = &self.server.zones_file else {
      return Ok(ZoneSet::empty());
    };
    let path = expand_tilde(path);
    let raw = std::fs::read_to_string(&path)
      .with_context(|| format!("failed to read zones file {path:?}"))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid zones file {path:?}"))
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
