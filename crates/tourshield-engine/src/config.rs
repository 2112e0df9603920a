//! Engine tunables.
//!
//! Every section deserializes with defaults, so a config file only needs to
//! name the values it changes. Durations are whole seconds unless the field
//! name says otherwise.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tourshield_core::alert::Priority;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub ingest:   IngestConfig,
  pub scoring:  ScoringConfig,
  pub alerts:   AlertConfig,
  pub dispatch: DispatchConfig,
  pub fanout:   FanoutConfig,
}

// ─── Ingest ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
  pub out_of_order_tolerance_secs:    i64,
  pub stale_after_secs:               i64,
  pub offline_after_secs:             i64,
  pub retention_after_departure_secs: i64,
}

impl Default for IngestConfig {
  fn default() -> Self {
    Self {
      out_of_order_tolerance_secs:    5,
      stale_after_secs:               120,
      offline_after_secs:             600,
      retention_after_departure_secs: 86_400,
    }
  }
}

impl IngestConfig {
  pub fn tolerance(&self) -> Duration { Duration::seconds(self.out_of_order_tolerance_secs) }

  pub fn stale_after(&self) -> Duration { Duration::seconds(self.stale_after_secs) }

  pub fn offline_after(&self) -> Duration { Duration::seconds(self.offline_after_secs) }

  pub fn retention(&self) -> Duration { Duration::seconds(self.retention_after_departure_secs) }
}

// ─── Scoring ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
  /// Score a person starts from at registration.
  pub initial_score:          u8,
  pub base_safe:              f64,
  pub base_moderate:          f64,
  pub base_high:              f64,
  /// Subtracted in high-risk zones during the night window.
  pub night_penalty:          f64,
  pub night_start_hour:       u8,
  pub night_end_hour:         u8,
  /// Subtracted per zone-risk escalation inside the volatility window.
  pub escalation_penalty:     f64,
  pub volatility_window_secs: i64,
  pub max_step:               f64,
  pub smoothing:              f64,
  pub critical_threshold:     u8,
  pub severe_threshold:       u8,
  /// Where the score of an offline person decays to.
  pub offline_floor:          u8,
}

impl Default for ScoringConfig {
  fn default() -> Self {
    Self {
      initial_score:          85,
      base_safe:              90.0,
      base_moderate:          60.0,
      base_high:              25.0,
      night_penalty:          10.0,
      night_start_hour:       20,
      night_end_hour:         6,
      escalation_penalty:     5.0,
      volatility_window_secs: 900,
      max_step:               15.0,
      smoothing:              0.5,
      critical_threshold:     40,
      severe_threshold:       20,
      offline_floor:          30,
    }
  }
}

// ─── Alerts ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
  /// Auto triggers this soon after the person's last alert are folded in.
  pub cooldown_secs:       i64,
  pub dispatch_retry_secs: i64,
  pub sla_high_secs:       i64,
  pub sla_medium_secs:     i64,
  pub sla_low_secs:        i64,
  /// Remaining ETA share at which a unit counts as approaching.
  pub approach_fraction:   f64,
  /// How long a resolved alert stays live before it is archived.
  pub archive_after_secs:  i64,
}

impl Default for AlertConfig {
  fn default() -> Self {
    Self {
      cooldown_secs:       300,
      dispatch_retry_secs: 15,
      sla_high_secs:       600,
      sla_medium_secs:     1_200,
      sla_low_secs:        1_800,
      approach_fraction:   0.2,
      archive_after_secs:  86_400,
    }
  }
}

impl AlertConfig {
  pub fn cooldown(&self) -> Duration { Duration::seconds(self.cooldown_secs) }

  pub fn dispatch_retry(&self) -> Duration { Duration::seconds(self.dispatch_retry_secs) }

  pub fn archive_after(&self) -> Duration { Duration::seconds(self.archive_after_secs) }

  /// Time an alert of `priority` may go without a unit on scene.
  pub fn sla(&self, priority: Priority) -> Duration {
    Duration::seconds(match priority {
      Priority::High => self.sla_high_secs,
      Priority::Medium => self.sla_medium_secs,
      Priority::Low => self.sla_low_secs,
    })
  }
}

// ─── Dispatch ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
  /// Assumed average unit speed for straight-line travel estimates.
  pub unit_speed_mps:   f64,
  pub eta_refresh_secs: i64,
}

impl Default for DispatchConfig {
  fn default() -> Self { Self { unit_speed_mps: 11.0, eta_refresh_secs: 30 } }
}

impl DispatchConfig {
  pub fn eta_refresh(&self) -> Duration { Duration::seconds(self.eta_refresh_secs) }
}

// ─── Fan-out ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
  pub base_backoff_ms:       u64,
  pub max_backoff_ms:        u64,
  pub max_attempts:          u32,
  /// How long a settled ledger entry is kept to absorb republished events.
  pub ledger_retention_secs: i64,
  /// Newest abandoned deliveries kept for the delivery-health view.
  pub max_failures:          usize,
}

impl Default for FanoutConfig {
  fn default() -> Self {
    Self {
      base_backoff_ms:       2_000,
      max_backoff_ms:        60_000,
      max_attempts:          5,
      ledger_retention_secs: 3_600,
      max_failures:          1_000,
    }
  }
}

impl FanoutConfig {
  pub fn ledger_retention(&self) -> Duration { Duration::seconds(self.ledger_retention_secs) }

  /// Delay before retrying after failed attempt number `attempt` (1-based).
  pub fn backoff(&self, attempt: u32) -> std::time::Duration {
    let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    let ms = self.base_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms);
    std::time::Duration::from_millis(ms)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_config_keeps_defaults() {
    let cfg: EngineConfig = serde_json::from_str(
      r#"{ "scoring": { "critical_threshold": 50 }, "fanout": { "max_attempts": 3 } }"#,
    )
    .unwrap();
    assert_eq!(cfg.scoring.critical_threshold, 50);
    assert_eq!(cfg.scoring.initial_score, 85);
    assert_eq!(cfg.fanout.max_attempts, 3);
    assert_eq!(cfg.alerts, AlertConfig::default());
  }

  #[test]
  fn backoff_doubles_up_to_cap() {
    let cfg = FanoutConfig::default();
    let secs: Vec<u64> = (1..=7).map(|n| cfg.backoff(n).as_secs()).collect();
    assert_eq!(secs, [2, 4, 8, 16, 32, 60, 60]);
    assert_eq!(cfg.backoff(200).as_secs(), 60);
  }

  #[test]
  fn sla_by_priority() {
    let cfg = AlertConfig::default();
    assert_eq!(cfg.sla(Priority::High), Duration::minutes(10));
    assert_eq!(cfg.sla(Priority::Medium), Duration::minutes(20));
    assert_eq!(cfg.sla(Priority::Low), Duration::minutes(30));
  }
}
