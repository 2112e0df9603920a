//! Safety score computation.
//!
//! Scores move toward a target derived from the zone a person is in, the
//! local time, and how often their surroundings recently got riskier. The
//! step toward the target is smoothed and bounded so a single report never
//! swings the score wildly.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use tourshield_core::{
  alert::Priority,
  zone::{RiskLevel, TimeWindow, ZoneMatch},
};
use tracing::debug;

use crate::config::ScoringConfig;

/// Per-person scoring memory, kept alongside the person in its slot.
#[derive(Debug, Clone, Default)]
pub struct ScoreState {
  last_risk:        Option<RiskLevel>,
  escalations:      VecDeque<DateTime<Utc>>,
  /// Zone-set version the current score was computed against.
  pub zone_version: Option<u64>,
  pub last_zone:    Option<ZoneMatch>,
}

impl ScoreState {
  /// Zone-risk increases still inside the volatility window.
  pub fn recent_escalations(&self) -> usize { self.escalations.len() }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreUpdate {
  pub old:    u8,
  pub new:    u8,
  pub target: f64,
}

impl ScoreUpdate {
  pub fn changed(&self) -> bool { self.old != self.new }
}

#[derive(Debug, Clone)]
pub struct ScoreEngine {
  config: ScoringConfig,
  night:  TimeWindow,
}

impl ScoreEngine {
  pub fn new(config: ScoringConfig) -> Self {
    let night =
      TimeWindow { start_hour: config.night_start_hour, end_hour: config.night_end_hour };
    Self { config, night }
  }

  pub fn config(&self) -> &ScoringConfig { &self.config }

  fn base(&self, risk: RiskLevel) -> f64 {
    match risk {
      RiskLevel::Safe => self.config.base_safe,
      RiskLevel::Moderate => self.config.base_moderate,
      RiskLevel::High => self.config.base_high,
    }
  }

  /// Record the observation in `state` and return the score it pulls toward.
  pub fn target(
    &self,
    state: &mut ScoreState,
    zone: &ZoneMatch,
    local_hour: u32,
    at: DateTime<Utc>,
  ) -> f64 {
    if state.last_risk.is_some_and(|prev| zone.risk > prev) {
      state.escalations.push_back(at);
    }
    state.last_risk = Some(zone.risk);

    let window_start = at - Duration::seconds(self.config.volatility_window_secs);
    while state.escalations.front().is_some_and(|t| *t < window_start) {
      state.escalations.pop_front();
    }

    let night = if zone.risk == RiskLevel::High && self.night.contains_hour(local_hour) {
      self.config.night_penalty
    } else {
      0.0
    };
    let volatility = self.config.escalation_penalty * state.escalations.len() as f64;

    (self.base(zone.risk) - night - volatility).max(0.0)
  }

  /// Recompute a score after an accepted report (or a zone-set change).
  pub fn recompute(
    &self,
    state: &mut ScoreState,
    current: u8,
    zone: ZoneMatch,
    local_hour: u32,
    at: DateTime<Utc>,
  ) -> ScoreUpdate {
    let target = self.target(state, &zone, local_hour, at);
    let new = self.step(current, target);
    debug!(zone = %zone.zone_id, risk = %zone.risk, target, old = current, new, "score recomputed");
    state.zone_version = Some(zone.version);
    state.last_zone = Some(zone);
    ScoreUpdate { old: current, new, target }
  }

  /// Pull an offline person's score down toward the floor. Scores already
  /// at or below the floor are left alone.
  pub fn decay(&self, current: u8) -> ScoreUpdate {
    let floor = self.config.offline_floor;
    let target = f64::from(floor);
    let new = if current > floor { self.step(current, target).max(floor) } else { current };
    ScoreUpdate { old: current, new, target }
  }

  /// Move part of the way toward `target`. Fractions round toward the
  /// target so a score one point away still arrives.
  fn step(&self, current: u8, target: f64) -> u8 {
    let current = f64::from(current);
    let delta = (self.config.smoothing * (target - current))
      .clamp(-self.config.max_step, self.config.max_step);
    let next = if delta < 0.0 {
      (current + delta).floor().max(target.floor())
    } else {
      (current + delta).ceil().min(target.ceil())
    };
    next.clamp(0.0, 100.0) as u8
  }

  pub fn is_critical(&self, score: u8) -> bool { score < self.config.critical_threshold }

  /// Priority of an alert raised automatically at `score`.
  pub fn priority_for(&self, score: u8) -> Priority {
    if score < self.config.severe_threshold { Priority::High } else { Priority::Medium }
  }
}
