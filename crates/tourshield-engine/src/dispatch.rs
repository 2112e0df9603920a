//! Responder-unit pool and assignment.
//!
//! The pool sits behind one coordinator-owned mutex. Assignment picks a unit
//! and marks it dispatched under that mutex, so a unit can never be handed to
//! two alerts. Callers hold the alert slot while assigning; the alert slot is
//! always taken before the pool.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tourshield_core::{
  Error, Result,
  alert::{Alert, AlertState, Eta, HistoryEntry, Transition},
  geo::Position,
  unit::{ResponderUnit, UnitStatus},
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{AlertConfig, DispatchConfig};

/// Source of travel distances between two points.
pub trait DistanceProvider: Send + Sync {
  fn distance_m(&self, from: &Position, to: &Position) -> f64;
}

/// Great-circle distance; the default when no routing data is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct StraightLine;

impl DistanceProvider for StraightLine {
  fn distance_m(&self, from: &Position, to: &Position) -> f64 { from.distance_m(to) }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
  pub unit_id:     String,
  pub eta_seconds: f64,
}

pub struct DispatchCoordinator {
  config:   DispatchConfig,
  pool:     Mutex<BTreeMap<String, ResponderUnit>>,
  distance: Arc<dyn DistanceProvider>,
}

impl std::fmt::Debug for DispatchCoordinator {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("DispatchCoordinator")
      .field("config", &self.config)
      .field("units", &self.pool.lock().len())
      .finish()
  }
}

impl DispatchCoordinator {
  pub fn new(config: DispatchConfig, distance: Arc<dyn DistanceProvider>) -> Self {
    Self { config, pool: Mutex::new(BTreeMap::new()), distance }
  }

  fn travel_seconds(&self, from: &Position, to: &Position) -> f64 {
    self.distance.distance_m(from, to) / self.config.unit_speed_mps.max(f64::EPSILON)
  }

  // ── Unit management ───────────────────────────────────────────────────

  pub fn add_unit(&self, unit: ResponderUnit) -> Result<ResponderUnit> {
    let mut pool = self.pool.lock();
    if pool.contains_key(&unit.unit_id) {
      return Err(Error::DuplicateUnit(unit.unit_id));
    }
    info!(unit_id = %unit.unit_id, department = %unit.department, "unit added");
    pool.insert(unit.unit_id.clone(), unit.clone());
    Ok(unit)
  }

  pub fn units(&self) -> Vec<ResponderUnit> { self.pool.lock().values().cloned().collect() }

  pub fn unit(&self, unit_id: &str) -> Result<ResponderUnit> {
    self.pool.lock().get(unit_id).cloned().ok_or_else(|| Error::UnknownUnit(unit_id.to_owned()))
  }

  pub fn report_position(
    &self,
    unit_id: &str,
    position: Position,
    at: DateTime<Utc>,
  ) -> Result<ResponderUnit> {
    let mut pool = self.pool.lock();
    let unit = pool.get_mut(unit_id).ok_or_else(|| Error::UnknownUnit(unit_id.to_owned()))?;
    if at >= unit.position_at {
      unit.position = position;
      unit.position_at = at;
    }
    Ok(unit.clone())
  }

  /// Take a unit off the board or put it back. Dispatched units are managed
  /// by their alert and cannot be toggled.
  pub fn set_busy(&self, unit_id: &str, busy: bool) -> Result<ResponderUnit> {
    let mut pool = self.pool.lock();
    let unit = pool.get_mut(unit_id).ok_or_else(|| Error::UnknownUnit(unit_id.to_owned()))?;
    if unit.status == UnitStatus::Dispatched {
      return Err(Error::UnitDispatched(unit_id.to_owned()));
    }
    unit.status = if busy { UnitStatus::Busy } else { UnitStatus::Available };
    info!(unit_id, status = %unit.status, "unit availability changed");
    Ok(unit.clone())
  }

  // ── Assignment ────────────────────────────────────────────────────────

  /// Assign the closest available unit to `alert` and move it to
  /// `Dispatched`. The alert is untouched on failure.
  pub fn assign(&self, alert: &mut Alert, now: DateTime<Utc>) -> Result<Assignment> {
    let mut pool = self.pool.lock();
    let (eta_seconds, unit_id) = pool
      .values()
      .filter(|u| u.is_available())
      .map(|u| (self.travel_seconds(&u.position, &alert.location), u.unit_id.clone()))
      .min_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
      .ok_or(Error::NoUnitsAvailable)?;

    alert.apply(
      Transition::dispatch(unit_id.clone()).with_note(format!("eta {eta_seconds:.0}s")),
      now,
    )?;
    alert.eta = Some(Eta::new(eta_seconds, now));

    if let Some(unit) = pool.get_mut(&unit_id) {
      unit.status = UnitStatus::Dispatched;
      unit.assigned_alert_id = Some(alert.alert_id);
    }
    info!(alert_id = %alert.alert_id, %unit_id, eta_seconds, "unit dispatched");
    Ok(Assignment { unit_id, eta_seconds })
  }

  /// Return a unit to the pool if it is still serving `alert_id`.
  pub fn release(&self, unit_id: &str, alert_id: Uuid) -> bool {
    let mut pool = self.pool.lock();
    match pool.get_mut(unit_id) {
      Some(unit) if unit.assigned_alert_id == Some(alert_id) => {
        unit.status = UnitStatus::Available;
        unit.assigned_alert_id = None;
        info!(unit_id, %alert_id, "unit released");
        true
      }
      _ => false,
    }
  }

  // ── Progress ──────────────────────────────────────────────────────────

  /// Update the ETA of a dispatched alert and apply every progress stage it
  /// crossed. Each stage gets its own history entry; the returned snapshots
  /// pair each entry with the alert as it was right after it.
  pub fn advance(
    &self,
    alert: &mut Alert,
    alerts: &AlertConfig,
    now: DateTime<Utc>,
  ) -> Result<Vec<(HistoryEntry, Alert)>> {
    let (Some(unit_id), Some(mut eta)) = (alert.assigned_unit_id.clone(), alert.eta.clone())
    else {
      return Ok(Vec::new());
    };
    if now <= eta.updated_at {
      return Ok(Vec::new());
    }

    let fresh_position = {
      let pool = self.pool.lock();
      pool.get(&unit_id).map(|u| (u.position, u.position_at))
    };
    match fresh_position {
      Some((position, at))
        if at > eta.refreshed_at && now - eta.refreshed_at >= self.config.eta_refresh() =>
      {
        eta.refresh(self.travel_seconds(&position, &alert.location), now);
        debug!(alert_id = %alert.alert_id, %unit_id, eta = eta.seconds, "eta refreshed");
      }
      _ => eta.decay(now),
    }
    alert.eta = Some(eta.clone());

    let mut steps = Vec::new();
    let mut stage = alert.stage;
    let mut push = |alert: &mut Alert, to: AlertState| -> Result<()> {
      let entry = alert.apply(Transition::to(to).with_note(format!("eta {:.0}s", eta.seconds)), now)?;
      let entry = entry.clone();
      steps.push((entry, alert.clone()));
      Ok(())
    };

    if stage == AlertState::Dispatched && eta.seconds > 0.0 {
      push(alert, AlertState::EnRoute)?;
      stage = AlertState::EnRoute;
    }
    if stage == AlertState::EnRoute
      && eta.seconds > 0.0
      && eta.remaining_fraction() <= alerts.approach_fraction
    {
      push(alert, AlertState::Approaching)?;
      stage = AlertState::Approaching;
    }
    if eta.seconds <= 0.0 && stage != AlertState::Arrived {
      if stage == AlertState::Dispatched {
        push(alert, AlertState::EnRoute)?;
      }
      push(alert, AlertState::Arrived)?;
      self.release(&unit_id, alert.alert_id);
    }
    Ok(steps)
  }
}

#[cfg(test)]
mod tests {
  use std::thread;

  use chrono::{Duration, TimeZone};
  use tourshield_core::{
    alert::{AlertOrigin, Priority},
    authority::Department,
  };

  use super::*;

  fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 12, 5, 9, 0, 0).unwrap() }

  fn scene() -> Position { Position { lat: 26.1445, lon: 91.7362 } }

  fn alert_at(at: DateTime<Utc>) -> Alert {
    Alert::new(Uuid::new_v4(), AlertOrigin::Manual, Priority::High, scene(), at)
  }

  fn coordinator() -> DispatchCoordinator {
    DispatchCoordinator::new(DispatchConfig::default(), Arc::new(StraightLine))
  }

  fn unit(id: &str, metres: f64) -> ResponderUnit {
    ResponderUnit::new(id, Department::Police, scene().offset_north(metres), t0())
  }

  #[test]
  fn nearest_unit_wins() {
    let dc = coordinator();
    dc.add_unit(unit("U2", 3_000.0)).unwrap();
    dc.add_unit(unit("U1", 1_000.0)).unwrap();
    let mut alert = alert_at(t0());

    let a = dc.assign(&mut alert, t0()).unwrap();
    assert_eq!(a.unit_id, "U1");
    assert!((a.eta_seconds - 1_000.0 / 11.0).abs() < 0.5);
    assert_eq!(alert.state, AlertState::Dispatched);
    assert_eq!(alert.assigned_unit_id.as_deref(), Some("U1"));

    let u1 = dc.unit("U1").unwrap();
    assert_eq!(u1.status, UnitStatus::Dispatched);
    assert_eq!(u1.assigned_alert_id, Some(alert.alert_id));
    assert!(dc.unit("U2").unwrap().is_available());
  }

  #[test]
  fn ties_break_by_unit_id() {
    let dc = coordinator();
    dc.add_unit(unit("B", 500.0)).unwrap();
    dc.add_unit(unit("A", 500.0)).unwrap();
    let mut alert = alert_at(t0());
    assert_eq!(dc.assign(&mut alert, t0()).unwrap().unit_id, "A");
  }

  #[test]
  fn empty_pool_leaves_alert_triggered() {
    let dc = coordinator();
    dc.add_unit(unit("U1", 100.0)).unwrap();
    dc.set_busy("U1", true).unwrap();
    let mut alert = alert_at(t0());
    let before = alert.clone();
    assert!(matches!(dc.assign(&mut alert, t0()), Err(Error::NoUnitsAvailable)));
    assert_eq!(alert, before);
  }

  #[test]
  fn dispatched_unit_cannot_be_toggled() {
    let dc = coordinator();
    dc.add_unit(unit("U1", 100.0)).unwrap();
    let mut alert = alert_at(t0());
    dc.assign(&mut alert, t0()).unwrap();
    assert!(matches!(dc.set_busy("U1", true), Err(Error::UnitDispatched(_))));
    assert!(matches!(dc.add_unit(unit("U1", 1.0)), Err(Error::DuplicateUnit(_))));
  }

  #[test]
  fn advance_walks_through_stages_and_releases() {
    let dc = coordinator();
    let cfg = AlertConfig::default();
    dc.add_unit(unit("U1", 1_100.0)).unwrap();
    let mut alert = alert_at(t0());
    dc.assign(&mut alert, t0()).unwrap();

    // Same instant: nothing moves.
    assert!(dc.advance(&mut alert, &cfg, t0()).unwrap().is_empty());

    let steps = dc.advance(&mut alert, &cfg, t0() + Duration::seconds(1)).unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(alert.state, AlertState::EnRoute);

    let steps = dc.advance(&mut alert, &cfg, t0() + Duration::seconds(85)).unwrap();
    assert_eq!(steps.iter().map(|(e, _)| e.to).collect::<Vec<_>>(), [AlertState::Approaching]);

    let steps = dc.advance(&mut alert, &cfg, t0() + Duration::seconds(200)).unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(alert.state, AlertState::Arrived);
    assert_eq!(alert.assigned_unit_id, None);
    assert!(dc.unit("U1").unwrap().is_available());
  }

  #[test]
  fn one_long_gap_records_every_stage() {
    let dc = coordinator();
    let cfg = AlertConfig::default();
    dc.add_unit(unit("U1", 500.0)).unwrap();
    let mut alert = alert_at(t0());
    dc.assign(&mut alert, t0()).unwrap();

    let steps = dc.advance(&mut alert, &cfg, t0() + Duration::minutes(10)).unwrap();
    let states: Vec<_> = steps.iter().map(|(e, _)| e.to).collect();
    assert_eq!(states, [AlertState::EnRoute, AlertState::Arrived]);
    assert_eq!(steps[0].1.state, AlertState::EnRoute);
    for pair in alert.history.windows(2) {
      assert!(pair[0].at < pair[1].at);
    }
  }

  #[test]
  fn fresh_unit_position_refreshes_eta() {
    let dc = coordinator();
    let cfg = AlertConfig::default();
    dc.add_unit(unit("U1", 11_000.0)).unwrap();
    let mut alert = alert_at(t0());
    dc.assign(&mut alert, t0()).unwrap();

    // Unit reports it is much closer than the decay model assumes.
    let at = t0() + Duration::seconds(40);
    dc.report_position("U1", scene().offset_north(110.0), at).unwrap();
    dc.advance(&mut alert, &cfg, at).unwrap();
    let eta = alert.eta.clone().unwrap();
    assert!((eta.seconds - 10.0).abs() < 0.5, "eta {}", eta.seconds);
    assert_eq!(alert.state, AlertState::Approaching);
  }

  #[test]
  fn concurrent_assignment_never_shares_a_unit() {
    let dc = Arc::new(coordinator());
    for i in 0..5 {
      dc.add_unit(unit(&format!("U{i}"), 100.0 * f64::from(i + 1))).unwrap();
    }

    let handles: Vec<_> = (0..16)
      .map(|_| {
        let dc = Arc::clone(&dc);
        thread::spawn(move || {
          let mut alert = alert_at(t0());
          dc.assign(&mut alert, t0()).ok().map(|a| (a.unit_id, alert.alert_id))
        })
      })
      .collect();

    let won: Vec<_> = handles.into_iter().filter_map(|h| h.join().unwrap()).collect();
    assert_eq!(won.len(), 5);
    let mut units: Vec<_> = won.iter().map(|(u, _)| u.clone()).collect();
    units.sort();
    units.dedup();
    assert_eq!(units.len(), 5);
    for u in dc.units() {
      assert!(u.invariant_holds());
      assert!(won.iter().any(|(id, alert)| *id == u.unit_id && u.assigned_alert_id == Some(*alert)));
    }
  }
}
