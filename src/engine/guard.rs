//! Periodic exact re-verification of the ledger's running total.

use log::{info, warn};
use thiserror::Error;
use crate::engine::ledger::{Ledger, MoveTally};
use crate::engine::moves::MoveKind;
use crate::models::Position;

#[derive(Debug, Error, PartialEq)]
pub enum GuardError {
  #[error("ledger drifted twice in a row while {kind:?} moves were being committed")]
  RepeatedDrift { kind: MoveKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
  Trusted,
  Verifying,
}

#[derive(Debug, Clone)]
pub struct ConsistencyGuard {
  state: GuardState,
  tolerance: f64,
  strict: bool,
  checkpoint: Vec<Position>,
  checkpoint_score: f64,
  last_drift: Option<MoveTally>,
  drifts: usize,
}

impl ConsistencyGuard {
  /// Starts trusting the ledger as it is now.
  pub fn new(ledger: &Ledger, strict: bool) -> Self {
    ConsistencyGuard {
      state: GuardState::Trusted,
      tolerance: ledger.config().drift_tolerance,
      strict,
      checkpoint: ledger.placements().to_vec(),
      checkpoint_score: ledger.total_score(),
      last_drift: None,
      drifts: 0,
    }
  }

  pub fn state(&self) -> GuardState {
    self.state
  }

  pub fn checkpoint(&self) -> &[Position] {
    &self.checkpoint
  }

  pub fn checkpoint_score(&self) -> f64 {
    self.checkpoint_score
  }

  pub fn drifts(&self) -> usize {
    self.drifts
  }

  /// Only valid right after a rebuild.
  pub fn mark_verified(&mut self, ledger: &Ledger) {
    self.checkpoint.clear();
    self.checkpoint.extend_from_slice(ledger.placements());
    self.checkpoint_score = ledger.total_score();
  }

  /// `Ok(false)` when the running total drifted and the ledger was rolled back to
  /// the checkpoint.
  pub fn verify_and_repair(&mut self, ledger: &mut Ledger) -> Result<bool, GuardError> {
    self.state = GuardState::Verifying;
    let tally = ledger.take_tally();
    let claimed = ledger.total_score();
    let exact = match Ledger::score_placement(ledger.problem(), *ledger.config(), ledger.placements()) {
      Ok(score) => score,
      Err(e) => {
        warn!("ledger placement no longer valid: {e}");
        f64::NAN
      }
    };

    let drift = (claimed - exact).abs() / exact.abs().max(1.0);
    if drift.is_finite() && drift <= self.tolerance {
      self.mark_verified(ledger);
      self.last_drift = None;
      self.state = GuardState::Trusted;
      return Ok(true);
    }

    self.drifts += 1;
    warn!(
      "score drift detected: ledger {claimed} vs exact {exact}; rolling back to checkpoint {}",
      self.checkpoint_score
    );
    let repeated = self.last_drift
      .and_then(|previous| tally.kinds().find(|&k| previous.get(k) > 0));
    self.last_drift = Some(tally);

    // The checkpoint was verified once already, so a rebuild cannot fail.
    if let Err(e) = ledger.restore(&self.checkpoint) {
      warn!("checkpoint rejected on restore: {e}");
    }
    self.checkpoint_score = ledger.total_score();
    info!("restored checkpoint with score {}", self.checkpoint_score);
    self.state = GuardState::Trusted;

    match repeated {
      Some(kind) if self.strict => Err(GuardError::RepeatedDrift { kind }),
      _ => Ok(false),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{Capabilities, EngineConfig};
  use crate::engine::moves::Move;
  use crate::engine::tests::random_layout;
  use crate::optimizer::MusicianId;

  #[test]
  fn consistent_ledger_advances_checkpoint() {
    let (problem, placements) = random_layout(3, 8, 30, 2, false);
    let mut ledger = Ledger::initialize(&problem, EngineConfig::default(), placements).unwrap();
    let mut guard = ConsistencyGuard::new(&ledger, true);

    let pending = ledger.evaluate(&Move::Swap(MusicianId(0), MusicianId(1))).unwrap();
    ledger.commit(pending);
    assert_eq!(guard.verify_and_repair(&mut ledger), Ok(true));
    assert_eq!(guard.state(), GuardState::Trusted);
    assert_eq!(guard.checkpoint(), ledger.placements());
    assert_eq!(guard.checkpoint_score(), ledger.total_score());
    assert_eq!(guard.drifts(), 0);
  }

  #[test]
  fn drift_rolls_back_to_checkpoint() {
    let (problem, placements) = random_layout(4, 8, 30, 2, false);
    let config = EngineConfig::with_capabilities(Capabilities::PLAIN);
    let mut ledger = Ledger::initialize(&problem, config, placements.clone()).unwrap();
    let mut guard = ConsistencyGuard::new(&ledger, false);
    let verified = ledger.total_score();

    let pending = ledger.evaluate(&Move::Swap(MusicianId(2), MusicianId(5))).unwrap();
    ledger.commit(pending);
    ledger.total += verified.abs() + 1_000_000.0;

    assert_eq!(guard.verify_and_repair(&mut ledger), Ok(false));
    assert_eq!(ledger.placements(), placements.as_slice());
    assert_eq!(ledger.total_score(), verified);
    assert_eq!(guard.drifts(), 1);
  }

  #[test]
  fn strict_mode_halts_on_repeated_drift() {
    let (problem, placements) = random_layout(5, 8, 30, 2, false);
    let mut ledger = Ledger::initialize(&problem, EngineConfig::default(), placements).unwrap();
    let mut guard = ConsistencyGuard::new(&ledger, true);

    for round in 0..2 {
      let pending = ledger.evaluate(&Move::Swap(MusicianId(0), MusicianId(3))).unwrap();
      ledger.commit(pending);
      ledger.total += 1e12;
      let verdict = guard.verify_and_repair(&mut ledger);
      if round == 0 {
        assert_eq!(verdict, Ok(false));
      } else {
        assert_eq!(verdict, Err(GuardError::RepeatedDrift { kind: MoveKind::Swap }));
      }
    }
  }
}
