use thiserror::Error;
use crate::engine::chain;
use crate::engine::ledger::{Effect, Ledger, Pending, Relocated};
use crate::engine::visibility;
use crate::models::Position;
use crate::optimizer::MusicianId;
use crate::problem::PlacementError;

#[derive(Debug, Clone, PartialEq)]
pub enum Move {
  /// Place one musician at an explicit point.
  Relocate { musician: MusicianId, to: Position },
  /// Displace one musician, pushing anyone it collides with out of the way.
  Push { musician: MusicianId, dx: f64, dy: f64 },
  /// Exchange the positions of two musicians.
  Swap(MusicianId, MusicianId),
  /// Each listed musician moves to the position of the next one; the last
  /// moves to the first's.
  Rotate(Vec<MusicianId>),
  /// The best swap of this musician with any other.
  BestSwap(MusicianId),
}

impl Move {
  pub fn kind(&self) -> MoveKind {
    match self {
      Move::Relocate { .. } => MoveKind::Relocate,
      Move::Push { .. } => MoveKind::Push,
      Move::Swap(..) => MoveKind::Swap,
      Move::Rotate(..) => MoveKind::Rotate,
      Move::BestSwap(..) => MoveKind::BestSwap,
    }
  }
}

#[derive(Debug, Clone, Copy, Hash, Ord, PartialOrd, Eq, PartialEq)]
pub enum MoveKind {
  Relocate,
  Push,
  Swap,
  Rotate,
  BestSwap,
}

impl MoveKind {
  pub const ALL: [MoveKind; 5] = [MoveKind::Relocate, MoveKind::Push, MoveKind::Swap, MoveKind::Rotate, MoveKind::BestSwap];
}

/// Why a candidate was dropped before any scoring happened.
#[derive(Debug, Error, PartialEq)]
pub enum MoveError {
  #[error("musician {0} does not exist")]
  UnknownMusician(usize),
  #[error("move needs at least two distinct musicians")]
  InvalidParticipants,
  #[error(transparent)]
  Placement(#[from] PlacementError),
  #[error("collision chain did not settle within {iterations} iterations")]
  ChainDidNotSettle { iterations: usize },
}

impl<'p> Ledger<'p> {
  pub fn evaluate(&mut self, mv: &Move) -> Result<Pending, MoveError> {
    debug_assert!(!self.unsettled, "evaluating {mv:?} while a relocation is still pending");
    match mv {
      Move::Relocate { musician, to } => {
        let m = self.check_musician(*musician)?;
        self.problem.check_position(&self.config, m, *to, self.placements.iter().copied().enumerate())?;
        Ok(self.evaluate_relocation(MoveKind::Relocate, vec![(m, *to)]))
      }
      Move::Push { musician, dx, dy } => {
        let m = self.check_musician(*musician)?;
        let moved = chain::resolve(self.problem, &self.config, &self.placements, m, *dx, *dy)?;
        if self.config.capabilities.pillars {
          for &(k, p) in &moved {
            self.problem.check_position(&self.config, k, p, std::iter::empty())?;
          }
        }
        Ok(self.evaluate_relocation(MoveKind::Push, moved))
      }
      Move::Swap(a, b) => {
        let (a, b) = (self.check_musician(*a)?, self.check_musician(*b)?);
        if a == b {
          return Err(MoveError::InvalidParticipants);
        }
        Ok(self.evaluate_permutation(MoveKind::Swap, vec![(a, b), (b, a)]))
      }
      Move::Rotate(cycle) => {
        let ids = cycle.iter().map(|&m| self.check_musician(m)).collect::<Result<Vec<_>, _>>()?;
        let distinct = ids.iter().enumerate().all(|(i, m)| !ids[..i].contains(m));
        if ids.len() < 2 || !distinct {
          return Err(MoveError::InvalidParticipants);
        }
        let sigma = (0..ids.len()).map(|i| (ids[i], ids[(i + 1) % ids.len()])).collect();
        Ok(self.evaluate_permutation(MoveKind::Rotate, sigma))
      }
      Move::BestSwap(musician) => {
        let m = self.check_musician(*musician)?;
        let mut best: Option<Pending> = None;
        for other in 0..self.musician_count() {
          if other == m {
            continue;
          }
          let candidate = self.evaluate_permutation(MoveKind::BestSwap, vec![(m, other), (other, m)]);
          if best.as_ref().map_or(true, |b| candidate.delta() > b.delta()) {
            best = Some(candidate);
          }
        }
        best.ok_or(MoveError::InvalidParticipants)
      }
    }
  }

  fn check_musician(&self, musician: MusicianId) -> Result<usize, MoveError> {
    if musician.0 < self.musician_count() {
      Ok(musician.0)
    } else {
      Err(MoveError::UnknownMusician(musician.0))
    }
  }

  /// Old shadows are lifted before new ones are cast; only `0 -> 1` transitions subtract.
  fn evaluate_relocation(&mut self, kind: MoveKind, moved: Vec<(usize, Position)>) -> Pending {
    let n = self.musician_count();
    let attendees = self.problem.attendee_count();
    let problem = self.problem;
    self.begin_scratch();

    let mut next = self.placements.clone();
    for &(m, to) in &moved {
      next[m] = to;
      self.scratch.moving[m] = true;
    }

    for &(m, _) in &moved {
      for viewer in 0..n {
        if self.scratch.moving[viewer] {
          continue;
        }
        let at = self.placements[viewer];
        let instrument = problem.instruments[viewer];
        for &a in &self.shadows[viewer * n + m] {
          let count = &mut self.block_count[viewer * attendees + a as usize];
          *count -= 1;
          if *count == 0 {
            self.scratch.add_impact(viewer, problem.pair_value(at, a as usize, instrument));
          }
        }
      }
    }

    let mut relocated = Vec::with_capacity(moved.len());
    for &(m, to) in &moved {
      let blocking = visibility::compute_blocking(problem, &self.config, m, to, &next);
      let impact = blocking.visible()
        .map(|a| problem.pair_value(to, a, problem.instruments[m]))
        .sum();
      self.scratch.set_impact(m, impact);
      relocated.push(Relocated { musician: m, to, blocking, cast: Vec::new() });
    }

    for r in &mut relocated {
      for viewer in 0..n {
        if self.scratch.moving[viewer] {
          continue;
        }
        let hidden = self.cast_onto(viewer, r.musician, r.to);
        if hidden.is_empty() {
          continue;
        }
        let at = self.placements[viewer];
        let instrument = problem.instruments[viewer];
        for &a in &hidden {
          let count = &mut self.block_count[viewer * attendees + a as usize];
          if *count == 0 {
            self.scratch.add_impact(viewer, -problem.pair_value(at, a as usize, instrument));
          }
          *count += 1;
        }
        r.cast.push((viewer, hidden));
      }
    }

    self.propose_closeness(&moved);
    for &(m, _) in &moved {
      self.scratch.moving[m] = false;
    }
    let (delta, changes) = self.settle();
    self.unsettled = true;
    Pending { kind, delta, changes, effect: Effect::Relocate(relocated) }
  }

  /// `(m, slot)` moves `m` onto `slot`'s position and view.
  fn evaluate_permutation(&mut self, kind: MoveKind, sigma: Vec<(usize, usize)>) -> Pending {
    self.begin_scratch();
    for &(m, slot) in &sigma {
      let impact = self.impact_from_slot(slot, self.instrument(m));
      self.scratch.set_impact(m, impact);
    }
    let moved: Vec<(usize, Position)> = sigma.iter().map(|&(m, slot)| (m, self.placements[slot])).collect();
    self.propose_closeness(&moved);
    let (delta, changes) = self.settle();
    Pending { kind, delta, changes, effect: Effect::Permute(sigma) }
  }
}
