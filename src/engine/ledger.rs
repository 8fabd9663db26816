//! Incrementally maintained score state.

use std::mem;
use thiserror::Error;
use crate::config::EngineConfig;
use crate::engine::moves::MoveKind;
use crate::engine::visibility::{self, AngularIndex, Blocking, ObstructionInterval, Occluder};
use crate::geometry::dist;
use crate::models::{Instrument, Position};
use crate::problem::{PlacementError, Problem};

#[derive(Debug, Error, PartialEq)]
pub enum VolumeError {
  #[error("expected {expected} volumes, got {actual}")]
  WrongLength { expected: usize, actual: usize },
  #[error("volume {volume} of musician {musician} is outside 0..={max}")]
  OutOfRange { musician: usize, volume: f64, max: f64 },
}

/// Per-kind count of committed moves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveTally([u64; MoveKind::ALL.len()]);

impl MoveTally {
  pub fn record(&mut self, kind: MoveKind) {
    self.0[kind as usize] += 1;
  }

  pub fn get(&self, kind: MoveKind) -> u64 {
    self.0[kind as usize]
  }

  pub fn kinds(&self) -> impl Iterator<Item = MoveKind> + '_ {
    MoveKind::ALL.into_iter().filter(|&k| self.get(k) > 0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Change {
  pub musician: usize,
  pub impact: f64,
  pub closeness: f64,
  pub contribution: f64,
}

#[derive(Debug)]
pub(crate) struct Relocated {
  pub musician: usize,
  pub to: Position,
  pub blocking: Blocking,
  pub cast: Vec<(usize, Vec<u32>)>,
}

#[derive(Debug)]
pub(crate) enum Effect {
  Relocate(Vec<Relocated>),
  /// `(musician, slot)`: the musician takes over the position (and the whole
  /// geometric view) of `slot`.
  Permute(Vec<(usize, usize)>),
}

/// An evaluated move. Relocations have already touched the block counts, so the
/// token must reach `commit` or `rollback` before the next `evaluate`.
#[must_use = "a pending move must be committed or rolled back"]
#[derive(Debug)]
pub struct Pending {
  pub(crate) kind: MoveKind,
  pub(crate) delta: f64,
  pub(crate) changes: Vec<Change>,
  pub(crate) effect: Effect,
}

impl Pending {
  pub fn kind(&self) -> MoveKind {
    self.kind
  }

  pub fn delta(&self) -> f64 {
    self.delta
  }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Scratch {
  pub impact: Vec<f64>,
  pub closeness: Vec<f64>,
  touched: Vec<usize>,
  mark: Vec<bool>,
  pub moving: Vec<bool>,
}

impl Scratch {
  fn new(n: usize) -> Self {
    Scratch {
      impact: vec![0.0; n],
      closeness: vec![1.0; n],
      touched: Vec::new(),
      mark: vec![false; n],
      moving: vec![false; n],
    }
  }

  pub fn touch(&mut self, musician: usize) {
    if !self.mark[musician] {
      self.mark[musician] = true;
      self.touched.push(musician);
    }
  }

  pub fn add_impact(&mut self, musician: usize, value: f64) {
    self.impact[musician] += value;
    self.touch(musician);
  }

  pub fn set_impact(&mut self, musician: usize, value: f64) {
    self.impact[musician] = value;
    self.touch(musician);
  }

  pub fn set_closeness(&mut self, musician: usize, value: f64) {
    self.closeness[musician] = value;
    self.touch(musician);
  }
}

pub struct Ledger<'p> {
  pub(crate) problem: &'p Problem,
  pub(crate) config: EngineConfig,
  pub(crate) placements: Vec<Position>,
  pub(crate) angles: Vec<AngularIndex>,
  /// `shadows[viewer * n + occluder]`
  pub(crate) shadows: Vec<Vec<u32>>,
  /// `block_count[viewer * attendees + attendee]`
  pub(crate) block_count: Vec<u32>,
  pub(crate) impact: Vec<f64>,
  pub(crate) closeness: Vec<f64>,
  pub(crate) contribution: Vec<f64>,
  pub(crate) total: f64,
  pub(crate) scratch: Scratch,
  /// Set while a relocation's speculative block counts await commit or rollback.
  pub(crate) unsettled: bool,
  tally: MoveTally,
}

impl<'p> Ledger<'p> {
  /// Validates `placements` and builds the ledger from scratch.
  pub fn initialize(problem: &'p Problem, config: EngineConfig, placements: Vec<Position>) -> Result<Self, PlacementError> {
    problem.validate_placement(&config, &placements)?;
    let n = problem.musician_count();
    let mut ledger = Ledger {
      problem,
      config,
      placements,
      angles: Vec::new(),
      shadows: Vec::new(),
      block_count: Vec::new(),
      impact: vec![0.0; n],
      closeness: vec![1.0; n],
      contribution: vec![0.0; n],
      total: 0.0,
      scratch: Scratch::new(n),
      unsettled: false,
      tally: MoveTally::default(),
    };
    ledger.full_rebuild();
    Ok(ledger)
  }

  pub fn score_placement(problem: &Problem, config: EngineConfig, placements: &[Position]) -> Result<f64, PlacementError> {
    Ledger::initialize(problem, config, placements.to_vec()).map(|l| l.total_score())
  }

  pub fn full_rebuild(&mut self) -> f64 {
    let n = self.musician_count();
    let attendees = self.problem.attendee_count();
    self.angles.clear();
    self.shadows.clear();
    self.shadows.reserve(n * n);
    self.block_count.clear();
    self.block_count.reserve(n * attendees);
    self.unsettled = false;

    for m in 0..n {
      let blocking = visibility::compute_blocking(self.problem, &self.config, m, self.placements[m], &self.placements);
      self.impact[m] = blocking.visible()
        .map(|a| self.problem.pair_value(self.placements[m], a, self.instrument(m)))
        .sum();
      self.angles.push(blocking.index);
      self.shadows.extend(blocking.shadows);
      self.block_count.extend_from_slice(&blocking.block_count);
    }

    for m in 0..n {
      self.closeness[m] = self.closeness_at(m, self.placements[m], |j| self.placements[j]);
    }

    self.total = 0.0;
    for m in 0..n {
      self.contribution[m] = self.musician_score(self.impact[m], self.closeness[m]);
      self.total += self.contribution[m];
    }
    self.total
  }

  pub fn restore(&mut self, placements: &[Position]) -> Result<f64, PlacementError> {
    self.problem.validate_placement(&self.config, placements)?;
    self.placements.clear();
    self.placements.extend_from_slice(placements);
    Ok(self.full_rebuild())
  }

  pub fn problem(&self) -> &'p Problem {
    self.problem
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  pub fn musician_count(&self) -> usize {
    self.placements.len()
  }

  pub fn placements(&self) -> &[Position] {
    &self.placements
  }

  pub fn position(&self, musician: usize) -> Position {
    self.placements[musician]
  }

  pub fn instrument(&self, musician: usize) -> Instrument {
    self.problem.instruments[musician]
  }

  pub fn impact_of(&self, musician: usize) -> f64 {
    self.impact[musician]
  }

  pub fn closeness_of(&self, musician: usize) -> f64 {
    self.closeness[musician]
  }

  pub fn contribution_of(&self, musician: usize) -> f64 {
    self.contribution[musician]
  }

  pub fn total_score(&self) -> f64 {
    self.total
  }

  pub fn block_count(&self, musician: usize, attendee: usize) -> u32 {
    self.block_count[musician * self.problem.attendee_count() + attendee]
  }

  pub fn is_visible(&self, musician: usize, attendee: usize) -> bool {
    self.block_count(musician, attendee) == 0
  }

  /// Attendees `occluder` hides from `viewer`.
  pub fn shadowed_by(&self, viewer: usize, occluder: usize) -> &[u32] {
    &self.shadows[viewer * self.musician_count() + occluder]
  }

  /// Volume for each musician in an exported solution: full when its impact
  /// is non-negative, silent otherwise.
  pub fn volumes(&self) -> Vec<f64> {
    self.impact.iter()
      .map(|&i| if !self.config.capabilities.volumes { 1.0 } else if i >= 0.0 { self.config.max_volume } else { 0.0 })
      .collect()
  }

  /// Score of the current placement played at the given volumes rather than
  /// the optimal ones. Without the volume rule the volumes are only checked.
  pub fn score_with_volumes(&self, volumes: &[f64]) -> Result<f64, VolumeError> {
    if volumes.len() != self.musician_count() {
      return Err(VolumeError::WrongLength { expected: self.musician_count(), actual: volumes.len() });
    }
    let max = self.config.max_volume;
    if let Some((musician, &volume)) = volumes.iter().enumerate().find(|(_, v)| !(0.0..=max).contains(*v)) {
      return Err(VolumeError::OutOfRange { musician, volume, max });
    }
    if !self.config.capabilities.volumes {
      return Ok(self.total);
    }
    Ok(volumes.iter()
      .enumerate()
      .map(|(m, &v)| (v * self.closeness[m] * self.impact[m]).ceil())
      .sum())
  }

  pub fn take_tally(&mut self) -> MoveTally {
    mem::take(&mut self.tally)
  }

  pub(crate) fn musician_score(&self, impact: f64, closeness: f64) -> f64 {
    if self.config.capabilities.volumes {
      (self.config.max_volume * closeness * impact.max(0.0)).ceil()
    } else {
      (closeness * impact).ceil()
    }
  }

  /// `1 + sum(1 / d)` over the other musicians sharing `musician`'s instrument,
  /// with `musician` at `at` and everyone else at `position_of(j)`.
  pub(crate) fn closeness_at(&self, musician: usize, at: Position, position_of: impl Fn(usize) -> Position) -> f64 {
    if !self.config.capabilities.closeness {
      return 1.0;
    }
    1.0 + self.problem.group(self.instrument(musician)).iter()
      .filter(|&&j| j != musician)
      .map(|&j| 1.0 / dist(at, position_of(j)))
      .sum::<f64>()
  }

  pub(crate) fn impact_from_slot(&self, slot: usize, instrument: Instrument) -> f64 {
    let attendees = self.problem.attendee_count();
    let at = self.placements[slot];
    self.block_count[slot * attendees..(slot + 1) * attendees].iter()
      .enumerate()
      .filter(|(_, &c)| c == 0)
      .map(|(a, _)| self.problem.pair_value(at, a, instrument))
      .sum()
  }

  pub(crate) fn begin_scratch(&mut self) {
    let Scratch { impact, closeness, .. } = &mut self.scratch;
    impact.copy_from_slice(&self.impact);
    closeness.copy_from_slice(&self.closeness);
  }

  pub(crate) fn propose_closeness(&mut self, moved: &[(usize, Position)]) {
    if !self.config.capabilities.closeness {
      return;
    }
    let new_position = |j: usize| {
      moved.iter().find(|&&(m, _)| m == j).map(|&(_, p)| p).unwrap_or(self.placements[j])
    };
    let mut updates = Vec::new();
    for &(m, to) in moved {
      let from = self.placements[m];
      for &j in self.problem.group(self.instrument(m)) {
        if j == m || moved.iter().any(|&(k, _)| k == j) {
          continue;
        }
        let here = self.placements[j];
        updates.push((j, 1.0 / dist(here, to) - 1.0 / dist(here, from)));
      }
    }
    for (j, diff) in updates {
      let value = self.scratch.closeness[j] + diff;
      self.scratch.set_closeness(j, value);
    }
    for &(m, to) in moved {
      let value = self.closeness_at(m, to, new_position);
      self.scratch.set_closeness(m, value);
    }
  }

  pub(crate) fn settle(&mut self) -> (f64, Vec<Change>) {
    let touched = mem::take(&mut self.scratch.touched);
    let mut delta = 0.0;
    let mut changes = Vec::with_capacity(touched.len());
    for &j in &touched {
      let impact = self.scratch.impact[j];
      let closeness = self.scratch.closeness[j];
      let contribution = self.musician_score(impact, closeness);
      delta += contribution - self.contribution[j];
      changes.push(Change { musician: j, impact, closeness, contribution });
      self.scratch.mark[j] = false;
    }
    self.scratch.touched = touched;
    self.scratch.touched.clear();
    (delta, changes)
  }

  pub fn commit(&mut self, pending: Pending) {
    let Pending { kind, delta, changes, effect } = pending;
    self.unsettled = false;
    match effect {
      Effect::Relocate(moved) => self.commit_relocation(moved),
      Effect::Permute(sigma) => self.apply_permutation(&sigma),
    }
    for c in changes {
      self.impact[c.musician] = c.impact;
      self.closeness[c.musician] = c.closeness;
      self.contribution[c.musician] = c.contribution;
    }
    self.total += delta;
    self.tally.record(kind);
  }

  pub fn rollback(&mut self, pending: Pending) {
    self.unsettled = false;
    let Effect::Relocate(moved) = pending.effect else {
      return;
    };
    let n = self.musician_count();
    let attendees = self.problem.attendee_count();
    for r in &moved {
      self.scratch.moving[r.musician] = true;
    }
    for r in &moved {
      for (viewer, list) in &r.cast {
        for &a in list {
          self.block_count[viewer * attendees + a as usize] -= 1;
        }
      }
      for viewer in 0..n {
        if self.scratch.moving[viewer] {
          continue;
        }
        for &a in &self.shadows[viewer * n + r.musician] {
          self.block_count[viewer * attendees + a as usize] += 1;
        }
      }
    }
    for r in &moved {
      self.scratch.moving[r.musician] = false;
    }
  }

  fn commit_relocation(&mut self, moved: Vec<Relocated>) {
    let n = self.musician_count();
    let attendees = self.problem.attendee_count();
    for r in &moved {
      self.scratch.moving[r.musician] = true;
    }
    for r in moved {
      let m = r.musician;
      let Blocking { index, shadows, block_count } = r.blocking;
      self.placements[m] = r.to;
      self.angles[m] = index;
      for (k, list) in shadows.into_iter().enumerate() {
        self.shadows[m * n + k] = list;
      }
      self.block_count[m * attendees..(m + 1) * attendees].copy_from_slice(&block_count);
      for viewer in 0..n {
        if !self.scratch.moving[viewer] {
          self.shadows[viewer * n + m].clear();
        }
      }
      for (viewer, list) in r.cast {
        self.shadows[viewer * n + m] = list;
      }
    }
    self.scratch.moving.iter_mut().for_each(|f| *f = false);
  }

  /// Afterwards `shadows[x][y]` is what `shadows[slot(x)][slot(y)]` was.
  fn apply_permutation(&mut self, sigma: &[(usize, usize)]) {
    let n = self.musician_count();
    let attendees = self.problem.attendee_count();

    let old_placements: Vec<Position> = sigma.iter().map(|&(_, s)| self.placements[s]).collect();
    let old_angles: Vec<AngularIndex> = sigma.iter().map(|&(_, s)| mem::take(&mut self.angles[s])).collect();
    let old_counts: Vec<Vec<u32>> = sigma.iter()
      .map(|&(_, s)| self.block_count[s * attendees..(s + 1) * attendees].to_vec())
      .collect();
    for (((&(m, _), p), angles), counts) in sigma.iter().zip(old_placements).zip(old_angles).zip(old_counts) {
      self.placements[m] = p;
      self.angles[m] = angles;
      self.block_count[m * attendees..(m + 1) * attendees].copy_from_slice(&counts);
    }

    let old_rows: Vec<Vec<Vec<u32>>> = sigma.iter()
      .map(|&(_, s)| (0..n).map(|k| mem::take(&mut self.shadows[s * n + k])).collect())
      .collect();
    for (&(m, _), row) in sigma.iter().zip(old_rows) {
      for (k, list) in row.into_iter().enumerate() {
        self.shadows[m * n + k] = list;
      }
    }
    for viewer in 0..n {
      let old_cols: Vec<Vec<u32>> = sigma.iter()
        .map(|&(_, s)| mem::take(&mut self.shadows[viewer * n + s]))
        .collect();
      for (&(m, _), list) in sigma.iter().zip(old_cols) {
        self.shadows[viewer * n + m] = list;
      }
    }
  }

  pub(crate) fn cast_onto(&self, viewer: usize, occluder: usize, at: Position) -> Vec<u32> {
    let interval = ObstructionInterval::cast(self.placements[viewer], at, self.config.block_radius, Occluder::Musician(occluder));
    self.angles[viewer].shadowed(&interval).collect()
  }
}
