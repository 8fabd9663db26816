use std::time::{Duration, Instant};
use anyhow::{anyhow, bail, Context};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, error, info, trace};
use rand::prelude::*;
use rand::rngs::StdRng;
use crate::config::{EngineConfig, SearchConfig};
use crate::engine::{visibility, ConsistencyGuard, Ledger, Move, MoveKind};
use crate::geometry;
use crate::models::Position;
use crate::problem::Problem;

pub mod annealing;

pub use annealing::{Acceptance, Annealing, HillClimb};

#[derive(Clone, Copy, Hash, Ord, PartialOrd, Eq, PartialEq, Debug)]
pub struct MusicianId(pub usize);

/// Rejection-sampling attempts per musician before giving up.
const PLACEMENT_ATTEMPTS: usize = 100_000;

/// Search steps between clock checks.
const STEPS_PER_TICK: usize = 256;

/// Draws a valid placement uniformly at random.
pub fn random_placement(problem: &Problem, config: &EngineConfig, rng: &mut impl Rng) -> anyhow::Result<Vec<Position>> {
  let (left, right, bottom, top) = problem.stage.inner_bounds(config.stage_margin);
  if left > right || bottom > top {
    bail!("stage is narrower than twice the margin of {}", config.stage_margin);
  }
  let mut placements: Vec<Position> = Vec::with_capacity(problem.musician_count());
  for musician in 0..problem.musician_count() {
    let spot = (0..PLACEMENT_ATTEMPTS)
      .map(|_| Position::new(rng.gen_range(left..=right), rng.gen_range(bottom..=top)))
      .find(|&p| problem.check_position(config, musician, p, placements.iter().copied().enumerate()).is_ok())
      .ok_or_else(|| anyhow!("no room for musician {musician} after {PLACEMENT_ATTEMPTS} attempts"))?;
    placements.push(spot);
  }
  Ok(placements)
}

/// Places musicians one at a time on a grid of `step` spacing, each on the free
/// point that maximises `max_taste / d` summed over the attendees it can see.
pub fn greedy_placement(problem: &Problem, config: &EngineConfig, step: f64) -> anyhow::Result<Vec<Position>> {
  let (left, right, bottom, top) = problem.stage.inner_bounds(config.stage_margin);
  if left > right || bottom > top {
    bail!("stage is narrower than twice the margin of {}", config.stage_margin);
  }
  if step.is_nan() || step <= 0.0 {
    bail!("grid step must be positive, got {step}");
  }
  let max_tastes: Vec<f64> = problem.attendees.iter()
    .map(|a| a.tastes.iter().copied().fold(0.0, f64::max))
    .collect();
  let columns = ((right - left) / step).floor() as usize;
  let rows = ((top - bottom) / step).floor() as usize;
  let grid: Vec<Position> = (0..=columns)
    .flat_map(|i| (0..=rows).map(move |j| Position::new(left + i as f64 * step, bottom + j as f64 * step)))
    .collect();

  let mut placements: Vec<Position> = Vec::with_capacity(problem.musician_count());
  for musician in 0..problem.musician_count() {
    let mut best: Option<(f64, Position)> = None;
    for &spot in &grid {
      if problem.check_position(config, musician, spot, placements.iter().copied().enumerate()).is_err() {
        continue;
      }
      placements.push(spot);
      let blocking = visibility::compute_blocking(problem, config, musician, spot, &placements);
      placements.pop();
      let appeal: f64 = blocking.visible()
        .map(|a| max_tastes[a] / geometry::dist(spot, problem.attendees[a].position))
        .sum();
      if best.map_or(true, |(b, _)| appeal > b) {
        best = Some((appeal, spot));
      }
    }
    let (appeal, spot) = best.ok_or_else(|| anyhow!("no free grid point for musician {musician} at step {step}"))?;
    trace!("musician {musician} at ({}, {}) with appeal {appeal:.3}", spot.x, spot.y);
    placements.push(spot);
  }
  Ok(placements)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct KindStats {
  evaluated: u64,
  accepted: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
  pub worker: usize,
  pub placements: Vec<Position>,
  pub volumes: Vec<f64>,
  pub score: f64,
}

/// One worker's search state: its own ledger, guard, oracle and RNG stream.
struct Searcher<'p, A> {
  ledger: Ledger<'p>,
  guard: ConsistencyGuard,
  oracle: A,
  rng: StdRng,
  best: Vec<Position>,
  best_score: f64,
  since_best: usize,
  restart_after: usize,
  stats: [KindStats; MoveKind::ALL.len()],
}

impl<'p, A: Acceptance> Searcher<'p, A> {
  fn new(ledger: Ledger<'p>, oracle: A, rng: StdRng, search: &SearchConfig) -> Self {
    let guard = ConsistencyGuard::new(&ledger, search.strict);
    Searcher {
      best: ledger.placements().to_vec(),
      best_score: ledger.total_score(),
      ledger,
      guard,
      oracle,
      rng,
      since_best: 0,
      restart_after: search.restart_after,
      stats: Default::default(),
    }
  }

  /// Half the time a push of up to `reach` in each axis, otherwise one of the
  /// placement-preserving permutations.
  fn propose(&mut self, reach: f64) -> Move {
    let n = self.ledger.musician_count();
    let musician = self.rng.gen_range(0..n);
    if n < 2 || self.rng.gen_bool(0.5) {
      let at = self.ledger.position(musician);
      let (left, right, bottom, top) = self.ledger.problem().stage.inner_bounds(self.ledger.config().stage_margin);
      let x = num::clamp(at.x + self.rng.gen_range(-reach..=reach), left, right);
      let y = num::clamp(at.y + self.rng.gen_range(-reach..=reach), bottom, top);
      return Move::Push { musician: MusicianId(musician), dx: x - at.x, dy: y - at.y };
    }
    match self.rng.gen_range(0..3) {
      0 => {
        let other = (musician + self.rng.gen_range(1..n)) % n;
        Move::Swap(MusicianId(musician), MusicianId(other))
      }
      1 if n >= 3 => {
        let cycle = rand::seq::index::sample(&mut self.rng, n, 3);
        Move::Rotate(cycle.into_iter().map(MusicianId).collect())
      }
      _ => Move::BestSwap(MusicianId(musician)),
    }
  }

  fn step(&mut self, reach: f64) -> anyhow::Result<()> {
    let mv = self.propose(reach);
    let pending = match self.ledger.evaluate(&mv) {
      Ok(pending) => pending,
      Err(e) => {
        trace!("skipping {mv:?}: {e}");
        return Ok(());
      }
    };

    let current = self.ledger.total_score();
    let stats = &mut self.stats[pending.kind() as usize];
    stats.evaluated += 1;
    if self.oracle.accept(current, current + pending.delta()) {
      stats.accepted += 1;
      self.ledger.commit(pending);
    } else {
      self.ledger.rollback(pending);
    }

    if self.ledger.total_score() > self.best_score {
      self.best.clear();
      self.best.extend_from_slice(self.ledger.placements());
      self.best_score = self.ledger.total_score();
      self.since_best = 0;
    } else {
      self.since_best += 1;
      if self.since_best >= self.restart_after {
        trace!("no progress in {} steps, back to best {}", self.since_best, self.best_score);
        self.ledger.restore(&self.best)?;
        self.since_best = 0;
      }
    }
    Ok(())
  }

  /// Verifies the ledger, then continues from the best placement seen.
  fn finish_phase(&mut self) -> anyhow::Result<()> {
    if !self.guard.verify_and_repair(&mut self.ledger)? {
      // The running total drifted, so the best snapshot's score is suspect too.
      let exact = Ledger::score_placement(self.ledger.problem(), *self.ledger.config(), &self.best)?;
      if exact <= self.ledger.total_score() {
        self.best.clear();
        self.best.extend_from_slice(self.ledger.placements());
      }
    }
    self.best_score = self.ledger.restore(&self.best)?;
    self.guard.mark_verified(&self.ledger);
    self.since_best = 0;

    for kind in MoveKind::ALL {
      let KindStats { evaluated, accepted } = self.stats[kind as usize];
      if evaluated > 0 {
        debug!("{kind:?}: accepted {accepted} of {evaluated} ({:.1}%)", 100.0 * accepted as f64 / evaluated as f64);
      }
    }
    self.stats = Default::default();
    debug!("guard {:?} with {} drift(s) so far", self.guard.state(), self.guard.drifts());
    Ok(())
  }

  fn run(&mut self, worker: usize, search: &SearchConfig, bar: &ProgressBar) -> anyhow::Result<()> {
    let reaches = if search.max_displacements.is_empty() { &[1.0][..] } else { &search.max_displacements[..] };
    for phase in 0..search.phases {
      let reach = reaches[phase % reaches.len()];
      let started = Instant::now();
      self.oracle.begin_phase();
      while started.elapsed() < search.phase_time {
        for _ in 0..STEPS_PER_TICK {
          self.step(reach)?;
        }
        bar.set_position(bar_position(search, phase, started.elapsed()));
        bar.set_message(format!("phase {phase} reach {reach} best {:.0}", self.best_score));
      }
      self.finish_phase()?;
      info!("worker {worker} phase {phase} (reach {reach}): best {}", self.best_score);
    }
    Ok(())
  }
}

fn bar_position(search: &SearchConfig, phase: usize, elapsed: Duration) -> u64 {
  (search.phase_time * phase as u32 + elapsed.min(search.phase_time)).as_millis() as u64
}

fn run_worker(
  problem: &Problem,
  engine: EngineConfig,
  search: &SearchConfig,
  worker: usize,
  initial: Option<Vec<Position>>,
  bar: ProgressBar,
) -> anyhow::Result<SearchOutcome> {
  let mut rng = StdRng::seed_from_u64(search.seed.wrapping_add(worker as u64));
  let start = match initial {
    Some(placements) => placements,
    None => random_placement(problem, &engine, &mut rng)?,
  };
  let ledger = Ledger::initialize(problem, engine, start).context("initial placement is invalid")?;
  info!("worker {worker} starts at {}", ledger.total_score());

  if search.start_temperature > 0.0 {
    let oracle = Annealing::new(
      search.start_temperature,
      search.end_temperature,
      search.phase_time,
      StdRng::seed_from_u64(rng.gen()),
    );
    search_with(Searcher::new(ledger, oracle, rng, search), worker, search, bar)
  } else {
    search_with(Searcher::new(ledger, HillClimb, rng, search), worker, search, bar)
  }
}

fn search_with<A: Acceptance>(
  mut searcher: Searcher<'_, A>,
  worker: usize,
  search: &SearchConfig,
  bar: ProgressBar,
) -> anyhow::Result<SearchOutcome> {
  searcher.run(worker, search, &bar)?;
  bar.finish_with_message(format!("best {:.0}", searcher.best_score));

  Ok(SearchOutcome {
    worker,
    volumes: searcher.ledger.volumes(),
    placements: searcher.best,
    score: searcher.best_score,
  })
}

/// Runs `search.threads` independent searches and returns the best result.
pub fn optimize(
  problem: &Problem,
  engine: EngineConfig,
  search: &SearchConfig,
  initial: Option<Vec<Position>>,
) -> anyhow::Result<SearchOutcome> {
  if let Some(placements) = &initial {
    problem.validate_placement(&engine, placements).context("starting solution is invalid")?;
  }
  if problem.musician_count() == 0 {
    return Ok(SearchOutcome { worker: 0, placements: vec![], volumes: vec![], score: 0.0 });
  }

  let bars = MultiProgress::new();
  if !search.progress {
    bars.set_draw_target(ProgressDrawTarget::hidden());
  }
  let style = ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {msg}")?
    .progress_chars("##-");
  let total = bar_position(search, search.phases, Duration::ZERO);

  let results = crossbeam::scope(|s| {
    let handles: Vec<_> = (0..search.threads.max(1))
      .map(|worker| {
        let bar = bars.add(ProgressBar::new(total));
        bar.set_style(style.clone());
        let initial = initial.clone();
        s.spawn(move |_| run_worker(problem, engine, search, worker, initial, bar))
      })
      .collect();
    handles.into_iter().map(|h| h.join()).collect::<Vec<_>>()
  }).map_err(|_| anyhow!("search scope panicked"))?;

  let mut best: Option<SearchOutcome> = None;
  for (worker, result) in results.into_iter().enumerate() {
    match result {
      Ok(Ok(outcome)) => {
        if best.as_ref().map_or(true, |b| outcome.score > b.score) {
          best = Some(outcome);
        }
      }
      Ok(Err(e)) => error!("worker {worker} failed: {e:#}"),
      Err(_) => error!("worker {worker} panicked"),
    }
  }
  best.ok_or_else(|| anyhow!("every search worker failed"))
}
