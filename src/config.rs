use std::time::Duration;
use crate::models::ProblemSpec;

/// Which scoring rules the engine models.
///
/// The plain variant (everything off) scores `ceil(1e6 * taste / d^2)` summed over
/// unblocked pairs. The extended problem family adds pillars, per-musician volume
/// and the same-instrument closeness bonus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
  pub pillars: bool,
  pub volumes: bool,
  pub closeness: bool,
}

impl Capabilities {
  pub const PLAIN: Capabilities = Capabilities { pillars: false, volumes: false, closeness: false };
  pub const FULL: Capabilities = Capabilities { pillars: true, volumes: true, closeness: true };

  /// Problems that declare pillars belong to the extended family, which also
  /// scores closeness.
  pub fn for_problem(spec: &ProblemSpec) -> Self {
    let extended = !spec.pillars.is_empty();
    Capabilities {
      pillars: extended,
      volumes: true,
      closeness: extended,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
  pub capabilities: Capabilities,
  /// Musicians may never be closer than this to one another.
  pub min_separation: f64,
  /// Distance a musician must keep from the stage edge.
  pub stage_margin: f64,
  /// Radius of the body a musician occludes with.
  pub block_radius: f64,
  pub max_volume: f64,
  pub chain_iteration_cap: usize,
  /// Relative difference between the running total and an exact rebuild that
  /// counts as drift.
  pub drift_tolerance: f64,
}

impl Default for EngineConfig {
  fn default() -> Self {
    EngineConfig {
      capabilities: Capabilities::PLAIN,
      min_separation: 10.0,
      stage_margin: 10.0,
      block_radius: 5.0,
      max_volume: 10.0,
      chain_iteration_cap: 1000,
      drift_tolerance: 0.01,
    }
  }
}

impl EngineConfig {
  pub fn with_capabilities(capabilities: Capabilities) -> Self {
    EngineConfig { capabilities, ..Default::default() }
  }
}

/// Knobs of the outer search loop.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
  pub phases: usize,
  pub phase_time: Duration,
  pub threads: usize,
  pub seed: u64,
  pub start_temperature: f64,
  pub end_temperature: f64,
  /// Maximum push radius, cycled phase by phase.
  pub max_displacements: Vec<f64>,
  /// Iterations without a new best before the search jumps back to it.
  pub restart_after: usize,
  pub strict: bool,
  pub progress: bool,
}

impl Default for SearchConfig {
  fn default() -> Self {
    SearchConfig {
      phases: 4,
      phase_time: Duration::from_secs(30),
      threads: 1,
      seed: 0,
      start_temperature: 100_000.0,
      end_temperature: 1e-9,
      max_displacements: vec![100.0, 50.0, 10.0, 1.0],
      restart_after: 10_000,
      strict: cfg!(debug_assertions),
      progress: true,
    }
  }
}
