use std::time::{Duration, Instant};
use rand::Rng;
use rand::rngs::StdRng;

/// Decides whether the search moves from a state scoring `current` to one
/// scoring `candidate`.
pub trait Acceptance {
  fn accept(&mut self, current: f64, candidate: f64) -> bool;

  /// Called when a new search phase starts.
  fn begin_phase(&mut self) {}
}

impl<F: FnMut(f64, f64) -> bool> Acceptance for F {
  fn accept(&mut self, current: f64, candidate: f64) -> bool {
    self(current, candidate)
  }
}

/// Accepts only non-worsening moves.
#[derive(Debug, Clone, Copy, Default)]
pub struct HillClimb;

impl Acceptance for HillClimb {
  fn accept(&mut self, current: f64, candidate: f64) -> bool {
    candidate >= current
  }
}

/// Simulated annealing with a temperature that falls linearly from `start` to
/// `end` over `duration`.
#[derive(Debug, Clone)]
pub struct Annealing {
  start: f64,
  end: f64,
  began: Instant,
  duration: Duration,
  rng: StdRng,
}

impl Annealing {
  pub fn new(start: f64, end: f64, duration: Duration, rng: StdRng) -> Self {
    Annealing { start, end, began: Instant::now(), duration, rng }
  }

  pub fn temperature(&self) -> f64 {
    self.temperature_at(self.began.elapsed())
  }

  fn temperature_at(&self, elapsed: Duration) -> f64 {
    if self.duration.is_zero() {
      return self.end;
    }
    let progress = num::clamp(elapsed.as_secs_f64() / self.duration.as_secs_f64(), 0.0, 1.0);
    self.start + (self.end - self.start) * progress
  }
}

impl Acceptance for Annealing {
  fn accept(&mut self, current: f64, candidate: f64) -> bool {
    if candidate >= current {
      return true;
    }
    let temperature = self.temperature();
    if temperature <= 0.0 {
      return false;
    }
    ((candidate - current) / temperature).exp() > self.rng.gen::<f64>()
  }

  fn begin_phase(&mut self) {
    self.began = Instant::now();
  }
}
