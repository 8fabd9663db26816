//! Collision-chain resolution for pushes.

use std::collections::{BTreeMap, VecDeque};
use crate::config::EngineConfig;
use crate::engine::moves::MoveError;
use crate::geometry::{dist, dist2};
use crate::models::Position;
use crate::problem::{PlacementError, Problem};

const SLACK: f64 = 1e-6;

/// Returns the final position of every musician the push displaced, in index
/// order, or why the push cannot be carried out.
pub fn resolve(
  problem: &Problem,
  config: &EngineConfig,
  placements: &[Position],
  musician: usize,
  dx: f64,
  dy: f64,
) -> Result<Vec<(usize, Position)>, MoveError> {
  let sep = config.min_separation;
  let mut working = placements.to_vec();
  let mut moved = BTreeMap::new();
  let mut queue = VecDeque::from([(musician, dx, dy)]);
  let mut iterations = 0;

  while let Some((m, dx, dy)) = queue.pop_front() {
    iterations += 1;
    if iterations > config.chain_iteration_cap {
      return Err(MoveError::ChainDidNotSettle { iterations: config.chain_iteration_cap });
    }

    let p = &mut working[m];
    p.x += dx;
    p.y += dy;
    let at = *p;
    if !problem.stage.contains(at, config.stage_margin) {
      return Err(PlacementError::OutOfStage { musician: m, position: at }.into());
    }
    moved.insert(m, at);

    for (other, &q) in working.iter().enumerate() {
      if other == m || dist2(q, at) >= sep * sep {
        continue;
      }
      let d = dist(q, at);
      let (ux, uy) = if d < 1e-12 {
        (std::f64::consts::FRAC_1_SQRT_2, std::f64::consts::FRAC_1_SQRT_2)
      } else {
        ((q.x - at.x) / d, (q.y - at.y) / d)
      };
      let push = sep - d + SLACK;
      queue.push_back((other, ux * push, uy * push));
    }
  }

  Ok(moved.into_iter().collect())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::problem::tests::spec;

  fn problem() -> Problem {
    Problem::new(spec(&[0, 0, 0, 0], vec![], vec![])).unwrap()
  }

  fn assert_separated(placements: &[Position], moved: &[(usize, Position)]) {
    let mut after = placements.to_vec();
    for &(m, p) in moved {
      after[m] = p;
    }
    for i in 0..after.len() {
      for j in i + 1..after.len() {
        assert!(dist(after[i], after[j]) >= 10.0, "{i} and {j} overlap: {:?}", after);
      }
    }
  }

  #[test]
  fn free_push_moves_only_the_origin() {
    let problem = problem();
    let placements = vec![
      Position::new(450.0, 450.0), Position::new(500.0, 500.0),
      Position::new(550.0, 550.0), Position::new(450.0, 550.0),
    ];
    let moved = resolve(&problem, &EngineConfig::default(), &placements, 0, 5.0, -3.0).unwrap();
    assert_eq!(moved, vec![(0, Position::new(455.0, 447.0))]);
  }

  #[test]
  fn push_propagates_down_a_line() {
    let problem = problem();
    let placements = vec![
      Position::new(450.0, 500.0), Position::new(461.0, 500.0),
      Position::new(472.0, 500.0), Position::new(560.0, 500.0),
    ];
    let moved = resolve(&problem, &EngineConfig::default(), &placements, 0, 5.0, 0.0).unwrap();
    let ids: Vec<usize> = moved.iter().map(|&(m, _)| m).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    assert_separated(&placements, &moved);
    // Everyone in the chain moved along +x only.
    for &(m, p) in &moved {
      assert_eq!(p.y, 500.0);
      assert!(p.x > placements[m].x);
    }
  }

  #[test]
  fn push_off_the_stage_fails() {
    let problem = problem();
    let placements = vec![
      Position::new(575.0, 500.0), Position::new(586.0, 500.0),
      Position::new(450.0, 450.0), Position::new(450.0, 550.0),
    ];
    let err = resolve(&problem, &EngineConfig::default(), &placements, 0, 5.0, 0.0).unwrap_err();
    assert!(matches!(err, MoveError::Placement(PlacementError::OutOfStage { musician: 1, .. })));
  }

  #[test]
  fn exhausted_cap_is_reported() {
    let problem = problem();
    let placements = vec![
      Position::new(450.0, 500.0), Position::new(461.0, 500.0),
      Position::new(472.0, 500.0), Position::new(560.0, 500.0),
    ];
    let config = EngineConfig { chain_iteration_cap: 2, ..Default::default() };
    let err = resolve(&problem, &config, &placements, 0, 5.0, 0.0).unwrap_err();
    assert_eq!(err, MoveError::ChainDidNotSettle { iterations: 2 });
  }
}
