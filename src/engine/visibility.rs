//! Angular-sweep visibility from a single viewpoint.

use std::f64::consts::TAU;
use crate::config::EngineConfig;
use crate::geometry;
use crate::models::Position;
use crate::problem::Problem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occluder {
  Musician(usize),
  Pillar(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObstructionInterval {
  pub start: f64,
  pub end: f64,
  pub occluder: Occluder,
}

impl ObstructionInterval {
  /// Panics when the circle contains the viewpoint.
  pub fn cast(viewpoint: Position, center: Position, radius: f64, occluder: Occluder) -> Self {
    let distance = geometry::dist(viewpoint, center);
    let offset = match geometry::half_angle(radius, distance) {
      Some(offset) => offset,
      None => panic!("{occluder:?} at {center:?} overlaps viewpoint {viewpoint:?} (distance {distance}, radius {radius})"),
    };
    let start = geometry::normalize_angle(geometry::angle(viewpoint, center) - offset);
    ObstructionInterval { start, end: start + 2.0 * offset, occluder }
  }
}

/// Attendee directions, each also present at `+2 * PI` so wrapped ranges stay contiguous.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AngularIndex {
  entries: Vec<(f64, u32)>,
}

impl AngularIndex {
  pub fn build(viewpoint: Position, problem: &Problem) -> Self {
    let mut entries = Vec::with_capacity(problem.attendee_count() * 2);
    for (idx, a) in problem.attendees.iter().enumerate() {
      let angle = geometry::angle(viewpoint, a.position);
      entries.push((angle, idx as u32));
      entries.push((angle + TAU, idx as u32));
    }
    entries.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    AngularIndex { entries }
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Attendees whose direction falls in `[interval.start, interval.end)`.
  pub fn shadowed<'a>(&'a self, interval: &ObstructionInterval) -> impl Iterator<Item = u32> + 'a {
    let first = self.entries.partition_point(|e| e.0 < interval.start);
    let end = interval.end;
    self.entries[first..].iter()
      .take_while(move |e| e.0 < end)
      .map(|e| e.1)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Blocking {
  pub index: AngularIndex,
  /// Per musician, the attendees that musician shadows from this viewpoint.
  pub shadows: Vec<Vec<u32>>,
  /// Per attendee, how many occluders hide it.
  pub block_count: Vec<u32>,
}

impl Blocking {
  pub fn visible(&self) -> impl Iterator<Item = usize> + '_ {
    self.block_count.iter()
      .enumerate()
      .filter(|(_, &count)| count == 0)
      .map(|(idx, _)| idx)
  }
}

/// `positions[viewer]` is ignored; the viewer stands at `at`.
pub fn compute_blocking(
  problem: &Problem,
  config: &EngineConfig,
  viewer: usize,
  at: Position,
  positions: &[Position],
) -> Blocking {
  let index = AngularIndex::build(at, problem);
  let mut shadows = vec![Vec::new(); positions.len()];
  let mut block_count = vec![0u32; problem.attendee_count()];

  for (k, &center) in positions.iter().enumerate() {
    if k == viewer {
      continue;
    }
    let interval = ObstructionInterval::cast(at, center, config.block_radius, Occluder::Musician(k));
    for attendee in index.shadowed(&interval) {
      shadows[k].push(attendee);
      block_count[attendee as usize] += 1;
    }
  }

  if config.capabilities.pillars {
    for (p, pillar) in problem.pillars.iter().enumerate() {
      let center = pillar.center();
      let interval = ObstructionInterval::cast(at, center, pillar.radius, Occluder::Pillar(p));
      for attendee in index.shadowed(&interval) {
        let attendee = attendee as usize;
        if !problem.is_pillar_effective(p, attendee) {
          continue;
        }
        let t = geometry::projection_ratio(at, problem.attendees[attendee].position, center);
        if t > 0.0 && t < 1.0 {
          block_count[attendee] += 1;
        }
      }
    }
  }

  Blocking { index, shadows, block_count }
}

#[cfg(test)]
mod tests {
  use std::f64::consts::PI;
  use super::*;
  use crate::config::Capabilities;
  use crate::models::Pillar;
  use crate::problem::tests::{attendee, spec};

  fn deg(d: f64) -> f64 {
    d.to_radians()
  }

  fn at_angle(d: f64, r: f64) -> Position {
    Position::new(r * deg(d).cos(), r * deg(d).sin())
  }

  #[test]
  fn wrapped_interval_blocks_both_sides_of_the_seam() {
    let attendees = vec![
      attendee(at_angle(179.0, 100.0).x, at_angle(179.0, 100.0).y, &[1.0]),
      attendee(at_angle(-179.0, 100.0).x, at_angle(-179.0, 100.0).y, &[1.0]),
      attendee(at_angle(170.0, 100.0).x, at_angle(170.0, 100.0).y, &[1.0]),
      attendee(at_angle(0.0, 100.0).x, at_angle(0.0, 100.0).y, &[1.0]),
    ];
    let problem = Problem::new(spec(&[0], attendees, vec![])).unwrap();
    let index = AngularIndex::build(Position::new(0.0, 0.0), &problem);
    assert_eq!(index.len(), 8);

    let interval = ObstructionInterval {
      start: deg(175.0),
      end: deg(185.0),
      occluder: Occluder::Musician(1),
    };
    let mut hidden: Vec<u32> = index.shadowed(&interval).collect();
    hidden.sort();
    assert_eq!(hidden, vec![0, 1]);
  }

  #[test]
  fn musician_on_the_seam_blocks_both_sides() {
    let attendees = [179.0, -179.0, 170.0, 0.0].iter()
      .map(|&d| attendee(at_angle(d, 100.0).x, at_angle(d, 100.0).y, &[1.0]))
      .collect();
    let problem = Problem::new(spec(&[0, 0], attendees, vec![])).unwrap();
    let config = EngineConfig::default();
    // Half-width asin(5 / d) is exactly 5 degrees.
    let occluder = Position::new(-5.0 / deg(5.0).sin(), 0.0);
    let positions = [Position::new(0.0, 0.0), occluder];

    let blocking = compute_blocking(&problem, &config, 0, positions[0], &positions);
    let mut hidden = blocking.shadows[1].clone();
    hidden.sort();
    assert_eq!(hidden, vec![0, 1]);
    assert_eq!(blocking.block_count, vec![1, 1, 0, 0]);
    assert_eq!(blocking.visible().collect::<Vec<_>>(), vec![2, 3]);
  }

  #[test]
  fn cast_normalizes_start_above_minus_pi() {
    let viewpoint = Position::new(0.0, 0.0);
    // An occluder straight along -x lands at +PI; one just below the seam wraps.
    let interval = ObstructionInterval::cast(viewpoint, Position::new(-100.0, -1.0), 5.0, Occluder::Musician(0));
    assert!(interval.start > -PI && interval.start <= PI);
    assert!(interval.end > PI);
    assert!((interval.end - interval.start - 2.0 * (0.05f64).asin()).abs() < 1e-3);
  }

  #[test]
  #[should_panic]
  fn overlapping_occluder_is_fatal() {
    ObstructionInterval::cast(Position::new(0.0, 0.0), Position::new(3.0, 0.0), 5.0, Occluder::Musician(1));
  }

  #[test]
  fn interval_is_half_open() {
    let problem = Problem::new(spec(&[0], vec![
      attendee(100.0, 0.0, &[1.0]),
      attendee(0.0, 100.0, &[1.0]),
    ], vec![])).unwrap();
    let index = AngularIndex::build(Position::new(0.0, 0.0), &problem);
    let upto = ObstructionInterval { start: -0.1, end: 0.0, occluder: Occluder::Musician(0) };
    assert_eq!(index.shadowed(&upto).count(), 0);
    let from = ObstructionInterval { start: 0.0, end: 0.1, occluder: Occluder::Musician(0) };
    assert_eq!(index.shadowed(&from).collect::<Vec<_>>(), vec![0]);
  }

  #[test]
  fn nearer_musician_shadows_attendee_behind_it() {
    // Viewer at (500, 420), blocker at (500, 450), attendee straight above the stage.
    let problem = Problem::new(spec(&[0, 1], vec![
      attendee(500.0, 900.0, &[1.0, 1.0]),
      attendee(900.0, 420.0, &[1.0, 1.0]),
    ], vec![])).unwrap();
    let config = EngineConfig::default();
    let positions = [Position::new(500.0, 420.0), Position::new(500.0, 450.0)];

    let from_viewer = compute_blocking(&problem, &config, 0, positions[0], &positions);
    assert_eq!(from_viewer.shadows[1], vec![0]);
    assert_eq!(from_viewer.block_count, vec![1, 0]);
    assert_eq!(from_viewer.visible().collect::<Vec<_>>(), vec![1]);

    // The blocker itself sees both attendees: occlusion is not symmetric.
    let from_blocker = compute_blocking(&problem, &config, 1, positions[1], &positions);
    assert!(from_blocker.shadows[0].is_empty());
    assert_eq!(from_blocker.block_count, vec![0, 0]);
  }

  #[test]
  fn pillar_blocks_only_when_between() {
    let problem = Problem::new(spec(&[0], vec![
      attendee(500.0, 900.0, &[1.0]),
      attendee(500.0, 100.0, &[1.0]),
    ], vec![Pillar { center: [500.0, 700.0], radius: 20.0 }])).unwrap();
    let viewer = Position::new(500.0, 500.0);

    let with_pillars = EngineConfig::with_capabilities(Capabilities::FULL);
    let blocking = compute_blocking(&problem, &with_pillars, 0, viewer, &[viewer]);
    assert_eq!(blocking.block_count, vec![1, 0]);

    let without = EngineConfig::default();
    let blocking = compute_blocking(&problem, &without, 0, viewer, &[viewer]);
    assert_eq!(blocking.block_count, vec![0, 0]);
  }

  #[test]
  fn pillar_behind_attendee_does_not_block() {
    let problem = Problem::new(spec(&[0], vec![
      attendee(500.0, 700.0, &[1.0]),
    ], vec![Pillar { center: [500.0, 800.0], radius: 20.0 }])).unwrap();
    let viewer = Position::new(500.0, 500.0);
    let config = EngineConfig::with_capabilities(Capabilities::FULL);
    let blocking = compute_blocking(&problem, &config, 0, viewer, &[viewer]);
    assert_eq!(blocking.block_count, vec![0]);
  }
}
