use multimap::MultiMap;
use thiserror::Error;
use crate::config::EngineConfig;
use crate::geometry::{self, dist2};
use crate::models::{Attendee, Dimension, Instrument, Pillar, Position, ProblemSpec};

#[derive(Debug, Error, PartialEq)]
pub enum ProblemError {
  #[error("stage has no area ({width}x{height})")]
  EmptyStage { width: Dimension, height: Dimension },
  #[error("attendee {attendee} has {len} tastes but instrument {instrument} is used")]
  MissingTaste { attendee: usize, len: usize, instrument: usize },
  #[error("pillar {pillar} has negative radius {radius}")]
  NegativeRadius { pillar: usize, radius: Dimension },
}

#[derive(Debug, Error, PartialEq)]
pub enum PlacementError {
  #[error("expected {expected} placements, got {actual}")]
  WrongLength { expected: usize, actual: usize },
  #[error("musician {musician} at {position:?} is outside the stage margin")]
  OutOfStage { musician: usize, position: Position },
  #[error("musicians {first} and {second} are closer than the minimum separation")]
  TooClose { first: usize, second: usize },
  #[error("musician {musician} stands inside pillar {pillar}")]
  InsidePillar { musician: usize, pillar: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stage {
  pub bottom_left: Position,
  pub width: Dimension,
  pub height: Dimension,
}

impl Stage {
  pub fn corners(&self) -> [Position; 4] {
    let Position { x, y } = self.bottom_left;
    [
      Position::new(x, y),
      Position::new(x + self.width, y),
      Position::new(x + self.width, y + self.height),
      Position::new(x, y + self.height),
    ]
  }

  /// Whether `p` keeps at least `margin` from every stage edge.
  pub fn contains(&self, p: Position, margin: Dimension) -> bool {
    let Position { x, y } = self.bottom_left;
    p.x >= x + margin
      && p.x <= x + self.width - margin
      && p.y >= y + margin
      && p.y <= y + self.height - margin
  }

  /// `(left, right, bottom, top)` of the region musicians may occupy.
  pub fn inner_bounds(&self, margin: Dimension) -> (Dimension, Dimension, Dimension, Dimension) {
    let Position { x, y } = self.bottom_left;
    (x + margin, x + self.width - margin, y + margin, y + self.height - margin)
  }
}

/// A pillar can only hide an attendee from a musician if it touches the convex
/// hull of that attendee and the stage rectangle.
pub fn is_pillar_effective(attendee: Position, stage: &Stage, pillar: &Pillar) -> bool {
  let center = pillar.center();
  let [bl, br, tr, tl] = stage.corners();
  if geometry::in_convex(&[attendee, bl, tr], center)
    || geometry::in_convex(&[attendee, br, tl], center)
    || geometry::in_convex(&[bl, br, tr, tl], center) {
    return true;
  }
  let r2 = pillar.radius * pillar.radius;
  let edges = [
    (attendee, bl), (attendee, br), (attendee, tr), (attendee, tl),
    (bl, br), (br, tr), (tr, tl), (tl, bl),
  ];
  edges.iter().any(|&(a, b)| geometry::segment_dist2(a, b, center) < r2)
}

/// The immutable problem, indexed for the engine.
#[derive(Debug, Clone)]
pub struct Problem {
  pub stage: Stage,
  pub instruments: Vec<Instrument>,
  pub attendees: Vec<Attendee>,
  pub pillars: Vec<Pillar>,
  groups: MultiMap<Instrument, usize>,
  pillar_effective: Vec<bool>,
}

impl Problem {
  pub fn new(spec: ProblemSpec) -> Result<Self, ProblemError> {
    if spec.stage_width <= 0.0 || spec.stage_height <= 0.0 {
      return Err(ProblemError::EmptyStage { width: spec.stage_width, height: spec.stage_height });
    }
    if let Some(max) = spec.musicians.iter().map(|i| i.0).max() {
      for (idx, attendee) in spec.attendees.iter().enumerate() {
        if attendee.tastes.len() <= max {
          return Err(ProblemError::MissingTaste { attendee: idx, len: attendee.tastes.len(), instrument: max });
        }
      }
    }
    for (idx, pillar) in spec.pillars.iter().enumerate() {
      if pillar.radius < 0.0 {
        return Err(ProblemError::NegativeRadius { pillar: idx, radius: pillar.radius });
      }
    }

    let stage = Stage {
      bottom_left: Position::new(spec.stage_bottom_left[0], spec.stage_bottom_left[1]),
      width: spec.stage_width,
      height: spec.stage_height,
    };

    let mut groups = MultiMap::new();
    for (idx, &instrument) in spec.musicians.iter().enumerate() {
      groups.insert(instrument, idx);
    }

    let pillar_effective = spec.pillars.iter()
      .flat_map(|pillar| spec.attendees.iter().map(move |a| (pillar, a)))
      .map(|(pillar, a)| is_pillar_effective(a.position, &stage, pillar))
      .collect();

    Ok(Problem {
      stage,
      instruments: spec.musicians,
      attendees: spec.attendees,
      pillars: spec.pillars,
      groups,
      pillar_effective,
    })
  }

  pub fn musician_count(&self) -> usize {
    self.instruments.len()
  }

  pub fn attendee_count(&self) -> usize {
    self.attendees.len()
  }

  /// Musicians playing `instrument`, in index order.
  pub fn group(&self, instrument: Instrument) -> &[usize] {
    self.groups.get_vec(&instrument).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn is_pillar_effective(&self, pillar: usize, attendee: usize) -> bool {
    self.pillar_effective[pillar * self.attendees.len() + attendee]
  }

  /// Unscaled gain of one musician-attendee pair: `ceil(1e6 * taste / d^2)`.
  #[inline]
  pub fn pair_value(&self, at: Position, attendee: usize, instrument: Instrument) -> f64 {
    let a = &self.attendees[attendee];
    (1_000_000.0 * a.tastes[instrument.0] / dist2(at, a.position)).ceil()
  }

  /// Checks a single candidate position against the stage, the other musicians
  /// and (when modelled) the pillars. `others` yields `(index, position)` pairs.
  pub fn check_position(
    &self,
    config: &EngineConfig,
    musician: usize,
    at: Position,
    others: impl IntoIterator<Item = (usize, Position)>,
  ) -> Result<(), PlacementError> {
    if !self.stage.contains(at, config.stage_margin) {
      return Err(PlacementError::OutOfStage { musician, position: at });
    }
    let sep2 = config.min_separation * config.min_separation;
    for (other, p) in others {
      if other != musician && dist2(p, at) < sep2 {
        return Err(PlacementError::TooClose { first: musician, second: other });
      }
    }
    if config.capabilities.pillars {
      for (idx, pillar) in self.pillars.iter().enumerate() {
        if dist2(pillar.center(), at) <= pillar.radius * pillar.radius {
          return Err(PlacementError::InsidePillar { musician, pillar: idx });
        }
      }
    }
    Ok(())
  }

  pub fn validate_placement(&self, config: &EngineConfig, placements: &[Position]) -> Result<(), PlacementError> {
    if placements.len() != self.musician_count() {
      return Err(PlacementError::WrongLength { expected: self.musician_count(), actual: placements.len() });
    }
    for (idx, &p) in placements.iter().enumerate() {
      self.check_position(config, idx, p, placements.iter().copied().enumerate().skip(idx + 1))?;
    }
    Ok(())
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;

  pub(crate) fn attendee(x: f64, y: f64, tastes: &[f64]) -> Attendee {
    Attendee { position: Position::new(x, y), tastes: tastes.to_vec() }
  }

  pub(crate) fn spec(musicians: &[usize], attendees: Vec<Attendee>, pillars: Vec<Pillar>) -> ProblemSpec {
    ProblemSpec {
      room_height: 1000.0,
      room_width: 1000.0,
      stage_height: 200.0,
      stage_width: 200.0,
      stage_bottom_left: [400.0, 400.0],
      musicians: musicians.iter().map(|&i| Instrument(i)).collect(),
      attendees,
      pillars,
    }
  }

  #[test]
  fn rejects_short_taste_vectors() {
    let err = Problem::new(spec(&[0, 2], vec![attendee(10.0, 10.0, &[1.0, 2.0])], vec![])).unwrap_err();
    assert_eq!(err, ProblemError::MissingTaste { attendee: 0, len: 2, instrument: 2 });
  }

  #[test]
  fn groups_musicians_by_instrument() {
    let problem = Problem::new(spec(&[1, 0, 1, 1], vec![], vec![])).unwrap();
    assert_eq!(problem.group(Instrument(1)), &[0, 2, 3]);
    assert_eq!(problem.group(Instrument(0)), &[1]);
    assert!(problem.group(Instrument(7)).is_empty());
  }

  #[test]
  fn pair_value_rounds_up() {
    let problem = Problem::new(spec(&[0], vec![attendee(0.0, 0.0, &[3.0])], vec![])).unwrap();
    // 1e6 * 3 / 7^2 = 61224.49
    assert_eq!(problem.pair_value(Position::new(7.0, 0.0), 0, Instrument(0)), 61225.0);
  }

  #[test]
  fn stage_margin_is_inclusive() {
    let stage = Stage { bottom_left: Position::new(0.0, 0.0), width: 100.0, height: 50.0 };
    assert!(stage.contains(Position::new(10.0, 10.0), 10.0));
    assert!(stage.contains(Position::new(90.0, 40.0), 10.0));
    assert!(!stage.contains(Position::new(9.99, 20.0), 10.0));
    assert!(!stage.contains(Position::new(50.0, 40.01), 10.0));
  }

  #[test]
  fn pillar_behind_attendee_is_ineffective() {
    let stage = Stage { bottom_left: Position::new(400.0, 400.0), width: 200.0, height: 200.0 };
    let attendee = Position::new(500.0, 100.0);
    let behind = Pillar { center: [500.0, 20.0], radius: 10.0 };
    let between = Pillar { center: [500.0, 250.0], radius: 10.0 };
    let beside = Pillar { center: [100.0, 300.0], radius: 10.0 };
    let grazing = Pillar { center: [436.0, 245.0], radius: 20.0 };
    let near_miss = Pillar { center: [436.0, 245.0], radius: 10.0 };
    assert!(!is_pillar_effective(attendee, &stage, &behind));
    assert!(is_pillar_effective(attendee, &stage, &between));
    assert!(!is_pillar_effective(attendee, &stage, &beside));
    assert!(is_pillar_effective(attendee, &stage, &grazing));
    assert!(!is_pillar_effective(attendee, &stage, &near_miss));
  }

  #[test]
  fn validates_placements() {
    let problem = Problem::new(spec(&[0, 0], vec![], vec![Pillar { center: [450.0, 450.0], radius: 5.0 }])).unwrap();
    let config = EngineConfig::with_capabilities(crate::config::Capabilities::FULL);
    let ok = [Position::new(420.0, 420.0), Position::new(430.0, 420.0)];
    assert_eq!(problem.validate_placement(&config, &ok), Ok(()));

    let close = [Position::new(420.0, 420.0), Position::new(429.0, 420.0)];
    assert_eq!(problem.validate_placement(&config, &close), Err(PlacementError::TooClose { first: 0, second: 1 }));

    let out = [Position::new(405.0, 420.0), Position::new(430.0, 420.0)];
    assert!(matches!(problem.validate_placement(&config, &out), Err(PlacementError::OutOfStage { musician: 0, .. })));

    let pillar = [Position::new(420.0, 420.0), Position::new(452.0, 450.0)];
    assert_eq!(problem.validate_placement(&config, &pillar), Err(PlacementError::InsidePillar { musician: 1, pillar: 0 }));

    assert!(matches!(problem.validate_placement(&config, &ok[..1]), Err(PlacementError::WrongLength { .. })));
  }
}
