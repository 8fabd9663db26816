use serde::{Serialize, Deserialize};

pub type Dimension = f64;

#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub struct Instrument(pub usize);

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Attendee {
  #[serde(flatten)]
  pub position: Position,
  pub tastes: Vec<f64>
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Pillar {
  pub center: [Dimension; 2],
  pub radius: Dimension,
}

impl Pillar {
  pub fn center(&self) -> Position {
    Position { x: self.center[0], y: self.center[1] }
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProblemSpec {
  pub room_height: Dimension,
  pub room_width: Dimension,
  pub stage_height: Dimension,
  pub stage_width: Dimension,
  pub stage_bottom_left: [Dimension; 2],
  pub musicians: Vec<Instrument>,
  pub attendees: Vec<Attendee>,
  #[serde(default)]
  pub pillars: Vec<Pillar>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Deserialize, Serialize)]
pub struct Position {
  pub x: Dimension,
  pub y: Dimension,
}

impl Position {
  pub const fn new(x: Dimension, y: Dimension) -> Self {
    Position { x, y }
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Solution {
  pub placements: Vec<Position>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub volumes: Vec<Dimension>,
}
