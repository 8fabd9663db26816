use std::f64::consts::{PI, TAU};
use crate::models::Position;

pub fn dist2(a: Position, b: Position) -> f64 {
  let dx = a.x - b.x;
  let dy = a.y - b.y;
  dx * dx + dy * dy
}

pub fn dist(a: Position, b: Position) -> f64 {
  dist2(a, b).sqrt()
}

/// Direction of `to` as seen from `from`, in `[-PI, PI]`.
pub fn angle(from: Position, to: Position) -> f64 {
  (to.y - from.y).atan2(to.x - from.x)
}

/// Half of the angle a circle of `radius` subtends at `distance`.
///
/// `None` when the circle contains the viewpoint.
pub fn half_angle(radius: f64, distance: f64) -> Option<f64> {
  if radius >= distance {
    return None;
  }
  Some((radius / distance).asin())
}

/// Wraps an angle into `(-PI, PI]`.
pub fn normalize_angle(mut angle: f64) -> f64 {
  while angle <= -PI {
    angle += TAU;
  }
  while angle > PI {
    angle -= TAU;
  }
  angle
}

/// Parameter of the projection of `p` onto the line `from -> to`; `0` at `from`, `1` at `to`.
pub fn projection_ratio(from: Position, to: Position, p: Position) -> f64 {
  let vx = to.x - from.x;
  let vy = to.y - from.y;
  let wx = p.x - from.x;
  let wy = p.y - from.y;
  (vx * wx + vy * wy) / (vx * vx + vy * vy)
}

pub fn segment_dist2(from: Position, to: Position, p: Position) -> f64 {
  let t = projection_ratio(from, to, p).clamp(0.0, 1.0);
  let closest = Position {
    x: from.x + (to.x - from.x) * t,
    y: from.y + (to.y - from.y) * t,
  };
  dist2(closest, p)
}

fn ccw(p: Position, q: Position, r: Position) -> f64 {
  (q.x - p.x) * (r.y - p.y) - (q.y - p.y) * (r.x - p.x)
}

/// Whether `p` lies inside (or on) the convex polygon `convex`, in either winding.
pub fn in_convex(convex: &[Position], p: Position) -> bool {
  let mut lo = f64::INFINITY;
  let mut hi = f64::NEG_INFINITY;
  for (i, &a) in convex.iter().enumerate() {
    let b = convex[(i + 1) % convex.len()];
    let c = ccw(a, b, p);
    lo = lo.min(c);
    hi = hi.max(c);
  }
  hi <= 0.0 || lo >= 0.0
}

#[cfg(test)]
mod tests {
  use super::*;

  fn p(x: f64, y: f64) -> Position {
    Position::new(x, y)
  }

  #[test]
  fn distances() {
    assert_eq!(dist2(p(0.0, 0.0), p(3.0, 4.0)), 25.0);
    assert_eq!(dist(p(1.0, 1.0), p(4.0, 5.0)), 5.0);
  }

  #[test]
  fn angle_points_along_vector() {
    assert_eq!(angle(p(0.0, 0.0), p(1.0, 0.0)), 0.0);
    assert!((angle(p(0.0, 0.0), p(0.0, 2.0)) - PI / 2.0).abs() < 1e-12);
    assert!((angle(p(1.0, 1.0), p(0.0, 1.0)) - PI).abs() < 1e-12);
  }

  #[test]
  fn half_angle_rejects_enclosing_circle() {
    assert!(half_angle(5.0, 5.0).is_none());
    assert!(half_angle(6.0, 5.0).is_none());
    let a = half_angle(5.0, 10.0).unwrap();
    assert!((a - PI / 6.0).abs() < 1e-12);
  }

  #[test]
  fn normalize_wraps_into_half_open_range() {
    assert!((normalize_angle(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-12);
    assert_eq!(normalize_angle(-PI), PI);
    assert_eq!(normalize_angle(PI), PI);
    assert!((normalize_angle(-5.0 * PI / 2.0) + PI / 2.0).abs() < 1e-12);
  }

  #[test]
  fn projection_ratio_along_segment() {
    let t = projection_ratio(p(0.0, 0.0), p(10.0, 0.0), p(4.0, 3.0));
    assert!((t - 0.4).abs() < 1e-12);
    assert!(projection_ratio(p(0.0, 0.0), p(10.0, 0.0), p(-1.0, 3.0)) < 0.0);
    assert!(projection_ratio(p(0.0, 0.0), p(10.0, 0.0), p(11.0, 3.0)) > 1.0);
  }

  #[test]
  fn segment_distance_clamps_to_endpoints() {
    assert_eq!(segment_dist2(p(0.0, 0.0), p(10.0, 0.0), p(5.0, 3.0)), 9.0);
    assert_eq!(segment_dist2(p(0.0, 0.0), p(10.0, 0.0), p(13.0, 4.0)), 25.0);
  }

  #[test]
  fn convex_membership_either_winding() {
    let square = [p(0.0, 0.0), p(2.0, 0.0), p(2.0, 2.0), p(0.0, 2.0)];
    let reversed: Vec<Position> = square.iter().rev().copied().collect();
    assert!(in_convex(&square, p(1.0, 1.0)));
    assert!(in_convex(&reversed, p(1.0, 1.0)));
    assert!(in_convex(&square, p(2.0, 1.0)));
    assert!(!in_convex(&square, p(3.0, 1.0)));
  }
}
