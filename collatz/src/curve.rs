use std::cmp::max;
use std::fmt;
use std::ops::{Add, Mul, Sub};

use num::Integer;
use rayon::prelude::*;
use tracing::debug;

use crate::error::{Error, Result};
use crate::sequence::{trim, BatchMatrix, TrimmedColumn};

/// Every curve starts here, with its first segment running along y = 1.
pub const ANCHOR: Point = Point { x: 0.0, y: 1.0 };

/// A point in curve space. Kept as a plain pair of floats so it serializes straight into the
/// records the renderer reads.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Add<Point> for Point {
    type Output = Point;
    #[inline]
    fn add(self, _rhs: Point) -> Point {
        Point {
            x: self.x + _rhs.x,
            y: self.y + _rhs.y,
        }
    }
}

impl Sub<Point> for Point {
    type Output = Point;
    #[inline]
    fn sub(self, _rhs: Point) -> Point {
        Point {
            x: self.x - _rhs.x,
            y: self.y - _rhs.y,
        }
    }
}

impl Mul<f64> for Point {
    type Output = Point;
    #[inline]
    fn mul(self, k: f64) -> Point {
        Point {
            x: self.x * k,
            y: self.y * k,
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({:5.1}, {:5.1})", self.x, self.y)
    }
}

impl Point {
    pub fn new(x: f64, y: f64) -> Point {
        Point { x, y }
    }
    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }
}

/// Rotates `point` about `origin` by `angle` radians, counter-clockwise for positive angles.
pub fn rotate(origin: Point, point: Point, angle: f64) -> Point {
    let (sin, cos) = angle.sin_cos();
    let d = point - origin;
    Point {
        x: origin.x + cos * d.x - sin * d.y,
        y: origin.y + sin * d.x + cos * d.y,
    }
}

/// How a curve bends: `left` radians counter-clockwise after an even value, `right` radians
/// clockwise after an odd one, advancing `scale` units per step.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Turns {
    pub left: f64,
    pub right: f64,
    pub scale: f64,
}

impl Default for Turns {
    fn default() -> Turns {
        Turns {
            left: 0.3,
            right: 0.265,
            scale: 1.2,
        }
    }
}

impl fmt::Display for Turns {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Turns{{left: {}, right: {}, scale: {}}}",
            self.left, self.right, self.scale
        )
    }
}

impl Turns {
    pub fn new(left: f64, right: f64, scale: f64) -> Result<Turns> {
        let turns = Turns { left, right, scale };
        turns.validate()?;
        Ok(turns)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.left.is_finite() {
            return Err(Error::InvalidParameter {
                name: "left",
                value: self.left,
            });
        }
        if !self.right.is_finite() {
            return Err(Error::InvalidParameter {
                name: "right",
                value: self.right,
            });
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(Error::InvalidParameter {
                name: "scale",
                value: self.scale,
            });
        }
        Ok(())
    }

    /// An animation schedule: `frames` angle pairs evenly spaced from (0, 0) up to and including
    /// (`left_max`, `right_max`). A single frame is just (0, 0).
    pub fn sweep(frames: usize, left_max: f64, right_max: f64, scale: f64) -> Result<Vec<Turns>> {
        if frames == 0 {
            return Err(Error::InvalidParameter {
                name: "frames",
                value: 0.0,
            });
        }
        let last = max(frames - 1, 1) as f64;
        (0..frames)
            .map(|i| {
                let t = i as f64 / last;
                Turns::new(left_max * t, right_max * t, scale)
            })
            .collect()
    }
}

/// Bends a trimmed trajectory into a polyline of `values.len() + 1` points.
///
/// The curve starts at `ANCHOR` with a horizontal segment as long as `values[0]`. Every later
/// point is found by stepping `turns.scale` along the previous segment's direction and rotating
/// that step about the current point, left when the value is even and right when it is odd.
pub fn curve_sequence(values: &[u64], turns: &Turns) -> Result<Vec<Point>> {
    turns.validate()?;
    let first = *values.first().ok_or(Error::EmptySequence)?;

    let mut points = Vec::with_capacity(values.len() + 1);
    points.push(ANCHOR);
    points.push(Point::new(first as f64, ANCHOR.y));
    for (j, value) in values.iter().enumerate().skip(1) {
        let current = points[j];
        let delta = current - points[j - 1];
        let mag = delta.norm();
        if !(mag > 0.0 && mag.is_finite()) {
            return Err(Error::DegenerateHeading { index: j });
        }
        let ahead = current + delta * (turns.scale / mag);
        let angle = if value.is_even() {
            turns.left
        } else {
            -turns.right
        };
        points.push(rotate(current, ahead, angle));
    }
    Ok(points)
}

/// A finished curve along with the statistics of the trajectory it came from.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Curve {
    pub seed: u64,
    pub peak: u64,
    pub points: Vec<Point>,
}

impl Curve {
    pub fn build(column: &TrimmedColumn, turns: &Turns) -> Result<Curve> {
        Ok(Curve {
            seed: column.seed(),
            peak: column.peak(),
            points: curve_sequence(column.values(), turns)?,
        })
    }
}

/// Trims every column of `batch` and bends it into a curve. Columns are handled in parallel and
/// the curves come back in column order.
pub fn curves_for_batch(batch: &BatchMatrix, turns: &Turns) -> Result<Vec<Curve>> {
    turns.validate()?;
    let curves = (0..batch.width())
        .into_par_iter()
        .map(|j| Curve::build(&trim(&batch.column(j))?, turns))
        .collect::<Result<Vec<Curve>>>()?;
    debug!(count = curves.len(), %turns, "built curves");
    Ok(curves)
}

/// One line of the stream between the generator and the renderer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CurveRecord {
    pub frame: u32,
    pub left: f64,
    pub right: f64,
    pub curve: Curve,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use crate::sequence::{sequence_array, DEFAULT_MAX_STEPS};
    use std::f64::consts::PI;

    fn assert_point_eq(a: Point, b: Point) {
        assert_abs_diff_eq!(a.x, b.x, epsilon = 1e-9);
        assert_abs_diff_eq!(a.y, b.y, epsilon = 1e-9);
    }

    #[test]
    fn quarter_turn() {
        let p = rotate(Point::new(0.0, 0.0), Point::new(1.0, 0.0), PI / 2.0);
        assert_point_eq(p, Point::new(0.0, 1.0));
        let q = rotate(Point::new(1.0, 1.0), Point::new(2.0, 1.0), -PI / 2.0);
        assert_point_eq(q, Point::new(1.0, 0.0));
    }

    #[test]
    fn rotation_preserves_distance() {
        let origins = [Point::new(0.0, 0.0), Point::new(-3.5, 2.0), Point::new(1e3, -7.25)];
        let points = [Point::new(1.0, 0.0), Point::new(4.0, -9.0), Point::new(-0.3, 0.7)];
        for &o in origins.iter() {
            for &p in points.iter() {
                for k in -12..12 {
                    let theta = k as f64 * 0.37;
                    let r = rotate(o, p, theta);
                    assert_abs_diff_eq!((r - o).norm(), (p - o).norm(), epsilon = 1e-9);
                }
            }
        }
    }

    #[test]
    fn rotations_compose() {
        let o = Point::new(2.0, -1.0);
        let p = Point::new(-4.0, 3.5);
        for &(t1, t2) in [(0.3, 0.265), (-1.2, 2.5), (PI, PI / 3.0)].iter() {
            assert_point_eq(rotate(o, rotate(o, p, t1), t2), rotate(o, p, t1 + t2));
        }
    }

    #[test]
    fn curve_of_one() {
        let batch = sequence_array(1, DEFAULT_MAX_STEPS).unwrap();
        let curves = curves_for_batch(&batch, &Turns::default()).unwrap();
        assert_eq!(curves.len(), 1);
        assert_eq!(curves[0].seed, 1);
        assert_eq!(curves[0].points, vec![ANCHOR, Point::new(1.0, 1.0)]);
    }

    #[test]
    fn even_turns_left_odd_turns_right() {
        let turns = Turns::new(PI / 2.0, PI / 2.0, 2.0).unwrap();
        let left = curve_sequence(&[1, 2], &turns).unwrap();
        assert_point_eq(left[2], Point::new(1.0, 3.0));
        let right = curve_sequence(&[1, 3], &turns).unwrap();
        assert_point_eq(right[2], Point::new(1.0, -1.0));
    }

    #[test]
    fn straight_without_turns() {
        let turns = Turns::new(0.0, 0.0, 1.5).unwrap();
        let points = curve_sequence(&[4, 2, 1, 7], &turns).unwrap();
        let xs: Vec<f64> = points.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![0.0, 4.0, 5.5, 7.0, 8.5]);
        assert!(points.iter().all(|p| p.y == 1.0));
    }

    #[test]
    fn segments_have_scale_length() {
        let batch = sequence_array(60, DEFAULT_MAX_STEPS).unwrap();
        for &turns in [
            Turns::default(),
            Turns::new(0.05, 1.9, 0.4).unwrap(),
            Turns::new(-0.7, -0.2, 10.0).unwrap(),
        ]
        .iter()
        {
            for column in batch.trimmed_columns().unwrap() {
                let points = curve_sequence(column.values(), &turns).unwrap();
                assert_eq!(points.len(), column.len() + 1);
                assert_abs_diff_eq!(
                    (points[1] - points[0]).norm(),
                    column.values()[0] as f64,
                    epsilon = 1e-12
                );
                for pair in points[1..].windows(2) {
                    assert_abs_diff_eq!((pair[1] - pair[0]).norm(), turns.scale, epsilon = 1e-9);
                }
            }
        }
    }

    #[test]
    fn degenerate_heading_is_reported() {
        match curve_sequence(&[0, 2], &Turns::default()) {
            Err(Error::DegenerateHeading { index }) => assert_eq!(index, 1),
            other => panic!("expected DegenerateHeading, got {:?}", other),
        }
    }

    #[test]
    fn rejects_bad_input() {
        assert!(match curve_sequence(&[], &Turns::default()) {
            Err(Error::EmptySequence) => true,
            _ => false,
        });
        assert!(Turns::new(0.1, 0.1, 0.0).is_err());
        assert!(Turns::new(0.1, 0.1, -1.0).is_err());
        assert!(Turns::new(std::f64::NAN, 0.1, 1.0).is_err());
        assert!(Turns::new(0.1, std::f64::INFINITY, 1.0).is_err());
    }

    #[test]
    fn batch_curves_keep_column_order() {
        let batch = sequence_array(200, DEFAULT_MAX_STEPS).unwrap();
        let curves = curves_for_batch(&batch, &Turns::default()).unwrap();
        assert_eq!(curves.len(), 200);
        for (j, curve) in curves.iter().enumerate() {
            assert_eq!(curve.seed, j as u64 + 1);
            assert_eq!(curve.peak, batch.peak(j));
            assert_eq!(curve.points[0], ANCHOR);
        }
    }

    #[test]
    fn sweep_spans_both_ends() {
        let frames = Turns::sweep(5, 0.2, 0.3, 1.2).unwrap();
        assert_eq!(frames.len(), 5);
        assert_eq!(frames[0], Turns::new(0.0, 0.0, 1.2).unwrap());
        assert_abs_diff_eq!(frames[4].left, 0.2);
        assert_abs_diff_eq!(frames[4].right, 0.3);
        assert_abs_diff_eq!(frames[2].left, 0.1);
        assert_eq!(Turns::sweep(1, 0.2, 0.3, 1.2).unwrap()[0].left, 0.0);
        assert!(Turns::sweep(0, 0.2, 0.3, 1.2).is_err());
    }
}
