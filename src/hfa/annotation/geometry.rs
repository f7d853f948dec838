//! Coordinate helpers for annotation shapes.
//!
//! Angles are in radians, counter-clockwise, as stored in `orientation`
//! fields.

use std::f64::consts::TAU;

use crate::hfa::types::value::{Record, Value};

/// Deepest record nesting searched for an element transform.
const TRANSFORM_SEARCH_DEPTH: usize = 8;

/// A 2-D map coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Reads an `{x, y}` record such as `Eprj_Coordinate`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let record = value.as_record()?;
        Some(Self::new(record.get_f64("x")?, record.get_f64("y")?))
    }
}

/// Rotates `offset` (relative to `center`) by `angle` and translates it back.
pub fn rotate(center: Point, dx: f64, dy: f64, angle: f64) -> Point {
    let (sin, cos) = angle.sin_cos();
    Point::new(
        center.x + dx * cos - dy * sin,
        center.y + dx * sin + dy * cos,
    )
}

/// The four corners of a rectangle, lower-left first, counter-clockwise.
///
/// The ring is not closed.
pub fn rectangle_corners(center: Point, width: f64, height: f64, orientation: f64) -> Vec<Point> {
    let (hw, hh) = (width / 2.0, height / 2.0);
    [(-hw, -hh), (hw, -hh), (hw, hh), (-hw, hh)]
        .into_iter()
        .map(|(dx, dy)| rotate(center, dx, dy, orientation))
        .collect()
}

/// `segments` points on an ellipse, starting at the end of the major axis.
///
/// The ring is not closed.
pub fn ellipse_ring(
    center: Point,
    semi_major: f64,
    semi_minor: f64,
    orientation: f64,
    segments: usize,
) -> Vec<Point> {
    (0..segments)
        .map(|i| {
            let theta = TAU * i as f64 / segments as f64;
            rotate(
                center,
                semi_major * theta.cos(),
                semi_minor * theta.sin(),
                orientation,
            )
        })
        .collect()
}

/// Finds the vertex list of a polyline-like record.
///
/// Accepts the first field that is either an array of `{x, y}` records or an
/// `n x 2` BASEDATA table.
pub fn collect_points(record: &Record) -> Option<Vec<Point>> {
    record.fields().find_map(|(_, value)| points_of(value))
}

fn points_of(value: &Value) -> Option<Vec<Point>> {
    match value {
        Value::Array(items) if !items.is_empty() => items.iter().map(Point::from_value).collect(),
        Value::BaseData(table) if table.cols == 2 && table.rows > 0 => (0..table.rows)
            .map(|row| Some(Point::new(table.get(row, 0)?, table.get(row, 1)?)))
            .collect(),
        _ => None,
    }
}

/// First-order polynomial transform of an annotation element.
///
/// Coefficients follow the `Efga_Polynomial` layout, with the matrix stored
/// column-major:
/// `x' = v0 + m0 * x + m2 * y`, `y' = v1 + m1 * x + m3 * y`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub matrix: [f64; 4],
    pub vector: [f64; 2],
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        matrix: [1.0, 0.0, 0.0, 1.0],
        vector: [0.0, 0.0],
    };

    /// Searches `record` and its nested records for `polycoefmtx`/`polycoefvector`.
    pub fn from_record(record: &Record) -> Option<Self> {
        Self::search(record, 0)
    }

    fn search(record: &Record, depth: usize) -> Option<Self> {
        if depth > TRANSFORM_SEARCH_DEPTH {
            return None;
        }
        if let (Some(m), Some(v)) = (record.field("polycoefmtx"), record.field("polycoefvector")) {
            let (m, v) = (numbers(m), numbers(v));
            if m.len() >= 4 && v.len() >= 2 {
                return Some(Affine {
                    matrix: [m[0], m[1], m[2], m[3]],
                    vector: [v[0], v[1]],
                });
            }
        }
        record.fields().find_map(|(_, value)| match value {
            Value::Record(nested) => Self::search(nested, depth + 1),
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_record)
                .find_map(|nested| Self::search(nested, depth + 1)),
            _ => None,
        })
    }

    pub fn apply(&self, p: Point) -> Point {
        let [m0, m1, m2, m3] = self.matrix;
        let [v0, v1] = self.vector;
        Point::new(v0 + m0 * p.x + m2 * p.y, v1 + m1 * p.x + m3 * p.y)
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

/// Flattens numeric arrays and tables into a list of values.
fn numbers(value: &Value) -> Vec<f64> {
    match value {
        Value::BaseData(table) => table.values.clone(),
        Value::Array(items) => items.iter().flat_map(numbers).collect(),
        other => other.as_f64().into_iter().collect(),
    }
}
