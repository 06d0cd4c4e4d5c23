//! Minimal 3-D point utilities for measuring how far a trajectory bends away from its chord.
//!
//! Only the first three components of a state vector (the position) take part in these
//! computations.

use ndarray as nd;

use crate::Float;

/// A point in 3-D space.
pub type Point3<F> = [F; 3];

/// Take the position (first three components) out of a state vector.
///
/// Panics if the state has fewer than three components.
pub fn point3<F: Float>(state: nd::ArrayView1<F>) -> Point3<F> {
    [state[0], state[1], state[2]]
}

fn sub<F: Float>(a: &Point3<F>, b: &Point3<F>) -> Point3<F> {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross<F: Float>(a: &Point3<F>, b: &Point3<F>) -> Point3<F> {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

// Chained `hypot` so lengths near the bottom of the exponent range do not underflow to zero.
fn norm<F: Float>(a: &Point3<F>) -> F {
    a[0].hypot(a[1]).hypot(a[2])
}

/// Euclidean distance between two points.
pub fn distance<F: Float>(a: &Point3<F>, b: &Point3<F>) -> F {
    norm(&sub(a, b))
}

/// Perpendicular distance from `point` to the infinite line through `line_a` and `line_b`.
///
/// If the two line points coincide there is no line, and the distance to that point is returned.
pub fn distance_to_line<F: Float>(point: &Point3<F>, line_a: &Point3<F>, line_b: &Point3<F>) -> F {
    let direction = sub(line_b, line_a);
    let length = norm(&direction);
    if length == F::zero() {
        return distance(point, line_a);
    }
    let unit = [direction[0] / length, direction[1] / length, direction[2] / length];
    norm(&cross(&sub(point, line_a), &unit))
}
