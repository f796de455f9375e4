//! Non-uniform B-spline evaluation over an arbitrary interpolable value type.
//!
//! Spline-compressed animation channels store control points plus a byte-valued
//! knot vector instead of per-frame samples; this evaluator reconstructs the
//! samples. Only the non-rational (uniform weight) form is needed.

use crate::error::Error;
use std::ops::{Add, Mul};

#[derive(Clone, Debug)]
pub struct Nurbs<T> {
    control_points: Vec<T>,
    knots: Vec<u8>,
    degree: usize,
}

impl<T> Nurbs<T>
where
    T: Copy + Add<Output = T> + Mul<f32, Output = T>,
{
    /// Builds an evaluator, validating the knot vector up front.
    ///
    /// The knot vector must be non-decreasing and hold at least
    /// `control_points.len() + degree + 1` entries; violations are a decode
    /// error, not undefined behavior.
    pub fn new(control_points: Vec<T>, knots: Vec<u8>, degree: usize) -> Result<Self, Error> {
        if degree == 0 {
            return Err(Error::MalformedKnots {
                message: "degree must be at least 1".to_string(),
            });
        }
        if control_points.len() < degree + 1 {
            return Err(Error::MalformedKnots {
                message: format!(
                    "{} control points is too few for degree {degree}",
                    control_points.len()
                ),
            });
        }
        let needed = control_points.len() + degree + 1;
        if knots.len() < needed {
            return Err(Error::MalformedKnots {
                message: format!("{} knots, need at least {needed}", knots.len()),
            });
        }
        if knots.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::MalformedKnots {
                message: "knot vector is not non-decreasing".to_string(),
            });
        }
        Ok(Self {
            control_points,
            knots,
            degree,
        })
    }

    /// Finds the span index `i` with `knots[i] <= t < knots[i + 1]`, clamped
    /// to the last control point at and beyond the end of the knot range.
    fn find_span(&self, t: u32) -> usize {
        let n = self.control_points.len() - 1;
        if t >= u32::from(self.knots[n + 1]) {
            return n;
        }
        if t <= u32::from(self.knots[self.degree]) {
            return self.degree;
        }

        let mut low = self.degree;
        let mut high = n + 1;
        let mut mid = (low + high) / 2;
        while t < u32::from(self.knots[mid]) || t >= u32::from(self.knots[mid + 1]) {
            if t < u32::from(self.knots[mid]) {
                high = mid;
            } else {
                low = mid;
            }
            mid = (low + high) / 2;
        }
        mid
    }

    /// Computes the `degree + 1` nonzero basis function values at `t` with the
    /// iterative triangular Cox-de Boor recurrence.
    fn basis(&self, span: usize, t: f32) -> Vec<f32> {
        let p = self.degree;
        let mut values = vec![0.0f32; p + 1];
        let mut left = vec![0.0f32; p + 1];
        let mut right = vec![0.0f32; p + 1];
        values[0] = 1.0;

        for j in 1..=p {
            left[j] = t - f32::from(self.knots[span + 1 - j]);
            right[j] = f32::from(self.knots[span + j]) - t;
            let mut saved = 0.0;
            for r in 0..j {
                let denom = right[r + 1] + left[j - r];
                let tmp = if denom == 0.0 { 0.0 } else { values[r] / denom };
                values[r] = saved + right[r + 1] * tmp;
                saved = left[j - r] * tmp;
            }
            values[j] = saved;
        }
        values
    }

    /// Evaluates the spline at parameter `t`.
    pub fn interpolate(&self, t: u32) -> T {
        let span = self.find_span(t);
        let basis = self.basis(span, t as f32);
        let first = span - self.degree;
        let mut acc = self.control_points[first] * basis[0];
        for i in 1..=self.degree {
            acc = acc + self.control_points[first + i] * basis[i];
        }
        acc
    }
}
