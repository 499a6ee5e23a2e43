//! Three-point affine calibration
//!
//! Maps points between the photo's pixel space and the projected plane. The
//! transform is stored in the usual 2D matrix layout:
//!
//! ```text
//! | a c e |   | x |
//! | b d f | * | y |
//! | 0 0 1 |   | 1 |
//! ```

use crate::error::{MeasureError, MeasureResult};
use crate::geometry::{doubled_signed_area, Point2D};

/// Relative area threshold below which a triangle counts as degenerate
///
/// Compared against the doubled triangle area divided by the squared length
/// of its longest edge, so the test does not depend on the triangle's units.
pub const DEGENERATE_AREA_EPSILON: f64 = 1e-12;

/// Relative threshold for pivots and determinants
///
/// Pivots are compared against the largest magnitude in their column, and a
/// determinant against the square of the largest linear coefficient, so tiny
/// but well-shaped inputs are not mistaken for singular ones.
const SINGULAR_EPSILON: f64 = 1e-15;

/// Affine map `T(p) = A·p + b`
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AffineTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineTransform {
    pub fn identity() -> Self {
        Self { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: 0.0, f: 0.0 }
    }

    pub fn translate(tx: f64, ty: f64) -> Self {
        Self { e: tx, f: ty, ..Self::identity() }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self { a: sx, d: sy, ..Self::identity() }
    }

    /// Counter-clockwise rotation about the origin, angle in radians
    pub fn rotate(angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self { a: cos, b: sin, c: -sin, d: cos, e: 0.0, f: 0.0 }
    }

    /// Apply the transform to a point
    pub fn apply(&self, p: Point2D) -> Point2D {
        Point2D::new(
            self.a * p.x + self.c * p.y + self.e,
            self.b * p.x + self.d * p.y + self.f,
        )
    }

    /// Matrix product `self · other`; `other` is applied first
    pub fn multiply(&self, other: &AffineTransform) -> Self {
        Self {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            e: self.a * other.e + self.c * other.f + self.e,
            f: self.b * other.e + self.d * other.f + self.f,
        }
    }

    /// Transform that applies `self` and then `next`
    pub fn then(&self, next: &AffineTransform) -> Self {
        next.multiply(self)
    }

    /// Determinant of the linear part
    pub fn determinant(&self) -> f64 {
        self.a * self.d - self.b * self.c
    }

    /// Inverse transform
    ///
    /// A singular transform collapses the plane onto a line, which is what a
    /// degenerate calibration triangle would produce.
    pub fn inverse(&self) -> MeasureResult<Self> {
        let det = self.determinant();
        let magnitude = self.a.abs().max(self.b.abs()).max(self.c.abs()).max(self.d.abs());
        if !det.is_finite() || det.abs() <= SINGULAR_EPSILON * magnitude * magnitude {
            return Err(MeasureError::DegenerateTriangle(format!(
                "transform is singular (determinant {det:e})"
            )));
        }

        Ok(Self {
            a: self.d / det,
            b: -self.b / det,
            c: -self.c / det,
            d: self.a / det,
            e: (self.c * self.f - self.d * self.e) / det,
            f: (self.b * self.e - self.a * self.f) / det,
        })
    }
}

/// Apply a transform to a point
pub fn apply_transform(transform: &AffineTransform, p: Point2D) -> Point2D {
    transform.apply(p)
}

/// Solve the unique affine transform mapping `src[i]` onto `dst[i]`
///
/// Each destination axis is an independent 3×3 system over the homogeneous
/// source coordinates `[x, y, 1]`.
pub fn solve_affine(src: &[Point2D; 3], dst: &[Point2D; 3]) -> MeasureResult<AffineTransform> {
    check_triangle("source", src)?;
    check_triangle("destination", dst)?;

    let rows = src.map(|p| [p.x, p.y, 1.0]);
    let [a, c, e] = solve_3x3(rows, dst.map(|p| p.x))?;
    let [b, d, f] = solve_3x3(rows, dst.map(|p| p.y))?;

    let transform = AffineTransform { a, b, c, d, e, f };
    log::debug!("solved affine transform {transform:?}");
    Ok(transform)
}

fn check_triangle(label: &str, t: &[Point2D; 3]) -> MeasureResult<()> {
    if t.iter().any(|p| !p.is_finite()) {
        return Err(MeasureError::InvalidCoordinate(format!(
            "{label} triangle has a non-finite vertex"
        )));
    }

    let longest = t[0]
        .distance_to(&t[1])
        .max(t[1].distance_to(&t[2]))
        .max(t[2].distance_to(&t[0]));
    let area = doubled_signed_area(&t[0], &t[1], &t[2]).abs();

    if longest == 0.0 || area / (longest * longest) < DEGENERATE_AREA_EPSILON {
        log::warn!("rejecting degenerate {label} triangle {t:?}");
        return Err(MeasureError::DegenerateTriangle(format!(
            "{label} triangle is collinear or coincident"
        )));
    }
    Ok(())
}

/// Gaussian elimination with partial pivoting
fn solve_3x3(mut m: [[f64; 3]; 3], mut rhs: [f64; 3]) -> MeasureResult<[f64; 3]> {
    let column_scale: [f64; 3] =
        std::array::from_fn(|col| m.iter().map(|row| row[col].abs()).fold(0.0, f64::max));

    for col in 0..3 {
        let pivot = (col..3)
            .max_by(|&i, &j| m[i][col].abs().total_cmp(&m[j][col].abs()))
            .unwrap_or(col);
        if m[pivot][col].abs() <= SINGULAR_EPSILON * column_scale[col] {
            return Err(MeasureError::DegenerateTriangle(
                "source coordinates do not span the plane".to_string(),
            ));
        }
        m.swap(col, pivot);
        rhs.swap(col, pivot);

        for row in col + 1..3 {
            let factor = m[row][col] / m[col][col];
            for k in col..3 {
                m[row][k] -= factor * m[col][k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut x = [0.0; 3];
    for row in (0..3).rev() {
        let tail: f64 = (row + 1..3).map(|k| m[row][k] * x[k]).sum();
        x[row] = (rhs[row] - tail) / m[row][row];
    }
    Ok(x)
}
