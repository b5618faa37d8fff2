//! Error quadrics and normal cones used to rank and validate collapses.

use std::f64::consts::PI;

use nalgebra::{Matrix4, Point3, Vector3, Vector4};

/// A quadric error matrix (4x4 symmetric matrix).
///
/// Represents the sum of squared distances to a set of planes.
/// Stored as 10 unique elements since the matrix is symmetric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Quadric {
    /// Upper triangular elements: [a, b, c, d, e, f, g, h, i, j]
    /// Matrix form:
    /// | a b c d |
    /// | b e f g |
    /// | c f h i |
    /// | d g i j |
    data: [f64; 10],
}

impl Default for Quadric {
    fn default() -> Self {
        Self::zero()
    }
}

impl Quadric {
    /// Create a zero quadric.
    pub(crate) fn zero() -> Self {
        Self { data: [0.0; 10] }
    }

    /// Create a quadric from a plane equation ax + by + cz + d = 0.
    /// The plane should be normalized (a² + b² + c² = 1).
    pub(crate) fn from_plane(a: f64, b: f64, c: f64, d: f64) -> Self {
        Self {
            data: [
                a * a, // [0,0]
                a * b, // [0,1] = [1,0]
                a * c, // [0,2] = [2,0]
                a * d, // [0,3] = [3,0]
                b * b, // [1,1]
                b * c, // [1,2] = [2,1]
                b * d, // [1,3] = [3,1]
                c * c, // [2,2]
                c * d, // [2,3] = [3,2]
                d * d, // [3,3]
            ],
        }
    }

    /// Quadric of the plane through `p` with unit normal `n`.
    pub(crate) fn from_point_normal(n: &Vector3<f64>, p: &Point3<f64>) -> Self {
        Self::from_plane(n.x, n.y, n.z, -n.dot(&p.coords))
    }

    /// Add another quadric to this one in place.
    pub(crate) fn add_assign(&mut self, other: &Quadric) {
        for i in 0..10 {
            self.data[i] += other.data[i];
        }
    }

    /// Evaluate the quadric error for a point.
    /// Returns v^T * Q * v where v = [x, y, z, 1].
    pub(crate) fn evaluate(&self, p: &Point3<f64>) -> f64 {
        let x = p.x;
        let y = p.y;
        let z = p.z;

        self.data[0] * x * x
            + 2.0 * self.data[1] * x * y
            + 2.0 * self.data[2] * x * z
            + 2.0 * self.data[3] * x
            + self.data[4] * y * y
            + 2.0 * self.data[5] * y * z
            + 2.0 * self.data[6] * y
            + self.data[7] * z * z
            + 2.0 * self.data[8] * z
            + self.data[9]
    }

    /// Convert to a 4x4 matrix.
    fn to_matrix(self) -> Matrix4<f64> {
        let d = &self.data;
        Matrix4::new(
            d[0], d[1], d[2], d[3], //
            d[1], d[4], d[5], d[6], //
            d[2], d[5], d[7], d[8], //
            d[3], d[6], d[8], d[9],
        )
    }

    /// Find the point that minimizes the quadric error.
    /// Returns None if the matrix is singular.
    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn optimal_point(&self) -> Option<Point3<f64>> {
        let mut m = self.to_matrix();
        m[(3, 0)] = 0.0;
        m[(3, 1)] = 0.0;
        m[(3, 2)] = 0.0;
        m[(3, 3)] = 1.0;

        let inv = m.try_inverse()?;
        let v = inv * Vector4::new(0.0, 0.0, 0.0, 1.0);
        Some(Point3::new(v.x, v.y, v.z))
    }
}

impl std::ops::Add for Quadric {
    type Output = Quadric;

    fn add(self, other: Quadric) -> Quadric {
        let mut result = self;
        result.add_assign(&other);
        result
    }
}

/// A cone of normal directions: a unit center axis and an opening angle
/// (radius, in radians).
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct NormalCone {
    center: Vector3<f64>,
    angle: f64,
}

impl Default for NormalCone {
    fn default() -> Self {
        Self::new(Vector3::z())
    }
}

impl NormalCone {
    /// A degenerate cone holding a single normal.
    pub(crate) fn new(normal: Vector3<f64>) -> Self {
        Self {
            center: normal,
            angle: 0.0,
        }
    }

    /// Opening angle in radians.
    pub(crate) fn angle(&self) -> f64 {
        self.angle
    }

    /// Center axis.
    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn center(&self) -> &Vector3<f64> {
        &self.center
    }

    /// Grow the cone to also contain `normal`.
    pub(crate) fn merge_normal(&mut self, normal: Vector3<f64>) {
        self.merge(&NormalCone::new(normal));
    }

    /// Grow the cone to enclose `other` as well.
    pub(crate) fn merge(&mut self, other: &NormalCone) {
        let dp = self.center.dot(&other.center);

        if dp > 0.99999 {
            // axes point in the same direction
            self.angle = self.angle.max(other.angle);
        } else if dp < -0.99999 {
            // opposite axes
            self.angle = 2.0 * PI;
        } else {
            let center_angle = dp.acos();
            let min_angle = (-self.angle).min(center_angle - other.angle);
            let max_angle = self.angle.max(center_angle + other.angle);
            self.angle = 0.5 * (max_angle - min_angle);

            // new axis by spherical interpolation
            let axis_angle = 0.5 * (min_angle + max_angle);
            self.center = (self.center * (center_angle - axis_angle).sin()
                + other.center * axis_angle.sin())
                / center_angle.sin();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadric_from_plane() {
        // Plane z = 0: normal (0, 0, 1), d = 0
        let q = Quadric::from_plane(0.0, 0.0, 1.0, 0.0);

        // Point on plane should have zero error
        assert!(q.evaluate(&Point3::new(1.0, 2.0, 0.0)).abs() < 1e-10);

        // Point 1 unit above plane should have error 1
        assert!((q.evaluate(&Point3::new(0.0, 0.0, 1.0)) - 1.0).abs() < 1e-10);

        // Point 2 units above plane should have error 4
        assert!((q.evaluate(&Point3::new(0.0, 0.0, 2.0)) - 4.0).abs() < 1e-10);
    }

    #[test]
    fn test_quadric_addition() {
        let q1 = Quadric::from_point_normal(&Vector3::x(), &Point3::origin());
        let q2 = Quadric::from_point_normal(&Vector3::y(), &Point3::new(0.0, 1.0, 0.0));
        let q = q1 + q2;

        // Distance 1 to x = 0 and 1 to y = 1
        assert!((q.evaluate(&Point3::new(1.0, 0.0, 5.0)) - 2.0).abs() < 1e-10);
        assert_eq!(Quadric::default() + q, q);
    }

    #[test]
    fn test_quadric_optimal_point() {
        // Three orthogonal planes meet in a single point
        let mut q = Quadric::zero();
        let corner = Point3::new(1.0, 2.0, 3.0);
        for n in [Vector3::x(), Vector3::y(), Vector3::z()] {
            q.add_assign(&Quadric::from_point_normal(&n, &corner));
        }
        let p = q.optimal_point().unwrap();
        assert!((p - corner).norm() < 1e-10);

        // A single plane has no unique minimizer
        assert!(Quadric::from_plane(0.0, 0.0, 1.0, 0.0).optimal_point().is_none());
    }

    #[test]
    fn test_normal_cone_merge() {
        let mut cone = NormalCone::new(Vector3::z());
        cone.merge_normal(Vector3::z());
        assert_eq!(cone.angle(), 0.0);

        // 90 degrees apart: the cone opens 45 degrees around the bisector
        cone.merge_normal(Vector3::x());
        assert!((cone.angle() - PI / 4.0).abs() < 1e-12);
        let bisector = Vector3::new(1.0, 0.0, 1.0).normalize();
        assert!((cone.center() - bisector).norm() < 1e-12);

        // A normal already inside does not widen it
        let mut inside = cone;
        inside.merge_normal(bisector);
        assert!((inside.angle() - cone.angle()).abs() < 1e-12);

        cone.merge_normal(-bisector);
        assert_eq!(cone.angle(), 2.0 * PI);
    }
}
