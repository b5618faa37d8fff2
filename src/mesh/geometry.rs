//! Geometric queries on a mesh.
//!
//! Positions live in the built-in `v:point` property. Everything here is
//! derived from positions and connectivity; nothing is cached except by the
//! explicit `update_*_normals` calls, which write `f:normal` / `v:normal`.

use nalgebra::{Point3, Vector3};

use crate::error::Result;

use super::halfedge::HalfEdgeMesh;
use super::index::{EdgeId, FaceId, HalfEdgeId, VertexId};
use super::property::{FaceProperty, VertexProperty};

const NORMAL_EPS: f64 = 1e-300;

/// Unit normal of a triangle, or zero for a degenerate one.
pub fn triangle_normal(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>) -> Vector3<f64> {
    (p1 - p0)
        .cross(&(p2 - p0))
        .try_normalize(NORMAL_EPS)
        .unwrap_or_else(Vector3::zeros)
}

/// Area of a triangle.
pub fn triangle_area(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>) -> f64 {
    0.5 * (p1 - p0).cross(&(p2 - p0)).norm()
}

/// Cotangent of the angle between two vectors.
///
/// Clamped to avoid blow-ups on nearly degenerate triangles.
pub fn cotan(u: &Vector3<f64>, v: &Vector3<f64>) -> f64 {
    let sin = u.cross(v).norm();
    if sin < 1e-12 {
        return 0.0;
    }
    (u.dot(v) / sin).clamp(-1e4, 1e4)
}

/// Clamp a cotangent to the range of angles in `[3°, 177°]`.
fn clamp_cot(cot: f64) -> f64 {
    const BOUND: f64 = 19.081_136_687_728_2; // cot(3°)
    cot.clamp(-BOUND, BOUND)
}

/// Angle between two vectors in radians.
pub fn angle(u: &Vector3<f64>, v: &Vector3<f64>) -> f64 {
    u.cross(v).norm().atan2(u.dot(v))
}

/// Distance from `p` to the triangle `(a, b, c)` and the closest point.
pub fn dist_point_triangle(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> (f64, Point3<f64>) {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    let closest = if d1 <= 0.0 && d2 <= 0.0 {
        *a
    } else {
        let bp = p - b;
        let d3 = ab.dot(&bp);
        let d4 = ac.dot(&bp);
        if d3 >= 0.0 && d4 <= d3 {
            *b
        } else {
            let vc = d1 * d4 - d3 * d2;
            if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
                a + ab * (d1 / (d1 - d3))
            } else {
                let cp = p - c;
                let d5 = ab.dot(&cp);
                let d6 = ac.dot(&cp);
                if d6 >= 0.0 && d5 <= d6 {
                    *c
                } else {
                    let vb = d5 * d2 - d1 * d6;
                    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
                        a + ac * (d2 / (d2 - d6))
                    } else {
                        let va = d3 * d6 - d5 * d4;
                        if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
                            b + (c - b) * ((d4 - d3) / ((d4 - d3) + (d5 - d6)))
                        } else {
                            let denom = 1.0 / (va + vb + vc);
                            a + ab * (vb * denom) + ac * (vc * denom)
                        }
                    }
                }
            }
        }
    };
    ((p - closest).norm(), closest)
}

impl HalfEdgeMesh {
    // ==================== Positions ====================

    /// Position of a vertex.
    #[inline]
    pub fn position(&self, v: VertexId) -> &Point3<f64> {
        self.prop(self.vpoint, v)
    }

    /// Move a vertex.
    #[inline]
    pub fn set_position(&mut self, v: VertexId, pos: Point3<f64>) {
        self.set_prop(self.vpoint, v, pos);
    }

    /// All vertex positions, indexed by vertex index (deleted ones included).
    pub fn points(&self) -> &[Point3<f64>] {
        self.prop_values(self.vpoint)
    }

    /// All vertex positions, mutably.
    pub fn points_mut(&mut self) -> &mut [Point3<f64>] {
        self.prop_values_mut(self.vpoint)
    }

    /// Get the positions of the three vertices of a triangular face.
    pub fn face_positions(&self, f: FaceId) -> [Point3<f64>; 3] {
        let [v0, v1, v2] = self.face_triangle(f);
        [*self.position(v0), *self.position(v1), *self.position(v2)]
    }

    // ==================== Geometry ====================

    fn newell(&self, f: FaceId) -> Vector3<f64> {
        let mut n = Vector3::zeros();
        for he in self.face_halfedges(f) {
            let p = self.position(self.origin(he));
            let q = self.position(self.dest(he));
            n.x += (p.y - q.y) * (p.z + q.z);
            n.y += (p.z - q.z) * (p.x + q.x);
            n.z += (p.x - q.x) * (p.y + q.y);
        }
        n
    }

    /// Compute the unit normal of a face (zero for degenerate faces).
    ///
    /// Works for arbitrary polygons.
    pub fn face_normal(&self, f: FaceId) -> Vector3<f64> {
        self.newell(f)
            .try_normalize(NORMAL_EPS)
            .unwrap_or_else(Vector3::zeros)
    }

    /// Compute the area of a (planar) face.
    pub fn face_area(&self, f: FaceId) -> f64 {
        0.5 * self.newell(f).norm()
    }

    /// Compute the centroid of a face.
    pub fn face_centroid(&self, f: FaceId) -> Point3<f64> {
        let mut sum = Vector3::zeros();
        let mut n = 0;
        for v in self.face_vertices(f) {
            sum += self.position(v).coords;
            n += 1;
        }
        if n == 0 {
            return Point3::origin();
        }
        Point3::from(sum / n as f64)
    }

    /// Compute the angle-weighted normal at a vertex.
    pub fn vertex_normal(&self, v: VertexId) -> Vector3<f64> {
        let p0 = *self.position(v);
        let mut normal = Vector3::zeros();
        for he in self.vertex_halfedges(v) {
            if self.is_boundary_halfedge(he) {
                continue;
            }
            let p1 = self.position(self.dest(he));
            let p2 = self.position(self.origin(self.prev(he)));
            let d1 = p1 - p0;
            let d2 = p2 - p0;
            if let Some(n) = d1.cross(&d2).try_normalize(NORMAL_EPS) {
                normal += n * angle(&d1, &d2);
            }
        }
        normal
            .try_normalize(NORMAL_EPS)
            .unwrap_or_else(Vector3::zeros)
    }

    /// Compute the length of an edge.
    pub fn edge_length(&self, he: HalfEdgeId) -> f64 {
        self.edge_vector(he).norm()
    }

    /// Compute the edge vector (from origin to destination).
    pub fn edge_vector(&self, he: HalfEdgeId) -> Vector3<f64> {
        self.position(self.dest(he)) - self.position(self.origin(he))
    }

    /// Compute the midpoint of an edge.
    pub fn edge_midpoint(&self, he: HalfEdgeId) -> Point3<f64> {
        let p0 = self.position(self.origin(he));
        let p1 = self.position(self.dest(he));
        Point3::from((p0.coords + p1.coords) * 0.5)
    }

    /// Mean length over all live edges, 0 for an edgeless mesh.
    pub fn mean_edge_length(&self) -> f64 {
        let (sum, n) = self
            .edge_ids()
            .fold((0.0, 0usize), |(s, n), e| (s + self.edge_length(e.halfedge(0)), n + 1));
        if n == 0 {
            0.0
        } else {
            sum / n as f64
        }
    }

    // ==================== Discrete operators ====================

    /// Cotangent weight of an edge: the sum of the cotangents of the angles
    /// opposite to it in its (at most two) incident triangles.
    ///
    /// Degenerate corners contribute nothing. No factor 1/2 is applied.
    pub fn cotan_weight(&self, e: EdgeId) -> f64 {
        let h0 = e.halfedge(0);
        let h1 = e.halfedge(1);
        let p0 = self.position(self.dest(h0));
        let p1 = self.position(self.dest(h1));

        let mut weight = 0.0;
        for h in [h0, h1] {
            if self.is_boundary_halfedge(h) {
                continue;
            }
            let p2 = self.position(self.dest(self.next(h)));
            let d0 = p0 - p2;
            let d1 = p1 - p2;
            let area = d0.cross(&d1).norm();
            if area > f64::MIN_POSITIVE {
                weight += d0.dot(&d1) / area;
            }
        }
        weight
    }

    /// Mixed Voronoi area around a vertex (Meyer et al. 2003).
    ///
    /// Obtuse triangles contribute a fixed fraction of their area instead of
    /// the circumcentric Voronoi region.
    pub fn voronoi_area_mixed(&self, v: VertexId) -> f64 {
        let mut area = 0.0;
        for h0 in self.vertex_halfedges(v) {
            if self.is_boundary_halfedge(h0) {
                continue;
            }
            let h1 = self.next(h0);
            let p = self.position(v);
            let q = self.position(self.dest(h0));
            let r = self.position(self.dest(h1));

            let pq = q - p;
            let qr = r - q;
            let pr = r - p;

            // twice the triangle area
            let double_area = pq.cross(&pr).norm();
            if double_area <= f64::MIN_POSITIVE {
                continue;
            }

            let dotp = pq.dot(&pr);
            let dotq = -qr.dot(&pq);
            let dotr = qr.dot(&pr);

            if dotp < 0.0 {
                area += 0.25 * double_area;
            } else if dotq < 0.0 || dotr < 0.0 {
                area += 0.125 * double_area;
            } else {
                let cotq = clamp_cot(dotq / double_area);
                let cotr = clamp_cot(dotr / double_area);
                area += 0.125 * (pr.norm_squared() * cotq + pq.norm_squared() * cotr);
            }
        }
        area
    }

    /// Barycentric area around a vertex: a third of each incident triangle.
    pub fn voronoi_area(&self, v: VertexId) -> f64 {
        self.vertex_faces(v)
            .map(|f| self.face_area(f) / self.face_valence(f) as f64)
            .sum()
    }

    /// Compute the bounding box of the live vertices.
    pub fn bounding_box(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let mut vertices = self.vertex_ids();
        let first = *self.position(vertices.next()?);
        let mut min = first;
        let mut max = first;

        for v in vertices {
            let p = self.position(v);
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }

        Some((min, max))
    }

    /// Compute the total surface area of the mesh.
    pub fn surface_area(&self) -> f64 {
        self.face_ids().map(|f| self.face_area(f)).sum()
    }

    /// Compute face normals into the `f:normal` property.
    pub fn update_face_normals(&mut self) -> Result<FaceProperty<Vector3<f64>>> {
        let prop = self.add_face_property("f:normal", Vector3::zeros())?;
        let normals: Vec<(FaceId, Vector3<f64>)> =
            self.face_ids().map(|f| (f, self.face_normal(f))).collect();
        for (f, n) in normals {
            self.set_prop(prop, f, n);
        }
        Ok(prop)
    }

    /// Compute vertex normals into the `v:normal` property.
    pub fn update_vertex_normals(&mut self) -> Result<VertexProperty<Vector3<f64>>> {
        let prop = self.add_vertex_property("v:normal", Vector3::zeros())?;
        let normals: Vec<(VertexId, Vector3<f64>)> =
            self.vertex_ids().map(|v| (v, self.vertex_normal(v))).collect();
        for (v, n) in normals {
            self.set_prop(prop, v, n);
        }
        Ok(prop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::shapes;

    #[test]
    fn test_triangle_helpers() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 0.0, 0.0);
        let c = Point3::new(0.0, 1.0, 0.0);
        assert!((triangle_area(&a, &b, &c) - 0.5).abs() < 1e-12);
        assert!((triangle_normal(&a, &b, &c) - Vector3::z()).norm() < 1e-12);
        assert_eq!(triangle_normal(&a, &b, &b), Vector3::zeros());
        assert!((angle(&(b - a), &(c - a)) - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!(cotan(&(b - a), &(c - a)).abs() < 1e-12);
    }

    #[test]
    fn test_dist_point_triangle() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 0.0, 0.0);
        let c = Point3::new(0.0, 1.0, 0.0);

        // Above the interior
        let (d, q) = dist_point_triangle(&Point3::new(0.25, 0.25, 2.0), &a, &b, &c);
        assert!((d - 2.0).abs() < 1e-12);
        assert!((q - Point3::new(0.25, 0.25, 0.0)).norm() < 1e-12);

        // Nearest to vertex b
        let (d, q) = dist_point_triangle(&Point3::new(2.0, -1.0, 0.0), &a, &b, &c);
        assert!((d - 2.0f64.sqrt()).abs() < 1e-12);
        assert_eq!(q, b);

        // Nearest to the hypotenuse
        let (d, _) = dist_point_triangle(&Point3::new(1.0, 1.0, 0.0), &a, &b, &c);
        assert!((d - 0.5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_quad_normal_and_area() {
        let mesh = shapes::plane(1).unwrap();
        let f = FaceId::new(0);
        assert!((mesh.face_area(f) - 1.0).abs() < 1e-12);
        assert!((mesh.face_normal(f) - Vector3::z()).norm() < 1e-12);
        assert!((mesh.face_centroid(f) - Point3::new(0.5, 0.5, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_closed_mesh_normals_point_outwards() {
        let mut mesh = shapes::icosahedron().unwrap();
        for v in mesh.vertex_ids() {
            let n = mesh.vertex_normal(v);
            let radial = mesh.position(v).coords.normalize();
            assert!(n.dot(&radial) > 0.99);
        }
        let normals = mesh.update_face_normals().unwrap();
        for f in mesh.face_ids() {
            assert!(mesh.prop(normals, f).dot(&mesh.face_centroid(f).coords) > 0.0);
        }
    }

    #[test]
    fn test_cotan_weight_on_right_triangles() {
        // Each interior diagonal of the triangulated plane sees two right angles
        let mesh = shapes::triangle_plane(2).unwrap();
        let center = VertexId::new(4);
        let corner = VertexId::new(0);
        let diagonal = mesh.find_edge(corner, center).unwrap();
        assert!(mesh.cotan_weight(diagonal).abs() < 1e-12);

        // An axis edge is opposite two 45° corners
        let axis = mesh.find_edge(VertexId::new(1), center).unwrap();
        assert!((mesh.cotan_weight(axis) - 2.0).abs() < 1e-12);

        // A boundary edge only has one triangle
        let boundary = mesh.find_edge(corner, VertexId::new(1)).unwrap();
        assert!((mesh.cotan_weight(boundary) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_voronoi_areas_partition_surface() {
        let mesh = shapes::icosahedron().unwrap();
        let mixed: f64 = mesh.vertex_ids().map(|v| mesh.voronoi_area_mixed(v)).sum();
        let barycentric: f64 = mesh.vertex_ids().map(|v| mesh.voronoi_area(v)).sum();
        let total = mesh.surface_area();
        assert!((mixed - total).abs() < 1e-9);
        assert!((barycentric - total).abs() < 1e-9);

        // Isolated vertices have no area
        let mut mesh = mesh;
        let v = mesh.add_vertex(Point3::origin());
        assert_eq!(mesh.voronoi_area_mixed(v), 0.0);
    }

    #[test]
    fn test_bounding_box_and_lengths() {
        let mesh = shapes::plane(4).unwrap();
        let (min, max) = mesh.bounding_box().unwrap();
        assert_eq!(min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(max, Point3::new(1.0, 1.0, 0.0));
        assert!((mesh.mean_edge_length() - 0.25).abs() < 1e-12);
        assert!((mesh.surface_area() - 1.0).abs() < 1e-12);
        assert!(HalfEdgeMesh::new().bounding_box().is_none());
    }
}
