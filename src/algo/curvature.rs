//! Discrete curvature computation on meshes.
//!
//! This module provides algorithms for computing discrete curvature on triangle meshes,
//! including Gaussian curvature, mean curvature, and principal curvatures.
//!
//! # Curvature Types
//!
//! - **Gaussian curvature K**: Intrinsic curvature computed via angle defect
//! - **Mean curvature H**: Extrinsic curvature from the Laplace-Beltrami operator
//! - **Principal curvatures k1, k2**: Maximum and minimum normal curvatures
//!
//! [`compute_curvature`] derives the principal curvatures from H and K.
//! [`compute_curvature_tensor`] estimates them from the dihedral angles of
//! the edges around each vertex instead, which also separates the two
//! principal values on anisotropic regions where `H² − K` collapses.
//!
//! Interior vertices are evaluated directly. Values on boundary vertices are
//! not meaningful there, so they are averaged from interior neighbors.
//! All result arrays are indexed by vertex index and sized to the allocated
//! vertex count; deleted vertices read as zero.
//!
//! # Example
//!
//! ```
//! use hemesh::prelude::*;
//! use hemesh::algo::curvature::compute_curvature;
//!
//! let mesh = shapes::icosahedron().unwrap();
//! let result = compute_curvature(&mesh);
//!
//! let v = VertexId::new(0);
//! assert!(result.gaussian(v) > 0.0);
//! assert!(result.mean(v) > 0.0);
//! let (k1, k2) = result.principal(v);
//! assert!(k1 >= k2);
//! ```
//!
//! # References
//!
//! - Meyer, M., et al. (2003). "Discrete Differential-Geometry Operators for
//!   Triangulated 2-Manifolds." Visualization and Mathematics III.
//! - Cohen-Steiner, D., & Morvan, J.-M. (2003). "Restricted Delaunay
//!   triangulations and normal cycle." Symposium on Computational Geometry.

use std::f64::consts::PI;

use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;

use crate::mesh::{angle, HalfEdgeMesh, VertexId};

/// Areas below this are treated as degenerate.
const AREA_EPS: f64 = 1e-12;

/// Result of curvature computation.
///
/// Contains per-vertex curvature values for all vertices in the mesh.
#[derive(Debug, Clone)]
pub struct CurvatureResult {
    /// Gaussian curvature (K) per vertex.
    gaussian: Vec<f64>,
    /// Mean curvature (H) per vertex, positive on convex regions.
    mean: Vec<f64>,
    /// Maximum principal curvature (k1) per vertex.
    principal_max: Vec<f64>,
    /// Minimum principal curvature (k2) per vertex.
    principal_min: Vec<f64>,
}

impl CurvatureResult {
    /// Get Gaussian curvature at a vertex.
    #[inline]
    pub fn gaussian(&self, v: VertexId) -> f64 {
        self.gaussian[v.index()]
    }

    /// Get mean curvature at a vertex.
    #[inline]
    pub fn mean(&self, v: VertexId) -> f64 {
        self.mean[v.index()]
    }

    /// Get principal curvatures at a vertex.
    ///
    /// Returns (k1, k2) where k1 >= k2.
    #[inline]
    pub fn principal(&self, v: VertexId) -> (f64, f64) {
        (self.principal_max[v.index()], self.principal_min[v.index()])
    }

    /// Largest absolute principal curvature at a vertex.
    #[inline]
    pub fn max_abs(&self, v: VertexId) -> f64 {
        self.principal_max[v.index()]
            .abs()
            .max(self.principal_min[v.index()].abs())
    }

    /// Get all Gaussian curvatures as a slice.
    #[inline]
    pub fn gaussian_values(&self) -> &[f64] {
        &self.gaussian
    }

    /// Get all mean curvatures as a slice.
    #[inline]
    pub fn mean_values(&self) -> &[f64] {
        &self.mean
    }

    /// Largest absolute principal curvature of every vertex.
    pub fn max_abs_values(&self) -> Vec<f64> {
        self.principal_max
            .iter()
            .zip(&self.principal_min)
            .map(|(k1, k2)| k1.abs().max(k2.abs()))
            .collect()
    }

    /// Get the number of entries (the allocated vertex count).
    #[inline]
    pub fn len(&self) -> usize {
        self.gaussian.len()
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.gaussian.is_empty()
    }

    /// Compute shape index at a vertex.
    ///
    /// Shape index is a scale-invariant measure: (2/π) * atan((k1+k2)/(k1-k2))
    /// Range: [-1, 1], where -1 = cup, 0 = saddle, 1 = cap
    pub fn shape_index(&self, v: VertexId) -> f64 {
        let k1 = self.principal_max[v.index()];
        let k2 = self.principal_min[v.index()];
        let diff = k1 - k2;
        if diff.abs() < 1e-10 {
            0.0 // Umbilical point
        } else {
            (2.0 / PI) * ((k1 + k2) / diff).atan()
        }
    }

    /// Compute curvedness at a vertex.
    ///
    /// Curvedness measures the magnitude of curvature: sqrt((k1² + k2²) / 2)
    pub fn curvedness(&self, v: VertexId) -> f64 {
        let k1 = self.principal_max[v.index()];
        let k2 = self.principal_min[v.index()];
        ((k1 * k1 + k2 * k2) / 2.0).sqrt()
    }

    /// Smooth all curvature values with a few damped Laplacian passes.
    ///
    /// Each pass moves every value half-way towards the average of its
    /// neighbors, weighted by the cotangent weights clamped at zero.
    pub fn smooth(&mut self, mesh: &HalfEdgeMesh, iterations: usize) {
        for _ in 0..iterations {
            for values in [
                &mut self.gaussian,
                &mut self.mean,
                &mut self.principal_max,
                &mut self.principal_min,
            ] {
                smooth_pass(mesh, values);
            }
        }
    }
}

fn smooth_pass(mesh: &HalfEdgeMesh, values: &mut [f64]) {
    let updated: Vec<(usize, f64)> = mesh
        .vertex_ids()
        .filter_map(|v| {
            let mut sum = 0.0;
            let mut weights = 0.0;
            for h in mesh.vertex_halfedges(v) {
                let w = mesh.cotan_weight(h.edge()).max(0.0);
                sum += w * values[mesh.dest(h).index()];
                weights += w;
            }
            if weights > 0.0 {
                let c = values[v.index()];
                Some((v.index(), c + 0.5 * (sum / weights - c)))
            } else {
                None
            }
        })
        .collect();
    for (i, c) in updated {
        values[i] = c;
    }
}

/// Sum of the corner angles at a vertex.
fn compute_angle_sum(mesh: &HalfEdgeMesh, v: VertexId) -> f64 {
    let p0 = mesh.position(v);
    mesh.vertex_halfedges(v)
        .filter(|&h| !mesh.is_boundary_halfedge(h))
        .map(|h| {
            let p1 = mesh.position(mesh.dest(h));
            let p2 = mesh.position(mesh.dest(mesh.next(h)));
            angle(&(p1 - p0), &(p2 - p0))
        })
        .sum()
}

/// Cotangent Laplacian of the position at a vertex, unnormalized:
/// Σ (cot α + cot β) (x_j - x_i).
fn compute_laplacian(mesh: &HalfEdgeMesh, v: VertexId) -> Vector3<f64> {
    let p = mesh.position(v);
    mesh.vertex_halfedges(v)
        .map(|h| mesh.cotan_weight(h.edge()) * (mesh.position(mesh.dest(h)) - p))
        .sum()
}

/// Per-vertex curvature data computed in parallel.
#[derive(Debug, Clone, Copy, Default)]
struct VertexCurvature {
    gaussian: f64,
    mean: f64,
    principal_max: f64,
    principal_min: f64,
}

fn interior_curvature(mesh: &HalfEdgeMesh, v: VertexId) -> VertexCurvature {
    if mesh.is_deleted(v) || mesh.is_isolated(v) || mesh.is_boundary_vertex(v) {
        return VertexCurvature::default();
    }

    let area = mesh.voronoi_area_mixed(v);
    if area < AREA_EPS {
        return VertexCurvature::default();
    }

    // Gaussian curvature from the angle defect
    let k = (2.0 * PI - compute_angle_sum(mesh, v)) / area;

    // Mean curvature: Δx = -2 H n, with Δx = laplacian / (2 A)
    let laplacian = compute_laplacian(mesh, v) / (2.0 * area);
    let h_unsigned = 0.5 * laplacian.norm();
    let h = if laplacian.dot(&mesh.vertex_normal(v)) <= 0.0 {
        h_unsigned
    } else {
        -h_unsigned
    };

    // Principal curvatures: k1, k2 = H ± sqrt(H² - K)
    let s = (h * h - k).max(0.0).sqrt();

    VertexCurvature {
        gaussian: k,
        mean: h,
        principal_max: h + s,
        principal_min: h - s,
    }
}

/// Compute all curvatures (Gaussian, mean, and principal) for all vertices.
///
/// This function uses parallel computation. Use
/// [`compute_curvature_sequential`] for single-threaded execution.
pub fn compute_curvature(mesh: &HalfEdgeMesh) -> CurvatureResult {
    compute_curvature_impl(mesh, true)
}

/// Compute all curvatures (sequential version).
pub fn compute_curvature_sequential(mesh: &HalfEdgeMesh) -> CurvatureResult {
    compute_curvature_impl(mesh, false)
}

fn compute_curvature_impl(mesh: &HalfEdgeMesh, parallel: bool) -> CurvatureResult {
    let n = mesh.vertices_size();

    let mut results: Vec<VertexCurvature> = if parallel {
        (0..n)
            .into_par_iter()
            .map(|idx| interior_curvature(mesh, VertexId::new(idx)))
            .collect()
    } else {
        (0..n)
            .map(|idx| interior_curvature(mesh, VertexId::new(idx)))
            .collect()
    };

    set_boundary_curvatures(mesh, &mut results);
    collect_results(results)
}

/// Compute principal curvatures from the dihedral-angle curvature tensor.
///
/// Every interior edge contributes `β · (l/2) · ē ēᵀ`, with `β` the signed
/// angle between the normals of its faces (positive where convex), `l` its
/// length and `ē` its direction. A vertex sums the contributions of its
/// edges (and of its neighbors' edges with `two_ring`) and divides by the
/// mixed area of the same vertices. The eigenvalue of smallest magnitude
/// belongs to the normal; the other two are the principal curvatures.
/// Mean and Gaussian curvature are their average and product.
pub fn compute_curvature_tensor(mesh: &HalfEdgeMesh, two_ring: bool) -> CurvatureResult {
    let n = mesh.vertices_size();

    let mut edge_terms = vec![(0.0, Vector3::<f64>::zeros()); mesh.edges_size()];
    for e in mesh.edge_ids() {
        let h0 = e.halfedge(0);
        let h1 = e.halfedge(1);
        let (f0, f1) = (mesh.face_of(h0), mesh.face_of(h1));
        if !f0.is_valid() || !f1.is_valid() {
            continue;
        }
        let n0 = mesh.face_normal(f0);
        let n1 = mesh.face_normal(f1);
        let ev = mesh.position(mesh.dest(h0)) - mesh.position(mesh.dest(h1));
        let Some(dir) = ev.try_normalize(AREA_EPS) else {
            continue;
        };
        // only half of the edge lies in the Voronoi region of each end
        let l = 0.5 * ev.norm();
        let beta = n0.cross(&n1).dot(&dir).atan2(n0.dot(&n1));
        edge_terms[e.index()] = (beta, dir * l.sqrt());
    }

    let areas: Vec<f64> = (0..n)
        .map(|i| {
            let v = VertexId::new(i);
            if mesh.is_deleted(v) || mesh.is_isolated(v) {
                0.0
            } else {
                mesh.voronoi_area_mixed(v)
            }
        })
        .collect();

    let mut results: Vec<VertexCurvature> = (0..n)
        .into_par_iter()
        .map(|i| tensor_curvature(mesh, VertexId::new(i), &edge_terms, &areas, two_ring))
        .collect();

    set_boundary_curvatures(mesh, &mut results);
    collect_results(results)
}

fn tensor_curvature(
    mesh: &HalfEdgeMesh,
    v: VertexId,
    edge_terms: &[(f64, Vector3<f64>)],
    areas: &[f64],
    two_ring: bool,
) -> VertexCurvature {
    if mesh.is_deleted(v) || mesh.is_isolated(v) || mesh.is_boundary_vertex(v) {
        return VertexCurvature::default();
    }

    let mut neighborhood = vec![v];
    if two_ring {
        neighborhood.extend(mesh.vertex_neighbors(v));
    }

    let mut tensor = Matrix3::<f64>::zeros();
    let mut area = 0.0;
    for u in neighborhood {
        if mesh.is_boundary_vertex(u) {
            continue;
        }
        for h in mesh.vertex_halfedges(u) {
            let (beta, ev) = edge_terms[h.edge().index()];
            tensor += ev * ev.transpose() * beta;
        }
        area += areas[u.index()];
    }
    if area < AREA_EPS {
        return VertexCurvature::default();
    }
    tensor /= area;

    let eval = tensor.symmetric_eigen().eigenvalues;
    let normal = (0..3)
        .min_by(|&a, &b| eval[a].abs().total_cmp(&eval[b].abs()))
        .unwrap_or(0);
    let (a, b) = match normal {
        0 => (eval[1], eval[2]),
        1 => (eval[0], eval[2]),
        _ => (eval[0], eval[1]),
    };
    let (k1, k2) = (a.max(b), a.min(b));

    VertexCurvature {
        gaussian: k1 * k2,
        mean: 0.5 * (k1 + k2),
        principal_max: k1,
        principal_min: k2,
    }
}

fn collect_results(results: Vec<VertexCurvature>) -> CurvatureResult {
    let n = results.len();
    let mut result = CurvatureResult {
        gaussian: Vec::with_capacity(n),
        mean: Vec::with_capacity(n),
        principal_max: Vec::with_capacity(n),
        principal_min: Vec::with_capacity(n),
    };
    for vc in results {
        result.gaussian.push(vc.gaussian);
        result.mean.push(vc.mean);
        result.principal_max.push(vc.principal_max);
        result.principal_min.push(vc.principal_min);
    }
    result
}

/// Boundary vertices take the average of their interior neighbors.
fn set_boundary_curvatures(mesh: &HalfEdgeMesh, results: &mut [VertexCurvature]) {
    let boundary: Vec<(usize, VertexCurvature)> = mesh
        .vertex_ids()
        .filter(|&v| mesh.is_boundary_vertex(v))
        .map(|v| {
            let mut acc = VertexCurvature::default();
            let mut count = 0usize;
            for vv in mesh.vertex_neighbors(v) {
                if mesh.is_boundary_vertex(vv) {
                    continue;
                }
                let c = results[vv.index()];
                acc.gaussian += c.gaussian;
                acc.mean += c.mean;
                acc.principal_max += c.principal_max;
                acc.principal_min += c.principal_min;
                count += 1;
            }
            if count > 0 {
                let s = 1.0 / count as f64;
                acc.gaussian *= s;
                acc.mean *= s;
                acc.principal_max *= s;
                acc.principal_min *= s;
            }
            (v.index(), acc)
        })
        .collect();

    for (i, c) in boundary {
        results[i] = c;
    }
}

/// Compute Gaussian curvature for all vertices.
///
/// Uses the angle defect formula: K = (2π - Σθ) / A_mixed
pub fn gaussian_curvature(mesh: &HalfEdgeMesh) -> Vec<f64> {
    compute_curvature(mesh).gaussian
}

/// Compute mean curvature for all vertices.
///
/// Uses the cotangent Laplacian: H = ||Δx|| / 2, signed so that convex
/// regions are positive.
pub fn mean_curvature(mesh: &HalfEdgeMesh) -> Vec<f64> {
    compute_curvature(mesh).mean
}

/// Maximum absolute principal curvature per vertex after
/// `smoothing_steps` smoothing passes.
pub fn max_abs_curvature(mesh: &HalfEdgeMesh, smoothing_steps: usize) -> Vec<f64> {
    let mut result = compute_curvature(mesh);
    result.smooth(mesh, smoothing_steps);
    result.max_abs_values()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{build_from_triangles, shapes};
    use nalgebra::Point3;

    #[test]
    fn test_curvature_flat_plane() {
        let mesh = shapes::triangle_plane(4).unwrap();
        let result = compute_curvature(&mesh);

        for v in mesh.vertex_ids() {
            assert!(result.gaussian(v).abs() < 1e-9, "K at {v:?}");
            assert!(result.mean(v).abs() < 1e-9, "H at {v:?}");
            assert!(result.max_abs(v) < 1e-6);
        }
    }

    #[test]
    fn test_curvature_sphere() {
        // Unit sphere approximation: K = 1, H = 1
        let mesh = shapes::icosphere(2).unwrap();
        let result = compute_curvature(&mesh);

        for v in mesh.vertex_ids() {
            assert!((result.mean(v) - 1.0).abs() < 0.1, "H = {}", result.mean(v));
            assert!((result.gaussian(v) - 1.0).abs() < 0.2, "K = {}", result.gaussian(v));
        }
    }

    #[test]
    fn test_gauss_bonnet() {
        // ∫K dA = 2π χ = 4π for a closed genus-0 surface
        let mesh = shapes::icosphere(1).unwrap();
        let gaussian = gaussian_curvature(&mesh);

        let total: f64 = mesh
            .vertex_ids()
            .map(|v| gaussian[v.index()] * mesh.voronoi_area_mixed(v))
            .sum();
        assert!((total - 4.0 * PI).abs() < 1e-9, "got {total}");
    }

    #[test]
    fn test_principal_curvatures_relation() {
        let mesh = shapes::icosphere(1).unwrap();
        let result = compute_curvature(&mesh);

        for v in mesh.vertex_ids() {
            let h = result.mean(v);
            let (k1, k2) = result.principal(v);
            assert!(k1 >= k2);
            assert!(((k1 + k2) / 2.0 - h).abs() < 1e-12);
            assert!((result.max_abs(v) - k1.abs().max(k2.abs())).abs() < 1e-12);
        }
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let mesh = shapes::icosphere(1).unwrap();
        let a = compute_curvature(&mesh);
        let b = compute_curvature_sequential(&mesh);
        assert_eq!(a.gaussian_values(), b.gaussian_values());
        assert_eq!(a.mean_values(), b.mean_values());
    }

    #[test]
    fn test_boundary_takes_interior_average() {
        // Lift the center of a 2x2 grid: only vertex 4 is interior
        let mut mesh = shapes::triangle_plane(2).unwrap();
        let center = VertexId::new(4);
        mesh.set_position(center, Point3::new(0.5, 0.5, 0.3));
        let result = compute_curvature(&mesh);

        assert!(result.gaussian(center) > 0.0);
        for v in mesh.vertex_ids().filter(|&v| v != center) {
            if mesh.find_edge(v, center).is_some() {
                assert!((result.gaussian(v) - result.gaussian(center)).abs() < 1e-12);
            } else {
                // corners (0, 1) and (1, 0) only touch boundary vertices
                assert_eq!(result.gaussian(v), 0.0);
            }
            assert!(result.mean(v).is_finite());
        }
    }

    #[test]
    fn test_curvature_single_triangle() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
        ];
        let mesh = build_from_triangles(&vertices, &[[0, 1, 2]]).unwrap();
        let result = compute_curvature(&mesh);

        // No interior vertex to average from
        assert_eq!(result.len(), 3);
        for v in mesh.vertex_ids() {
            assert_eq!(result.gaussian(v), 0.0);
            assert_eq!(result.mean(v), 0.0);
        }
    }

    #[test]
    fn test_smoothing_flattens_outlier() {
        let mut mesh = shapes::icosphere(1).unwrap();
        let v = VertexId::new(0);
        let p = *mesh.position(v);
        mesh.set_position(v, Point3::from(p.coords * 1.3));

        let mut result = compute_curvature(&mesh);
        let before = result.max_abs(v);
        result.smooth(&mesh, 3);
        assert!(result.max_abs(v) < before);
        assert_eq!(max_abs_curvature(&mesh, 3), result.max_abs_values());
    }

    #[test]
    fn test_tensor_flat_plane() {
        let mesh = shapes::triangle_plane(4).unwrap();
        let result = compute_curvature_tensor(&mesh, false);
        for v in mesh.vertex_ids() {
            assert!(result.max_abs(v) < 1e-9);
        }
    }

    #[test]
    fn test_tensor_sphere() {
        let mesh = shapes::icosphere(2).unwrap();
        for two_ring in [false, true] {
            let result = compute_curvature_tensor(&mesh, two_ring);
            for v in mesh.vertex_ids() {
                let (k1, k2) = result.principal(v);
                assert!(k1 >= k2);
                assert!((k1 - 1.0).abs() < 0.2, "k1 = {k1}");
                assert!((k2 - 1.0).abs() < 0.2, "k2 = {k2}");
                assert!((result.mean(v) - 0.5 * (k1 + k2)).abs() < 1e-12);
                assert!((result.gaussian(v) - k1 * k2).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_tensor_scales_with_radius() {
        let mut mesh = shapes::icosphere(2).unwrap();
        let unit = compute_curvature_tensor(&mesh, false).max_abs_values();
        for p in mesh.points_mut() {
            *p = Point3::from(p.coords * 2.0);
        }
        let doubled = compute_curvature_tensor(&mesh, false).max_abs_values();
        for v in mesh.vertex_ids() {
            let i = v.index();
            assert!((doubled[i] - 0.5 * unit[i]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_shape_index_and_curvedness() {
        let mesh = shapes::icosphere(1).unwrap();
        let result = compute_curvature(&mesh);

        for v in mesh.vertex_ids() {
            let si = result.shape_index(v);
            assert!((-1.0 - 1e-10..=1.0 + 1e-10).contains(&si));
            assert!(result.curvedness(v) >= 0.0);
        }
    }
}
