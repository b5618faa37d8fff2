//! Per-vertex target edge lengths.

use crate::algo::curvature::compute_curvature_tensor;
use crate::mesh::{HalfEdgeMesh, VertexId, VertexProperty};

/// Per-vertex sizing field (target edge length at each vertex).
///
/// Indexed by vertex index, so it stays aligned with the mesh only until the
/// next garbage collection.
#[derive(Debug, Clone)]
pub struct SizingField {
    /// Target edge length for each vertex.
    pub vertex_sizes: Vec<f64>,
}

impl SizingField {
    /// The same target length everywhere.
    pub fn uniform(mesh: &HalfEdgeMesh, length: f64) -> Self {
        Self {
            vertex_sizes: vec![length; mesh.vertices_size()],
        }
    }

    /// Get the target edge length at a vertex.
    pub fn get(&self, v: VertexId) -> f64 {
        self.vertex_sizes.get(v.index()).copied().unwrap_or(0.0)
    }

    /// Target length of the edge between `v0` and `v1`: the smaller of the
    /// two endpoint targets.
    pub fn edge_target(&self, v0: VertexId, v1: VertexId) -> f64 {
        self.get(v0).min(self.get(v1))
    }
}

/// Compute a curvature-adapted sizing field.
///
/// Maximum absolute curvature from the dihedral-angle tensor (see
/// [`compute_curvature_tensor`]) is smoothed with cotangent weights (ignoring
/// vertices marked in `v:feature`), propagated onto boundary and feature
/// vertices, and turned into the length of a chord that deviates at most
/// `approx_error` from a circle of that curvature:
/// `h = sqrt(6·e·r − 3·e²)` with `r = 1/κ`. Results are clamped to
/// `[min_length, max_length]`; flat regions get `max_length`.
pub fn compute_sizing_field(
    mesh: &HalfEdgeMesh,
    min_length: f64,
    max_length: f64,
    approx_error: f64,
) -> SizingField {
    let n = mesh.vertices_size();
    let vfeature: Option<VertexProperty<bool>> = mesh.get_property("v:feature");
    let is_feature = |v: VertexId| vfeature.is_some_and(|p| *mesh.prop(p, v));

    let mut curvatures = compute_curvature_tensor(mesh, false).max_abs_values();

    // smooth curvatures, keeping them from leaking across feature vertices
    for v in mesh.vertex_ids() {
        if is_feature(v) {
            continue;
        }
        let mut curv = 0.0;
        let mut sum_weights = 0.0;
        for h in mesh.vertex_halfedges(v) {
            let vv = mesh.dest(h);
            if is_feature(vv) {
                continue;
            }
            let weight = mesh.cotan_weight(h.edge()).max(0.0);
            sum_weights += weight;
            curv += weight * curvatures[vv.index()];
        }
        if sum_weights > 0.0 {
            curvatures[v.index()] = curv / sum_weights;
        }
    }

    // boundary and feature curvatures are meaningless, mark them negative
    let mut sizes = vec![0.0; n];
    for v in mesh.vertex_ids() {
        sizes[v.index()] = if mesh.is_boundary_vertex(v) || is_feature(v) {
            -1.0
        } else {
            curvatures[v.index()]
        };
    }

    // two passes to carry interior curvatures onto the marked vertices
    for _ in 0..2 {
        for v in mesh.vertex_ids() {
            let mut ww = 0.0;
            let mut cc = 0.0;
            for h in mesh.vertex_halfedges(v) {
                let c = sizes[mesh.dest(h).index()];
                if c > 0.0 {
                    let w = mesh.cotan_weight(h.edge()).max(0.0);
                    ww += w;
                    cc += w * c;
                }
            }
            sizes[v.index()] = if ww > 0.0 { cc / ww } else { 0.0 };
        }
    }

    for v in mesh.vertex_ids() {
        let size = &mut sizes[v.index()];
        *size = chord_length(*size, approx_error).clamp(min_length, max_length);
    }

    log::debug!(
        "sizing field: {} vertices in [{}, {}]",
        mesh.num_vertices(),
        min_length,
        max_length
    );
    SizingField {
        vertex_sizes: sizes,
    }
}

/// Edge length of an equilateral triangle inscribed in a circle of
/// curvature `curvature` whose edges deviate at most `error` from the arc.
fn chord_length(curvature: f64, error: f64) -> f64 {
    if curvature <= 0.0 {
        return f64::INFINITY;
    }
    let r = 1.0 / curvature;
    if error < r {
        (6.0 * error * r - 3.0 * error * error).sqrt()
    } else {
        error * 3.0 / 3.0_f64.sqrt()
    }
}
