//! Quadric Error Metrics (QEM) decimation.
//!
//! Every vertex keeps its cheapest legal outgoing collapse in a binary heap.
//! Heap entries carry the vertex version at the time they were pushed; a
//! vertex whose neighborhood changes is re-enqueued with a new version, and
//! outdated entries are dropped when popped.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use nalgebra::{Point3, Vector2, Vector3};

use super::quadric::{NormalCone, Quadric};
use super::DecimateOptions;
use crate::error::{MeshError, Result};
use crate::mesh::{
    dist_point_triangle, triangle_normal, EdgeProperty, FaceId, HalfEdgeId, HalfEdgeMesh,
    HalfEdgeProperty, VertexId, VertexProperty,
};

/// Decimate a triangle mesh down to `options.target_vertices` vertices.
///
/// Collapses stop early once no legal collapse is left or the progress abort
/// hook fires. The mesh is garbage collected before returning, so all handles
/// taken before the call are invalidated.
///
/// # Errors
///
/// - [`MeshError::Precondition`] if the mesh is not a triangle mesh or the
///   target exceeds the current vertex count.
/// - [`MeshError::InvalidParameter`] for unusable thresholds.
pub fn decimate(mesh: &mut HalfEdgeMesh, options: &DecimateOptions) -> Result<()> {
    options.validate()?;

    if !mesh.is_triangle_mesh() {
        return Err(MeshError::Precondition(
            "decimation requires a triangle mesh".to_string(),
        ));
    }
    let original = mesh.num_vertices();
    if options.target_vertices > original {
        return Err(MeshError::Precondition(format!(
            "target of {} vertices exceeds the current {}",
            options.target_vertices, original
        )));
    }

    log::info!(
        "decimate: {} vertices, {} faces -> target {} vertices",
        original,
        mesh.num_faces(),
        options.target_vertices
    );

    let collapses = Decimator::new(mesh, options).run()?;
    mesh.garbage_collection();

    log::info!(
        "decimate: {} collapses, {} vertices, {} faces",
        collapses,
        mesh.num_vertices(),
        mesh.num_faces()
    );
    Ok(())
}

/// The halfedges, vertices and faces around a collapse of `v0v1`.
///
/// `vl`/`fl` lie left of `v0v1`, `vr`/`fr` left of `v1v0`. Handles on a
/// boundary side are invalid.
#[derive(Debug, Clone, Copy)]
struct CollapseData {
    v0v1: HalfEdgeId,
    v1v0: HalfEdgeId,
    v0: VertexId,
    v1: VertexId,
    vl: VertexId,
    vr: VertexId,
    fl: FaceId,
    fr: FaceId,
    vlv0: HalfEdgeId,
    v0vr: HalfEdgeId,
}

impl CollapseData {
    fn new(mesh: &HalfEdgeMesh, h: HalfEdgeId) -> Self {
        let v0v1 = h;
        let v1v0 = mesh.twin(h);
        let mut cd = Self {
            v0v1,
            v1v0,
            v0: mesh.dest(v1v0),
            v1: mesh.dest(v0v1),
            vl: VertexId::invalid(),
            vr: VertexId::invalid(),
            fl: mesh.face_of(v0v1),
            fr: mesh.face_of(v1v0),
            vlv0: HalfEdgeId::invalid(),
            v0vr: HalfEdgeId::invalid(),
        };

        if cd.fl.is_valid() {
            let v1vl = mesh.next(v0v1);
            cd.vlv0 = mesh.next(v1vl);
            cd.vl = mesh.dest(v1vl);
        }
        if cd.fr.is_valid() {
            cd.v0vr = mesh.next(v1v0);
            cd.vr = mesh.dest(cd.v0vr);
        }
        cd
    }
}

/// A heap entry: the best collapse found for `vertex` at `version`.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    cost: f64,
    halfedge: HalfEdgeId,
    vertex: VertexId,
    version: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap, lowest halfedge first on ties
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.halfedge.cmp(&self.halfedge))
    }
}

struct Decimator<'a> {
    mesh: &'a mut HalfEdgeMesh,
    options: &'a DecimateOptions,

    // per vertex
    quadrics: Vec<Quadric>,
    versions: Vec<u32>,

    // per face, fixed since faces are only ever removed
    normals: Vec<Vector3<f64>>,
    cones: Vec<NormalCone>,
    face_points: Vec<Vec<Point3<f64>>>,

    // per edge
    seams: Vec<bool>,

    selection: Option<VertexProperty<bool>>,
    locked: Option<VertexProperty<bool>>,
    features: Option<(VertexProperty<bool>, EdgeProperty<bool>)>,
    texcoords: Option<HalfEdgeProperty<Vector2<f64>>>,

    normal_deviation: f64,
    seam_cos: f64,
}

impl<'a> Decimator<'a> {
    fn new(mesh: &'a mut HalfEdgeMesh, options: &'a DecimateOptions) -> Self {
        let m: &HalfEdgeMesh = mesh;
        let any_set = |prop: VertexProperty<bool>| m.vertex_ids().any(|v| *m.prop(prop, v));

        let selection = m
            .get_property::<VertexId, bool>("v:selected")
            .filter(|&p| any_set(p));
        let locked = m
            .get_property::<VertexId, bool>("v:locked")
            .filter(|&p| any_set(p));
        let features = if options.preserve_features {
            m.get_property::<VertexId, bool>("v:feature")
                .zip(m.get_property::<_, bool>("e:feature"))
                .filter(|&(vf, _)| any_set(vf))
        } else {
            None
        };
        let texcoords = m.get_property("h:tex");

        let normals: Vec<Vector3<f64>> = (0..m.faces_size())
            .map(|i| {
                let f = FaceId::new(i);
                if m.is_deleted(f) {
                    Vector3::zeros()
                } else {
                    m.face_normal(f)
                }
            })
            .collect();

        let mut quadrics = vec![Quadric::zero(); m.vertices_size()];
        for v in m.vertex_ids() {
            let p = m.position(v);
            for f in m.vertex_faces(v) {
                quadrics[v.index()].add_assign(&Quadric::from_point_normal(&normals[f.index()], p));
            }
        }

        let cones = if options.normal_deviation > 0.0 {
            normals.iter().map(|&n| NormalCone::new(n)).collect()
        } else {
            Vec::new()
        };
        let face_points = if options.hausdorff_error > 0.0 {
            vec![Vec::new(); m.faces_size()]
        } else {
            Vec::new()
        };
        let versions = vec![0; m.vertices_size()];

        let mut decimator = Self {
            quadrics,
            versions,
            normals,
            cones,
            face_points,
            seams: Vec::new(),
            selection,
            locked,
            features,
            texcoords,
            normal_deviation: options.normal_deviation.to_radians(),
            seam_cos: (180.0 - options.seam_angle_deviation) / 180.0,
            mesh,
            options,
        };
        decimator.detect_seams();
        decimator
    }

    /// Mark edges whose corner texture coordinates differ between the two
    /// incident faces.
    fn detect_seams(&mut self) {
        let Some(tex) = self.texcoords else {
            return;
        };
        let mesh = &*self.mesh;
        let threshold = self.options.seam_threshold;

        let mut seams = vec![false; mesh.edges_size()];
        for e in mesh.edge_ids() {
            if mesh.is_boundary_edge(e) {
                continue;
            }
            let h0 = e.halfedge(0);
            let h1 = e.halfedge(1);
            let start = (mesh.prop(tex, h1) - mesh.prop(tex, mesh.prev(h0))).norm();
            let end = (mesh.prop(tex, h0) - mesh.prop(tex, mesh.prev(h1))).norm();
            seams[e.index()] = start > threshold || end > threshold;
        }

        let count = seams.iter().filter(|&&s| s).count();
        log::debug!("decimate: {} texture seam edges", count);
        if count > 0 {
            self.seams = seams;
        }
    }

    fn is_seam(&self, h: HalfEdgeId) -> bool {
        self.seams.get(h.edge().index()).copied().unwrap_or(false)
    }

    fn run(mut self) -> Result<usize> {
        let target = self.options.target_vertices;
        let mut heap = BinaryHeap::with_capacity(self.mesh.num_vertices());
        let vertices: Vec<VertexId> = self.mesh.vertex_ids().collect();
        for v in vertices {
            self.enqueue_vertex(&mut heap, v);
        }

        let mut nv = self.mesh.num_vertices();
        let total = nv - target;
        let mut collapses = 0;
        let mut one_ring = Vec::new();

        while nv > target {
            if self.options.progress.is_aborted() {
                log::info!("decimate: aborted after {} collapses", collapses);
                break;
            }
            let Some(candidate) = heap.pop() else {
                break;
            };

            let v = candidate.vertex;
            let h = candidate.halfedge;
            if self.mesh.is_deleted(v)
                || candidate.version != self.versions[v.index()]
                || self.mesh.is_deleted(h)
                || self.mesh.origin(h) != v
            {
                continue;
            }

            // the neighborhood may have changed since the entry was pushed
            if !self.mesh.is_collapse_ok(h) || !self.texcoord_check(h) {
                continue;
            }

            let cd = CollapseData::new(self.mesh, h);
            one_ring.clear();
            one_ring.extend(self.mesh.vertex_neighbors(cd.v0));

            self.preprocess_collapse(&cd);
            self.mesh.collapse(h)?;
            nv -= 1;
            collapses += 1;
            self.postprocess_collapse(&cd);

            for &vv in &one_ring {
                self.enqueue_vertex(&mut heap, vv);
            }

            self.options.progress.report(collapses, total, "Decimating");
        }

        if nv > target {
            log::debug!(
                "decimate: stopped at {} vertices, no legal collapse left",
                nv
            );
        }
        Ok(collapses)
    }

    /// Push the cheapest legal outgoing collapse of `v`, invalidating any
    /// earlier entry for it.
    fn enqueue_vertex(&mut self, heap: &mut BinaryHeap<Candidate>, v: VertexId) {
        let version = &mut self.versions[v.index()];
        *version = version.wrapping_add(1);
        let version = *version;

        let mut best: Option<(f64, HalfEdgeId)> = None;
        for h in self.mesh.vertex_halfedges(v) {
            let cd = CollapseData::new(self.mesh, h);
            if !self.is_collapse_legal(&cd) {
                continue;
            }
            let cost = self.priority(&cd);
            let better = match best {
                None => true,
                Some((c, bh)) => cost < c || (cost == c && h < bh),
            };
            if better {
                best = Some((cost, h));
            }
        }

        if let Some((cost, halfedge)) = best {
            heap.push(Candidate {
                cost,
                halfedge,
                vertex: v,
                version,
            });
        }
    }

    fn priority(&self, cd: &CollapseData) -> f64 {
        let q = self.quadrics[cd.v0.index()] + self.quadrics[cd.v1.index()];
        q.evaluate(self.mesh.position(cd.v1))
    }

    /// Corners of `f` with `v0` moved to `p`.
    fn moved_corners(&self, f: FaceId, v0: VertexId, p: &Point3<f64>) -> [Point3<f64>; 3] {
        let corners = self.mesh.face_triangle(f);
        corners.map(|v| if v == v0 { *p } else { *self.mesh.position(v) })
    }

    fn is_collapse_legal(&self, cd: &CollapseData) -> bool {
        let mesh = &*self.mesh;

        if let Some(selected) = self.selection {
            if !*mesh.prop(selected, cd.v0) {
                return false;
            }
        }
        if let Some(locked) = self.locked {
            if *mesh.prop(locked, cd.v0) {
                return false;
            }
        }

        if let Some((vfeature, efeature)) = self.features {
            if *mesh.prop(vfeature, cd.v0) && !*mesh.prop(efeature, cd.v0v1.edge()) {
                return false;
            }
            if cd.vl.is_valid() && *mesh.prop(efeature, cd.vlv0.edge()) {
                return false;
            }
            if cd.vr.is_valid() && *mesh.prop(efeature, cd.v0vr.edge()) {
                return false;
            }
        }

        // do not pull boundary vertices into the interior
        if mesh.is_boundary_vertex(cd.v0) && !mesh.is_boundary_vertex(cd.v1) {
            return false;
        }

        // at least two faces at v0
        if mesh.cw_rotated(mesh.cw_rotated(cd.v0v1)) == cd.v0v1 {
            return false;
        }

        if !mesh.is_collapse_ok(cd.v0v1) {
            return false;
        }

        if !self.texcoord_check(cd.v0v1) {
            return false;
        }

        let max_valence = self.options.max_valence;
        if max_valence > 0 {
            let val0 = mesh.valence(cd.v0);
            let val1 = mesh.valence(cd.v1);
            let mut val = val0 + val1 - 1;
            if cd.fl.is_valid() {
                val -= 1;
            }
            if cd.fr.is_valid() {
                val -= 1;
            }
            if val > max_valence && val >= val0.max(val1) {
                return false;
            }
        }

        let p0 = *mesh.position(cd.v0);
        let p1 = *mesh.position(cd.v1);

        let edge_length = self.options.edge_length;
        if edge_length > 0.0 {
            let too_long = mesh
                .vertex_neighbors(cd.v0)
                .filter(|&v| v != cd.v1 && v != cd.vl && v != cd.vr)
                .any(|v| (mesh.position(v) - p1).norm() > edge_length);
            if too_long {
                return false;
            }
        }

        // faces that survive the collapse with v0 moved onto v1
        let surviving: Vec<FaceId> = mesh
            .vertex_faces(cd.v0)
            .filter(|&f| f != cd.fl && f != cd.fr)
            .collect();

        let (fll, frr) = if self.normal_deviation > 0.0 {
            let fll = if cd.vl.is_valid() {
                mesh.face_of(mesh.twin(cd.vlv0))
            } else {
                FaceId::invalid()
            };
            let frr = if cd.vr.is_valid() {
                mesh.face_of(mesh.twin(cd.v0vr))
            } else {
                FaceId::invalid()
            };
            (fll, frr)
        } else {
            (FaceId::invalid(), FaceId::invalid())
        };

        for &f in &surviving {
            let [a, b, c] = self.moved_corners(f, cd.v0, &p1);
            let n1 = triangle_normal(&a, &b, &c);

            // zero-area result
            let l_max = (b - a)
                .norm_squared()
                .max((c - b).norm_squared())
                .max((a - c).norm_squared());
            if (b - a).cross(&(c - a)).norm() <= f64::EPSILON * l_max {
                return false;
            }

            if self.normal_deviation == 0.0 {
                if self.normals[f.index()].dot(&n1) < 0.0 {
                    return false;
                }
            } else {
                let mut cone = self.cones[f.index()];
                cone.merge_normal(n1);
                if f == fll {
                    cone.merge(&self.cones[cd.fl.index()]);
                }
                if f == frr {
                    cone.merge(&self.cones[cd.fr.index()]);
                }
                if cone.angle() > 0.5 * self.normal_deviation {
                    return false;
                }
            }
        }

        let aspect_limit = self.options.aspect_ratio;
        if aspect_limit > 0.0 {
            let mut ar0: f64 = 0.0;
            let mut ar1: f64 = 0.0;
            for &f in &surviving {
                ar0 = ar0.max(aspect_ratio(&self.moved_corners(f, cd.v0, &p0)));
                ar1 = ar1.max(aspect_ratio(&self.moved_corners(f, cd.v0, &p1)));
            }
            // too bad and not improving
            if ar1 > aspect_limit && ar1 > ar0 {
                return false;
            }
        }

        let hausdorff = self.options.hausdorff_error;
        if hausdorff > 0.0 {
            let points = mesh
                .vertex_faces(cd.v0)
                .flat_map(|f| self.face_points[f.index()].iter().copied())
                .chain(std::iter::once(p0));
            for point in points {
                let covered = surviving.iter().any(|&f| {
                    let [a, b, c] = self.moved_corners(f, cd.v0, &p1);
                    dist_point_triangle(&point, &a, &b, &c).0 < hausdorff
                });
                if !covered {
                    return false;
                }
            }
        }

        true
    }

    /// Texture seams may only be collapsed along themselves, and only where
    /// the seam is nearly straight on both sides.
    fn texcoord_check(&self, h: HalfEdgeId) -> bool {
        let Some(tex) = self.texcoords else {
            return true;
        };
        if self.seams.is_empty() {
            return true;
        }
        let mesh = &*self.mesh;
        let o = mesh.twin(h);
        let v0 = mesh.dest(o);

        if !self.is_seam(h) {
            // a seam vertex must stay where it is
            return !mesh
                .vertex_halfedges(v0)
                .any(|he| he != h && self.is_seam(he));
        }

        let seam_edges = mesh.vertex_halfedges(v0).filter(|&he| self.is_seam(he)).count();
        if seam_edges > 2 {
            return false;
        }

        let direction = |he: HalfEdgeId| -> Vector2<f64> {
            let d = mesh.prop(tex, he) - mesh.prop(tex, mesh.prev(he));
            d.try_normalize(f64::MIN_POSITIVE).unwrap_or_else(Vector2::zeros)
        };

        let seam1 = h;
        let mut seam2 = mesh.prev(h);
        let mut guard = 0;
        while seam2 != o && guard <= mesh.valence(v0) {
            if self.is_seam(seam2) {
                let s1 = direction(seam1);
                let s2 = direction(seam2);
                let o1 = direction(mesh.twin(seam1));
                let o2 = direction(mesh.twin(seam2));
                if s1.dot(&s2) < self.seam_cos || o1.dot(&o2) < self.seam_cos {
                    return false;
                }
            }
            seam2 = mesh.prev(mesh.twin(seam2));
            guard += 1;
        }
        true
    }

    /// Move texture coordinates onto the halfedges that survive the collapse.
    fn preprocess_collapse(&mut self, cd: &CollapseData) {
        let Some(tex) = self.texcoords else {
            return;
        };
        let h = cd.v0v1;
        let o = cd.v1v0;
        let steps = self.mesh.valence(cd.v0).saturating_sub(1);

        let mut hit = h;
        let mut first_side = true;
        for _ in 0..steps {
            hit = self.mesh.prev(hit);
            let source = if first_side { h } else { self.mesh.prev(o) };
            let value = *self.mesh.prop(tex, source);
            self.mesh.set_prop(tex, hit, value);

            if self.is_seam(hit) {
                first_side = false;

                // the seam continues into the left triangle
                let v1v2 = self.mesh.next(h);
                if self.mesh.dest(v1v2) == self.mesh.origin(hit) {
                    let a = *self.mesh.prop(tex, hit);
                    let b = *self.mesh.prop(tex, hit.twin());
                    self.mesh.set_prop(tex, v1v2.twin(), a);
                    self.mesh.set_prop(tex, v1v2, b);
                    self.seams[v1v2.edge().index()] = true;
                }

                // the seam continues into the right triangle
                if self.mesh.dest(self.mesh.next(o)) == self.mesh.origin(hit) {
                    let v2v1 = self.mesh.prev(o);
                    let v0v2 = hit.twin();
                    let a = *self.mesh.prop(tex, v0v2);
                    let b = *self.mesh.prop(tex, hit);
                    self.mesh.set_prop(tex, v2v1.twin(), a);
                    self.mesh.set_prop(tex, v2v1, b);
                    self.seams[v2v1.edge().index()] = true;
                }
            }
            hit = hit.twin();
        }
    }

    fn postprocess_collapse(&mut self, cd: &CollapseData) {
        let q0 = self.quadrics[cd.v0.index()];
        self.quadrics[cd.v1.index()].add_assign(&q0);

        if self.normal_deviation > 0.0 {
            for f in self.mesh.vertex_faces(cd.v1) {
                self.cones[f.index()].merge_normal(self.mesh.face_normal(f));
            }

            // faces that absorbed the removed triangles
            if cd.vl.is_valid() {
                if let Some(h) = self.mesh.find_halfedge(cd.v1, cd.vl) {
                    let f = self.mesh.face_of(h);
                    if f.is_valid() {
                        let cone = self.cones[cd.fl.index()];
                        self.cones[f.index()].merge(&cone);
                    }
                }
            }
            if cd.vr.is_valid() {
                if let Some(h) = self.mesh.find_halfedge(cd.vr, cd.v1) {
                    let f = self.mesh.face_of(h);
                    if f.is_valid() {
                        let cone = self.cones[cd.fr.index()];
                        self.cones[f.index()].merge(&cone);
                    }
                }
            }
        }

        if self.options.hausdorff_error > 0.0 {
            let faces: Vec<FaceId> = self.mesh.vertex_faces(cd.v1).collect();

            let mut points = Vec::new();
            for &f in &faces {
                points.append(&mut self.face_points[f.index()]);
            }
            for f in [cd.fl, cd.fr] {
                if f.is_valid() {
                    points.extend(std::mem::take(&mut self.face_points[f.index()]));
                }
            }
            points.push(*self.mesh.position(cd.v0));

            // each sample goes to its closest remaining face
            for point in points {
                let closest = faces
                    .iter()
                    .map(|&f| {
                        let [a, b, c] = self.mesh.face_positions(f);
                        (dist_point_triangle(&point, &a, &b, &c).0, f)
                    })
                    .min_by(|a, b| a.0.total_cmp(&b.0));
                if let Some((_, f)) = closest {
                    self.face_points[f.index()].push(point);
                }
            }
        }
    }
}

/// Squared longest edge over twice the area.
fn aspect_ratio(corners: &[Point3<f64>; 3]) -> f64 {
    let [p0, p1, p2] = corners;
    let d0 = p0 - p1;
    let d1 = p1 - p2;
    let d2 = p2 - p0;
    let l = d0.norm_squared().max(d1.norm_squared()).max(d2.norm_squared());
    let a = d0.cross(&d1).norm();
    if a > 0.0 {
        l / a
    } else {
        f64::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::progress::Progress;
    use crate::mesh::shapes;

    fn assert_valid_triangle_mesh(mesh: &HalfEdgeMesh) {
        mesh.validate().unwrap();
        assert!(mesh.is_triangle_mesh());
        assert!(!mesh.has_garbage());
        for v in mesh.vertex_ids() {
            assert!(mesh.is_manifold(v));
        }
    }

    fn contains_point(mesh: &HalfEdgeMesh, p: &Point3<f64>) -> bool {
        mesh.vertex_ids().any(|v| (mesh.position(v) - p).norm() < 1e-12)
    }

    #[test]
    fn test_candidate_ordering() {
        let a = Candidate {
            cost: 1.0,
            halfedge: HalfEdgeId::new(7),
            vertex: VertexId::new(0),
            version: 1,
        };
        let b = Candidate {
            cost: 1.0,
            halfedge: HalfEdgeId::new(3),
            ..a
        };
        let c = Candidate { cost: 0.5, ..a };

        let mut heap = BinaryHeap::from(vec![a, b, c]);
        assert_eq!(heap.pop().map(|x| x.cost), Some(0.5));
        // equal cost: lowest halfedge wins
        assert_eq!(heap.pop().map(|x| x.halfedge), Some(HalfEdgeId::new(3)));
        assert_eq!(heap.pop().map(|x| x.halfedge), Some(HalfEdgeId::new(7)));
    }

    #[test]
    fn test_decimate_icosahedron_aggressively() {
        let mut mesh = shapes::icosahedron().unwrap();
        let target = mesh.num_vertices() / 100;
        decimate(&mut mesh, &DecimateOptions::new(target)).unwrap();

        assert!(mesh.num_vertices() < 12);
        assert_valid_triangle_mesh(&mesh);
        for e in mesh.edge_ids() {
            assert!(!mesh.is_boundary_edge(e));
        }
    }

    #[test]
    fn test_decimate_stops_at_target() {
        let mut mesh = shapes::triangle_plane(6).unwrap();
        decimate(&mut mesh, &DecimateOptions::new(30)).unwrap();

        assert_eq!(mesh.num_vertices(), 30);
        assert_valid_triangle_mesh(&mesh);
        for v in mesh.vertex_ids() {
            assert_eq!(mesh.position(v).z, 0.0);
        }
    }

    #[test]
    fn test_decimate_full_target_is_noop() {
        let mut mesh = shapes::icosahedron().unwrap();
        decimate(&mut mesh, &DecimateOptions::new(12)).unwrap();
        assert_eq!(mesh.num_vertices(), 12);
        assert_eq!(mesh.num_faces(), 20);
    }

    #[test]
    fn test_decimate_preconditions() {
        let mut mesh = shapes::icosahedron().unwrap();
        let err = decimate(&mut mesh, &DecimateOptions::new(13)).unwrap_err();
        assert!(err.is_precondition_error());
        assert_eq!(mesh.num_vertices(), 12);

        let mut quads = shapes::plane(2).unwrap();
        let err = decimate(&mut quads, &DecimateOptions::new(4)).unwrap_err();
        assert!(matches!(err, MeshError::Precondition(_)));

        let bad = DecimateOptions::new(4).with_aspect_ratio(-1.0);
        let err = decimate(&mut mesh, &bad).unwrap_err();
        assert!(matches!(err, MeshError::InvalidParameter { .. }));
    }

    #[test]
    fn test_boundary_stays_on_boundary() {
        let mut mesh = shapes::triangle_plane(5).unwrap();
        decimate(&mut mesh, &DecimateOptions::new(0)).unwrap();
        assert_valid_triangle_mesh(&mesh);

        // boundary vertices only ever merge along the boundary
        for v in mesh.vertex_ids() {
            let p = mesh.position(v);
            let on_border = p.x == 0.0 || p.x == 1.0 || p.y == 0.0 || p.y == 1.0;
            assert_eq!(on_border, mesh.is_boundary_vertex(v), "{p:?}");
        }
    }

    #[test]
    fn test_selection_restricts_collapses() {
        let mut mesh = shapes::triangle_plane(4).unwrap();
        let selected = mesh.add_vertex_property("v:selected", false).unwrap();
        let keep: Vec<Point3<f64>> = mesh
            .vertex_ids()
            .filter(|&v| mesh.position(v).x < 0.5)
            .map(|v| *mesh.position(v))
            .collect();
        let vertices: Vec<VertexId> = mesh.vertex_ids().collect();
        for v in vertices {
            let free = mesh.position(v).x >= 0.5;
            mesh.set_prop(selected, v, free);
        }

        decimate(&mut mesh, &DecimateOptions::new(0)).unwrap();

        assert!(mesh.num_vertices() < 25);
        assert_valid_triangle_mesh(&mesh);
        for p in &keep {
            assert!(contains_point(&mesh, p), "unselected vertex {p:?} was removed");
        }
    }

    #[test]
    fn test_feature_vertices_without_feature_edges_stay() {
        let mut mesh = shapes::triangle_plane(3).unwrap();
        let vfeature = mesh.add_vertex_property("v:feature", false).unwrap();
        mesh.add_edge_property("e:feature", false).unwrap();
        let vertices: Vec<VertexId> = mesh.vertex_ids().collect();
        for &v in &vertices {
            mesh.set_prop(vfeature, v, true);
        }

        decimate(&mut mesh, &DecimateOptions::new(0)).unwrap();
        assert_eq!(mesh.num_vertices(), 16);

        // the marks are ignored on request
        let options = DecimateOptions::new(0).with_preserve_features(false);
        decimate(&mut mesh, &options).unwrap();
        assert!(mesh.num_vertices() < 16);
        assert_valid_triangle_mesh(&mesh);
    }

    #[test]
    fn test_max_valence_is_respected() {
        let mut mesh = shapes::triangle_plane(6).unwrap();
        decimate(&mut mesh, &DecimateOptions::new(0).with_max_valence(6)).unwrap();

        assert!(mesh.num_vertices() < 49);
        assert_valid_triangle_mesh(&mesh);
        for v in mesh.vertex_ids() {
            assert!(mesh.valence(v) <= 6, "valence {}", mesh.valence(v));
        }
    }

    #[test]
    fn test_hausdorff_error_blocks_shape_change() {
        // every collapse on a sphere-like solid moves the surface
        let mut mesh = shapes::icosahedron().unwrap();
        let options = DecimateOptions::new(0).with_hausdorff_error(1e-6);
        decimate(&mut mesh, &options).unwrap();
        assert_eq!(mesh.num_vertices(), 12);

        // collapses within a plane keep the distance at zero
        let mut mesh = shapes::triangle_plane(4).unwrap();
        decimate(&mut mesh, &options).unwrap();
        assert!(mesh.num_vertices() < 25);
        assert_valid_triangle_mesh(&mesh);
    }

    #[test]
    fn test_abort_before_first_collapse() {
        let mut mesh = shapes::icosahedron().unwrap();
        let options = DecimateOptions::new(0).with_progress(Progress::none().with_abort(|| true));
        decimate(&mut mesh, &options).unwrap();
        assert_eq!(mesh.num_vertices(), 12);
        mesh.validate().unwrap();
    }

    #[test]
    fn test_uniform_texcoords_do_not_block() {
        let mut mesh = shapes::triangle_plane(4).unwrap();
        let tex = mesh.add_halfedge_property("h:tex", Vector2::zeros()).unwrap();
        let halfedges: Vec<HalfEdgeId> = mesh.halfedge_ids().collect();
        for h in halfedges {
            let p = *mesh.position(mesh.dest(h));
            mesh.set_prop(tex, h, Vector2::new(p.x, p.y));
        }

        decimate(&mut mesh, &DecimateOptions::new(10)).unwrap();
        assert_eq!(mesh.num_vertices(), 10);
        assert_valid_triangle_mesh(&mesh);

        // each corner still carries its vertex's planar coordinates
        let tex = mesh.get_property::<HalfEdgeId, Vector2<f64>>("h:tex").unwrap();
        for h in mesh.halfedge_ids() {
            let p = mesh.position(mesh.dest(h));
            assert!((mesh.prop(tex, h) - Vector2::new(p.x, p.y)).norm() < 1e-12);
        }
    }

    #[test]
    fn test_seam_detection() {
        let mut mesh = shapes::triangle_plane(2).unwrap();
        let tex = mesh.add_halfedge_property("h:tex", Vector2::zeros()).unwrap();
        // shift the corners of faces left of x = 0.5
        let halfedges: Vec<HalfEdgeId> = mesh.halfedge_ids().collect();
        for h in halfedges {
            let f = mesh.face_of(h);
            if f.is_valid() {
                let offset = if mesh.face_centroid(f).x < 0.5 { 1.0 } else { 0.0 };
                mesh.set_prop(tex, h, Vector2::new(offset, 0.0));
            }
        }

        let options = DecimateOptions::new(0);
        let decimator = Decimator::new(&mut mesh, &options);
        let seams: Vec<bool> = decimator.seams.clone();
        drop(decimator);

        for e in mesh.edge_ids() {
            let a = mesh.position(mesh.edge_vertex(e, 0));
            let b = mesh.position(mesh.edge_vertex(e, 1));
            let on_seam = a.x == 0.5 && b.x == 0.5;
            assert_eq!(seams[e.index()], on_seam, "{a:?} {b:?}");
        }
    }

    #[test]
    fn test_aspect_ratio() {
        let equilateral = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 3.0_f64.sqrt() / 2.0, 0.0),
        ];
        assert!((aspect_ratio(&equilateral) - 1.0 / 3.0_f64.sqrt()).abs() < 1e-12);

        let flat = [Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0)];
        assert_eq!(aspect_ratio(&flat), f64::INFINITY);
    }
}
