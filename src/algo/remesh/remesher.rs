//! Split, collapse, flip and relaxation passes driving [`remesh`].

use nalgebra::{Matrix3, Point3, Vector3};
use rayon::prelude::*;

use super::kdtree::{barycentric_coordinates, TriangleKdTree};
use super::sizing::compute_sizing_field;
use super::{RemeshOptions, SizingMode};
use crate::error::{MeshError, Result};
use crate::mesh::{EdgeId, EdgeProperty, HalfEdgeId, HalfEdgeMesh, VertexId, VertexProperty};

/// Upper bound on sweeps over all edges per phase.
const MAX_PASSES: usize = 10;

/// Relaxation steps per iteration.
const SMOOTHING_STEPS: usize = 5;

const KD_MAX_FACES: usize = 10;
const KD_MAX_DEPTH: usize = 30;

const LOCKED_VERTICES: &str = "v:remesh:locked";
const LOCKED_EDGES: &str = "e:remesh:locked";
const SIZING: &str = "v:remesh:sizing";

/// Smallest cosine tolerated at a triangle corner before the triangle
/// counts as a cap (about 170 degrees).
const CAP_COS: f64 = -0.984_807_753_012_208;

const EPS: f64 = 1e-12;

/// Remesh a triangle mesh toward the edge lengths configured in `options`.
///
/// Each iteration splits edges longer than `4/3` of the smaller endpoint
/// target, collapses edges shorter than `4/5` of it, flips edges to bring
/// valences toward 6 (4 on the boundary) and relaxes vertices tangentially.
/// With `use_projection` moved vertices are snapped back onto the input
/// surface. Triangles with a corner near 180 degrees are flipped away at the
/// end.
///
/// Boundary vertices never move. Vertices in `v:locked` are neither moved
/// nor removed, and edges in `e:locked` are neither split, collapsed nor
/// flipped. With a non-empty `v:selected` set, the vertices outside it stay
/// untouched together with their edges. Edges in `e:feature` are neither
/// collapsed nor flipped and are split into feature edges; `v:feature`
/// vertices slide along their feature lines, and feature vertices without
/// exactly two feature edges stay in place.
///
/// Any pending deletions are garbage-collected first, and the mesh is
/// compacted again afterwards, so previously held handles are invalidated.
///
/// # Errors
///
/// Returns a precondition error for non-triangle input or unusable options.
pub fn remesh(mesh: &mut HalfEdgeMesh, options: &RemeshOptions) -> Result<()> {
    if !mesh.is_triangle_mesh() {
        return Err(MeshError::Precondition(
            "remeshing requires a triangle mesh".into(),
        ));
    }
    options.validate()?;
    if let SizingMode::Custom(lengths) = &options.mode {
        if lengths.len() != mesh.num_vertices() {
            return Err(MeshError::Precondition(format!(
                "{} target lengths given for {} vertices",
                lengths.len(),
                mesh.num_vertices()
            )));
        }
    }

    if mesh.has_garbage() {
        mesh.garbage_collection();
    }

    let (nv, nf) = (mesh.num_vertices(), mesh.num_faces());
    log::info!(
        "remesh: {} vertices, {} faces, target length [{}, {}]",
        nv,
        nf,
        options.min_length,
        options.max_length
    );

    let mut remesher = Remesher::new(mesh, options)?;
    let result = remesher.run();
    remesher.finish();
    result?;

    log::info!(
        "remesh: {} -> {} vertices, {} -> {} faces",
        nv,
        mesh.num_vertices(),
        nf,
        mesh.num_faces()
    );
    Ok(())
}

/// Snapshot of the input surface used for projection.
struct Reference {
    points: Vec<Point3<f64>>,
    normals: Vec<Vector3<f64>>,
    sizing: Vec<f64>,
    corners: Vec<[VertexId; 3]>,
    tree: TriangleKdTree,
}

struct Remesher<'a> {
    mesh: &'a mut HalfEdgeMesh,
    options: &'a RemeshOptions,

    vnormal: VertexProperty<Vector3<f64>>,
    vfeature: VertexProperty<bool>,
    efeature: EdgeProperty<bool>,
    vlocked: VertexProperty<bool>,
    elocked: EdgeProperty<bool>,
    vsizing: VertexProperty<f64>,

    created_vfeature: bool,
    created_efeature: bool,

    reference: Option<Reference>,
}

impl<'a> Remesher<'a> {
    fn new(mesh: &'a mut HalfEdgeMesh, options: &'a RemeshOptions) -> Result<Self> {
        let vnormal = mesh.update_vertex_normals()?;

        let created_vfeature = mesh.get_property::<VertexId, bool>("v:feature").is_none();
        let created_efeature = mesh.get_property::<EdgeId, bool>("e:feature").is_none();
        let vfeature = mesh.add_property("v:feature", false)?;
        let efeature = match mesh.add_property("e:feature", false) {
            Ok(prop) => prop,
            Err(err) => {
                if created_vfeature {
                    mesh.remove_property(vfeature);
                }
                return Err(err);
            }
        };

        let vlocked = mesh.add_property(LOCKED_VERTICES, false)?;
        let elocked = mesh.add_property(LOCKED_EDGES, false)?;
        let vsizing = mesh.add_property(SIZING, 0.0)?;

        let mut remesher = Self {
            mesh,
            options,
            vnormal,
            vfeature,
            efeature,
            vlocked,
            elocked,
            vsizing,
            created_vfeature,
            created_efeature,
            reference: None,
        };
        remesher.lock_elements();
        remesher.init_sizing();
        remesher.build_reference();
        Ok(remesher)
    }

    /// Seed the working locks from `v:locked`/`e:locked`, the selection
    /// and the feature corners.
    fn lock_elements(&mut self) {
        let mesh = &mut *self.mesh;

        if let Some(user) = mesh.get_property::<VertexId, bool>("v:locked") {
            let values = mesh.prop_values(user).to_vec();
            mesh.prop_values_mut(self.vlocked).copy_from_slice(&values);
        }
        if let Some(user) = mesh.get_property::<EdgeId, bool>("e:locked") {
            let values = mesh.prop_values(user).to_vec();
            mesh.prop_values_mut(self.elocked).copy_from_slice(&values);
        }

        // lock everything outside a non-empty selection, edges included
        if let Some(selected) = mesh.get_property::<VertexId, bool>("v:selected") {
            if mesh.vertex_ids().any(|v| *mesh.prop(selected, v)) {
                let unselected: Vec<VertexId> =
                    mesh.vertex_ids().filter(|&v| !*mesh.prop(selected, v)).collect();
                for v in unselected {
                    mesh.set_prop(self.vlocked, v, true);
                }

                let vlocked = self.vlocked;
                let locked_edges: Vec<EdgeId> = mesh
                    .edge_ids()
                    .filter(|&e| {
                        *mesh.prop(vlocked, mesh.edge_vertex(e, 0))
                            || *mesh.prop(vlocked, mesh.edge_vertex(e, 1))
                    })
                    .collect();
                for e in locked_edges {
                    mesh.set_prop(self.elocked, e, true);
                }
            }
        }

        // feature corners and endpoints cannot slide along a feature line,
        // their edges may still be split
        let (vfeature, efeature) = (self.vfeature, self.efeature);
        let corners: Vec<VertexId> = mesh
            .vertex_ids()
            .filter(|&v| {
                *mesh.prop(vfeature, v)
                    && mesh
                        .vertex_halfedges(v)
                        .filter(|h| *mesh.prop(efeature, h.edge()))
                        .count()
                        != 2
            })
            .collect();
        for v in corners {
            mesh.set_prop(self.vlocked, v, true);
        }
    }

    fn init_sizing(&mut self) {
        let options = self.options;
        let mesh = &mut *self.mesh;
        let sizes = match &options.mode {
            SizingMode::Uniform => vec![options.max_length; mesh.vertices_size()],
            SizingMode::Adaptive => {
                compute_sizing_field(
                    mesh,
                    options.min_length,
                    options.max_length,
                    options.approx_error,
                )
                .vertex_sizes
            }
            SizingMode::Custom(lengths) => {
                let mut sizes = vec![0.0; mesh.vertices_size()];
                for (v, &length) in mesh.vertex_ids().zip(lengths) {
                    sizes[v.index()] = length;
                }
                sizes
            }
        };
        mesh.prop_values_mut(self.vsizing).copy_from_slice(&sizes);
    }

    fn build_reference(&mut self) {
        if !self.options.use_projection {
            return;
        }
        let mesh: &HalfEdgeMesh = &*self.mesh;
        let mut corners = vec![[VertexId::invalid(); 3]; mesh.faces_size()];
        for f in mesh.face_ids() {
            corners[f.index()] = mesh.face_triangle(f);
        }
        self.reference = Some(Reference {
            points: mesh.points().to_vec(),
            normals: mesh.prop_values(self.vnormal).to_vec(),
            sizing: mesh.prop_values(self.vsizing).to_vec(),
            corners,
            tree: TriangleKdTree::new(mesh, KD_MAX_FACES, KD_MAX_DEPTH),
        });
    }

    fn run(&mut self) -> Result<()> {
        let options = self.options;
        let iterations = options.iterations;

        for iter in 0..iterations {
            if options.progress.is_aborted() {
                log::info!("remesh: aborted after {} of {} iterations", iter, iterations);
                break;
            }

            let splits = self.split_long_edges()?;
            self.mesh.update_vertex_normals()?;
            let collapses = self.collapse_short_edges()?;
            let flips = self.flip_edges()?;
            self.tangential_smoothing(SMOOTHING_STEPS)?;

            log::debug!(
                "remesh: iteration {}: {} splits, {} collapses, {} flips, {} vertices",
                iter,
                splits,
                collapses,
                flips,
                self.mesh.num_vertices()
            );
            options.progress.report(iter + 1, iterations, "remeshing");
        }

        let caps = self.remove_caps()?;
        if caps > 0 {
            log::debug!("remesh: flipped {} caps", caps);
        }
        Ok(())
    }

    /// Drop the working properties, keeping user-provided feature marks.
    fn finish(self) {
        let mesh = self.mesh;
        mesh.remove_property(self.vlocked);
        mesh.remove_property(self.elocked);
        mesh.remove_property(self.vsizing);
        if self.created_vfeature {
            mesh.remove_property(self.vfeature);
        }
        if self.created_efeature {
            mesh.remove_property(self.efeature);
        }
    }

    fn sizing(&self, v: VertexId) -> f64 {
        *self.mesh.prop(self.vsizing, v)
    }

    fn is_too_long(&self, v0: VertexId, v1: VertexId) -> bool {
        let d = (self.mesh.position(v0) - self.mesh.position(v1)).norm();
        d > 4.0 / 3.0 * self.sizing(v0).min(self.sizing(v1))
    }

    fn is_too_short(&self, v0: VertexId, v1: VertexId) -> bool {
        let d = (self.mesh.position(v0) - self.mesh.position(v1)).norm();
        d < 4.0 / 5.0 * self.sizing(v0).min(self.sizing(v1))
    }

    fn is_vertex_locked(&self, v: VertexId) -> bool {
        *self.mesh.prop(self.vlocked, v)
    }

    fn is_edge_locked(&self, e: EdgeId) -> bool {
        *self.mesh.prop(self.elocked, e)
    }

    fn is_feature_vertex(&self, v: VertexId) -> bool {
        *self.mesh.prop(self.vfeature, v)
    }

    fn is_feature_edge(&self, e: EdgeId) -> bool {
        *self.mesh.prop(self.efeature, e)
    }

    /// Move `v` to the closest point of the input surface and take over the
    /// interpolated normal and sizing there.
    fn project(&mut self, v: VertexId) {
        let Some(reference) = &self.reference else {
            return;
        };
        let Some(nn) = reference.tree.nearest(self.mesh.position(v)) else {
            return;
        };

        let [i0, i1, i2] = reference.corners[nn.face.index()].map(|c| c.index());
        let b = barycentric_coordinates(
            &nn.point,
            &reference.points[i0],
            &reference.points[i1],
            &reference.points[i2],
        );
        let normal = (reference.normals[i0] * b.x
            + reference.normals[i1] * b.y
            + reference.normals[i2] * b.z)
            .try_normalize(EPS)
            .unwrap_or_else(|| *self.mesh.prop(self.vnormal, v));
        let size =
            reference.sizing[i0] * b.x + reference.sizing[i1] * b.y + reference.sizing[i2] * b.z;

        self.mesh.set_position(v, nn.point);
        self.mesh.set_prop(self.vnormal, v, normal);
        self.mesh.set_prop(self.vsizing, v, size);
    }

    fn split_long_edges(&mut self) -> Result<usize> {
        let mut splits = 0;

        for _ in 0..MAX_PASSES {
            let mut done = true;

            for i in 0..self.mesh.edges_size() {
                let e = EdgeId::new(i);
                if self.mesh.is_deleted(e) || self.is_edge_locked(e) {
                    continue;
                }
                let v0 = self.mesh.edge_vertex(e, 0);
                let v1 = self.mesh.edge_vertex(e, 1);
                if !self.is_too_long(v0, v1) {
                    continue;
                }

                let is_feature = self.is_feature_edge(e);
                let midpoint = Point3::from(
                    (self.mesh.position(v0).coords + self.mesh.position(v1).coords) * 0.5,
                );
                let size = 0.5 * (self.sizing(v0) + self.sizing(v1));

                let vnew = self.mesh.add_vertex(midpoint);
                let t1 = self.mesh.split_edge(e, vnew)?;

                let normal = self.mesh.vertex_normal(vnew);
                self.mesh.set_prop(self.vnormal, vnew, normal);
                self.mesh.set_prop(self.vsizing, vnew, size);

                if is_feature {
                    self.mesh.set_prop(self.efeature, t1.edge(), true);
                    self.mesh.set_prop(self.vfeature, vnew, true);
                } else {
                    self.project(vnew);
                }

                splits += 1;
                done = false;
            }

            if done {
                break;
            }
        }

        Ok(splits)
    }

    fn collapse_short_edges(&mut self) -> Result<usize> {
        let mut collapses = 0;

        for _ in 0..MAX_PASSES {
            let mut done = true;

            for i in 0..self.mesh.edges_size() {
                let e = EdgeId::new(i);
                if self.mesh.is_deleted(e)
                    || self.is_edge_locked(e)
                    || self.is_feature_edge(e)
                    || self.mesh.is_boundary_edge(e)
                {
                    continue;
                }
                let v0 = self.mesh.edge_vertex(e, 0);
                let v1 = self.mesh.edge_vertex(e, 1);
                if !self.is_too_short(v0, v1) {
                    continue;
                }

                if let Some(h) = self.choose_collapse(e) {
                    self.mesh.collapse(h)?;
                    collapses += 1;
                    done = false;
                }
            }

            if done {
                break;
            }
        }

        self.mesh.garbage_collection();
        Ok(collapses)
    }

    /// Pick the direction in which the interior, non-feature edge `e` may be
    /// collapsed, preferring to keep the vertex with the higher valence.
    fn choose_collapse(&self, e: EdgeId) -> Option<HalfEdgeId> {
        let h10 = e.halfedge(0);
        let h01 = e.halfedge(1);
        let v0 = self.mesh.dest(h10);
        let v1 = self.mesh.dest(h01);

        // h01 removes v0, h10 removes v1
        let mut col01 = true;
        let mut col10 = true;

        let (b0, b1) = (self.mesh.is_boundary_vertex(v0), self.mesh.is_boundary_vertex(v1));
        if b0 && b1 {
            return None;
        } else if b0 {
            col01 = false;
        } else if b1 {
            col10 = false;
        }

        let (l0, l1) = (self.is_vertex_locked(v0), self.is_vertex_locked(v1));
        if l0 && l1 {
            return None;
        } else if l0 {
            col01 = false;
        } else if l1 {
            col10 = false;
        }

        let (f0, f1) = (self.is_feature_vertex(v0), self.is_feature_vertex(v1));
        if f0 && f1 {
            return None;
        } else if f0 {
            col01 = false;
        } else if f1 {
            col10 = false;
        }

        col01 = col01 && self.mesh.is_collapse_ok(h01) && self.keeps_orientation(h01);
        col10 = col10 && self.mesh.is_collapse_ok(h10) && self.keeps_orientation(h10);

        if col01 && col10 {
            if self.mesh.valence(v0) < self.mesh.valence(v1) {
                col10 = false;
            } else {
                col01 = false;
            }
        }

        // the surviving vertex must not end up with too long edges
        if col10 {
            self.mesh
                .vertex_neighbors(v1)
                .all(|vv| !self.is_too_long(v0, vv))
                .then_some(h10)
        } else if col01 {
            self.mesh
                .vertex_neighbors(v0)
                .all(|vv| !self.is_too_long(v1, vv))
                .then_some(h01)
        } else {
            None
        }
    }

    /// Whether collapsing `h` keeps every surviving face around its origin
    /// non-degenerate and facing the same side.
    fn keeps_orientation(&self, h: HalfEdgeId) -> bool {
        let removed = self.mesh.origin(h);
        let kept = self.mesh.dest(h);
        let target = *self.mesh.position(kept);

        self.mesh.vertex_faces(removed).all(|f| {
            let corners = self.mesh.face_triangle(f);
            if corners.contains(&kept) {
                return true;
            }
            let before = corners.map(|c| *self.mesh.position(c));
            let after = corners.map(|c| {
                if c == removed {
                    target
                } else {
                    *self.mesh.position(c)
                }
            });
            let n0 = (before[1] - before[0]).cross(&(before[2] - before[0]));
            let n1 = (after[1] - after[0]).cross(&(after[2] - after[0]));
            let l_max = (after[1] - after[0])
                .norm_squared()
                .max((after[2] - after[1]).norm_squared())
                .max((after[0] - after[2]).norm_squared());
            n1.norm() > EPS * l_max && n0.dot(&n1) > 0.0
        })
    }

    fn flip_edges(&mut self) -> Result<usize> {
        let mut valence = vec![0i32; self.mesh.vertices_size()];
        for v in self.mesh.vertex_ids() {
            valence[v.index()] = self.mesh.valence(v) as i32;
        }

        let mut flips = 0;
        for _ in 0..MAX_PASSES {
            let mut done = true;

            for i in 0..self.mesh.edges_size() {
                let e = EdgeId::new(i);
                if self.mesh.is_deleted(e)
                    || self.is_edge_locked(e)
                    || self.is_feature_edge(e)
                    || self.mesh.is_boundary_edge(e)
                {
                    continue;
                }

                let h0 = e.halfedge(0);
                let h1 = e.halfedge(1);
                let quad = [
                    self.mesh.dest(h0),
                    self.mesh.dest(h1),
                    self.mesh.dest(self.mesh.next(h0)),
                    self.mesh.dest(self.mesh.next(h1)),
                ];
                if quad.iter().any(|&v| self.is_vertex_locked(v)) {
                    continue;
                }

                // the flip removes the edge from the first two and adds it
                // to the opposite corners
                let before = valence_deviation(&*self.mesh, &valence, &quad, [0, 0, 0, 0]);
                let after = valence_deviation(&*self.mesh, &valence, &quad, [-1, -1, 1, 1]);

                if after < before && self.mesh.is_flip_ok(e) && self.flip_keeps_orientation(&quad)
                {
                    self.mesh.flip(e)?;
                    valence[quad[0].index()] -= 1;
                    valence[quad[1].index()] -= 1;
                    valence[quad[2].index()] += 1;
                    valence[quad[3].index()] += 1;
                    flips += 1;
                    done = false;
                }
            }

            if done {
                break;
            }
        }

        Ok(flips)
    }

    /// Whether flipping the diagonal of `quad` (ordered as in
    /// [`flip_edges`](Self::flip_edges)) leaves both new triangles facing
    /// the side of the old pair. Fails for non-convex quads.
    fn flip_keeps_orientation(&self, quad: &[VertexId; 4]) -> bool {
        let [p0, p1, p2, p3] = quad.map(|v| *self.mesh.position(v));
        let normal = |a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>| (b - a).cross(&(c - a));

        let old = normal(&p1, &p0, &p2) + normal(&p0, &p1, &p3);
        normal(&p0, &p2, &p3).dot(&old) > 0.0 && normal(&p2, &p1, &p3).dot(&old) > 0.0
    }

    fn tangential_smoothing(&mut self, iterations: usize) -> Result<()> {
        let movable: Vec<VertexId> = self
            .mesh
            .vertex_ids()
            .filter(|&v| !self.mesh.is_boundary_vertex(v) && !self.is_vertex_locked(v))
            .collect();

        // fresh sizing and normals for vertices created by splits
        for &v in &movable {
            self.project(v);
        }

        for _ in 0..iterations {
            let this: &Self = self;
            let updates: Vec<Vector3<f64>> = if self.options.parallel {
                movable.par_iter().map(|&v| this.smoothing_update(v)).collect()
            } else {
                movable.iter().map(|&v| this.smoothing_update(v)).collect()
            };

            for (&v, u) in movable.iter().zip(&updates) {
                let p = self.mesh.position(v) + u;
                self.mesh.set_position(v, p);
            }
            self.mesh.update_vertex_normals()?;
        }

        for &v in &movable {
            self.project(v);
        }
        Ok(())
    }

    /// Tangential displacement of an interior, unlocked vertex.
    fn smoothing_update(&self, v: VertexId) -> Vector3<f64> {
        if self.is_feature_vertex(v) {
            return self.feature_update(v);
        }

        let p = *self.mesh.position(v);
        let target = match self.options.mode {
            SizingMode::Uniform => self
                .minimize_squared_areas(v)
                .unwrap_or_else(|| self.weighted_centroid(v)),
            _ => self.weighted_centroid(v),
        };

        let u = target - p;
        let n = self.mesh.prop(self.vnormal, v);
        u - n * u.dot(n)
    }

    /// Displacement of a feature vertex along its two feature edges.
    fn feature_update(&self, v: VertexId) -> Vector3<f64> {
        let p = *self.mesh.position(v);
        let mut u = Vector3::zeros();
        let mut t = Vector3::zeros();
        let mut ww = 0.0;
        let mut count = 0;

        for h in self.mesh.vertex_halfedges(v) {
            if !self.is_feature_edge(h.edge()) {
                continue;
            }
            let vv = self.mesh.dest(h);
            let q = *self.mesh.position(vv);
            let w = (q - p).norm() / (0.5 * (self.sizing(v) + self.sizing(vv)));
            ww += w;
            u += (p.coords + q.coords) * 0.5 * w;

            let dir = (q - p).try_normalize(EPS).unwrap_or_else(Vector3::zeros);
            if count == 0 {
                t += dir;
            } else {
                t -= dir;
            }
            count += 1;
        }

        if count != 2 || ww <= 0.0 {
            return Vector3::zeros();
        }
        let u = u / ww - p.coords;
        match t.try_normalize(EPS) {
            Some(t) if u.iter().all(|x| x.is_finite()) => t * u.dot(&t),
            _ => Vector3::zeros(),
        }
    }

    /// Position minimizing the squared areas of the one-ring triangles,
    /// `None` when the system is singular.
    fn minimize_squared_areas(&self, v: VertexId) -> Option<Point3<f64>> {
        let mut a = Matrix3::zeros();
        let mut b = Vector3::zeros();

        for h in self.mesh.vertex_halfedges(v) {
            let p = self.mesh.position(self.mesh.dest(h)).coords;
            let q = self.mesh.position(self.mesh.dest(self.mesh.next(h))).coords;
            let d = q - p;
            let len = d.norm();
            if len <= EPS {
                continue;
            }
            let w = 1.0 / len;

            // squared cross product with d
            let dd = Matrix3::identity() * d.norm_squared() - d * d.transpose();
            a += dd * w;
            b += dd * p * w;
        }

        let x = a.try_inverse()? * b;
        x.iter().all(|c| c.is_finite()).then(|| Point3::from(x))
    }

    /// One-ring face centroids weighted by area over squared target length.
    fn weighted_centroid(&self, v: VertexId) -> Point3<f64> {
        let p1 = *self.mesh.position(v);
        let mut c = Vector3::zeros();
        let mut ww = 0.0;

        for h in self.mesh.vertex_halfedges(v) {
            let v2 = self.mesh.dest(h);
            let v3 = self.mesh.dest(self.mesh.next(h));
            let p2 = self.mesh.position(v2);
            let p3 = self.mesh.position(v3);

            let b = (p1.coords + p2.coords + p3.coords) / 3.0;
            let mut area = (p2 - p1).cross(&(p3 - p1)).norm();
            if area == 0.0 {
                area = 1.0;
            }
            let size = (self.sizing(v) + self.sizing(v2) + self.sizing(v3)) / 3.0;
            let w = area / (size * size);

            c += b * w;
            ww += w;
        }

        let centroid = c / ww;
        if ww > 0.0 && centroid.iter().all(|x| x.is_finite()) {
            Point3::from(centroid)
        } else {
            p1
        }
    }

    /// Flip away triangles with a corner close to 180 degrees.
    fn remove_caps(&mut self) -> Result<usize> {
        let mut caps = 0;

        for i in 0..self.mesh.edges_size() {
            let e = EdgeId::new(i);
            if self.mesh.is_deleted(e)
                || self.is_edge_locked(e)
                || self.is_feature_edge(e)
                || !self.mesh.is_flip_ok(e)
            {
                continue;
            }

            let h0 = e.halfedge(0);
            let h1 = e.halfedge(1);
            let a = *self.mesh.position(self.mesh.dest(h0));
            let vb = self.mesh.dest(self.mesh.next(h0));
            let c = *self.mesh.position(self.mesh.dest(h1));
            let vd = self.mesh.dest(self.mesh.next(h1));
            let b = *self.mesh.position(vb);
            let d = *self.mesh.position(vd);

            let a0 = corner_cos(&(a - b), &(c - b));
            let a1 = corner_cos(&(a - d), &(c - d));
            let (amin, v) = if a0 < a1 { (a0, vb) } else { (a1, vd) };

            if amin >= CAP_COS || self.is_vertex_locked(v) {
                continue;
            }

            self.mesh.flip(e)?;
            caps += 1;
        }

        Ok(caps)
    }
}

/// Sum of squared differences between the valences of `quad`, shifted by
/// `delta`, and their optimum (6 inside, 4 on the boundary).
fn valence_deviation(
    mesh: &HalfEdgeMesh,
    valence: &[i32],
    quad: &[VertexId; 4],
    delta: [i32; 4],
) -> i32 {
    quad.iter()
        .zip(delta)
        .map(|(&v, d)| {
            let optimal = if mesh.is_boundary_vertex(v) { 4 } else { 6 };
            let dev = valence[v.index()] + d - optimal;
            dev * dev
        })
        .sum()
}

fn corner_cos(u: &Vector3<f64>, v: &Vector3<f64>) -> f64 {
    match (u.try_normalize(EPS), v.try_normalize(EPS)) {
        (Some(u), Some(v)) => u.dot(&v),
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::progress::Progress;
    use crate::mesh::{build_from_triangles, dist_point_triangle, shapes};

    fn edge_lengths(mesh: &HalfEdgeMesh) -> Vec<f64> {
        mesh.edge_ids().map(|e| mesh.edge_length(e.halfedge(0))).collect()
    }

    fn assert_no_remesh_properties(mesh: &HalfEdgeMesh) {
        assert!(!mesh.has_property::<VertexId>(LOCKED_VERTICES));
        assert!(!mesh.has_property::<EdgeId>(LOCKED_EDGES));
        assert!(!mesh.has_property::<VertexId>(SIZING));
    }

    #[test]
    fn test_adaptive_keeps_well_sized_mesh() {
        let mut mesh = shapes::triangle_lattice(6, 0.1).unwrap();
        let nv = mesh.num_vertices();

        let options = RemeshOptions::adaptive(0.09, 0.11, 0.001).with_iterations(1);
        remesh(&mut mesh, &options).unwrap();

        assert_eq!(mesh.num_vertices(), nv);
        assert!(mesh.validate().is_ok());
        assert_no_remesh_properties(&mesh);
        assert!(!mesh.has_property::<VertexId>("v:feature"));
        assert!(!mesh.has_property::<EdgeId>("e:feature"));
    }

    #[test]
    fn test_uniform_refines_plane() {
        let mut mesh = shapes::triangle_plane(2).unwrap();
        let target = 0.125;

        remesh(&mut mesh, &RemeshOptions::uniform(target).with_iterations(5)).unwrap();

        assert!(mesh.validate().is_ok());
        assert!(mesh.is_triangle_mesh());
        assert!(mesh.num_vertices() > 9);
        let lengths = edge_lengths(&mesh);
        let mean = lengths.iter().sum::<f64>() / lengths.len() as f64;
        assert!((0.7 * target..1.3 * target).contains(&mean), "mean edge length {}", mean);
        assert!(lengths.iter().all(|&l| l < 0.5));
        // flat input stays flat and inside the square
        for p in mesh.points() {
            assert!(p.z.abs() < 1e-9);
            assert!((-1e-9..=1.0 + 1e-9).contains(&p.x));
            assert!((-1e-9..=1.0 + 1e-9).contains(&p.y));
        }
        assert!((mesh.surface_area() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_uniform_coarsens_sphere() {
        let mut mesh = shapes::icosphere(3).unwrap();
        let nv = mesh.num_vertices();

        let options = RemeshOptions::uniform(0.4).with_iterations(5).sequential();
        remesh(&mut mesh, &options).unwrap();

        assert!(mesh.num_vertices() < nv);
        assert!(mesh.validate().is_ok());
        for v in mesh.vertex_ids() {
            assert!(!mesh.is_boundary_vertex(v));
            // projected back onto the input sphere
            assert!((mesh.position(v).coords.norm() - 1.0).abs() < 0.05);
        }
    }

    #[test]
    fn test_boundary_vertices_stay_fixed() {
        let mut mesh = shapes::triangle_plane(4).unwrap();
        let boundary: Vec<Point3<f64>> = mesh
            .vertex_ids()
            .filter(|&v| mesh.is_boundary_vertex(v))
            .map(|v| *mesh.position(v))
            .collect();

        remesh(&mut mesh, &RemeshOptions::uniform(0.4).with_iterations(3)).unwrap();

        for p in boundary {
            assert!(mesh.points().iter().any(|q| (q - p).norm() < 1e-12));
        }
    }

    #[test]
    fn test_selection_locks_the_rest() {
        let mut mesh = shapes::triangle_plane(4).unwrap();
        let selected = mesh.add_vertex_property("v:selected", false).unwrap();
        let vertices: Vec<VertexId> = mesh.vertex_ids().collect();
        for v in vertices {
            if mesh.position(v).x < 0.3 {
                mesh.set_prop(selected, v, true);
            }
        }
        let kept: Vec<Point3<f64>> = mesh
            .vertex_ids()
            .filter(|&v| !*mesh.prop(selected, v))
            .map(|v| *mesh.position(v))
            .collect();

        remesh(&mut mesh, &RemeshOptions::uniform(0.1).with_iterations(3)).unwrap();

        assert!(mesh.validate().is_ok());
        for p in kept {
            assert!(mesh.points().iter().any(|q| (q - p).norm() < 1e-12));
        }
        // the user's selection survives, the working locks do not
        assert!(mesh.has_property::<VertexId>("v:selected"));
        assert_no_remesh_properties(&mesh);
    }

    #[test]
    fn test_feature_edges_preserved() {
        let mut mesh = shapes::triangle_plane(4).unwrap();
        let vfeature = mesh.add_vertex_property("v:feature", false).unwrap();
        let efeature = mesh.add_edge_property("e:feature", false).unwrap();

        // the line x = 0.5 is a feature line
        let on_line = |p: &Point3<f64>| (p.x - 0.5).abs() < 1e-12;
        let edges: Vec<EdgeId> = mesh
            .edge_ids()
            .filter(|&e| {
                on_line(mesh.position(mesh.edge_vertex(e, 0)))
                    && on_line(mesh.position(mesh.edge_vertex(e, 1)))
            })
            .collect();
        assert_eq!(edges.len(), 4);
        for e in edges {
            let (a, b) = (mesh.edge_vertex(e, 0), mesh.edge_vertex(e, 1));
            mesh.set_prop(efeature, e, true);
            mesh.set_prop(vfeature, a, true);
            mesh.set_prop(vfeature, b, true);
        }

        remesh(&mut mesh, &RemeshOptions::uniform(0.1).with_iterations(3)).unwrap();
        assert!(mesh.validate().is_ok());

        // user marks are kept and still describe the line
        let efeature: EdgeProperty<bool> = mesh.get_property("e:feature").unwrap();
        let mut length = 0.0;
        for e in mesh.edge_ids().filter(|&e| *mesh.prop(efeature, e)) {
            assert!(on_line(mesh.position(mesh.edge_vertex(e, 0))));
            assert!(on_line(mesh.position(mesh.edge_vertex(e, 1))));
            length += mesh.edge_length(e.halfedge(0));
        }
        assert!((length - 1.0).abs() < 1e-9);
    }

    /// Triangulated unit cube with its twelve edges and eight corners
    /// marked as features.
    fn feature_cube() -> HalfEdgeMesh {
        let points: Vec<Point3<f64>> = (0..8)
            .map(|i| Point3::new((i & 1) as f64, ((i >> 1) & 1) as f64, ((i >> 2) & 1) as f64))
            .collect();
        let quads = [
            [0, 2, 3, 1],
            [4, 5, 7, 6],
            [0, 1, 5, 4],
            [2, 6, 7, 3],
            [0, 4, 6, 2],
            [1, 3, 7, 5],
        ];
        let triangles: Vec<[usize; 3]> = quads
            .iter()
            .flat_map(|&[a, b, c, d]| [[a, b, c], [a, c, d]])
            .collect();
        let mut mesh = build_from_triangles(&points, &triangles).unwrap();

        let vfeature = mesh.add_vertex_property("v:feature", false).unwrap();
        let efeature = mesh.add_edge_property("e:feature", false).unwrap();
        let axis_edges: Vec<EdgeId> = mesh
            .edge_ids()
            .filter(|&e| {
                let d = mesh.position(mesh.edge_vertex(e, 0)) - mesh.position(mesh.edge_vertex(e, 1));
                d.iter().filter(|x| x.abs() > 0.5).count() == 1
            })
            .collect();
        assert_eq!(axis_edges.len(), 12);
        for e in axis_edges {
            mesh.set_prop(efeature, e, true);
        }
        let vertices: Vec<VertexId> = mesh.vertex_ids().collect();
        for v in vertices {
            mesh.set_prop(vfeature, v, true);
        }
        mesh
    }

    #[test]
    fn test_feature_cube_is_refined() {
        let mut mesh = feature_cube();
        let corners: Vec<Point3<f64>> = mesh.points().to_vec();

        remesh(&mut mesh, &RemeshOptions::uniform(0.25).with_iterations(3)).unwrap();

        assert!(mesh.num_vertices() > 8, "{} vertices", mesh.num_vertices());
        assert!(mesh.validate().is_ok());
        assert!(mesh.is_triangle_mesh());
        for p in &corners {
            assert!(mesh.points().iter().any(|q| (q - p).norm() < 1e-12));
        }

        let on_side = |x: f64| x.abs() < 1e-9 || (x - 1.0).abs() < 1e-9;
        for v in mesh.vertex_ids() {
            let p = mesh.position(v).coords;
            assert!(p.iter().all(|&x| (-1e-9..=1.0 + 1e-9).contains(&x)));
            assert!(p.iter().any(|&x| on_side(x)));
        }

        // feature edges were split, never flipped or collapsed: they still
        // run along the cube edges and cover all of them
        let efeature: EdgeProperty<bool> = mesh.get_property("e:feature").unwrap();
        let mut count = 0;
        let mut length = 0.0;
        for e in mesh.edge_ids().filter(|&e| *mesh.prop(efeature, e)) {
            let p = mesh.position(mesh.edge_vertex(e, 0));
            let q = mesh.position(mesh.edge_vertex(e, 1));
            let fixed = (0..3)
                .filter(|&i| (p[i] - q[i]).abs() < 1e-9 && on_side(p[i]))
                .count();
            assert_eq!(fixed, 2, "feature edge {:?} -> {:?} left the cube edges", p, q);
            length += (p - q).norm();
            count += 1;
        }
        assert!(count > 12);
        assert!((length - 12.0).abs() < 1e-9, "feature length {}", length);
    }

    #[test]
    fn test_user_locked_edges_survive() {
        let mut mesh = shapes::triangle_plane(2).unwrap();
        let elocked = mesh.add_edge_property("e:locked", false).unwrap();
        let e = mesh.edge_ids().find(|&e| mesh.is_boundary_edge(e)).unwrap();
        mesh.set_prop(elocked, e, true);
        let a = *mesh.position(mesh.edge_vertex(e, 0));
        let b = *mesh.position(mesh.edge_vertex(e, 1));

        remesh(&mut mesh, &RemeshOptions::uniform(0.1).with_iterations(3)).unwrap();

        assert!(mesh.validate().is_ok());
        assert!(mesh.num_vertices() > 9);
        let kept = mesh.edge_ids().any(|e| {
            let p = *mesh.position(mesh.edge_vertex(e, 0));
            let q = *mesh.position(mesh.edge_vertex(e, 1));
            (p == a && q == b) || (p == b && q == a)
        });
        assert!(kept);
    }

    #[test]
    fn test_uniform_sphere_stays_on_input() {
        let mut mesh = shapes::icosphere(2).unwrap();
        let input = mesh.clone();
        let target = 0.15;

        remesh(&mut mesh, &RemeshOptions::uniform(target).with_iterations(5)).unwrap();
        assert!(mesh.validate().is_ok());

        let triangles: Vec<[Point3<f64>; 3]> = input
            .face_ids()
            .map(|f| input.face_triangle(f).map(|v| *input.position(v)))
            .collect();
        for v in mesh.vertex_ids() {
            let p = mesh.position(v);
            let d = triangles
                .iter()
                .map(|[a, b, c]| dist_point_triangle(p, a, b, c).0)
                .fold(f64::INFINITY, f64::min);
            assert!(d < 1e-9, "{:?} is {} away from the input", p, d);
        }

        let lengths = edge_lengths(&mesh);
        let mean = lengths.iter().sum::<f64>() / lengths.len() as f64;
        assert!((0.75 * target..1.25 * target).contains(&mean), "mean edge length {}", mean);
        let in_band = lengths
            .iter()
            .filter(|&&l| (0.6 * target..1.5 * target).contains(&l))
            .count();
        assert!(in_band as f64 > 0.85 * lengths.len() as f64);
    }

    #[test]
    fn test_adaptive_refines_curved_tips() {
        // prolate ellipsoid, curvature 3 at the tips and 1 around the middle
        let mut mesh = shapes::icosphere(3).unwrap();
        for p in mesh.points_mut() {
            p.x *= 3.0;
        }

        let options = RemeshOptions::adaptive(0.02, 0.5, 0.005).with_iterations(5);
        remesh(&mut mesh, &options).unwrap();
        assert!(mesh.validate().is_ok());

        for v in mesh.vertex_ids() {
            let p = mesh.position(v);
            let f = (p.x / 3.0).powi(2) + p.y * p.y + p.z * p.z - 1.0;
            assert!(f.abs() < 0.05, "{:?} is off the ellipsoid", p);
        }

        let mut tips = Vec::new();
        let mut middle = Vec::new();
        for e in mesh.edge_ids() {
            let p = mesh.position(mesh.edge_vertex(e, 0));
            let q = mesh.position(mesh.edge_vertex(e, 1));
            let x = (0.5 * (p.x + q.x)).abs();
            if x > 2.5 {
                tips.push((p - q).norm());
            } else if x < 0.5 {
                middle.push((p - q).norm());
            }
        }
        let mean = |l: &[f64]| l.iter().sum::<f64>() / l.len() as f64;
        assert!(!tips.is_empty() && !middle.is_empty());
        assert!(mean(&tips) < mean(&middle), "tips {} middle {}", mean(&tips), mean(&middle));
    }

    #[test]
    fn test_custom_sizing() {
        let mut mesh = shapes::triangle_plane(2).unwrap();
        let lengths = vec![0.25; mesh.num_vertices()];
        remesh(&mut mesh, &RemeshOptions::custom(lengths).with_iterations(3)).unwrap();
        assert!(mesh.validate().is_ok());
        assert!(mesh.num_vertices() > 9);

        let mut mesh = shapes::triangle_plane(2).unwrap();
        let err = remesh(&mut mesh, &RemeshOptions::custom(vec![0.25; 3])).unwrap_err();
        assert!(err.is_precondition_error());
    }

    #[test]
    fn test_preconditions() {
        let mut mesh = shapes::triangle_plane(2).unwrap();
        let err = remesh(&mut mesh, &RemeshOptions::adaptive(0.5, 0.1, 0.01)).unwrap_err();
        assert!(err.is_precondition_error());
        assert!(remesh(&mut mesh, &RemeshOptions::uniform(0.0)).is_err());
        assert!(remesh(&mut mesh, &RemeshOptions::adaptive(0.1, 0.5, -1.0)).is_err());
        assert_eq!(mesh.num_vertices(), 9);

        let mut quads = shapes::plane(2).unwrap();
        let err = remesh(&mut quads, &RemeshOptions::uniform(0.1)).unwrap_err();
        assert!(err.is_precondition_error());
    }

    #[test]
    fn test_abort_before_first_iteration() {
        let mut mesh = shapes::icosphere(1).unwrap();
        let nv = mesh.num_vertices();
        let options = RemeshOptions::uniform(0.05)
            .with_progress(Progress::none().with_abort(|| true));

        remesh(&mut mesh, &options).unwrap();

        assert_eq!(mesh.num_vertices(), nv);
        assert!(mesh.validate().is_ok());
        assert_no_remesh_properties(&mesh);
    }

    #[test]
    fn test_collapse_never_removes_boundary_vertex() {
        let mut mesh = shapes::triangle_plane(2).unwrap();
        let options = RemeshOptions::uniform(0.5);
        let mut remesher = Remesher::new(&mut mesh, &options).unwrap();

        // center vertex 4 has valence 6, its neighbor 1 sits on the boundary
        let e = remesher.mesh.find_edge(VertexId::new(1), VertexId::new(4)).unwrap();
        let h = remesher.choose_collapse(e);
        assert!(h.is_none() || remesher.mesh.origin(h.unwrap()) == VertexId::new(4));
        remesher.finish();
        assert_no_remesh_properties(&mesh);
    }

    #[test]
    fn test_valence_deviation() {
        let mesh = shapes::triangle_plane(2).unwrap();
        let valence: Vec<i32> = mesh.vertex_ids().map(|v| mesh.valence(v) as i32).collect();
        // interior vertex 4 has valence 6
        let quad = [VertexId::new(4), VertexId::new(4), VertexId::new(4), VertexId::new(4)];
        assert_eq!(valence_deviation(&mesh, &valence, &quad, [0; 4]), 0);
        assert_eq!(valence_deviation(&mesh, &valence, &quad, [1, -1, 2, 0]), 6);
    }

    #[test]
    fn test_corner_cos() {
        assert!((corner_cos(&Vector3::x(), &Vector3::y())).abs() < 1e-12);
        assert!((corner_cos(&Vector3::x(), &-Vector3::x()) + 1.0).abs() < 1e-12);
        assert_eq!(corner_cos(&Vector3::zeros(), &Vector3::x()), 1.0);
        assert!((CAP_COS - 170f64.to_radians().cos()).abs() < 1e-12);
    }
}
