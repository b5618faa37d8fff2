//! Local topology operators: edge flip, halfedge collapse, edge and face
//! splits, edge insertion and removal, vertex insertion.
//!
//! Every operator checks its handles and its topological precondition first
//! and returns an error without touching the mesh when either fails.
//! Collapses only mark elements deleted; call
//! [`garbage_collection`](HalfEdgeMesh::garbage_collection) to compact.

use nalgebra::Point3;

use crate::error::{MeshError, Result};

use super::halfedge::HalfEdgeMesh;
use super::index::{EdgeId, ElementId, FaceId, HalfEdgeId, VertexId};

fn illegal<H: ElementId>(operation: &'static str, h: H) -> MeshError {
    MeshError::IllegalOperation {
        operation,
        element: H::KIND,
        index: h.to_raw(),
    }
}

impl HalfEdgeMesh {
    // ==================== Flip ====================

    /// Check whether the edge shared by two triangles can be flipped.
    ///
    /// Boundary edges cannot be flipped, and neither can an edge whose
    /// flipped counterpart already exists.
    pub fn is_flip_ok(&self, e: EdgeId) -> bool {
        if !self.is_valid(e) || self.is_boundary_edge(e) {
            return false;
        }

        let h0 = e.halfedge(0);
        let h1 = e.halfedge(1);
        if self.face_valence(self.face_of(h0)) != 3 || self.face_valence(self.face_of(h1)) != 3 {
            return false;
        }

        let v0 = self.dest(self.next(h0));
        let v1 = self.dest(self.next(h1));
        if v0 == v1 {
            return false;
        }

        self.find_halfedge(v0, v1).is_none()
    }

    /// Flip an interior edge between two triangles.
    ///
    /// ```text
    ///      va1                 va1
    ///     /  \                /|\
    ///  vb0 -- va0    =>    vb0 | va0
    ///     \  /                \|/
    ///      vb1                 vb1
    /// ```
    pub fn flip(&mut self, e: EdgeId) -> Result<()> {
        self.check_handle(e)?;
        if !self.is_flip_ok(e) {
            return Err(illegal("flip", e));
        }

        let a0 = e.halfedge(0);
        let b0 = e.halfedge(1);

        let a1 = self.next(a0);
        let a2 = self.next(a1);

        let b1 = self.next(b0);
        let b2 = self.next(b1);

        let va0 = self.dest(a0);
        let va1 = self.dest(a1);

        let vb0 = self.dest(b0);
        let vb1 = self.dest(b1);

        let fa = self.face_of(a0);
        let fb = self.face_of(b0);

        self.set_dest(a0, va1);
        self.set_dest(b0, vb1);

        self.set_next(a0, a2);
        self.set_next(a2, b1);
        self.set_next(b1, a0);

        self.set_next(b0, b2);
        self.set_next(b2, a1);
        self.set_next(a1, b0);

        self.set_face_of(a1, fb);
        self.set_face_of(b1, fa);

        self.set_face_halfedge(fa, a0);
        self.set_face_halfedge(fb, b0);

        if self.vertex_halfedge(va0) == b0 {
            self.set_vertex_halfedge(va0, a1);
        }
        if self.vertex_halfedge(vb0) == a0 {
            self.set_vertex_halfedge(vb0, b1);
        }

        Ok(())
    }

    // ==================== Collapse ====================

    /// Check whether collapsing `h` (moving `origin(h)` into `dest(h)`)
    /// keeps the mesh a manifold.
    ///
    /// Rejects collapses that would
    /// - close a triangle whose other two edges are both boundary,
    /// - merge two boundary vertices through an interior edge,
    /// - fold together one-rings sharing more than the two opposite vertices.
    pub fn is_collapse_ok(&self, h: HalfEdgeId) -> bool {
        if !self.is_valid(h) {
            return false;
        }

        let v0v1 = h;
        let v1v0 = h.twin();
        let v0 = self.dest(v1v0);
        let v1 = self.dest(v0v1);
        let mut vl = VertexId::invalid();
        let mut vr = VertexId::invalid();

        // edges v1-vl and vl-v0 must not both be boundary
        if !self.is_boundary_halfedge(v0v1) {
            let h1 = self.next(v0v1);
            let h2 = self.next(h1);
            vl = self.dest(h1);
            if self.is_boundary_halfedge(h1.twin()) && self.is_boundary_halfedge(h2.twin()) {
                return false;
            }
        }

        // edges v0-vr and vr-v1 must not both be boundary
        if !self.is_boundary_halfedge(v1v0) {
            let h1 = self.next(v1v0);
            let h2 = self.next(h1);
            vr = self.dest(h1);
            if self.is_boundary_halfedge(h1.twin()) && self.is_boundary_halfedge(h2.twin()) {
                return false;
            }
        }

        if vl == vr {
            return false;
        }

        if self.is_boundary_vertex(v0)
            && self.is_boundary_vertex(v1)
            && !self.is_boundary_halfedge(v0v1)
            && !self.is_boundary_halfedge(v1v0)
        {
            return false;
        }

        self.vertex_neighbors(v0)
            .filter(|&vv| vv != v1 && vv != vl && vv != vr)
            .all(|vv| self.find_halfedge(vv, v1).is_none())
    }

    /// Collapse `h`: `origin(h)` is removed and its edges are reattached to
    /// `dest(h)`. Triangles degenerated into two-edge loops are removed.
    pub fn collapse(&mut self, h: HalfEdgeId) -> Result<()> {
        self.check_handle(h)?;
        if !self.is_collapse_ok(h) {
            return Err(illegal("collapse", h));
        }

        let h0 = h;
        let h1 = self.prev(h0);
        let o0 = h0.twin();
        let o1 = self.next(o0);

        self.remove_edge_helper(h0);

        if self.next(self.next(h1)) == h1 {
            self.remove_loop_helper(h1);
        }
        if self.next(self.next(o1)) == o1 {
            self.remove_loop_helper(o1);
        }

        Ok(())
    }

    fn remove_edge_helper(&mut self, h: HalfEdgeId) {
        let hn = self.next(h);
        let hp = self.prev(h);

        let o = h.twin();
        let on = self.next(o);
        let op = self.prev(o);

        let fh = self.face_of(h);
        let fo = self.face_of(o);

        let vh = self.dest(h);
        let vo = self.dest(o);

        let incoming: Vec<HalfEdgeId> = self.vertex_halfedges(vo).map(|hc| hc.twin()).collect();
        for hc in incoming {
            self.set_dest(hc, vh);
        }

        self.set_next(hp, hn);
        self.set_next(op, on);

        if fh.is_valid() {
            self.set_face_halfedge(fh, hn);
        }
        if fo.is_valid() {
            self.set_face_halfedge(fo, on);
        }

        if self.vertex_halfedge(vh) == o {
            self.set_vertex_halfedge(vh, hn);
        }
        self.adjust_outgoing_halfedge(vh);
        self.set_vertex_halfedge(vo, HalfEdgeId::invalid());

        self.set_deleted_vertex(vo);
        self.set_deleted_edge(h.edge());
    }

    fn remove_loop_helper(&mut self, h: HalfEdgeId) {
        let h0 = h;
        let h1 = self.next(h0);

        let o0 = h0.twin();
        let o1 = h1.twin();

        let v0 = self.dest(h0);
        let v1 = self.dest(h1);

        let fh = self.face_of(h0);
        let fo = self.face_of(o0);

        debug_assert!(self.next(h1) == h0 && h1 != o0);

        self.set_next(h1, self.next(o0));
        self.set_next(self.prev(o0), h1);

        self.set_face_of(h1, fo);

        self.set_vertex_halfedge(v0, h1);
        self.adjust_outgoing_halfedge(v0);
        self.set_vertex_halfedge(v1, o1);
        self.adjust_outgoing_halfedge(v1);

        if fo.is_valid() && self.face_halfedge(fo) == o0 {
            self.set_face_halfedge(fo, h1);
        }

        if fh.is_valid() {
            self.set_deleted_face(fh);
        }
        self.set_deleted_edge(h0.edge());
    }

    // ==================== Splits ====================

    fn check_free_vertex(&self, operation: &'static str, v: VertexId) -> Result<()> {
        self.check_handle(v)?;
        if !self.is_isolated(v) {
            return Err(illegal(operation, v));
        }
        Ok(())
    }

    fn check_split_edge(&self, e: EdgeId) -> Result<()> {
        self.check_handle(e)?;
        for h in [e.halfedge(0), e.halfedge(1)] {
            if !self.is_boundary_halfedge(h) && self.face_valence(self.face_of(h)) != 3 {
                return Err(illegal("split_edge", e));
            }
        }
        Ok(())
    }

    /// Split edge `e` at the isolated vertex `v`, connecting `v` to the
    /// opposite corner of each incident triangle.
    ///
    /// Returns the new half-edge running from the old `edge_vertex(e, 1)`
    /// to `v`.
    pub fn split_edge(&mut self, e: EdgeId, v: VertexId) -> Result<HalfEdgeId> {
        self.check_split_edge(e)?;
        self.check_free_vertex("split_edge", v)?;

        let h0 = e.halfedge(0);
        let o0 = e.halfedge(1);

        let v2 = self.dest(o0);

        let e1 = self.new_edge(v, v2);
        let t1 = e1.twin();

        let f0 = self.face_of(h0);
        let f3 = self.face_of(o0);

        self.set_vertex_halfedge(v, h0);
        self.set_dest(o0, v);

        if !self.is_boundary_halfedge(h0) {
            let h1 = self.next(h0);
            let h2 = self.next(h1);

            let v1 = self.dest(h1);

            let e0 = self.new_edge(v, v1);
            let t0 = e0.twin();

            let f1 = self.new_face();
            self.set_face_halfedge(f0, h0);
            self.set_face_halfedge(f1, h2);

            self.set_face_of(h1, f0);
            self.set_face_of(t0, f0);
            self.set_face_of(h0, f0);

            self.set_face_of(h2, f1);
            self.set_face_of(t1, f1);
            self.set_face_of(e0, f1);

            self.set_next(h0, h1);
            self.set_next(h1, t0);
            self.set_next(t0, h0);

            self.set_next(e0, h2);
            self.set_next(h2, t1);
            self.set_next(t1, e0);
        } else {
            self.set_next(self.prev(h0), t1);
            self.set_next(t1, h0);
        }

        if !self.is_boundary_halfedge(o0) {
            let o1 = self.next(o0);
            let o2 = self.next(o1);

            let v3 = self.dest(o1);

            let e2 = self.new_edge(v, v3);
            let t2 = e2.twin();

            let f2 = self.new_face();
            self.set_face_halfedge(f2, o1);
            self.set_face_halfedge(f3, o0);

            self.set_face_of(o1, f2);
            self.set_face_of(t2, f2);
            self.set_face_of(e1, f2);

            self.set_face_of(o2, f3);
            self.set_face_of(o0, f3);
            self.set_face_of(e2, f3);

            self.set_next(e1, o1);
            self.set_next(o1, t2);
            self.set_next(t2, e1);

            self.set_next(o0, e2);
            self.set_next(e2, o2);
            self.set_next(o2, o0);
        } else {
            self.set_next(e1, self.next(o0));
            self.set_next(o0, e1);
            self.set_vertex_halfedge(v, e1);
        }

        if self.vertex_halfedge(v2) == h0 {
            self.set_vertex_halfedge(v2, t1);
        }

        Ok(t1)
    }

    /// Split face `f` into a triangle fan around the isolated vertex `v`.
    ///
    /// `f` stays valid as one of the new triangles.
    pub fn split_face(&mut self, f: FaceId, v: VertexId) -> Result<()> {
        self.check_handle(f)?;
        self.check_free_vertex("split_face", v)?;

        let hend = self.face_halfedge(f);
        let mut h = self.next(hend);

        let mut hold = self.new_edge(self.dest(hend), v);

        self.set_next(hend, hold);
        self.set_face_of(hold, f);

        hold = hold.twin();

        while h != hend {
            let hnext = self.next(h);

            let fnew = self.new_face();
            self.set_face_halfedge(fnew, h);

            let hnew = self.new_edge(self.dest(h), v);

            self.set_next(hnew, hold);
            self.set_next(hold, h);
            self.set_next(h, hnew);

            self.set_face_of(hnew, fnew);
            self.set_face_of(hold, fnew);
            self.set_face_of(h, fnew);

            hold = hnew.twin();

            h = hnext;
        }

        self.set_next(hold, hend);
        self.set_next(self.next(hend), hold);

        self.set_face_of(hold, f);

        self.set_vertex_halfedge(v, hold);

        Ok(())
    }

    /// Add a vertex at `p` and split `e` there, see [`split_edge`](Self::split_edge).
    ///
    /// Nothing is added when `e` cannot be split.
    pub fn split_edge_at(&mut self, e: EdgeId, p: Point3<f64>) -> Result<HalfEdgeId> {
        self.check_split_edge(e)?;
        let v = self.add_vertex(p);
        self.split_edge(e, v)
    }

    /// Add a vertex at `p` and fan-triangulate `f` around it.
    pub fn split_face_at(&mut self, f: FaceId, p: Point3<f64>) -> Result<VertexId> {
        self.check_handle(f)?;
        let v = self.add_vertex(p);
        self.split_face(f, v)?;
        Ok(v)
    }

    // ==================== Edge insertion and removal ====================

    /// Split the face of `h0` and `h1` by a new edge from `dest(h0)` to
    /// `dest(h1)`.
    ///
    /// Both half-edges must lie on the same face, and the two corners must
    /// neither be neighbors on it nor already be connected. The face of
    /// `h0` keeps the part containing `h0`; the part containing `h1` becomes
    /// a new face. Returns the new half-edge from `dest(h0)` to `dest(h1)`.
    pub fn insert_edge(&mut self, h0: HalfEdgeId, h1: HalfEdgeId) -> Result<HalfEdgeId> {
        self.check_handle(h0)?;
        self.check_handle(h1)?;

        let f0 = self.face_of(h0);
        if !f0.is_valid() || self.face_of(h1) != f0 || h0 == h1 {
            return Err(illegal("insert_edge", h0));
        }
        let v0 = self.dest(h0);
        let v1 = self.dest(h1);
        if self.next(h0) == h1 || self.next(h1) == h0 || self.find_halfedge(v0, v1).is_some() {
            return Err(illegal("insert_edge", h0));
        }

        let h2 = self.next(h0);
        let h3 = self.next(h1);

        let h4 = self.new_edge(v0, v1);
        let h5 = h4.twin();

        let f1 = self.new_face();
        self.set_face_halfedge(f0, h0);
        self.set_face_halfedge(f1, h1);

        self.set_next(h0, h4);
        self.set_next(h4, h3);
        self.set_face_of(h4, f0);

        self.set_next(h1, h5);
        self.set_next(h5, h2);

        let mut h = h2;
        for _ in 0..self.halfedges_size() {
            self.set_face_of(h, f1);
            h = self.next(h);
            if h == h2 {
                break;
            }
        }

        Ok(h4)
    }

    /// Check whether `e` can be removed by merging its two faces.
    ///
    /// Fails on boundary edges, on edges with the same face on both sides
    /// and when the two faces also touch at a third vertex.
    pub fn is_removal_ok(&self, e: EdgeId) -> bool {
        if !self.is_valid(e) {
            return false;
        }

        let h0 = e.halfedge(0);
        let h1 = e.halfedge(1);
        let v0 = self.dest(h0);
        let v1 = self.dest(h1);
        let f0 = self.face_of(h0);
        let f1 = self.face_of(h1);

        if !f0.is_valid() || !f1.is_valid() || f0 == f1 {
            return false;
        }

        self.face_vertices(f0)
            .filter(|&v| v != v0 && v != v1)
            .all(|v| self.vertex_faces(v).all(|f| f != f1))
    }

    /// Remove `e`, merging its two faces into the face of `halfedge(1)`.
    ///
    /// The face of `halfedge(0)` and the edge are marked deleted.
    pub fn remove_edge(&mut self, e: EdgeId) -> Result<()> {
        self.check_handle(e)?;
        if !self.is_removal_ok(e) {
            return Err(illegal("remove_edge", e));
        }

        let h0 = e.halfedge(0);
        let h1 = e.halfedge(1);

        let v0 = self.dest(h0);
        let v1 = self.dest(h1);

        let f0 = self.face_of(h0);
        let f1 = self.face_of(h1);

        let h0_prev = self.prev(h0);
        let h0_next = self.next(h0);
        let h1_prev = self.prev(h1);
        let h1_next = self.next(h1);

        if self.vertex_halfedge(v0) == h1 {
            self.set_vertex_halfedge(v0, h0_next);
        }
        if self.vertex_halfedge(v1) == h0 {
            self.set_vertex_halfedge(v1, h1_next);
        }

        let moved: Vec<HalfEdgeId> = self.face_halfedges(f0).collect();
        for h in moved {
            self.set_face_of(h, f1);
        }

        self.set_next(h1_prev, h0_next);
        self.set_next(h0_prev, h1_next);

        if self.face_halfedge(f1) == h1 {
            self.set_face_halfedge(f1, h1_next);
        }

        self.set_deleted_face(f0);
        self.set_deleted_edge(e);
        Ok(())
    }

    /// Subdivide the edge of `h0` by the isolated vertex `v` without
    /// retriangulating the adjacent faces, which gain one corner each.
    ///
    /// Returns the new half-edge from `dest(h0)` back to `v`.
    pub fn insert_vertex(&mut self, h0: HalfEdgeId, v: VertexId) -> Result<HalfEdgeId> {
        self.check_handle(h0)?;
        self.check_free_vertex("insert_vertex", v)?;

        let h2 = self.next(h0);
        let o0 = h0.twin();
        let o2 = self.prev(o0);
        let v2 = self.dest(h0);
        let fh = self.face_of(h0);
        let fo = self.face_of(o0);

        let h1 = self.new_edge(v, v2);
        let o1 = h1.twin();

        self.set_next(h1, h2);
        self.set_next(h0, h1);
        self.set_dest(h0, v);
        self.set_dest(h1, v2);
        self.set_face_of(h1, fh);

        self.set_next(o1, o0);
        self.set_next(o2, o1);
        self.set_dest(o1, v);
        self.set_face_of(o1, fo);

        self.set_vertex_halfedge(v2, o1);
        self.adjust_outgoing_halfedge(v2);
        self.set_vertex_halfedge(v, h1);
        self.adjust_outgoing_halfedge(v);

        if fh.is_valid() {
            self.set_face_halfedge(fh, h0);
        }
        if fo.is_valid() {
            self.set_face_halfedge(fo, o1);
        }

        Ok(o1)
    }
}
