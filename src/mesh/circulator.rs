//! Traversal of mesh elements.
//!
//! Two kinds of sequences are provided:
//!
//! - **Element iterators** ([`ElementIter`]) over all live vertices,
//!   half-edges, edges or faces in index order. They are cheap to clone, so a
//!   traversal can be restarted from a saved copy.
//! - **Circulators** over the one-ring of a vertex ([`VertexCirculator`]) or
//!   the boundary loop of a face ([`FaceCirculator`]). A circulator starts at
//!   the element's anchor half-edge and stops right before it would return
//!   there, so it yields exactly `valence` items. Both ends can be consumed:
//!   reversing a circulator yields the same half-edges in reverse order.
//!
//! Circulators borrow the mesh, so the compiler rejects topology changes
//! while one is alive. Corrupted connectivity cannot make them spin forever:
//! every circulator has a step budget bounded by the number of allocated
//! half-edges and stops as soon as it reaches a dead or out-of-range
//! half-edge. [`VertexCirculator::advance`] and friends surface such
//! failures as [`MeshError::InvalidTopology`].
//!
//! # Example
//!
//! ```
//! use hemesh::prelude::*;
//! use hemesh::mesh::shapes;
//!
//! let mesh = shapes::icosahedron().unwrap();
//! let v = VertexId::new(0);
//!
//! let forward: Vec<_> = mesh.vertex_halfedges(v).collect();
//! let mut backward: Vec<_> = mesh.vertex_halfedges(v).rev().collect();
//! backward.reverse();
//! assert_eq!(forward, backward);
//! assert_eq!(forward.len(), 5);
//! ```

use std::marker::PhantomData;
use std::ops::Range;

use crate::error::{MeshError, Result};

use super::halfedge::HalfEdgeMesh;
use super::index::{EdgeId, ElementId, FaceId, HalfEdgeId, VertexId};

/// Iterator over the live elements of one category, in index order.
#[derive(Debug, Clone)]
pub struct ElementIter<'a, H> {
    deleted: &'a [bool],
    range: Range<usize>,
    shift: u32,
    _marker: PhantomData<H>,
}

impl<'a, H: ElementId> ElementIter<'a, H> {
    fn new(deleted: &'a [bool], len: usize, shift: u32) -> Self {
        Self {
            deleted,
            range: 0..len,
            shift,
            _marker: PhantomData,
        }
    }
}

impl<'a, H: ElementId> Iterator for ElementIter<'a, H> {
    type Item = H;

    fn next(&mut self) -> Option<H> {
        let deleted = self.deleted;
        let shift = self.shift;
        self.range
            .by_ref()
            .find(|&i| !deleted[i >> shift])
            .map(H::from_index)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.range.len()))
    }
}

impl<'a, H: ElementId> DoubleEndedIterator for ElementIter<'a, H> {
    fn next_back(&mut self) -> Option<H> {
        let deleted = self.deleted;
        let shift = self.shift;
        self.range
            .by_ref()
            .rfind(|&i| !deleted[i >> shift])
            .map(H::from_index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RingKind {
    Vertex,
    Face,
}

/// Bidirectional walk over a closed ring of half-edges.
#[derive(Debug, Clone)]
struct Ring<'a> {
    mesh: &'a HalfEdgeMesh,
    kind: RingKind,
    front: HalfEdgeId,
    back: HalfEdgeId,
    budget: usize,
    done: bool,
    corrupted: bool,
}

impl<'a> Ring<'a> {
    fn empty(mesh: &'a HalfEdgeMesh, kind: RingKind) -> Self {
        Self {
            mesh,
            kind,
            front: HalfEdgeId::invalid(),
            back: HalfEdgeId::invalid(),
            budget: 0,
            done: true,
            corrupted: false,
        }
    }

    fn new(mesh: &'a HalfEdgeMesh, kind: RingKind, anchor: HalfEdgeId) -> Self {
        let mut ring = Self::empty(mesh, kind);
        if !anchor.is_valid() {
            return ring;
        }
        if !mesh.is_valid(anchor) {
            ring.corrupted = true;
            return ring;
        }
        let back = ring.backward(anchor);
        if !mesh.is_valid(back) {
            ring.corrupted = true;
            return ring;
        }
        ring.front = anchor;
        ring.back = back;
        ring.budget = mesh.halfedges_size();
        ring.done = false;
        ring
    }

    #[inline]
    fn forward(&self, he: HalfEdgeId) -> HalfEdgeId {
        match self.kind {
            RingKind::Vertex => self.mesh.ccw_rotated(he),
            RingKind::Face => self.mesh.next(he),
        }
    }

    #[inline]
    fn backward(&self, he: HalfEdgeId) -> HalfEdgeId {
        match self.kind {
            RingKind::Vertex => self.mesh.cw_rotated(he),
            RingKind::Face => self.mesh.prev(he),
        }
    }

    fn fail(&mut self) {
        self.corrupted = true;
        self.done = true;
    }

    fn next_front(&mut self) -> Option<HalfEdgeId> {
        if self.done {
            return None;
        }
        let current = self.front;
        if current == self.back {
            self.done = true;
            return Some(current);
        }
        if self.budget == 0 {
            self.fail();
            return None;
        }
        self.budget -= 1;
        let next = self.forward(current);
        if self.mesh.is_valid(next) {
            self.front = next;
        } else {
            self.fail();
        }
        Some(current)
    }

    fn next_back(&mut self) -> Option<HalfEdgeId> {
        if self.done {
            return None;
        }
        let current = self.back;
        if current == self.front {
            self.done = true;
            return Some(current);
        }
        if self.budget == 0 {
            self.fail();
            return None;
        }
        self.budget -= 1;
        let prev = self.backward(current);
        if self.mesh.is_valid(prev) {
            self.back = prev;
        } else {
            self.fail();
        }
        Some(current)
    }

    fn checked(&self, item: Option<HalfEdgeId>, what: &str) -> Result<Option<HalfEdgeId>> {
        if self.corrupted {
            Err(MeshError::invalid_topology(format!(
                "{} ring does not close",
                what
            )))
        } else {
            Ok(item)
        }
    }
}

/// Circulates the outgoing half-edges of a vertex in counter-clockwise order.
#[derive(Debug, Clone)]
pub struct VertexCirculator<'a> {
    ring: Ring<'a>,
    vertex: VertexId,
}

impl<'a> VertexCirculator<'a> {
    /// Circulator around `v`. Invalid or isolated vertices give an empty ring.
    pub fn new(mesh: &'a HalfEdgeMesh, v: VertexId) -> Self {
        let ring = if mesh.is_valid(v) {
            Ring::new(mesh, RingKind::Vertex, mesh.vertex_halfedge(v))
        } else {
            Ring::empty(mesh, RingKind::Vertex)
        };
        Self { ring, vertex: v }
    }

    /// Checked constructor.
    ///
    /// Fails with [`MeshError::InvalidHandle`] for a dead vertex and with
    /// [`MeshError::InvalidTopology`] if its outgoing half-edge is dead or
    /// does not start at `v`.
    pub fn try_new(mesh: &'a HalfEdgeMesh, v: VertexId) -> Result<Self> {
        mesh.check_handle(v)?;
        let anchor = mesh.vertex_halfedge(v);
        if anchor.is_valid() && (!mesh.is_valid(anchor) || mesh.origin(anchor) != v) {
            return Err(MeshError::invalid_topology(format!(
                "outgoing half-edge {:?} of {:?} is not attached to it",
                anchor, v
            )));
        }
        let circulator = Self::new(mesh, v);
        if circulator.ring.corrupted {
            return Err(MeshError::invalid_topology(format!(
                "one-ring of {:?} is broken at its anchor",
                v
            )));
        }
        Ok(circulator)
    }

    /// The vertex being circulated.
    pub fn vertex(&self) -> VertexId {
        self.vertex
    }

    /// Step forward, reporting corruption as an error.
    pub fn advance(&mut self) -> Result<Option<HalfEdgeId>> {
        let item = self.ring.next_front();
        self.ring.checked(item, "vertex")
    }

    /// Step backward, reporting corruption as an error.
    pub fn retreat(&mut self) -> Result<Option<HalfEdgeId>> {
        let item = self.ring.next_back();
        self.ring.checked(item, "vertex")
    }

    /// True if iteration stopped on broken connectivity.
    pub fn is_corrupted(&self) -> bool {
        self.ring.corrupted
    }
}

impl<'a> Iterator for VertexCirculator<'a> {
    type Item = HalfEdgeId;

    #[inline]
    fn next(&mut self) -> Option<HalfEdgeId> {
        self.ring.next_front()
    }
}

impl<'a> DoubleEndedIterator for VertexCirculator<'a> {
    #[inline]
    fn next_back(&mut self) -> Option<HalfEdgeId> {
        self.ring.next_back()
    }
}

/// Circulates the half-edges bounding a face, following `next`.
#[derive(Debug, Clone)]
pub struct FaceCirculator<'a> {
    ring: Ring<'a>,
    face: FaceId,
}

impl<'a> FaceCirculator<'a> {
    /// Circulator around `f`. Invalid faces give an empty loop.
    pub fn new(mesh: &'a HalfEdgeMesh, f: FaceId) -> Self {
        let ring = if mesh.is_valid(f) {
            Ring::new(mesh, RingKind::Face, mesh.face_halfedge(f))
        } else {
            Ring::empty(mesh, RingKind::Face)
        };
        Self { ring, face: f }
    }

    /// Checked constructor.
    ///
    /// Fails with [`MeshError::InvalidHandle`] for a dead face and with
    /// [`MeshError::InvalidTopology`] if its anchor does not belong to it.
    pub fn try_new(mesh: &'a HalfEdgeMesh, f: FaceId) -> Result<Self> {
        mesh.check_handle(f)?;
        let anchor = mesh.face_halfedge(f);
        if !mesh.is_valid(anchor) || mesh.face_of(anchor) != f {
            return Err(MeshError::invalid_topology(format!(
                "half-edge {:?} of {:?} is not attached to it",
                anchor, f
            )));
        }
        let circulator = Self::new(mesh, f);
        if circulator.ring.corrupted {
            return Err(MeshError::invalid_topology(format!(
                "loop of {:?} is broken at its anchor",
                f
            )));
        }
        Ok(circulator)
    }

    /// The face being circulated.
    pub fn face(&self) -> FaceId {
        self.face
    }

    /// Step forward, reporting corruption as an error.
    pub fn advance(&mut self) -> Result<Option<HalfEdgeId>> {
        let item = self.ring.next_front();
        self.ring.checked(item, "face")
    }

    /// Step backward, reporting corruption as an error.
    pub fn retreat(&mut self) -> Result<Option<HalfEdgeId>> {
        let item = self.ring.next_back();
        self.ring.checked(item, "face")
    }

    /// True if iteration stopped on broken connectivity.
    pub fn is_corrupted(&self) -> bool {
        self.ring.corrupted
    }
}

impl<'a> Iterator for FaceCirculator<'a> {
    type Item = HalfEdgeId;

    #[inline]
    fn next(&mut self) -> Option<HalfEdgeId> {
        self.ring.next_front()
    }
}

impl<'a> DoubleEndedIterator for FaceCirculator<'a> {
    #[inline]
    fn next_back(&mut self) -> Option<HalfEdgeId> {
        self.ring.next_back()
    }
}

impl HalfEdgeMesh {
    // ==================== Iteration ====================

    /// Iterate over all live vertex IDs.
    pub fn vertex_ids(&self) -> ElementIter<'_, VertexId> {
        ElementIter::new(self.prop_values(self.vdeleted), self.vertices_size(), 0)
    }

    /// Iterate over all live half-edge IDs.
    pub fn halfedge_ids(&self) -> ElementIter<'_, HalfEdgeId> {
        ElementIter::new(self.prop_values(self.edeleted), self.halfedges_size(), 1)
    }

    /// Iterate over all live edge IDs.
    pub fn edge_ids(&self) -> ElementIter<'_, EdgeId> {
        ElementIter::new(self.prop_values(self.edeleted), self.edges_size(), 0)
    }

    /// Iterate over all live face IDs.
    pub fn face_ids(&self) -> ElementIter<'_, FaceId> {
        ElementIter::new(self.prop_values(self.fdeleted), self.faces_size(), 0)
    }

    // ==================== Circulation ====================

    /// Iterate over half-edges around a vertex (outgoing half-edges).
    pub fn vertex_halfedges(&self, v: VertexId) -> VertexCirculator<'_> {
        VertexCirculator::new(self, v)
    }

    /// Checked vertex circulator, see [`VertexCirculator::try_new`].
    pub fn vertex_circulator(&self, v: VertexId) -> Result<VertexCirculator<'_>> {
        VertexCirculator::try_new(self, v)
    }

    /// Iterate over vertices adjacent to a vertex.
    pub fn vertex_neighbors(&self, v: VertexId) -> impl DoubleEndedIterator<Item = VertexId> + '_ {
        self.vertex_halfedges(v).map(|he| self.dest(he))
    }

    /// Iterate over faces adjacent to a vertex.
    pub fn vertex_faces(&self, v: VertexId) -> impl DoubleEndedIterator<Item = FaceId> + '_ {
        self.vertex_halfedges(v).filter_map(|he| {
            let f = self.face_of(he);
            f.is_valid().then_some(f)
        })
    }

    /// Iterate over edges incident to a vertex.
    pub fn vertex_edges(&self, v: VertexId) -> impl DoubleEndedIterator<Item = EdgeId> + '_ {
        self.vertex_halfedges(v).map(|he| he.edge())
    }

    /// Iterate over half-edges around a face.
    pub fn face_halfedges(&self, f: FaceId) -> FaceCirculator<'_> {
        FaceCirculator::new(self, f)
    }

    /// Checked face circulator, see [`FaceCirculator::try_new`].
    pub fn face_circulator(&self, f: FaceId) -> Result<FaceCirculator<'_>> {
        FaceCirculator::try_new(self, f)
    }

    /// Iterate over vertices of a face.
    pub fn face_vertices(&self, f: FaceId) -> impl DoubleEndedIterator<Item = VertexId> + '_ {
        self.face_halfedges(f).map(|he| self.dest(he))
    }

    /// Iterate over faces sharing an edge with a face.
    pub fn face_neighbors(&self, f: FaceId) -> impl DoubleEndedIterator<Item = FaceId> + '_ {
        self.face_halfedges(f).filter_map(|he| {
            let g = self.face_of(he.twin());
            g.is_valid().then_some(g)
        })
    }

    /// Get the three vertices of a triangular face.
    pub fn face_triangle(&self, f: FaceId) -> [VertexId; 3] {
        let he0 = self.face_halfedge(f);
        let he1 = self.next(he0);
        let he2 = self.next(he1);
        [self.dest(he0), self.dest(he1), self.dest(he2)]
    }
}
