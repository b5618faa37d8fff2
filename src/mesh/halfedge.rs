//! Half-edge mesh data structure.
//!
//! This module provides a half-edge (doubly-connected edge list) representation
//! for polygon meshes. This structure enables O(1) adjacency queries and is
//! the foundation for every algorithm in the crate.
//!
//! # Structure
//!
//! - Each edge is split into two **half-edges** pointing in opposite directions.
//!   Edge `i` owns half-edges `2i` and `2i + 1`, so the **twin** is implicit.
//! - Each half-edge knows its **next** and **prev** half-edge around its face,
//!   its **target vertex** and its **incident face**
//! - Each vertex stores one outgoing half-edge
//! - Each face stores one half-edge on its boundary
//!
//! All of this lives in [`PropertyContainer`]s, one per element category, as
//! the built-in properties `v:connectivity`, `h:connectivity` and
//! `f:connectivity` next to `v:point` and the deletion flags. User properties
//! sit in the same containers and are resized and compacted together with
//! the connectivity.
//!
//! # Boundary Handling
//!
//! Boundary half-edges (on mesh boundaries) have an invalid face ID. Their twins
//! are the interior half-edges. Boundary loops can be traversed using the `next`
//! pointer on boundary half-edges. The outgoing half-edge of a boundary vertex
//! is always a boundary half-edge, which makes the boundary test O(1).
//!
//! # Deletion
//!
//! Deleting elements only marks them (see [`HalfEdgeMesh::delete_face`]).
//! Handles stay stable until [`HalfEdgeMesh::garbage_collection`] compacts
//! the arrays.
//!
//! # Handles
//!
//! Navigation (`next`, `dest`, `is_boundary_vertex`, ...) trusts its
//! handles and panics on out-of-range ones. Editing operations validate
//! theirs and return [`MeshError::InvalidHandle`] instead.

use nalgebra::Point3;

use crate::error::{ElementKind, MeshError, Result};

use super::index::{EdgeId, ElementId, FaceId, HalfEdgeId, VertexId};
use super::property::{
    EdgeProperty, FaceProperty, HalfEdgeProperty, Property, PropertyContainer, PropertyValue,
    VertexProperty,
};

/// Connectivity record of a vertex.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Vertex {
    /// One outgoing half-edge from this vertex.
    /// For boundary vertices, this is guaranteed to be a boundary half-edge.
    /// Invalid for isolated vertices.
    pub halfedge: HalfEdgeId,
}

/// Connectivity record of a half-edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HalfEdge {
    /// The vertex this half-edge points to.
    pub vertex: VertexId,

    /// The next half-edge around the face (counter-clockwise).
    pub next: HalfEdgeId,

    /// The previous half-edge around the face (clockwise).
    pub prev: HalfEdgeId,

    /// The face this half-edge belongs to.
    /// Invalid for boundary half-edges.
    pub face: FaceId,
}

impl HalfEdge {
    /// Check if this half-edge is on the boundary.
    #[inline]
    pub fn is_boundary(&self) -> bool {
        !self.face.is_valid()
    }
}

/// Connectivity record of a face.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Face {
    /// One half-edge on the boundary of this face.
    pub halfedge: HalfEdgeId,
}

/// A half-edge mesh data structure for polygon meshes.
///
/// This structure stores vertices, half-edges, edges and faces with full
/// connectivity information, enabling O(1) adjacency queries, plus any
/// number of named per-element properties.
#[derive(Debug, Clone)]
pub struct HalfEdgeMesh {
    pub(crate) vprops: PropertyContainer,
    pub(crate) hprops: PropertyContainer,
    pub(crate) eprops: PropertyContainer,
    pub(crate) fprops: PropertyContainer,

    pub(crate) vpoint: VertexProperty<Point3<f64>>,
    pub(crate) vconn: VertexProperty<Vertex>,
    pub(crate) hconn: HalfEdgeProperty<HalfEdge>,
    pub(crate) fconn: FaceProperty<Face>,

    pub(crate) vdeleted: VertexProperty<bool>,
    pub(crate) edeleted: EdgeProperty<bool>,
    pub(crate) fdeleted: FaceProperty<bool>,

    pub(crate) deleted_vertices: usize,
    pub(crate) deleted_edges: usize,
    pub(crate) deleted_faces: usize,
    pub(crate) has_garbage: bool,
}

impl Default for HalfEdgeMesh {
    fn default() -> Self {
        Self::new()
    }
}

/// Built-in arrays kept consistent with the deletion counters and the
/// half-edge links.
const RESERVED_NAMES: [&str; 6] = [
    "v:connectivity",
    "h:connectivity",
    "f:connectivity",
    "v:deleted",
    "e:deleted",
    "f:deleted",
];

fn builtin<H, T: PropertyValue>(
    props: &mut PropertyContainer,
    name: &str,
    default: T,
) -> Property<H, T> {
    Property::from_slot(props.push_array(name, default))
}

impl HalfEdgeMesh {
    /// Create a new empty mesh.
    pub fn new() -> Self {
        let mut vprops = PropertyContainer::new();
        let mut hprops = PropertyContainer::new();
        let mut eprops = PropertyContainer::new();
        let mut fprops = PropertyContainer::new();

        let vpoint = builtin(&mut vprops, "v:point", Point3::origin());
        let vconn = builtin(&mut vprops, "v:connectivity", Vertex::default());
        let hconn = builtin(&mut hprops, "h:connectivity", HalfEdge::default());
        let fconn = builtin(&mut fprops, "f:connectivity", Face::default());
        let vdeleted = builtin(&mut vprops, "v:deleted", false);
        let edeleted = builtin(&mut eprops, "e:deleted", false);
        let fdeleted = builtin(&mut fprops, "f:deleted", false);

        Self {
            vprops,
            hprops,
            eprops,
            fprops,
            vpoint,
            vconn,
            hconn,
            fconn,
            vdeleted,
            edeleted,
            fdeleted,
            deleted_vertices: 0,
            deleted_edges: 0,
            deleted_faces: 0,
            has_garbage: false,
        }
    }

    /// Create a new mesh with pre-allocated capacity.
    pub fn with_capacity(num_vertices: usize, num_faces: usize) -> Self {
        let mut mesh = Self::new();
        mesh.reserve(num_vertices, num_vertices + num_faces, num_faces);
        mesh
    }

    /// Reserve memory for additional vertices, edges and faces.
    pub fn reserve(&mut self, num_vertices: usize, num_edges: usize, num_faces: usize) {
        self.vprops.reserve(num_vertices);
        self.hprops.reserve(2 * num_edges);
        self.eprops.reserve(num_edges);
        self.fprops.reserve(num_faces);
    }

    /// Remove all elements and all user properties.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Release memory not needed by the current elements.
    pub fn shrink_to_fit(&mut self) {
        self.vprops.shrink_to_fit();
        self.hprops.shrink_to_fit();
        self.eprops.shrink_to_fit();
        self.fprops.shrink_to_fit();
    }

    // ==================== Counts ====================

    /// Number of live (non-deleted) vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.vprops.len() - self.deleted_vertices
    }

    /// Number of live half-edges.
    #[inline]
    pub fn num_halfedges(&self) -> usize {
        self.hprops.len() - 2 * self.deleted_edges
    }

    /// Number of live edges.
    #[inline]
    pub fn num_edges(&self) -> usize {
        self.eprops.len() - self.deleted_edges
    }

    /// Number of live faces.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.fprops.len() - self.deleted_faces
    }

    /// Number of allocated vertex slots, deleted ones included.
    #[inline]
    pub fn vertices_size(&self) -> usize {
        self.vprops.len()
    }

    /// Number of allocated half-edge slots, deleted ones included.
    #[inline]
    pub fn halfedges_size(&self) -> usize {
        self.hprops.len()
    }

    /// Number of allocated edge slots, deleted ones included.
    #[inline]
    pub fn edges_size(&self) -> usize {
        self.eprops.len()
    }

    /// Number of allocated face slots, deleted ones included.
    #[inline]
    pub fn faces_size(&self) -> usize {
        self.fprops.len()
    }

    /// True if the mesh has no live vertices.
    pub fn is_empty(&self) -> bool {
        self.num_vertices() == 0
    }

    /// True if some elements are marked deleted and await garbage collection.
    #[inline]
    pub fn has_garbage(&self) -> bool {
        self.has_garbage
    }

    // ==================== Handle Validity ====================

    fn in_range<H: ElementId>(&self, h: H) -> bool {
        h.is_valid_id() && h.to_index() < self.container::<H>().len()
    }

    /// Check whether the element has been marked deleted.
    ///
    /// A half-edge is deleted when its edge is. Out-of-range handles are
    /// reported as not deleted; use [`is_valid`](Self::is_valid) to check both.
    pub fn is_deleted<H: ElementId>(&self, h: H) -> bool {
        if !self.in_range(h) {
            return false;
        }
        let i = h.to_index();
        match H::KIND {
            ElementKind::Vertex => self.vprops.values::<bool>(self.vdeleted.slot())[i],
            ElementKind::HalfEdge => self.eprops.values::<bool>(self.edeleted.slot())[i >> 1],
            ElementKind::Edge => self.eprops.values::<bool>(self.edeleted.slot())[i],
            ElementKind::Face => self.fprops.values::<bool>(self.fdeleted.slot())[i],
        }
    }

    /// Check that the handle is in range and its element is not deleted.
    pub fn is_valid<H: ElementId>(&self, h: H) -> bool {
        self.in_range(h) && !self.is_deleted(h)
    }

    /// Return an [`MeshError::InvalidHandle`] unless [`is_valid`](Self::is_valid).
    pub fn check_handle<H: ElementId>(&self, h: H) -> Result<()> {
        if self.is_valid(h) {
            Ok(())
        } else {
            Err(MeshError::InvalidHandle {
                element: H::KIND,
                index: h.to_raw(),
            })
        }
    }

    // ==================== Properties ====================

    pub(crate) fn container<H: ElementId>(&self) -> &PropertyContainer {
        match H::KIND {
            ElementKind::Vertex => &self.vprops,
            ElementKind::HalfEdge => &self.hprops,
            ElementKind::Edge => &self.eprops,
            ElementKind::Face => &self.fprops,
        }
    }

    pub(crate) fn container_mut<H: ElementId>(&mut self) -> &mut PropertyContainer {
        match H::KIND {
            ElementKind::Vertex => &mut self.vprops,
            ElementKind::HalfEdge => &mut self.hprops,
            ElementKind::Edge => &mut self.eprops,
            ElementKind::Face => &mut self.fprops,
        }
    }

    fn is_builtin_slot<H: ElementId>(&self, slot: usize) -> bool {
        match H::KIND {
            ElementKind::Vertex => {
                slot == self.vpoint.slot()
                    || slot == self.vconn.slot()
                    || slot == self.vdeleted.slot()
            }
            ElementKind::HalfEdge => slot == self.hconn.slot(),
            ElementKind::Edge => slot == self.edeleted.slot(),
            ElementKind::Face => slot == self.fconn.slot() || slot == self.fdeleted.slot(),
        }
    }

    /// Declare a property on elements of type `H`, or fetch the existing one.
    ///
    /// Fails with [`MeshError::DuplicateProperty`] if the name is taken by a
    /// property of another value type, or by one of the connectivity and
    /// deletion arrays, which only the mesh itself may write.
    pub fn add_property<H: ElementId, T: PropertyValue>(
        &mut self,
        name: &str,
        default: T,
    ) -> Result<Property<H, T>> {
        if RESERVED_NAMES.contains(&name) {
            if let Some(existing) = self.container::<H>().kind_of(name) {
                return Err(MeshError::DuplicateProperty {
                    name: name.to_string(),
                    existing,
                    requested: T::KIND,
                });
            }
        }
        let slot = self.container_mut::<H>().declare(name, default)?;
        Ok(Property::from_slot(slot))
    }

    /// Look up a property by name and value type.
    ///
    /// The connectivity and deletion arrays are not handed out.
    pub fn get_property<H: ElementId, T: PropertyValue>(&self, name: &str) -> Option<Property<H, T>> {
        if RESERVED_NAMES.contains(&name) {
            return None;
        }
        self.container::<H>().find::<T>(name).map(Property::from_slot)
    }

    /// True if a property of any type with this name exists on `H`.
    pub fn has_property<H: ElementId>(&self, name: &str) -> bool {
        self.container::<H>().contains(name)
    }

    /// Remove a user property. Built-in properties are never removed.
    ///
    /// Returns false if nothing was removed.
    pub fn remove_property<H: ElementId, T: PropertyValue>(&mut self, prop: Property<H, T>) -> bool {
        if self.is_builtin_slot::<H>(prop.slot()) {
            return false;
        }
        self.container_mut::<H>().remove(prop.slot())
    }

    /// Names of all properties on elements of type `H`.
    pub fn property_names<H: ElementId>(&self) -> Vec<&str> {
        self.container::<H>().names()
    }

    /// Declare a vertex property.
    pub fn add_vertex_property<T: PropertyValue>(
        &mut self,
        name: &str,
        default: T,
    ) -> Result<VertexProperty<T>> {
        self.add_property(name, default)
    }

    /// Declare a half-edge property.
    pub fn add_halfedge_property<T: PropertyValue>(
        &mut self,
        name: &str,
        default: T,
    ) -> Result<HalfEdgeProperty<T>> {
        self.add_property(name, default)
    }

    /// Declare an edge property.
    pub fn add_edge_property<T: PropertyValue>(
        &mut self,
        name: &str,
        default: T,
    ) -> Result<EdgeProperty<T>> {
        self.add_property(name, default)
    }

    /// Declare a face property.
    pub fn add_face_property<T: PropertyValue>(
        &mut self,
        name: &str,
        default: T,
    ) -> Result<FaceProperty<T>> {
        self.add_property(name, default)
    }

    /// Value of a property for one element.
    #[inline]
    pub fn prop<H: ElementId, T: PropertyValue>(&self, prop: Property<H, T>, h: H) -> &T {
        &self.container::<H>().values::<T>(prop.slot())[h.to_index()]
    }

    /// Mutable value of a property for one element.
    #[inline]
    pub fn prop_mut<H: ElementId, T: PropertyValue>(&mut self, prop: Property<H, T>, h: H) -> &mut T {
        &mut self.container_mut::<H>().values_mut::<T>(prop.slot())[h.to_index()]
    }

    /// Set a property value for one element.
    #[inline]
    pub fn set_prop<H: ElementId, T: PropertyValue>(&mut self, prop: Property<H, T>, h: H, value: T) {
        *self.prop_mut(prop, h) = value;
    }

    /// The whole property array, indexed by element index.
    ///
    /// Entries of deleted elements are included.
    pub fn prop_values<H: ElementId, T: PropertyValue>(&self, prop: Property<H, T>) -> &[T] {
        self.container::<H>().values::<T>(prop.slot())
    }

    /// The whole property array, mutably.
    pub fn prop_values_mut<H: ElementId, T: PropertyValue>(&mut self, prop: Property<H, T>) -> &mut [T] {
        self.container_mut::<H>().values_mut::<T>(prop.slot())
    }

    /// Accessor for the built-in `v:point` property.
    pub fn points_property(&self) -> VertexProperty<Point3<f64>> {
        self.vpoint
    }

    // ==================== Element Access ====================
    //
    // Accessors and topology queries index the arrays directly. Check
    // untrusted handles with `is_valid` or `check_handle` first.

    /// Get the connectivity record of a vertex.
    ///
    /// # Panics
    /// Panics if `id` is out of range.
    #[inline]
    pub fn vertex(&self, id: VertexId) -> &Vertex {
        debug_assert!(self.in_range(id), "vertex {id:?} out of range");
        &self.vprops.values::<Vertex>(self.vconn.slot())[id.index()]
    }

    #[inline]
    fn vertex_mut(&mut self, id: VertexId) -> &mut Vertex {
        let slot = self.vconn.slot();
        &mut self.vprops.values_mut::<Vertex>(slot)[id.index()]
    }

    /// Get the connectivity record of a half-edge.
    ///
    /// # Panics
    /// Panics if `id` is out of range.
    #[inline]
    pub fn halfedge(&self, id: HalfEdgeId) -> &HalfEdge {
        debug_assert!(self.in_range(id), "half-edge {id:?} out of range");
        &self.hprops.values::<HalfEdge>(self.hconn.slot())[id.index()]
    }

    #[inline]
    fn halfedge_mut(&mut self, id: HalfEdgeId) -> &mut HalfEdge {
        let slot = self.hconn.slot();
        &mut self.hprops.values_mut::<HalfEdge>(slot)[id.index()]
    }

    /// Get the connectivity record of a face.
    ///
    /// # Panics
    /// Panics if `id` is out of range.
    #[inline]
    pub fn face(&self, id: FaceId) -> &Face {
        debug_assert!(self.in_range(id), "face {id:?} out of range");
        &self.fprops.values::<Face>(self.fconn.slot())[id.index()]
    }

    #[inline]
    fn face_mut(&mut self, id: FaceId) -> &mut Face {
        let slot = self.fconn.slot();
        &mut self.fprops.values_mut::<Face>(slot)[id.index()]
    }

    // ==================== Topology Queries ====================

    /// Outgoing half-edge of a vertex, invalid if the vertex is isolated.
    #[inline]
    pub fn vertex_halfedge(&self, v: VertexId) -> HalfEdgeId {
        self.vertex(v).halfedge
    }

    /// One half-edge on the boundary loop of a face.
    #[inline]
    pub fn face_halfedge(&self, f: FaceId) -> HalfEdgeId {
        self.face(f).halfedge
    }

    /// Half-edge `i` (0 or 1) of an edge.
    #[inline]
    pub fn edge_halfedge(&self, e: EdgeId, i: usize) -> HalfEdgeId {
        e.halfedge(i)
    }

    /// Vertex `i` (0 or 1) of an edge: the target of half-edge `i`.
    #[inline]
    pub fn edge_vertex(&self, e: EdgeId, i: usize) -> VertexId {
        self.dest(e.halfedge(i))
    }

    /// The edge a half-edge belongs to.
    #[inline]
    pub fn edge_of(&self, he: HalfEdgeId) -> EdgeId {
        he.edge()
    }

    /// Get the twin (opposite) half-edge.
    #[inline]
    pub fn twin(&self, he: HalfEdgeId) -> HalfEdgeId {
        he.twin()
    }

    /// Get the next half-edge around the face.
    #[inline]
    pub fn next(&self, he: HalfEdgeId) -> HalfEdgeId {
        self.halfedge(he).next
    }

    /// Get the previous half-edge around the face.
    #[inline]
    pub fn prev(&self, he: HalfEdgeId) -> HalfEdgeId {
        self.halfedge(he).prev
    }

    /// Get the origin vertex of a half-edge.
    #[inline]
    pub fn origin(&self, he: HalfEdgeId) -> VertexId {
        self.dest(he.twin())
    }

    /// Get the destination vertex of a half-edge.
    #[inline]
    pub fn dest(&self, he: HalfEdgeId) -> VertexId {
        self.halfedge(he).vertex
    }

    /// Get the face of a half-edge.
    #[inline]
    pub fn face_of(&self, he: HalfEdgeId) -> FaceId {
        self.halfedge(he).face
    }

    /// Rotate an outgoing half-edge counter-clockwise around its origin.
    #[inline]
    pub fn ccw_rotated(&self, he: HalfEdgeId) -> HalfEdgeId {
        self.prev(he).twin()
    }

    /// Rotate an outgoing half-edge clockwise around its origin.
    #[inline]
    pub fn cw_rotated(&self, he: HalfEdgeId) -> HalfEdgeId {
        self.next(he.twin())
    }

    /// Check if a half-edge is on the boundary.
    #[inline]
    pub fn is_boundary_halfedge(&self, he: HalfEdgeId) -> bool {
        self.halfedge(he).is_boundary()
    }

    /// Check if a vertex is on the boundary. Isolated vertices count as boundary.
    ///
    /// # Panics
    /// Panics if `v` is out of range, like every topology query.
    #[inline]
    pub fn is_boundary_vertex(&self, v: VertexId) -> bool {
        let h = self.vertex_halfedge(v);
        !(h.is_valid() && self.face_of(h).is_valid())
    }

    /// Check if an edge lies on the boundary.
    #[inline]
    pub fn is_boundary_edge(&self, e: EdgeId) -> bool {
        self.is_boundary_halfedge(e.halfedge(0)) || self.is_boundary_halfedge(e.halfedge(1))
    }

    /// Check if a face has at least one boundary edge.
    pub fn is_boundary_face(&self, f: FaceId) -> bool {
        self.face_halfedges(f)
            .any(|he| self.is_boundary_halfedge(he.twin()))
    }

    /// Check if a vertex has no incident edges.
    #[inline]
    pub fn is_isolated(&self, v: VertexId) -> bool {
        !self.vertex_halfedge(v).is_valid()
    }

    /// Check if a vertex is manifold: its faces form one fan.
    pub fn is_manifold(&self, v: VertexId) -> bool {
        self.vertex_halfedges(v)
            .filter(|&he| self.is_boundary_halfedge(he))
            .count()
            < 2
    }

    /// Compute the valence (degree) of a vertex.
    pub fn valence(&self, v: VertexId) -> usize {
        self.vertex_halfedges(v).count()
    }

    /// Number of vertices (equivalently edges) of a face.
    pub fn face_valence(&self, f: FaceId) -> usize {
        self.face_halfedges(f).count()
    }

    /// True if every face is a triangle.
    pub fn is_triangle_mesh(&self) -> bool {
        self.face_ids().all(|f| self.face_valence(f) == 3)
    }

    /// True if every face is a quad.
    pub fn is_quad_mesh(&self) -> bool {
        self.face_ids().all(|f| self.face_valence(f) == 4)
    }

    /// Find the half-edge from `start` to `end`.
    ///
    /// Scans the outgoing half-edges of `start`, O(valence).
    pub fn find_halfedge(&self, start: VertexId, end: VertexId) -> Option<HalfEdgeId> {
        let first = self.vertex_halfedge(start);
        if !first.is_valid() {
            return None;
        }
        let mut he = first;
        for _ in 0..self.halfedges_size() {
            if self.dest(he) == end {
                return Some(he);
            }
            he = self.cw_rotated(he);
            if he == first {
                break;
            }
        }
        None
    }

    /// Find the edge between two vertices.
    pub fn find_edge(&self, a: VertexId, b: VertexId) -> Option<EdgeId> {
        self.find_halfedge(a, b).map(|he| he.edge())
    }

    // ==================== Low-level Mutation ====================

    #[inline]
    pub(crate) fn set_vertex_halfedge(&mut self, v: VertexId, he: HalfEdgeId) {
        self.vertex_mut(v).halfedge = he;
    }

    #[inline]
    pub(crate) fn set_face_halfedge(&mut self, f: FaceId, he: HalfEdgeId) {
        self.face_mut(f).halfedge = he;
    }

    #[inline]
    pub(crate) fn set_dest(&mut self, he: HalfEdgeId, v: VertexId) {
        self.halfedge_mut(he).vertex = v;
    }

    #[inline]
    pub(crate) fn set_face_of(&mut self, he: HalfEdgeId, f: FaceId) {
        self.halfedge_mut(he).face = f;
    }

    /// Link `he -> next` and `next <- he`.
    #[inline]
    pub(crate) fn set_next(&mut self, he: HalfEdgeId, next: HalfEdgeId) {
        self.halfedge_mut(he).next = next;
        self.halfedge_mut(next).prev = he;
    }

    pub(crate) fn set_deleted_vertex(&mut self, v: VertexId) {
        let slot = self.vdeleted.slot();
        let flag = &mut self.vprops.values_mut::<bool>(slot)[v.index()];
        if !*flag {
            *flag = true;
            self.deleted_vertices += 1;
        }
        self.has_garbage = true;
    }

    pub(crate) fn set_deleted_edge(&mut self, e: EdgeId) {
        let slot = self.edeleted.slot();
        let flag = &mut self.eprops.values_mut::<bool>(slot)[e.index()];
        if !*flag {
            *flag = true;
            self.deleted_edges += 1;
        }
        self.has_garbage = true;
    }

    pub(crate) fn set_deleted_face(&mut self, f: FaceId) {
        let slot = self.fdeleted.slot();
        let flag = &mut self.fprops.values_mut::<bool>(slot)[f.index()];
        if !*flag {
            *flag = true;
            self.deleted_faces += 1;
        }
        self.has_garbage = true;
    }

    /// Make the outgoing half-edge of `v` a boundary half-edge if one exists.
    pub(crate) fn adjust_outgoing_halfedge(&mut self, v: VertexId) {
        let boundary = self
            .vertex_halfedges(v)
            .find(|&he| self.is_boundary_halfedge(he));
        if let Some(he) = boundary {
            self.set_vertex_halfedge(v, he);
        }
    }

    /// Allocate a new edge and return its half-edge from `start` to `end`.
    ///
    /// The half-edges are not linked into any loop.
    pub(crate) fn new_edge(&mut self, start: VertexId, end: VertexId) -> HalfEdgeId {
        debug_assert!(start != end);
        self.eprops.push();
        self.hprops.push();
        self.hprops.push();

        let h0 = HalfEdgeId::new(self.hprops.len() - 2);
        let h1 = h0.twin();
        self.set_dest(h0, end);
        self.set_dest(h1, start);
        h0
    }

    pub(crate) fn new_face(&mut self) -> FaceId {
        self.fprops.push();
        FaceId::new(self.fprops.len() - 1)
    }

    // ==================== Construction ====================

    /// Add a new vertex and return its ID.
    pub fn add_vertex(&mut self, position: Point3<f64>) -> VertexId {
        self.vprops.push();
        let v = VertexId::new(self.vprops.len() - 1);
        self.set_prop(self.vpoint, v, position);
        v
    }

    /// Add a triangle.
    pub fn add_triangle(&mut self, v0: VertexId, v1: VertexId, v2: VertexId) -> Result<FaceId> {
        self.add_face(&[v0, v1, v2])
    }

    /// Add a quad.
    pub fn add_quad(
        &mut self,
        v0: VertexId,
        v1: VertexId,
        v2: VertexId,
        v3: VertexId,
    ) -> Result<FaceId> {
        self.add_face(&[v0, v1, v2, v3])
    }

    /// Add a face bounded by `vertices` in counter-clockwise order.
    ///
    /// Existing edges between consecutive vertices are reused; missing ones
    /// are created. Surrounding boundary loops are relinked so that every
    /// loop stays closed. The mesh is left untouched when an error is
    /// returned:
    ///
    /// - [`MeshError::InvalidHandle`] for an invalid or deleted vertex
    /// - [`MeshError::TooFewVertices`] for fewer than three vertices
    /// - [`MeshError::DuplicateVertex`] if a vertex repeats
    /// - [`MeshError::ComplexVertex`] if a vertex is not on the boundary
    /// - [`MeshError::ComplexEdge`] if an edge already has two faces
    /// - [`MeshError::PatchRelinkFailed`] if a vertex has no free gap to
    ///   absorb the surrounding fan
    pub fn add_face(&mut self, vertices: &[VertexId]) -> Result<FaceId> {
        let n = vertices.len();
        if n < 3 {
            return Err(MeshError::TooFewVertices { count: n });
        }
        for &v in vertices {
            self.check_handle(v)?;
        }
        for (i, &v) in vertices.iter().enumerate() {
            if vertices[i + 1..].contains(&v) {
                return Err(MeshError::DuplicateVertex { vertex: v.raw() });
            }
        }

        let mut halfedges = vec![HalfEdgeId::invalid(); n];
        let mut is_new = vec![false; n];
        let mut needs_adjust = vec![false; n];
        let mut next_cache: Vec<(HalfEdgeId, HalfEdgeId)> = Vec::with_capacity(3 * n);

        // Test for topological errors
        for i in 0..n {
            let ii = (i + 1) % n;
            if !self.is_boundary_vertex(vertices[i]) {
                return Err(MeshError::ComplexVertex {
                    vertex: vertices[i].raw(),
                });
            }

            match self.find_halfedge(vertices[i], vertices[ii]) {
                Some(he) => {
                    if !self.is_boundary_halfedge(he) {
                        return Err(MeshError::ComplexEdge {
                            from: vertices[i].raw(),
                            to: vertices[ii].raw(),
                        });
                    }
                    halfedges[i] = he;
                }
                None => is_new[i] = true,
            }
        }

        // Re-link patches where two existing edges are not yet consecutive
        for i in 0..n {
            let ii = (i + 1) % n;
            if is_new[i] || is_new[ii] {
                continue;
            }

            let inner_prev = halfedges[i];
            let inner_next = halfedges[ii];
            if self.next(inner_prev) == inner_next {
                continue;
            }

            // Search a free gap. The patch between inner_prev and inner_next
            // is moved there.
            let outer_prev = inner_next.twin();
            let mut boundary_prev = outer_prev;
            let mut found = false;
            for _ in 0..self.halfedges_size() {
                boundary_prev = self.next(boundary_prev).twin();
                if self.is_boundary_halfedge(boundary_prev) && boundary_prev != inner_prev {
                    found = true;
                    break;
                }
            }
            let boundary_next = self.next(boundary_prev);
            if !found || boundary_next == inner_next {
                return Err(MeshError::PatchRelinkFailed {
                    vertex: vertices[ii].raw(),
                });
            }

            let patch_start = self.next(inner_prev);
            let patch_end = self.prev(inner_next);

            next_cache.push((boundary_prev, patch_start));
            next_cache.push((patch_end, boundary_next));
            next_cache.push((inner_prev, inner_next));
        }

        // Every check passed, start mutating
        for i in 0..n {
            if is_new[i] {
                let ii = (i + 1) % n;
                halfedges[i] = self.new_edge(vertices[i], vertices[ii]);
            }
        }

        let f = self.new_face();
        self.set_face_halfedge(f, halfedges[n - 1]);

        for i in 0..n {
            let ii = (i + 1) % n;
            let vh = vertices[ii];
            let inner_prev = halfedges[i];
            let inner_next = halfedges[ii];

            match (is_new[i], is_new[ii]) {
                (true, false) => {
                    // prev is new, next is old
                    let outer_next = inner_prev.twin();
                    let boundary_prev = self.prev(inner_next);
                    next_cache.push((boundary_prev, outer_next));
                    self.set_vertex_halfedge(vh, outer_next);
                    next_cache.push((inner_prev, inner_next));
                }
                (false, true) => {
                    // next is new, prev is old
                    let outer_prev = inner_next.twin();
                    let boundary_next = self.next(inner_prev);
                    next_cache.push((outer_prev, boundary_next));
                    self.set_vertex_halfedge(vh, boundary_next);
                    next_cache.push((inner_prev, inner_next));
                }
                (true, true) => {
                    let outer_prev = inner_next.twin();
                    let outer_next = inner_prev.twin();
                    let anchor = self.vertex_halfedge(vh);
                    if !anchor.is_valid() {
                        self.set_vertex_halfedge(vh, outer_next);
                        next_cache.push((outer_prev, outer_next));
                    } else {
                        let boundary_next = anchor;
                        let boundary_prev = self.prev(boundary_next);
                        next_cache.push((boundary_prev, outer_next));
                        next_cache.push((outer_prev, boundary_next));
                    }
                    next_cache.push((inner_prev, inner_next));
                }
                (false, false) => {
                    needs_adjust[ii] = self.vertex_halfedge(vh) == inner_next;
                }
            }

            self.set_face_of(halfedges[i], f);
        }

        for (a, b) in next_cache {
            self.set_next(a, b);
        }

        for i in 0..n {
            if needs_adjust[i] {
                self.adjust_outgoing_halfedge(vertices[i]);
            }
        }

        Ok(f)
    }

    // ==================== Validation ====================

    /// Audit all connectivity and report the first violated invariant.
    pub fn validate(&self) -> Result<()> {
        let budget = self.halfedges_size() + 1;

        for he in self.halfedge_ids() {
            let next = self.next(he);
            let prev = self.prev(he);
            if !self.is_valid(next) || !self.is_valid(prev) {
                return Err(MeshError::invalid_topology(format!(
                    "{:?} links to a dead or invalid half-edge",
                    he
                )));
            }
            if self.prev(next) != he || self.next(prev) != he {
                return Err(MeshError::invalid_topology(format!(
                    "next/prev of {:?} are not inverse",
                    he
                )));
            }
            if !self.is_valid(self.dest(he)) {
                return Err(MeshError::invalid_topology(format!(
                    "{:?} points to a dead or invalid vertex",
                    he
                )));
            }
            if self.origin(next) != self.dest(he) {
                return Err(MeshError::invalid_topology(format!(
                    "{:?} and its next do not share a vertex",
                    he
                )));
            }
            let f = self.face_of(he);
            if f.is_valid() && !self.is_valid(f) {
                return Err(MeshError::invalid_topology(format!(
                    "{:?} belongs to a dead face",
                    he
                )));
            }
            if self.face_of(next) != f {
                return Err(MeshError::invalid_topology(format!(
                    "{:?} and its next belong to different faces",
                    he
                )));
            }
        }

        for v in self.vertex_ids() {
            let anchor = self.vertex_halfedge(v);
            if !anchor.is_valid() {
                continue;
            }
            if !self.is_valid(anchor) || self.origin(anchor) != v {
                return Err(MeshError::invalid_topology(format!(
                    "outgoing half-edge of {:?} does not start there",
                    v
                )));
            }
            let mut he = anchor;
            let mut steps = 0;
            loop {
                if self.is_boundary_halfedge(he) && !self.is_boundary_halfedge(anchor) {
                    return Err(MeshError::invalid_topology(format!(
                        "boundary {:?} has an interior outgoing half-edge",
                        v
                    )));
                }
                he = self.cw_rotated(he);
                steps += 1;
                if he == anchor {
                    break;
                }
                if steps > budget {
                    return Err(MeshError::invalid_topology(format!(
                        "one-ring of {:?} does not close",
                        v
                    )));
                }
            }
        }

        for f in self.face_ids() {
            let anchor = self.face_halfedge(f);
            if !self.is_valid(anchor) || self.face_of(anchor) != f {
                return Err(MeshError::invalid_topology(format!(
                    "half-edge of {:?} does not belong to it",
                    f
                )));
            }
            let mut he = anchor;
            let mut steps = 0;
            loop {
                he = self.next(he);
                steps += 1;
                if he == anchor {
                    break;
                }
                if steps > budget {
                    return Err(MeshError::invalid_topology(format!(
                        "boundary loop of {:?} does not close",
                        f
                    )));
                }
            }
            if steps < 3 {
                return Err(MeshError::invalid_topology(format!(
                    "{:?} has only {} sides",
                    f, steps
                )));
            }
        }

        Ok(())
    }

    /// Check if the mesh is valid (all connectivity is consistent).
    pub fn is_consistent(&self) -> bool {
        self.validate().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> (HalfEdgeMesh, [VertexId; 4]) {
        let mut mesh = HalfEdgeMesh::new();
        let v = [
            mesh.add_vertex(Point3::new(0.0, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(1.0, 0.0, 0.0)),
            mesh.add_vertex(Point3::new(1.0, 1.0, 0.0)),
            mesh.add_vertex(Point3::new(0.0, 1.0, 0.0)),
        ];
        (mesh, v)
    }

    fn assert_unchanged(mesh: &HalfEdgeMesh, nv: usize, ne: usize, nf: usize) {
        assert_eq!(mesh.vertices_size(), nv);
        assert_eq!(mesh.edges_size(), ne);
        assert_eq!(mesh.halfedges_size(), 2 * ne);
        assert_eq!(mesh.faces_size(), nf);
        assert!(mesh.is_consistent());
    }

    #[test]
    fn test_empty_mesh() {
        let mesh = HalfEdgeMesh::new();
        assert_eq!(mesh.num_vertices(), 0);
        assert_eq!(mesh.num_halfedges(), 0);
        assert_eq!(mesh.num_faces(), 0);
        assert!(mesh.is_empty());
        assert!(mesh.is_consistent());
    }

    #[test]
    fn test_add_vertex() {
        let mut mesh = HalfEdgeMesh::new();
        let v0 = mesh.add_vertex(Point3::new(0.0, 0.0, 0.0));
        let v1 = mesh.add_vertex(Point3::new(1.0, 0.0, 0.0));

        assert_eq!(mesh.num_vertices(), 2);
        assert_eq!(v0.index(), 0);
        assert_eq!(v1.index(), 1);
        assert!(mesh.is_isolated(v0));
        assert!(mesh.is_boundary_vertex(v0));
        assert_eq!(mesh.valence(v0), 0);
    }

    #[test]
    fn test_single_triangle() {
        let (mut mesh, v) = square();
        let f = mesh.add_triangle(v[0], v[1], v[2]).unwrap();

        assert_eq!(mesh.num_faces(), 1);
        assert_eq!(mesh.num_edges(), 3);
        assert_eq!(mesh.num_halfedges(), 6);
        assert_eq!(mesh.face_valence(f), 3);
        assert!(mesh.is_consistent());

        // All outgoing half-edges of boundary vertices are boundary
        for &vi in &v[..3] {
            assert!(mesh.is_boundary_vertex(vi));
            assert!(mesh.is_boundary_halfedge(mesh.vertex_halfedge(vi)));
            assert_eq!(mesh.valence(vi), 2);
        }

        let he = mesh.find_halfedge(v[0], v[1]).unwrap();
        assert_eq!(mesh.origin(he), v[0]);
        assert_eq!(mesh.dest(he), v[1]);
        assert_eq!(mesh.face_of(he), f);
        assert!(mesh.find_halfedge(v[0], v[3]).is_none());
    }

    #[test]
    fn test_shared_edge_reused() {
        let (mut mesh, v) = square();
        mesh.add_triangle(v[0], v[1], v[2]).unwrap();
        mesh.add_triangle(v[0], v[2], v[3]).unwrap();

        assert_eq!(mesh.num_edges(), 5);
        assert!(mesh.is_consistent());
        let e = mesh.find_edge(v[0], v[2]).unwrap();
        assert!(!mesh.is_boundary_edge(e));
        assert_eq!(mesh.valence(v[0]), 3);
        assert_eq!(mesh.valence(v[1]), 2);
    }

    #[test]
    fn test_fan_closes_around_vertex() {
        // Hexagon fan: the last triangle closes the ring around the center.
        let mut mesh = HalfEdgeMesh::new();
        let c = mesh.add_vertex(Point3::origin());
        let ring: Vec<VertexId> = (0..6)
            .map(|i| {
                let a = i as f64 * std::f64::consts::PI / 3.0;
                mesh.add_vertex(Point3::new(a.cos(), a.sin(), 0.0))
            })
            .collect();
        for i in 0..6 {
            mesh.add_triangle(c, ring[i], ring[(i + 1) % 6]).unwrap();
            assert!(mesh.is_consistent());
        }
        assert!(!mesh.is_boundary_vertex(c));
        assert_eq!(mesh.valence(c), 6);
        assert!(mesh.is_manifold(c));
    }

    #[test]
    fn test_add_face_errors_leave_mesh_untouched() {
        let (mut mesh, v) = square();
        mesh.add_triangle(v[0], v[1], v[2]).unwrap();

        assert_eq!(
            mesh.add_face(&[v[0], v[1]]),
            Err(MeshError::TooFewVertices { count: 2 })
        );
        assert_eq!(
            mesh.add_face(&[v[0], v[3], v[0]]),
            Err(MeshError::DuplicateVertex { vertex: 0 })
        );
        assert_eq!(
            mesh.add_face(&[v[0], VertexId::new(17), v[3]]),
            Err(MeshError::InvalidHandle {
                element: ElementKind::Vertex,
                index: 17
            })
        );
        // Same orientation as the existing face: edge v0->v1 is interior.
        assert_eq!(
            mesh.add_triangle(v[0], v[1], v[3]),
            Err(MeshError::ComplexEdge { from: 0, to: 1 })
        );
        assert_unchanged(&mesh, 4, 3, 1);
    }

    #[test]
    fn test_complex_vertex_rejected() {
        let mut mesh = HalfEdgeMesh::new();
        let c = mesh.add_vertex(Point3::origin());
        let ring: Vec<VertexId> = (0..3)
            .map(|i| {
                let a = i as f64 * 2.0 * std::f64::consts::PI / 3.0;
                mesh.add_vertex(Point3::new(a.cos(), a.sin(), 0.0))
            })
            .collect();
        for i in 0..3 {
            mesh.add_triangle(c, ring[i], ring[(i + 1) % 3]).unwrap();
        }
        // c is now interior.
        let extra = mesh.add_vertex(Point3::new(0.0, 0.0, 1.0));
        let other = mesh.add_vertex(Point3::new(1.0, 0.0, 1.0));
        assert_eq!(
            mesh.add_triangle(c, extra, other),
            Err(MeshError::ComplexVertex { vertex: c.raw() })
        );
        assert!(mesh.is_consistent());
        assert_eq!(mesh.num_faces(), 3);
    }

    #[test]
    fn test_mesh_type_queries() {
        let (mut mesh, v) = square();
        mesh.add_quad(v[0], v[1], v[2], v[3]).unwrap();
        assert!(mesh.is_quad_mesh());
        assert!(!mesh.is_triangle_mesh());

        let (mut mesh, v) = square();
        mesh.add_triangle(v[0], v[1], v[2]).unwrap();
        assert!(mesh.is_triangle_mesh());
        assert!(!mesh.is_quad_mesh());
    }

    #[test]
    fn test_user_properties() {
        let (mut mesh, v) = square();
        let mark: VertexProperty<i32> = mesh.add_property("v:mark", -1).unwrap();
        assert_eq!(*mesh.prop(mark, v[2]), -1);
        mesh.set_prop(mark, v[2], 5);
        assert_eq!(mesh.prop_values(mark), &[-1, -1, 5, -1]);

        // New elements get the default.
        let v4 = mesh.add_vertex(Point3::new(2.0, 0.0, 0.0));
        assert_eq!(*mesh.prop(mark, v4), -1);

        assert!(mesh.has_property::<VertexId>("v:mark"));
        assert_eq!(mesh.get_property::<VertexId, i32>("v:mark"), Some(mark));
        assert_eq!(mesh.get_property::<VertexId, f64>("v:mark"), None);
        assert!(mesh.add_vertex_property("v:mark", 0.0f64).is_err());

        assert!(mesh.remove_property(mark));
        assert!(!mesh.has_property::<VertexId>("v:mark"));
    }

    #[test]
    fn test_builtin_properties_are_protected() {
        let mut mesh = HalfEdgeMesh::new();
        let points = mesh.points_property();
        assert!(!mesh.remove_property(points));
        assert_eq!(mesh.get_property::<VertexId, Point3<f64>>("v:point"), Some(points));

        let names = mesh.property_names::<VertexId>();
        assert!(names.contains(&"v:point"));
        assert!(names.contains(&"v:connectivity"));
        assert!(names.contains(&"v:deleted"));
    }

    #[test]
    fn test_reserved_names_rejected() {
        let (mut mesh, v) = square();
        mesh.add_triangle(v[0], v[1], v[2]).unwrap();

        for result in [
            mesh.add_vertex_property("v:deleted", false).map(|_| ()),
            mesh.add_edge_property("e:deleted", false).map(|_| ()),
            mesh.add_face_property("f:deleted", false).map(|_| ()),
            mesh.add_vertex_property("v:connectivity", 0i32).map(|_| ()),
        ] {
            assert!(matches!(result, Err(MeshError::DuplicateProperty { .. })));
        }
        assert_eq!(mesh.get_property::<EdgeId, bool>("e:deleted"), None);
        assert_eq!(mesh.get_property::<FaceId, bool>("f:deleted"), None);

        // deleting still goes through the counters
        mesh.delete_face(FaceId::new(0)).unwrap();
        assert_eq!(mesh.num_faces(), 0);
        mesh.garbage_collection();
        assert_eq!(mesh.faces_size(), 0);

        // positions stay available under their name
        assert!(mesh.add_vertex_property("v:point", Point3::<f64>::origin()).is_ok());
        // a reserved name of another category is a plain user name here
        assert!(mesh.add_face_property("v:deleted", false).is_ok());
    }

    #[test]
    #[should_panic]
    fn test_out_of_range_query_panics() {
        let (mesh, _) = square();
        mesh.is_boundary_vertex(VertexId::new(99));
    }

    #[test]
    fn test_clear_resets() {
        let (mut mesh, v) = square();
        mesh.add_quad(v[0], v[1], v[2], v[3]).unwrap();
        mesh.add_face_property("f:area", 0.0f64).unwrap();
        mesh.clear();
        assert!(mesh.is_empty());
        assert_eq!(mesh.faces_size(), 0);
        assert!(!mesh.has_property::<FaceId>("f:area"));
    }

    #[test]
    fn test_is_valid_handle() {
        let (mesh, v) = square();
        assert!(mesh.is_valid(v[0]));
        assert!(!mesh.is_valid(VertexId::new(4)));
        assert!(!mesh.is_valid(VertexId::invalid()));
        assert!(!mesh.is_valid(FaceId::new(0)));
        assert!(mesh.check_handle(EdgeId::new(0)).is_err());
    }
}
