//! Deferred deletion and garbage collection.
//!
//! Deleting an element only sets its `*:deleted` flag and unlinks it from the
//! surviving connectivity. The element keeps its array slot, so every handle
//! obtained earlier still indexes the same element. Slots are reclaimed by
//! [`HalfEdgeMesh::garbage_collection`], the only operation that renumbers
//! elements.

use crate::error::Result;

use super::halfedge::{HalfEdge, HalfEdgeMesh};
use super::index::{EdgeId, FaceId, HalfEdgeId, VertexId};

/// Old-to-new handle translation produced by garbage collection.
///
/// Elements that were removed map to the invalid handle.
#[derive(Debug, Clone, Default)]
pub struct HandleMap {
    vertices: Vec<Option<usize>>,
    edges: Vec<Option<usize>>,
    faces: Vec<Option<usize>>,
}

fn lookup(map: &[Option<usize>], raw: i32) -> Option<usize> {
    if raw < 0 {
        return None;
    }
    map.get(raw as usize).copied().flatten()
}

impl HandleMap {
    /// New handle of a vertex.
    pub fn vertex(&self, old: VertexId) -> VertexId {
        lookup(&self.vertices, old.raw()).map_or(VertexId::invalid(), VertexId::new)
    }

    /// New handle of a half-edge.
    pub fn halfedge(&self, old: HalfEdgeId) -> HalfEdgeId {
        if !old.is_valid() {
            return HalfEdgeId::invalid();
        }
        match lookup(&self.edges, old.edge().raw()) {
            Some(e) => EdgeId::new(e).halfedge(old.index() & 1),
            None => HalfEdgeId::invalid(),
        }
    }

    /// New handle of an edge.
    pub fn edge(&self, old: EdgeId) -> EdgeId {
        lookup(&self.edges, old.raw()).map_or(EdgeId::invalid(), EdgeId::new)
    }

    /// New handle of a face.
    pub fn face(&self, old: FaceId) -> FaceId {
        lookup(&self.faces, old.raw()).map_or(FaceId::invalid(), FaceId::new)
    }
}

/// Stable old-to-new map keeping non-deleted entries in order.
fn compaction_map(deleted: &[bool]) -> (Vec<Option<usize>>, usize) {
    let mut next = 0;
    let map = deleted
        .iter()
        .map(|&dead| {
            if dead {
                None
            } else {
                next += 1;
                Some(next - 1)
            }
        })
        .collect();
    (map, next)
}

impl HalfEdgeMesh {
    // ==================== Deletion ====================

    /// Delete a vertex together with all incident faces.
    ///
    /// Edges and vertices left dangling are deleted too. Deleting an already
    /// deleted vertex does nothing.
    pub fn delete_vertex(&mut self, v: VertexId) -> Result<()> {
        if self.is_deleted(v) {
            return Ok(());
        }
        self.check_handle(v)?;

        let incident: Vec<FaceId> = self.vertex_faces(v).collect();
        for f in incident {
            self.delete_face(f)?;
        }

        self.set_deleted_vertex(v);
        Ok(())
    }

    /// Delete an edge and its (one or two) incident faces.
    pub fn delete_edge(&mut self, e: EdgeId) -> Result<()> {
        if self.is_deleted(e) {
            return Ok(());
        }
        self.check_handle(e)?;

        let f0 = self.face_of(e.halfedge(0));
        let f1 = self.face_of(e.halfedge(1));
        if f0.is_valid() {
            self.delete_face(f0)?;
        }
        if f1.is_valid() {
            self.delete_face(f1)?;
        }
        Ok(())
    }

    /// Delete a face.
    ///
    /// Its half-edges become boundary half-edges. Edges that end up with no
    /// face on either side are deleted, and so are vertices left without
    /// edges.
    pub fn delete_face(&mut self, f: FaceId) -> Result<()> {
        if self.is_deleted(f) {
            return Ok(());
        }
        self.check_handle(f)?;

        self.set_deleted_face(f);

        let loop_halfedges: Vec<HalfEdgeId> = self.face_halfedges(f).collect();
        let mut dead_edges = Vec::new();
        let mut touched = Vec::with_capacity(loop_halfedges.len());
        for &he in &loop_halfedges {
            self.set_face_of(he, FaceId::invalid());
            if self.is_boundary_halfedge(he.twin()) {
                dead_edges.push(he.edge());
            }
            touched.push(self.dest(he));
        }

        for e in dead_edges {
            let h0 = e.halfedge(0);
            let v0 = self.dest(h0);
            let next0 = self.next(h0);
            let prev0 = self.prev(h0);

            let h1 = e.halfedge(1);
            let v1 = self.dest(h1);
            let next1 = self.next(h1);
            let prev1 = self.prev(h1);

            // Bypass the edge in both boundary loops
            self.set_next(prev0, next1);
            self.set_next(prev1, next0);

            self.set_deleted_edge(e);

            // h1 leaves v0, h0 leaves v1
            if self.vertex_halfedge(v0) == h1 {
                if next0 == h1 {
                    self.set_vertex_halfedge(v0, HalfEdgeId::invalid());
                    self.set_deleted_vertex(v0);
                } else {
                    self.set_vertex_halfedge(v0, next0);
                }
            }
            if self.vertex_halfedge(v1) == h0 {
                if next1 == h0 {
                    self.set_vertex_halfedge(v1, HalfEdgeId::invalid());
                    self.set_deleted_vertex(v1);
                } else {
                    self.set_vertex_halfedge(v1, next1);
                }
            }
        }

        for v in touched {
            if !self.is_deleted(v) {
                self.adjust_outgoing_halfedge(v);
            }
        }

        Ok(())
    }

    // ==================== Garbage Collection ====================

    /// Remove all deleted elements and renumber the survivors.
    ///
    /// Survivors keep their relative order. Every property array, built-in or
    /// user-defined, is compacted with the same maps, and connectivity is
    /// rewritten through them. All handles obtained before the call are
    /// invalid afterwards; use [`garbage_collection_with_map`] to translate
    /// them. Handle-valued user properties are not rewritten.
    ///
    /// [`garbage_collection_with_map`]: Self::garbage_collection_with_map
    pub fn garbage_collection(&mut self) {
        self.garbage_collection_with_map();
    }

    /// Garbage collection that also returns the old-to-new handle maps.
    pub fn garbage_collection_with_map(&mut self) -> HandleMap {
        let (vmap, nv) = compaction_map(self.prop_values(self.vdeleted));
        let (emap, ne) = compaction_map(self.prop_values(self.edeleted));
        let (fmap, nf) = compaction_map(self.prop_values(self.fdeleted));

        let map = HandleMap {
            vertices: vmap,
            edges: emap,
            faces: fmap,
        };

        if !self.has_garbage {
            return map;
        }

        // Rewrite references held by live elements before moving them.
        let live_vertices: Vec<VertexId> = self.vertex_ids().collect();
        for v in live_vertices {
            let he = self.vertex_halfedge(v);
            self.set_vertex_halfedge(v, map.halfedge(he));
        }

        let live_halfedges: Vec<HalfEdgeId> = self.halfedge_ids().collect();
        for he in live_halfedges {
            let record = *self.halfedge(he);
            let remapped = HalfEdge {
                vertex: map.vertex(record.vertex),
                next: map.halfedge(record.next),
                prev: map.halfedge(record.prev),
                face: map.face(record.face),
            };
            self.set_prop(self.hconn, he, remapped);
        }

        let live_faces: Vec<FaceId> = self.face_ids().collect();
        for f in live_faces {
            let he = self.face_halfedge(f);
            self.set_face_halfedge(f, map.halfedge(he));
        }

        let hmap: Vec<Option<usize>> = map
            .edges
            .iter()
            .flat_map(|e| [e.map(|e| 2 * e), e.map(|e| 2 * e + 1)])
            .collect();

        self.vprops.compact(&map.vertices, nv);
        self.hprops.compact(&hmap, 2 * ne);
        self.eprops.compact(&map.edges, ne);
        self.fprops.compact(&map.faces, nf);

        self.deleted_vertices = 0;
        self.deleted_edges = 0;
        self.deleted_faces = 0;
        self.has_garbage = false;

        map
    }
}
