//! # Hemesh
//!
//! A halfedge polygon mesh kernel with decimation and remeshing.
//!
//! Hemesh stores surface meshes as halfedge connectivity in index-addressed
//! arrays, lets client code attach named per-element properties, and edits
//! meshes through local topological operators with deferred deletion and
//! explicit garbage collection.
//!
//! ## Features
//!
//! - **Halfedge data structure**: O(1) adjacency queries with type-safe handles
//! - **Named properties**: typed per-vertex, halfedge, edge and face arrays
//! - **Euler operators**: edge flip, split and collapse with legality checks
//! - **Deferred deletion**: soft deletes, compacted by `garbage_collection`
//! - **Algorithms**: quadric decimation, adaptive remeshing, curvature
//!
//! ## Quick Start
//!
//! ```
//! use hemesh::prelude::*;
//!
//! let mesh = shapes::icosahedron().unwrap();
//!
//! // Query mesh properties
//! println!("Vertices: {}", mesh.num_vertices());
//! println!("Faces: {}", mesh.num_faces());
//!
//! // Iterate over faces
//! for face_id in mesh.face_ids() {
//!     let normal = mesh.face_normal(face_id);
//!     let area = mesh.face_area(face_id);
//!     println!("Face {:?}: normal={:?}, area={}", face_id, normal, area);
//! }
//! ```
//!
//! ## Building Meshes Programmatically
//!
//! ```
//! use hemesh::prelude::*;
//! use nalgebra::Point3;
//!
//! // Define vertices and faces
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//!     Point3::new(0.5, 0.5, 1.0),
//! ];
//!
//! let faces = vec![
//!     [0, 2, 1],  // bottom
//!     [0, 1, 3],  // front
//!     [1, 2, 3],  // right
//!     [2, 0, 3],  // left
//! ];
//!
//! // Build the mesh
//! let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
//! assert_eq!(mesh.num_vertices(), 4);
//! assert_eq!(mesh.num_faces(), 4);
//! ```
//!
//! ## Mesh Traversal
//!
//! The half-edge structure enables efficient traversal of mesh elements:
//!
//! ```
//! use hemesh::prelude::*;
//! use nalgebra::Point3;
//!
//! # let vertices = vec![
//! #     Point3::new(0.0, 0.0, 0.0),
//! #     Point3::new(1.0, 0.0, 0.0),
//! #     Point3::new(0.5, 1.0, 0.0),
//! # ];
//! # let faces = vec![[0, 1, 2]];
//! # let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
//! // Iterate over neighbors of a vertex
//! let v = VertexId::new(0);
//! for neighbor in mesh.vertex_neighbors(v) {
//!     println!("Neighbor: {:?}", neighbor);
//! }
//!
//! // Iterate over faces around a vertex
//! for face in mesh.vertex_faces(v) {
//!     println!("Adjacent face: {:?}", face);
//! }
//!
//! // Get vertices of a face
//! let f = FaceId::new(0);
//! let [v0, v1, v2] = mesh.face_triangle(f);
//! ```
//!
//! ## Editing
//!
//! Deletions only mark elements; handles stay stable until the next
//! garbage collection compacts the arrays:
//!
//! ```
//! use hemesh::prelude::*;
//!
//! let mut mesh = shapes::icosahedron().unwrap();
//! mesh.delete_face(FaceId::new(0)).unwrap();
//! assert!(mesh.has_garbage());
//! assert_eq!(mesh.num_faces(), 19);
//! assert_eq!(mesh.faces_size(), 20);
//!
//! mesh.garbage_collection();
//! assert_eq!(mesh.faces_size(), 19);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod error;
pub mod mesh;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions:
///
/// ```
/// use hemesh::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::Progress;
    pub use crate::error::{MeshError, Result};
    pub use crate::mesh::{
        build_from_polygons, build_from_quads, build_from_triangles, shapes, to_face_vertex,
        EdgeId, EdgeProperty, ElementId, FaceId, FaceProperty, HalfEdgeId, HalfEdgeMesh,
        HalfEdgeProperty, Property, VertexId, VertexProperty,
    };
}

// Re-export nalgebra types for convenience
pub use nalgebra;
