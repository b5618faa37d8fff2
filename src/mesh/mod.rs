//! Core mesh data structures.
//!
//! This module provides the half-edge mesh representation and related types
//! for representing and manipulating polygon meshes.
//!
//! # Overview
//!
//! The primary type is [`HalfEdgeMesh`], which represents a polygon mesh using
//! a half-edge (doubly-connected edge list) data structure. This representation
//! provides O(1) adjacency queries, making it efficient for geometry processing
//! algorithms. All per-element data, including connectivity and positions, is
//! stored in named property arrays ([`PropertyContainer`]).
//!
//! # Index Types
//!
//! Mesh elements are identified by type-safe handles:
//! - [`VertexId`] - Identifies a vertex
//! - [`HalfEdgeId`] - Identifies a half-edge
//! - [`EdgeId`] - Identifies a full edge
//! - [`FaceId`] - Identifies a face
//!
//! Each wraps an `i32`; `-1` is the invalid handle.
//!
//! # Construction
//!
//! Meshes are built incrementally or from face-vertex lists:
//!
//! ```
//! use hemesh::mesh::{HalfEdgeMesh, build_from_triangles};
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//! ];
//! let faces = vec![[0, 1, 2]];
//!
//! let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
//! assert_eq!(mesh.num_halfedges(), 6);
//! ```

mod builder;
mod circulator;
mod edit;
mod euler;
mod geometry;
mod halfedge;
mod index;
mod property;
pub mod shapes;

pub use builder::{
    build_from_polygons, build_from_quads, build_from_triangles, to_face_vertex,
    to_face_vertex_polygons,
};
pub use circulator::{ElementIter, FaceCirculator, VertexCirculator};
pub use edit::HandleMap;
pub use geometry::{angle, cotan, dist_point_triangle, triangle_area, triangle_normal};
pub use halfedge::{Face, HalfEdge, HalfEdgeMesh, Vertex};
pub use index::{EdgeId, ElementId, FaceId, HalfEdgeId, VertexId};
pub use property::{
    Color, EdgeProperty, FaceProperty, HalfEdgeProperty, Property, PropertyContainer,
    PropertyKind, PropertyValue, VertexProperty,
};
