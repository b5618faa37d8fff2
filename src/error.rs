//! Error types for hemesh.
//!
//! This module defines all error types used throughout the library. Kernel
//! operations validate their inputs before touching connectivity, so an `Err`
//! always leaves the mesh exactly as it was before the call.

use std::fmt;

use thiserror::Error;

use crate::mesh::PropertyKind;

/// Result type alias using [`MeshError`].
pub type Result<T> = std::result::Result<T, MeshError>;

/// The four element categories of a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Vertices.
    Vertex,
    /// Halfedges.
    HalfEdge,
    /// Edges (pairs of halfedges).
    Edge,
    /// Faces.
    Face,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementKind::Vertex => "vertex",
            ElementKind::HalfEdge => "halfedge",
            ElementKind::Edge => "edge",
            ElementKind::Face => "face",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during mesh operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeshError {
    /// A handle is out of range or refers to a deleted element.
    #[error("invalid {element} handle {index}")]
    InvalidHandle {
        /// Category of the handle.
        element: ElementKind,
        /// Raw index of the handle.
        index: i32,
    },

    /// A face was given fewer than three vertices.
    #[error("a face needs at least 3 vertices, got {count}")]
    TooFewVertices {
        /// Number of vertices supplied.
        count: usize,
    },

    /// A face lists the same vertex more than once.
    #[error("face repeats vertex {vertex}")]
    DuplicateVertex {
        /// Raw index of the repeated vertex.
        vertex: i32,
    },

    /// Adding the face would make a vertex non-manifold.
    #[error("complex vertex {vertex}: face would join two separate fans")]
    ComplexVertex {
        /// Raw index of the offending vertex.
        vertex: i32,
    },

    /// Adding the face would give an edge more than two incident faces.
    #[error("complex edge ({from}, {to}): edge already has two faces")]
    ComplexEdge {
        /// Start vertex of the edge.
        from: i32,
        /// End vertex of the edge.
        to: i32,
    },

    /// No free boundary gap was found to relink the patch around a vertex.
    #[error("patch re-linking failed at vertex {vertex}")]
    PatchRelinkFailed {
        /// Raw index of the vertex where relinking failed.
        vertex: i32,
    },

    /// A local topology operator was asked to do something illegal.
    #[error("illegal {operation} on {element} {index}")]
    IllegalOperation {
        /// Name of the operator.
        operation: &'static str,
        /// Category of the handle the operator was applied to.
        element: ElementKind,
        /// Raw index of the handle.
        index: i32,
    },

    /// A face references an invalid vertex index.
    #[error("face {face} references invalid vertex index {vertex}")]
    InvalidVertexIndex {
        /// The face index.
        face: usize,
        /// The invalid vertex index.
        vertex: usize,
    },

    /// A property with the same name but a different value type exists.
    #[error("property {name:?} already exists as {existing:?}, requested {requested:?}")]
    DuplicateProperty {
        /// Property name.
        name: String,
        /// Kind of the stored property.
        existing: PropertyKind,
        /// Kind that was requested.
        requested: PropertyKind,
    },

    /// Connectivity is corrupted (broken loop, dangling reference).
    #[error("invalid topology: {details}")]
    InvalidTopology {
        /// Description of the violated invariant.
        details: String,
    },

    /// An algorithm was invoked on input it does not support.
    #[error("precondition violated: {0}")]
    Precondition(String),

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },
}

impl MeshError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        MeshError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }

    /// Create an invalid topology error.
    pub fn invalid_topology(details: impl Into<String>) -> Self {
        MeshError::InvalidTopology {
            details: details.into(),
        }
    }

    /// True for errors caused by a request that would break manifoldness or
    /// an under-specified polygon.
    pub fn is_topology_error(&self) -> bool {
        matches!(
            self,
            MeshError::TooFewVertices { .. }
                | MeshError::DuplicateVertex { .. }
                | MeshError::ComplexVertex { .. }
                | MeshError::ComplexEdge { .. }
                | MeshError::PatchRelinkFailed { .. }
                | MeshError::IllegalOperation { .. }
                | MeshError::InvalidVertexIndex { .. }
        )
    }

    /// True for algorithm-level misuse.
    pub fn is_precondition_error(&self) -> bool {
        matches!(
            self,
            MeshError::Precondition(_) | MeshError::InvalidParameter { .. }
        )
    }
}
