//! Index types for mesh elements.
//!
//! This module provides type-safe handles for vertices, half-edges, edges and
//! faces. Each handle wraps an `i32` where `-1` is the null handle. Handles are
//! plain values resolved against a specific [`HalfEdgeMesh`](super::HalfEdgeMesh);
//! they stay meaningful until the next garbage collection renumbers elements.
//!
//! Edges are implicit: edge `i` owns half-edges `2i` and `2i + 1`, so the
//! opposite of a half-edge is found by flipping its lowest bit.

use std::fmt::{self, Debug};
use std::hash::Hash;

use crate::error::ElementKind;

/// Common interface of the four handle types.
pub trait ElementId:
    Copy + Clone + Eq + PartialEq + Ord + PartialOrd + Hash + Debug + Default + Send + Sync + 'static
{
    /// Category this handle indexes.
    const KIND: ElementKind;

    /// Create a handle from an array index.
    fn from_index(index: usize) -> Self;

    /// The array index of this handle.
    ///
    /// Only meaningful for valid handles.
    fn to_index(self) -> usize;

    /// The raw signed value, `-1` when invalid.
    fn to_raw(self) -> i32;

    /// Check if this is a valid (non-null) handle.
    fn is_valid_id(self) -> bool {
        self.to_raw() >= 0
    }
}

/// A type-safe vertex handle.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct VertexId(i32);

/// A type-safe half-edge handle.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct HalfEdgeId(i32);

/// A type-safe edge handle (for full edges, not half-edges).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct EdgeId(i32);

/// A type-safe face handle.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct FaceId(i32);

const INVALID: i32 = -1;

macro_rules! impl_index_type {
    ($name:ident, $kind:expr, $display:literal) => {
        impl $name {
            /// Create a new handle from an array index.
            #[inline]
            pub fn new(index: usize) -> Self {
                debug_assert!(index <= i32::MAX as usize, "index {} too large", index);
                Self(index as i32)
            }

            /// Create an invalid/null handle.
            #[inline]
            pub const fn invalid() -> Self {
                Self(INVALID)
            }

            /// Get the array index.
            #[inline]
            pub fn index(self) -> usize {
                debug_assert!(self.is_valid(), "index of invalid {:?}", self);
                self.0 as usize
            }

            /// Get the raw signed value.
            #[inline]
            pub fn raw(self) -> i32 {
                self.0
            }

            /// Check if this is a valid (non-null) handle.
            #[inline]
            pub fn is_valid(self) -> bool {
                self.0 >= 0
            }
        }

        impl ElementId for $name {
            const KIND: ElementKind = $kind;

            #[inline]
            fn from_index(index: usize) -> Self {
                Self::new(index)
            }

            #[inline]
            fn to_index(self) -> usize {
                self.0 as usize
            }

            #[inline]
            fn to_raw(self) -> i32 {
                self.0
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, "{}({})", $display, self.0)
                } else {
                    write!(f, "{}(INVALID)", $display)
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::invalid()
            }
        }

        impl From<usize> for $name {
            fn from(v: usize) -> Self {
                Self::new(v)
            }
        }
    };
}

impl_index_type!(VertexId, ElementKind::Vertex, "V");
impl_index_type!(HalfEdgeId, ElementKind::HalfEdge, "HE");
impl_index_type!(EdgeId, ElementKind::Edge, "E");
impl_index_type!(FaceId, ElementKind::Face, "F");

impl HalfEdgeId {
    /// The opposite half-edge of the same edge.
    #[inline]
    pub fn twin(self) -> HalfEdgeId {
        HalfEdgeId(self.0 ^ 1)
    }

    /// The edge this half-edge belongs to.
    #[inline]
    pub fn edge(self) -> EdgeId {
        EdgeId(self.0 >> 1)
    }
}

impl EdgeId {
    /// One of the two half-edges of this edge (`i` is 0 or 1).
    #[inline]
    pub fn halfedge(self, i: usize) -> HalfEdgeId {
        debug_assert!(i < 2);
        HalfEdgeId((self.0 << 1) + i as i32)
    }
}
