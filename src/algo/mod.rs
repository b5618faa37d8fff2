//! Mesh processing algorithms.
//!
//! Algorithms operate on a [`HalfEdgeMesh`](crate::mesh::HalfEdgeMesh)
//! through its public editing operations and named properties:
//!
//! - **Curvature**: Discrete mean, Gaussian and principal curvatures
//! - **Decimation**: Incremental halfedge collapses ranked by quadric error
//! - **Remeshing**: Uniform and curvature-adaptive isotropic remeshing
//!
//! Long-running algorithms accept a [`Progress`] reporter in their options.

pub mod curvature;
pub mod decimate;
pub mod progress;
pub mod remesh;

pub use progress::Progress;
