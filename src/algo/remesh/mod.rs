//! Uniform and curvature-adaptive remeshing of triangle meshes.
//!
//! The remesher (Botsch & Kobbelt 2004, Dunyach et al. 2013) repeats four
//! local passes a fixed number of times:
//!
//! 1. **Split** edges longer than 4/3 of the local target length
//! 2. **Collapse** edges shorter than 4/5 of the local target length
//! 3. **Flip** edges to bring valences toward 6 (4 on the boundary)
//! 4. **Relax** vertices tangentially, optionally projecting them back onto
//!    the input surface
//!
//! The local target comes from a per-vertex sizing field: constant for
//! [`RemeshOptions::uniform`], derived from the maximum absolute curvature
//! for [`RemeshOptions::adaptive`] (see [`compute_sizing_field`]), or given
//! per vertex with [`RemeshOptions::custom`].
//!
//! # Example
//!
//! ```
//! use hemesh::prelude::*;
//! use hemesh::algo::remesh::{remesh, RemeshOptions};
//!
//! let mut mesh = shapes::icosphere(2).unwrap();
//!
//! let options = RemeshOptions::adaptive(0.05, 0.5, 0.01).with_iterations(3);
//! remesh(&mut mesh, &options).unwrap();
//!
//! assert!(mesh.validate().is_ok());
//! ```
//!
//! # References
//!
//! - Botsch, M., & Kobbelt, L. (2004). "A remeshing approach to multiresolution modeling."
//!   Symposium on Geometry Processing.
//! - Dunyach, M., et al. (2013). "Adaptive remeshing for real-time mesh deformation."
//!   Eurographics.

mod kdtree;
mod remesher;
mod sizing;

pub use remesher::remesh;
pub use sizing::{compute_sizing_field, SizingField};

use crate::algo::progress::Progress;
use crate::error::{MeshError, Result};

/// How target edge lengths are assigned to vertices.
#[derive(Debug, Clone, PartialEq)]
pub enum SizingMode {
    /// `max_length` everywhere.
    Uniform,
    /// Curvature-adapted lengths in `[min_length, max_length]`.
    Adaptive,
    /// One length per vertex, in vertex iteration order.
    Custom(Vec<f64>),
}

/// Options for remeshing.
#[derive(Debug, Clone)]
pub struct RemeshOptions {
    /// How the sizing field is built.
    pub mode: SizingMode,

    /// Smallest target edge length.
    pub min_length: f64,

    /// Largest target edge length.
    pub max_length: f64,

    /// Maximum distance between the surface and the chords of the
    /// remeshed triangles (adaptive mode only).
    pub approx_error: f64,

    /// Number of split/collapse/flip/relax iterations (default: 10).
    pub iterations: usize,

    /// Project moved vertices back onto the input surface (default: true).
    pub use_projection: bool,

    /// Whether to use parallel execution (default: true).
    pub parallel: bool,

    /// Progress callback and abort hook.
    pub progress: Progress,
}

impl RemeshOptions {
    fn with_mode(mode: SizingMode, min_length: f64, max_length: f64, approx_error: f64) -> Self {
        Self {
            mode,
            min_length,
            max_length,
            approx_error,
            iterations: 10,
            use_projection: true,
            parallel: true,
            progress: Progress::none(),
        }
    }

    /// Create options targeting the same edge length everywhere.
    pub fn uniform(edge_length: f64) -> Self {
        Self::with_mode(SizingMode::Uniform, edge_length, edge_length, 0.0)
    }

    /// Create options for curvature-adaptive edge lengths.
    pub fn adaptive(min_length: f64, max_length: f64, approx_error: f64) -> Self {
        Self::with_mode(SizingMode::Adaptive, min_length, max_length, approx_error)
    }

    /// Create options with one target length per vertex.
    pub fn custom(lengths: Vec<f64>) -> Self {
        let min = lengths.iter().copied().fold(f64::INFINITY, f64::min);
        let max = lengths.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self::with_mode(SizingMode::Custom(lengths), min, max, 0.0)
    }

    /// Set the number of iterations.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set whether vertices are projected onto the input surface.
    pub fn with_projection(mut self, use_projection: bool) -> Self {
        self.use_projection = use_projection;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Create options for single-threaded execution.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Set the progress reporter.
    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Check that the target lengths are usable.
    pub fn validate(&self) -> Result<()> {
        match &self.mode {
            SizingMode::Uniform => {
                positive("edge_length", self.max_length)?;
            }
            SizingMode::Adaptive => {
                positive("min_length", self.min_length)?;
                positive("max_length", self.max_length)?;
                positive("approx_error", self.approx_error)?;
                if self.min_length > self.max_length {
                    return Err(MeshError::Precondition(format!(
                        "min_length {} exceeds max_length {}",
                        self.min_length, self.max_length
                    )));
                }
            }
            SizingMode::Custom(lengths) => {
                for &length in lengths {
                    positive("length", length)?;
                }
            }
        }
        Ok(())
    }
}

impl Default for RemeshOptions {
    fn default() -> Self {
        Self::uniform(1.0)
    }
}

fn positive(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(MeshError::invalid_param(name, value, "must be positive and finite"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let uniform = RemeshOptions::uniform(0.2);
        assert_eq!(uniform.mode, SizingMode::Uniform);
        assert_eq!((uniform.min_length, uniform.max_length), (0.2, 0.2));
        assert_eq!(uniform.iterations, 10);
        assert!(uniform.use_projection);
        assert!(uniform.parallel);

        let adaptive = RemeshOptions::adaptive(0.1, 0.5, 0.01);
        assert_eq!(adaptive.mode, SizingMode::Adaptive);
        assert_eq!(adaptive.approx_error, 0.01);

        let custom = RemeshOptions::custom(vec![0.3, 0.1, 0.2]);
        assert_eq!((custom.min_length, custom.max_length), (0.1, 0.3));
    }

    #[test]
    fn test_builder_setters() {
        let options = RemeshOptions::uniform(1.0)
            .with_iterations(3)
            .with_projection(false)
            .with_parallel(false);
        assert_eq!(options.iterations, 3);
        assert!(!options.use_projection);
        assert!(!options.parallel);
        assert!(!RemeshOptions::uniform(1.0).sequential().parallel);

        let default = RemeshOptions::default();
        assert_eq!(default.mode, SizingMode::Uniform);
        assert_eq!(default.max_length, 1.0);
    }

    #[test]
    fn test_validate() {
        assert!(RemeshOptions::uniform(0.1).validate().is_ok());
        assert!(RemeshOptions::adaptive(0.1, 0.1, 0.001).validate().is_ok());

        let err = RemeshOptions::adaptive(0.5, 0.1, 0.01).validate().unwrap_err();
        assert!(err.is_precondition_error());
        assert!(RemeshOptions::uniform(-1.0).validate().is_err());
        assert!(RemeshOptions::uniform(f64::INFINITY).validate().is_err());
        assert!(RemeshOptions::adaptive(0.0, 0.1, 0.01).validate().is_err());
        assert!(RemeshOptions::adaptive(0.1, 0.2, 0.0).validate().is_err());
        assert!(RemeshOptions::custom(vec![0.1, 0.0]).validate().is_err());
    }
}
