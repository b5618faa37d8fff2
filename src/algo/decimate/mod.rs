//! Mesh decimation (simplification) by incremental halfedge collapses.
//!
//! Vertices are removed one at a time by collapsing an outgoing halfedge
//! into its target vertex. Candidates are ranked by quadric error and every
//! collapse must pass a series of legality checks configured through
//! [`DecimateOptions`].
//!
//! # Quadric Error Metrics (QEM)
//!
//! Each vertex accumulates a quadric: the sum of squared distances to the
//! planes of its original incident faces. The cost of collapsing `v0` into
//! `v1` is the combined quadric of both vertices evaluated at `v1`.
//!
//! # Example
//!
//! ```
//! use hemesh::prelude::*;
//! use hemesh::algo::decimate::{decimate, DecimateOptions};
//!
//! let mut mesh = shapes::icosahedron().unwrap();
//! let options = DecimateOptions::new(8).with_max_valence(8);
//! decimate(&mut mesh, &options).unwrap();
//!
//! assert!(mesh.num_vertices() < 12);
//! assert!(mesh.validate().is_ok());
//! ```
//!
//! # References
//!
//! - Garland, M. & Heckbert, P. (1997). "Surface Simplification Using Quadric
//!   Error Metrics." SIGGRAPH '97.
//! - Kobbelt, L., Campagna, S. & Seidel, H.-P. (1998). "A General Framework
//!   for Mesh Decimation." Graphics Interface '98.

mod qem;
mod quadric;

pub use qem::decimate;

use crate::algo::progress::Progress;
use crate::error::{MeshError, Result};

/// Options for mesh decimation.
///
/// A value of `0.0` (or `0` for [`max_valence`](Self::max_valence)) disables
/// the corresponding check.
#[derive(Debug, Clone)]
pub struct DecimateOptions {
    /// Number of vertices to stop at.
    pub target_vertices: usize,

    /// Upper bound for the triangle aspect ratio (longest edge squared over
    /// twice the area). A collapse may not push a triangle above it unless
    /// that triangle already was worse.
    pub aspect_ratio: f64,

    /// Maximum length of edges created by a collapse.
    pub edge_length: f64,

    /// Maximum valence of the surviving vertex.
    pub max_valence: usize,

    /// Maximum normal deviation in degrees, tracked with normal cones.
    /// When disabled, collapses are still refused if they flip a face.
    pub normal_deviation: f64,

    /// Maximum Hausdorff distance between the removed vertices and the
    /// simplified surface.
    pub hausdorff_error: f64,

    /// Texture coordinates closer than this are treated as equal when
    /// detecting seams on the `h:tex` property.
    pub seam_threshold: f64,

    /// Maximum deviation from a straight line in degrees for a seam vertex
    /// that is collapsed along the seam.
    pub seam_angle_deviation: f64,

    /// Honor `v:feature` / `e:feature` marks when present.
    pub preserve_features: bool,

    /// Progress callback and abort hook.
    pub progress: Progress,
}

impl Default for DecimateOptions {
    fn default() -> Self {
        Self {
            target_vertices: 0,
            aspect_ratio: 0.0,
            edge_length: 0.0,
            max_valence: 0,
            normal_deviation: 0.0,
            hausdorff_error: 0.0,
            seam_threshold: 1e-2,
            seam_angle_deviation: 1.0,
            preserve_features: true,
            progress: Progress::none(),
        }
    }
}

impl DecimateOptions {
    /// Create options to reduce to a target number of vertices.
    pub fn new(target_vertices: usize) -> Self {
        Self {
            target_vertices,
            ..Self::default()
        }
    }

    /// Set the target vertex count.
    pub fn with_target_vertices(mut self, target: usize) -> Self {
        self.target_vertices = target;
        self
    }

    /// Set the aspect ratio bound.
    pub fn with_aspect_ratio(mut self, aspect_ratio: f64) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    /// Set the maximum edge length.
    pub fn with_edge_length(mut self, edge_length: f64) -> Self {
        self.edge_length = edge_length;
        self
    }

    /// Set the maximum valence.
    pub fn with_max_valence(mut self, max_valence: usize) -> Self {
        self.max_valence = max_valence;
        self
    }

    /// Set the maximum normal deviation in degrees.
    pub fn with_normal_deviation(mut self, degrees: f64) -> Self {
        self.normal_deviation = degrees;
        self
    }

    /// Set the Hausdorff error bound.
    pub fn with_hausdorff_error(mut self, error: f64) -> Self {
        self.hausdorff_error = error;
        self
    }

    /// Set the texture seam thresholds.
    pub fn with_seams(mut self, threshold: f64, angle_deviation: f64) -> Self {
        self.seam_threshold = threshold;
        self.seam_angle_deviation = angle_deviation;
        self
    }

    /// Set whether feature marks constrain collapses.
    pub fn with_preserve_features(mut self, preserve: bool) -> Self {
        self.preserve_features = preserve;
        self
    }

    /// Set the progress reporter.
    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Check that all thresholds are usable.
    pub fn validate(&self) -> Result<()> {
        let non_negative = [
            ("aspect_ratio", self.aspect_ratio),
            ("edge_length", self.edge_length),
            ("normal_deviation", self.normal_deviation),
            ("hausdorff_error", self.hausdorff_error),
            ("seam_threshold", self.seam_threshold),
            ("seam_angle_deviation", self.seam_angle_deviation),
        ];
        for (name, value) in non_negative {
            if value.is_nan() || value < 0.0 {
                return Err(MeshError::invalid_param(name, value, "must be non-negative"));
            }
        }
        if self.normal_deviation > 180.0 {
            return Err(MeshError::invalid_param(
                "normal_deviation",
                self.normal_deviation,
                "must not exceed 180 degrees",
            ));
        }
        if self.seam_angle_deviation > 180.0 {
            return Err(MeshError::invalid_param(
                "seam_angle_deviation",
                self.seam_angle_deviation,
                "must not exceed 180 degrees",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_disable_thresholds() {
        let options = DecimateOptions::new(10);
        assert_eq!(options.target_vertices, 10);
        assert_eq!(options.aspect_ratio, 0.0);
        assert_eq!(options.max_valence, 0);
        assert!(options.preserve_features);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder_setters() {
        let options = DecimateOptions::default()
            .with_target_vertices(5)
            .with_aspect_ratio(10.0)
            .with_edge_length(0.5)
            .with_max_valence(8)
            .with_normal_deviation(30.0)
            .with_hausdorff_error(0.01)
            .with_seams(1e-3, 2.0)
            .with_preserve_features(false);
        assert_eq!(options.target_vertices, 5);
        assert_eq!(options.aspect_ratio, 10.0);
        assert_eq!(options.edge_length, 0.5);
        assert_eq!(options.max_valence, 8);
        assert_eq!(options.normal_deviation, 30.0);
        assert_eq!(options.hausdorff_error, 0.01);
        assert_eq!(options.seam_threshold, 1e-3);
        assert_eq!(options.seam_angle_deviation, 2.0);
        assert!(!options.preserve_features);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let err = DecimateOptions::new(0).with_edge_length(-1.0).validate().unwrap_err();
        assert!(err.is_precondition_error());
        assert!(DecimateOptions::new(0).with_hausdorff_error(f64::NAN).validate().is_err());
        assert!(DecimateOptions::new(0).with_normal_deviation(200.0).validate().is_err());
    }
}
