//! Mesh construction utilities.
//!
//! This module provides functions for building half-edge meshes from
//! face-vertex lists, and for flattening a mesh back into that form.
//! All construction goes through [`HalfEdgeMesh::add_face`], so the same
//! manifoldness checks apply.

use nalgebra::Point3;

use super::halfedge::HalfEdgeMesh;
use super::index::VertexId;
use crate::error::{MeshError, Result};

/// Build a half-edge mesh from vertices and triangle faces.
///
/// # Arguments
/// * `vertices` - List of vertex positions
/// * `faces` - List of triangle faces, each as [v0, v1, v2] indices
///
/// # Returns
/// A half-edge mesh, or an error if an index is out of range or a face
/// would break manifoldness.
///
/// # Example
/// ```
/// use hemesh::mesh::{build_from_triangles, HalfEdgeMesh};
/// use nalgebra::Point3;
///
/// let vertices = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.5, 1.0, 0.0),
/// ];
/// let faces = vec![[0, 1, 2]];
///
/// let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
/// assert_eq!(mesh.num_vertices(), 3);
/// assert_eq!(mesh.num_faces(), 1);
/// ```
pub fn build_from_triangles(vertices: &[Point3<f64>], faces: &[[usize; 3]]) -> Result<HalfEdgeMesh> {
    build(vertices, faces.iter().map(|f| &f[..]), faces.len())
}

/// Build a half-edge mesh from vertices and quad faces.
///
/// # Arguments
/// * `vertices` - List of vertex positions
/// * `faces` - List of quad faces, each as [v0, v1, v2, v3] indices (counter-clockwise)
pub fn build_from_quads(vertices: &[Point3<f64>], faces: &[[usize; 4]]) -> Result<HalfEdgeMesh> {
    build(vertices, faces.iter().map(|f| &f[..]), faces.len())
}

/// Build a half-edge mesh from vertices and arbitrary polygons.
pub fn build_from_polygons(vertices: &[Point3<f64>], faces: &[Vec<usize>]) -> Result<HalfEdgeMesh> {
    build(vertices, faces.iter().map(|f| &f[..]), faces.len())
}

fn build<'a>(
    vertices: &[Point3<f64>],
    faces: impl Iterator<Item = &'a [usize]> + Clone,
    num_faces: usize,
) -> Result<HalfEdgeMesh> {
    // Validate vertex indices before allocating anything
    for (fi, face) in faces.clone().enumerate() {
        if let Some(&vi) = face.iter().find(|&&vi| vi >= vertices.len()) {
            return Err(MeshError::InvalidVertexIndex { face: fi, vertex: vi });
        }
    }

    let mut mesh = HalfEdgeMesh::with_capacity(vertices.len(), num_faces);
    let ids: Vec<VertexId> = vertices.iter().map(|&p| mesh.add_vertex(p)).collect();

    let mut corners = Vec::new();
    for face in faces {
        corners.clear();
        corners.extend(face.iter().map(|&vi| ids[vi]));
        mesh.add_face(&corners)?;
    }

    log::debug!(
        "built mesh: {} vertices, {} edges, {} faces",
        mesh.num_vertices(),
        mesh.num_edges(),
        mesh.num_faces()
    );

    Ok(mesh)
}

/// Dense renumbering of live vertices: `Some(i)` for the i-th live vertex.
fn live_vertex_indices(mesh: &HalfEdgeMesh) -> Vec<Option<usize>> {
    let mut map = vec![None; mesh.vertices_size()];
    for (i, v) in mesh.vertex_ids().enumerate() {
        map[v.index()] = Some(i);
    }
    map
}

/// Convert a triangle mesh back to a face-vertex representation.
///
/// Deleted elements are skipped and vertex indices are renumbered densely.
/// Non-triangular faces are skipped; use [`to_face_vertex_polygons`] for
/// general meshes.
pub fn to_face_vertex(mesh: &HalfEdgeMesh) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let (vertices, polygons) = to_face_vertex_polygons(mesh);
    let faces = polygons
        .into_iter()
        .filter(|p| p.len() == 3)
        .map(|p| [p[0], p[1], p[2]])
        .collect();
    (vertices, faces)
}

/// Convert any polygon mesh to a face-vertex representation.
///
/// Returns (vertices, faces) where each face lists its corners in
/// counter-clockwise order.
pub fn to_face_vertex_polygons(mesh: &HalfEdgeMesh) -> (Vec<Point3<f64>>, Vec<Vec<usize>>) {
    let map = live_vertex_indices(mesh);
    let vertices: Vec<Point3<f64>> = mesh.vertex_ids().map(|v| *mesh.position(v)).collect();

    let faces = mesh
        .face_ids()
        .map(|f| {
            mesh.face_vertices(f)
                .filter_map(|v| map[v.index()])
                .collect()
        })
        .collect();

    (vertices, faces)
}
