//! Procedural test shapes.
//!
//! Platonic solids are centered at the origin with vertices on the unit
//! sphere. Faces are oriented counter-clockwise seen from outside.

use std::collections::HashMap;

use nalgebra::Point3;

use super::halfedge::HalfEdgeMesh;
use super::index::VertexId;
use crate::error::{MeshError, Result};

fn from_faces(points: &[Point3<f64>], faces: &[&[usize]]) -> Result<HalfEdgeMesh> {
    let mut mesh = HalfEdgeMesh::with_capacity(points.len(), faces.len());
    let ids: Vec<VertexId> = points.iter().map(|&p| mesh.add_vertex(p)).collect();
    let mut corners = Vec::with_capacity(4);
    for face in faces {
        corners.clear();
        corners.extend(face.iter().map(|&i| ids[i]));
        mesh.add_face(&corners)?;
    }
    Ok(mesh)
}

fn project_to_unit_sphere(points: &mut [Point3<f64>]) {
    for p in points {
        *p = Point3::from(p.coords.normalize());
    }
}

/// Regular tetrahedron.
pub fn tetrahedron() -> Result<HalfEdgeMesh> {
    let a = 1.0 / 3.0;
    let b = (8.0_f64 / 9.0).sqrt();
    let c = (2.0_f64 / 9.0).sqrt();
    let d = (2.0_f64 / 3.0).sqrt();

    let points = [
        Point3::new(0.0, 0.0, 1.0),
        Point3::new(-c, d, -a),
        Point3::new(-c, -d, -a),
        Point3::new(b, 0.0, -a),
    ];
    from_faces(&points, &[&[0, 1, 2], &[0, 2, 3], &[0, 3, 1], &[3, 2, 1]])
}

/// Cube made of six quads.
pub fn hexahedron() -> Result<HalfEdgeMesh> {
    let a = 1.0 / 3.0_f64.sqrt();
    let points = [
        Point3::new(-a, -a, -a),
        Point3::new(a, -a, -a),
        Point3::new(a, a, -a),
        Point3::new(-a, a, -a),
        Point3::new(-a, -a, a),
        Point3::new(a, -a, a),
        Point3::new(a, a, a),
        Point3::new(-a, a, a),
    ];
    from_faces(
        &points,
        &[
            &[3, 2, 1, 0],
            &[2, 6, 5, 1],
            &[5, 6, 7, 4],
            &[0, 4, 7, 3],
            &[3, 7, 6, 2],
            &[1, 5, 4, 0],
        ],
    )
}

/// Regular octahedron with vertices on the coordinate axes.
pub fn octahedron() -> Result<HalfEdgeMesh> {
    let points = [
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(-1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(0.0, -1.0, 0.0),
        Point3::new(0.0, 0.0, 1.0),
        Point3::new(0.0, 0.0, -1.0),
    ];
    from_faces(
        &points,
        &[
            &[0, 2, 4],
            &[2, 1, 4],
            &[1, 3, 4],
            &[3, 0, 4],
            &[2, 0, 5],
            &[1, 2, 5],
            &[3, 1, 5],
            &[0, 3, 5],
        ],
    )
}

/// Regular icosahedron: 12 vertices of valence 5, 30 edges, 20 faces.
pub fn icosahedron() -> Result<HalfEdgeMesh> {
    let phi = (1.0 + 5.0_f64.sqrt()) * 0.5;
    let a = 1.0;
    let b = 1.0 / phi;

    let mut points = [
        Point3::new(0.0, b, -a),
        Point3::new(b, a, 0.0),
        Point3::new(-b, a, 0.0),
        Point3::new(0.0, b, a),
        Point3::new(0.0, -b, a),
        Point3::new(-a, 0.0, b),
        Point3::new(0.0, -b, -a),
        Point3::new(a, 0.0, -b),
        Point3::new(a, 0.0, b),
        Point3::new(-a, 0.0, -b),
        Point3::new(b, -a, 0.0),
        Point3::new(-b, -a, 0.0),
    ];
    project_to_unit_sphere(&mut points);

    from_faces(
        &points,
        &[
            &[2, 1, 0],
            &[1, 2, 3],
            &[5, 4, 3],
            &[4, 8, 3],
            &[7, 6, 0],
            &[6, 9, 0],
            &[11, 10, 4],
            &[10, 11, 6],
            &[9, 5, 2],
            &[5, 9, 11],
            &[8, 7, 1],
            &[7, 8, 10],
            &[2, 5, 3],
            &[8, 1, 3],
            &[9, 2, 0],
            &[1, 7, 0],
            &[11, 9, 6],
            &[7, 10, 6],
            &[5, 11, 4],
            &[10, 8, 4],
        ],
    )
}

/// Unit sphere approximated by an icosahedron whose triangles are split
/// into four `subdivisions` times, with new vertices pushed onto the sphere.
pub fn icosphere(subdivisions: usize) -> Result<HalfEdgeMesh> {
    let base = icosahedron()?;
    let mut points: Vec<Point3<f64>> = base.points().to_vec();
    let mut faces: Vec<[usize; 3]> = base
        .face_ids()
        .map(|f| base.face_triangle(f).map(|v| v.index()))
        .collect();

    for _ in 0..subdivisions {
        let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
        let mut refined = Vec::with_capacity(faces.len() * 4);

        for face in &faces {
            let mut mids = [0usize; 3];
            for i in 0..3 {
                let (a, b) = (face[i], face[(i + 1) % 3]);
                let key = (a.min(b), a.max(b));
                mids[i] = *midpoints.entry(key).or_insert_with(|| {
                    let mid = (points[a].coords + points[b].coords) * 0.5;
                    points.push(Point3::from(mid.normalize()));
                    points.len() - 1
                });
            }

            refined.push([face[0], mids[0], mids[2]]);
            refined.push([face[1], mids[1], mids[0]]);
            refined.push([face[2], mids[2], mids[1]]);
            refined.push(mids);
        }
        faces = refined;
    }

    let faces: Vec<&[usize]> = faces.iter().map(|f| &f[..]).collect();
    from_faces(&points, &faces)
}

/// Unit square `[0, 1]²` in the `z = 0` plane, split into
/// `resolution × resolution` quads.
///
/// Vertex `j + i * (resolution + 1)` sits at `(i, j) / resolution`.
pub fn plane(resolution: usize) -> Result<HalfEdgeMesh> {
    let points = grid_points(resolution)?;
    let n = resolution + 1;
    let mut faces: Vec<[usize; 4]> = Vec::with_capacity(resolution * resolution);
    for i in 0..resolution {
        for j in 0..resolution {
            let v0 = j + i * n;
            faces.push([v0, v0 + n, v0 + n + 1, v0 + 1]);
        }
    }
    let faces: Vec<&[usize]> = faces.iter().map(|f| &f[..]).collect();
    from_faces(&points, &faces)
}

/// Same grid as [`plane`], with every quad cut along its `(i, j)`–`(i+1, j+1)`
/// diagonal into two triangles.
pub fn triangle_plane(resolution: usize) -> Result<HalfEdgeMesh> {
    let points = grid_points(resolution)?;
    let n = resolution + 1;
    let mut faces: Vec<[usize; 3]> = Vec::with_capacity(2 * resolution * resolution);
    for i in 0..resolution {
        for j in 0..resolution {
            let v0 = j + i * n;
            faces.push([v0, v0 + n, v0 + n + 1]);
            faces.push([v0, v0 + n + 1, v0 + 1]);
        }
    }
    let faces: Vec<&[usize]> = faces.iter().map(|f| &f[..]).collect();
    from_faces(&points, &faces)
}

/// Flat parallelogram patch of equilateral triangles with the given edge
/// length, `resolution` triangles along each side.
///
/// Every edge has exactly `edge_length`.
pub fn triangle_lattice(resolution: usize, edge_length: f64) -> Result<HalfEdgeMesh> {
    if resolution == 0 {
        return Err(MeshError::invalid_param("resolution", resolution, "must be at least 1"));
    }
    if edge_length.is_nan() || edge_length <= 0.0 {
        return Err(MeshError::invalid_param("edge_length", edge_length, "must be positive"));
    }

    let n = resolution + 1;
    let h = edge_length * 3.0_f64.sqrt() * 0.5;
    let mut points = Vec::with_capacity(n * n);
    for j in 0..n {
        for i in 0..n {
            let x = (i as f64 + 0.5 * j as f64) * edge_length;
            points.push(Point3::new(x, j as f64 * h, 0.0));
        }
    }

    let mut faces: Vec<[usize; 3]> = Vec::with_capacity(2 * resolution * resolution);
    for j in 0..resolution {
        for i in 0..resolution {
            let v = i + j * n;
            faces.push([v, v + 1, v + n]);
            faces.push([v + 1, v + n + 1, v + n]);
        }
    }
    let faces: Vec<&[usize]> = faces.iter().map(|f| &f[..]).collect();
    from_faces(&points, &faces)
}

fn grid_points(resolution: usize) -> Result<Vec<Point3<f64>>> {
    if resolution == 0 {
        return Err(MeshError::invalid_param("resolution", resolution, "must be at least 1"));
    }
    let n = resolution + 1;
    let step = resolution as f64;
    let mut points = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            points.push(Point3::new(i as f64 / step, j as f64 / step, 0.0));
        }
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn euler_characteristic(mesh: &HalfEdgeMesh) -> i64 {
        mesh.num_vertices() as i64 - mesh.num_edges() as i64 + mesh.num_faces() as i64
    }

    fn assert_closed_and_outward(mesh: &HalfEdgeMesh) {
        mesh.validate().unwrap();
        assert_eq!(euler_characteristic(mesh), 2);
        for v in mesh.vertex_ids() {
            assert!(!mesh.is_boundary_vertex(v));
            assert!((mesh.position(v).coords.norm() - 1.0).abs() < 1e-12);
        }
        for f in mesh.face_ids() {
            let c = mesh.face_centroid(f);
            assert!(mesh.face_normal(f).dot(&c.coords) > 0.0, "{f:?} points inward");
        }
    }

    #[test]
    fn test_platonic_counts() {
        let cases = [
            (tetrahedron().unwrap(), 4, 6, 4),
            (hexahedron().unwrap(), 8, 12, 6),
            (octahedron().unwrap(), 6, 12, 8),
            (icosahedron().unwrap(), 12, 30, 20),
        ];
        for (mesh, nv, ne, nf) in &cases {
            assert_eq!(mesh.num_vertices(), *nv);
            assert_eq!(mesh.num_edges(), *ne);
            assert_eq!(mesh.num_faces(), *nf);
            assert_closed_and_outward(mesh);
        }
    }

    #[test]
    fn test_icosahedron_valence() {
        let mesh = icosahedron().unwrap();
        assert!(mesh.is_triangle_mesh());
        assert!(mesh.vertex_ids().all(|v| mesh.valence(v) == 5));
    }

    #[test]
    fn test_icosphere_counts() {
        let mesh = icosphere(2).unwrap();
        assert_eq!(mesh.num_faces(), 20 * 16);
        assert_eq!(mesh.num_vertices(), 162);
        assert_closed_and_outward(&mesh);
        assert_eq!(icosphere(0).unwrap().num_vertices(), 12);
    }

    #[test]
    fn test_plane_layout() {
        let mesh = plane(3).unwrap();
        assert_eq!(mesh.num_vertices(), 16);
        assert_eq!(mesh.num_faces(), 9);
        assert_eq!(mesh.num_edges(), 24);
        assert!(mesh.is_quad_mesh());
        assert_eq!(euler_characteristic(&mesh), 1);

        let p = mesh.position(VertexId::new(1 + 2 * 4));
        assert!((p.x - 2.0 / 3.0).abs() < 1e-12);
        assert!((p.y - 1.0 / 3.0).abs() < 1e-12);
        for f in mesh.face_ids() {
            assert!(mesh.face_normal(f).z > 0.99);
        }
    }

    #[test]
    fn test_triangle_plane() {
        let mesh = triangle_plane(2).unwrap();
        assert_eq!(mesh.num_vertices(), 9);
        assert_eq!(mesh.num_faces(), 8);
        assert!(mesh.is_triangle_mesh());
        mesh.validate().unwrap();
        // center vertex sees six triangles
        assert_eq!(mesh.valence(VertexId::new(4)), 6);
    }

    #[test]
    fn test_triangle_lattice_edges_uniform() {
        let mesh = triangle_lattice(4, 0.5).unwrap();
        assert_eq!(mesh.num_vertices(), 25);
        assert_eq!(mesh.num_faces(), 32);
        mesh.validate().unwrap();
        for e in mesh.edge_ids() {
            assert!((mesh.edge_length(e.halfedge(0)) - 0.5).abs() < 1e-12);
        }
        for f in mesh.face_ids() {
            assert!(mesh.face_normal(f).z > 0.99);
        }
    }

    #[test]
    fn test_zero_resolution_rejected() {
        assert!(plane(0).unwrap_err().is_precondition_error());
        assert!(triangle_plane(0).is_err());
        assert!(triangle_lattice(0, 1.0).is_err());
        assert!(triangle_lattice(2, 0.0).is_err());
    }
}
