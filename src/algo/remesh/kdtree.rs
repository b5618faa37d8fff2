//! Kd-tree over the triangles of a mesh for closest-point queries.

use nalgebra::{Point3, Vector3};

use crate::mesh::{dist_point_triangle, FaceId, HalfEdgeMesh};

/// Result of a closest-point query.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NearestFace {
    /// Distance from the query point.
    pub(crate) dist: f64,
    /// Face holding the closest point.
    pub(crate) face: FaceId,
    /// Closest point on the surface.
    pub(crate) point: Point3<f64>,
}

enum Node {
    Leaf(Vec<usize>),
    Inner {
        axis: usize,
        split: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// Axis-aligned kd-tree storing triangles in the leaves. A triangle
/// straddling a split plane is stored on both sides.
pub(crate) struct TriangleKdTree {
    root: Node,
    faces: Vec<FaceId>,
    triangles: Vec<[Point3<f64>; 3]>,
}

impl TriangleKdTree {
    /// Build the tree, splitting nodes with more than `max_faces` triangles
    /// until `max_depth` is reached.
    pub(crate) fn new(mesh: &HalfEdgeMesh, max_faces: usize, max_depth: usize) -> Self {
        let faces: Vec<FaceId> = mesh.face_ids().collect();
        let triangles: Vec<[Point3<f64>; 3]> =
            faces.iter().map(|&f| mesh.face_positions(f)).collect();

        let mut tree = Self {
            root: Node::Leaf(Vec::new()),
            faces,
            triangles,
        };
        let all = (0..tree.triangles.len()).collect();
        tree.root = tree.build(all, max_faces, max_depth);
        tree
    }

    fn build(&self, items: Vec<usize>, max_faces: usize, depth: usize) -> Node {
        if depth == 0 || items.len() <= max_faces {
            return Node::Leaf(items);
        }

        let mut lo = Vector3::repeat(f64::INFINITY);
        let mut hi = Vector3::repeat(f64::NEG_INFINITY);
        for &i in &items {
            for p in &self.triangles[i] {
                lo = lo.inf(&p.coords);
                hi = hi.sup(&p.coords);
            }
        }

        // split the longest side in the middle
        let extent = hi - lo;
        let axis = extent.imax();
        let split = 0.5 * (lo[axis] + hi[axis]);

        let mut left = Vec::with_capacity(items.len() / 2);
        let mut right = Vec::with_capacity(items.len() / 2);
        for &i in &items {
            let tri = &self.triangles[i];
            if tri.iter().any(|p| p[axis] <= split) {
                left.push(i);
            }
            if tri.iter().any(|p| p[axis] > split) {
                right.push(i);
            }
        }

        // no separation possible
        if left.len() == items.len() || right.len() == items.len() {
            return Node::Leaf(items);
        }

        Node::Inner {
            axis,
            split,
            left: Box::new(self.build(left, max_faces, depth - 1)),
            right: Box::new(self.build(right, max_faces, depth - 1)),
        }
    }

    /// Closest point on the indexed triangles, `None` if there are none.
    pub(crate) fn nearest(&self, p: &Point3<f64>) -> Option<NearestFace> {
        let mut best = None;
        self.nearest_recurse(&self.root, p, &mut best);
        best
    }

    fn nearest_recurse(&self, node: &Node, p: &Point3<f64>, best: &mut Option<NearestFace>) {
        match node {
            Node::Leaf(items) => {
                for &i in items {
                    let [a, b, c] = &self.triangles[i];
                    let (dist, point) = dist_point_triangle(p, a, b, c);
                    if best.map_or(true, |nn| dist < nn.dist) {
                        *best = Some(NearestFace {
                            dist,
                            face: self.faces[i],
                            point,
                        });
                    }
                }
            }
            Node::Inner {
                axis,
                split,
                left,
                right,
            } => {
                let dist = p[*axis] - split;
                let (near, far) = if dist <= 0.0 {
                    (left, right)
                } else {
                    (right, left)
                };
                self.nearest_recurse(near, p, best);
                if best.map_or(true, |nn| dist.abs() < nn.dist) {
                    self.nearest_recurse(far, p, best);
                }
            }
        }
    }
}

/// Barycentric coordinates of `p` with respect to `(a, b, c)`.
///
/// Degenerate triangles yield the centroid weights.
pub(crate) fn barycentric_coordinates(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> Vector3<f64> {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(&v0);
    let d01 = v0.dot(&v1);
    let d11 = v1.dot(&v1);
    let d20 = v2.dot(&v0);
    let d21 = v2.dot(&v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() <= f64::EPSILON * d00 * d11 {
        return Vector3::repeat(1.0 / 3.0);
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    Vector3::new(1.0 - v - w, v, w)
}
