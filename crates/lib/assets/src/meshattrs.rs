// Copyright (C) 2023 gigablaster

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Attribute synthesis shared by the mesh importers.

use glam::Vec3;

use crate::ModelVertex;

pub fn has_normals(vertices: &[ModelVertex]) -> bool {
    vertices
        .iter()
        .any(|v| Vec3::from_array(v.normal).length_squared() > 1e-12)
}

pub fn has_tangents(vertices: &[ModelVertex]) -> bool {
    vertices
        .iter()
        .any(|v| Vec3::new(v.tangent[0], v.tangent[1], v.tangent[2]).length_squared() > 1e-12)
}

/// Flat shading fallback: every vertex of a face gets the face normal.
/// Vertices shared between faces keep the last face's normal, which is what
/// flat-parsed formats (STL, 3MF) expect since they don't share vertices.
pub fn compute_flat_normals(vertices: &mut [ModelVertex], indices: &[u32]) {
    for tri in indices.chunks_exact(3) {
        let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if i0 >= vertices.len() || i1 >= vertices.len() || i2 >= vertices.len() {
            continue;
        }
        let p0 = vertices[i0].pos();
        let p1 = vertices[i1].pos();
        let p2 = vertices[i2].pos();
        let n = (p1 - p0).cross(p2 - p0);
        let n = if n.length_squared() > 1e-20 {
            n.normalize()
        } else {
            Vec3::Z
        };
        for i in [i0, i1, i2] {
            vertices[i].normal = n.to_array();
        }
    }
}

/// Averaged per-vertex tangents from position/UV/normal with a right-handed
/// correction sign in `w`.
pub fn generate_tangents(vertices: &mut [ModelVertex], indices: &[u32]) {
    if vertices.is_empty() || indices.len() < 3 {
        return;
    }

    let mut tan1 = vec![Vec3::ZERO; vertices.len()];
    let mut tan2 = vec![Vec3::ZERO; vertices.len()];

    for tri in indices.chunks_exact(3) {
        let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if i0 >= vertices.len() || i1 >= vertices.len() || i2 >= vertices.len() {
            continue;
        }

        let p0 = vertices[i0].pos();
        let p1 = vertices[i1].pos();
        let p2 = vertices[i2].pos();

        let [u0, v0] = vertices[i0].uv;
        let [u1, v1] = vertices[i1].uv;
        let [u2, v2] = vertices[i2].uv;

        let e1 = p1 - p0;
        let e2 = p2 - p0;
        let du1 = u1 - u0;
        let dv1 = v1 - v0;
        let du2 = u2 - u0;
        let dv2 = v2 - v0;

        let denom = du1 * dv2 - dv1 * du2;
        if denom.abs() < 1e-20 {
            continue;
        }
        let r = 1.0 / denom;

        let sdir = (e1 * dv2 - e2 * dv1) * r;
        let tdir = (e2 * du1 - e1 * du2) * r;

        for i in [i0, i1, i2] {
            tan1[i] += sdir;
            tan2[i] += tdir;
        }
    }

    for (i, vertex) in vertices.iter_mut().enumerate() {
        let n = Vec3::from_array(vertex.normal);
        let t = tan1[i];

        if n.length_squared() < 1e-20 || t.length_squared() < 1e-20 {
            vertex.tangent = [1.0, 0.0, 0.0, 1.0];
            continue;
        }

        let n = n.normalize();
        let ortho = t - n * n.dot(t);
        if ortho.length_squared() < 1e-20 {
            vertex.tangent = [1.0, 0.0, 0.0, 1.0];
            continue;
        }

        let tangent = ortho.normalize();
        let handed = if n.cross(tangent).dot(tan2[i]) < 0.0 {
            -1.0
        } else {
            1.0
        };
        vertex.tangent = [tangent.x, tangent.y, tangent.z, handed];
    }
}

/// Fills whatever a source format left out.
pub fn finalize_attributes(vertices: &mut [ModelVertex], indices: &[u32]) {
    if !has_normals(vertices) {
        compute_flat_normals(vertices, indices);
    }
    if !has_tangents(vertices) {
        generate_tangents(vertices, indices);
    }
}

#[cfg(test)]
mod test {
    use glam::Vec3;

    use crate::{
        meshattrs::{compute_flat_normals, finalize_attributes, generate_tangents, has_normals},
        ModelVertex,
    };

    fn quad() -> (Vec<ModelVertex>, Vec<u32>) {
        let mut vertices = vec![
            ModelVertex::from_position([0.0, 0.0, 0.0]),
            ModelVertex::from_position([1.0, 0.0, 0.0]),
            ModelVertex::from_position([1.0, 1.0, 0.0]),
            ModelVertex::from_position([0.0, 1.0, 0.0]),
        ];
        vertices[0].uv = [0.0, 0.0];
        vertices[1].uv = [1.0, 0.0];
        vertices[2].uv = [1.0, 1.0];
        vertices[3].uv = [0.0, 1.0];
        (vertices, vec![0, 1, 2, 0, 2, 3])
    }

    #[test]
    fn flat_normals_for_xy_quad() {
        let (mut vertices, indices) = quad();
        assert!(!has_normals(&vertices));
        compute_flat_normals(&mut vertices, &indices);
        for v in &vertices {
            assert_eq!([0.0, 0.0, 1.0], v.normal);
        }
    }

    #[test]
    fn tangents_follow_u_axis() {
        let (mut vertices, indices) = quad();
        compute_flat_normals(&mut vertices, &indices);
        generate_tangents(&mut vertices, &indices);
        for v in &vertices {
            let t = Vec3::new(v.tangent[0], v.tangent[1], v.tangent[2]);
            assert!((t - Vec3::X).length() < 1e-5, "tangent was {t:?}");
            assert_eq!(1.0, v.tangent[3]);
        }
    }

    #[test]
    fn degenerate_uvs_fall_back() {
        let mut vertices = vec![
            ModelVertex::from_position([0.0, 0.0, 0.0]),
            ModelVertex::from_position([1.0, 0.0, 0.0]),
            ModelVertex::from_position([0.0, 1.0, 0.0]),
        ];
        let indices = vec![0, 1, 2];
        finalize_attributes(&mut vertices, &indices);
        for v in &vertices {
            assert_eq!([1.0, 0.0, 0.0, 1.0], v.tangent);
        }
    }
}
