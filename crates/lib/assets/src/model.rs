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

use std::io::{self, Read, Write};

use bitflags::bitflags;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::Vec3;
use kyanite_backend::BufferId;
use kyanite_common::{Aabb, BinaryDeserialization, BinarySerialization, Handle};

/// Interleaved vertex shared by every mesh format.
///
/// Attribute locations: 0 position, 1 normal, 2 uv, 3 tangent + handedness.
/// UVs are stored with V already flipped (`1 - source_v`).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 4],
    pub uv: [f32; 2],
}

pub const MODEL_VERTEX_SIZE: usize = 48;

impl ModelVertex {
    pub fn from_position(position: [f32; 3]) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn pos(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }
}

impl BinarySerialization for ModelVertex {
    fn serialize(&self, w: &mut impl Write) -> io::Result<()> {
        for v in self
            .position
            .iter()
            .chain(self.normal.iter())
            .chain(self.tangent.iter())
            .chain(self.uv.iter())
        {
            w.write_f32::<LittleEndian>(*v)?;
        }

        Ok(())
    }
}

impl BinaryDeserialization for ModelVertex {
    fn deserialize(r: &mut impl Read) -> io::Result<Self> {
        let mut v = [0.0f32; 12];
        for x in v.iter_mut() {
            *x = r.read_f32::<LittleEndian>()?;
        }

        Ok(Self {
            position: [v[0], v[1], v[2]],
            normal: [v[3], v[4], v[5]],
            tangent: [v[6], v[7], v[8], v[9]],
            uv: [v[10], v[11]],
        })
    }
}

pub fn vertices_to_bytes(vertices: &[ModelVertex]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vertices.len() * MODEL_VERTEX_SIZE);
    for v in vertices {
        v.serialize(&mut out).expect("write to vec cannot fail");
    }
    out
}

pub fn vertices_from_bytes(data: &[u8]) -> Option<Vec<ModelVertex>> {
    if data.len() % MODEL_VERTEX_SIZE != 0 {
        return None;
    }
    let mut r = io::Cursor::new(data);
    let mut out = Vec::with_capacity(data.len() / MODEL_VERTEX_SIZE);
    for _ in 0..data.len() / MODEL_VERTEX_SIZE {
        out.push(ModelVertex::deserialize(&mut r).ok()?);
    }
    Some(out)
}

pub fn indices_to_bytes(indices: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(indices.len() * 4);
    for i in indices {
        out.write_u32::<LittleEndian>(*i)
            .expect("write to vec cannot fail");
    }
    out
}

pub fn indices_from_bytes(data: &[u8]) -> Option<Vec<u32>> {
    if data.len() % 4 != 0 {
        return None;
    }
    Some(
        data.chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect(),
    )
}

/// One decimation level of a submesh, CPU side.
#[derive(Debug, Clone, Default)]
pub struct RawLod {
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
}

impl RawLod {
    pub fn triangle_count(&self) -> u32 {
        (self.indices.len() / 3) as u32
    }
}

#[derive(Debug, Clone, Default)]
pub struct RawSubmesh {
    pub lods: Vec<RawLod>,
    pub material_name: Option<String>,
    pub material: Handle,
    pub aabb: Option<Aabb>,
}

impl RawSubmesh {
    pub fn from_lod0(lod0: RawLod) -> Self {
        Self {
            lods: vec![lod0],
            material_name: None,
            material: Handle::invalid(),
            aabb: None,
        }
    }

    pub fn compute_aabb(&self) -> Aabb {
        Aabb::from_points(
            self.lods
                .iter()
                .flat_map(|lod| lod.vertices.iter().map(|v| v.pos())),
        )
    }
}

/// Parsed model before GPU init.
#[derive(Debug, Clone)]
pub struct RawModel {
    pub submeshes: Vec<RawSubmesh>,
    pub mtllib_path: Option<String>,
    pub mtllib: Handle,
    pub lod_count: u8,
}

impl RawModel {
    pub fn new() -> Self {
        Self {
            submeshes: Vec::new(),
            mtllib_path: None,
            mtllib: Handle::invalid(),
            lod_count: 1,
        }
    }
}

impl Default for RawModel {
    fn default() -> Self {
        Self::new()
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MeshFlags: u8 {
        const LOD0_READY = 1 << 0;
        const LODS_READY = 1 << 1;
        const HAS_AABB = 1 << 2;
    }
}

/// One decimation level of a submesh, device side.
#[derive(Debug, Clone, Copy)]
pub struct MeshLod {
    pub vertex_buffer: BufferId,
    pub index_buffer: BufferId,
    pub vertex_count: u32,
    pub index_count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub lods: Vec<MeshLod>,
    pub material: Handle,
    pub local_aabb: Aabb,
    pub flags: MeshFlags,
}

#[derive(Debug, Clone, Default)]
pub struct ModelAsset {
    pub meshes: Vec<Mesh>,
}

impl ModelAsset {
    pub fn lod0_ready(&self) -> bool {
        !self.meshes.is_empty()
            && self
                .meshes
                .iter()
                .all(|m| m.flags.contains(MeshFlags::LOD0_READY))
    }

    pub fn all_lods_ready(&self) -> bool {
        !self.meshes.is_empty()
            && self
                .meshes
                .iter()
                .all(|m| m.flags.contains(MeshFlags::LODS_READY))
    }
}

#[cfg(test)]
mod test {
    use glam::Vec3;

    use crate::model::{
        indices_from_bytes, indices_to_bytes, vertices_from_bytes, vertices_to_bytes, ModelVertex,
        RawLod, RawSubmesh, MODEL_VERTEX_SIZE,
    };

    #[test]
    fn vertex_bytes_roundtrip() {
        let vertices = vec![
            ModelVertex {
                position: [1.0, 2.0, 3.0],
                normal: [0.0, 1.0, 0.0],
                tangent: [1.0, 0.0, 0.0, -1.0],
                uv: [0.25, 0.75],
            },
            ModelVertex::from_position([-1.0, 0.5, 0.0]),
        ];
        let bytes = vertices_to_bytes(&vertices);
        assert_eq!(vertices.len() * MODEL_VERTEX_SIZE, bytes.len());
        assert_eq!(vertices, vertices_from_bytes(&bytes).unwrap());
        assert!(vertices_from_bytes(&bytes[..bytes.len() - 1]).is_none());
    }

    #[test]
    fn index_bytes_roundtrip() {
        let indices = vec![0u32, 1, 2, 2, 3, 0];
        let bytes = indices_to_bytes(&indices);
        assert_eq!(indices, indices_from_bytes(&bytes).unwrap());
        assert!(indices_from_bytes(&bytes[1..]).is_none());
    }

    #[test]
    fn submesh_aabb_spans_all_lods() {
        let sm = RawSubmesh {
            lods: vec![
                RawLod {
                    vertices: vec![
                        ModelVertex::from_position([0.0, 0.0, 0.0]),
                        ModelVertex::from_position([1.0, 2.0, 3.0]),
                    ],
                    indices: vec![0, 1, 0],
                },
                RawLod {
                    vertices: vec![ModelVertex::from_position([-5.0, 0.0, 0.0])],
                    indices: vec![0, 0, 0],
                },
            ],
            ..Default::default()
        };
        let aabb = sm.compute_aabb();
        assert_eq!(Vec3::new(-5.0, 0.0, 0.0), aabb.min);
        assert_eq!(Vec3::new(1.0, 2.0, 3.0), aabb.max);
    }
}
