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

//! `.imesh` v2 mesh container.
//!
//! Little-endian. Fixed-size records: 40-byte header (one reserved word pads
//! the table offset to 8 bytes), 64-byte submesh records, 24-byte LOD
//! records. Vertex and index blobs are 16-byte aligned.

use std::io::{Cursor, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use kyanite_common::{Aabb, Align, BinaryDeserialization, BinarySerialization, Handle};

use crate::{indices_from_bytes, vertices_from_bytes, Error, RawLod, MODEL_VERTEX_SIZE};

pub const IMESH_MAGIC: [u8; 4] = *b"IMSH";
pub const IMESH_VERSION: u32 = 2;
pub const IMESH_HEADER_SIZE: u64 = 40;
pub const IMESH_SUBMESH_RECORD_SIZE: u64 = 64;
pub const IMESH_LOD_RECORD_SIZE: u64 = 24;

const SUBMESH_HAS_AABB: u32 = 1 << 0;
const BLOB_ALIGN: u64 = 16;

/// Decoded container contents, still CPU side.
#[derive(Debug)]
pub struct ImeshModel {
    pub model_handle: Handle,
    pub submeshes: Vec<ImeshSubmesh>,
}

#[derive(Debug)]
pub struct ImeshSubmesh {
    pub material_name: Option<String>,
    pub material_handle: Handle,
    pub aabb: Option<Aabb>,
    pub lods: Vec<RawLod>,
}

/// Flattened per-LOD data for the writer; byte blobs so the save path can
/// feed device readbacks straight through.
#[derive(Debug)]
pub struct ImeshLodBlob {
    pub vertex_data: Vec<u8>,
    pub index_data: Vec<u8>,
    pub vertex_count: u32,
    pub index_count: u32,
}

#[derive(Debug)]
pub struct ImeshSubmeshBlob {
    pub material_handle: Handle,
    pub aabb: Aabb,
    pub lods: Vec<ImeshLodBlob>,
}

pub fn encode(model_handle: Handle, submeshes: &[ImeshSubmeshBlob]) -> Result<Vec<u8>, Error> {
    if submeshes.is_empty() {
        return Err(Error::rejected("imesh: no submeshes"));
    }
    for sm in submeshes {
        if sm.lods.is_empty() {
            return Err(Error::rejected("imesh: submesh without lods"));
        }
        for lod in &sm.lods {
            if lod.vertex_count == 0 || lod.index_count == 0 || lod.index_count % 3 != 0 {
                return Err(Error::rejected("imesh: bad lod counts"));
            }
            if lod.vertex_data.len() != lod.vertex_count as usize * MODEL_VERTEX_SIZE
                || lod.index_data.len() != lod.index_count as usize * 4
            {
                return Err(Error::rejected("imesh: blob size mismatch"));
            }
        }
    }

    // Layout pass: submesh table right after the header, then the per-submesh
    // LOD tables, then aligned blobs.
    let table_offset = IMESH_HEADER_SIZE;
    let mut cursor = table_offset + submeshes.len() as u64 * IMESH_SUBMESH_RECORD_SIZE;

    let mut lod_table_offsets = Vec::with_capacity(submeshes.len());
    for sm in submeshes {
        lod_table_offsets.push(cursor);
        cursor += sm.lods.len() as u64 * IMESH_LOD_RECORD_SIZE;
    }

    cursor = cursor.align(BLOB_ALIGN);
    let mut blob_offsets = Vec::new();
    for sm in submeshes {
        for lod in &sm.lods {
            cursor = cursor.align(BLOB_ALIGN);
            let voff = cursor;
            cursor += lod.vertex_data.len() as u64;
            cursor = cursor.align(BLOB_ALIGN);
            let ioff = cursor;
            cursor += lod.index_data.len() as u64;
            blob_offsets.push((voff, ioff));
        }
    }

    let mut out = vec![0u8; cursor as usize];
    let mut w = Cursor::new(&mut out[..]);

    w.write_all(&IMESH_MAGIC)?;
    w.write_u32::<LittleEndian>(IMESH_VERSION)?;
    w.write_u32::<LittleEndian>(0)?; // flags
    w.write_u32::<LittleEndian>(submeshes.len() as u32)?;
    w.write_u32::<LittleEndian>(0)?; // reserved0
    model_handle.serialize(&mut w)?;
    w.write_u32::<LittleEndian>(0)?; // reserved1
    w.write_u64::<LittleEndian>(table_offset)?;
    debug_assert_eq!(IMESH_HEADER_SIZE, w.position());

    let mut blob_cursor = 0usize;
    for (si, sm) in submeshes.iter().enumerate() {
        w.seek(SeekFrom::Start(
            table_offset + si as u64 * IMESH_SUBMESH_RECORD_SIZE,
        ))?;
        w.write_u32::<LittleEndian>(SUBMESH_HAS_AABB)?;
        w.write_u32::<LittleEndian>(0)?; // material_name_len
        w.write_u64::<LittleEndian>(0)?; // material_name_offset
        sm.material_handle.serialize(&mut w)?;
        sm.aabb.serialize(&mut w)?;
        w.write_u32::<LittleEndian>(sm.lods.len() as u32)?;
        w.write_u32::<LittleEndian>(0)?; // reserved0
        w.write_u64::<LittleEndian>(lod_table_offsets[si])?;

        w.seek(SeekFrom::Start(lod_table_offsets[si]))?;
        for lod in &sm.lods {
            let (voff, ioff) = blob_offsets[blob_cursor];
            blob_cursor += 1;
            w.write_u32::<LittleEndian>(lod.vertex_count)?;
            w.write_u32::<LittleEndian>(lod.index_count)?;
            w.write_u64::<LittleEndian>(voff)?;
            w.write_u64::<LittleEndian>(ioff)?;

            let pos = w.position();
            w.seek(SeekFrom::Start(voff))?;
            w.write_all(&lod.vertex_data)?;
            w.seek(SeekFrom::Start(ioff))?;
            w.write_all(&lod.index_data)?;
            w.seek(SeekFrom::Start(pos))?;
        }
    }

    Ok(out)
}

fn region<'a>(data: &'a [u8], offset: u64, len: u64, what: &str) -> Result<&'a [u8], Error> {
    let end = offset
        .checked_add(len)
        .ok_or_else(|| Error::corrupt(format!("imesh: {what} overflows")))?;
    if offset >= data.len() as u64 || end > data.len() as u64 {
        return Err(Error::corrupt(format!("imesh: {what} exceeds file")));
    }
    Ok(&data[offset as usize..end as usize])
}

pub fn decode(data: &[u8]) -> Result<ImeshModel, Error> {
    if data.len() < IMESH_HEADER_SIZE as usize {
        return Err(Error::corrupt("imesh: file shorter than header"));
    }

    let mut r = Cursor::new(data);
    let mut magic = [0u8; 4];
    std::io::Read::read_exact(&mut r, &mut magic)?;
    if magic != IMESH_MAGIC {
        return Err(Error::corrupt("imesh: bad magic"));
    }
    if r.read_u32::<LittleEndian>()? != IMESH_VERSION {
        return Err(Error::corrupt("imesh: unsupported version"));
    }
    let _flags = r.read_u32::<LittleEndian>()?;
    let submesh_count = r.read_u32::<LittleEndian>()?;
    let _reserved0 = r.read_u32::<LittleEndian>()?;
    let model_handle = Handle::deserialize(&mut r)?;
    let _reserved1 = r.read_u32::<LittleEndian>()?;
    let table_offset = r.read_u64::<LittleEndian>()?;

    if submesh_count == 0 {
        return Err(Error::corrupt("imesh: no submeshes"));
    }
    region(
        data,
        table_offset,
        submesh_count as u64 * IMESH_SUBMESH_RECORD_SIZE,
        "submesh table",
    )?;

    let mut submeshes = Vec::with_capacity(submesh_count as usize);

    for si in 0..submesh_count as u64 {
        r.seek(SeekFrom::Start(table_offset + si * IMESH_SUBMESH_RECORD_SIZE))?;
        let flags = r.read_u32::<LittleEndian>()?;
        let material_name_len = r.read_u32::<LittleEndian>()?;
        let material_name_offset = r.read_u64::<LittleEndian>()?;
        let material_handle = Handle::deserialize(&mut r)?;
        let aabb = Aabb::deserialize(&mut r)?;
        let lod_count = r.read_u32::<LittleEndian>()?;
        let _reserved = r.read_u32::<LittleEndian>()?;
        let lods_offset = r.read_u64::<LittleEndian>()?;

        if lod_count == 0 {
            return Err(Error::corrupt("imesh: submesh without lods"));
        }
        region(
            data,
            lods_offset,
            lod_count as u64 * IMESH_LOD_RECORD_SIZE,
            "lod table",
        )?;

        let material_name = if material_name_len > 0 {
            let bytes = region(data, material_name_offset, material_name_len as u64, "material name")?;
            Some(
                std::str::from_utf8(bytes)
                    .map_err(|_| Error::corrupt("imesh: material name is not utf-8"))?
                    .to_owned(),
            )
        } else {
            None
        };

        let mut lods = Vec::with_capacity(lod_count as usize);
        for li in 0..lod_count as u64 {
            r.seek(SeekFrom::Start(lods_offset + li * IMESH_LOD_RECORD_SIZE))?;
            let vertex_count = r.read_u32::<LittleEndian>()?;
            let index_count = r.read_u32::<LittleEndian>()?;
            let vertices_offset = r.read_u64::<LittleEndian>()?;
            let indices_offset = r.read_u64::<LittleEndian>()?;

            if vertex_count == 0 || index_count == 0 || index_count % 3 != 0 {
                return Err(Error::corrupt("imesh: bad lod counts"));
            }

            let vbytes = region(
                data,
                vertices_offset,
                vertex_count as u64 * MODEL_VERTEX_SIZE as u64,
                "vertex blob",
            )?;
            let ibytes = region(data, indices_offset, index_count as u64 * 4, "index blob")?;

            lods.push(RawLod {
                vertices: vertices_from_bytes(vbytes)
                    .ok_or_else(|| Error::corrupt("imesh: vertex blob size"))?,
                indices: indices_from_bytes(ibytes)
                    .ok_or_else(|| Error::corrupt("imesh: index blob size"))?,
            });
        }

        submeshes.push(ImeshSubmesh {
            material_name,
            material_handle,
            aabb: (flags & SUBMESH_HAS_AABB != 0).then_some(aabb),
            lods,
        });
    }

    Ok(ImeshModel {
        model_handle,
        submeshes,
    })
}

#[cfg(test)]
mod test {
    use glam::Vec3;
    use kyanite_common::{Aabb, Handle};

    use crate::{
        imesh::{decode, encode, ImeshLodBlob, ImeshSubmeshBlob, IMESH_HEADER_SIZE},
        indices_to_bytes, vertices_to_bytes, ModelVertex, RawLod, RawSubmesh,
    };

    fn triangle_lod(offset: f32) -> RawLod {
        RawLod {
            vertices: vec![
                ModelVertex::from_position([offset, 0.0, 0.0]),
                ModelVertex::from_position([offset + 1.0, 0.0, 0.0]),
                ModelVertex::from_position([offset, 1.0, 0.0]),
            ],
            indices: vec![0, 1, 2],
        }
    }

    fn blob_from_lod(lod: &RawLod) -> ImeshLodBlob {
        ImeshLodBlob {
            vertex_data: vertices_to_bytes(&lod.vertices),
            index_data: indices_to_bytes(&lod.indices),
            vertex_count: lod.vertices.len() as u32,
            index_count: lod.indices.len() as u32,
        }
    }

    #[test]
    fn roundtrip_preserves_everything() {
        let submeshes: Vec<RawSubmesh> = (0..2)
            .map(|i| {
                let mut sm = RawSubmesh::from_lod0(triangle_lod(i as f32));
                sm.lods.push(triangle_lod(i as f32 + 10.0));
                sm
            })
            .collect();

        let handle = Handle::new(1, 2, 1);
        let blobs: Vec<ImeshSubmeshBlob> = submeshes
            .iter()
            .map(|sm| ImeshSubmeshBlob {
                material_handle: Handle::new(1, 7, 1),
                aabb: sm.compute_aabb(),
                lods: sm.lods.iter().map(blob_from_lod).collect(),
            })
            .collect();

        let data = encode(handle, &blobs).unwrap();
        assert_eq!(&data[..4], b"IMSH");

        let parsed = decode(&data).unwrap();
        assert_eq!(handle, parsed.model_handle);
        assert_eq!(submeshes.len(), parsed.submeshes.len());
        for (src, dst) in submeshes.iter().zip(parsed.submeshes.iter()) {
            assert_eq!(src.lods.len(), dst.lods.len());
            assert_eq!(Some(src.compute_aabb()), dst.aabb);
            assert_eq!(Handle::new(1, 7, 1), dst.material_handle);
            for (a, b) in src.lods.iter().zip(dst.lods.iter()) {
                assert_eq!(a.vertices, b.vertices);
                assert_eq!(a.indices, b.indices);
            }
        }
    }

    #[test]
    fn blobs_are_aligned() {
        let sm = RawSubmesh::from_lod0(triangle_lod(0.0));
        let data = encode(
            Handle::new(1, 1, 1),
            &[ImeshSubmeshBlob {
                material_handle: Handle::invalid(),
                aabb: Aabb::zero(),
                lods: sm.lods.iter().map(blob_from_lod).collect(),
            }],
        )
        .unwrap();

        // First LOD record sits right after the submesh table.
        let lod_table = IMESH_HEADER_SIZE as usize + 64;
        let voff = u64::from_le_bytes(data[lod_table + 8..lod_table + 16].try_into().unwrap());
        let ioff = u64::from_le_bytes(data[lod_table + 16..lod_table + 24].try_into().unwrap());
        assert_eq!(0, voff % 16);
        assert_eq!(0, ioff % 16);
        assert!(voff >= (lod_table + 24) as u64);
    }

    #[test]
    fn aabb_values_survive() {
        let mut lod = triangle_lod(0.0);
        lod.vertices[1].position = [4.0, -2.0, 9.0];
        let aabb = Aabb {
            min: Vec3::new(-1.0, -2.0, 0.0),
            max: Vec3::new(4.0, 1.0, 9.0),
        };
        let data = encode(
            Handle::new(1, 1, 1),
            &[ImeshSubmeshBlob {
                material_handle: Handle::invalid(),
                aabb,
                lods: vec![blob_from_lod(&lod)],
            }],
        )
        .unwrap();
        assert_eq!(Some(aabb), decode(&data).unwrap().submeshes[0].aabb);
    }

    #[test]
    fn rejects_corrupt_offsets() {
        let sm = RawSubmesh::from_lod0(triangle_lod(0.0));
        let mut data = encode(
            Handle::new(1, 1, 1),
            &[ImeshSubmeshBlob {
                material_handle: Handle::invalid(),
                aabb: Aabb::zero(),
                lods: sm.lods.iter().map(blob_from_lod).collect(),
            }],
        )
        .unwrap();

        // Submesh table offset pointing at the last byte.
        let bad = (data.len() - 1) as u64;
        data[32..40].copy_from_slice(&bad.to_le_bytes());
        assert!(decode(&data).is_err());
    }

    #[test]
    fn rejects_bad_header_and_counts() {
        let sm = RawSubmesh::from_lod0(triangle_lod(0.0));
        let blobs = [ImeshSubmeshBlob {
            material_handle: Handle::invalid(),
            aabb: Aabb::zero(),
            lods: sm.lods.iter().map(blob_from_lod).collect(),
        }];
        let good = encode(Handle::new(1, 1, 1), &blobs).unwrap();

        let mut bad_magic = good.clone();
        bad_magic[0] = b'X';
        assert!(decode(&bad_magic).is_err());

        let mut bad_version = good.clone();
        bad_version[4] = 3;
        assert!(decode(&bad_version).is_err());

        // Index count not divisible by 3 in the first LOD record.
        let mut bad_counts = good.clone();
        let lod_table = IMESH_HEADER_SIZE as usize + 64;
        bad_counts[lod_table + 4..lod_table + 8].copy_from_slice(&4u32.to_le_bytes());
        assert!(decode(&bad_counts).is_err());

        assert!(decode(&good[..IMESH_HEADER_SIZE as usize - 1]).is_err());
    }

    #[test]
    fn writer_rejects_bad_input() {
        assert!(encode(Handle::new(1, 1, 1), &[]).is_err());
        assert!(encode(
            Handle::new(1, 1, 1),
            &[ImeshSubmeshBlob {
                material_handle: Handle::invalid(),
                aabb: Aabb::zero(),
                lods: vec![ImeshLodBlob {
                    vertex_data: vec![0; 48],
                    index_data: vec![0; 16],
                    vertex_count: 1,
                    index_count: 4,
                }],
            }]
        )
        .is_err());
    }
}
