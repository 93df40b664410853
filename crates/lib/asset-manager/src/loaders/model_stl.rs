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

//! STL importer, binary and ASCII. Vertices are unrolled per facet; facet
//! normals come from the file when present and are recomputed when zero.

use glam::Vec3;
use kyanite_assets::{
    AssetAny, AssetPayload, AssetType, Error, ModelVertex, RawLod, RawModel, RawSubmesh,
};

use crate::{
    loaders::{model_common, path_has_ext_ci},
    AssetManager, AssetModule, LoadInput,
};

pub struct StlModule;

const BINARY_HEADER: usize = 80;
const BINARY_RECORD: usize = 50;

fn looks_binary(bytes: &[u8]) -> bool {
    if bytes.len() < BINARY_HEADER + 4 {
        return false;
    }
    let count =
        u32::from_le_bytes(bytes[BINARY_HEADER..BINARY_HEADER + 4].try_into().unwrap()) as usize;
    BINARY_HEADER + 4 + count * BINARY_RECORD == bytes.len()
}

fn looks_ascii(bytes: &[u8]) -> bool {
    String::from_utf8_lossy(&bytes[..bytes.len().min(64)])
        .trim_start()
        .to_ascii_lowercase()
        .starts_with("solid")
}

fn facet_normal(file_normal: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    if file_normal.length_squared() > 1e-12 {
        return file_normal.normalize();
    }
    let n = (b - a).cross(c - a);
    if n.length_squared() > 1e-20 {
        n.normalize()
    } else {
        Vec3::Z
    }
}

fn push_facet(lod: &mut RawLod, normal: Vec3, corners: [Vec3; 3]) {
    let normal = facet_normal(normal, corners[0], corners[1], corners[2]);
    let base = lod.vertices.len() as u32;
    for p in corners {
        lod.vertices.push(ModelVertex {
            position: p.to_array(),
            normal: normal.to_array(),
            tangent: [1.0, 0.0, 0.0, 1.0],
            uv: [0.0, 0.0],
        });
    }
    lod.indices.extend_from_slice(&[base, base + 1, base + 2]);
}

fn parse_binary(bytes: &[u8]) -> Result<RawLod, Error> {
    if bytes.len() < BINARY_HEADER + 4 {
        return Err(Error::corrupt("stl: truncated binary header"));
    }
    let count =
        u32::from_le_bytes(bytes[BINARY_HEADER..BINARY_HEADER + 4].try_into().unwrap()) as usize;
    let need = BINARY_HEADER + 4 + count * BINARY_RECORD;
    if count == 0 || bytes.len() < need {
        return Err(Error::corrupt("stl: triangle count does not match size"));
    }

    let f32_at = |off: usize| f32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
    let vec3_at = |off: usize| Vec3::new(f32_at(off), f32_at(off + 4), f32_at(off + 8));

    let mut lod = RawLod::default();
    for t in 0..count {
        let rec = BINARY_HEADER + 4 + t * BINARY_RECORD;
        push_facet(
            &mut lod,
            vec3_at(rec),
            [vec3_at(rec + 12), vec3_at(rec + 24), vec3_at(rec + 36)],
        );
    }

    Ok(lod)
}

fn read_vec3<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Option<Vec3> {
    let x: f32 = tokens.next()?.parse().ok()?;
    let y: f32 = tokens.next()?.parse().ok()?;
    let z: f32 = tokens.next()?.parse().ok()?;
    Some(Vec3::new(x, y, z))
}

fn parse_ascii(text: &str) -> Result<RawLod, Error> {
    let mut lod = RawLod::default();
    let mut tokens = text.split_whitespace();

    while let Some(tok) = tokens.next() {
        if !tok.eq_ignore_ascii_case("facet") {
            continue;
        }
        if !tokens
            .next()
            .map(|t| t.eq_ignore_ascii_case("normal"))
            .unwrap_or(false)
        {
            return Err(Error::decode("stl: facet without normal"));
        }
        let normal = read_vec3(&mut tokens).ok_or_else(|| Error::decode("stl: bad facet normal"))?;

        let mut corners = [Vec3::ZERO; 3];
        let mut corner = 0usize;
        while corner < 3 {
            match tokens.next() {
                Some(t) if t.eq_ignore_ascii_case("vertex") => {
                    corners[corner] =
                        read_vec3(&mut tokens).ok_or_else(|| Error::decode("stl: bad vertex"))?;
                    corner += 1;
                }
                Some(t) if t.eq_ignore_ascii_case("endfacet") => break,
                Some(_) => {}
                None => return Err(Error::decode("stl: truncated facet")),
            }
        }
        if corner == 3 {
            push_facet(&mut lod, normal, corners);
        }
    }

    if lod.indices.is_empty() {
        return Err(Error::decode("stl: no facets"));
    }

    Ok(lod)
}

fn parse_stl(bytes: &[u8]) -> Result<RawLod, Error> {
    if looks_binary(bytes) {
        parse_binary(bytes)
    } else if looks_ascii(bytes) {
        parse_ascii(&String::from_utf8_lossy(bytes))
    } else {
        Err(Error::rejected("stl: neither binary nor ascii"))
    }
}

impl AssetModule for StlModule {
    fn asset_type(&self) -> AssetType {
        AssetType::Model
    }

    fn name(&self) -> &'static str {
        "model-stl"
    }

    fn can_load(&self, _am: &AssetManager, input: &LoadInput) -> bool {
        let Some(path) = input.path() else {
            return false;
        };
        if path_has_ext_ci(path, ".stl") {
            return true;
        }
        std::fs::read(path)
            .map(|bytes| looks_binary(&bytes) || looks_ascii(&bytes))
            .unwrap_or(false)
    }

    fn load(&self, am: &AssetManager, input: &LoadInput) -> Result<AssetAny, Error> {
        let path = input
            .path()
            .ok_or_else(|| Error::rejected("stl: descriptors not supported"))?;
        let bytes = std::fs::read(path)?;
        let lod0 = parse_stl(&bytes)?;

        let mut raw = RawModel::new();
        raw.submeshes.push(RawSubmesh::from_lod0(lod0));
        model_common::finish_parsed_model(am, &mut raw);

        Ok(AssetAny::loading(AssetPayload::ModelRaw(raw)))
    }

    fn init(&self, am: &AssetManager, asset: &mut AssetAny) -> Result<(), Error> {
        model_common::model_init(am, asset)
    }

    fn cleanup(&self, am: &AssetManager, asset: &mut AssetAny) {
        model_common::model_cleanup(am, asset);
    }
}

#[cfg(test)]
mod test {
    use glam::Vec3;

    use crate::loaders::model_stl::{looks_ascii, looks_binary, parse_stl};

    fn binary_stl(tris: &[[Vec3; 3]]) -> Vec<u8> {
        let mut out = vec![0u8; 80];
        out.extend_from_slice(&(tris.len() as u32).to_le_bytes());
        for t in tris {
            for _ in 0..3 {
                out.extend_from_slice(&0f32.to_le_bytes());
            }
            for v in t {
                for c in [v.x, v.y, v.z] {
                    out.extend_from_slice(&c.to_le_bytes());
                }
            }
            out.extend_from_slice(&0u16.to_le_bytes());
        }
        out
    }

    #[test]
    fn binary_roundtrip_with_computed_normals() {
        let data = binary_stl(&[[Vec3::ZERO, Vec3::X, Vec3::Y]]);
        assert!(looks_binary(&data));
        let lod = parse_stl(&data).unwrap();
        assert_eq!(3, lod.vertices.len());
        assert_eq!(vec![0, 1, 2], lod.indices);
        assert_eq!([0.0, 0.0, 1.0], lod.vertices[0].normal);
        assert_eq!([1.0, 0.0, 0.0, 1.0], lod.vertices[0].tangent);
    }

    #[test]
    fn ascii_facets() {
        let text = b"\
solid tri
  facet normal 0 0 1
    outer loop
      vertex 0 0 0
      vertex 1 0 0
      vertex 0 1 0
    endloop
  endfacet
endsolid tri
";
        assert!(looks_ascii(text));
        let lod = parse_stl(text).unwrap();
        assert_eq!(3, lod.vertices.len());
        assert_eq!([0.0, 0.0, 1.0], lod.vertices[2].normal);
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let mut data = binary_stl(&[[Vec3::ZERO, Vec3::X, Vec3::Y]]);
        data.truncate(data.len() - 1);
        assert!(parse_stl(&data).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_stl(b"hello world").is_err());
    }
}
