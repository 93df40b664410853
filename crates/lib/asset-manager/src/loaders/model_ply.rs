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

//! ASCII PLY importer. Vertices are shared; faces are fan-triangulated.

use kyanite_assets::{
    AssetAny, AssetPayload, AssetType, Error, ModelVertex, RawLod, RawModel, RawSubmesh,
};

use crate::{
    loaders::{model_common, path_has_ext_ci},
    AssetManager, AssetModule, LoadInput,
};

pub struct PlyModule;

#[derive(Default)]
struct PlyHeader {
    ascii: bool,
    vertex_count: usize,
    face_count: usize,
    // Column index per recognized vertex property.
    x: Option<usize>,
    y: Option<usize>,
    z: Option<usize>,
    nx: Option<usize>,
    ny: Option<usize>,
    nz: Option<usize>,
    u: Option<usize>,
    v: Option<usize>,
    vertex_props: usize,
}

fn is_ci(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

fn parse_header<'a>(lines: &mut impl Iterator<Item = &'a str>) -> Result<PlyHeader, Error> {
    let first = lines
        .next()
        .ok_or_else(|| Error::decode("ply: empty file"))?;
    if !is_ci(first.trim(), "ply") {
        return Err(Error::decode("ply: missing signature"));
    }

    #[derive(PartialEq)]
    enum Element {
        None,
        Vertex,
        Face,
        Other,
    }

    let mut header = PlyHeader::default();
    let mut element = Element::None;

    for line in lines {
        let s = line.trim();
        if s.is_empty() || s.to_ascii_lowercase().starts_with("comment") {
            continue;
        }
        let mut tok = s.split_whitespace();
        let Some(key) = tok.next() else {
            continue;
        };

        if is_ci(key, "format") {
            let kind = tok.next().unwrap_or("");
            header.ascii = is_ci(kind, "ascii");
        } else if is_ci(key, "element") {
            let name = tok.next().unwrap_or("");
            let count: usize = tok.next().and_then(|c| c.parse().ok()).unwrap_or(0);
            element = if is_ci(name, "vertex") {
                header.vertex_count = count;
                Element::Vertex
            } else if is_ci(name, "face") {
                header.face_count = count;
                Element::Face
            } else {
                Element::Other
            };
        } else if is_ci(key, "property") {
            let ty = tok.next().unwrap_or("");
            if element == Element::Vertex && !is_ci(ty, "list") {
                let name = tok.next().unwrap_or("");
                let col = header.vertex_props;
                header.vertex_props += 1;
                if is_ci(name, "x") {
                    header.x = Some(col);
                } else if is_ci(name, "y") {
                    header.y = Some(col);
                } else if is_ci(name, "z") {
                    header.z = Some(col);
                } else if is_ci(name, "nx") {
                    header.nx = Some(col);
                } else if is_ci(name, "ny") {
                    header.ny = Some(col);
                } else if is_ci(name, "nz") {
                    header.nz = Some(col);
                } else if is_ci(name, "u") || is_ci(name, "s") || is_ci(name, "texture_u") {
                    header.u = Some(col);
                } else if is_ci(name, "v") || is_ci(name, "t") || is_ci(name, "texture_v") {
                    header.v = Some(col);
                }
            }
        } else if is_ci(key, "end_header") {
            if !header.ascii {
                return Err(Error::rejected("ply: only ascii format is supported"));
            }
            if header.x.is_none() || header.y.is_none() || header.z.is_none() {
                return Err(Error::decode("ply: vertex element lacks x/y/z"));
            }
            if header.vertex_count == 0 || header.face_count == 0 {
                return Err(Error::decode("ply: empty vertex or face element"));
            }
            return Ok(header);
        }
    }

    Err(Error::decode("ply: header never ended"))
}

fn parse_body<'a>(
    header: &PlyHeader,
    lines: &mut impl Iterator<Item = &'a str>,
) -> Result<RawLod, Error> {
    let col = |cols: &[f32], idx: Option<usize>| idx.and_then(|i| cols.get(i).copied()).unwrap_or(0.0);

    let mut vertices = Vec::with_capacity(header.vertex_count);
    while vertices.len() < header.vertex_count {
        let line = lines
            .next()
            .ok_or_else(|| Error::decode("ply: truncated vertex data"))?;
        let s = line.trim();
        if s.is_empty() {
            continue;
        }
        let cols: Vec<f32> = s.split_whitespace().filter_map(|t| t.parse().ok()).collect();
        if cols.len() < header.vertex_props {
            return Err(Error::decode("ply: short vertex row"));
        }

        vertices.push(ModelVertex {
            position: [
                col(&cols, header.x),
                col(&cols, header.y),
                col(&cols, header.z),
            ],
            normal: [
                col(&cols, header.nx),
                col(&cols, header.ny),
                col(&cols, header.nz),
            ],
            tangent: [0.0; 4],
            uv: [col(&cols, header.u), 1.0 - col(&cols, header.v)],
        });
    }

    let mut indices = Vec::new();
    let mut faces = 0usize;
    while faces < header.face_count {
        let line = lines
            .next()
            .ok_or_else(|| Error::decode("ply: truncated face data"))?;
        let s = line.trim();
        if s.is_empty() {
            continue;
        }
        faces += 1;

        let cols: Vec<usize> = s.split_whitespace().filter_map(|t| t.parse().ok()).collect();
        let Some(&count) = cols.first() else {
            return Err(Error::decode("ply: bad face row"));
        };
        if cols.len() < count + 1 || count < 3 {
            continue;
        }
        let face = &cols[1..count + 1];
        if face.iter().any(|&i| i >= vertices.len()) {
            return Err(Error::decode("ply: face index out of range"));
        }
        for i in 1..count - 1 {
            indices.extend_from_slice(&[face[0] as u32, face[i] as u32, face[i + 1] as u32]);
        }
    }

    if indices.is_empty() {
        return Err(Error::decode("ply: no triangles"));
    }

    Ok(RawLod { vertices, indices })
}

fn parse_ply(text: &str) -> Result<RawLod, Error> {
    let mut lines = text.lines();
    let header = parse_header(&mut lines)?;
    parse_body(&header, &mut lines)
}

impl AssetModule for PlyModule {
    fn asset_type(&self) -> AssetType {
        AssetType::Model
    }

    fn name(&self) -> &'static str {
        "model-ply"
    }

    fn can_load(&self, _am: &AssetManager, input: &LoadInput) -> bool {
        let Some(path) = input.path() else {
            return false;
        };
        if path_has_ext_ci(path, ".ply") {
            return true;
        }
        let mut head = [0u8; 16];
        let Ok(mut f) = std::fs::File::open(path) else {
            return false;
        };
        let n = std::io::Read::read(&mut f, &mut head).unwrap_or(0);
        String::from_utf8_lossy(&head[..n])
            .trim_start()
            .to_ascii_lowercase()
            .starts_with("ply")
    }

    fn load(&self, am: &AssetManager, input: &LoadInput) -> Result<AssetAny, Error> {
        let path = input
            .path()
            .ok_or_else(|| Error::rejected("ply: descriptors not supported"))?;
        let text = std::fs::read_to_string(path)?;
        let lod0 = parse_ply(&text)?;

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
    use crate::loaders::model_ply::parse_ply;

    const CUBE_FACE: &str = "\
ply
format ascii 1.0
comment a quad with normals and uvs
element vertex 4
property float x
property float y
property float z
property float nx
property float ny
property float nz
property float s
property float t
element face 2
property list uchar int vertex_indices
end_header
0 0 0 0 0 1 0 0
1 0 0 0 0 1 1 0
1 1 0 0 0 1 1 1
0 1 0 0 0 1 0 1
3 0 1 2
4 0 1 2 3
";

    #[test]
    fn parses_vertices_faces_and_flips_v() {
        let lod = parse_ply(CUBE_FACE).unwrap();
        assert_eq!(4, lod.vertices.len());
        // One triangle plus a fan-triangulated quad.
        assert_eq!(9, lod.indices.len());
        assert_eq!([0.0, 0.0, 1.0], lod.vertices[0].normal);
        assert_eq!([1.0, 1.0 - 1.0], lod.vertices[2].uv);
    }

    #[test]
    fn rejects_binary_format() {
        let text = "ply\nformat binary_little_endian 1.0\nelement vertex 1\nproperty float x\nproperty float y\nproperty float z\nelement face 1\nend_header\n";
        assert!(parse_ply(text).is_err());
    }

    #[test]
    fn rejects_missing_positions() {
        let text =
            "ply\nformat ascii 1.0\nelement vertex 1\nproperty float q\nelement face 1\nend_header\n";
        assert!(parse_ply(text).is_err());
    }

    #[test]
    fn rejects_out_of_range_faces() {
        let text = "\
ply
format ascii 1.0
element vertex 3
property float x
property float y
property float z
element face 1
property list uchar int vertex_indices
end_header
0 0 0
1 0 0
0 1 0
3 0 1 9
";
        assert!(parse_ply(text).is_err());
    }
}
