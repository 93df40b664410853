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

//! Wavefront OBJ importer. Faces are fan-triangulated into unshared
//! vertices; `usemtl` splits submeshes and the sibling `.mtl` library is
//! resolved at init time, where materials may be submitted to the manager.

use kyanite_assets::{
    AssetAny, AssetPayload, AssetType, Error, MaterialAsset, ModelVertex, RawLod, RawModel,
    RawSubmesh,
};
use kyanite_common::Handle;
use log::warn;

use crate::{
    loaders::{model_common, path_dirname, path_has_ext_ci, path_join},
    AssetManager, AssetModule, LoadInput,
};

pub struct ObjModule;

#[derive(Default)]
struct ObjParse {
    positions: Vec<[f32; 3]>,
    texcoords: Vec<[f32; 2]>,
    normals: Vec<[f32; 3]>,
    submeshes: Vec<RawSubmesh>,
    vertices: Vec<ModelVertex>,
    indices: Vec<u32>,
    material_name: Option<String>,
    mtllib: Option<String>,
}

impl ObjParse {
    fn flush_submesh(&mut self) {
        if self.indices.is_empty() {
            self.material_name = None;
            return;
        }
        let mut sm = RawSubmesh::from_lod0(RawLod {
            vertices: std::mem::take(&mut self.vertices),
            indices: std::mem::take(&mut self.indices),
        });
        sm.material_name = self.material_name.take();
        self.submeshes.push(sm);
    }
}

/// `v`, `v/vt`, `v//vn` and `v/vt/vn` references, possibly negative.
fn parse_face_ref(token: &str) -> Option<(i64, i64, i64)> {
    let mut parts = token.split('/');
    let vi: i64 = parts.next()?.parse().ok()?;
    let vti = match parts.next() {
        Some("") | None => 0,
        Some(s) => s.parse().ok()?,
    };
    let vni = match parts.next() {
        Some("") | None => 0,
        Some(s) => s.parse().ok()?,
    };
    Some((vi, vti, vni))
}

fn fix_index(idx: i64, count: usize) -> usize {
    if idx > 0 {
        (idx - 1) as usize
    } else if idx < 0 {
        (count as i64 + idx).max(0) as usize
    } else {
        0
    }
}

fn fetch<T: Copy + Default>(data: &[T], idx: usize) -> T {
    data.get(idx).copied().unwrap_or_default()
}

fn corner_vertex(p: &ObjParse, r: (i64, i64, i64)) -> ModelVertex {
    let position = fetch(&p.positions, fix_index(r.0, p.positions.len()));
    let uv = if r.1 != 0 {
        let t = fetch(&p.texcoords, fix_index(r.1, p.texcoords.len()));
        [t[0], 1.0 - t[1]]
    } else {
        [0.0, 0.0]
    };
    let normal = if r.2 != 0 {
        fetch(&p.normals, fix_index(r.2, p.normals.len()))
    } else {
        [0.0, 0.0, 0.0]
    };

    ModelVertex {
        position,
        normal,
        tangent: [0.0; 4],
        uv,
    }
}

fn parse_floats<const N: usize>(rest: &str) -> Option<[f32; N]> {
    let mut out = [0.0f32; N];
    let mut it = rest.split_whitespace();
    for v in out.iter_mut() {
        *v = it.next()?.parse().ok()?;
    }
    Some(out)
}

fn parse_obj(text: &str) -> ObjParse {
    let mut p = ObjParse::default();

    for line in text.lines() {
        let s = line.trim_start();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }

        if let Some(rest) = s.strip_prefix("v ") {
            if let Some(v) = parse_floats::<3>(rest) {
                p.positions.push(v);
            }
        } else if let Some(rest) = s.strip_prefix("vt ") {
            if let Some(v) = parse_floats::<2>(rest) {
                p.texcoords.push(v);
            }
        } else if let Some(rest) = s.strip_prefix("vn ") {
            if let Some(v) = parse_floats::<3>(rest) {
                p.normals.push(v);
            }
        } else if let Some(rest) = s.strip_prefix("mtllib ") {
            p.mtllib = Some(rest.trim().to_owned());
        } else if let Some(rest) = s.strip_prefix("usemtl ") {
            p.flush_submesh();
            p.material_name = Some(rest.trim().to_owned());
        } else if let Some(rest) = s.strip_prefix("f ") {
            let refs: Vec<(i64, i64, i64)> =
                rest.split_whitespace().filter_map(parse_face_ref).collect();
            if refs.len() < 3 {
                continue;
            }
            for i in 1..refs.len() - 1 {
                let base = p.vertices.len() as u32;
                let a = corner_vertex(&p, refs[0]);
                let b = corner_vertex(&p, refs[i]);
                let c = corner_vertex(&p, refs[i + 1]);
                p.vertices.extend_from_slice(&[a, b, c]);
                p.indices.extend_from_slice(&[base, base + 1, base + 2]);
            }
        }
    }

    p.flush_submesh();
    p
}

fn sniff_obj(text: &str) -> bool {
    let mut saw_vertex = false;
    let mut saw_face = false;
    for line in text.lines().take(512) {
        let s = line.trim_start();
        if s.starts_with("v ") || s.starts_with("vt ") || s.starts_with("vn ") {
            saw_vertex = true;
        }
        if s.starts_with("f ") {
            saw_face = true;
        }
        if saw_vertex && saw_face {
            return true;
        }
    }
    false
}

fn ns_to_roughness(ns: f32) -> f32 {
    if ns < 1.0 {
        1.0
    } else {
        (2.0 / (ns + 2.0)).sqrt().clamp(0.0, 1.0)
    }
}

/// Last non-option token of a `map_*` statement; options like
/// `-bm 0.5 normal.png` carry one argument each.
fn mtl_texture_path(args: &str) -> Option<&str> {
    let mut last = None;
    let mut tokens = args.split_whitespace().peekable();
    while let Some(tok) = tokens.next() {
        if tok.starts_with('-') {
            if let Some(next) = tokens.peek() {
                if !next.starts_with('-') {
                    tokens.next();
                }
            }
            continue;
        }
        last = Some(tok);
    }
    last
}

fn contains_ci(hay: &str, needle: &str) -> bool {
    hay.to_ascii_lowercase().contains(&needle.to_ascii_lowercase())
}

fn request_map(am: &AssetManager, slot: &mut Handle, mtl_path: &str, file: &str) {
    *slot = Handle::invalid();
    if file.is_empty() {
        return;
    }
    let full = path_join(path_dirname(mtl_path), file);
    *slot = am.request(AssetType::Image, &full);
}

/// Parses a `.mtl` library, submits every material through the manager and
/// returns the name to handle mapping.
fn load_mtl_and_submit(am: &AssetManager, mtl_path: &str) -> Vec<(String, Handle)> {
    let Ok(text) = std::fs::read_to_string(mtl_path) else {
        warn!("mtl library {mtl_path:?} could not be read");
        return Vec::new();
    };

    let mut entries = Vec::new();
    let mut current: Option<MaterialAsset> = None;

    let mut submit = |m: Option<MaterialAsset>, entries: &mut Vec<(String, Handle)>| {
        if let Some(m) = m {
            if !m.name.is_empty() {
                let name = m.name.clone();
                let handle = am.submit_raw(AssetType::Material, AssetPayload::Material(m));
                entries.push((name, handle));
            }
        }
    };

    for line in text.lines() {
        let s = line.trim_start();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let (key, rest) = match s.split_once(char::is_whitespace) {
            Some((k, r)) => (k, r.trim()),
            None => (s, ""),
        };

        if key == "newmtl" {
            submit(current.take(), &mut entries);
            let mut m = MaterialAsset::with_shader(0);
            m.name = rest.to_owned();
            current = Some(m);
            continue;
        }

        let Some(m) = current.as_mut() else {
            continue;
        };

        match key {
            "Kd" => {
                if let Some(v) = parse_floats::<3>(rest) {
                    m.albedo = v.into();
                }
            }
            "Ke" => {
                if let Some(v) = parse_floats::<3>(rest) {
                    m.emissive = v.into();
                }
            }
            "Ns" => {
                if let Some([ns]) = parse_floats::<1>(rest) {
                    m.roughness = ns_to_roughness(ns);
                }
            }
            "d" => {
                if let Some([d]) = parse_floats::<1>(rest) {
                    m.opacity = d.clamp(0.0, 1.0);
                }
            }
            "Tr" => {
                if let Some([tr]) = parse_floats::<1>(rest) {
                    m.opacity = (1.0 - tr).clamp(0.0, 1.0);
                }
            }
            "Pm" => {
                if let Some([pm]) = parse_floats::<1>(rest) {
                    m.metallic = pm.clamp(0.0, 1.0);
                }
            }
            "Pr" => {
                if let Some([pr]) = parse_floats::<1>(rest) {
                    m.roughness = pr.clamp(0.0, 1.0);
                }
            }
            "map_Kd" => {
                if let Some(tex) = mtl_texture_path(rest) {
                    request_map(am, &mut m.albedo_tex, mtl_path, tex);
                }
            }
            "map_Ke" => {
                if let Some(tex) = mtl_texture_path(rest) {
                    request_map(am, &mut m.emissive_tex, mtl_path, tex);
                }
            }
            "map_Pr" | "map_Roughness" => {
                if let Some(tex) = mtl_texture_path(rest) {
                    request_map(am, &mut m.roughness_tex, mtl_path, tex);
                }
            }
            "map_Pm" | "map_Metallic" => {
                if let Some(tex) = mtl_texture_path(rest) {
                    request_map(am, &mut m.metallic_tex, mtl_path, tex);
                }
            }
            "map_AO" | "map_Occlusion" => {
                if let Some(tex) = mtl_texture_path(rest) {
                    request_map(am, &mut m.occlusion_tex, mtl_path, tex);
                }
            }
            "bump" | "map_bump" | "map_Bump" | "norm" | "map_Normal" | "map_Norm" => {
                if let Some(tex) = mtl_texture_path(rest) {
                    if contains_ci(key, "norm") || contains_ci(tex, "nor") {
                        request_map(am, &mut m.normal_tex, mtl_path, tex);
                    } else {
                        request_map(am, &mut m.height_tex, mtl_path, tex);
                    }
                }
            }
            _ => {}
        }
    }

    submit(current.take(), &mut entries);
    entries
}

impl AssetModule for ObjModule {
    fn asset_type(&self) -> AssetType {
        AssetType::Model
    }

    fn name(&self) -> &'static str {
        "model-obj"
    }

    fn can_load(&self, _am: &AssetManager, input: &LoadInput) -> bool {
        let Some(path) = input.path() else {
            return false;
        };
        if path_has_ext_ci(path, ".obj") {
            return true;
        }
        let mut head = [0u8; 4096];
        let Ok(mut f) = std::fs::File::open(path) else {
            return false;
        };
        let n = std::io::Read::read(&mut f, &mut head).unwrap_or(0);
        sniff_obj(&String::from_utf8_lossy(&head[..n]))
    }

    fn load(&self, am: &AssetManager, input: &LoadInput) -> Result<AssetAny, Error> {
        let path = input
            .path()
            .ok_or_else(|| Error::rejected("obj: descriptors not supported"))?;
        let text = std::fs::read_to_string(path)?;
        let parsed = parse_obj(&text);
        if parsed.submeshes.is_empty() {
            return Err(Error::decode(format!("obj: no faces in {path}")));
        }

        let mut raw = RawModel::new();
        raw.submeshes = parsed.submeshes;
        if let Some(mtllib) = parsed.mtllib.filter(|m| !m.is_empty()) {
            raw.mtllib_path = Some(path_join(path_dirname(path), &mtllib));
        }

        model_common::finish_parsed_model(am, &mut raw);

        Ok(AssetAny::loading(AssetPayload::ModelRaw(raw)))
    }

    fn init(&self, am: &AssetManager, asset: &mut AssetAny) -> Result<(), Error> {
        if let AssetPayload::ModelRaw(raw) = &mut asset.payload {
            raw.mtllib = Handle::invalid();
            if let Some(mtl_path) = raw.mtllib_path.clone() {
                let entries = load_mtl_and_submit(am, &mtl_path);
                for sm in raw.submeshes.iter_mut() {
                    sm.material = sm
                        .material_name
                        .as_ref()
                        .and_then(|name| {
                            entries
                                .iter()
                                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                                .map(|(_, h)| *h)
                        })
                        .unwrap_or_else(Handle::invalid);
                }
            }
        }

        model_common::model_init(am, asset)
    }

    fn cleanup(&self, am: &AssetManager, asset: &mut AssetAny) {
        model_common::model_cleanup(am, asset);
    }
}

#[cfg(test)]
mod test {
    use crate::loaders::model_obj::{
        fix_index, mtl_texture_path, ns_to_roughness, parse_face_ref, parse_obj, sniff_obj,
    };

    const QUAD: &str = "\
# quad
mtllib quad.mtl
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
usemtl painted
f 1/1 2/2 3/3 4/4
";

    #[test]
    fn face_refs() {
        assert_eq!(Some((1, 2, 3)), parse_face_ref("1/2/3"));
        assert_eq!(Some((4, 0, 7)), parse_face_ref("4//7"));
        assert_eq!(Some((5, 0, 0)), parse_face_ref("5"));
        assert_eq!(Some((-1, -2, 0)), parse_face_ref("-1/-2"));
        assert_eq!(None, parse_face_ref("x"));
    }

    #[test]
    fn negative_indices_count_from_end() {
        assert_eq!(0, fix_index(1, 4));
        assert_eq!(3, fix_index(-1, 4));
        assert_eq!(0, fix_index(-4, 4));
    }

    #[test]
    fn quad_fan_triangulates() {
        let p = parse_obj(QUAD);
        assert_eq!(1, p.submeshes.len());
        let lod = &p.submeshes[0].lods[0];
        assert_eq!(6, lod.vertices.len());
        assert_eq!(6, lod.indices.len());
        assert_eq!(Some("painted".to_owned()), p.submeshes[0].material_name);
        assert_eq!(Some("quad.mtl".to_owned()), p.mtllib);
        // V flipped.
        assert_eq!([0.0, 1.0], lod.vertices[0].uv);
    }

    #[test]
    fn usemtl_splits_submeshes() {
        let text = "\
v 0 0 0
v 1 0 0
v 0 1 0
usemtl a
f 1 2 3
usemtl b
f 3 2 1
";
        let p = parse_obj(text);
        assert_eq!(2, p.submeshes.len());
        assert_eq!(Some("a".to_owned()), p.submeshes[0].material_name);
        assert_eq!(Some("b".to_owned()), p.submeshes[1].material_name);
    }

    #[test]
    fn sniff_needs_vertices_and_faces() {
        assert!(sniff_obj("v 1 2 3\nf 1 2 3\n"));
        assert!(!sniff_obj("v 1 2 3\n"));
        assert!(!sniff_obj("hello"));
    }

    #[test]
    fn shininess_to_roughness() {
        assert_eq!(1.0, ns_to_roughness(0.5));
        assert!((ns_to_roughness(2.0) - (2.0f32 / 4.0).sqrt()).abs() < 1e-6);
        assert!(ns_to_roughness(1000.0) < 0.05);
    }

    #[test]
    fn texture_path_skips_options() {
        assert_eq!(Some("tex.png"), mtl_texture_path("tex.png"));
        assert_eq!(Some("normal.png"), mtl_texture_path("-bm 0.3 normal.png"));
        assert_eq!(Some("a.png"), mtl_texture_path("-clamp on a.png"));
        assert_eq!(None, mtl_texture_path("   "));
    }
}
