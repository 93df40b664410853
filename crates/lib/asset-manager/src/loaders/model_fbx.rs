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

//! Binary FBX importer over the low-level node tree: geometry only
//! (control points, polygons, normals, first UV set). Polygons are
//! fan-triangulated into unshared corner vertices.

use std::{fs::File, io::BufReader};

use fbxcel::{
    low::v7400::AttributeValue,
    tree::{any::AnyTree, v7400::NodeHandle},
};
use kyanite_assets::{
    AssetAny, AssetPayload, AssetType, Error, ModelVertex, RawLod, RawModel, RawSubmesh,
};

use crate::{
    loaders::{model_common, path_has_ext_ci},
    AssetManager, AssetModule, LoadInput,
};

pub struct FbxModule;

const BINARY_MAGIC: &[u8] = b"Kaydara FBX Binary";

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mapping {
    ByPolygonVertex,
    ByControlPoint,
    Unsupported,
}

struct LayerF64 {
    values: Vec<f64>,
    indices: Option<Vec<i32>>,
    mapping: Mapping,
}

fn child<'a>(node: &NodeHandle<'a>, name: &str) -> Option<NodeHandle<'a>> {
    node.children().find(|c| c.name() == name)
}

fn arr_f64(node: &NodeHandle, name: &str) -> Option<Vec<f64>> {
    let n = child(node, name)?;
    match n.attributes().first()? {
        AttributeValue::ArrF64(v) => Some(v.clone()),
        AttributeValue::ArrF32(v) => Some(v.iter().map(|x| *x as f64).collect()),
        _ => None,
    }
}

fn arr_i32(node: &NodeHandle, name: &str) -> Option<Vec<i32>> {
    let n = child(node, name)?;
    match n.attributes().first()? {
        AttributeValue::ArrI32(v) => Some(v.clone()),
        AttributeValue::ArrI64(v) => Some(v.iter().map(|x| *x as i32).collect()),
        _ => None,
    }
}

fn string_attr(node: &NodeHandle, name: &str) -> Option<String> {
    let n = child(node, name)?;
    match n.attributes().first()? {
        AttributeValue::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn mapping_of(layer: &NodeHandle) -> Mapping {
    match string_attr(layer, "MappingInformationType").as_deref() {
        Some("ByPolygonVertex") => Mapping::ByPolygonVertex,
        Some("ByVertice") | Some("ByVertex") | Some("ByControlPoint") => Mapping::ByControlPoint,
        _ => Mapping::Unsupported,
    }
}

fn read_layer(geometry: &NodeHandle, layer_name: &str, values_name: &str, index_name: &str) -> Option<LayerF64> {
    let layer = child(geometry, layer_name)?;
    let values = arr_f64(&layer, values_name)?;
    let indices = arr_i32(&layer, index_name);
    Some(LayerF64 {
        values,
        indices,
        mapping: mapping_of(&layer),
    })
}

fn layer_element<const N: usize>(
    layer: &LayerF64,
    corner: usize,
    control_point: usize,
) -> Option<[f32; N]> {
    let slot = match layer.mapping {
        Mapping::ByPolygonVertex => corner,
        Mapping::ByControlPoint => control_point,
        Mapping::Unsupported => return None,
    };
    let index = match &layer.indices {
        Some(indices) => {
            let i = *indices.get(slot)?;
            if i < 0 {
                return None;
            }
            i as usize
        }
        None => slot,
    };

    let start = index * N;
    let mut out = [0.0f32; N];
    for (k, v) in out.iter_mut().enumerate() {
        *v = *layer.values.get(start + k)? as f32;
    }
    Some(out)
}

fn geometry_to_lod(geometry: &NodeHandle) -> Option<RawLod> {
    let points = arr_f64(geometry, "Vertices")?;
    let polygons = arr_i32(geometry, "PolygonVertexIndex")?;
    if points.len() < 9 || polygons.len() < 3 {
        return None;
    }
    let control_points: Vec<[f32; 3]> = points
        .chunks_exact(3)
        .map(|c| [c[0] as f32, c[1] as f32, c[2] as f32])
        .collect();

    let normals = read_layer(geometry, "LayerElementNormal", "Normals", "NormalsIndex");
    let uvs = read_layer(geometry, "LayerElementUV", "UV", "UVIndex");

    let mut lod = RawLod::default();

    // Corners come in polygon runs; a negative entry is the bitwise-NOT of
    // the final corner's control point.
    let mut polygon: Vec<(usize, usize)> = Vec::new(); // (corner, control point)
    for (corner, &raw) in polygons.iter().enumerate() {
        let (cp, last) = if raw < 0 {
            ((!raw) as usize, true)
        } else {
            (raw as usize, false)
        };
        if cp >= control_points.len() {
            return None;
        }
        polygon.push((corner, cp));

        if last {
            for i in 1..polygon.len().saturating_sub(1) {
                let base = lod.vertices.len() as u32;
                for &(corner, cp) in [polygon[0], polygon[i], polygon[i + 1]].iter() {
                    let normal = normals
                        .as_ref()
                        .and_then(|l| layer_element::<3>(l, corner, cp))
                        .unwrap_or([0.0, 0.0, 0.0]);
                    let uv = uvs
                        .as_ref()
                        .and_then(|l| layer_element::<2>(l, corner, cp))
                        .map(|uv| [uv[0], 1.0 - uv[1]])
                        .unwrap_or([0.0, 0.0]);
                    lod.vertices.push(ModelVertex {
                        position: control_points[cp],
                        normal,
                        tangent: [0.0; 4],
                        uv,
                    });
                }
                lod.indices.extend_from_slice(&[base, base + 1, base + 2]);
            }
            polygon.clear();
        }
    }

    if lod.indices.len() < 3 {
        return None;
    }
    Some(lod)
}

fn parse_fbx(path: &str) -> Result<Vec<RawLod>, Error> {
    let file = File::open(path)?;
    let tree = AnyTree::from_seekable_reader(BufReader::new(file))
        .map_err(|err| Error::decode(format!("fbx: {err}")))?;

    let lods = match &tree {
        AnyTree::V7400(_, tree, _) => {
            let root = tree.root();
            let Some(objects) = child(&root, "Objects") else {
                return Err(Error::decode("fbx: no Objects node"));
            };
            objects
                .children()
                .filter(|n| n.name() == "Geometry")
                .filter_map(|g| geometry_to_lod(&g))
                .collect::<Vec<_>>()
        }
        _ => return Err(Error::rejected("fbx: unsupported version")),
    };

    if lods.is_empty() {
        return Err(Error::decode(format!("fbx: no usable geometry in {path}")));
    }
    Ok(lods)
}

impl AssetModule for FbxModule {
    fn asset_type(&self) -> AssetType {
        AssetType::Model
    }

    fn name(&self) -> &'static str {
        "model-fbx"
    }

    fn can_load(&self, _am: &AssetManager, input: &LoadInput) -> bool {
        let Some(path) = input.path() else {
            return false;
        };
        if !path_has_ext_ci(path, ".fbx") {
            return false;
        }
        let mut head = [0u8; 18];
        let Ok(mut f) = std::fs::File::open(path) else {
            return false;
        };
        std::io::Read::read_exact(&mut f, &mut head).is_ok() && &head[..] == BINARY_MAGIC
    }

    fn load(&self, am: &AssetManager, input: &LoadInput) -> Result<AssetAny, Error> {
        let path = input
            .path()
            .ok_or_else(|| Error::rejected("fbx: descriptors not supported"))?;
        let lods = parse_fbx(path)?;

        let mut raw = RawModel::new();
        for lod0 in lods {
            raw.submeshes.push(RawSubmesh::from_lod0(lod0));
        }
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
