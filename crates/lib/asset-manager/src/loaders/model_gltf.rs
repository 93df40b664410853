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

//! glTF / GLB importer. Node transforms are baked into vertices, every
//! primitive becomes a submesh, and PBR materials are synthesized through
//! the manager (textures by path, data URI, or embedded buffer view).

use std::collections::HashMap;

use glam::{Mat3, Mat4, Vec3};
use kyanite_assets::{
    AssetAny, AssetPayload, AssetType, Error, MaterialAsset, MaterialFlags, ModelVertex, RawLod,
    RawModel, RawSubmesh,
};
use kyanite_common::Handle;
use log::warn;

use crate::{
    loaders::{model_common, path_dirname, path_has_ext_ci, path_join},
    AssetManager, AssetModule, ImageMemory, LoadInput,
};

pub struct GltfModule;

struct ImportContext<'a> {
    am: &'a AssetManager,
    base_dir: String,
    buffers: Vec<gltf::buffer::Data>,
    // glTF material index (None = default) -> submitted handle.
    materials: HashMap<Option<usize>, Handle>,
    submeshes: Vec<RawSubmesh>,
}

fn request_image(ctx: &ImportContext, image: &gltf::Image) -> Handle {
    match image.source() {
        gltf::image::Source::Uri { uri, .. } => {
            if let Some(data) = uri.strip_prefix("data:") {
                let Some((meta, payload)) = data.split_once(',') else {
                    return Handle::invalid();
                };
                if !meta.contains("base64") {
                    return Handle::invalid();
                }
                let Ok(bytes) = base64::decode(payload) else {
                    return Handle::invalid();
                };
                ctx.am.request_ptr(
                    AssetType::Image,
                    Box::new(ImageMemory {
                        bytes,
                        debug_name: Some("gltf data uri".to_owned()),
                    }),
                )
            } else {
                let full = path_join(&ctx.base_dir, uri);
                ctx.am.request(AssetType::Image, &full)
            }
        }
        gltf::image::Source::View { view, .. } => {
            let buffer = &ctx.buffers[view.buffer().index()];
            let start = view.offset();
            let end = start + view.length();
            let Some(bytes) = buffer.get(start..end) else {
                return Handle::invalid();
            };
            ctx.am.request_ptr(
                AssetType::Image,
                Box::new(ImageMemory {
                    bytes: bytes.to_vec(),
                    debug_name: Some("gltf buffer view".to_owned()),
                }),
            )
        }
    }
}

fn build_material(ctx: &ImportContext, material: &gltf::Material) -> MaterialAsset {
    let mut out = MaterialAsset::with_shader(0);
    let pbr = material.pbr_metallic_roughness();

    let base = pbr.base_color_factor();
    out.albedo = Vec3::new(base[0], base[1], base[2]);
    out.opacity = base[3];
    out.metallic = pbr.metallic_factor();
    out.roughness = pbr.roughness_factor();
    let emissive = material.emissive_factor();
    out.emissive = Vec3::from_array(emissive);

    match material.alpha_mode() {
        gltf::material::AlphaMode::Opaque => {}
        gltf::material::AlphaMode::Mask => {
            out.flags |= MaterialFlags::ALPHA_CUTOUT;
            out.alpha_cutoff = material.alpha_cutoff().unwrap_or(0.5);
        }
        gltf::material::AlphaMode::Blend => out.flags |= MaterialFlags::ALPHA_BLEND,
    }
    if material.double_sided() {
        out.flags |= MaterialFlags::DOUBLE_SIDED;
    }

    if let Some(info) = pbr.base_color_texture() {
        out.albedo_tex = request_image(ctx, &info.texture().source());
    }
    if let Some(info) = pbr.metallic_roughness_texture() {
        let handle = request_image(ctx, &info.texture().source());
        out.metallic_tex = handle;
        out.roughness_tex = handle;
    }
    if let Some(normal) = material.normal_texture() {
        out.normal_tex = request_image(ctx, &normal.texture().source());
        out.normal_strength = normal.scale();
    }
    if let Some(occlusion) = material.occlusion_texture() {
        out.occlusion_tex = request_image(ctx, &occlusion.texture().source());
    }
    if let Some(info) = material.emissive_texture() {
        out.emissive_tex = request_image(ctx, &info.texture().source());
    }

    if let Some(name) = material.name() {
        out.name = name.to_owned();
    }

    out
}

fn material_handle(ctx: &mut ImportContext, material: &gltf::Material) -> Handle {
    let key = material.index();
    if let Some(h) = ctx.materials.get(&key) {
        return *h;
    }
    let built = build_material(ctx, material);
    let handle = ctx
        .am
        .submit_raw(AssetType::Material, AssetPayload::Material(built));
    ctx.materials.insert(key, handle);
    handle
}

fn process_primitive(ctx: &mut ImportContext, prim: &gltf::Primitive, world: Mat4) {
    if prim.mode() != gltf::mesh::Mode::Triangles {
        warn!("gltf: skipping non-triangle primitive");
        return;
    }

    let buffers = std::mem::take(&mut ctx.buffers);
    let geometry = {
        let reader = prim.reader(|buffer| Some(&buffers[buffer.index()]));
        reader.read_positions().map(|positions| {
            let positions: Vec<[f32; 3]> = positions.collect();
            let normals: Option<Vec<[f32; 3]>> = reader.read_normals().map(|n| n.collect());
            let uvs: Option<Vec<[f32; 2]>> =
                reader.read_tex_coords(0).map(|t| t.into_f32().collect());
            let tangents: Option<Vec<[f32; 4]>> = reader.read_tangents().map(|t| t.collect());
            let indices: Vec<u32> = match reader.read_indices() {
                Some(read) => read.into_u32().collect(),
                None => (0..positions.len() as u32).collect(),
            };
            (positions, normals, uvs, tangents, indices)
        })
    };
    ctx.buffers = buffers;

    let Some((positions, normals, uvs, tangents, indices)) = geometry else {
        return;
    };
    let material = material_handle(ctx, &prim.material());

    if positions.is_empty() || indices.len() < 3 {
        return;
    }

    let normal_mat = Mat3::from_mat4(world).inverse().transpose();

    let mut vertices = Vec::with_capacity(positions.len());
    for (i, p) in positions.iter().enumerate() {
        let pos = world.transform_point3(Vec3::from_array(*p));
        let normal = normals
            .as_ref()
            .and_then(|n| n.get(i))
            .map(|n| {
                let n = normal_mat * Vec3::from_array(*n);
                if n.length_squared() > 1e-20 {
                    n.normalize().to_array()
                } else {
                    [0.0, 0.0, 0.0]
                }
            })
            .unwrap_or([0.0, 0.0, 0.0]);
        let uv = uvs
            .as_ref()
            .and_then(|t| t.get(i))
            .map(|t| [t[0], 1.0 - t[1]])
            .unwrap_or([0.0, 0.0]);
        let tangent = tangents
            .as_ref()
            .and_then(|t| t.get(i))
            .map(|t| {
                let dir = normal_mat * Vec3::new(t[0], t[1], t[2]);
                let dir = if dir.length_squared() > 1e-20 {
                    dir.normalize()
                } else {
                    Vec3::ZERO
                };
                [dir.x, dir.y, dir.z, t[3]]
            })
            .unwrap_or([0.0; 4]);

        vertices.push(ModelVertex {
            position: pos.to_array(),
            normal,
            tangent,
            uv,
        });
    }

    let vertex_count = vertices.len() as u32;
    let indices: Vec<u32> = indices.into_iter().filter(|&i| i < vertex_count).collect();
    if indices.len() < 3 {
        return;
    }

    let mut sm = RawSubmesh::from_lod0(RawLod { vertices, indices });
    sm.material = material;
    ctx.submeshes.push(sm);
}

fn process_node(ctx: &mut ImportContext, node: &gltf::Node, parent: Mat4) {
    let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
    if let Some(mesh) = node.mesh() {
        for prim in mesh.primitives() {
            process_primitive(ctx, &prim, world);
        }
    }
    for child in node.children() {
        process_node(ctx, &child, world);
    }
}

impl AssetModule for GltfModule {
    fn asset_type(&self) -> AssetType {
        AssetType::Model
    }

    fn name(&self) -> &'static str {
        "model-gltf"
    }

    fn can_load(&self, _am: &AssetManager, input: &LoadInput) -> bool {
        let Some(path) = input.path() else {
            return false;
        };
        if path_has_ext_ci(path, ".gltf") || path_has_ext_ci(path, ".glb") {
            return true;
        }
        let mut head = [0u8; 4];
        let Ok(mut f) = std::fs::File::open(path) else {
            return false;
        };
        std::io::Read::read_exact(&mut f, &mut head).is_ok() && &head == b"glTF"
    }

    fn load(&self, am: &AssetManager, input: &LoadInput) -> Result<AssetAny, Error> {
        let path = input
            .path()
            .ok_or_else(|| Error::rejected("gltf: descriptors not supported"))?;
        let (document, buffers, _images) =
            gltf::import(path).map_err(|err| Error::decode(format!("gltf: {err}")))?;

        let mut ctx = ImportContext {
            am,
            base_dir: path_dirname(path).to_owned(),
            buffers,
            materials: HashMap::new(),
            submeshes: Vec::new(),
        };

        for scene in document.scenes() {
            for node in scene.nodes() {
                process_node(&mut ctx, &node, Mat4::IDENTITY);
            }
        }

        if ctx.submeshes.is_empty() {
            return Err(Error::decode(format!("gltf: no triangle geometry in {path}")));
        }

        let mut raw = RawModel::new();
        raw.submeshes = ctx.submeshes;
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
