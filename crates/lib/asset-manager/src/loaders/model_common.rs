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

//! Init/cleanup plumbing shared by every mesh importer.

use kyanite_assets::{
    indices_to_bytes, lod, meshattrs, vertices_to_bytes, AssetAny, AssetPayload, Error, Mesh,
    MeshFlags, MeshLod, ModelAsset, RawModel,
};
use kyanite_backend::{BufferCreateDesc, BufferKind, RenderDevice};

use crate::AssetManager;

/// Worker-side post-parse step: synthesize missing attributes on LOD0, then
/// derive the decimated chain.
pub(crate) fn finish_parsed_model(am: &AssetManager, raw: &mut RawModel) {
    for sm in raw.submeshes.iter_mut() {
        if let Some(lod0) = sm.lods.first_mut() {
            let indices = std::mem::take(&mut lod0.indices);
            meshattrs::finalize_attributes(&mut lod0.vertices, &indices);
            lod0.indices = indices;
        }
    }
    lod::generate_lods(raw, am.lod_settings());
}

pub(crate) fn upload_model(device: &dyn RenderDevice, raw: &RawModel) -> Result<ModelAsset, Error> {
    let mut model = ModelAsset::default();

    let result = (|| {
        for sm in &raw.submeshes {
            if sm.lods.is_empty() {
                continue;
            }

            let mut mesh = Mesh {
                lods: Vec::with_capacity(sm.lods.len()),
                material: sm.material,
                local_aabb: sm.aabb.unwrap_or_else(|| sm.compute_aabb()),
                flags: MeshFlags::HAS_AABB,
            };

            let want = sm.lods.len();
            for (li, lod) in sm.lods.iter().enumerate() {
                if lod.vertices.is_empty() || lod.indices.is_empty() {
                    continue;
                }

                let vertex_buffer = device.create_buffer(&BufferCreateDesc {
                    kind: BufferKind::Vertex,
                    data: &vertices_to_bytes(&lod.vertices),
                })?;
                let index_buffer = match device.create_buffer(&BufferCreateDesc {
                    kind: BufferKind::Index,
                    data: &indices_to_bytes(&lod.indices),
                }) {
                    Ok(b) => b,
                    Err(err) => {
                        device.destroy_buffer(vertex_buffer);
                        return Err(err.into());
                    }
                };

                mesh.lods.push(MeshLod {
                    vertex_buffer,
                    index_buffer,
                    vertex_count: lod.vertices.len() as u32,
                    index_count: lod.indices.len() as u32,
                });
                if li == 0 {
                    mesh.flags |= MeshFlags::LOD0_READY;
                }
            }

            if mesh.lods.is_empty() {
                continue;
            }
            if mesh.lods.len() == want {
                mesh.flags |= MeshFlags::LODS_READY;
            }
            model.meshes.push(mesh);
        }
        Ok(())
    })();

    match result {
        Ok(()) => {
            if model.meshes.is_empty() {
                Err(Error::rejected("model has no uploadable submeshes"))
            } else {
                Ok(model)
            }
        }
        Err(err) => {
            release_model(device, &mut model);
            Err(err)
        }
    }
}

pub(crate) fn release_model(device: &dyn RenderDevice, model: &mut ModelAsset) {
    for mesh in model.meshes.iter_mut() {
        for lod in mesh.lods.drain(..) {
            device.destroy_buffer(lod.index_buffer);
            device.destroy_buffer(lod.vertex_buffer);
        }
    }
    model.meshes.clear();
}

/// Shared `init`: turn the raw payload into device buffers. The raw data is
/// dropped on success and left in place on failure so cleanup releases it.
pub(crate) fn model_init(am: &AssetManager, asset: &mut AssetAny) -> Result<(), Error> {
    let payload = std::mem::take(&mut asset.payload);
    let AssetPayload::ModelRaw(raw) = payload else {
        asset.payload = payload;
        return Err(Error::rejected("expected a parsed model payload"));
    };

    match upload_model(am.device(), &raw) {
        Ok(model) => {
            asset.payload = AssetPayload::Model(model);
            Ok(())
        }
        Err(err) => {
            asset.payload = AssetPayload::ModelRaw(raw);
            Err(err)
        }
    }
}

/// Shared `cleanup`: total over raw, initialized and half-initialized
/// payloads.
pub(crate) fn model_cleanup(am: &AssetManager, asset: &mut AssetAny) {
    match &mut asset.payload {
        AssetPayload::Model(model) => release_model(am.device(), model),
        AssetPayload::ModelRaw(_) => {}
        _ => return,
    }
    asset.payload = AssetPayload::None;
}
