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

//! `.imesh` container importer. The container already carries a dense LOD
//! chain, so no decimation happens here; materials resolve to a stored
//! handle or to a sibling `.imat` request.

use kyanite_assets::{
    imesh, AssetAny, AssetPayload, AssetType, Error, RawModel, RawSubmesh,
};
use kyanite_common::Handle;

use crate::{
    loaders::{model_common, path_dirname, path_has_ext_ci, path_join},
    AssetManager, AssetModule, LoadInput, MeshBlobMemory,
};

pub struct ImeshModule;

fn is_path_like(name: &str) -> bool {
    name.contains('/') || name.contains('\\')
}

fn imat_path_for(mesh_path: &str, material_name: &str) -> String {
    if is_path_like(material_name) || path_has_ext_ci(material_name, ".imat") {
        material_name.to_owned()
    } else {
        let mut full = path_join(path_dirname(mesh_path), material_name);
        full.push_str(".imat");
        full
    }
}

fn raw_from_container(
    am: &AssetManager,
    mesh_path: &str,
    parsed: imesh::ImeshModel,
) -> RawModel {
    let mut raw = RawModel::new();
    raw.lod_count = 0;

    for sm in parsed.submeshes {
        let material = if sm.material_handle.is_valid() {
            sm.material_handle
        } else if let Some(name) = sm.material_name.as_deref().filter(|n| !n.is_empty()) {
            am.request(AssetType::Material, &imat_path_for(mesh_path, name))
        } else {
            Handle::invalid()
        };

        raw.lod_count = raw.lod_count.max(sm.lods.len().min(u8::MAX as usize) as u8);
        raw.submeshes.push(RawSubmesh {
            lods: sm.lods,
            material_name: sm.material_name,
            material,
            aabb: sm.aabb,
        });
    }

    if raw.lod_count == 0 {
        raw.lod_count = 1;
    }
    raw
}

impl AssetModule for ImeshModule {
    fn asset_type(&self) -> AssetType {
        AssetType::Model
    }

    fn name(&self) -> &'static str {
        "model-imesh"
    }

    fn can_load(&self, _am: &AssetManager, input: &LoadInput) -> bool {
        match input {
            LoadInput::Path(path) => path_has_ext_ci(path, ".imesh"),
            LoadInput::Memory(_) => input
                .memory::<MeshBlobMemory>()
                .map(|blob| blob.bytes.starts_with(&imesh::IMESH_MAGIC))
                .unwrap_or(false),
        }
    }

    fn load(&self, am: &AssetManager, input: &LoadInput) -> Result<AssetAny, Error> {
        let (bytes, mesh_path): (Vec<u8>, &str) = match input {
            LoadInput::Path(path) => (std::fs::read(path)?, path.as_str()),
            LoadInput::Memory(_) => {
                let blob = input
                    .memory::<MeshBlobMemory>()
                    .ok_or_else(|| Error::rejected("unknown descriptor"))?;
                (blob.bytes.clone(), "")
            }
        };

        let parsed = imesh::decode(&bytes)?;
        let raw = raw_from_container(am, mesh_path, parsed);

        Ok(AssetAny::loading(AssetPayload::ModelRaw(raw)))
    }

    fn init(&self, am: &AssetManager, asset: &mut AssetAny) -> Result<(), Error> {
        model_common::model_init(am, asset)
    }

    fn cleanup(&self, am: &AssetManager, asset: &mut AssetAny) {
        model_common::model_cleanup(am, asset);
    }

    fn save_blob(
        &self,
        am: &AssetManager,
        handle: Handle,
        asset: &AssetAny,
    ) -> Option<Result<Vec<u8>, Error>> {
        let model = asset.as_model()?;
        Some(save_model(am, handle, model))
    }
}

fn save_model(
    am: &AssetManager,
    handle: Handle,
    model: &kyanite_assets::ModelAsset,
) -> Result<Vec<u8>, Error> {
    let mut submeshes = Vec::with_capacity(model.meshes.len());
    for mesh in &model.meshes {
        let mut lods = Vec::with_capacity(mesh.lods.len());
        for lod in &mesh.lods {
            // Vertex and index data may only exist on the device by now.
            let vertex_data = am.device().read_buffer(lod.vertex_buffer)?;
            let index_data = am.device().read_buffer(lod.index_buffer)?;
            lods.push(imesh::ImeshLodBlob {
                vertex_data,
                index_data,
                vertex_count: lod.vertex_count,
                index_count: lod.index_count,
            });
        }
        submeshes.push(imesh::ImeshSubmeshBlob {
            material_handle: mesh.material,
            aabb: mesh.local_aabb,
            lods,
        });
    }

    imesh::encode(handle, &submeshes)
}

#[cfg(test)]
mod test {
    use crate::loaders::model_imesh::imat_path_for;

    #[test]
    fn sibling_material_names_gain_suffix() {
        assert_eq!("models/steel.imat", imat_path_for("models/tank.imesh", "steel"));
        assert_eq!("steel.imat", imat_path_for("tank.imesh", "steel"));
    }

    #[test]
    fn path_like_names_are_kept() {
        assert_eq!(
            "materials/steel.imat",
            imat_path_for("models/tank.imesh", "materials/steel.imat")
        );
        assert_eq!("steel.imat", imat_path_for("models/tank.imesh", "steel.imat"));
    }
}
