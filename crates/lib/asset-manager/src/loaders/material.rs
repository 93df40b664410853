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

use kyanite_assets::{imat, AssetAny, AssetPayload, AssetType, Error};
use kyanite_common::Handle;

use crate::{loaders::path_has_ext_ci, AssetManager, AssetModule, LoadInput};

/// `.imat` document importer. Materials carry no device resources; init is
/// a no-op and cleanup just drops the payload.
pub struct MaterialModule;

impl AssetModule for MaterialModule {
    fn asset_type(&self) -> AssetType {
        AssetType::Material
    }

    fn name(&self) -> &'static str {
        "material-imat"
    }

    fn can_load(&self, _am: &AssetManager, input: &LoadInput) -> bool {
        match input {
            LoadInput::Path(path) => path_has_ext_ci(path, ".imat"),
            LoadInput::Memory(_) => false,
        }
    }

    fn load(&self, _am: &AssetManager, input: &LoadInput) -> Result<AssetAny, Error> {
        let path = input
            .path()
            .ok_or_else(|| Error::rejected("imat: descriptors not supported"))?;
        let text = std::fs::read_to_string(path)?;
        let material = imat::from_document(&text)?;

        Ok(AssetAny::loading(AssetPayload::Material(material)))
    }

    fn save_blob(
        &self,
        _am: &AssetManager,
        _handle: Handle,
        asset: &AssetAny,
    ) -> Option<Result<Vec<u8>, Error>> {
        let material = asset.as_material()?;
        Some(Ok(imat::to_document(material).into_bytes()))
    }
}
