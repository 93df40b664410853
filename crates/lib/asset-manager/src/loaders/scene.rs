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

use kyanite_assets::{AssetAny, AssetPayload, AssetType, Error, SceneAsset};

use crate::{loaders::path_has_ext_ci, AssetManager, AssetModule, LoadInput};

/// Scene text loader; the payload stays opaque to the asset core.
pub struct SceneModule;

fn accepts(path: &str) -> bool {
    path_has_ext_ci(path, ".scene")
        || path_has_ext_ci(path, ".scene.yaml")
        || path_has_ext_ci(path, ".scene.yml")
}

impl AssetModule for SceneModule {
    fn asset_type(&self) -> AssetType {
        AssetType::Scene
    }

    fn name(&self) -> &'static str {
        "scene-text"
    }

    fn can_load(&self, _am: &AssetManager, input: &LoadInput) -> bool {
        input.path().map(accepts).unwrap_or(false)
    }

    fn load(&self, _am: &AssetManager, input: &LoadInput) -> Result<AssetAny, Error> {
        let path = input
            .path()
            .ok_or_else(|| Error::rejected("scene: descriptors not supported"))?;
        if !accepts(path) {
            return Err(Error::rejected(format!("not a scene file: {path}")));
        }
        let bytes = std::fs::read(path)?;

        Ok(AssetAny::loading(AssetPayload::Scene(SceneAsset::from_bytes(bytes))))
    }
}

#[cfg(test)]
mod test {
    use crate::loaders::scene::accepts;

    #[test]
    fn suffix_routing() {
        assert!(accepts("world.scene"));
        assert!(accepts("world.SCENE.YAML"));
        assert!(accepts("world.scene.yml"));
        assert!(!accepts("world.yaml"));
        assert!(!accepts("scene"));
    }
}
