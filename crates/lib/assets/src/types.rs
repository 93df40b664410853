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

use crate::{ImageAsset, MaterialAsset, ModelAsset, RawModel, SceneAsset};

/// Stable numeric tags; zero is reserved so an all-zero handle is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum AssetType {
    None = 0,
    Image = 1,
    Material = 2,
    Model = 3,
    Scene = 4,
}

impl AssetType {
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0 => Some(Self::None),
            1 => Some(Self::Image),
            2 => Some(Self::Material),
            3 => Some(Self::Model),
            4 => Some(Self::Scene),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Image => "image",
            Self::Material => "material",
            Self::Model => "model",
            Self::Scene => "scene",
        }
    }
}

/// Legal transitions: Empty -> Loading, Loading -> Ready, Loading -> Failed,
/// Ready -> Empty, Failed -> Empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssetState {
    #[default]
    Empty,
    Loading,
    Ready,
    Failed,
}

/// Payload union. A model shows up as `ModelRaw` between load and init and
/// as `Model` once device buffers exist.
#[derive(Debug, Default)]
pub enum AssetPayload {
    #[default]
    None,
    Image(ImageAsset),
    Material(MaterialAsset),
    ModelRaw(RawModel),
    Model(ModelAsset),
    Scene(SceneAsset),
}

impl AssetPayload {
    pub fn asset_type(&self) -> AssetType {
        match self {
            Self::None => AssetType::None,
            Self::Image(_) => AssetType::Image,
            Self::Material(_) => AssetType::Material,
            Self::ModelRaw(_) | Self::Model(_) => AssetType::Model,
            Self::Scene(_) => AssetType::Scene,
        }
    }
}

#[derive(Debug, Default)]
pub struct AssetAny {
    pub state: AssetState,
    pub payload: AssetPayload,
}

impl AssetAny {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn loading(payload: AssetPayload) -> Self {
        Self {
            state: AssetState::Loading,
            payload,
        }
    }

    pub fn asset_type(&self) -> AssetType {
        self.payload.asset_type()
    }

    pub fn take(&mut self) -> AssetAny {
        std::mem::take(self)
    }

    pub fn as_image(&self) -> Option<&ImageAsset> {
        match &self.payload {
            AssetPayload::Image(img) => Some(img),
            _ => None,
        }
    }

    pub fn as_image_mut(&mut self) -> Option<&mut ImageAsset> {
        match &mut self.payload {
            AssetPayload::Image(img) => Some(img),
            _ => None,
        }
    }

    pub fn as_material(&self) -> Option<&MaterialAsset> {
        match &self.payload {
            AssetPayload::Material(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_model(&self) -> Option<&ModelAsset> {
        match &self.payload {
            AssetPayload::Model(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_scene(&self) -> Option<&SceneAsset> {
        match &self.payload {
            AssetPayload::Scene(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{AssetAny, AssetPayload, AssetState, AssetType, RawModel, SceneAsset};

    #[test]
    fn type_tags_are_stable() {
        assert_eq!(0, AssetType::None as u16);
        assert_eq!(1, AssetType::Image as u16);
        assert_eq!(2, AssetType::Material as u16);
        assert_eq!(3, AssetType::Model as u16);
        assert_eq!(4, AssetType::Scene as u16);
        assert_eq!(Some(AssetType::Model), AssetType::from_u16(3));
        assert_eq!(None, AssetType::from_u16(99));
    }

    #[test]
    fn payload_type() {
        assert_eq!(AssetType::None, AssetPayload::None.asset_type());
        assert_eq!(
            AssetType::Model,
            AssetPayload::ModelRaw(RawModel::new()).asset_type()
        );
        assert_eq!(
            AssetType::Scene,
            AssetPayload::Scene(SceneAsset::default()).asset_type()
        );
    }

    #[test]
    fn take_resets_to_empty() {
        let mut any = AssetAny::loading(AssetPayload::Scene(SceneAsset::from_bytes(vec![1])));
        let taken = any.take();
        assert_eq!(AssetState::Loading, taken.state);
        assert_eq!(AssetState::Empty, any.state);
        assert_eq!(AssetType::None, any.asset_type());
    }
}
