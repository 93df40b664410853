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

use kyanite_assets::{
    itex, pixels, AssetAny, AssetPayload, AssetType, Error, ImageAsset, ImageStream,
};
use kyanite_backend::ImageCreateDesc;
use kyanite_common::Handle;

use crate::{loaders::path_has_ext_ci, AssetManager, AssetModule, LoadInput};

/// `.itex` container importer: single compressed base level, uploaded whole.
pub struct ItexModule;

impl AssetModule for ItexModule {
    fn asset_type(&self) -> AssetType {
        AssetType::Image
    }

    fn name(&self) -> &'static str {
        "image-itex"
    }

    fn can_load(&self, _am: &AssetManager, input: &LoadInput) -> bool {
        match input {
            LoadInput::Path(path) => path_has_ext_ci(path, ".itex"),
            LoadInput::Memory(_) => false,
        }
    }

    fn load(&self, _am: &AssetManager, input: &LoadInput) -> Result<AssetAny, Error> {
        let path = input
            .path()
            .ok_or_else(|| Error::rejected("itex: descriptors not supported"))?;
        let data = std::fs::read(path)?;
        let decoded = itex::decode(&data)?;

        Ok(AssetAny::loading(AssetPayload::Image(ImageAsset {
            width: decoded.width,
            height: decoded.height,
            channels: decoded.channels,
            is_float: decoded.is_float,
            has_alpha: decoded.has_alpha,
            has_smooth_alpha: decoded.has_smooth_alpha,
            pixels: Some(decoded.pixels),
            image: None,
            mips: None,
            stream: ImageStream::default(),
        })))
    }

    fn init(&self, am: &AssetManager, asset: &mut AssetAny) -> Result<(), Error> {
        let img = asset
            .as_image_mut()
            .ok_or_else(|| Error::rejected("expected an image payload"))?;
        if img.image.is_some() {
            return Ok(());
        }

        let mut data = img
            .pixels
            .take()
            .ok_or_else(|| Error::rejected("itex: no pixels to upload"))?;
        // Rows are stored top-to-bottom on disk; flip at upload to keep UV
        // conventions consistent with the decoded-image path.
        pixels::flip_y(&mut data, img.width, img.height, img.bytes_per_pixel());

        let id = am.device().create_image(&ImageCreateDesc {
            width: img.width,
            height: img.height,
            channels: img.channels,
            is_float: img.is_float,
            mip_count: 1,
            initial_mip: 0,
            data: &data,
        })?;

        img.image = Some(id);
        img.stream = ImageStream {
            current_top_mip: 0,
            residency_mask: 1,
            priority: 0,
        };

        Ok(())
    }

    fn cleanup(&self, am: &AssetManager, asset: &mut AssetAny) {
        if let Some(img) = asset.as_image_mut() {
            if let Some(id) = img.image.take() {
                am.device().destroy_image(id);
            }
            img.pixels = None;
            img.mips = None;
        }
    }

    fn save_blob(
        &self,
        am: &AssetManager,
        handle: Handle,
        asset: &AssetAny,
    ) -> Option<Result<Vec<u8>, Error>> {
        let img = asset.as_image()?;
        Some(save_image(am, handle, img))
    }
}

fn save_image(am: &AssetManager, handle: Handle, img: &ImageAsset) -> Result<Vec<u8>, Error> {
    if img.width == 0 || img.height == 0 || img.channels == 0 {
        return Err(Error::rejected("itex: invalid image dims"));
    }

    // Prefer CPU pixels; pull the uploaded level back from the device when
    // only a GPU copy exists.
    let pixels = match &img.pixels {
        Some(p) => p.clone(),
        None => {
            let id = img
                .image
                .ok_or_else(|| Error::rejected("itex: no pixels and no device image"))?;
            am.device().read_image(id)?
        }
    };

    itex::encode(&itex::ItexSource {
        width: img.width,
        height: img.height,
        channels: img.channels,
        is_float: img.is_float,
        has_alpha: img.has_alpha,
        has_smooth_alpha: img.has_smooth_alpha,
        handle,
        pixels: &pixels,
    })
}
