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

//! Generic decoded-image importer. LDR sources become 4-channel u8, HDR
//! sources 3-channel f32; the full mip chain is built at load time and only
//! the lowest level is made resident at init (the streamer pulls the rest).

use std::io::Cursor;

use kyanite_assets::{
    pixels, rgbe, AssetAny, AssetPayload, AssetType, Error, ImageAsset, ImageStream, MipChain,
};
use kyanite_backend::ImageCreateDesc;

use crate::{loaders::path_has_ext_ci, AssetManager, AssetModule, ImageMemory, LoadInput};

const IMAGE_EXTS: &[&str] = &[
    ".hdr", ".png", ".jpg", ".jpeg", ".bmp", ".tga", ".psd", ".gif", ".pic", ".pgm", ".ppm",
];

const HDR_MAX_DIM: u32 = 16384;
const HDR_MAX_PIXELS: u64 = 60_000_000;

const DILATE_PASSES: u32 = 6;

pub struct ImageModule;

fn check_hdr_limits(width: u32, height: u32) -> Result<(), Error> {
    let pixels = width as u64 * height as u64;
    if width > HDR_MAX_DIM || height > HDR_MAX_DIM || pixels > HDR_MAX_PIXELS {
        return Err(Error::rejected(format!(
            "hdr image too big to load ({width}x{height}); limits are {HDR_MAX_DIM}x{HDR_MAX_DIM} and {} MP",
            HDR_MAX_PIXELS / 1_000_000
        )));
    }
    Ok(())
}

fn image_from_ldr_bytes(bytes: &[u8]) -> Result<ImageAsset, Error> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|err| Error::decode(err.to_string()))?
        .to_rgba8();
    let (width, height) = decoded.dimensions();
    let mut rgba = decoded.into_raw();

    let has_alpha = pixels::has_any_alpha(&rgba);
    let has_smooth_alpha = has_alpha && pixels::has_smooth_alpha(&rgba);
    if has_alpha {
        pixels::dilate_rgb_into_zero_alpha(&mut rgba, width, height, DILATE_PASSES);
    }

    let mips = MipChain::build_u8(&rgba, width, height, 4)?;

    Ok(ImageAsset {
        width,
        height,
        channels: 4,
        is_float: false,
        has_alpha,
        has_smooth_alpha,
        pixels: None,
        image: None,
        mips: Some(mips),
        stream: ImageStream::default(),
    })
}

fn image_from_hdr_bytes(bytes: &[u8]) -> Result<ImageAsset, Error> {
    let reader = image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(Error::Io)?;
    let (width, height) = reader
        .into_dimensions()
        .map_err(|err| Error::decode(err.to_string()))?;
    check_hdr_limits(width, height)?;

    let decoded = image::load_from_memory(bytes)
        .map_err(|err| Error::decode(err.to_string()))?
        .to_rgb32f();
    let data = decoded.into_raw();
    let mips = MipChain::build_f32(&data, width, height, 3)?;

    Ok(ImageAsset {
        width,
        height,
        channels: 3,
        is_float: true,
        has_alpha: false,
        has_smooth_alpha: false,
        pixels: None,
        image: None,
        mips: Some(mips),
        stream: ImageStream::default(),
    })
}

/// In-memory Radiance buffers go through the bespoke RGBE/RLE reader.
fn image_from_rgbe_bytes(bytes: &[u8]) -> Result<ImageAsset, Error> {
    let (rgb, width, height) = rgbe::decode_rgb(bytes)?;
    check_hdr_limits(width, height)?;
    let mips = MipChain::build_f32(&rgb, width, height, 3)?;

    Ok(ImageAsset {
        width,
        height,
        channels: 3,
        is_float: true,
        has_alpha: false,
        has_smooth_alpha: false,
        pixels: None,
        image: None,
        mips: Some(mips),
        stream: ImageStream::default(),
    })
}

fn is_radiance(bytes: &[u8]) -> bool {
    bytes.starts_with(b"#?")
}

impl AssetModule for ImageModule {
    fn asset_type(&self) -> AssetType {
        AssetType::Image
    }

    fn name(&self) -> &'static str {
        "image"
    }

    fn can_load(&self, _am: &AssetManager, input: &LoadInput) -> bool {
        match input {
            LoadInput::Path(path) => IMAGE_EXTS.iter().any(|ext| path_has_ext_ci(path, ext)),
            LoadInput::Memory(_) => input
                .memory::<ImageMemory>()
                .map(|mem| {
                    !mem.bytes.is_empty()
                        && (is_radiance(&mem.bytes)
                            || image::guess_format(&mem.bytes).is_ok())
                })
                .unwrap_or(false),
        }
    }

    fn load(&self, _am: &AssetManager, input: &LoadInput) -> Result<AssetAny, Error> {
        let image = match input {
            LoadInput::Path(path) => {
                let bytes = std::fs::read(path)?;
                if path_has_ext_ci(path, ".hdr") || is_radiance(&bytes) {
                    image_from_hdr_bytes(&bytes)?
                } else {
                    image_from_ldr_bytes(&bytes)?
                }
            }
            LoadInput::Memory(_) => {
                let mem = input
                    .memory::<ImageMemory>()
                    .ok_or_else(|| Error::rejected("unknown descriptor"))?;
                if is_radiance(&mem.bytes) {
                    image_from_rgbe_bytes(&mem.bytes)?
                } else {
                    image_from_ldr_bytes(&mem.bytes)?
                }
            }
        };

        Ok(AssetAny::loading(AssetPayload::Image(image)))
    }

    fn init(&self, am: &AssetManager, asset: &mut AssetAny) -> Result<(), Error> {
        let img = asset
            .as_image_mut()
            .ok_or_else(|| Error::rejected("expected an image payload"))?;
        if img.image.is_some() {
            return Ok(());
        }

        let mips = img
            .mips
            .as_ref()
            .ok_or_else(|| Error::rejected("image has no mip chain"))?;
        let mip_count = mips.mip_count();
        let lowest = mip_count - 1;

        let id = am.device().create_image(&ImageCreateDesc {
            width: img.width,
            height: img.height,
            channels: img.channels,
            is_float: img.is_float,
            mip_count,
            initial_mip: lowest,
            data: mips.level_data(lowest),
        })?;

        img.image = Some(id);
        img.pixels = None;
        img.stream = ImageStream {
            current_top_mip: lowest,
            residency_mask: if lowest < 64 { 1u64 << lowest } else { 0 },
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
}

#[cfg(test)]
mod test {
    use crate::loaders::image::{
        check_hdr_limits, image_from_ldr_bytes, image_from_rgbe_bytes, is_radiance,
    };

    fn png_bytes(pixels: &[u8], w: u32, h: u32) -> Vec<u8> {
        let mut out = Vec::new();
        let img = image::RgbaImage::from_raw(w, h, pixels.to_vec()).unwrap();
        img.write_to(
            &mut std::io::Cursor::new(&mut out),
            image::ImageOutputFormat::Png,
        )
        .unwrap();
        out
    }

    #[test]
    fn opaque_png_decodes_with_mips() {
        #[rustfmt::skip]
        let pixels = [
            255u8, 0, 0, 255,  0, 255, 0, 255,
            0, 0, 255, 255,    255, 255, 255, 255,
        ];
        let img = image_from_ldr_bytes(&png_bytes(&pixels, 2, 2)).unwrap();
        assert_eq!((2, 2, 4), (img.width, img.height, img.channels));
        assert!(!img.is_float && !img.has_alpha && !img.has_smooth_alpha);

        let mips = img.mips.as_ref().unwrap();
        assert_eq!(2, mips.mip_count());
        assert_eq!(&pixels[..], mips.level_data(0));
        assert_eq!(&[128, 128, 128, 255], mips.level_data(1));
    }

    #[test]
    fn transparent_center_is_dilated() {
        let mut pixels = Vec::new();
        for i in 0..9 {
            if i == 4 {
                pixels.extend_from_slice(&[0u8, 0, 0, 0]);
            } else {
                pixels.extend_from_slice(&[255u8, 0, 0, 255]);
            }
        }
        let img = image_from_ldr_bytes(&png_bytes(&pixels, 3, 3)).unwrap();
        assert!(img.has_alpha);
        assert!(!img.has_smooth_alpha);
        let base = img.mips.as_ref().unwrap().level_data(0);
        assert_eq!(&[255, 0, 0, 0], &base[4 * 4..4 * 4 + 4]);
    }

    #[test]
    fn smooth_alpha_is_flagged() {
        let pixels = [10u8, 20, 30, 128, 10, 20, 30, 255];
        let img = image_from_ldr_bytes(&png_bytes(&pixels, 2, 1)).unwrap();
        assert!(img.has_alpha && img.has_smooth_alpha);
    }

    #[test]
    fn hdr_limits() {
        assert!(check_hdr_limits(16384, 3000).is_ok());
        assert!(check_hdr_limits(16385, 16).is_err());
        assert!(check_hdr_limits(16, 16385).is_err());
        assert!(check_hdr_limits(16000, 16000).is_err());
    }

    #[test]
    fn radiance_memory_decode() {
        let mut data = Vec::new();
        data.extend_from_slice(b"#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n\n-Y 1 +X 8\n");
        data.extend_from_slice(&[2, 2, 0, 8]);
        for c in 0..4u8 {
            data.push(8);
            for x in 0..8u8 {
                data.push(if c == 3 { 136 } else { x });
            }
        }
        assert!(is_radiance(&data));
        let img = image_from_rgbe_bytes(&data).unwrap();
        assert!(img.is_float);
        assert_eq!((8, 1, 3), (img.width, img.height, img.channels));
        assert_eq!(4, img.mips.as_ref().unwrap().mip_count());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(image_from_ldr_bytes(b"not an image").is_err());
    }
}
