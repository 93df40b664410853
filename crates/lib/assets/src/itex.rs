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

//! `.itex` single-image container: a 56-byte packed little-endian header
//! followed by a zlib-deflated copy of the tightly packed base level.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use kyanite_common::Handle;

use crate::Error;

pub const ITEX_MAGIC: u32 = 0x5845_5449; // 'I' 'T' 'E' 'X'
pub const ITEX_VERSION: u16 = 1;
pub const ITEX_HEADER_SIZE: u16 = 56;

#[derive(Debug, Clone)]
pub struct ItexImage {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub is_float: bool,
    pub has_alpha: bool,
    pub has_smooth_alpha: bool,
    /// Handle the image was saved under, carried through for pack tooling.
    pub handle: Handle,
    pub pixels: Vec<u8>,
}

pub fn bytes_per_pixel(channels: u32, is_float: bool) -> u32 {
    if is_float {
        channels * 4
    } else {
        channels
    }
}

fn check_dims(width: u32, height: u32, channels: u32) -> Result<(), Error> {
    if width == 0 || height == 0 {
        return Err(Error::rejected("zero-sized image"));
    }
    if channels != 1 && channels != 3 && channels != 4 {
        return Err(Error::rejected(format!("unsupported channel count {channels}")));
    }
    Ok(())
}

#[derive(Debug)]
pub struct ItexSource<'a> {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub is_float: bool,
    pub has_alpha: bool,
    pub has_smooth_alpha: bool,
    pub handle: Handle,
    pub pixels: &'a [u8],
}

pub fn encode(src: &ItexSource) -> Result<Vec<u8>, Error> {
    check_dims(src.width, src.height, src.channels)?;

    let bpp = bytes_per_pixel(src.channels, src.is_float) as usize;
    let expected = src.width as usize * src.height as usize * bpp;
    if src.pixels.len() != expected {
        return Err(Error::rejected("pixel buffer size mismatch"));
    }
    if expected > u32::MAX as usize {
        return Err(Error::rejected("image too large for container"));
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(1));
    encoder.write_all(src.pixels)?;
    let compressed = encoder.finish()?;
    if compressed.len() > u32::MAX as usize {
        return Err(Error::rejected("compressed payload too large"));
    }

    let mut out = Vec::with_capacity(ITEX_HEADER_SIZE as usize + compressed.len());
    out.write_u32::<LittleEndian>(ITEX_MAGIC)?;
    out.write_u16::<LittleEndian>(ITEX_VERSION)?;
    out.write_u16::<LittleEndian>(ITEX_HEADER_SIZE)?;
    out.write_u32::<LittleEndian>(src.width)?;
    out.write_u32::<LittleEndian>(src.height)?;
    out.write_u32::<LittleEndian>(src.channels)?;
    out.write_u32::<LittleEndian>(src.is_float as u32)?;
    out.write_u32::<LittleEndian>(src.has_alpha as u32)?;
    out.write_u32::<LittleEndian>(src.has_smooth_alpha as u32)?;
    out.write_u32::<LittleEndian>(expected as u32)?;
    out.write_u32::<LittleEndian>(compressed.len() as u32)?;
    out.write_u32::<LittleEndian>(src.handle.value())?;
    out.write_u16::<LittleEndian>(src.handle.ty())?;
    out.write_u16::<LittleEndian>(src.handle.meta())?;
    out.write_u32::<LittleEndian>(0)?; // reserved0
    out.write_u32::<LittleEndian>(0)?; // reserved1
    debug_assert_eq!(ITEX_HEADER_SIZE as usize, out.len());
    out.extend_from_slice(&compressed);

    Ok(out)
}

pub fn decode(data: &[u8]) -> Result<ItexImage, Error> {
    if data.len() < ITEX_HEADER_SIZE as usize {
        return Err(Error::corrupt("itex: file shorter than header"));
    }

    let mut r = Cursor::new(data);
    let magic = r.read_u32::<LittleEndian>()?;
    let version = r.read_u16::<LittleEndian>()?;
    let header_size = r.read_u16::<LittleEndian>()?;
    if magic != ITEX_MAGIC || version != ITEX_VERSION || header_size != ITEX_HEADER_SIZE {
        return Err(Error::corrupt("itex: bad header"));
    }

    let width = r.read_u32::<LittleEndian>()?;
    let height = r.read_u32::<LittleEndian>()?;
    let channels = r.read_u32::<LittleEndian>()?;
    let is_float = r.read_u32::<LittleEndian>()?;
    let has_alpha = r.read_u32::<LittleEndian>()?;
    let has_smooth_alpha = r.read_u32::<LittleEndian>()?;
    let uncompressed_size = r.read_u32::<LittleEndian>()?;
    let compressed_size = r.read_u32::<LittleEndian>()?;
    let handle_value = r.read_u32::<LittleEndian>()?;
    let handle_type = r.read_u16::<LittleEndian>()?;
    let handle_meta = r.read_u16::<LittleEndian>()?;
    let reserved0 = r.read_u32::<LittleEndian>()?;
    let reserved1 = r.read_u32::<LittleEndian>()?;

    check_dims(width, height, channels).map_err(|_| Error::corrupt("itex: bad dims"))?;
    if is_float > 1 || reserved0 != 0 || reserved1 != 0 {
        return Err(Error::corrupt("itex: bad header fields"));
    }
    if uncompressed_size == 0 || compressed_size == 0 {
        return Err(Error::corrupt("itex: bad payload sizes"));
    }

    let bpp = bytes_per_pixel(channels, is_float != 0);
    let expected = width as u64 * height as u64 * bpp as u64;
    if expected != uncompressed_size as u64 {
        return Err(Error::corrupt("itex: size does not match dims"));
    }

    let payload_start = ITEX_HEADER_SIZE as usize;
    let payload_end = payload_start + compressed_size as usize;
    if payload_end > data.len() {
        return Err(Error::corrupt("itex: payload exceeds file"));
    }

    let mut pixels = Vec::with_capacity(uncompressed_size as usize);
    let mut decoder =
        ZlibDecoder::new(&data[payload_start..payload_end]).take(uncompressed_size as u64 + 1);
    decoder
        .read_to_end(&mut pixels)
        .map_err(|_| Error::corrupt("itex: decompression failed"))?;
    if pixels.len() != uncompressed_size as usize {
        return Err(Error::corrupt("itex: decompressed size mismatch"));
    }

    Ok(ItexImage {
        width,
        height,
        channels,
        is_float: is_float != 0,
        has_alpha: has_alpha != 0,
        has_smooth_alpha: has_smooth_alpha != 0,
        handle: Handle::from_parts(handle_value, handle_type, handle_meta),
        pixels,
    })
}

#[cfg(test)]
mod test {
    use kyanite_common::Handle;

    use crate::itex::{decode, encode, ItexSource, ITEX_HEADER_SIZE};

    fn source(pixels: &[u8], width: u32, height: u32, channels: u32) -> ItexSource {
        ItexSource {
            width,
            height,
            channels,
            is_float: false,
            has_alpha: false,
            has_smooth_alpha: false,
            handle: Handle::new(1, 3, 1),
            pixels,
        }
    }

    #[test]
    fn roundtrip_rgba() {
        #[rustfmt::skip]
        let pixels = [
            255u8, 0, 0, 255,  0, 255, 0, 255,
            0, 0, 255, 255,    255, 255, 255, 255,
        ];
        let blob = encode(&source(&pixels, 2, 2, 4)).unwrap();
        assert_eq!(&[0x49, 0x54, 0x45, 0x58, 0x01, 0x00, 0x38, 0x00], &blob[..8]);

        let img = decode(&blob).unwrap();
        assert_eq!((2, 2, 4), (img.width, img.height, img.channels));
        assert!(!img.is_float);
        assert_eq!(&pixels[..], &img.pixels[..]);
        assert_eq!(Handle::new(1, 3, 1), img.handle);
    }

    #[test]
    fn roundtrip_single_channel_and_rgb() {
        for channels in [1u32, 3] {
            let pixels: Vec<u8> = (0..4 * 3 * channels as usize).map(|i| i as u8).collect();
            let blob = encode(&source(&pixels, 4, 3, channels)).unwrap();
            let img = decode(&blob).unwrap();
            assert_eq!(channels, img.channels);
            assert_eq!(pixels, img.pixels);
        }
    }

    #[test]
    fn roundtrip_float_rgb() {
        let floats: Vec<f32> = (0..2 * 2 * 3).map(|i| i as f32 * 0.5).collect();
        let mut pixels = Vec::new();
        for f in &floats {
            pixels.extend_from_slice(&f.to_ne_bytes());
        }
        let blob = encode(&ItexSource {
            is_float: true,
            ..source(&pixels, 2, 2, 3)
        })
        .unwrap();
        let img = decode(&blob).unwrap();
        assert!(img.is_float);
        assert_eq!(pixels, img.pixels);
    }

    #[test]
    fn file_length_is_header_plus_payload() {
        let pixels = [0u8; 16];
        let blob = encode(&source(&pixels, 2, 2, 4)).unwrap();
        let mut compressed_size = [0u8; 4];
        compressed_size.copy_from_slice(&blob[36..40]);
        let compressed_size = u32::from_le_bytes(compressed_size) as usize;
        assert_eq!(ITEX_HEADER_SIZE as usize + compressed_size, blob.len());
    }

    #[test]
    fn rejects_corruption() {
        let pixels = [0u8; 16];
        let blob = encode(&source(&pixels, 2, 2, 4)).unwrap();

        let mut bad_magic = blob.clone();
        bad_magic[0] ^= 0xFF;
        assert!(decode(&bad_magic).is_err());

        let mut bad_version = blob.clone();
        bad_version[4] = 9;
        assert!(decode(&bad_version).is_err());

        let truncated = &blob[..blob.len() - 1];
        assert!(decode(truncated).is_err());

        let mut bad_size = blob.clone();
        bad_size[32] ^= 0x01; // uncompressed_size no longer matches dims
        assert!(decode(&bad_size).is_err());

        assert!(decode(&blob[..10]).is_err());
    }

    #[test]
    fn rejects_bad_source() {
        assert!(encode(&source(&[0u8; 3], 2, 2, 4)).is_err());
        assert!(encode(&source(&[0u8; 8], 2, 1, 2)).is_err());
    }
}
