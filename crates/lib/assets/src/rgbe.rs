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

//! Radiance RGBE ingestion for in-memory `.hdr` buffers.

use crate::Error;

/// RLE scanline markers only exist for this width range.
pub const MIN_RLE_WIDTH: u32 = 8;
pub const MAX_RLE_WIDTH: u32 = 32767;

struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn byte(&mut self) -> Result<u8, Error> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or_else(|| Error::decode("truncated hdr stream"))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        if self.pos + n > self.data.len() {
            return Err(Error::decode("truncated hdr stream"));
        }
        let s = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn line(&mut self) -> Result<&'a str, Error> {
        let start = self.pos;
        while self.pos < self.data.len() && self.data[self.pos] != b'\n' {
            self.pos += 1;
        }
        if self.pos >= self.data.len() {
            return Err(Error::decode("truncated hdr header"));
        }
        let s = std::str::from_utf8(&self.data[start..self.pos])
            .map_err(|_| Error::decode("non-ascii hdr header"))?;
        self.pos += 1;
        Ok(s.trim_end_matches('\r'))
    }
}

fn parse_resolution_line(line: &str) -> Option<(u32, u32)> {
    // "-Y <h> +X <w>" with either sign on both axes.
    let mut it = line.split_whitespace();
    let ya = it.next()?;
    let h: i64 = it.next()?.parse().ok()?;
    let xa = it.next()?;
    let w: i64 = it.next()?.parse().ok()?;
    if !matches!(ya, "-Y" | "+Y") || !matches!(xa, "-X" | "+X") {
        return None;
    }
    if w <= 0 || h <= 0 || w > u32::MAX as i64 || h > u32::MAX as i64 {
        return None;
    }
    Some((w as u32, h as u32))
}

/// Reads one RLE scanline into `width` RGBE quads.
fn read_scanline_rle(r: &mut ByteReader, out: &mut [u8], width: u32) -> Result<(), Error> {
    if !(MIN_RLE_WIDTH..=MAX_RLE_WIDTH).contains(&width) {
        return Err(Error::decode(format!("hdr scanline width {width} out of range")));
    }

    let hdr = r.take(4)?;
    if hdr[0] != 2 || hdr[1] != 2 || (hdr[2] & 0x80) != 0 {
        return Err(Error::decode("missing hdr rle scanline marker"));
    }
    let w = ((hdr[2] as u32) << 8) | hdr[3] as u32;
    if w != width {
        return Err(Error::decode("hdr scanline width mismatch"));
    }

    // Four channel runs, planar.
    let width = width as usize;
    let mut planar = vec![0u8; width * 4];
    for c in 0..4 {
        let chan = &mut planar[c * width..(c + 1) * width];
        let mut x = 0usize;
        while x < width {
            let count = r.byte()? as usize;
            if count > 128 {
                let run = count - 128;
                let v = r.byte()?;
                if x + run > width {
                    return Err(Error::decode("hdr rle run overflows scanline"));
                }
                chan[x..x + run].fill(v);
                x += run;
            } else {
                let run = count;
                if run == 0 || x + run > width {
                    return Err(Error::decode("hdr rle run overflows scanline"));
                }
                chan[x..x + run].copy_from_slice(r.take(run)?);
                x += run;
            }
        }
    }

    for x in 0..width {
        out[x * 4] = planar[x];
        out[x * 4 + 1] = planar[width + x];
        out[x * 4 + 2] = planar[2 * width + x];
        out[x * 4 + 3] = planar[3 * width + x];
    }

    Ok(())
}

pub fn rgbe_to_rgb(rgbe: [u8; 4]) -> [f32; 3] {
    let e = rgbe[3];
    if e == 0 {
        return [0.0, 0.0, 0.0];
    }
    let scale = f32::exp2(e as f32 - 136.0);
    [
        rgbe[0] as f32 * scale,
        rgbe[1] as f32 * scale,
        rgbe[2] as f32 * scale,
    ]
}

/// Decodes an in-memory Radiance file to float RGB, top row first.
pub fn decode_rgb(data: &[u8]) -> Result<(Vec<f32>, u32, u32), Error> {
    let mut r = ByteReader { data, pos: 0 };

    let signature = r.line()?;
    if !signature.starts_with("#?") {
        return Err(Error::decode("missing radiance signature"));
    }
    // Header lines until the blank separator, then the resolution line.
    loop {
        let line = r.line()?;
        if line.is_empty() {
            break;
        }
    }
    let (w, h) = parse_resolution_line(r.line()?)
        .ok_or_else(|| Error::decode("bad radiance resolution line"))?;

    let mut out = Vec::with_capacity(w as usize * h as usize * 3);
    let mut scan = vec![0u8; w as usize * 4];
    for _ in 0..h {
        read_scanline_rle(&mut r, &mut scan, w)?;
        for quad in scan.chunks_exact(4) {
            let rgb = rgbe_to_rgb([quad[0], quad[1], quad[2], quad[3]]);
            out.extend_from_slice(&rgb);
        }
    }

    Ok((out, w, h))
}

#[cfg(test)]
mod test {
    use crate::rgbe::{decode_rgb, parse_resolution_line, rgbe_to_rgb};

    fn encode_test_hdr(w: u32, h: u32, rows: &[Vec<[u8; 4]>]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"#?RADIANCE\n");
        data.extend_from_slice(b"FORMAT=32-bit_rle_rgbe\n");
        data.extend_from_slice(b"\n");
        data.extend_from_slice(format!("-Y {h} +X {w}\n").as_bytes());
        for row in rows {
            data.extend_from_slice(&[2, 2, (w >> 8) as u8, (w & 0xFF) as u8]);
            for c in 0..4 {
                // One literal run per channel.
                data.push(w as u8);
                for px in row {
                    data.push(px[c]);
                }
            }
        }
        data
    }

    #[test]
    fn resolution_line_variants() {
        assert_eq!(Some((512, 256)), parse_resolution_line("-Y 256 +X 512"));
        assert_eq!(Some((512, 256)), parse_resolution_line("+Y 256 -X 512"));
        assert_eq!(None, parse_resolution_line("-Z 256 +X 512"));
        assert_eq!(None, parse_resolution_line("-Y 0 +X 512"));
    }

    #[test]
    fn rgbe_conversion() {
        assert_eq!([0.0, 0.0, 0.0], rgbe_to_rgb([12, 200, 3, 0]));
        // e = 136 makes the scale exactly 1.
        let rgb = rgbe_to_rgb([128, 64, 32, 136]);
        assert_eq!([128.0, 64.0, 32.0], rgb);
    }

    #[test]
    fn decode_rle_image() {
        let row: Vec<[u8; 4]> = (0..8).map(|i| [i as u8, 0, 255 - i as u8, 136]).collect();
        let data = encode_test_hdr(8, 2, &[row.clone(), row]);
        let (rgb, w, h) = decode_rgb(&data).unwrap();
        assert_eq!((8, 2), (w, h));
        assert_eq!(8 * 2 * 3, rgb.len());
        assert_eq!(0.0, rgb[0]);
        assert_eq!(255.0, rgb[2]);
        assert_eq!(7.0, rgb[7 * 3]);
    }

    #[test]
    fn rejects_tiny_width() {
        let row: Vec<[u8; 4]> = (0..4).map(|_| [1, 2, 3, 136]).collect();
        let data = encode_test_hdr(4, 1, &[row]);
        assert!(decode_rgb(&data).is_err());
    }

    #[test]
    fn rejects_missing_marker() {
        let mut data = Vec::new();
        data.extend_from_slice(b"#?RADIANCE\n\n-Y 1 +X 8\n");
        data.extend_from_slice(&[0u8; 8]);
        assert!(decode_rgb(&data).is_err());
    }
}
