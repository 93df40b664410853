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

use crate::Error;

pub const MAX_MIPS: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipLevel {
    pub offset: usize,
    pub size: usize,
    pub width: u32,
    pub height: u32,
}

/// Full mip chain in one allocation, tightly packed rows, level 0 first.
#[derive(Debug, Clone)]
pub struct MipChain {
    data: Vec<u8>,
    levels: Vec<MipLevel>,
    bytes_per_pixel: u32,
}

fn mip_count_for(mut w: u32, mut h: u32) -> u32 {
    let mut n = 1;
    while w > 1 || h > 1 {
        if w > 1 {
            w >>= 1;
        }
        if h > 1 {
            h >>= 1;
        }
        n += 1;
        if n >= MAX_MIPS {
            break;
        }
    }
    n
}

fn plan_levels(w: u32, h: u32, bytes_per_pixel: u32) -> Vec<MipLevel> {
    let count = mip_count_for(w, h);
    let mut levels = Vec::with_capacity(count as usize);
    let mut off = 0usize;
    let mut mw = w;
    let mut mh = h;
    for _ in 0..count {
        let size = mw as usize * mh as usize * bytes_per_pixel as usize;
        levels.push(MipLevel {
            offset: off,
            size,
            width: mw,
            height: mh,
        });
        off += size;
        if mw > 1 {
            mw >>= 1;
        }
        if mh > 1 {
            mh >>= 1;
        }
    }
    levels
}

// 2x2 box with border replication; u8 rounds to nearest.
fn downsample_box_u8(dst: &mut [u8], dw: u32, dh: u32, src: &[u8], sw: u32, sh: u32, channels: u32) {
    let c = channels as usize;
    for y in 0..dh {
        let sy0 = (y * 2).min(sh - 1) as usize;
        let sy1 = (y * 2 + 1).min(sh - 1) as usize;
        for x in 0..dw {
            let sx0 = (x * 2).min(sw - 1) as usize;
            let sx1 = (x * 2 + 1).min(sw - 1) as usize;

            let p00 = (sy0 * sw as usize + sx0) * c;
            let p10 = (sy0 * sw as usize + sx1) * c;
            let p01 = (sy1 * sw as usize + sx0) * c;
            let p11 = (sy1 * sw as usize + sx1) * c;

            let d = (y as usize * dw as usize + x as usize) * c;
            for k in 0..c {
                let sum = src[p00 + k] as u32
                    + src[p10 + k] as u32
                    + src[p01 + k] as u32
                    + src[p11 + k] as u32;
                dst[d + k] = ((sum + 2) / 4) as u8;
            }
        }
    }
}

fn downsample_box_f32(
    dst: &mut [f32],
    dw: u32,
    dh: u32,
    src: &[f32],
    sw: u32,
    sh: u32,
    channels: u32,
) {
    let c = channels as usize;
    for y in 0..dh {
        let sy0 = (y * 2).min(sh - 1) as usize;
        let sy1 = (y * 2 + 1).min(sh - 1) as usize;
        for x in 0..dw {
            let sx0 = (x * 2).min(sw - 1) as usize;
            let sx1 = (x * 2 + 1).min(sw - 1) as usize;

            let p00 = (sy0 * sw as usize + sx0) * c;
            let p10 = (sy0 * sw as usize + sx1) * c;
            let p01 = (sy1 * sw as usize + sx0) * c;
            let p11 = (sy1 * sw as usize + sx1) * c;

            let d = (y as usize * dw as usize + x as usize) * c;
            for k in 0..c {
                dst[d + k] = 0.25 * (src[p00 + k] + src[p10 + k] + src[p01 + k] + src[p11 + k]);
            }
        }
    }
}

fn check_build_args(w: u32, h: u32, channels: u32) -> Result<(), Error> {
    if w == 0 || h == 0 {
        return Err(Error::rejected("zero-sized base level"));
    }
    if channels != 1 && channels != 3 && channels != 4 {
        return Err(Error::rejected(format!("unsupported channel count {channels}")));
    }
    Ok(())
}

impl MipChain {
    pub fn build_u8(base: &[u8], w: u32, h: u32, channels: u32) -> Result<Self, Error> {
        check_build_args(w, h, channels)?;
        let levels = plan_levels(w, h, channels);
        if base.len() != levels[0].size {
            return Err(Error::rejected("base level size mismatch"));
        }

        let total: usize = levels.iter().map(|l| l.size).sum();
        let mut data = vec![0u8; total];
        data[..levels[0].size].copy_from_slice(base);

        for i in 1..levels.len() {
            let (head, tail) = data.split_at_mut(levels[i].offset);
            let src = &head[levels[i - 1].offset..levels[i - 1].offset + levels[i - 1].size];
            let dst = &mut tail[..levels[i].size];
            downsample_box_u8(
                dst,
                levels[i].width,
                levels[i].height,
                src,
                levels[i - 1].width,
                levels[i - 1].height,
                channels,
            );
        }

        Ok(Self {
            data,
            levels,
            bytes_per_pixel: channels,
        })
    }

    pub fn build_f32(base: &[f32], w: u32, h: u32, channels: u32) -> Result<Self, Error> {
        check_build_args(w, h, channels)?;
        let bpp = channels * 4;
        let levels = plan_levels(w, h, bpp);
        if base.len() * 4 != levels[0].size {
            return Err(Error::rejected("base level size mismatch"));
        }

        let total_floats: usize = levels.iter().map(|l| l.size / 4).sum();
        let mut floats = vec![0.0f32; total_floats];
        floats[..base.len()].copy_from_slice(base);

        for i in 1..levels.len() {
            let (head, tail) = floats.split_at_mut(levels[i].offset / 4);
            let src = &head[levels[i - 1].offset / 4..(levels[i - 1].offset + levels[i - 1].size) / 4];
            let dst = &mut tail[..levels[i].size / 4];
            downsample_box_f32(
                dst,
                levels[i].width,
                levels[i].height,
                src,
                levels[i - 1].width,
                levels[i - 1].height,
                channels,
            );
        }

        let mut data = Vec::with_capacity(total_floats * 4);
        for v in &floats {
            data.extend_from_slice(&v.to_ne_bytes());
        }

        Ok(Self {
            data,
            levels,
            bytes_per_pixel: bpp,
        })
    }

    pub fn mip_count(&self) -> u32 {
        self.levels.len() as u32
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        self.bytes_per_pixel
    }

    pub fn level(&self, i: u32) -> &MipLevel {
        &self.levels[i as usize]
    }

    pub fn level_data(&self, i: u32) -> &[u8] {
        let l = &self.levels[i as usize];
        &self.data[l.offset..l.offset + l.size]
    }

    pub fn total_size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod test {
    use crate::{mips::mip_count_for, MipChain};

    #[test]
    fn mip_counts() {
        assert_eq!(1, mip_count_for(1, 1));
        assert_eq!(2, mip_count_for(2, 2));
        assert_eq!(2, mip_count_for(2, 1));
        assert_eq!(9, mip_count_for(256, 256));
        assert_eq!(11, mip_count_for(1024, 4));
        assert_eq!(16, mip_count_for(1 << 20, 1 << 20));
    }

    #[test]
    fn chain_2x2_rgba() {
        #[rustfmt::skip]
        let base = [
            255u8, 0, 0, 255,  0, 255, 0, 255,
            0, 0, 255, 255,    255, 255, 255, 255,
        ];
        let chain = MipChain::build_u8(&base, 2, 2, 4).unwrap();
        assert_eq!(2, chain.mip_count());
        assert_eq!(&base[..], chain.level_data(0));
        assert_eq!(1, chain.level(1).width);
        assert_eq!(1, chain.level(1).height);
        // (a + b + c + d + 2) / 4 per channel
        assert_eq!(&[128, 128, 128, 255], chain.level_data(1));
        assert_eq!(base.len() + 4, chain.total_size());
    }

    #[test]
    fn odd_dims_replicate_border() {
        // 3x1, single channel: level 1 is 1x1 sampling columns {0,1} only.
        let chain = MipChain::build_u8(&[10, 20, 200], 3, 1, 1).unwrap();
        assert_eq!(2, chain.mip_count());
        assert_eq!(1, chain.level(1).width);
        // rows replicate, so sum = 10 + 20 + 10 + 20 + 2 -> 15
        assert_eq!(&[15], chain.level_data(1));
    }

    #[test]
    fn sizes_are_tightly_packed() {
        let base = vec![0u8; 8 * 4 * 3];
        let chain = MipChain::build_u8(&base, 8, 4, 3).unwrap();
        assert_eq!(4, chain.mip_count());
        let expected: usize = [(8, 4), (4, 2), (2, 1), (1, 1)]
            .iter()
            .map(|(w, h)| w * h * 3)
            .sum();
        assert_eq!(expected, chain.total_size());
        for i in 0..chain.mip_count() {
            assert_eq!(
                chain.level(i).size,
                chain.level(i).width as usize * chain.level(i).height as usize * 3
            );
        }
    }

    #[test]
    fn f32_chain_uses_mean() {
        let base = [1.0f32, 0.0, 0.0, 3.0, 0.0, 0.0, 5.0, 0.0, 0.0, 7.0, 0.0, 0.0];
        let chain = MipChain::build_f32(&base, 2, 2, 3).unwrap();
        assert_eq!(2, chain.mip_count());
        let level1 = chain.level_data(1);
        let r = f32::from_ne_bytes(level1[0..4].try_into().unwrap());
        assert_eq!(4.0, r);
        assert_eq!(12, chain.bytes_per_pixel());
    }

    #[test]
    fn rejects_bad_channels() {
        assert!(MipChain::build_u8(&[0, 0], 1, 1, 2).is_err());
        assert!(MipChain::build_u8(&[], 0, 1, 4).is_err());
    }
}
