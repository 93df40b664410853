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

use kyanite_backend::ImageId;

use crate::MipChain;

/// Residency bookkeeping for the mip streaming system. The asset core only
/// seeds these at init; the streamer consumes Ready handles elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageStream {
    pub current_top_mip: u32,
    pub residency_mask: u64,
    pub priority: u32,
}

#[derive(Debug, Default)]
pub struct ImageAsset {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub is_float: bool,
    pub has_alpha: bool,
    pub has_smooth_alpha: bool,

    /// Base-level pixels when the image came from a container that stores a
    /// single level; freed after upload.
    pub pixels: Option<Vec<u8>>,
    pub image: Option<ImageId>,
    pub mips: Option<MipChain>,

    pub stream: ImageStream,
}

impl ImageAsset {
    pub fn bytes_per_pixel(&self) -> u32 {
        if self.is_float {
            self.channels * 4
        } else {
            self.channels
        }
    }

    pub fn mip_count(&self) -> u32 {
        self.mips.as_ref().map(|m| m.mip_count()).unwrap_or(1)
    }
}
