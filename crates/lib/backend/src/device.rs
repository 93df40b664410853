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

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;

use crate::BackendError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(u64);

impl ImageId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl BufferId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Vertex,
    Index,
}

#[derive(Debug)]
pub struct ImageCreateDesc<'a> {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub is_float: bool,
    /// Storage is allocated for the whole chain even when only one level is
    /// uploaded now.
    pub mip_count: u32,
    /// Mip level `data` fills.
    pub initial_mip: u32,
    pub data: &'a [u8],
}

#[derive(Debug)]
pub struct BufferCreateDesc<'a> {
    pub kind: BufferKind,
    pub data: &'a [u8],
}

/// The device surface the asset core drives.
///
/// Init and cleanup hooks run on the thread that owns the device context;
/// worker threads never see this trait.
pub trait RenderDevice: Send + Sync {
    fn create_image(&self, desc: &ImageCreateDesc) -> Result<ImageId, BackendError>;
    fn destroy_image(&self, image: ImageId);
    /// Reads back the level uploaded at creation, for container save paths.
    fn read_image(&self, image: ImageId) -> Result<Vec<u8>, BackendError>;

    fn create_buffer(&self, desc: &BufferCreateDesc) -> Result<BufferId, BackendError>;
    fn destroy_buffer(&self, buffer: BufferId);
    fn read_buffer(&self, buffer: BufferId) -> Result<Vec<u8>, BackendError>;
}

/// Device that keeps uploads in host memory. Backs tests and offline tools
/// (pack building, save paths) where no GPU context exists.
#[derive(Default)]
pub struct HeadlessDevice {
    next_id: AtomicU64,
    images: Mutex<HashMap<u64, Vec<u8>>>,
    buffers: Mutex<HashMap<u64, Vec<u8>>>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alive_images(&self) -> usize {
        self.images.lock().len()
    }

    pub fn alive_buffers(&self) -> usize {
        self.buffers.lock().len()
    }

    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl RenderDevice for HeadlessDevice {
    fn create_image(&self, desc: &ImageCreateDesc) -> Result<ImageId, BackendError> {
        if desc.data.is_empty() || desc.width == 0 || desc.height == 0 {
            return Err(BackendError::BadUpload);
        }
        let id = self.next();
        self.images.lock().insert(id, desc.data.to_vec());

        Ok(ImageId(id))
    }

    fn destroy_image(&self, image: ImageId) {
        self.images.lock().remove(&image.0);
    }

    fn read_image(&self, image: ImageId) -> Result<Vec<u8>, BackendError> {
        self.images
            .lock()
            .get(&image.0)
            .cloned()
            .ok_or(BackendError::InvalidResource)
    }

    fn create_buffer(&self, desc: &BufferCreateDesc) -> Result<BufferId, BackendError> {
        if desc.data.is_empty() {
            return Err(BackendError::BadUpload);
        }
        let id = self.next();
        self.buffers.lock().insert(id, desc.data.to_vec());

        Ok(BufferId(id))
    }

    fn destroy_buffer(&self, buffer: BufferId) {
        self.buffers.lock().remove(&buffer.0);
    }

    fn read_buffer(&self, buffer: BufferId) -> Result<Vec<u8>, BackendError> {
        self.buffers
            .lock()
            .get(&buffer.0)
            .cloned()
            .ok_or(BackendError::InvalidResource)
    }
}

#[cfg(test)]
mod test {
    use crate::{BufferCreateDesc, BufferKind, HeadlessDevice, ImageCreateDesc, RenderDevice};

    #[test]
    fn image_upload_readback() {
        let device = HeadlessDevice::new();
        let image = device
            .create_image(&ImageCreateDesc {
                width: 2,
                height: 1,
                channels: 4,
                is_float: false,
                mip_count: 1,
                initial_mip: 0,
                data: &[1, 2, 3, 4, 5, 6, 7, 8],
            })
            .unwrap();
        assert_eq!(1, device.alive_images());
        assert_eq!(vec![1, 2, 3, 4, 5, 6, 7, 8], device.read_image(image).unwrap());
        device.destroy_image(image);
        assert_eq!(0, device.alive_images());
        assert!(device.read_image(image).is_err());
    }

    #[test]
    fn buffer_upload_readback() {
        let device = HeadlessDevice::new();
        let buffer = device
            .create_buffer(&BufferCreateDesc {
                kind: BufferKind::Index,
                data: &[0, 0, 0, 0],
            })
            .unwrap();
        assert_eq!(vec![0, 0, 0, 0], device.read_buffer(buffer).unwrap());
        device.destroy_buffer(buffer);
        assert_eq!(0, device.alive_buffers());
    }

    #[test]
    fn empty_upload_is_rejected() {
        let device = HeadlessDevice::new();
        assert!(device
            .create_buffer(&BufferCreateDesc {
                kind: BufferKind::Vertex,
                data: &[],
            })
            .is_err());
    }
}
