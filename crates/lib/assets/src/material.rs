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

use bitflags::bitflags;
use glam::Vec3;
use kyanite_common::Handle;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MaterialFlags: u32 {
        const ALPHA_CUTOUT = 1 << 0;
        const DOUBLE_SIDED = 1 << 1;
        const ALPHA_BLEND = 1 << 2;
    }
}

/// Surface description consumed by the renderer. Every external reference is
/// a handle, never a pointer, so materials, models and textures can point at
/// each other without ownership cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialAsset {
    pub shader_id: u8,
    pub flags: MaterialFlags,
    pub name: String,

    pub albedo: Vec3,
    pub emissive: Vec3,
    pub roughness: f32,
    pub metallic: f32,
    pub opacity: f32,
    pub alpha_cutoff: f32,

    pub normal_strength: f32,
    pub height_scale: f32,
    pub height_steps: u32,

    pub albedo_tex: Handle,
    pub normal_tex: Handle,
    pub metallic_tex: Handle,
    pub roughness_tex: Handle,
    pub emissive_tex: Handle,
    pub occlusion_tex: Handle,
    pub height_tex: Handle,
    pub arm_tex: Handle,
}

impl MaterialAsset {
    pub fn with_shader(shader_id: u8) -> Self {
        Self {
            shader_id,
            flags: MaterialFlags::empty(),
            name: "default".to_owned(),
            albedo: Vec3::ONE,
            emissive: Vec3::ZERO,
            roughness: 1.0,
            metallic: 0.0,
            opacity: 1.0,
            alpha_cutoff: 0.1,
            normal_strength: 1.0,
            height_scale: 0.03,
            height_steps: 24,
            albedo_tex: Handle::invalid(),
            normal_tex: Handle::invalid(),
            metallic_tex: Handle::invalid(),
            roughness_tex: Handle::invalid(),
            emissive_tex: Handle::invalid(),
            occlusion_tex: Handle::invalid(),
            height_tex: Handle::invalid(),
            arm_tex: Handle::invalid(),
        }
    }

    pub fn texture_handles(&self) -> [Handle; 8] {
        [
            self.albedo_tex,
            self.normal_tex,
            self.metallic_tex,
            self.roughness_tex,
            self.emissive_tex,
            self.occlusion_tex,
            self.height_tex,
            self.arm_tex,
        ]
    }
}

impl Default for MaterialAsset {
    fn default() -> Self {
        Self::with_shader(0)
    }
}

#[cfg(test)]
mod test {
    use glam::Vec3;

    use crate::{MaterialAsset, MaterialFlags};

    #[test]
    fn defaults() {
        let m = MaterialAsset::default();
        assert_eq!(0, m.shader_id);
        assert_eq!(MaterialFlags::empty(), m.flags);
        assert_eq!(Vec3::ONE, m.albedo);
        assert_eq!(1.0, m.roughness);
        assert_eq!(0.0, m.metallic);
        assert_eq!(24, m.height_steps);
        assert!(m.texture_handles().iter().all(|h| !h.is_valid()));
    }
}
