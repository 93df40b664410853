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

//! `.imat` material document. Structured key/value text; every field below
//! is required on load.

use glam::Vec3;
use kyanite_common::Handle;
use serde::{Deserialize, Serialize};

use crate::{Error, MaterialAsset, MaterialFlags};

#[derive(Debug, Serialize, Deserialize)]
struct Vec3Doc {
    x: f32,
    y: f32,
    z: f32,
}

impl From<Vec3> for Vec3Doc {
    fn from(v: Vec3) -> Self {
        Self { x: v.x, y: v.y, z: v.z }
    }
}

impl From<Vec3Doc> for Vec3 {
    fn from(v: Vec3Doc) -> Self {
        Vec3::new(v.x, v.y, v.z)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct HandleDoc {
    #[serde(rename = "type")]
    ty: u16,
    meta: u16,
    index: u16,
    generation: u16,
}

impl From<Handle> for HandleDoc {
    fn from(h: Handle) -> Self {
        Self {
            ty: h.ty(),
            meta: h.meta(),
            index: h.index(),
            generation: h.generation(),
        }
    }
}

impl From<HandleDoc> for Handle {
    fn from(h: HandleDoc) -> Self {
        Handle::new(h.ty, h.index, h.generation).with_meta(h.meta)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct MaterialDoc {
    shader_id: u8,
    flags: u32,

    albedo: Vec3Doc,
    emissive: Vec3Doc,
    roughness: f32,
    metallic: f32,
    opacity: f32,

    normal_strength: f32,
    height_scale: f32,
    height_steps: u32,

    albedo_tex: HandleDoc,
    normal_tex: HandleDoc,
    metallic_tex: HandleDoc,
    roughness_tex: HandleDoc,
    emissive_tex: HandleDoc,
    occlusion_tex: HandleDoc,
    height_tex: HandleDoc,
    arm_tex: HandleDoc,
}

pub fn to_document(m: &MaterialAsset) -> String {
    let doc = MaterialDoc {
        shader_id: m.shader_id,
        flags: m.flags.bits(),
        albedo: m.albedo.into(),
        emissive: m.emissive.into(),
        roughness: m.roughness,
        metallic: m.metallic,
        opacity: m.opacity,
        normal_strength: m.normal_strength,
        height_scale: m.height_scale,
        height_steps: m.height_steps,
        albedo_tex: m.albedo_tex.into(),
        normal_tex: m.normal_tex.into(),
        metallic_tex: m.metallic_tex.into(),
        roughness_tex: m.roughness_tex.into(),
        emissive_tex: m.emissive_tex.into(),
        occlusion_tex: m.occlusion_tex.into(),
        height_tex: m.height_tex.into(),
        arm_tex: m.arm_tex.into(),
    };

    serde_json::to_string_pretty(&doc).expect("material document is always serializable")
}

pub fn from_document(text: &str) -> Result<MaterialAsset, Error> {
    let doc: MaterialDoc =
        serde_json::from_str(text).map_err(|err| Error::decode(format!("imat: {err}")))?;

    Ok(MaterialAsset {
        shader_id: doc.shader_id,
        flags: MaterialFlags::from_bits_truncate(doc.flags),
        name: String::new(),
        albedo: doc.albedo.into(),
        emissive: doc.emissive.into(),
        roughness: doc.roughness,
        metallic: doc.metallic,
        opacity: doc.opacity,
        alpha_cutoff: MaterialAsset::default().alpha_cutoff,
        normal_strength: doc.normal_strength,
        height_scale: doc.height_scale,
        height_steps: doc.height_steps,
        albedo_tex: doc.albedo_tex.into(),
        normal_tex: doc.normal_tex.into(),
        metallic_tex: doc.metallic_tex.into(),
        roughness_tex: doc.roughness_tex.into(),
        emissive_tex: doc.emissive_tex.into(),
        occlusion_tex: doc.occlusion_tex.into(),
        height_tex: doc.height_tex.into(),
        arm_tex: doc.arm_tex.into(),
    })
}

#[cfg(test)]
mod test {
    use glam::Vec3;
    use kyanite_common::Handle;

    use crate::{
        imat::{from_document, to_document},
        MaterialAsset, MaterialFlags,
    };

    #[test]
    fn roundtrip() {
        let mut m = MaterialAsset::with_shader(2);
        m.flags = MaterialFlags::ALPHA_CUTOUT | MaterialFlags::DOUBLE_SIDED;
        m.albedo = Vec3::new(0.5, 0.25, 1.0);
        m.roughness = 0.3;
        m.metallic = 0.9;
        m.albedo_tex = Handle::new(1, 5, 3).with_meta(7);
        m.arm_tex = Handle::new(1, 9, 1);

        let text = to_document(&m);
        let parsed = from_document(&text).unwrap();
        assert_eq!(m.shader_id, parsed.shader_id);
        assert_eq!(m.flags, parsed.flags);
        assert_eq!(m.albedo, parsed.albedo);
        assert_eq!(m.roughness, parsed.roughness);
        assert_eq!(m.albedo_tex, parsed.albedo_tex);
        assert_eq!(m.arm_tex, parsed.arm_tex);
        assert!(!parsed.normal_tex.is_valid());
    }

    #[test]
    fn missing_field_is_rejected() {
        let text = to_document(&MaterialAsset::default());
        let broken = text.replace("\"roughness\"", "\"roughnes\"");
        assert!(from_document(&broken).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(from_document("not a document").is_err());
    }
}
