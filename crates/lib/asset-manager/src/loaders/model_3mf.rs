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

//! 3MF importer: the payload XML (`3D/3dmodel.model`) inside a ZIP archive.
//! All objects are merged into one submesh; facets get flat normals.

use std::io::{Cursor, Read};

use glam::Vec3;
use kyanite_assets::{
    AssetAny, AssetPayload, AssetType, Error, ModelVertex, RawLod, RawModel, RawSubmesh,
};
use xml::reader::{EventReader, XmlEvent};

use crate::{
    loaders::{model_common, path_has_ext_ci},
    AssetManager, AssetModule, LoadInput,
};

pub struct ThreeMfModule;

const MAIN_MODEL_PATH: &str = "3D/3dmodel.model";

fn read_model_xml(archive_bytes: &[u8]) -> Result<Vec<u8>, Error> {
    let mut archive = zip::ZipArchive::new(Cursor::new(archive_bytes))
        .map_err(|err| Error::decode(format!("3mf: not a zip archive: {err}")))?;

    let name = if archive.by_name(MAIN_MODEL_PATH).is_ok() {
        MAIN_MODEL_PATH.to_owned()
    } else {
        archive
            .file_names()
            .find(|n| n.to_ascii_lowercase().ends_with(".model"))
            .map(str::to_owned)
            .ok_or_else(|| Error::decode("3mf: archive has no model part"))?
    };

    let mut file = archive
        .by_name(&name)
        .map_err(|err| Error::decode(format!("3mf: {err}")))?;
    let mut xml = Vec::new();
    file.read_to_end(&mut xml)?;

    Ok(xml)
}

fn attr_f32(attrs: &[xml::attribute::OwnedAttribute], name: &str) -> f32 {
    attrs
        .iter()
        .find(|a| a.name.local_name == name)
        .and_then(|a| a.value.trim().parse().ok())
        .unwrap_or(0.0)
}

fn attr_u32(attrs: &[xml::attribute::OwnedAttribute], name: &str) -> Option<u32> {
    attrs
        .iter()
        .find(|a| a.name.local_name == name)
        .and_then(|a| a.value.trim().parse().ok())
}

fn parse_model_xml(xml: &[u8]) -> Result<(Vec<[f32; 3]>, Vec<[u32; 3]>), Error> {
    let mut positions: Vec<[f32; 3]> = Vec::new();
    let mut triangles: Vec<[u32; 3]> = Vec::new();
    let mut base = 0u32;

    for event in EventReader::new(Cursor::new(xml)) {
        let event = event.map_err(|err| Error::decode(format!("3mf: xml error: {err}")))?;
        if let XmlEvent::StartElement {
            name, attributes, ..
        } = event
        {
            match name.local_name.as_str() {
                // Triangle indices are local to their mesh block.
                "mesh" => base = positions.len() as u32,
                "vertex" => positions.push([
                    attr_f32(&attributes, "x"),
                    attr_f32(&attributes, "y"),
                    attr_f32(&attributes, "z"),
                ]),
                "triangle" => {
                    let (Some(v1), Some(v2), Some(v3)) = (
                        attr_u32(&attributes, "v1"),
                        attr_u32(&attributes, "v2"),
                        attr_u32(&attributes, "v3"),
                    ) else {
                        return Err(Error::decode("3mf: triangle without v1/v2/v3"));
                    };
                    triangles.push([base + v1, base + v2, base + v3]);
                }
                _ => {}
            }
        }
    }

    if positions.is_empty() || triangles.is_empty() {
        return Err(Error::decode("3mf: model part has no geometry"));
    }
    for t in &triangles {
        if t.iter().any(|&i| i as usize >= positions.len()) {
            return Err(Error::corrupt("3mf: triangle index out of range"));
        }
    }

    Ok((positions, triangles))
}

fn build_lod(positions: &[[f32; 3]], triangles: &[[u32; 3]]) -> RawLod {
    let mut lod = RawLod::default();
    for t in triangles {
        let a = Vec3::from_array(positions[t[0] as usize]);
        let b = Vec3::from_array(positions[t[1] as usize]);
        let c = Vec3::from_array(positions[t[2] as usize]);
        let n = (b - a).cross(c - a);
        let n = if n.length_squared() > 1e-20 {
            n.normalize()
        } else {
            Vec3::Z
        };

        let first = lod.vertices.len() as u32;
        for p in [a, b, c] {
            lod.vertices.push(ModelVertex {
                position: p.to_array(),
                normal: n.to_array(),
                tangent: [1.0, 0.0, 0.0, 1.0],
                uv: [0.0, 0.0],
            });
        }
        lod.indices.extend_from_slice(&[first, first + 1, first + 2]);
    }
    lod
}

impl AssetModule for ThreeMfModule {
    fn asset_type(&self) -> AssetType {
        AssetType::Model
    }

    fn name(&self) -> &'static str {
        "model-3mf"
    }

    fn can_load(&self, _am: &AssetManager, input: &LoadInput) -> bool {
        let Some(path) = input.path() else {
            return false;
        };
        if path_has_ext_ci(path, ".3mf") {
            return true;
        }
        let mut head = [0u8; 2];
        let Ok(mut f) = std::fs::File::open(path) else {
            return false;
        };
        std::io::Read::read_exact(&mut f, &mut head).is_ok() && &head == b"PK"
    }

    fn load(&self, am: &AssetManager, input: &LoadInput) -> Result<AssetAny, Error> {
        let path = input
            .path()
            .ok_or_else(|| Error::rejected("3mf: descriptors not supported"))?;
        let bytes = std::fs::read(path)?;
        let xml = read_model_xml(&bytes)?;
        let (positions, triangles) = parse_model_xml(&xml)?;

        let mut raw = RawModel::new();
        raw.submeshes
            .push(RawSubmesh::from_lod0(build_lod(&positions, &triangles)));
        model_common::finish_parsed_model(am, &mut raw);

        Ok(AssetAny::loading(AssetPayload::ModelRaw(raw)))
    }

    fn init(&self, am: &AssetManager, asset: &mut AssetAny) -> Result<(), Error> {
        model_common::model_init(am, asset)
    }

    fn cleanup(&self, am: &AssetManager, asset: &mut AssetAny) {
        model_common::model_cleanup(am, asset);
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use crate::loaders::model_3mf::{build_lod, parse_model_xml, read_model_xml};

    const MODEL_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<model unit="millimeter">
  <resources>
    <object id="1" type="model">
      <mesh>
        <vertices>
          <vertex x="0" y="0" z="0"/>
          <vertex x="1" y="0" z="0"/>
          <vertex x="0" y="1" z="0"/>
        </vertices>
        <triangles>
          <triangle v1="0" v2="1" v3="2"/>
        </triangles>
      </mesh>
    </object>
  </resources>
</model>"#;

    fn zip_with(name: &str, content: &str) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            writer
                .start_file(name, zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn extracts_main_model_part() {
        let data = zip_with("3D/3dmodel.model", MODEL_XML);
        let xml = read_model_xml(&data).unwrap();
        let (positions, triangles) = parse_model_xml(&xml).unwrap();
        assert_eq!(3, positions.len());
        assert_eq!(1, triangles.len());
    }

    #[test]
    fn falls_back_to_any_model_part() {
        let data = zip_with("3D/other.model", MODEL_XML);
        assert!(read_model_xml(&data).is_ok());
    }

    #[test]
    fn second_mesh_indices_are_offset() {
        let xml = r#"<model><mesh><vertices>
            <vertex x="0" y="0" z="0"/><vertex x="1" y="0" z="0"/><vertex x="0" y="1" z="0"/>
            </vertices><triangles><triangle v1="0" v2="1" v3="2"/></triangles></mesh>
            <mesh><vertices>
            <vertex x="0" y="0" z="1"/><vertex x="1" y="0" z="1"/><vertex x="0" y="1" z="1"/>
            </vertices><triangles><triangle v1="0" v2="1" v3="2"/></triangles></mesh></model>"#;
        let (positions, triangles) = parse_model_xml(xml.as_bytes()).unwrap();
        assert_eq!(6, positions.len());
        assert_eq!([3, 4, 5], triangles[1]);
    }

    #[test]
    fn flat_normals_on_unrolled_vertices() {
        let (positions, triangles) = parse_model_xml(MODEL_XML.as_bytes()).unwrap();
        let lod = build_lod(&positions, &triangles);
        assert_eq!(3, lod.vertices.len());
        assert_eq!([0.0, 0.0, 1.0], lod.vertices[0].normal);
    }

    #[test]
    fn rejects_non_zip_and_empty_models() {
        assert!(read_model_xml(b"not a zip").is_err());
        assert!(parse_model_xml(b"<model/>").is_err());
        assert!(parse_model_xml(b"<model><mesh><vertices><vertex x=\"0\" y=\"0\" z=\"0\"/></vertices><triangles><triangle v1=\"0\" v2=\"1\" v3=\"9\"/></triangles></mesh></model>").is_err());
    }
}
