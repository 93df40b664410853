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

mod image;
mod itex;
mod material;
mod model_3mf;
mod model_common;
mod model_fbx;
mod model_gltf;
mod model_imesh;
mod model_obj;
mod model_ply;
mod model_stl;
mod scene;

pub use image::ImageModule;
pub use itex::ItexModule;
pub use material::MaterialModule;
pub use model_3mf::ThreeMfModule;
pub use model_fbx::FbxModule;
pub use model_gltf::GltfModule;
pub use model_imesh::ImeshModule;
pub use model_obj::ObjModule;
pub use model_ply::PlyModule;
pub use model_stl::StlModule;
pub use scene::SceneModule;

use crate::ModuleRegistry;

/// Every built-in importer, in dispatch order. Container formats go in
/// front of the generic decoders of the same type so their magic check wins.
pub fn register_default_modules(registry: &mut ModuleRegistry) {
    registry.register(Box::new(ItexModule));
    registry.register(Box::new(ImageModule));
    registry.register(Box::new(MaterialModule));
    registry.register(Box::new(SceneModule));
    registry.register(Box::new(ImeshModule));
    registry.register(Box::new(ObjModule));
    registry.register(Box::new(GltfModule));
    registry.register(Box::new(ThreeMfModule));
    registry.register(Box::new(StlModule));
    registry.register(Box::new(PlyModule));
    registry.register(Box::new(FbxModule));
}

pub(crate) fn path_has_ext_ci(path: &str, ext: &str) -> bool {
    path.len() >= ext.len() && path[path.len() - ext.len()..].eq_ignore_ascii_case(ext)
}

/// Directory prefix including the trailing separator, empty for bare names.
pub(crate) fn path_dirname(path: &str) -> &str {
    match path.rfind(['/', '\\']) {
        Some(cut) => &path[..cut + 1],
        None => "",
    }
}

pub(crate) fn path_join(dir: &str, file: &str) -> String {
    if dir.is_empty() || dir.ends_with(['/', '\\']) {
        format!("{dir}{file}")
    } else {
        format!("{dir}/{file}")
    }
}

#[cfg(test)]
mod test {
    use crate::loaders::{path_dirname, path_has_ext_ci, path_join};

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(path_has_ext_ci("a/b/texture.PNG", ".png"));
        assert!(path_has_ext_ci("mesh.imesh", ".imesh"));
        assert!(!path_has_ext_ci("mesh.imesh", ".itex"));
        assert!(!path_has_ext_ci(".gl", ".gltf"));
    }

    #[test]
    fn dirname_and_join() {
        assert_eq!("a/b/", path_dirname("a/b/c.obj"));
        assert_eq!("", path_dirname("c.obj"));
        assert_eq!("a/b/tex.png", path_join(path_dirname("a/b/c.obj"), "tex.png"));
        assert_eq!("tex.png", path_join("", "tex.png"));
        assert_eq!("dir/tex.png", path_join("dir", "tex.png"));
    }
}
