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

use std::any::Any;

use kyanite_assets::{AssetAny, AssetType, Error};
use kyanite_common::Handle;
use log::{debug, error};

use crate::AssetManager;

/// What a load job points at: a path on disk, or a caller-allocated
/// descriptor whose ownership lives with the job. Descriptors are downcast
/// by the module that recognizes them.
pub enum LoadInput {
    Path(String),
    Memory(Box<dyn Any + Send>),
}

impl LoadInput {
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Path(p) => Some(p),
            Self::Memory(_) => None,
        }
    }

    pub fn memory<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Path(_) => None,
            Self::Memory(b) => b.downcast_ref::<T>(),
        }
    }
}

impl std::fmt::Debug for LoadInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(p) => write!(f, "path {p:?}"),
            Self::Memory(_) => write!(f, "memory descriptor"),
        }
    }
}

/// In-memory image bytes handed to `request_ptr`.
pub struct ImageMemory {
    pub bytes: Vec<u8>,
    pub debug_name: Option<String>,
}

/// In-memory mesh container blob handed to `request_ptr`.
pub struct MeshBlobMemory {
    pub bytes: Vec<u8>,
}

/// A registered importer. `load` runs on worker threads and must not touch
/// the device; `init`, `cleanup` and `save_blob` run on the thread that owns
/// the device context. `cleanup` must be total: it runs on half-initialized
/// assets too.
pub trait AssetModule: Send + Sync {
    fn asset_type(&self) -> AssetType;
    fn name(&self) -> &'static str;

    /// Cheap acceptance test: extension check plus a light content sniff.
    fn can_load(&self, am: &AssetManager, input: &LoadInput) -> bool;

    fn load(&self, am: &AssetManager, input: &LoadInput) -> Result<AssetAny, Error>;

    fn init(&self, am: &AssetManager, asset: &mut AssetAny) -> Result<(), Error> {
        let _ = (am, asset);
        Ok(())
    }

    fn cleanup(&self, am: &AssetManager, asset: &mut AssetAny) {
        let _ = (am, asset);
    }

    /// Serializes a Ready asset into its container format. `None` means the
    /// module has no save capability.
    fn save_blob(
        &self,
        am: &AssetManager,
        handle: Handle,
        asset: &AssetAny,
    ) -> Option<Result<Vec<u8>, Error>> {
        let _ = (am, handle, asset);
        None
    }
}

/// Insertion-ordered module table; a slot's `module_index` points here for
/// the lifetime of the manager.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<Box<dyn AssetModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: Box<dyn AssetModule>) -> bool {
        if module.asset_type() == AssetType::None {
            error!("failed to register module ({}) {}", module.asset_type().name(), module.name());
            return false;
        }
        debug!("registered module ({}) {}", module.asset_type().name(), module.name());
        self.modules.push(module);
        true
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn by_index(&self, index: u16) -> Option<&dyn AssetModule> {
        self.modules.get(index as usize).map(|m| m.as_ref())
    }

    pub fn first_index_of_type(&self, ty: AssetType) -> Option<u16> {
        self.modules
            .iter()
            .position(|m| m.asset_type() == ty)
            .map(|i| i as u16)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &dyn AssetModule)> {
        self.modules
            .iter()
            .enumerate()
            .map(|(i, m)| (i as u16, m.as_ref()))
    }
}
