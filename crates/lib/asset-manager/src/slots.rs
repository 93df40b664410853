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

use kyanite_assets::{AssetAny, AssetState, AssetType};
use kyanite_common::Handle;

/// Sentinel for "no module owns these contents".
pub const MODULE_NONE: u16 = u16::MAX;

/// One cell of the asset table. Storage index is stable for the manager's
/// lifetime; generation is reserved for future eviction and stays odd while
/// the slot is live.
pub struct Slot {
    pub generation: u16,
    pub module_index: u16,
    pub ty: AssetType,
    pub asset: AssetAny,
}

/// Append-only slot table plus the shutdown flag, everything `state_m`
/// protects.
pub struct ManagerState {
    pub shutting_down: bool,
    slots: Vec<Slot>,
}

impl ManagerState {
    pub fn new() -> Self {
        Self {
            shutting_down: false,
            slots: Vec::new(),
        }
    }

    /// Appends a fresh slot in `Loading` state and returns its handle.
    /// Index is 1-based so an all-zero handle stays invalid.
    pub fn alloc(&mut self, handle_type: u16, ty: AssetType) -> Handle {
        self.slots.push(Slot {
            generation: 1,
            module_index: MODULE_NONE,
            ty,
            asset: AssetAny {
                state: AssetState::Loading,
                payload: Default::default(),
            },
        });

        Handle::new(handle_type, self.slots.len() as u16, 1)
    }

    pub fn validate(&self, handle: Handle, handle_type: u16) -> Option<&Slot> {
        let index = self.validate_index(handle, handle_type)?;
        Some(&self.slots[index])
    }

    pub fn validate_mut(&mut self, handle: Handle, handle_type: u16) -> Option<&mut Slot> {
        let index = self.validate_index(handle, handle_type)?;
        Some(&mut self.slots[index])
    }

    fn validate_index(&self, handle: Handle, handle_type: u16) -> Option<usize> {
        if !handle.is_valid() || handle.ty() != handle_type {
            return None;
        }
        let index = handle.index();
        if index == 0 || index as usize > self.slots.len() {
            return None;
        }
        let slot = &self.slots[index as usize - 1];
        (slot.generation == handle.generation()).then_some(index as usize - 1)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Slot> {
        self.slots.iter_mut()
    }

    pub fn any_loading(&self) -> bool {
        self.slots
            .iter()
            .any(|s| s.asset.state == AssetState::Loading)
    }
}

impl Default for ManagerState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use kyanite_assets::{AssetState, AssetType};
    use kyanite_common::Handle;

    use crate::slots::{ManagerState, MODULE_NONE};

    #[test]
    fn alloc_returns_one_based_live_handles() {
        let mut state = ManagerState::new();
        let a = state.alloc(1, AssetType::Image);
        let b = state.alloc(1, AssetType::Scene);
        assert!(a.is_valid() && b.is_valid());
        assert_eq!(1, a.index());
        assert_eq!(2, b.index());
        assert_eq!(1, a.generation() % 2);

        let slot = state.validate(a, 1).unwrap();
        assert_eq!(AssetState::Loading, slot.asset.state);
        assert_eq!(MODULE_NONE, slot.module_index);
        assert_eq!(AssetType::Image, slot.ty);
    }

    #[test]
    fn validation_rejects_mismatches() {
        let mut state = ManagerState::new();
        let h = state.alloc(1, AssetType::Image);

        assert!(state.validate(h, 1).is_some());
        // Wrong manager type tag.
        assert!(state.validate(h, 2).is_none());
        // Wrong generation.
        assert!(state
            .validate(Handle::new(1, h.index(), h.generation() + 2), 1)
            .is_none());
        // Out of range or zero index.
        assert!(state.validate(Handle::new(1, 5, 1), 1).is_none());
        assert!(state.validate(Handle::invalid(), 1).is_none());
    }
}
