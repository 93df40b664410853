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

use std::{any::Any, sync::Arc, thread::JoinHandle};

use kyanite_assets::{lod::LodSettings, AssetAny, AssetPayload, AssetState, AssetType, Error};
use kyanite_backend::RenderDevice;
use kyanite_common::Handle;
use log::{debug, error};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use crate::{
    loaders,
    queue::{DoneQueue, DoneResult, Job, JobQueue},
    slots::{ManagerState, MODULE_NONE},
    LoadInput, ModuleRegistry,
};

#[derive(Debug, Clone, Copy)]
pub struct AssetManagerDesc {
    /// Zero is honored: no workers, everything stays queued until shutdown.
    pub worker_count: usize,
    pub max_inflight_jobs: usize,
    pub handle_type: u16,
    pub lod: LodSettings,
}

impl Default for AssetManagerDesc {
    fn default() -> Self {
        Self {
            worker_count: 4,
            max_inflight_jobs: 1024,
            handle_type: 1,
            lod: LodSettings::default(),
        }
    }
}

struct ManagerInner {
    state: Mutex<ManagerState>,
    jobs: JobQueue,
    done: DoneQueue,
    registry: ModuleRegistry,
    handle_type: u16,
    lod: LodSettings,
    device: Arc<dyn RenderDevice>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Concurrent, handle-based asset system.
///
/// `request`/`request_ptr` hand parsing to worker threads; `pump` runs on
/// the thread owning the device context, finishes initialization and
/// publishes results. Clones share the same manager.
#[derive(Clone)]
pub struct AssetManager {
    inner: Arc<ManagerInner>,
}

impl AssetManager {
    pub fn new(device: Arc<dyn RenderDevice>, desc: AssetManagerDesc) -> Self {
        let mut registry = ModuleRegistry::new();
        loaders::register_default_modules(&mut registry);
        Self::with_modules(device, desc, registry)
    }

    pub fn with_modules(
        device: Arc<dyn RenderDevice>,
        desc: AssetManagerDesc,
        registry: ModuleRegistry,
    ) -> Self {
        let manager = Self {
            inner: Arc::new(ManagerInner {
                state: Mutex::new(ManagerState::new()),
                jobs: JobQueue::new(desc.max_inflight_jobs),
                done: DoneQueue::new(desc.max_inflight_jobs),
                registry,
                handle_type: desc.handle_type,
                lod: desc.lod,
                device,
                workers: Mutex::new(Vec::new()),
            }),
        };

        let mut workers = manager.inner.workers.lock();
        for i in 0..desc.worker_count {
            let am = manager.clone();
            let handle = std::thread::Builder::new()
                .name(format!("asset-worker-{i}"))
                .spawn(move || worker_main(am))
                .expect("failed to spawn asset worker");
            workers.push(handle);
        }
        drop(workers);

        manager
    }

    pub fn device(&self) -> &dyn RenderDevice {
        self.inner.device.as_ref()
    }

    pub fn lod_settings(&self) -> &LodSettings {
        &self.inner.lod
    }

    pub fn handle_type(&self) -> u16 {
        self.inner.handle_type
    }

    /// Queues a load from a path. Returns an invalid handle when the path is
    /// empty, the manager is shutting down, or the job queue is full.
    pub fn request(&self, ty: AssetType, path: &str) -> Handle {
        if path.is_empty() || ty == AssetType::None {
            return Handle::invalid();
        }

        let handle = {
            let mut state = self.inner.state.lock();
            if state.shutting_down {
                return Handle::invalid();
            }
            state.alloc(self.inner.handle_type, ty)
        };

        let job = Job {
            handle,
            ty,
            input: LoadInput::Path(path.to_owned()),
        };
        if !self.inner.jobs.push(job) {
            error!("job queue full, dropping request for {path:?}");
            self.fail_slot(handle);
            return Handle::invalid();
        }

        handle
    }

    /// Queues a load from a caller-allocated in-memory descriptor. The
    /// descriptor is owned by the job and never copied.
    pub fn request_ptr(&self, ty: AssetType, descriptor: Box<dyn Any + Send>) -> Handle {
        if ty == AssetType::None {
            return Handle::invalid();
        }

        let handle = {
            let mut state = self.inner.state.lock();
            if state.shutting_down {
                return Handle::invalid();
            }
            state.alloc(self.inner.handle_type, ty)
        };

        let job = Job {
            handle,
            ty,
            input: LoadInput::Memory(descriptor),
        };
        if !self.inner.jobs.push(job) {
            error!("job queue full, dropping descriptor request");
            self.fail_slot(handle);
            return Handle::invalid();
        }

        handle
    }

    /// Synchronous path for in-memory producers. Runs `init` on the calling
    /// thread, so GPU-bearing payloads must come through the device thread.
    pub fn submit_raw(&self, ty: AssetType, payload: AssetPayload) -> Handle {
        if ty == AssetType::None || payload.asset_type() != ty {
            return Handle::invalid();
        }
        if !matches!(payload, AssetPayload::Image(_) | AssetPayload::Material(_)) {
            return Handle::invalid();
        }

        let Some(module_index) = self.inner.registry.first_index_of_type(ty) else {
            return Handle::invalid();
        };

        let handle = {
            let mut state = self.inner.state.lock();
            if state.shutting_down {
                return Handle::invalid();
            }
            state.alloc(self.inner.handle_type, ty)
        };

        let mut asset = AssetAny::loading(payload);
        let module = self
            .inner
            .registry
            .by_index(module_index)
            .expect("module index out of registry bounds");

        if let Err(err) = module.init(self, &mut asset) {
            error!("raw submit init failed for {}: {err}", ty.name());
            module.cleanup(self, &mut asset);
            self.fail_slot(handle);
            return Handle::invalid();
        }

        {
            let mut state = self.inner.state.lock();
            if let Some(slot) = state.validate_mut(handle, self.inner.handle_type) {
                asset.state = AssetState::Ready;
                slot.asset = asset;
                slot.module_index = module_index;
            }
        }

        handle
    }

    /// Drains the done queue: re-validates each handle, finishes device
    /// initialization and publishes or fails the slot. No-op when nothing
    /// was delivered.
    pub fn pump(&self) {
        self.pump_n(usize::MAX);
    }

    pub fn pump_n(&self, max: usize) {
        let mut processed = 0usize;
        while processed < max {
            let Some(mut done) = self.inner.done.pop() else {
                break;
            };
            processed += 1;

            let slot_ok = self
                .inner
                .state
                .lock()
                .validate(done.handle, self.inner.handle_type)
                .is_some();
            if !slot_ok {
                // Slot went away while the worker was busy; release the
                // delivered asset through its producing module.
                self.cleanup_by_module(&mut done.asset, done.module_index);
                continue;
            }

            if !done.ok {
                self.fail_and_release(done.handle);
                self.cleanup_by_module(&mut done.asset, done.module_index);
                continue;
            }

            let init_ok = match self.inner.registry.by_index(done.module_index) {
                Some(module) => match module.init(self, &mut done.asset) {
                    Ok(()) => true,
                    Err(err) => {
                        error!("init failed for {}: {err}", done.handle);
                        false
                    }
                },
                None => true,
            };

            if !init_ok {
                self.cleanup_by_module(&mut done.asset, done.module_index);
                self.fail_and_release(done.handle);
                continue;
            }

            let mut old = AssetAny::empty();
            let mut old_module = MODULE_NONE;
            {
                let mut state = self.inner.state.lock();
                if let Some(slot) = state.validate_mut(done.handle, self.inner.handle_type) {
                    old = slot.asset.take();
                    old_module = slot.module_index;
                    done.asset.state = AssetState::Ready;
                    slot.asset = done.asset.take();
                    slot.module_index = done.module_index;
                }
            }
            if !matches!(old.payload, AssetPayload::None) {
                self.cleanup_by_module(&mut old, old_module);
            }
            if !matches!(done.asset.payload, AssetPayload::None) {
                self.cleanup_by_module(&mut done.asset, done.module_index);
            }
        }
    }

    /// Borrow of a published asset. `None` while loading or after failure.
    pub fn get(&self, handle: Handle) -> Option<MappedMutexGuard<'_, AssetAny>> {
        let handle_type = self.inner.handle_type;
        let guard = self.inner.state.lock();
        MutexGuard::try_map(guard, |state| {
            state
                .validate_mut(handle, handle_type)
                .filter(|slot| slot.asset.state == AssetState::Ready)
                .map(|slot| &mut slot.asset)
        })
        .ok()
    }

    pub fn state_of(&self, handle: Handle) -> Option<AssetState> {
        self.inner
            .state
            .lock()
            .validate(handle, self.inner.handle_type)
            .map(|slot| slot.asset.state)
    }

    pub fn all_loaded(&self) -> bool {
        !self.inner.state.lock().any_loading()
    }

    /// Serializes a Ready asset through a module with save capability,
    /// preferring the module that produced it.
    pub fn save_blob(&self, handle: Handle) -> Option<Result<Vec<u8>, Error>> {
        let state = self.inner.state.lock();
        let slot = state.validate(handle, self.inner.handle_type)?;
        if slot.asset.state != AssetState::Ready {
            return None;
        }

        if let Some(module) = self.inner.registry.by_index(slot.module_index) {
            if let Some(result) = module.save_blob(self, handle, &slot.asset) {
                return Some(result);
            }
        }
        for (index, module) in self.inner.registry.iter() {
            if index == slot.module_index || module.asset_type() != slot.asset.asset_type() {
                continue;
            }
            if let Some(result) = module.save_blob(self, handle, &slot.asset) {
                return Some(result);
            }
        }

        None
    }

    /// Stops intake, wakes and joins workers, then releases everything the
    /// queues and slots still own through the producing modules.
    pub fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.shutting_down {
                return;
            }
            state.shutting_down = true;
        }

        self.inner.jobs.broadcast();
        debug!("shutdown: dropping {} queued jobs", self.inner.jobs.len());
        self.inner.jobs.drain();

        let workers: Vec<_> = self.inner.workers.lock().drain(..).collect();
        for worker in workers {
            let _ = worker.join();
        }

        debug!(
            "shutdown: releasing {} undelivered results",
            self.inner.done.len()
        );
        while let Some(mut done) = self.inner.done.pop() {
            self.cleanup_by_module(&mut done.asset, done.module_index);
        }

        let mut leftovers = Vec::new();
        {
            let mut state = self.inner.state.lock();
            for slot in state.iter_mut() {
                let asset = slot.asset.take();
                let module_index = slot.module_index;
                slot.module_index = MODULE_NONE;
                if !matches!(asset.payload, AssetPayload::None) {
                    leftovers.push((asset, module_index));
                }
            }
        }
        for (mut asset, module_index) in leftovers {
            self.cleanup_by_module(&mut asset, module_index);
        }
    }

    fn fail_slot(&self, handle: Handle) {
        let mut state = self.inner.state.lock();
        if let Some(slot) = state.validate_mut(handle, self.inner.handle_type) {
            slot.asset = AssetAny {
                state: AssetState::Failed,
                payload: AssetPayload::None,
            };
            slot.module_index = MODULE_NONE;
        }
    }

    /// Fails the slot and releases whatever it held before.
    fn fail_and_release(&self, handle: Handle) {
        let mut old = AssetAny::empty();
        let mut old_module = MODULE_NONE;
        {
            let mut state = self.inner.state.lock();
            if let Some(slot) = state.validate_mut(handle, self.inner.handle_type) {
                old = slot.asset.take();
                old_module = slot.module_index;
                slot.asset.state = AssetState::Failed;
                slot.module_index = MODULE_NONE;
            }
        }
        if !matches!(old.payload, AssetPayload::None) {
            self.cleanup_by_module(&mut old, old_module);
        }
    }

    /// Releases contents through the module that produced them; falls back
    /// to the first module of the asset's type when the index is stale.
    fn cleanup_by_module(&self, asset: &mut AssetAny, module_index: u16) {
        if matches!(asset.payload, AssetPayload::None) {
            *asset = AssetAny::empty();
            return;
        }

        let ty = asset.asset_type();
        let module = self
            .inner
            .registry
            .by_index(module_index)
            .filter(|m| m.asset_type() == ty)
            .or_else(|| {
                self.inner
                    .registry
                    .first_index_of_type(ty)
                    .and_then(|i| self.inner.registry.by_index(i))
            });

        if let Some(module) = module {
            module.cleanup(self, asset);
        }
        *asset = AssetAny::empty();
    }

    fn try_load_any(&self, ty: AssetType, input: &LoadInput) -> Option<(AssetAny, u16)> {
        for (index, module) in self.inner.registry.iter() {
            if module.asset_type() != ty {
                continue;
            }
            if !module.can_load(self, input) {
                continue;
            }
            match module.load(self, input) {
                Ok(asset) => return Some((asset, index)),
                Err(err) => debug!("module {} failed on {input:?}: {err}", module.name()),
            }
        }
        None
    }
}

fn worker_main(am: AssetManager) {
    loop {
        let Some(job) = am.inner.jobs.pop_blocking(&am.inner.state) else {
            break;
        };
        if am.inner.state.lock().shutting_down {
            // Dropping the job releases its path or descriptor.
            break;
        }

        let Job { handle, ty, input } = job;
        let mut result = DoneResult {
            handle,
            ok: false,
            module_index: MODULE_NONE,
            asset: AssetAny::empty(),
        };

        match am.try_load_any(ty, &input) {
            Some((asset, module_index)) => {
                result.ok = true;
                result.module_index = module_index;
                result.asset = asset;
            }
            None => error!("failed to load asset [{}] ({input:?})", ty.name()),
        }

        am.inner.done.push(result);
    }
}
