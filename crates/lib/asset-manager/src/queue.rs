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

use std::collections::VecDeque;

use kyanite_assets::{AssetAny, AssetType};
use kyanite_common::Handle;
use parking_lot::{Condvar, Mutex};

use crate::{slots::ManagerState, LoadInput};

pub struct Job {
    pub handle: Handle,
    pub ty: AssetType,
    pub input: LoadInput,
}

pub struct DoneResult {
    pub handle: Handle,
    pub ok: bool,
    pub module_index: u16,
    pub asset: AssetAny,
}

/// Bounded single-producer-many-consumers queue. Push never blocks; the pop
/// side parks on the condvar until work arrives or shutdown is flagged.
pub struct JobQueue {
    queue: Mutex<VecDeque<Job>>,
    cond: Condvar,
    cap: usize,
}

impl JobQueue {
    pub fn new(cap: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(cap)),
            cond: Condvar::new(),
            cap,
        }
    }

    /// Returns false when full.
    pub fn push(&self, job: Job) -> bool {
        let mut q = self.queue.lock();
        if q.len() == self.cap {
            return false;
        }
        q.push_back(job);
        self.cond.notify_one();
        true
    }

    /// Blocks until a job is available or shutdown begins. The shutdown flag
    /// is peeked under the state mutex while the queue mutex is held; this is
    /// the one place both are held together, always in this order.
    pub fn pop_blocking(&self, state: &Mutex<ManagerState>) -> Option<Job> {
        let mut q = self.queue.lock();
        loop {
            let shutting_down = state.lock().shutting_down;
            if shutting_down {
                return None;
            }
            if !q.is_empty() {
                break;
            }
            self.cond.wait(&mut q);
        }
        q.pop_front()
    }

    pub fn broadcast(&self) {
        let _q = self.queue.lock();
        self.cond.notify_all();
    }

    /// Drops everything still queued. Path strings and pointer descriptors
    /// are both owned by their job, so dropping releases them.
    pub fn drain(&self) {
        self.queue.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }
}

/// Bounded many-producers-single-consumer result queue; both ends
/// non-blocking.
pub struct DoneQueue {
    queue: Mutex<VecDeque<DoneResult>>,
    cap: usize,
}

impl DoneQueue {
    pub fn new(cap: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(cap)),
            cap,
        }
    }

    pub fn push(&self, result: DoneResult) -> bool {
        let mut q = self.queue.lock();
        if q.len() == self.cap {
            return false;
        }
        q.push_back(result);
        true
    }

    pub fn pop(&self) -> Option<DoneResult> {
        self.queue.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }
}

#[cfg(test)]
mod test {
    use kyanite_assets::{AssetAny, AssetType};
    use kyanite_common::Handle;
    use parking_lot::Mutex;

    use crate::{
        queue::{DoneQueue, DoneResult, Job, JobQueue},
        slots::ManagerState,
        LoadInput,
    };

    fn job(i: u16) -> Job {
        Job {
            handle: Handle::new(1, i, 1),
            ty: AssetType::Scene,
            input: LoadInput::Path(format!("scene_{i}.scene")),
        }
    }

    #[test]
    fn push_respects_capacity() {
        let q = JobQueue::new(2);
        assert!(q.push(job(1)));
        assert!(q.push(job(2)));
        assert!(!q.push(job(3)));
        assert_eq!(2, q.len());
    }

    #[test]
    fn drain_empties_queue() {
        let q = JobQueue::new(4);
        q.push(job(1));
        q.push(job(2));
        q.drain();
        assert_eq!(0, q.len());
        assert!(q.push(job(3)));
    }

    #[test]
    fn pop_blocking_returns_none_on_shutdown() {
        let state = Mutex::new(ManagerState::new());
        state.lock().shutting_down = true;
        let q = JobQueue::new(4);
        q.push(job(1));
        assert!(q.pop_blocking(&state).is_none());
        // The job is still queued; drain releases it.
        assert_eq!(1, q.len());
    }

    #[test]
    fn pop_blocking_is_fifo() {
        let state = Mutex::new(ManagerState::new());
        let q = JobQueue::new(4);
        q.push(job(1));
        q.push(job(2));
        assert_eq!(1, q.pop_blocking(&state).unwrap().handle.index());
        assert_eq!(2, q.pop_blocking(&state).unwrap().handle.index());
    }

    #[test]
    fn done_queue_fifo_and_bounded() {
        let q = DoneQueue::new(2);
        for i in 0..2 {
            assert!(q.push(DoneResult {
                handle: Handle::new(1, i + 1, 1),
                ok: true,
                module_index: 0,
                asset: AssetAny::empty(),
            }));
        }
        assert!(!q.push(DoneResult {
            handle: Handle::new(1, 9, 1),
            ok: false,
            module_index: u16::MAX,
            asset: AssetAny::empty(),
        }));
        assert_eq!(1, q.pop().unwrap().handle.index());
        assert_eq!(2, q.pop().unwrap().handle.index());
        assert!(q.pop().is_none());
    }
}
