//! Real-time scheduler on a tokio runtime.
//!
//! Each scheduled callback is a spawned task sleeping for its delay.
//! Cancellation aborts the task and deregisters it, so a task that already
//! woke up but has not yet claimed its slot will not run its callback.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use super::{Callback, Scheduler, TaskHandle};

#[derive(Default)]
struct RuntimeTasks {
    next_id: u64,
    tasks: HashMap<u64, AbortHandle>,
}

/// A [`Scheduler`] backed by `tokio::time::sleep`.
pub struct TokioScheduler {
    handle: Handle,
    origin: Instant,
    tasks: Arc<Mutex<RuntimeTasks>>,
    /// Held while a callback runs so callbacks stay serial on a
    /// multi-threaded runtime.
    serial: Arc<Mutex<()>>,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            origin: Instant::now(),
            tasks: Arc::new(Mutex::new(RuntimeTasks::default())),
            serial: Arc::new(Mutex::new(())),
        }
    }

    /// Scheduler on the runtime this is called from.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Number of callbacks still waiting to fire.
    pub fn pending(&self) -> usize {
        lock(&self.tasks).tasks.len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay_ms: u64, callback: Callback) -> TaskHandle {
        // Registration happens under the lock the spawned task needs to claim
        // its slot, so even a zero delay sees itself registered.
        let mut guard = lock(&self.tasks);
        let id = guard.next_id;
        guard.next_id += 1;

        let tasks = Arc::clone(&self.tasks);
        let serial = Arc::clone(&self.serial);
        let join = self.handle.spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let _serial = lock(&serial);
            let claimed = lock(&tasks).tasks.remove(&id).is_some();
            if claimed {
                callback();
            }
        });
        guard.tasks.insert(id, join.abort_handle());
        TaskHandle::new(id)
    }

    fn cancel(&self, handle: TaskHandle) {
        if let Some(task) = lock(&self.tasks).tasks.remove(&handle.id()) {
            task.abort();
        }
    }

    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, task) in lock(&self.tasks).tasks.drain() {
            task.abort();
        }
    }
}
