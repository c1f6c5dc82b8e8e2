use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle, ThreadId};

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of single-worker lanes. Tasks submitted under equal keys run one
/// at a time in submission order; different keys may run in parallel.
pub struct LaneExecutor {
    mask: usize,
    queues: RwLock<Option<Vec<UnboundedSender<Task>>>>,
    /// Held for the whole drain, so every `shutdown` caller waits for it.
    workers: Mutex<Vec<JoinHandle<()>>>,
    lane_threads: Vec<ThreadId>,
}

impl LaneExecutor {
    /// Start `count` lanes, rounded up to the next power of two (minimum 1).
    pub fn new(count: usize) -> Result<Self> {
        let count = count.max(1).next_power_of_two();
        let mut queues = Vec::with_capacity(count);
        let mut workers = Vec::with_capacity(count);

        for index in 0..count {
            let (tx, rx) = mpsc::unbounded_channel::<Task>();
            let worker = thread::Builder::new()
                .name(format!("lane-{:02}", index))
                .spawn(move || run_lane(index, rx))
                .with_context(|| format!("Failed to spawn lane {}", index))?;
            queues.push(tx);
            workers.push(worker);
        }

        info!("Lane executor started with {} lanes", count);
        Ok(Self {
            mask: count - 1,
            queues: RwLock::new(Some(queues)),
            lane_threads: workers.iter().map(|w| w.thread().id()).collect(),
            workers: Mutex::new(workers),
        })
    }

    pub fn lane_count(&self) -> usize {
        self.mask + 1
    }

    /// Lane a key maps to. Stable for the lifetime of this executor.
    pub fn index_for<K: Hash + ?Sized>(&self, key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (mix(hasher.finish()) as usize) & self.mask
    }

    /// Queue `task` on the lane owning `key`. Fails only after shutdown.
    pub fn submit<K, F>(&self, key: &K, task: F) -> Result<()>
    where
        K: Hash + ?Sized,
        F: FnOnce() + Send + 'static,
    {
        let index = self.index_for(key);
        let queues = self.queues.read().unwrap_or_else(PoisonError::into_inner);
        let Some(queues) = queues.as_ref() else {
            bail!("Lane executor is shut down");
        };
        if queues[index].send(Box::new(task)).is_err() {
            bail!("Lane {} is no longer running", index);
        }
        Ok(())
    }

    /// Stop accepting tasks and wait for every lane to finish its queue.
    /// Blocks the calling thread; concurrent and repeated calls all return
    /// only once the drain is complete. Called from a lane's own task it
    /// only closes the queues, since a lane cannot wait for itself.
    pub fn shutdown(&self) {
        if self.lane_threads.contains(&thread::current().id()) {
            self.close_queues();
            return;
        }

        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.close_queues() && workers.is_empty() {
            return;
        }
        for worker in workers.drain(..) {
            if worker.join().is_err() {
                error!("Lane thread exited abnormally");
            }
        }
        info!("Lane executor drained");
    }

    /// Drop the senders so lanes exit once their queues are empty. `false`
    /// if they were already closed.
    fn close_queues(&self) -> bool {
        self.queues
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }
}

impl Drop for LaneExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_lane(index: usize, mut rx: UnboundedReceiver<Task>) {
    debug!("Lane {} running", index);
    while let Some(task) = rx.blocking_recv() {
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            error!("Task panicked on lane {}", index);
        }
    }
    debug!("Lane {} stopped", index);
}

/// Fold the high bits into the low bits used by the mask.
fn mix(h: u64) -> u64 {
    h ^ (h >> 32) ^ (h >> 16)
}
