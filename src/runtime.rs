//! Runtime abstraction layer for async operations
//!
//! The scheduler never talks to an executor directly: it hands fetch futures
//! to an [`AsyncSpawner`] and keeps the returned [`AsyncHandle`] to cancel
//! them. [`TokioSpawner`] is the production implementation;
//! [`ManualSpawner`] runs futures only when told to, for deterministic
//! tests and headless stepping.

use crate::prelude::{Arc, Future, Pin};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A trait for spawning async tasks (object-safe version)
pub trait AsyncSpawner: Send + Sync + 'static {
    /// Spawn a future and return a handle to it
    fn spawn_boxed(&self, future: BoxedTask) -> Box<dyn AsyncHandle>;
}

/// Handle to a spawned async task
pub trait AsyncHandle: Send + Sync {
    /// Check if the task is finished
    fn is_finished(&self) -> bool;

    /// Cancel the task. Best effort: a task that already finished, or an
    /// executor without cancellation, may still have run to completion.
    fn cancel(&self);
}

#[cfg(feature = "tokio-runtime")]
pub use tokio_impl::TokioSpawner;

#[cfg(feature = "tokio-runtime")]
mod tokio_impl {
    use super::*;
    use crate::{Error, Result};
    use ::tokio::runtime::Handle;
    use ::tokio::task::JoinHandle;

    /// Spawns onto a tokio runtime; cancelling aborts the task
    #[derive(Debug, Clone)]
    pub struct TokioSpawner {
        handle: Handle,
    }

    impl TokioSpawner {
        /// Uses the runtime the caller is running inside
        pub fn current() -> Result<Self> {
            Handle::try_current()
                .map(|handle| Self { handle })
                .map_err(|e| Error::Runtime(e.to_string()))
        }

        pub fn from_handle(handle: Handle) -> Self {
            Self { handle }
        }
    }

    impl AsyncSpawner for TokioSpawner {
        fn spawn_boxed(&self, future: BoxedTask) -> Box<dyn AsyncHandle> {
            Box::new(TokioHandle(self.handle.spawn(future)))
        }
    }

    struct TokioHandle(JoinHandle<()>);

    impl AsyncHandle for TokioHandle {
        fn is_finished(&self) -> bool {
            self.0.is_finished()
        }

        fn cancel(&self) {
            self.0.abort();
        }
    }
}

struct ManualTask {
    future: BoxedTask,
    cancelled: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

struct ManualState {
    tasks: VecDeque<ManualTask>,
    honour_cancel: bool,
}

/// Holds spawned futures until [`ManualSpawner::run_next`] drives one to
/// completion on the calling thread.
///
/// Clones share the same queue. By default cancelled tasks are discarded
/// unrun; [`ManualSpawner::ignoring_cancel`] keeps them, modelling a
/// transport that cannot abort an in-progress fetch.
#[derive(Clone)]
pub struct ManualSpawner {
    state: Arc<Mutex<ManualState>>,
}

impl ManualSpawner {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                tasks: VecDeque::new(),
                honour_cancel: true,
            })),
        }
    }

    pub fn ignoring_cancel() -> Self {
        let spawner = Self::new();
        if let Ok(mut state) = spawner.state.lock() {
            state.honour_cancel = false;
        }
        spawner
    }

    /// Tasks waiting to run, cancelled ones excluded when cancellation is honoured
    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .map(|state| {
                state
                    .tasks
                    .iter()
                    .filter(|t| !(state.honour_cancel && t.cancelled.load(Ordering::SeqCst)))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Runs the oldest live task to completion. Returns `false` when none is left.
    pub fn run_next(&self) -> bool {
        let task = {
            let Ok(mut state) = self.state.lock() else {
                return false;
            };
            let honour_cancel = state.honour_cancel;
            loop {
                match state.tasks.pop_front() {
                    Some(task) if honour_cancel && task.cancelled.load(Ordering::SeqCst) => {
                        task.finished.store(true, Ordering::SeqCst);
                    }
                    other => break other,
                }
            }
        };

        match task {
            Some(task) => {
                futures::executor::block_on(task.future);
                task.finished.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Runs tasks until the queue is empty, including tasks spawned meanwhile
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }
}

impl Default for ManualSpawner {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncSpawner for ManualSpawner {
    fn spawn_boxed(&self, future: BoxedTask) -> Box<dyn AsyncHandle> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        if let Ok(mut state) = self.state.lock() {
            state.tasks.push_back(ManualTask {
                future,
                cancelled: cancelled.clone(),
                finished: finished.clone(),
            });
        }
        Box::new(ManualHandle { cancelled, finished })
    }
}

struct ManualHandle {
    cancelled: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

impl AsyncHandle for ManualHandle {
    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}
