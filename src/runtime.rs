use std::{
    any::Any,
    cell::RefCell,
    future::Future,
    mem::{replace, take},
    rc::{Rc, Weak},
};

use derive_ex::derive_ex;
use futures::{
    executor::{LocalPool, LocalSpawner},
    future::LocalBoxFuture,
    task::LocalSpawnExt,
    FutureExt,
};

#[cfg(test)]
mod tests;

thread_local! {
    static GLOBALS: RefCell<Globals> = RefCell::new(Globals::new());
}

struct Globals {
    is_runtime_exists: bool,
    tasks: Vec<Task>,
    futures: Vec<LocalBoxFuture<'static, ()>>,
}
impl Globals {
    fn new() -> Self {
        Self {
            is_runtime_exists: false,
            tasks: Vec::new(),
            futures: Vec::new(),
        }
    }
    fn with<T>(f: impl FnOnce(&mut Self) -> T) -> T {
        GLOBALS.with(|g| f(&mut g.borrow_mut()))
    }
    fn try_with<T>(f: impl FnOnce(&mut Self) -> T) -> Option<T> {
        GLOBALS.try_with(|g| f(&mut g.borrow_mut())).ok()
    }
    fn swap_vec<T>(f: impl FnOnce(&mut Self) -> &mut Vec<T>, values: &mut Vec<T>) -> bool {
        Self::with(|g| std::mem::swap(f(g), values));
        !values.is_empty()
    }
    #[allow(clippy::type_complexity)]
    fn finish_runtime(&mut self) -> (Vec<Task>, Vec<LocalBoxFuture<'static, ()>>) {
        self.is_runtime_exists = false;
        (take(&mut self.tasks), take(&mut self.futures))
    }
}

/// Deferred-callback scheduler and local executor.
///
/// Callbacks scheduled with [`Task::schedule`] run after the current synchronous segment,
/// when [`update`](Self::update) or [`run_tasks`](Self::run_tasks) is called.
/// Futures started with [`spawn_local`] are driven by [`update`](Self::update).
///
/// Only one `Runtime` can exist in the same thread at the same time.
#[derive_ex(Default)]
#[default(Self::new())]
pub struct Runtime {
    pool: LocalPool,
    spawner: LocalSpawner,
    tasks_buffer: Vec<Task>,
    futures_buffer: Vec<LocalBoxFuture<'static, ()>>,
}
impl Runtime {
    pub fn new() -> Self {
        if Globals::with(|g| replace(&mut g.is_runtime_exists, true)) {
            panic!("Only one `Runtime` can exist in the same thread at the same time.");
        };
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            pool,
            spawner,
            tasks_buffer: Vec::new(),
            futures_buffer: Vec::new(),
        }
    }

    /// Perform scheduled tasks, including tasks scheduled by those tasks.
    ///
    /// Returns `true` if any task was performed.
    pub fn run_tasks(&mut self) -> bool {
        let mut handled = false;
        let mut tasks = take(&mut self.tasks_buffer);
        while Globals::swap_vec(|g| &mut g.tasks, &mut tasks) {
            for task in tasks.drain(..) {
                task.run();
                handled = true;
            }
        }
        self.tasks_buffer = tasks;
        handled
    }

    /// Poll spawned futures until none of them can make progress.
    ///
    /// Returns `true` if any future was started.
    pub fn run_futures(&mut self) -> bool {
        let mut futures = take(&mut self.futures_buffer);
        let started = Globals::swap_vec(|g| &mut g.futures, &mut futures);
        for future in futures.drain(..) {
            if self.spawner.spawn_local(future).is_err() {
                tracing::warn!("local executor is shut down; future dropped");
            }
        }
        self.futures_buffer = futures;
        self.pool.run_until_stalled();
        started
    }

    /// Repeat until there are no more processes to do
    /// [`run_futures`](Self::run_futures) or [`run_tasks`](Self::run_tasks).
    pub fn update(&mut self) {
        loop {
            let started = self.run_futures();
            if self.run_tasks() {
                continue;
            }
            if started || Globals::with(|g| !g.futures.is_empty()) {
                continue;
            }
            break;
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        // Pending work is dropped outside of the globals borrow.
        let pending = Globals::try_with(|g| g.finish_runtime());
        drop(pending);
    }
}

/// Starts a future on the current thread's [`Runtime`].
///
/// The future is first polled by the next [`Runtime::update`].
pub fn spawn_local(future: impl Future<Output = ()> + 'static) {
    let _ = Globals::try_with(|g| g.futures.push(future.boxed_local()));
}

/// A callback deferred until after the current synchronous segment.
pub struct Task(RawTask);

impl Task {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Task(RawTask::Box(Box::new(f)))
    }

    /// Creates a task that runs only if `this` is still alive when the task is performed.
    pub fn from_weak_fn<T: Any>(this: Weak<T>, f: impl Fn(Rc<T>) + 'static) -> Self {
        Task(RawTask::Weak {
            this,
            f: Box::new(move |this| {
                if let Some(this) = this.upgrade() {
                    if let Ok(this) = this.downcast() {
                        f(this)
                    }
                }
            }),
        })
    }

    /// Queues the task on the current thread's [`Runtime`]. Without a runtime the task is dropped.
    pub fn schedule(self) {
        if Globals::try_with(|g| g.is_runtime_exists) != Some(true) {
            tracing::warn!("no runtime on this thread; task dropped");
            return;
        }
        Globals::with(|g| g.tasks.push(self));
    }
    fn run(self) {
        match self.0 {
            RawTask::Box(f) => f(),
            RawTask::Weak { this, f } => f(this),
        }
    }
}

enum RawTask {
    Box(Box<dyn FnOnce()>),
    Weak {
        this: Weak<dyn Any>,
        #[allow(clippy::type_complexity)]
        f: Box<dyn Fn(Weak<dyn Any>)>,
    },
}
