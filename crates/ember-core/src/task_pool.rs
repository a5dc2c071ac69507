//! Worker task pool.
//!
//! A fixed set of threads ticking a shared [`async_executor::Executor`].
//! The asset system dispatches file reads and decode jobs here; each job is
//! a [`Task`] whose completion is polled with [`Task::is_finished`] and
//! whose result is collected with `futures_lite::future::block_on` once it
//! reports done. Dropping a task cancels it if it has not started yet.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

pub use async_executor::Task;
use async_executor::Executor;

pub struct TaskPool {
    executor: Arc<Executor<'static>>,
    threads: Vec<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl TaskPool {
    /// Create a pool with `num_threads` workers.
    ///
    /// # Panics
    ///
    /// Panics if `num_threads` is 0.
    pub fn new(num_threads: usize) -> Self {
        assert!(num_threads > 0, "TaskPool must have at least one thread");

        let executor = Arc::new(Executor::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut threads = Vec::with_capacity(num_threads);

        for i in 0..num_threads {
            let exec = executor.clone();
            let shutdown_flag = shutdown.clone();

            let handle = thread::Builder::new()
                .name(format!("ember-worker-{}", i))
                .spawn(move || {
                    while !shutdown_flag.load(Ordering::Relaxed) {
                        if !exec.try_tick() {
                            thread::sleep(std::time::Duration::from_millis(1));
                        }
                    }
                })
                .expect("failed to spawn task pool thread");

            threads.push(handle);
        }

        tracing::debug!("TaskPool created with {} threads", num_threads);

        Self {
            executor,
            threads,
            shutdown,
        }
    }

    /// Create a pool leaving one core free for the driving thread.
    pub fn default_threads() -> Self {
        let num_threads = (num_cpus::get().saturating_sub(1)).max(1);
        Self::new(num_threads)
    }

    /// Spawn a task on the pool.
    pub fn spawn<T>(&self, future: impl Future<Output = T> + Send + 'static) -> Task<T>
    where
        T: Send + 'static,
    {
        self.executor.spawn(future)
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Shut the pool down and join all worker threads.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        let threads = std::mem::take(&mut self.threads);
        for handle in threads {
            if let Err(e) = handle.join() {
                tracing::error!("task pool thread panicked: {:?}", e);
            }
        }
    }
}

impl Default for TaskPool {
    fn default() -> Self {
        Self::default_threads()
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}
