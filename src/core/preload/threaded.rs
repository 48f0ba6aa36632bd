//=========================================================================
// Threaded Loader
//=========================================================================
//
// Reference `Loader` that runs load functions on a small worker pool.
//
// Architecture:
// ```text
//  Flow thread:                        Worker threads (N):
//  ┌────────────────────────┐         ┌─────────────────────────┐
//  │ PreloadCache           │         │ loop {                  │
//  │   └─ load(key, cancel) │  Job    │   job = jobs.recv()     │
//  │        ├─ LoadHandle ──┼────────>│   cancelled? → cancel() │
//  │        └─ jobs.send()  │         │   load_fn(key)          │
//  │                        │         │   handle.complete(..)   │
//  │ Situation::poll_load   │<────────┼── (shared slot)         │
//  └────────────────────────┘         └─────────────────────────┘
// ```
//
// Dropping the loader closes the job channel and joins every worker.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, warn};

//=== Internal Dependencies ===============================================

use super::loader::{LoadHandle, Loader, Resource};
use crate::core::cancel::CancelToken;
use crate::core::error::HookError;

//=== Type Aliases ========================================================

type LoadFn = dyn Fn(&str) -> Result<Resource, HookError> + Send + Sync;
type ExistsFn = dyn Fn(&str) -> bool + Send + Sync;

//=== Job =================================================================

struct Job {
    key: String,
    handle: LoadHandle,
    cancel: CancelToken,
}

//=== ThreadedLoaderBuilder ===============================================

/// Builder for a [`ThreadedLoader`].
///
/// # Default Values
///
/// - **Workers**: 2
/// - **Exists predicate**: every key exists
pub struct ThreadedLoaderBuilder {
    workers: usize,
    load_fn: Arc<LoadFn>,
    exists_fn: Arc<ExistsFn>,
}

impl ThreadedLoaderBuilder {
    /// Sets the number of worker threads.
    ///
    /// # Panics
    ///
    /// Panics if `workers == 0`.
    pub fn with_workers(mut self, workers: usize) -> Self {
        assert!(workers > 0, "Worker count must be positive");
        self.workers = workers;
        self
    }

    /// Sets the predicate answering [`Loader::exists`].
    pub fn with_exists<F>(mut self, exists: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.exists_fn = Arc::new(exists);
        self
    }

    /// Spawns the worker pool.
    pub fn build(self) -> ThreadedLoader {
        let (jobs, receiver) = unbounded::<Job>();

        let workers = (0..self.workers)
            .map(|index| {
                let receiver = receiver.clone();
                let load_fn = Arc::clone(&self.load_fn);
                thread::Builder::new()
                    .name(format!("flow-loader-{index}"))
                    .spawn(move || worker_loop(receiver, load_fn))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    error!("Failed to spawn loader worker: {}", e);
                    None
                }
            })
            .collect::<Vec<_>>();

        debug!("Threaded loader started with {} workers", workers.len());

        ThreadedLoader {
            jobs: Some(jobs),
            workers,
            exists_fn: self.exists_fn,
        }
    }
}

//=== ThreadedLoader ======================================================

/// Loader that runs a user-supplied load function on worker threads.
pub struct ThreadedLoader {
    jobs: Option<Sender<Job>>,
    workers: Vec<thread::JoinHandle<()>>,
    exists_fn: Arc<ExistsFn>,
}

impl ThreadedLoader {
    /// Starts building a loader around `load_fn`.
    pub fn builder<F>(load_fn: F) -> ThreadedLoaderBuilder
    where
        F: Fn(&str) -> Result<Resource, HookError> + Send + Sync + 'static,
    {
        ThreadedLoaderBuilder {
            workers: 2,
            load_fn: Arc::new(load_fn),
            exists_fn: Arc::new(|_| true),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Loader for ThreadedLoader {
    fn exists(&self, key: &str) -> bool {
        (self.exists_fn)(key)
    }

    fn load(&mut self, key: &str, cancel: CancelToken) -> LoadHandle {
        let handle = LoadHandle::pending(key);

        let Some(jobs) = &self.jobs else {
            handle.complete(Err(anyhow::anyhow!("loader is shut down")));
            return handle;
        };

        let job = Job {
            key: key.to_string(),
            handle: handle.clone(),
            cancel,
        };

        if jobs.send(job).is_err() {
            warn!("Loader workers are gone, failing {:?}", key);
            handle.complete(Err(anyhow::anyhow!("loader workers are gone")));
        }

        handle
    }
}

impl Drop for ThreadedLoader {
    fn drop(&mut self) {
        // Closing the channel ends every worker loop
        self.jobs.take();

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("Loader worker panicked");
            }
        }
    }
}

//=== Worker ==============================================================

fn worker_loop(receiver: Receiver<Job>, load_fn: Arc<LoadFn>) {
    while let Ok(job) = receiver.recv() {
        if job.cancel.is_cancelled() {
            job.handle.cancel();
            continue;
        }

        let result = load_fn(&job.key);

        if job.cancel.is_cancelled() {
            job.handle.cancel();
        } else {
            job.handle.complete(result);
        }
    }
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cancel::CancelSource;
    use crate::core::preload::LoadStatus;
    use std::time::{Duration, Instant};

    fn wait_until_done(handle: &LoadHandle) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !handle.is_done() {
            assert!(Instant::now() < deadline, "load did not settle in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn loads_on_worker_threads() {
        let mut loader = ThreadedLoader::builder(|key| Ok(Resource::new(key.len())))
            .with_workers(3)
            .build();
        assert_eq!(loader.worker_count(), 3);

        let handle = loader.load("scene/harbor", CancelToken::never());
        wait_until_done(&handle);

        let resource = handle.resource().expect("ready");
        assert_eq!(resource.downcast_ref::<usize>(), Some(&12));
    }

    #[test]
    fn load_errors_become_failed_handles() {
        let mut loader = ThreadedLoader::builder(|key| Err(anyhow::anyhow!("no such file: {key}")))
            .build();

        let handle = loader.load("a", CancelToken::never());
        wait_until_done(&handle);

        match handle.status() {
            LoadStatus::Failed(reason) => assert!(reason.contains("no such file: a")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cancelled_jobs_are_skipped() {
        let mut loader = ThreadedLoader::builder(|_| Ok(Resource::new(()))).build();
        let source = CancelSource::new();
        source.cancel();

        let handle = loader.load("a", source.token());
        wait_until_done(&handle);

        assert!(matches!(handle.status(), LoadStatus::Cancelled));
    }

    #[test]
    fn exists_predicate_is_used() {
        let loader = ThreadedLoader::builder(|_| Ok(Resource::new(())))
            .with_exists(|key| key.starts_with("scene/"))
            .build();

        assert!(loader.exists("scene/a"));
        assert!(!loader.exists("ui/a"));
    }

    #[test]
    #[should_panic(expected = "Worker count must be positive")]
    fn zero_workers_panics() {
        let _ = ThreadedLoader::builder(|_| Ok(Resource::new(()))).with_workers(0);
    }
}
