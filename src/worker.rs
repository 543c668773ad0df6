use crate::config::Config;
use crate::error::SimError;
use log::{error, info};
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

const DEFAULT_STACK_BYTES: usize = 4 * 1024 * 1024;

/// Dedicated rayon pool for trial chunks, so long runs do not compete with the
/// global pool and a panicking chunk surfaces as an error instead of aborting.
pub struct TrialWorker {
    pool: Arc<ThreadPool>,
    num_threads: usize,
}

impl TrialWorker {
    /// `requested_threads == 0` means "all cores but one".
    pub fn new(requested_threads: usize) -> Result<Self, SimError> {
        let cores = available_cores();
        let num_threads = if requested_threads == 0 {
            if cores > 2 {
                cores - 1
            } else {
                cores
            }
        } else {
            requested_threads
        };
        Self::build_pool(num_threads, DEFAULT_STACK_BYTES)
    }

    pub fn new_with_config(config: &Config) -> Result<Self, SimError> {
        let cores = available_cores();
        let mut num_threads = if cores > config.worker_reserve_cores {
            cores - config.worker_reserve_cores
        } else {
            1
        };
        if config.worker_max_threads > 0 && num_threads > config.worker_max_threads {
            num_threads = config.worker_max_threads;
        }
        let stack_size = if config.worker_stack_size_mb == 0 {
            DEFAULT_STACK_BYTES
        } else {
            config.worker_stack_size_mb * 1024 * 1024
        };
        Self::build_pool(num_threads, stack_size)
    }

    fn build_pool(num_threads: usize, stack_size: usize) -> Result<Self, SimError> {
        Self::from_build(num_threads, || {
            ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .thread_name(|i| format!("trial-worker-{}", i))
                .stack_size(stack_size)
                .panic_handler(|err| {
                    error!("[Worker] Thread panicked: {:?}", err);
                })
                .build()
        })
    }

    fn from_build<B>(num_threads: usize, build: B) -> Result<Self, SimError>
    where
        B: FnOnce() -> Result<ThreadPool, ThreadPoolBuildError>,
    {
        let pool = build().map_err(|e| SimError::PoolBuild(e.to_string()))?;

        info!("[Worker] Initialized with {} threads.", num_threads);

        Ok(Self {
            pool: Arc::new(pool),
            num_threads,
        })
    }

    /// Runs `f` inside the pool; a panic anywhere in it becomes `WorkerPanic`.
    pub fn execute<F, R>(&self, f: F) -> Result<R, SimError>
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        let result = self
            .pool
            .install(|| panic::catch_unwind(AssertUnwindSafe(f)));

        result.map_err(|err| {
            let msg = if let Some(s) = err.downcast_ref::<&str>() {
                format!("task panicked: {}", s)
            } else if let Some(s) = err.downcast_ref::<String>() {
                format!("task panicked: {}", s)
            } else {
                "task panicked with unknown payload".to_string()
            };
            SimError::WorkerPanic(msg)
        })
    }

    pub fn thread_count(&self) -> usize {
        self.num_threads
    }
}

fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn explicit_thread_count_is_honoured() {
        let worker = TrialWorker::new(2).unwrap();
        assert_eq!(worker.thread_count(), 2);
        let sum = worker.execute(|| (0..1000u64).into_par_iter().sum::<u64>()).unwrap();
        assert_eq!(sum, 499_500);
    }

    #[test]
    fn config_caps_threads() {
        let config = Config {
            worker_max_threads: 1,
            worker_reserve_cores: 0,
            ..Config::default()
        };
        let worker = TrialWorker::new_with_config(&config).unwrap();
        assert_eq!(worker.thread_count(), 1);
    }

    #[test]
    fn failed_thread_spawn_is_a_pool_error() {
        let result = TrialWorker::from_build(2, || {
            ThreadPoolBuilder::new()
                .num_threads(2)
                .spawn_handler(|_| Err(std::io::Error::new(std::io::ErrorKind::Other, "refused")))
                .build()
        });
        match result {
            Err(SimError::PoolBuild(msg)) => assert!(!msg.is_empty()),
            Err(other) => panic!("expected PoolBuild, got {:?}", other),
            Ok(_) => panic!("expected PoolBuild, got a pool"),
        }
    }

    #[test]
    fn panics_become_errors() {
        let worker = TrialWorker::new(1).unwrap();
        let result: Result<(), SimError> = worker.execute(|| panic!("bad chunk"));
        match result {
            Err(SimError::WorkerPanic(msg)) => assert!(msg.contains("bad chunk")),
            other => panic!("expected WorkerPanic, got {:?}", other.map(|_| ())),
        }
    }
}
