//! Lazily-constructed process-wide default thread pool, published the first
//! time a task is spawned without an explicit scheduler. Mirrors the
//! `OnceLock<Scheduler>` singleton in `namlc/src/runtime/scheduler.rs`.

use crate::config::Config;
use crate::pool::ThreadPool;
use crate::scheduler::{current_scheduler, Scheduler};
use std::sync::{Arc, OnceLock};

static DEFAULT_POOL: OnceLock<Arc<ThreadPool>> = OnceLock::new();

/// Resolves the scheduler a task gets when none is given explicitly: the
/// calling thread's published current scheduler (set on worker entry) if
/// one exists, else the lazily-built process-wide default pool.
pub fn default_scheduler() -> Arc<dyn Scheduler> {
    current_scheduler().unwrap_or_else(lazy_default_pool)
}

fn lazy_default_pool() -> Arc<dyn Scheduler> {
    Arc::clone(DEFAULT_POOL.get_or_init(|| ThreadPool::build_with_config(
        Config::default().pool_threads,
        &Config::default(),
    ))) as Arc<dyn Scheduler>
}
