//! Process-wide instrumentation counters.
//!
//! These mirror the original `DEBUG_METRIC`/`DEBUG_METRIC_ADD` hooks: they
//! are bumped at the same construction/destruction points the core logic
//! already visits, but the core never reads them back. Only tests and
//! external instrumentation consult [`snapshot`].

use portable_atomic::{AtomicUsize, Ordering};

static LIVE_ROOTS: AtomicUsize = AtomicUsize::new(0);
static LIVE_POOLS: AtomicUsize = AtomicUsize::new(0);
static LIVE_CONTEXTS: AtomicUsize = AtomicUsize::new(0);

/// A point-in-time read of the three process-wide counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub live_roots: usize,
    pub live_pools: usize,
    pub live_contexts: usize,
}

pub(crate) fn root_created() {
    LIVE_ROOTS.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn root_destroyed() {
    LIVE_ROOTS.fetch_sub(1, Ordering::Relaxed);
}

pub(crate) fn pool_created() {
    LIVE_POOLS.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn pool_destroyed() {
    LIVE_POOLS.fetch_sub(1, Ordering::Relaxed);
}

pub(crate) fn context_created() {
    LIVE_CONTEXTS.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn context_destroyed() {
    LIVE_CONTEXTS.fetch_sub(1, Ordering::Relaxed);
}

/// Read the current counters. For instrumentation/tests only — never
/// consulted by allocation or deallocation logic.
pub fn snapshot() -> CounterSnapshot {
    CounterSnapshot {
        live_roots: LIVE_ROOTS.load(Ordering::Relaxed),
        live_pools: LIVE_POOLS.load(Ordering::Relaxed),
        live_contexts: LIVE_CONTEXTS.load(Ordering::Relaxed),
    }
}
