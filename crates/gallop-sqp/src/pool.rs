//! Worker pool for per-stage parallel work.
//!
//! One task runs per worker; the calling thread acts as the last worker so a
//! single-threaded configuration never spawns. Workers share nothing except
//! what the task closure captures (typically an atomic stage counter,
//! write-disjoint result slots and a failure flag), and each receives its
//! own context with the per-worker provider clones. Results are returned in
//! worker-id order, which fixes the reduction order of per-worker
//! accumulators.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Claim stages from a shared counter until it runs past `limit`.
///
/// Every call returns a distinct index; any worker may claim any stage.
pub struct StageCounter {
    next: AtomicUsize,
    limit: usize,
}

impl StageCounter {
    /// Counter over `0..=limit`.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            next: AtomicUsize::new(0),
            limit,
        }
    }

    /// Claim the next stage, or `None` when all stages are taken.
    pub fn claim(&self) -> Option<usize> {
        let i = self.next.fetch_add(1, Ordering::Relaxed);
        (i <= self.limit).then_some(i)
    }
}

/// Run `task` once per worker, handing each its context from `contexts`.
///
/// The last context executes on the calling thread; the rest run on scoped
/// OS threads. Blocks until every worker returns and yields the results in
/// worker-id order.
///
/// # Panics
/// Propagates a panic from any worker; panics on an empty context list.
pub fn run_parallel<C, R, F>(contexts: Vec<C>, task: F) -> Vec<R>
where
    C: Send,
    R: Send,
    F: Fn(usize, C) -> R + Sync,
{
    let mut contexts = contexts;
    let caller_context = contexts.pop().expect("at least one worker context");
    let caller_id = contexts.len();

    if caller_id == 0 {
        return vec![task(0, caller_context)];
    }

    std::thread::scope(|scope| {
        let task = &task;
        let handles: Vec<_> = contexts
            .into_iter()
            .enumerate()
            .map(|(id, context)| scope.spawn(move || task(id, context)))
            .collect();

        let caller_result = task(caller_id, caller_context);

        let mut results: Vec<R> = handles
            .into_iter()
            .map(|h| h.join().expect("worker thread panicked"))
            .collect();
        results.push(caller_result);
        results
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
