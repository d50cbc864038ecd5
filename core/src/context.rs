//! Explicit runtime context, standing in for a distributed process-grid
//! communicator with a passed-around record.

use std::sync::atomic::{AtomicUsize, Ordering};

/// The three-way process-grid split: initial condition colour,
/// linear-algebra colour, and optimisation colour.
///
/// optctl runs single-process, so `*_size` fields describe the logical
/// shard count used to partition work with `rayon` rather than real MPI
/// ranks; `*_rank` is always 0 for the linear-algebra and optimisation
/// colours since those are not parallelised in this design.
#[derive(Debug, Clone, Copy)]
pub struct RunContext {
    pub initcond_rank: usize,
    pub initcond_size: usize,
    pub linalg_rank: usize,
    pub linalg_size: usize,
    pub optim_rank: usize,
    pub optim_size: usize,
}

impl RunContext {
    /// A single-shard context: every initial condition handled locally,
    /// no linear-algebra or optimisation splitting.
    pub fn single() -> Self {
        Self {
            initcond_rank: 0,
            initcond_size: 1,
            linalg_rank: 0,
            linalg_size: 1,
            optim_rank: 0,
            optim_size: 1,
        }
    }

    /// Range of initial-condition indices owned by this shard, given the
    /// total number of initial conditions `ninit`.
    pub fn local_initcond_range(&self, ninit: usize) -> std::ops::Range<usize> {
        let per_shard = ninit.div_ceil(self.initcond_size);
        let start = (self.initcond_rank * per_shard).min(ninit);
        let stop = ((self.initcond_rank + 1) * per_shard).min(ninit);
        start..stop
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::single()
    }
}

/// Per-rank diagnostic counter for non-fatal warnings.
#[derive(Debug, Default)]
pub struct Diagnostics {
    solver_nonconvergence: AtomicUsize,
    numerical_warnings: AtomicUsize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_nonconvergence(&self) {
        self.solver_nonconvergence.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_numerical_warning(&self) {
        self.numerical_warnings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn solver_nonconvergence_count(&self) -> usize {
        self.solver_nonconvergence.load(Ordering::Relaxed)
    }

    pub fn numerical_warning_count(&self) -> usize {
        self.numerical_warnings.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> usize {
        self.solver_nonconvergence_count() + self.numerical_warning_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_context_owns_everything() {
        let ctx = RunContext::single();
        assert_eq!(ctx.local_initcond_range(7), 0..7);
    }

    #[test]
    fn shard_splits_evenly_with_remainder() {
        let ctx = RunContext { initcond_rank: 1, initcond_size: 3, ..RunContext::single() };
        // 7 initial conditions over 3 shards -> per_shard = 3, shard 1 owns [3,6)
        assert_eq!(ctx.local_initcond_range(7), 3..6);
    }

    #[test]
    fn diagnostics_accumulate() {
        let diag = Diagnostics::new();
        diag.record_nonconvergence();
        diag.record_nonconvergence();
        diag.record_numerical_warning();
        assert_eq!(diag.solver_nonconvergence_count(), 2);
        assert_eq!(diag.numerical_warning_count(), 1);
        assert_eq!(diag.total(), 3);
    }
}
