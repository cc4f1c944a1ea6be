//! Termination criteria for a trial-pool run: by trial count, wall-clock
//! budget, or an externally-flipped stop signal, composable by reference.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Asked after every trial whether the search must stop.
pub trait Cutoff: Send + Sync {
    fn must_stop(&self, trials_run: u64) -> bool;
}

/// Runs until told otherwise; the caller is responsible for bounding the
/// search some other way (e.g. an external channel).
#[derive(Debug, Default, Copy, Clone)]
pub struct NoCutoff;

impl Cutoff for NoCutoff {
    fn must_stop(&self, _trials_run: u64) -> bool {
        false
    }
}

/// Stops once a fixed number of trials have completed.
#[derive(Debug, Clone, Copy)]
pub struct TrialBudget {
    max_trials: u64,
}

impl TrialBudget {
    pub fn new(max_trials: u64) -> Self {
        TrialBudget { max_trials }
    }
}

impl Cutoff for TrialBudget {
    fn must_stop(&self, trials_run: u64) -> bool {
        trials_run >= self.max_trials
    }
}

/// Stops once a wall-clock budget elapses, timed by a background thread so
/// workers only ever pay the cost of an atomic load.
#[derive(Debug, Clone)]
pub struct TimeBudget {
    stop: Arc<AtomicBool>,
}

impl TimeBudget {
    pub fn new(budget: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        std::thread::spawn(move || {
            std::thread::sleep(budget);
            flag.store(true, Ordering::Relaxed);
        });
        TimeBudget { stop }
    }
}

impl Cutoff for TimeBudget {
    fn must_stop(&self, _trials_run: u64) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

/// A shared flag a caller can flip from outside the worker pool (e.g. a
/// signal handler or a supervising thread) to request an early stop.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    stop: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        StopSignal::default()
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

impl Cutoff for StopSignal {
    fn must_stop(&self, _trials_run: u64) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

/// Combines two cutoffs: stops as soon as either would.
#[derive(Debug, Clone)]
pub struct AnyOf<A, B> {
    a: A,
    b: B,
}

impl<A, B> AnyOf<A, B> {
    pub fn new(a: A, b: B) -> Self {
        AnyOf { a, b }
    }
}

impl<A: Cutoff, B: Cutoff> Cutoff for AnyOf<A, B> {
    fn must_stop(&self, trials_run: u64) -> bool {
        self.a.must_stop(trials_run) || self.b.must_stop(trials_run)
    }
}

/// A lock-free running count of completed trials, shared across workers so
/// each can check its own `TrialBudget` without a mutex.
#[derive(Debug, Default)]
pub struct TrialCounter {
    count: AtomicU64,
}

impl TrialCounter {
    pub fn new() -> Self {
        TrialCounter::default()
    }

    pub fn increment(&self) -> u64 {
        self.count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_cutoff_never_stops() {
        assert!(!NoCutoff.must_stop(1_000_000));
    }

    #[test]
    fn trial_budget_stops_once_reached() {
        let budget = TrialBudget::new(10);
        assert!(!budget.must_stop(9));
        assert!(budget.must_stop(10));
        assert!(budget.must_stop(11));
    }

    #[test]
    fn stop_signal_flips_on_request() {
        let signal = StopSignal::new();
        assert!(!signal.must_stop(0));
        signal.request_stop();
        assert!(signal.must_stop(0));
    }

    #[test]
    fn any_of_stops_when_either_side_does() {
        let combo = AnyOf::new(TrialBudget::new(100), NoCutoff);
        assert!(!combo.must_stop(5));
        let combo2 = AnyOf::new(TrialBudget::new(5), NoCutoff);
        assert!(combo2.must_stop(5));
    }

    #[test]
    fn trial_counter_increments_atomically() {
        let counter = TrialCounter::new();
        assert_eq!(1, counter.increment());
        assert_eq!(2, counter.increment());
        assert_eq!(2, counter.get());
    }
}
