use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free turn counters for the memory manager
#[derive(Debug, Default)]
pub struct TurnMetrics {
    turns_started: AtomicU64,
    turns_completed: AtomicU64,
    generation_failures: AtomicU64,
    estimation_failures: AtomicU64,
    cancellations: AtomicU64,
}

impl TurnMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_started(&self) {
        self.turns_started.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_completed(&self) {
        self.turns_completed.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_generation_failure(&self) {
        self.generation_failures.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_estimation_failure(&self) {
        self.estimation_failures.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_cancelled(&self) {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn turns_started(&self) -> u64 {
        self.turns_started.load(Ordering::Relaxed)
    }
    pub fn turns_completed(&self) -> u64 {
        self.turns_completed.load(Ordering::Relaxed)
    }
    pub fn generation_failures(&self) -> u64 {
        self.generation_failures.load(Ordering::Relaxed)
    }
    pub fn estimation_failures(&self) -> u64 {
        self.estimation_failures.load(Ordering::Relaxed)
    }
    pub fn cancellations(&self) -> u64 {
        self.cancellations.load(Ordering::Relaxed)
    }
}
