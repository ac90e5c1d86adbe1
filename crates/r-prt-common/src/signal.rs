//! ---
//! prt_section: "01-core-functionality"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Trip signal shared between GOOSE ingestion, sequences and testers."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Single-bit trip flag. Clones share the same flag.
///
/// Set by the GOOSE ingestion path, read and consumed by the sequence orchestrator and
/// the relay testers. Last write wins; readers observe either the old or the new value.
#[derive(Debug, Clone, Default)]
pub struct TripSignal {
    flag: Arc<AtomicBool>,
}

impl TripSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Consume the trip: returns whether it was set and clears it.
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }
}

/// Process-wide context handed to every component at construction.
///
/// Constructed per bench (or per test) rather than held in a global so that
/// independent benches never observe each other's trips.
#[derive(Debug, Clone, Default)]
pub struct TestContext {
    trip: TripSignal,
}

impl TestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trip_signal(&self) -> TripSignal {
        self.trip.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let context = TestContext::new();
        let writer = context.trip_signal();
        let reader = context.trip_signal();
        assert!(!reader.is_set());
        writer.set();
        assert!(reader.is_set());
        assert!(reader.take());
        assert!(!writer.is_set());
        assert!(!reader.take());
    }

    #[test]
    fn contexts_are_isolated() {
        let a = TestContext::new();
        let b = TestContext::new();
        a.trip_signal().set();
        assert!(!b.trip_signal().is_set());
    }
}
