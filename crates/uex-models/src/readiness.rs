use std::sync::atomic::{AtomicU8, Ordering};

const READY: u8 = 0b01;
const PENDING: u8 = 0b10;

/// Cross-thread readiness signal between the import worker and the request path.
///
/// The import orchestrator publishes coarse progress and flips the engine to
/// ready once a cycle completes; the dispatcher reads both and records when a
/// caller was turned away so a one-shot "now available" notice can follow.
#[derive(Debug, Default)]
pub struct Readiness {
    /// `READY` and `PENDING` bits, updated together.
    state: AtomicU8,
    progress: AtomicU8,
}

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.state.load(Ordering::Acquire) & READY != 0
    }

    /// Import progress in percent (0..=100).
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::Acquire)
    }

    pub fn set_progress(&self, percent: u8) {
        self.progress.store(percent.min(100), Ordering::Release);
    }

    /// Record that a caller attempted a tool call while not ready. Ignored once
    /// ready, so a late caller cannot leave a stale flag behind.
    pub fn note_pending_request(&self) {
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                (state & READY == 0).then_some(state | PENDING)
            });
    }

    pub fn has_pending_request(&self) -> bool {
        self.state.load(Ordering::Acquire) & PENDING != 0
    }

    /// Flip to ready. Returns true exactly once per pending request, when the
    /// caller should emit the "now available" notification.
    pub fn mark_ready(&self) -> bool {
        self.progress.store(100, Ordering::Release);
        let previous = self.state.swap(READY, Ordering::AcqRel);
        previous == PENDING
    }

    pub fn mark_not_ready(&self) {
        self.state.fetch_and(!READY, Ordering::AcqRel);
        self.progress.store(0, Ordering::Release);
    }
}
