use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Coalesces bursts of triggers: only the last trigger of a burst survives its quiet window.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    generation: Arc<AtomicU64>,
}

#[derive(Debug)]
pub struct DebounceTicket {
    window: Duration,
    generation: u64,
    latest: Arc<AtomicU64>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn trigger(&self) -> DebounceTicket {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        DebounceTicket {
            window: self.window,
            generation,
            latest: self.generation.clone(),
        }
    }

    /// Invalidates every outstanding ticket.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl DebounceTicket {
    pub fn is_latest(&self) -> bool {
        self.latest.load(Ordering::SeqCst) == self.generation
    }

    /// Sleeps through the quiet window. Returns false if a newer trigger or a cancel
    /// happened in the meantime.
    pub async fn wait(self) -> bool {
        tokio::time::sleep(self.window).await;
        self.is_latest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn only_the_last_trigger_fires() {
        let debouncer = Debouncer::new(Duration::from_millis(500));
        let first = debouncer.trigger();
        let second = debouncer.trigger();
        assert!(!first.wait().await);
        assert!(second.wait().await);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_outstanding_tickets() {
        let debouncer = Debouncer::default();
        let ticket = debouncer.trigger();
        debouncer.cancel();
        assert!(!ticket.wait().await);
    }
}
