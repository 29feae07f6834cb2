//! Learning-event channel from the orchestrator to the pattern registry.
//! Bounded: a slow registry drops events (counted) rather than stalling
//! extraction.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use siphon_core::ExtractionEvent;
use siphon_patterns::PatternRegistry;

const BUS_CAPACITY: usize = 256;

pub struct LearningBus {
    tx: mpsc::Sender<ExtractionEvent>,
    dropped: Arc<AtomicU64>,
}

impl LearningBus {
    /// Spawn the drain task; the registry consumes events under its own
    /// locks.
    pub fn start(registry: Arc<PatternRegistry>) -> Self {
        let (tx, mut rx) = mpsc::channel::<ExtractionEvent>(BUS_CAPACITY);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match registry.learn_from_extraction(&event).await {
                    Ok(Some(id)) => debug!(pattern = %id, "learning event applied"),
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "learning event rejected"),
                }
            }
        });
        Self { tx, dropped: Arc::new(AtomicU64::new(0)) }
    }

    pub fn emit(&self, event: ExtractionEvent) {
        if self.tx.try_send(event).is_err() {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(total, "learning bus full, event dropped");
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
