use anyhow::{Result, anyhow};
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// Shared flag telling an in-flight reflow pass that a newer one replaced it.
///
/// Holds the generation of the superseding pass, or zero while still live.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    superseded_by: Arc<AtomicU64>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the pass as replaced by pass `generation` (non-zero).
    pub fn cancel_by(&self, generation: u64) {
        self.superseded_by.store(generation.max(1), Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.superseded_by().is_some()
    }

    pub fn superseded_by(&self) -> Option<u64> {
        match self.superseded_by.load(Ordering::Acquire) {
            0 => None,
            generation => Some(generation),
        }
    }

    pub fn check_cancelled(&self, stage: &'static str) -> Result<()> {
        if let Some(generation) = self.superseded_by() {
            return Err(anyhow!(
                "reflow pass superseded by generation={generation} at stage={stage}"
            ));
        }
        Ok(())
    }
}
