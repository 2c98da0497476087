//! Append-only decision audit log

use crate::error::Result;
use crate::types::Decision;
use async_trait::async_trait;
use parking_lot::RwLock;

/// Where every gate decision ends up, BET or not
#[async_trait]
pub trait DecisionLog: Send + Sync {
    async fn append(&self, decision: &Decision) -> Result<()>;

    /// Most recent decisions first
    async fn recent(&self, limit: usize) -> Result<Vec<Decision>>;
}

/// In-process log, used in dry runs and tests
#[derive(Default)]
pub struct MemoryDecisionLog {
    entries: RwLock<Vec<Decision>>,
}

impl MemoryDecisionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Snapshot in append order
    pub fn entries(&self) -> Vec<Decision> {
        self.entries.read().clone()
    }
}

#[async_trait]
impl DecisionLog for MemoryDecisionLog {
    async fn append(&self, decision: &Decision) -> Result<()> {
        self.entries.write().push(decision.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<Decision>> {
        Ok(self.entries.read().iter().rev().take(limit).cloned().collect())
    }
}
