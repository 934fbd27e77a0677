//! Durable batch progress documents.
//!
//! One `_progress.json` per batch directory. Updates are merge-style: a
//! [`ProgressUpdate`] overwrites only the fields it carries, and the stage
//! map is merged key-by-key. Every write is atomic, so pollers can read
//! the document at any moment without coordination.

use std::path::PathBuf;

use leadflow_shared::{BatchId, BatchProgress, LeadFlowError, ProgressUpdate, Result};
use tracing::debug;

use crate::{DataLayout, write_atomic};

/// Reader/writer for progress documents under one data root.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    layout: DataLayout,
}

impl ProgressStore {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    pub fn path(&self, batch_id: &BatchId) -> PathBuf {
        self.layout.progress_file(batch_id)
    }

    /// Write the initial document for a batch.
    pub fn init(&self, progress: &BatchProgress) -> Result<()> {
        self.write(progress)
    }

    /// Load the current document. `NotFound` if the batch has none.
    pub fn read(&self, batch_id: &BatchId) -> Result<BatchProgress> {
        let path = self.path(batch_id);
        if !path.exists() {
            return Err(LeadFlowError::not_found(format!(
                "progress for batch {batch_id}"
            )));
        }

        let content =
            std::fs::read_to_string(&path).map_err(|e| LeadFlowError::io(&path, e))?;
        serde_json::from_str(&content).map_err(|e| {
            LeadFlowError::Storage(format!("corrupt progress document {}: {e}", path.display()))
        })
    }

    /// Read-merge-write: load the current document (or start from a fresh
    /// pending one if it is missing), apply the update, persist atomically.
    /// Returns the merged document.
    pub fn apply(&self, batch_id: &BatchId, update: ProgressUpdate) -> Result<BatchProgress> {
        let mut progress = match self.read(batch_id) {
            Ok(progress) => progress,
            Err(LeadFlowError::NotFound { .. }) => {
                BatchProgress::pending(batch_id.clone(), update.total.unwrap_or(0))
            }
            Err(e) => return Err(e),
        };

        progress.apply(update);
        self.write(&progress)?;
        debug!(
            %batch_id,
            status = %progress.status,
            percent = progress.percent,
            "progress updated"
        );
        Ok(progress)
    }

    fn write(&self, progress: &BatchProgress) -> Result<()> {
        let path = self.path(&progress.batch_id);
        let content = serde_json::to_vec_pretty(progress)
            .map_err(|e| LeadFlowError::Storage(format!("serialize progress: {e}")))?;
        write_atomic(&path, &content)
    }
}
