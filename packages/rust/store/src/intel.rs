//! Canonical per-lead intel store.
//!
//! One JSON document at the data root mapping `lead_id` to its latest
//! [`EnrichmentState`]. Merges are insert-or-replace per lead: the store
//! keeps no history, the last writer wins.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use leadflow_shared::{EnrichmentState, LeadFlowError, Result};
use tracing::debug;

use crate::write_atomic;

/// In-memory view of `lead_intel.json`, loaded once and persisted whole.
#[derive(Debug)]
pub struct IntelStore {
    path: PathBuf,
    entries: BTreeMap<String, EnrichmentState>,
}

impl IntelStore {
    /// Load the store from disk, or start empty if the file does not exist.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let content =
                std::fs::read_to_string(&path).map_err(|e| LeadFlowError::io(&path, e))?;
            serde_json::from_str(&content).map_err(|e| {
                LeadFlowError::Storage(format!("corrupt intel store {}: {e}", path.display()))
            })?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, lead_id: &str) -> Option<&EnrichmentState> {
        self.entries.get(lead_id)
    }

    /// Insert or replace the entry for `state.lead_id`.
    pub fn merge(&mut self, state: EnrichmentState) {
        debug!(lead_id = %state.lead_id, batch_id = %state.batch_id, "intel merged");
        self.entries.insert(state.lead_id.clone(), state);
    }

    /// Persist the whole map atomically.
    pub fn persist(&self) -> Result<()> {
        let content = serde_json::to_vec_pretty(&self.entries)
            .map_err(|e| LeadFlowError::Storage(format!("serialize intel store: {e}")))?;
        write_atomic(&self.path, &content)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use leadflow_shared::{BatchId, Qualification};
    use uuid::Uuid;

    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("leadflow-intel-test-{}", Uuid::now_v7()))
            .join("lead_intel.json")
    }

    fn batch(id: &str) -> BatchId {
        BatchId::from_str(id).unwrap()
    }

    #[test]
    fn load_missing_starts_empty() {
        let store = IntelStore::load(temp_path()).expect("load");
        assert!(store.is_empty());
        assert!(store.get("L001").is_none());
    }

    #[test]
    fn merge_persist_reload() {
        let path = temp_path();

        let mut store = IntelStore::load(&path).expect("load");
        let mut state = EnrichmentState::new("L001", batch("BATCH_2025_06_01_3F9A21BC"));
        state.qualification = Some(Qualification {
            intent_score: 64.0,
            signals: vec![],
        });
        store.merge(state);
        store.persist().expect("persist");

        let reloaded = IntelStore::load(&path).expect("reload");
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get("L001").unwrap().intent_score(), Some(64.0));

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn merge_is_last_writer_wins() {
        let path = temp_path();
        let mut store = IntelStore::load(&path).expect("load");

        let mut first = EnrichmentState::new("L001", batch("BATCH_2025_06_01_3F9A21BC"));
        first.qualification = Some(Qualification {
            intent_score: 10.0,
            signals: vec![],
        });
        store.merge(first);

        let mut second = EnrichmentState::new("L001", batch("BATCH_2025_06_02_AB12CD34"));
        second.qualification = Some(Qualification {
            intent_score: 90.0,
            signals: vec![],
        });
        store.merge(second);

        assert_eq!(store.len(), 1);
        let entry = store.get("L001").unwrap();
        assert_eq!(entry.intent_score(), Some(90.0));
        assert_eq!(entry.batch_id, batch("BATCH_2025_06_02_AB12CD34"));
    }
}
