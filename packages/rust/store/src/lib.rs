//! File-backed stores for LeadFlow batch data.
//!
//! Everything durable lives under one data root as plain CSV and JSON so
//! external collaborators (dashboards, exports) can read it directly:
//!
//! ```text
//! <data_dir>/
//!   Leads_Data.csv             canonical dataset snapshot
//!   lead_intel.json            canonical intel store
//!   batches/<batch_id>/
//!     Agent_Mapping.csv        normalized upload copies
//!     CRM_Pipeline.csv
//!     Email_Logs.csv
//!     Leads_Data.csv           batch-local dataset snapshot
//!     Sales_Pipeline.csv
//!     _progress.json           batch progress document
//! ```
//!
//! **Write rule:** every durable file goes through [`write_atomic`]
//! (temp file + rename), so concurrent readers never observe a torn
//! document.

pub mod dataset;
pub mod intel;
pub mod progress;
pub mod tabular;

use std::path::{Path, PathBuf};

use leadflow_shared::{BatchId, LeadFlowError, Result};

pub use dataset::{DatasetStore, read_interactions, read_leads, write_leads_atomic};
pub use intel::IntelStore;
pub use progress::ProgressStore;
pub use tabular::{MAX_UPLOAD_BYTES, Table, load_upload, normalize, read_table, write_table_atomic};

/// Canonical file name for the agent mapping table.
pub const AGENT_MAPPING_FILE: &str = "Agent_Mapping.csv";
/// Canonical file name for the CRM pipeline table.
pub const CRM_PIPELINE_FILE: &str = "CRM_Pipeline.csv";
/// Canonical file name for the email interaction log.
pub const EMAIL_LOGS_FILE: &str = "Email_Logs.csv";
/// Canonical file name for the leads dataset.
pub const LEADS_DATA_FILE: &str = "Leads_Data.csv";
/// Canonical file name for the sales pipeline table.
pub const SALES_PIPELINE_FILE: &str = "Sales_Pipeline.csv";
/// Progress document name inside each batch directory.
pub const PROGRESS_FILE: &str = "_progress.json";
/// Canonical intel store name at the data root.
pub const INTEL_FILE: &str = "lead_intel.json";

// ---------------------------------------------------------------------------
// Data layout
// ---------------------------------------------------------------------------

/// Path arithmetic for one data root. Cheap to clone; owns no handles.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical dataset snapshot at the data root.
    pub fn canonical_leads(&self) -> PathBuf {
        self.root.join(LEADS_DATA_FILE)
    }

    /// Canonical intel store at the data root.
    pub fn intel(&self) -> PathBuf {
        self.root.join(INTEL_FILE)
    }

    pub fn batches_dir(&self) -> PathBuf {
        self.root.join("batches")
    }

    pub fn batch_dir(&self, batch_id: &BatchId) -> PathBuf {
        self.batches_dir().join(batch_id.as_str())
    }

    pub fn batch_file(&self, batch_id: &BatchId, file_name: &str) -> PathBuf {
        self.batch_dir(batch_id).join(file_name)
    }

    /// Batch-local dataset snapshot.
    pub fn batch_leads(&self, batch_id: &BatchId) -> PathBuf {
        self.batch_file(batch_id, LEADS_DATA_FILE)
    }

    pub fn progress_file(&self, batch_id: &BatchId) -> PathBuf {
        self.batch_file(batch_id, PROGRESS_FILE)
    }
}

// ---------------------------------------------------------------------------
// Atomic writes
// ---------------------------------------------------------------------------

/// Write `contents` to `path` atomically: write a `.{name}.tmp` sibling,
/// then rename over the target. Creates parent directories as needed.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            LeadFlowError::Storage(format!("invalid write target: {}", path.display()))
        })?;
    let parent = path.parent().ok_or_else(|| {
        LeadFlowError::Storage(format!("write target has no parent: {}", path.display()))
    })?;

    std::fs::create_dir_all(parent).map_err(|e| LeadFlowError::io(parent, e))?;

    let temp = parent.join(format!(".{file_name}.tmp"));
    std::fs::write(&temp, contents).map_err(|e| LeadFlowError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| LeadFlowError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use uuid::Uuid;

    use super::*;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("leadflow-store-test-{}", Uuid::now_v7()))
    }

    #[test]
    fn layout_paths() {
        let layout = DataLayout::new("/srv/leadflow");
        let id = BatchId::from_str("BATCH_2025_06_01_3F9A21BC").unwrap();

        assert_eq!(
            layout.canonical_leads(),
            PathBuf::from("/srv/leadflow/Leads_Data.csv")
        );
        assert_eq!(
            layout.progress_file(&id),
            PathBuf::from("/srv/leadflow/batches/BATCH_2025_06_01_3F9A21BC/_progress.json")
        );
        assert_eq!(
            layout.batch_leads(&id),
            PathBuf::from("/srv/leadflow/batches/BATCH_2025_06_01_3F9A21BC/Leads_Data.csv")
        );
    }

    #[test]
    fn write_atomic_leaves_no_temp_files() {
        let root = temp_root();
        let target = root.join("nested").join("doc.json");

        write_atomic(&target, b"{\"ok\":true}").expect("atomic write");
        assert_eq!(std::fs::read(&target).expect("read back"), b"{\"ok\":true}");

        let entries: Vec<_> = std::fs::read_dir(target.parent().unwrap())
            .expect("read dir")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec!["doc.json".to_string()]);

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn write_atomic_overwrites_existing() {
        let root = temp_root();
        let target = root.join("doc.json");

        write_atomic(&target, b"first").expect("first write");
        write_atomic(&target, b"second").expect("second write");
        assert_eq!(std::fs::read(&target).expect("read back"), b"second");

        std::fs::remove_dir_all(&root).ok();
    }
}
