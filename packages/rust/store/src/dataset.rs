//! Typed access to the leads dataset and the email interaction log.

use std::path::{Path, PathBuf};

use leadflow_shared::{InteractionRecord, LeadFlowError, LeadRecord, Result};
use tracing::debug;

use crate::write_atomic;

/// Leads snapshot column order. Must stay aligned with the field order of
/// [`LeadRecord`], since rows are serialized headerless against this list.
const LEADS_HEADERS: [&str; 15] = [
    "lead_id",
    "name",
    "company",
    "title",
    "industry",
    "visits",
    "time_on_site",
    "pages_per_visit",
    "converted",
    "region",
    "lead_source",
    "status",
    "intent_score",
    "subject",
    "email_preview",
];

/// Read the leads table into typed records (tolerant field parses).
pub fn read_leads(path: &Path) -> Result<Vec<LeadRecord>> {
    let mut reader =
        csv::Reader::from_path(path).map_err(|e| LeadFlowError::csv(path, e.to_string()))?;

    let mut records = Vec::new();
    for row in reader.deserialize() {
        let record: LeadRecord = row.map_err(|e| LeadFlowError::csv(path, e.to_string()))?;
        records.push(record);
    }
    Ok(records)
}

/// Read the interaction log into typed records. Rows that do not parse as
/// timestamps keep `None` fields; only structural CSV failures error.
pub fn read_interactions(path: &Path) -> Result<Vec<InteractionRecord>> {
    let mut reader =
        csv::Reader::from_path(path).map_err(|e| LeadFlowError::csv(path, e.to_string()))?;

    let mut records = Vec::new();
    for row in reader.deserialize() {
        let record: InteractionRecord =
            row.map_err(|e| LeadFlowError::csv(path, e.to_string()))?;
        records.push(record);
    }
    Ok(records)
}

/// Write the leads table as CSV, atomically, with a header row even when
/// the record list is empty.
pub fn write_leads_atomic(path: &Path, records: &[LeadRecord]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer
        .write_record(LEADS_HEADERS)
        .map_err(|e| LeadFlowError::csv(path, e.to_string()))?;
    for record in records {
        writer
            .serialize(record)
            .map_err(|e| LeadFlowError::csv(path, e.to_string()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| LeadFlowError::csv(path, e.to_string()))?;
    write_atomic(path, &bytes)
}

// ---------------------------------------------------------------------------
// Snapshot pair
// ---------------------------------------------------------------------------

/// Writer for the two dataset snapshots a batch maintains: the batch-local
/// copy and the canonical copy at the data root. Batch-local first, so the
/// canonical file never gets ahead of the batch record.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    batch_path: PathBuf,
    canonical_path: PathBuf,
}

impl DatasetStore {
    pub fn new(batch_path: impl Into<PathBuf>, canonical_path: impl Into<PathBuf>) -> Self {
        Self {
            batch_path: batch_path.into(),
            canonical_path: canonical_path.into(),
        }
    }

    /// Rewrite both snapshots from the current record set.
    pub fn snapshot(&self, records: &[LeadRecord]) -> Result<()> {
        write_leads_atomic(&self.batch_path, records)?;
        write_leads_atomic(&self.canonical_path, records)?;
        debug!(records = records.len(), "dataset snapshots written");
        Ok(())
    }

    pub fn batch_path(&self) -> &Path {
        &self.batch_path
    }

    pub fn canonical_path(&self) -> &Path {
        &self.canonical_path
    }
}
