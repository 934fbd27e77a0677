//! Schema-agnostic tabular CSV handling for upload normalization.
//!
//! Uploads arrive as arbitrary headered tables (agent mappings, pipeline
//! exports). This module reads them tolerantly, strips spreadsheet export
//! debris, and writes normalized copies atomically. Typed access to the
//! leads and interaction tables lives in [`crate::dataset`].

use std::path::Path;

use leadflow_shared::{LeadFlowError, Result};
use tracing::debug;

use crate::write_atomic;

/// Hard cap on upload size. Anything larger is rejected before parsing.
pub const MAX_UPLOAD_BYTES: u64 = 25 * 1024 * 1024;

/// An in-memory headered table of strings.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Read a headered CSV file into a [`Table`].
///
/// Rows may have ragged field counts (short rows are padded on projection);
/// a structurally unreadable file is a CSV error.
pub fn read_table(path: &Path) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| LeadFlowError::csv(path, e.to_string()))?;

    let headers = reader
        .headers()
        .map_err(|e| LeadFlowError::csv(path, e.to_string()))?
        .iter()
        .map(String::from)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| LeadFlowError::csv(path, e.to_string()))?;
        rows.push(record.iter().map(String::from).collect());
    }

    Ok(Table { headers, rows })
}

/// Drop every column whose header is empty or starts with `Unnamed`
/// (pandas/Excel index-column debris), projecting rows accordingly.
pub fn normalize(table: Table) -> Table {
    let kept: Vec<usize> = table
        .headers
        .iter()
        .enumerate()
        .filter(|(_, h)| {
            let h = h.trim();
            !h.is_empty() && !h.starts_with("Unnamed")
        })
        .map(|(i, _)| i)
        .collect();

    if kept.len() == table.headers.len() {
        return table;
    }

    debug!(
        dropped = table.headers.len() - kept.len(),
        "dropping unlabeled columns"
    );

    let headers = kept.iter().map(|&i| table.headers[i].clone()).collect();
    let rows = table
        .rows
        .into_iter()
        .map(|row| {
            kept.iter()
                .map(|&i| row.get(i).cloned().unwrap_or_default())
                .collect()
        })
        .collect();

    Table { headers, rows }
}

/// Write a table as CSV, atomically.
pub fn write_table_atomic(path: &Path, table: &Table) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&table.headers)
        .map_err(|e| LeadFlowError::csv(path, e.to_string()))?;
    for row in &table.rows {
        writer
            .write_record(row)
            .map_err(|e| LeadFlowError::csv(path, e.to_string()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| LeadFlowError::csv(path, e.to_string()))?;
    write_atomic(path, &bytes)
}

/// Validate and load one upload: the file must exist, fit the size cap,
/// and parse as a headered CSV. Returns the normalized table.
pub fn load_upload(field: &str, path: &Path) -> Result<Table> {
    let meta = std::fs::metadata(path).map_err(|_| {
        LeadFlowError::validation(format!("{field}: file not found: {}", path.display()))
    })?;
    if !meta.is_file() {
        return Err(LeadFlowError::validation(format!(
            "{field}: not a file: {}",
            path.display()
        )));
    }
    if meta.len() > MAX_UPLOAD_BYTES {
        return Err(LeadFlowError::validation(format!(
            "{field}: exceeds {MAX_UPLOAD_BYTES} byte limit: {}",
            path.display()
        )));
    }

    let table = read_table(path).map_err(|e| match e {
        LeadFlowError::Csv { message, .. } => {
            LeadFlowError::validation(format!("{field}: unparseable CSV: {message}"))
        }
        other => other,
    })?;

    Ok(normalize(table))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use uuid::Uuid;

    use super::*;

    fn temp_root() -> PathBuf {
        let root =
            std::env::temp_dir().join(format!("leadflow-tabular-test-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&root).expect("create temp root");
        root
    }

    #[test]
    fn normalize_drops_unnamed_and_empty_columns() {
        let table = Table {
            headers: vec![
                "Unnamed: 0".into(),
                "lead_id".into(),
                "".into(),
                "company".into(),
            ],
            rows: vec![
                vec!["0".into(), "L001".into(), "x".into(), "Initech".into()],
                vec!["1".into(), "L002".into()], // ragged row
            ],
        };

        let normalized = normalize(table);
        assert_eq!(normalized.headers, vec!["lead_id", "company"]);
        assert_eq!(normalized.rows[0], vec!["L001", "Initech"]);
        assert_eq!(normalized.rows[1], vec!["L002", ""]);
    }

    #[test]
    fn normalize_keeps_clean_tables_untouched() {
        let table = Table {
            headers: vec!["a".into(), "b".into()],
            rows: vec![vec!["1".into(), "2".into()]],
        };
        assert_eq!(normalize(table.clone()), table);
    }

    #[test]
    fn table_roundtrip_preserves_quoting() {
        let root = temp_root();
        let path = root.join("quoted.csv");

        let table = Table {
            headers: vec!["lead_id".into(), "note".into()],
            rows: vec![vec!["L001".into(), "call me, maybe \"soon\"".into()]],
        };
        write_table_atomic(&path, &table).expect("write");

        let read_back = read_table(&path).expect("read");
        assert_eq!(read_back, table);

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn load_upload_rejects_missing_file() {
        let err = load_upload("leads_data", Path::new("/nonexistent/leads.csv"))
            .expect_err("should reject");
        assert!(matches!(err, LeadFlowError::Validation { .. }));
        assert!(err.to_string().contains("leads_data"));
    }

    #[test]
    fn load_upload_rejects_oversized_file() {
        let root = temp_root();
        let path = root.join("huge.csv");

        let file = std::fs::File::create(&path).expect("create");
        file.set_len(MAX_UPLOAD_BYTES + 1).expect("grow sparse file");

        let err = load_upload("email_logs", &path).expect_err("should reject");
        assert!(matches!(err, LeadFlowError::Validation { .. }));
        assert!(err.to_string().contains("byte limit"));

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn load_upload_normalizes() {
        let root = temp_root();
        let path = root.join("leads.csv");
        std::fs::write(&path, "Unnamed: 0,lead_id\n0,L001\n").expect("write");

        let table = load_upload("leads_data", &path).expect("load");
        assert_eq!(table.headers, vec!["lead_id"]);
        assert_eq!(table.rows, vec![vec!["L001".to_string()]]);

        std::fs::remove_dir_all(&root).ok();
    }
}
