//! Batch submission and lifecycle orchestration.
//!
//! [`Orchestrator::submit`] validates the five uploads, mints the batch,
//! stages normalized copies, and hands off to a background task that drives
//! the scheduler and finalizes the progress document. Record failures never
//! fail a batch; only errors before record processing do.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use leadflow_inference::InferenceClient;
use leadflow_shared::{
    AppConfig, BatchId, BatchProgress, BatchStatus, EnrichmentState, InteractionRecord,
    LeadFlowError, LeadRecord, ProgressUpdate, Result, StageStatus,
};
use leadflow_store::{
    AGENT_MAPPING_FILE, CRM_PIPELINE_FILE, DataLayout, DatasetStore, EMAIL_LOGS_FILE, IntelStore,
    LEADS_DATA_FILE, ProgressStore, SALES_PIPELINE_FILE, load_upload, read_interactions,
    read_leads, write_table_atomic,
};

use crate::scheduler::{BatchLedger, SchedulerOutcome, process_records};
use crate::stages::StageContext;

// ---------------------------------------------------------------------------
// Submission types
// ---------------------------------------------------------------------------

/// The five upload paths for one batch submission.
#[derive(Debug, Clone)]
pub struct BatchUpload {
    pub agent_mapping: PathBuf,
    pub crm_pipeline: PathBuf,
    pub email_logs: PathBuf,
    pub leads_data: PathBuf,
    pub sales_pipeline: PathBuf,
}

impl BatchUpload {
    /// Field name, canonical batch file name, and source path per upload.
    fn entries(&self) -> [(&'static str, &'static str, &Path); 5] {
        [
            ("agent_mapping", AGENT_MAPPING_FILE, &self.agent_mapping),
            ("crm_pipeline", CRM_PIPELINE_FILE, &self.crm_pipeline),
            ("email_logs", EMAIL_LOGS_FILE, &self.email_logs),
            ("leads_data", LEADS_DATA_FILE, &self.leads_data),
            ("sales_pipeline", SALES_PIPELINE_FILE, &self.sales_pipeline),
        ]
    }
}

/// Returned as soon as a batch is accepted; processing continues in the
/// background.
#[derive(Debug, Clone)]
pub struct BatchReceipt {
    pub batch_id: BatchId,
    pub files_received: usize,
    pub total_records: u32,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Owns the data layout, the inference client, and the registry of
/// in-flight batch runs. No globals: construct one per process (or per
/// test) and drop it when done.
#[derive(Debug)]
pub struct Orchestrator {
    layout: DataLayout,
    client: InferenceClient,
    worker_count: u32,
    compose_min_intent: f32,
    registry: Arc<Mutex<HashMap<BatchId, JoinHandle<()>>>>,
}

impl Orchestrator {
    /// Build an orchestrator over one data root. The client is passed in
    /// separately so callers can point it at a test server.
    pub fn new(config: &AppConfig, data_root: impl Into<PathBuf>, client: InferenceClient) -> Self {
        Self {
            layout: DataLayout::new(data_root),
            client,
            worker_count: config.defaults.worker_count,
            compose_min_intent: config.pipeline.compose_min_intent,
            registry: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// Accept a batch: validate, stage normalized copies, initialize
    /// progress, and spawn the background run. Returns without waiting for
    /// processing, so submission latency is independent of batch size.
    #[instrument(skip_all, fields(leads = %upload.leads_data.display()))]
    pub async fn submit(&self, upload: BatchUpload) -> Result<BatchReceipt> {
        let start = Instant::now();

        // --- Phase 1: Validate every upload (nothing durable yet) ---
        let mut tables = Vec::with_capacity(5);
        for (field, file_name, path) in upload.entries() {
            tables.push((file_name, load_upload(field, path)?));
        }

        // --- Phase 2: Mint the batch and write normalized copies ---
        let batch_id = BatchId::new();
        let batch_dir = self.layout.batch_dir(&batch_id);
        std::fs::create_dir_all(&batch_dir).map_err(|e| LeadFlowError::io(&batch_dir, e))?;
        for (file_name, table) in &tables {
            write_table_atomic(&self.layout.batch_file(&batch_id, file_name), table)?;
        }

        // --- Phase 3: Reset the leads for a clean run ---
        let mut records = read_leads(&self.layout.batch_leads(&batch_id))?;
        for record in &mut records {
            record.reset_for_processing();
        }
        let total_records = records.len() as u32;

        // --- Phase 4: Initial progress document ---
        let progress = ProgressStore::new(self.layout.clone());
        progress.init(&BatchProgress::pending(batch_id.clone(), total_records))?;

        // --- Phase 5: Hand off to the background run ---
        let ctx = StageContext {
            client: self.client.clone(),
            batch_id: batch_id.clone(),
            compose_min_intent: self.compose_min_intent,
        };
        let layout = self.layout.clone();
        let worker_count = self.worker_count;

        // The guard is held across the spawn, so the task's self-removal
        // cannot run before the insert.
        let mut registry = self.registry.lock().await;
        let handle = tokio::spawn({
            let registry = Arc::clone(&self.registry);
            let run_id = batch_id.clone();
            async move {
                run_batch(ctx, layout, records, worker_count).await;
                registry.lock().await.remove(&run_id);
            }
        });
        registry.insert(batch_id.clone(), handle);
        drop(registry);

        info!(
            %batch_id,
            records = total_records,
            elapsed_ms = start.elapsed().as_millis(),
            "batch accepted"
        );
        Ok(BatchReceipt {
            batch_id,
            files_received: tables.len(),
            total_records,
        })
    }

    /// Current progress document for a batch.
    pub fn progress(&self, batch_id: &BatchId) -> Result<BatchProgress> {
        ProgressStore::new(self.layout.clone()).read(batch_id)
    }

    /// Latest intel for one lead, read through from the durable store.
    pub fn intel(&self, lead_id: &str) -> Result<EnrichmentState> {
        let store = IntelStore::load(self.layout.intel())?;
        store
            .get(lead_id)
            .cloned()
            .ok_or_else(|| LeadFlowError::not_found(format!("intel for lead {lead_id}")))
    }

    /// Await one batch's background run, if it is still in flight.
    pub async fn wait_for(&self, batch_id: &BatchId) {
        let handle = self.registry.lock().await.remove(batch_id);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(%batch_id, error = %e, "batch task panicked");
            }
        }
    }

    /// Await every in-flight batch. Used by the CLI before exit.
    pub async fn shutdown(&self) {
        let handles: Vec<(BatchId, JoinHandle<()>)> =
            self.registry.lock().await.drain().collect();
        for (batch_id, handle) in handles {
            if let Err(e) = handle.await {
                error!(%batch_id, error = %e, "batch task panicked");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Background run
// ---------------------------------------------------------------------------

#[instrument(skip_all, fields(batch_id = %ctx.batch_id))]
async fn run_batch(
    ctx: StageContext,
    layout: DataLayout,
    records: Vec<LeadRecord>,
    worker_count: u32,
) {
    let batch_id = ctx.batch_id.clone();
    let progress = ProgressStore::new(layout.clone());

    match drive_batch(ctx, &layout, &progress, records, worker_count).await {
        Ok(outcome) => {
            // Record failures are not batch failures; a drained batch is
            // complete.
            let finalized = progress.apply(
                &batch_id,
                ProgressUpdate {
                    status: Some(BatchStatus::Completed),
                    percent: Some(100),
                    ..ProgressUpdate::all_stages(StageStatus::Completed)
                },
            );
            if let Err(e) = finalized {
                error!(%batch_id, error = %e, "failed to finalize progress");
            }
            info!(
                %batch_id,
                processed = outcome.processed,
                failed = outcome.failed,
                duration_ms = outcome.duration.as_millis(),
                "batch completed"
            );
        }
        Err(e) => {
            // Percent stays frozen at its last persisted value.
            error!(%batch_id, error = %e, "batch failed before record processing");
            let failed = progress.apply(
                &batch_id,
                ProgressUpdate {
                    status: Some(BatchStatus::Failed),
                    ..ProgressUpdate::all_stages(StageStatus::Error)
                },
            );
            if let Err(e) = failed {
                error!(%batch_id, error = %e, "failed to record batch failure");
            }
        }
    }
}

/// Everything between acceptance and the drained scheduler. Failures here
/// (corrupt intel store, unwritable snapshots) fail the whole batch.
async fn drive_batch(
    ctx: StageContext,
    layout: &DataLayout,
    progress: &ProgressStore,
    records: Vec<LeadRecord>,
    worker_count: u32,
) -> Result<SchedulerOutcome> {
    let batch_id = ctx.batch_id.clone();

    let intel = IntelStore::load(layout.intel())?;
    let dataset = DatasetStore::new(layout.batch_leads(&batch_id), layout.canonical_leads());

    // History is auxiliary: an unreadable interaction log costs the timing
    // stage its features, not the batch its run.
    let interactions = match read_interactions(&layout.batch_file(&batch_id, EMAIL_LOGS_FILE)) {
        Ok(rows) => group_by_lead(rows),
        Err(e) => {
            warn!(%batch_id, error = %e, "interaction log unreadable, continuing without history");
            HashMap::new()
        }
    };

    // Stage axis is batch-coarse: all five stages count as active for the
    // whole drain.
    progress.apply(
        &batch_id,
        ProgressUpdate {
            status: Some(BatchStatus::Processing),
            ..ProgressUpdate::all_stages(StageStatus::Running)
        },
    )?;

    let mut ledger = BatchLedger::new(batch_id, records, intel, dataset, progress.clone());
    ledger.mark_all_processing()?;

    let outcome = process_records(
        ctx,
        Arc::new(Mutex::new(ledger)),
        Arc::new(interactions),
        worker_count,
    )
    .await;
    Ok(outcome)
}

/// Group interaction rows by `lead_id` for per-record history lookup.
fn group_by_lead(rows: Vec<InteractionRecord>) -> HashMap<String, Vec<InteractionRecord>> {
    let mut grouped: HashMap<String, Vec<InteractionRecord>> = HashMap::new();
    for row in rows {
        grouped.entry(row.lead_id.clone()).or_default().push(row);
    }
    grouped
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
