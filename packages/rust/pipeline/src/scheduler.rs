//! Bounded worker pool over a shared batch ledger.
//!
//! One `tokio::spawn` task per record, gated by a semaphore sized to the
//! configured worker count. Stages run lock-free; only the post-stage
//! commit takes the single coarse ledger lock. A panicked or failed task
//! marks its own record `Error` and the run continues.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Semaphore};
use tracing::{error, info, instrument, warn};

use leadflow_shared::{
    BatchId, EnrichmentState, InteractionRecord, LeadRecord, LeadStatus, ProgressUpdate, Result,
    percent_complete,
};
use leadflow_store::{DatasetStore, IntelStore, ProgressStore};

use crate::executor::run_stages;
use crate::stages::StageContext;

// ---------------------------------------------------------------------------
// Batch ledger
// ---------------------------------------------------------------------------

/// Shared mutable state for one batch run, guarded by a single coarse lock.
///
/// A task that finished its stages takes the guard once and commits in a
/// fixed order: row, intel, snapshots, counters. The guard spans all four
/// steps, so `processed`/`percent` can never run ahead of the snapshots a
/// reader would pair them with.
pub struct BatchLedger {
    batch_id: BatchId,
    records: Vec<LeadRecord>,
    intel: IntelStore,
    dataset: DatasetStore,
    progress: ProgressStore,
    processed: u32,
    total: u32,
}

impl BatchLedger {
    pub fn new(
        batch_id: BatchId,
        records: Vec<LeadRecord>,
        intel: IntelStore,
        dataset: DatasetStore,
        progress: ProgressStore,
    ) -> Self {
        let total = records.len() as u32;
        Self {
            batch_id,
            records,
            intel,
            dataset,
            progress,
            processed: 0,
            total,
        }
    }

    pub fn batch_id(&self) -> &BatchId {
        &self.batch_id
    }

    pub fn records(&self) -> &[LeadRecord] {
        &self.records
    }

    pub fn processed(&self) -> u32 {
        self.processed
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn failed_count(&self) -> u32 {
        self.records
            .iter()
            .filter(|r| r.status == LeadStatus::Error)
            .count() as u32
    }

    /// Move every pending record into `Processing` and snapshot the
    /// datasets, so pollers see in-flight rows as soon as the run starts.
    pub fn mark_all_processing(&mut self) -> Result<()> {
        for record in &mut self.records {
            if record.status == LeadStatus::New {
                record.status = LeadStatus::Processing;
            }
        }
        self.dataset.snapshot(&self.records)
    }

    /// Commit a finished record: row, intel, snapshots, counters, in that
    /// order, all under the caller's guard.
    pub fn commit_success(&mut self, index: usize, state: EnrichmentState) -> Result<()> {
        {
            let record = &mut self.records[index];
            if record.status.is_terminal() {
                warn!(lead_id = %record.lead_id, "record already committed");
                return Ok(());
            }
            record.status = LeadStatus::Ready;
            record.intent_score = state.intent_score();
            if let Some(draft) = &state.message {
                record.subject = Some(draft.subject.clone());
                record.email_preview = Some(draft.email_preview.clone());
            }
        }

        self.intel.merge(state);
        self.intel.persist()?;

        self.dataset.snapshot(&self.records)?;

        self.bump_processed()
    }

    /// Record a failed task. Best-effort: the row is marked `Error` and the
    /// counters still advance so the batch drains.
    pub fn commit_failure(&mut self, index: usize, reason: &str) {
        match self.records[index].status {
            // Already failed and counted.
            LeadStatus::Error => return,
            // The row went down but a later commit step failed. The record
            // data is good; make sure it is counted.
            LeadStatus::Ready => {
                if let Err(e) = self.bump_processed() {
                    error!(batch_id = %self.batch_id, error = %e, "progress update failed");
                }
                return;
            }
            LeadStatus::New | LeadStatus::Processing => {}
        }

        let lead_id = {
            let record = &mut self.records[index];
            record.status = LeadStatus::Error;
            record.lead_id.clone()
        };
        warn!(%lead_id, reason, "record failed");

        if let Err(e) = self.dataset.snapshot(&self.records) {
            error!(batch_id = %self.batch_id, error = %e, "snapshot failed for errored record");
        }
        if let Err(e) = self.bump_processed() {
            error!(batch_id = %self.batch_id, error = %e, "progress update failed");
        }
    }

    /// Persist the next counter value, then advance the in-memory count.
    /// Ordered this way so a failed write can be retried without double
    /// counting.
    fn bump_processed(&mut self) -> Result<()> {
        let next = self.processed + 1;
        self.progress.apply(
            &self.batch_id,
            ProgressUpdate {
                processed: Some(next),
                percent: Some(percent_complete(next, self.total)),
                ..Default::default()
            },
        )?;
        self.processed = next;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Worker pool
// ---------------------------------------------------------------------------

/// Outcome of one scheduler run over a batch.
#[derive(Debug, Clone)]
pub struct SchedulerOutcome {
    pub processed: u32,
    pub failed: u32,
    /// `(lead_id, reason)` for tasks that failed or panicked.
    pub errors: Vec<(String, String)>,
    pub duration: Duration,
}

/// Fan the batch out over the worker pool and drain it.
///
/// Every record gets a task; every task commits exactly once. Task
/// failures are contained per record and reported in the outcome.
#[instrument(skip_all, fields(batch_id = %ctx.batch_id, workers = worker_count))]
pub async fn process_records(
    ctx: StageContext,
    ledger: Arc<Mutex<BatchLedger>>,
    interactions: Arc<HashMap<String, Vec<InteractionRecord>>>,
    worker_count: u32,
) -> SchedulerOutcome {
    let start = Instant::now();
    let semaphore = Arc::new(Semaphore::new(worker_count.max(1) as usize));

    let snapshot: Vec<(usize, LeadRecord)> = {
        let guard = ledger.lock().await;
        guard.records().iter().cloned().enumerate().collect()
    };
    info!(records = snapshot.len(), "processing batch records");

    let mut handles = Vec::with_capacity(snapshot.len());
    for (index, record) in snapshot {
        let sem = semaphore.clone();
        let ctx = ctx.clone();
        let ledger = Arc::clone(&ledger);
        let interactions = Arc::clone(&interactions);
        let lead_id = record.lead_id.clone();

        let handle = tokio::spawn(async move {
            let _permit = sem.acquire().await.expect("semaphore closed");

            let history = interactions
                .get(&record.lead_id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let state = run_stages(&ctx, &record, history).await;

            let mut guard = ledger.lock().await;
            guard.commit_success(index, state)
        });
        handles.push((index, lead_id, handle));
    }

    let mut errors: Vec<(String, String)> = Vec::new();
    for (index, lead_id, handle) in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(%lead_id, error = %e, "record commit failed");
                errors.push((lead_id, e.to_string()));
                let mut guard = ledger.lock().await;
                guard.commit_failure(index, &e.to_string());
            }
            Err(e) => {
                error!(%lead_id, error = %e, "record task panicked or was cancelled");
                errors.push((lead_id, e.to_string()));
                let mut guard = ledger.lock().await;
                guard.commit_failure(index, &e.to_string());
            }
        }
    }

    let (processed, failed) = {
        let guard = ledger.lock().await;
        (guard.processed(), guard.failed_count())
    };
    let outcome = SchedulerOutcome {
        processed,
        failed,
        errors,
        duration: start.elapsed(),
    };

    info!(
        processed = outcome.processed,
        failed = outcome.failed,
        errors = outcome.errors.len(),
        duration_ms = outcome.duration.as_millis(),
        "batch records processed"
    );
    outcome
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
