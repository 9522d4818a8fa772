//! Spawns pipeline runs as jobs and reports their progress.

use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};

use auditor_core::{PipelineState, Stage};

use super::{stage_message, JobError, JobId, JobRecord, JobStore, JobUpdate};
use crate::orchestrator::{PipelineController, PipelineError};

/// Message for documents that produced no text.
pub const EMPTY_DOCUMENT_MESSAGE: &str = "Failed to extract text from document";

/// Runs audits in the background, at most `max_concurrent_jobs` at a time.
#[derive(Clone)]
pub struct JobRunner {
    controller: Arc<PipelineController>,
    store: Arc<dyn JobStore>,
    permits: Arc<Semaphore>,
    cancels: Arc<Mutex<HashMap<JobId, watch::Sender<bool>>>>,
}

impl JobRunner {
    pub fn new(
        controller: Arc<PipelineController>,
        store: Arc<dyn JobStore>,
        max_concurrent_jobs: usize,
    ) -> Self {
        Self {
            controller,
            store,
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            cancels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Queue an audit of `document_text` and return its id immediately.
    pub async fn submit(&self, document_text: impl Into<String>) -> Result<JobId, JobError> {
        let id = JobId::new();
        self.store.create(id.clone()).await?;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.cancels.lock().insert(id.clone(), cancel_tx);

        let runner = self.clone();
        let job_id = id.clone();
        let text = document_text.into();
        tokio::spawn(async move {
            runner.run_job(job_id, text, cancel_rx).await;
        });

        tracing::info!(job_id = %id, "Audit job queued");
        Ok(id)
    }

    /// Queue an audit of text extracted from a document.
    ///
    /// Text that is empty after trimming fails the job straight away.
    pub async fn submit_document(&self, extracted_text: String) -> Result<JobId, JobError> {
        if !extracted_text.trim().is_empty() {
            return self.submit(extracted_text).await;
        }

        let id = JobId::new();
        self.store.create(id.clone()).await?;
        self.store
            .update(&id, JobUpdate::failed(EMPTY_DOCUMENT_MESSAGE))
            .await?;
        tracing::warn!(job_id = %id, "Document produced no text");
        Ok(id)
    }

    /// Ask a running job to stop at its next stage boundary.
    ///
    /// Returns false when the job is unknown or already finished.
    pub fn cancel(&self, id: &JobId) -> bool {
        match self.cancels.lock().get(id) {
            Some(tx) => tx.send(true).is_ok(),
            None => false,
        }
    }

    /// Wait until the job finishes and return its final record.
    pub async fn wait(&self, id: &JobId) -> Result<JobRecord, JobError> {
        let mut events = self.store.subscribe(id).await?;

        loop {
            let record = self
                .store
                .get(id)
                .await
                .ok_or_else(|| JobError::NotFound(id.clone()))?;
            if record.status.is_terminal() {
                return Ok(record);
            }

            // Lagging just means we re-read the record.
            if let Err(tokio::sync::broadcast::error::RecvError::Closed) = events.recv().await {
                return self
                    .store
                    .get(id)
                    .await
                    .ok_or_else(|| JobError::NotFound(id.clone()));
            }
        }
    }

    async fn run_job(&self, id: JobId, text: String, cancel: watch::Receiver<bool>) {
        let _permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                self.finish(&id, JobUpdate::failed("job runner shut down")).await;
                return;
            }
        };

        self.apply(&id, JobUpdate::started("Agent 1: Extracting Clauses..."))
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel::<JobUpdate>();
        let observer = move |stage: Stage, state: &PipelineState| {
            let _ = tx.send(JobUpdate::stage(
                stage,
                stage_message(stage, state.loop_count()),
            ));
        };

        let controller = self.controller.clone();
        let pipeline = async move {
            controller
                .run_with(text, &observer, Some(&cancel))
                .await
        };
        let forward = async {
            while let Some(update) = rx.recv().await {
                self.apply(&id, update).await;
            }
        };

        let (outcome, ()) = tokio::join!(AssertUnwindSafe(pipeline).catch_unwind(), forward);

        let terminal = match outcome {
            Ok(Ok(outcome)) => JobUpdate::completed(outcome.result, outcome.usage),
            Ok(Err(e)) => {
                if e != PipelineError::Cancelled {
                    tracing::error!(job_id = %id, error = %e, "Audit job failed");
                }
                JobUpdate::failed(e.to_string())
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(job_id = %id, reason = %reason, "Audit job panicked");
                JobUpdate::failed(format!("Internal error: {}", reason))
            }
        };

        self.finish(&id, terminal).await;
    }

    async fn apply(&self, id: &JobId, update: JobUpdate) {
        if let Err(e) = self.store.update(id, update).await {
            tracing::warn!(job_id = %id, error = %e, "Dropping job update");
        }
    }

    async fn finish(&self, id: &JobId, update: JobUpdate) {
        self.cancels.lock().remove(id);
        self.apply(id, update).await;
    }
}
