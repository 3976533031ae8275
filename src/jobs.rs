//! In-memory registry of OCR runs executing as background tasks.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::DriverConfig;
use crate::error::OcrError;
use crate::logging::DriverLogger;
use crate::pipeline::run_ocr;
use crate::types::{ExtractionResult, ProcessingRequest};

/// Something that turns a request into a result.
#[async_trait]
pub trait OcrRunner: Send + Sync + 'static {
    async fn run(&self, request: &ProcessingRequest) -> Result<ExtractionResult, OcrError>;
}

/// Runs every request in its own freshly launched browser.
#[derive(Debug, Clone)]
pub struct DriverRunner {
    config: DriverConfig,
}

impl DriverRunner {
    pub fn new(config: DriverConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl OcrRunner for DriverRunner {
    async fn run(&self, request: &ProcessingRequest) -> Result<ExtractionResult, OcrError> {
        run_ocr(self.config.clone(), request).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: Uuid,
    pub file_name: String,
    pub file_path: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ExtractionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    fn new(request: &ProcessingRequest) -> Self {
        let path = request.source_file_path();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            file_name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            file_path: path.display().to_string(),
            status: JobStatus::Processing,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn finish(&mut self, outcome: Result<ExtractionResult, String>) {
        match outcome {
            Ok(result) => {
                self.status = JobStatus::Completed;
                self.result = Some(result);
            }
            Err(error) => {
                self.status = JobStatus::Failed;
                self.error = Some(error);
            }
        }
        self.updated_at = Utc::now();
    }
}

type JobTable = Arc<RwLock<HashMap<Uuid, JobRecord>>>;
type HandleTable = Arc<Mutex<HashMap<Uuid, JoinHandle<()>>>>;

pub struct JobRegistry<R: OcrRunner> {
    runner: Arc<R>,
    jobs: JobTable,
    /// Tasks still running; each removes its own entry when it ends.
    handles: HandleTable,
    logger: Arc<DriverLogger>,
}

impl<R: OcrRunner> JobRegistry<R> {
    pub fn new(runner: R, logger: DriverLogger) -> Self {
        Self {
            runner: Arc::new(runner),
            jobs: Arc::new(RwLock::new(HashMap::new())),
            handles: Arc::new(Mutex::new(HashMap::new())),
            logger: Arc::new(logger),
        }
    }

    /// Record the request as processing and start it in the background.
    pub async fn submit(&self, request: ProcessingRequest) -> Uuid {
        let record = JobRecord::new(&request);
        let id = record.id;
        self.logger.info(
            format!("job {id} submitted"),
            Some("jobs"),
            Some(json!({ "file": record.file_name })),
        );
        self.jobs.write().await.insert(id, record);

        let runner = Arc::clone(&self.runner);
        let jobs = Arc::clone(&self.jobs);
        let logger = Arc::clone(&self.logger);
        let handles = Arc::clone(&self.handles);
        // Held across the spawn so the task cannot remove its entry before it
        // is inserted.
        let mut running = self.handles.lock().await;
        let handle = tokio::spawn(async move {
            let outcome = runner.run(&request).await.map_err(|err| err.to_string());
            match &outcome {
                Ok(result) => logger.info(
                    format!("job {id} completed"),
                    Some("jobs"),
                    Some(json!({ "kind": result.kind() })),
                ),
                Err(err) => logger.error(format!("job {id} failed: {err}"), Some("jobs"), None),
            }
            if let Some(record) = jobs.write().await.get_mut(&id) {
                record.finish(outcome);
            }
            handles.lock().await.remove(&id);
        });
        running.insert(id, handle);
        id
    }

    pub async fn get(&self, id: Uuid) -> Option<JobRecord> {
        self.jobs.read().await.get(&id).cloned()
    }

    /// All jobs, oldest first.
    pub async fn list(&self) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = self.jobs.read().await.values().cloned().collect();
        records.sort_by_key(|record| record.created_at);
        records
    }

    /// Wait for the job's task to end and return its final record.
    pub async fn wait_for(&self, id: Uuid) -> Option<JobRecord> {
        let handle = self.handles.lock().await.remove(&id);
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                if let Some(record) = self.jobs.write().await.get_mut(&id) {
                    record.finish(Err(format!("job task ended abnormally: {err}")));
                }
            }
        }
        self.get(id).await
    }
}
