//! Catalog pipeline: image in, listing out
//!
//! Stages run strictly in order, each feeding the next:
//! `Received → FileRead → VisionDone → QueryBuilt → MemoryDone →
//!  GenerationDone → Assembled → NotifySent → Complete`
//!
//! Only reading the upload (and validating it) can fail the request. From
//! vision onward every stage returns a usable value: vision and generation
//! fall back to placeholder attributes / listings, retrieval falls back to
//! no keywords, and notification failures are logged and ignored.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use stylesync_core::{
    GenerationStage, ImageInput, PipelineResult, PipelineStatus, VisionStage,
};
use thiserror::Error;
use tracing::Instrument;

use super::notify::{NotificationDispatcher, NotifyOutcome};
use super::retrieve::MemoryRetrievalService;
use super::upload::StoredUpload;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Received,
    FileRead,
    VisionDone,
    QueryBuilt,
    MemoryDone,
    GenerationDone,
    Assembled,
    NotifySent,
    Complete,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStage::Received => "received",
            PipelineStage::FileRead => "file_read",
            PipelineStage::VisionDone => "vision_done",
            PipelineStage::QueryBuilt => "query_built",
            PipelineStage::MemoryDone => "memory_done",
            PipelineStage::GenerationDone => "generation_done",
            PipelineStage::Assembled => "assembled",
            PipelineStage::NotifySent => "notify_sent",
            PipelineStage::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// Failures that abort a request. Everything else degrades in place.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to read uploaded file {}: {source}", path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to store upload: {0}")]
    UploadStorage(#[source] std::io::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to encode result: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    /// Stable name reported as `type` in the error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::FileAccess { .. } => "FileAccessError",
            PipelineError::UploadStorage(_) => "UploadStorageError",
            PipelineError::InvalidRequest(_) => "InvalidRequest",
            PipelineError::Serialization(_) => "SerializationError",
        }
    }
}

/// Constructed once at start-up and shared by every request.
pub struct CatalogPipeline {
    vision: Arc<dyn VisionStage>,
    memory: Arc<MemoryRetrievalService>,
    writer: Arc<dyn GenerationStage>,
    notifier: Option<NotificationDispatcher>,
}

impl CatalogPipeline {
    pub fn new(
        vision: Arc<dyn VisionStage>,
        memory: Arc<MemoryRetrievalService>,
        writer: Arc<dyn GenerationStage>,
        notifier: Option<NotificationDispatcher>,
    ) -> Self {
        Self {
            vision,
            memory,
            writer,
            notifier,
        }
    }

    pub fn memory(&self) -> &MemoryRetrievalService {
        &self.memory
    }

    pub fn notifications_enabled(&self) -> bool {
        self.notifier.is_some()
    }

    pub async fn run(&self, upload: &StoredUpload) -> Result<PipelineResult, PipelineError> {
        let span = tracing::info_span!("catalog", request_id = %upload.id());
        self.run_stages(upload).instrument(span).await
    }

    async fn run_stages(&self, upload: &StoredUpload) -> Result<PipelineResult, PipelineError> {
        stage(PipelineStage::Received);

        let bytes = upload
            .read()
            .await
            .map_err(|source| PipelineError::FileAccess {
                path: upload.path().to_path_buf(),
                source,
            })?;
        if bytes.is_empty() {
            return Err(PipelineError::InvalidRequest(
                "uploaded file is empty".to_string(),
            ));
        }
        stage(PipelineStage::FileRead);

        let image = ImageInput {
            bytes: &bytes,
            mime_type: upload.mime_type(),
        };
        let vision = self.vision.analyze(image).await;
        if vision.degraded {
            tracing::warn!("Vision analysis fell back to placeholder attributes");
        }
        let visual = vision.value;
        stage(PipelineStage::VisionDone);

        let query = visual.memory_query();
        tracing::info!(query = %query, "Built memory query");
        stage(PipelineStage::QueryBuilt);

        let keywords = self
            .memory
            .retrieve_keywords(&query, self.memory.settings().top_k)
            .await;
        stage(PipelineStage::MemoryDone);

        let generation = self.writer.write_listing(&visual, &keywords).await;
        if generation.degraded {
            tracing::warn!("Listing generation fell back to template listing");
        }
        stage(PipelineStage::GenerationDone);

        let status = if vision.degraded || generation.degraded {
            PipelineStatus::Partial
        } else {
            PipelineStatus::Success
        };
        let result = PipelineResult {
            visual_data: visual,
            seo_keywords: keywords,
            listing: generation.value,
            status,
        };
        stage(PipelineStage::Assembled);

        if let Some(notifier) = &self.notifier {
            match notifier.dispatch(&result).await {
                NotifyOutcome::Delivered(_) => {}
                outcome => tracing::warn!(?outcome, "Listing notification not delivered"),
            }
            stage(PipelineStage::NotifySent);
        }

        stage(PipelineStage::Complete);
        Ok(result)
    }
}

fn stage(stage: PipelineStage) {
    tracing::info!(stage = %stage, "Pipeline stage");
}
