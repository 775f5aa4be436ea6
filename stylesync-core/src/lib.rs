pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod generation;
pub mod memory;
pub mod models;
pub mod vision;

pub use config::{Credentials, StyleSyncConfig};
pub use embeddings::{
    Embedding, EmbeddingBackend, EmbeddingConfig, EmbeddingError, EmbeddingProvider,
    GeminiEmbeddingClient, GEMINI_DIMENSIONS,
};
pub use error::StyleSyncError;
pub use generation::{DisabledWriter, GenerationStage, GroqListingWriter, WriterConfig};
pub use memory::{IndexHandle, IndexSpec, MemoryError, Metric, VectorMemoryStore};
pub use models::{Listing, MemoryRecord, PipelineResult, PipelineStatus, StageOutcome, VisualAttributes};
pub use vision::{DisabledVision, GeminiVisionClient, ImageInput, VisionStage};
