pub mod listing;
pub mod pipeline;
pub mod record;
pub mod visual;

pub use listing::Listing;
pub use pipeline::{PipelineResult, PipelineStatus, StageOutcome};
pub use record::{MemoryRecord, RecordMetadata, ScoredMatch};
pub use visual::VisualAttributes;
