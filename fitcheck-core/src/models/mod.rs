pub mod answer;
pub mod record;
pub mod search;

pub use answer::SynthesizedAnswer;
pub use record::{Record, RecordMetadata, SourceRow, UploadScope, UNKNOWN};
pub use search::{MetadataFilter, SearchHit};
