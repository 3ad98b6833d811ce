pub mod config;
pub mod embeddings;
pub mod error;
pub mod models;
pub mod store;
pub mod synthesizer;

pub use config::FitcheckConfig;
pub use embeddings::{
    create_backend, EmbeddingBackend, EmbeddingConfig, EmbeddingError, OpenAiEmbeddingClient,
    OPENAI_DIMENSIONS,
};
pub use error::FitcheckError;
pub use models::{
    MetadataFilter, Record, RecordMetadata, SearchHit, SourceRow, SynthesizedAnswer, UploadScope,
};
pub use store::{create_store, MemoryVectorStore, PgVectorStore, StoreError, VectorStore};
pub use synthesizer::{AnswerSynthesizer, OpenAiSynthesizer, SynthesisError, SynthesizerConfig};
