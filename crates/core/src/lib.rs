pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod metadata;
pub mod models;
pub mod normalizer;
pub mod orchestrator;
pub mod retry;
pub mod segmenter;
pub mod stores;
pub mod traits;

pub use chunking::{chunk_string_id, stable_point_id, ChunkBuilder};
pub use config::{
    AppConfig, EmbeddingBackend, EmbeddingsConfig, LegalTextConfig, PipelineSettings,
    ProcessingConfig, QdrantConfig, RetrySettings, RunContext, SectionPattern,
};
pub use embeddings::{
    build_embedder, CharacterNgramEmbedder, ChunkEmbeddings, Embedder, EmbeddingGenerator,
    HttpEmbedder,
};
pub use error::{ConfigError, EmbeddingError, IngestError, PipelineError, StoreError};
pub use extractor::{extract_page_texts, pdf_text, PageText};
pub use ingest::{decode_text, discover_files, generate_document_id, load_document};
pub use metadata::MetadataExtractor;
pub use models::{
    Chunk, Document, DocumentMetadata, IndexRecord, LegalItem, LegalReference, LegalSubitem,
    RecordPayload, StructuralLabel, StructuralUnit,
};
pub use normalizer::TextNormalizer;
pub use orchestrator::{DocumentOutcome, IndexingPipeline, OutcomeStatus, RunReport};
pub use retry::RetryPolicy;
pub use segmenter::{SectionRule, StructureSegmenter};
pub use stores::QdrantStore;
pub use traits::VectorIndex;
