use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid pattern {pattern:?} in {field}: {source}")]
    Pattern {
        field: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid value for {field}: {details}")]
    Invalid { field: &'static str, details: String },

    #[error("model {model} produces {actual}-dimensional vectors, collection expects {expected}")]
    DimensionMismatch {
        model: String,
        expected: usize,
        actual: usize,
    },

    #[error("embedding model unavailable at startup: {0}")]
    ModelUnavailable(String),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("extension {extension:?} is not allowed: {path}")]
    DisallowedExtension { path: PathBuf, extension: String },

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("not a readable directory: {0}")]
    InvalidDirectory(PathBuf),

    #[error("document task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("embedding service response is malformed: {0}")]
    Malformed(String),

    #[error("every chunk of {document_id} failed to embed")]
    AllChunksFailed { document_id: String },
}

impl EmbeddingError {
    pub fn is_transient(&self) -> bool {
        match self {
            EmbeddingError::Http(error) => {
                error.is_connect() || error.is_timeout() || error.is_request()
            }
            EmbeddingError::Status { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("{backend} returned {status}: {body}")]
    Status {
        backend: String,
        status: u16,
        body: String,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("collection {collection} has vector size {actual}, expected {expected}")]
    CollectionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },
}

impl StoreError {
    /// Transport failures, throttling and server errors are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Http(error) => {
                error.is_connect()
                    || error.is_timeout()
                    || error.is_request()
                    || error
                        .status()
                        .is_some_and(|status| status.as_u16() == 429 || status.is_server_error())
            }
            StoreError::Status { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("store error for {document_id}: {source}")]
    Document {
        document_id: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("reindex drops the whole collection and needs explicit confirmation")]
    ReindexNotConfirmed,
}
