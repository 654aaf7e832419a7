use crate::chunking::ChunkBuilder;
use crate::error::ConfigError;
use crate::metadata::MetadataExtractor;
use crate::normalizer::TextNormalizer;
use crate::retry::RetryPolicy;
use crate::segmenter::{SectionRule, StructureSegmenter};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub qdrant: QdrantConfig,
    pub processing: ProcessingConfig,
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    pub host: String,
    pub port: u16,
    pub collection_name: String,
    pub vector_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,
}

impl QdrantConfig {
    /// Base URL of the REST API. A host given with a scheme keeps it.
    pub fn endpoint(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{host}:{}", self.port)
        } else {
            format!("http://{host}:{}", self.port)
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub allowed_extensions: Vec<String>,
    #[serde(default)]
    pub text_clean_patterns: Vec<String>,
    #[serde(default)]
    pub legal_text: LegalTextConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegalTextConfig {
    #[serde(default = "default_section_patterns")]
    pub section_patterns: Vec<SectionPattern>,
    #[serde(default = "default_article_threshold")]
    pub article_threshold: usize,
}

impl Default for LegalTextConfig {
    fn default() -> Self {
        Self {
            section_patterns: default_section_patterns(),
            article_threshold: default_article_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SectionPattern {
    #[serde(rename = "type")]
    pub kind: String,
    pub pattern: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    #[default]
    Http,
    Ngram,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    pub model_name: String,
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub backend: EmbeddingBackend,
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_upsert_batch_size() -> usize {
    100
}

fn default_article_threshold() -> usize {
    4_000
}

fn default_device() -> String {
    "cpu".to_string()
}

fn default_batch_size() -> usize {
    32
}

fn default_embedding_endpoint() -> String {
    "http://localhost:8080/embed".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(4)
}

pub fn default_section_patterns() -> Vec<SectionPattern> {
    vec![
        SectionPattern {
            kind: "Раздел".to_string(),
            pattern: r"Раздел\s+(?P<number>[IVXLCDM\d]+)\.?[ \t]*(?P<heading>[^\n]*)".to_string(),
        },
        SectionPattern {
            kind: "Подраздел".to_string(),
            pattern: r"Подраздел\s+(?P<number>[IVXLCDM\d]+)\.?[ \t]*(?P<heading>[^\n]*)".to_string(),
        },
        SectionPattern {
            kind: "Глава".to_string(),
            pattern: r"Глава\s+(?P<number>\d+(?:\.\d+)*)\.?[ \t]*(?P<heading>[^\n]*)".to_string(),
        },
        SectionPattern {
            kind: "Статья".to_string(),
            pattern: r"Статья\s+(?P<number>\d+(?:\.\d+)*)\.?[ \t]*(?P<heading>[^\n]*)".to_string(),
        },
    ]
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_retries(self.retry.max_retries)
            .with_initial_delay(Duration::from_millis(self.retry.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.retry.max_delay_ms))
            .with_backoff_multiplier(self.retry.backoff_multiplier)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let processing = &self.processing;
        if processing.chunk_size == 0 {
            return Err(invalid("processing.chunk_size", "must be positive"));
        }
        if processing.chunk_overlap >= processing.chunk_size {
            return Err(invalid(
                "processing.chunk_overlap",
                format!(
                    "overlap {} must be smaller than chunk_size {}",
                    processing.chunk_overlap, processing.chunk_size
                ),
            ));
        }
        if processing.allowed_extensions.is_empty() {
            return Err(invalid("processing.allowed_extensions", "list is empty"));
        }
        if processing.legal_text.article_threshold == 0 {
            return Err(invalid("processing.legal_text.article_threshold", "must be positive"));
        }
        if self.qdrant.vector_size == 0 {
            return Err(invalid("qdrant.vector_size", "must be positive"));
        }
        if self.qdrant.collection_name.trim().is_empty() {
            return Err(invalid("qdrant.collection_name", "is empty"));
        }
        if self.qdrant.upsert_batch_size == 0 {
            return Err(invalid("qdrant.upsert_batch_size", "must be positive"));
        }
        url::Url::parse(&self.qdrant.endpoint())
            .map_err(|error| invalid("qdrant.host", error.to_string()))?;
        if self.embeddings.batch_size == 0 {
            return Err(invalid("embeddings.batch_size", "must be positive"));
        }
        if self.embeddings.model_name.trim().is_empty() {
            return Err(invalid("embeddings.model_name", "is empty"));
        }
        if !is_known_device(&self.embeddings.device) {
            return Err(invalid(
                "embeddings.device",
                format!("unknown device {:?}", self.embeddings.device),
            ));
        }
        if self.embeddings.backend == EmbeddingBackend::Http {
            url::Url::parse(&self.embeddings.endpoint)
                .map_err(|error| invalid("embeddings.endpoint", error.to_string()))?;
        }
        if self.pipeline.workers == 0 {
            return Err(invalid("pipeline.workers", "must be positive"));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(invalid("retry.backoff_multiplier", "must be at least 1.0"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, details: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        details: details.into(),
    }
}

fn is_known_device(device: &str) -> bool {
    match device {
        "cpu" | "cuda" | "mps" => true,
        other => other
            .strip_prefix("cuda:")
            .is_some_and(|index| !index.is_empty() && index.chars().all(|c| c.is_ascii_digit())),
    }
}

/// Lower-cased extension without the leading dot.
pub fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_lowercase()
}

/// Everything a run needs, validated and compiled once.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub config: AppConfig,
    pub normalizer: TextNormalizer,
    pub segmenter: StructureSegmenter,
    pub chunker: ChunkBuilder,
    pub metadata: MetadataExtractor,
    allowed_extensions: Vec<String>,
}

impl RunContext {
    pub fn new(config: AppConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let normalizer = TextNormalizer::new(&config.processing.text_clean_patterns)?;
        let rules = config
            .processing
            .legal_text
            .section_patterns
            .iter()
            .map(|pattern| SectionRule::new(&pattern.kind, &pattern.pattern))
            .collect::<Result<Vec<_>, _>>()?;
        let segmenter =
            StructureSegmenter::new(rules, config.processing.legal_text.article_threshold)?;
        let chunker =
            ChunkBuilder::new(config.processing.chunk_size, config.processing.chunk_overlap)?;

        let mut allowed_extensions = config
            .processing
            .allowed_extensions
            .iter()
            .map(|extension| normalize_extension(extension))
            .filter(|extension| !extension.is_empty())
            .collect::<Vec<_>>();
        allowed_extensions.sort_unstable();
        allowed_extensions.dedup();

        Ok(Self {
            config,
            normalizer,
            segmenter,
            chunker,
            metadata: MetadataExtractor::new()?,
            allowed_extensions,
        })
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    pub fn is_allowed(&self, path: &Path) -> bool {
        extension_of(path).is_some_and(|extension| {
            self.allowed_extensions
                .iter()
                .any(|allowed| *allowed == extension)
        })
    }
}

pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|extension| extension.to_str())
        .map(normalize_extension)
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig::from_yaml_str(
        r#"
qdrant:
  host: localhost
  port: 6333
  collection_name: legal_documents
  vector_size: 16
processing:
  chunk_size: 200
  chunk_overlap: 50
  allowed_extensions: [".txt", ".md", ".pdf"]
  text_clean_patterns:
    - '\d+-ФЗ'
    - '(?m)^\s*\d+\s*$'
  legal_text:
    article_threshold: 400
embeddings:
  model_name: sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2
  backend: ngram
  batch_size: 4
retry:
  max_retries: 2
  initial_delay_ms: 1
  max_delay_ms: 2
pipeline:
  workers: 2
"#,
    )
    .expect("test config parses")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_config_is_loaded_with_defaults() {
        let config = test_config();
        assert_eq!(config.qdrant.endpoint(), "http://localhost:6333");
        assert_eq!(config.qdrant.timeout_secs, 60);
        assert_eq!(config.qdrant.upsert_batch_size, 100);
        assert_eq!(config.embeddings.device, "cpu");
        assert_eq!(config.embeddings.backend, EmbeddingBackend::Ngram);
        let kinds = config
            .processing
            .legal_text
            .section_patterns
            .iter()
            .map(|pattern| pattern.kind.as_str())
            .collect::<Vec<_>>();
        assert_eq!(kinds, ["Раздел", "Подраздел", "Глава", "Статья"]);
    }

    #[test]
    fn shipped_config_compiles() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/config.yaml");
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.embeddings.backend, EmbeddingBackend::Http);

        let context = RunContext::new(config).unwrap();
        assert_eq!(context.allowed_extensions(), ["md", "pdf", "txt"]);
        assert_eq!(context.segmenter.rules().len(), 4);
    }

    #[test]
    fn context_normalizes_allowed_extensions() {
        let context = RunContext::new(test_config()).unwrap();
        assert_eq!(context.allowed_extensions(), ["md", "pdf", "txt"]);
        assert!(context.is_allowed(Path::new("/data/law.TXT")));
        assert!(!context.is_allowed(Path::new("/data/law.docx")));
        assert!(!context.is_allowed(Path::new("/data/README")));
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let mut config = test_config();
        config.processing.chunk_overlap = config.processing.chunk_size;
        let error = RunContext::new(config).unwrap_err();
        assert!(matches!(
            error,
            ConfigError::Invalid {
                field: "processing.chunk_overlap",
                ..
            }
        ));
    }

    #[test]
    fn malformed_clean_pattern_is_rejected_at_startup() {
        let mut config = test_config();
        config.processing.text_clean_patterns.push("([unclosed".to_string());
        let error = RunContext::new(config).unwrap_err();
        assert!(matches!(error, ConfigError::Pattern { .. }));
    }

    #[test]
    fn malformed_section_pattern_is_rejected_at_startup() {
        let mut config = test_config();
        config.processing.legal_text.section_patterns = vec![SectionPattern {
            kind: "Глава".to_string(),
            pattern: "Глава(".to_string(),
        }];
        assert!(RunContext::new(config).is_err());
    }

    #[test]
    fn unknown_device_is_rejected() {
        let mut config = test_config();
        config.embeddings.device = "tpu".to_string();
        assert!(RunContext::new(config.clone()).is_err());
        config.embeddings.device = "cuda:1".to_string();
        assert!(RunContext::new(config).is_ok());
    }

    #[test]
    fn host_with_scheme_is_kept() {
        let mut config = test_config();
        config.qdrant.host = "https://qdrant.internal/".to_string();
        assert_eq!(config.qdrant.endpoint(), "https://qdrant.internal:6333");
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let error = AppConfig::load(Path::new("/definitely/missing.yaml")).unwrap_err();
        assert!(matches!(error, ConfigError::Read { .. }));
    }
}
