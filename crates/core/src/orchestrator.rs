use crate::config::RunContext;
use crate::embeddings::{build_embedder, EmbeddingGenerator};
use crate::error::{IngestError, PipelineError, StoreError};
use crate::ingest::{discover_files, load_document};
use crate::models::{Chunk, Document, DocumentMetadata, IndexRecord};
use crate::stores::QdrantStore;
use crate::traits::VectorIndex;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    Indexed { chunks: usize, degraded: usize },
    Skipped { reason: String },
    Failed { reason: String },
    Cancelled,
}

impl OutcomeStatus {
    pub fn label(&self) -> &'static str {
        match self {
            OutcomeStatus::Indexed { .. } => "indexed",
            OutcomeStatus::Skipped { .. } => "skipped",
            OutcomeStatus::Failed { .. } => "failed",
            OutcomeStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Indexed { chunks, degraded: 0 } => write!(f, "indexed ({chunks} chunks)"),
            OutcomeStatus::Indexed { chunks, degraded } => {
                write!(f, "indexed ({chunks} chunks, {degraded} degraded)")
            }
            OutcomeStatus::Skipped { reason } => write!(f, "skipped: {reason}"),
            OutcomeStatus::Failed { reason } => write!(f, "failed: {reason}"),
            OutcomeStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentOutcome {
    pub path: PathBuf,
    pub document_id: Option<String>,
    pub doc_type: Option<String>,
    pub status: OutcomeStatus,
}

impl DocumentOutcome {
    fn new(path: PathBuf, status: OutcomeStatus) -> Self {
        Self {
            path,
            document_id: None,
            doc_type: None,
            status,
        }
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self.status, OutcomeStatus::Indexed { .. })
    }
}

/// Per-file results of a batch or reindex run, in input order.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcomes: Vec<DocumentOutcome>,
    pub elapsed: Duration,
}

impl RunReport {
    fn count(&self, label: &str) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status.label() == label)
            .count()
    }

    pub fn indexed(&self) -> usize {
        self.count("indexed")
    }

    pub fn skipped(&self) -> usize {
        self.count("skipped")
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }

    pub fn cancelled(&self) -> usize {
        self.count("cancelled")
    }

    /// Files with an allowed extension, whatever became of them.
    pub fn attempted(&self) -> usize {
        self.outcomes.len() - self.skipped()
    }

    pub fn total_chunks(&self) -> usize {
        self.outcomes
            .iter()
            .map(|outcome| match outcome.status {
                OutcomeStatus::Indexed { chunks, .. } => chunks,
                _ => 0,
            })
            .sum()
    }

    pub fn degraded_chunks(&self) -> usize {
        self.outcomes
            .iter()
            .map(|outcome| match outcome.status {
                OutcomeStatus::Indexed { degraded, .. } => degraded,
                _ => 0,
            })
            .sum()
    }

    /// Indexed documents per detected document type.
    pub fn by_doc_type(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for outcome in self.outcomes.iter().filter(|outcome| outcome.is_indexed()) {
            let key = outcome
                .doc_type
                .clone()
                .unwrap_or_else(|| "unknown".to_string());
            *counts.entry(key).or_insert(0) += 1;
        }
        counts
    }

    /// A run succeeds unless files were attempted and none was indexed.
    pub fn is_success(&self) -> bool {
        self.attempted() == 0 || self.indexed() > 0
    }
}

struct PreparedDocument {
    document: Document,
    metadata: DocumentMetadata,
    chunks: Vec<Chunk>,
}

/// Drives documents from disk into a [`VectorIndex`].
pub struct IndexingPipeline<V>
where
    V: VectorIndex,
{
    context: Arc<RunContext>,
    generator: Arc<Mutex<EmbeddingGenerator>>,
    store: Arc<V>,
    cancel: CancellationToken,
}

impl<V: VectorIndex> Clone for IndexingPipeline<V> {
    fn clone(&self) -> Self {
        Self {
            context: Arc::clone(&self.context),
            generator: Arc::clone(&self.generator),
            store: Arc::clone(&self.store),
            cancel: self.cancel.clone(),
        }
    }
}

impl IndexingPipeline<QdrantStore> {
    /// Builds the configured embedder and Qdrant client and probes the model.
    pub async fn from_context(context: Arc<RunContext>) -> Result<Self, PipelineError> {
        let config = &context.config;
        let retry = config.retry_policy();
        let embedder = build_embedder(
            &config.embeddings,
            config.qdrant.vector_size,
            config.qdrant.timeout(),
            retry.clone(),
        )?;
        let generator = EmbeddingGenerator::new(
            embedder,
            config.embeddings.batch_size,
            config.qdrant.vector_size,
        )
        .await?;
        let store = QdrantStore::from_config(&config.qdrant, retry)?;
        info!(
            collection = store.collection(),
            endpoint = %config.qdrant.endpoint(),
            "qdrant client ready"
        );

        Ok(Self::new(context, generator, Arc::new(store)))
    }
}

impl<V> IndexingPipeline<V>
where
    V: VectorIndex + 'static,
{
    pub fn new(context: Arc<RunContext>, generator: EmbeddingGenerator, store: Arc<V>) -> Self {
        Self {
            context,
            generator: Arc::new(Mutex::new(generator)),
            store,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn store(&self) -> &V {
        &self.store
    }

    async fn prepare_collection(&self) -> Result<(), PipelineError> {
        self.store
            .ensure_collection(self.context.config.qdrant.vector_size)
            .await?;
        Ok(())
    }

    pub async fn single(&self, path: &Path) -> Result<DocumentOutcome, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("single", %run_id, path = %path.display());
        async move {
            self.prepare_collection().await?;
            let outcome = self.index_document(path.to_path_buf()).await;
            info!(status = %outcome.status, "single run finished");
            Ok(outcome)
        }
        .instrument(span)
        .await
    }

    pub async fn batch(&self, input_dir: &Path) -> Result<RunReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("batch", %run_id, input = %input_dir.display());
        async move {
            let started = Instant::now();
            let files = discover_files(input_dir)?;
            self.prepare_collection().await?;
            Ok(self.run_files(run_id, files, started).await)
        }
        .instrument(span)
        .await
    }

    /// Drops and rebuilds the collection from `input_dir`. Assumes nobody else
    /// writes to the collection meanwhile.
    pub async fn reindex(&self, input_dir: &Path, confirm: bool) -> Result<RunReport, PipelineError> {
        if !confirm {
            return Err(PipelineError::ReindexNotConfirmed);
        }

        let run_id = Uuid::new_v4();
        let span = info_span!("reindex", %run_id, input = %input_dir.display());
        async move {
            let started = Instant::now();
            let files = discover_files(input_dir)?;
            warn!(files = files.len(), "dropping collection for reindex");
            self.store.drop_collection().await?;
            self.prepare_collection().await?;
            Ok(self.run_files(run_id, files, started).await)
        }
        .instrument(span)
        .await
    }

    async fn run_files(&self, run_id: Uuid, files: Vec<PathBuf>, started: Instant) -> RunReport {
        let workers = self.context.config.pipeline.workers.max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut slots: Vec<Option<DocumentOutcome>> = vec![None; files.len()];
        let mut tasks = JoinSet::new();

        info!(files = files.len(), workers, "run started");

        for (position, path) in files.iter().enumerate() {
            if !self.context.is_allowed(path) {
                slots[position] = Some(self.skip_disallowed(path));
                continue;
            }

            let pipeline = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let path = path.clone();
            tasks.spawn(
                async move {
                    let permit = tokio::select! {
                        _ = pipeline.cancel.cancelled() => None,
                        permit = semaphore.acquire_owned() => permit.ok(),
                    };
                    let outcome = match permit {
                        Some(_permit) => pipeline.index_document(path).await,
                        None => DocumentOutcome::new(path, OutcomeStatus::Cancelled),
                    };
                    (position, outcome)
                }
                .in_current_span(),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, outcome)) => slots[position] = Some(outcome),
                Err(error) => warn!(error = %error, "document task aborted"),
            }
        }

        let outcomes = slots
            .into_iter()
            .zip(files)
            .map(|(slot, path)| {
                slot.unwrap_or_else(|| {
                    DocumentOutcome::new(
                        path,
                        OutcomeStatus::Failed {
                            reason: "document task aborted".to_string(),
                        },
                    )
                })
            })
            .collect();

        let report = RunReport {
            run_id,
            outcomes,
            elapsed: started.elapsed(),
        };
        info!(
            indexed = report.indexed(),
            skipped = report.skipped(),
            failed = report.failed(),
            cancelled = report.cancelled(),
            chunks = report.total_chunks(),
            degraded = report.degraded_chunks(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "run finished"
        );
        report
    }

    fn skip_disallowed(&self, path: &Path) -> DocumentOutcome {
        let reason = IngestError::DisallowedExtension {
            path: path.to_path_buf(),
            extension: crate::config::extension_of(path).unwrap_or_default(),
        }
        .to_string();
        debug!(path = %path.display(), "skipping file with disallowed extension");
        DocumentOutcome::new(path.to_path_buf(), OutcomeStatus::Skipped { reason })
    }

    /// Load, chunk, embed and store one file. Never fails the run.
    async fn index_document(&self, path: PathBuf) -> DocumentOutcome {
        if self.cancel.is_cancelled() {
            return DocumentOutcome::new(path, OutcomeStatus::Cancelled);
        }
        if !self.context.is_allowed(&path) {
            return self.skip_disallowed(&path);
        }

        let context = Arc::clone(&self.context);
        let task_path = path.clone();
        let prepared = match tokio::task::spawn_blocking(move || prepare_document(&context, &task_path)).await {
            Ok(Ok(prepared)) => prepared,
            Ok(Err(error)) => return self.fail(path, None, error.to_string()),
            Err(error) => return self.fail(path, None, IngestError::Task(error.to_string()).to_string()),
        };

        let document_id = prepared.document.document_id.clone();
        let mut outcome = DocumentOutcome {
            path,
            document_id: Some(document_id.clone()),
            doc_type: prepared.metadata.doc_type.clone(),
            status: OutcomeStatus::Cancelled,
        };

        if prepared.chunks.is_empty() {
            outcome.status = match self.store.prune_document(&document_id, 0).await {
                Ok(()) => OutcomeStatus::Skipped {
                    reason: "no text left after normalization".to_string(),
                },
                Err(error) => OutcomeStatus::Failed {
                    reason: store_failure(&document_id, error),
                },
            };
            return outcome;
        }

        if self.cancel.is_cancelled() {
            return outcome;
        }

        let embeddings = {
            let generator = self.generator.lock().await;
            generator.embed_chunks(&document_id, &prepared.chunks).await
        };
        let embeddings = match embeddings {
            Ok(embeddings) => embeddings,
            Err(error) => return self.fail(outcome.path, Some(document_id), error.to_string()),
        };

        if self.cancel.is_cancelled() {
            return outcome;
        }

        let degraded = embeddings.degraded_count();
        let records = prepared
            .chunks
            .iter()
            .zip(embeddings.vectors)
            .zip(embeddings.degraded)
            .map(|((chunk, vector), flag)| {
                IndexRecord::new(&prepared.document, &prepared.metadata, chunk, vector, flag)
            })
            .collect::<Vec<_>>();

        if let Err(error) = self.store.upsert(&records).await {
            let reason = store_failure(&document_id, error);
            return self.fail(outcome.path, Some(document_id), reason);
        }
        if let Err(error) = self
            .store
            .prune_document(&document_id, records.len() as u64)
            .await
        {
            let reason = store_failure(&document_id, error);
            return self.fail(outcome.path, Some(document_id), reason);
        }

        info!(
            path = %outcome.path.display(),
            document_id = %document_id,
            chunks = records.len(),
            degraded,
            "document indexed"
        );
        outcome.status = OutcomeStatus::Indexed {
            chunks: records.len(),
            degraded,
        };
        outcome
    }

    fn fail(&self, path: PathBuf, document_id: Option<String>, reason: String) -> DocumentOutcome {
        warn!(path = %path.display(), %reason, "document failed");
        DocumentOutcome {
            path,
            document_id,
            doc_type: None,
            status: OutcomeStatus::Failed { reason },
        }
    }
}

fn store_failure(document_id: &str, source: StoreError) -> String {
    PipelineError::Document {
        document_id: document_id.to_string(),
        source,
    }
    .to_string()
}

/// CPU-bound part of indexing one file.
fn prepare_document(context: &RunContext, path: &Path) -> Result<PreparedDocument, IngestError> {
    let document = load_document(path, context)?;
    let metadata = context.metadata.document(&document.text);
    let normalized = context.normalizer.normalize(&document.text);
    let units = context.segmenter.segment(&normalized);
    let mut chunks = context.chunker.build(&document.document_id, &units);
    context.metadata.enrich(&mut chunks);

    debug!(
        path = %path.display(),
        chars = normalized.chars().count(),
        units = units.len(),
        chunks = chunks.len(),
        "document prepared"
    );
    Ok(PreparedDocument {
        document,
        metadata,
        chunks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::embeddings::CharacterNgramEmbedder;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Mutex as StdMutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct FakeVectorIndex {
        vector_size: StdMutex<Option<usize>>,
        points: StdMutex<BTreeMap<u64, IndexRecord>>,
        drops: StdMutex<usize>,
        reject_upserts: bool,
    }

    impl FakeVectorIndex {
        fn with_collection(vector_size: usize) -> Self {
            let index = Self::default();
            *index.vector_size.lock().unwrap() = Some(vector_size);
            index
        }

        fn points(&self) -> Vec<IndexRecord> {
            self.points.lock().unwrap().values().cloned().collect()
        }

        fn documents(&self) -> Vec<String> {
            let mut ids = self
                .points()
                .into_iter()
                .map(|record| record.payload.document_id)
                .collect::<Vec<_>>();
            ids.sort();
            ids.dedup();
            ids
        }
    }

    #[async_trait]
    impl VectorIndex for FakeVectorIndex {
        async fn ensure_collection(&self, vector_size: usize) -> Result<(), StoreError> {
            let mut current = self.vector_size.lock().unwrap();
            match *current {
                Some(actual) if actual != vector_size => Err(StoreError::CollectionMismatch {
                    collection: "fake".to_string(),
                    expected: vector_size,
                    actual,
                }),
                _ => {
                    *current = Some(vector_size);
                    Ok(())
                }
            }
        }

        async fn drop_collection(&self) -> Result<(), StoreError> {
            *self.vector_size.lock().unwrap() = None;
            self.points.lock().unwrap().clear();
            *self.drops.lock().unwrap() += 1;
            Ok(())
        }

        async fn upsert(&self, records: &[IndexRecord]) -> Result<(), StoreError> {
            if self.reject_upserts {
                return Err(StoreError::Status {
                    backend: "fake".to_string(),
                    status: 400,
                    body: "wrong vector name".to_string(),
                });
            }
            let mut points = self.points.lock().unwrap();
            for record in records {
                points.insert(record.point_id, record.clone());
            }
            Ok(())
        }

        async fn delete_document(&self, document_id: &str) -> Result<(), StoreError> {
            self.points
                .lock()
                .unwrap()
                .retain(|_, record| record.payload.document_id != document_id);
            Ok(())
        }

        async fn prune_document(&self, document_id: &str, keep: u64) -> Result<(), StoreError> {
            self.points.lock().unwrap().retain(|_, record| {
                record.payload.document_id != document_id || record.payload.chunk_index < keep
            });
            Ok(())
        }
    }

    fn law_text(articles: usize) -> String {
        let mut text = String::from("Федеральный закон\nГлава 1. Общие положения\n");
        for number in 1..=articles {
            text.push_str(&format!(
                "Статья {number}. Предмет регулирования\nНастоящий закон регулирует отношения, связанные с договором и обязательством номер {number}.\n\n"
            ));
        }
        text
    }

    async fn pipeline(store: Arc<FakeVectorIndex>) -> IndexingPipeline<FakeVectorIndex> {
        let context = Arc::new(RunContext::new(test_config()).unwrap());
        let generator = EmbeddingGenerator::new(Arc::new(CharacterNgramEmbedder { dimensions: 16 }), 4, 16)
            .await
            .unwrap();
        IndexingPipeline::new(context, generator, store)
    }

    #[tokio::test]
    async fn batch_indexes_allowed_files_and_skips_others() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("law.txt"), law_text(3))?;
        fs::write(dir.path().join("memo.docx"), "not text")?;
        let store = Arc::new(FakeVectorIndex::default());

        let report = pipeline(store.clone()).await.batch(dir.path()).await?;

        assert_eq!(report.indexed(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failed(), 0);
        assert!(report.is_success());
        let skipped = report
            .outcomes
            .iter()
            .find(|outcome| outcome.path.ends_with("memo.docx"))
            .unwrap();
        assert!(matches!(skipped.status, OutcomeStatus::Skipped { .. }));

        let points = store.points();
        assert_eq!(points.len(), report.total_chunks());
        assert!(points.iter().all(|record| record.vector.len() == 16));
        assert!(points
            .iter()
            .all(|record| record.payload.section_path.starts_with("Глава 1. Общие положения")));
        assert_eq!(points[0].payload.document.doc_type.as_deref(), Some("federal_law"));
        assert_eq!(report.by_doc_type().get("federal_law"), Some(&1));
        Ok(())
    }

    #[tokio::test]
    async fn reindexing_an_unchanged_file_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("law.txt");
        fs::write(&path, law_text(4))?;
        let store = Arc::new(FakeVectorIndex::default());
        let pipeline = pipeline(store.clone()).await;

        pipeline.single(&path).await?;
        let first = store.points();
        let outcome = pipeline.single(&path).await?;
        let second = store.points();

        assert!(outcome.is_indexed());
        assert_eq!(first.len(), second.len());
        for (left, right) in first.iter().zip(&second) {
            assert_eq!(left.point_id, right.point_id);
            assert_eq!(left.vector, right.vector);
        }
        Ok(())
    }

    #[tokio::test]
    async fn shrinking_a_document_prunes_its_stale_chunks() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("law.txt");
        fs::write(&path, law_text(8))?;
        let store = Arc::new(FakeVectorIndex::default());
        let pipeline = pipeline(store.clone()).await;

        pipeline.single(&path).await?;
        let before = store.points().len();
        fs::write(&path, law_text(1))?;
        let outcome = pipeline.single(&path).await?;

        let OutcomeStatus::Indexed { chunks, .. } = outcome.status.clone() else {
            panic!("expected indexed outcome, got {:?}", outcome.status);
        };
        assert!(chunks < before);
        let points = store.points();
        assert_eq!(points.len(), chunks);
        assert!(points.iter().all(|record| record.payload.chunk_index < chunks as u64));
        Ok(())
    }

    #[tokio::test]
    async fn missing_file_fails_without_aborting() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = Arc::new(FakeVectorIndex::default());

        let outcome = pipeline(store.clone())
            .await
            .single(&dir.path().join("absent.txt"))
            .await?;

        assert!(matches!(outcome.status, OutcomeStatus::Failed { .. }));
        assert!(store.points().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn deleting_one_document_keeps_the_others() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.txt"), law_text(2))?;
        fs::write(dir.path().join("b.txt"), law_text(3))?;
        let store = Arc::new(FakeVectorIndex::default());
        let pipeline = pipeline(store.clone()).await;
        let report = pipeline.batch(dir.path()).await?;
        assert_eq!(store.documents().len(), 2);

        let removed = report.outcomes[0].document_id.clone().unwrap();
        let kept = report.outcomes[1].document_id.clone().unwrap();
        pipeline.store().delete_document(&removed).await?;

        assert_eq!(store.documents(), [kept]);
        let OutcomeStatus::Indexed { chunks, .. } = report.outcomes[1].status.clone() else {
            panic!("expected indexed outcome, got {:?}", report.outcomes[1].status);
        };
        assert_eq!(store.points().len(), chunks);
        Ok(())
    }

    #[tokio::test]
    async fn store_failure_names_the_document() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("law.txt");
        fs::write(&path, law_text(2))?;
        let store = Arc::new(FakeVectorIndex {
            reject_upserts: true,
            ..FakeVectorIndex::default()
        });

        let outcome = pipeline(store.clone()).await.single(&path).await?;

        let document_id = outcome.document_id.clone().unwrap();
        let OutcomeStatus::Failed { reason } = outcome.status.clone() else {
            panic!("expected failed outcome, got {:?}", outcome.status);
        };
        assert!(reason.starts_with(&format!("store error for {document_id}")));
        assert!(reason.contains("wrong vector name"));
        assert!(store.points().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn reindex_requires_confirmation() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("law.txt"), law_text(2))?;
        let store = Arc::new(FakeVectorIndex::default());
        let pipeline = pipeline(store.clone()).await;
        pipeline.batch(dir.path()).await?;
        let before = store.points().len();

        let error = pipeline.reindex(dir.path(), false).await.unwrap_err();

        assert!(matches!(error, PipelineError::ReindexNotConfirmed));
        assert_eq!(*store.drops.lock().unwrap(), 0);
        assert_eq!(store.points().len(), before);
        Ok(())
    }

    #[tokio::test]
    async fn reindex_keeps_only_the_final_input() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.txt"), law_text(2))?;
        fs::write(dir.path().join("b.txt"), law_text(3))?;
        let store = Arc::new(FakeVectorIndex::default());
        let pipeline = pipeline(store.clone()).await;
        pipeline.batch(dir.path()).await?;
        assert_eq!(store.documents().len(), 2);

        fs::remove_file(dir.path().join("b.txt"))?;
        let report = pipeline.reindex(dir.path(), true).await?;

        assert_eq!(report.indexed(), 1);
        assert_eq!(*store.drops.lock().unwrap(), 1);
        let remaining = store.documents();
        assert_eq!(remaining.len(), 1);
        assert_eq!(Some(&remaining[0]), report.outcomes[0].document_id.as_ref());
        Ok(())
    }

    #[tokio::test]
    async fn reindex_of_missing_directory_leaves_collection_alone() {
        let store = Arc::new(FakeVectorIndex::with_collection(16));
        let error = pipeline(store.clone())
            .await
            .reindex(Path::new("/definitely/not/here"), true)
            .await
            .unwrap_err();

        assert!(matches!(error, PipelineError::Ingest(IngestError::InvalidDirectory(_))));
        assert_eq!(*store.drops.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn collection_with_other_dimension_aborts_the_run() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("law.txt"), law_text(1))?;
        let store = Arc::new(FakeVectorIndex::with_collection(8));

        let error = pipeline(store).await.batch(dir.path()).await.unwrap_err();
        assert!(matches!(
            error,
            PipelineError::Store(StoreError::CollectionMismatch { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_run_starts_no_documents() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.txt"), law_text(1))?;
        fs::write(dir.path().join("b.txt"), law_text(1))?;
        let store = Arc::new(FakeVectorIndex::default());
        let pipeline = pipeline(store.clone()).await;
        pipeline.cancellation_token().cancel();

        let report = pipeline.batch(dir.path()).await?;

        assert_eq!(report.cancelled(), 2);
        assert_eq!(report.attempted(), 2);
        assert!(!report.is_success());
        assert!(store.points().is_empty());
        Ok(())
    }

    #[test]
    fn empty_run_counts_as_success() {
        let report = RunReport {
            run_id: Uuid::new_v4(),
            outcomes: vec![DocumentOutcome::new(
                PathBuf::from("a.docx"),
                OutcomeStatus::Skipped {
                    reason: "extension".to_string(),
                },
            )],
            elapsed: Duration::ZERO,
        };
        assert_eq!(report.attempted(), 0);
        assert!(report.is_success());
    }
}
