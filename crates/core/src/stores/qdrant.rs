use crate::config::QdrantConfig;
use crate::error::StoreError;
use crate::models::{IndexRecord, RecordPayload};
use crate::retry::RetryPolicy;
use crate::traits::VectorIndex;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const BACKEND: &str = "qdrant";
/// Failed upserts larger than this are retried as two halves.
const SPLIT_THRESHOLD: usize = 10;

pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
    upsert_batch_size: usize,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct PointStruct<'a> {
    id: u64,
    vector: &'a [f32],
    payload: &'a RecordPayload,
}

#[derive(Serialize)]
struct UpsertBody<'a> {
    points: Vec<PointStruct<'a>>,
}

impl QdrantStore {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, StoreError> {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Url::parse(&endpoint)?;
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            endpoint,
            collection: collection.into(),
            client,
            upsert_batch_size: 100,
            retry,
        })
    }

    pub fn from_config(config: &QdrantConfig, retry: RetryPolicy) -> Result<Self, StoreError> {
        Ok(
            Self::new(config.endpoint(), &config.collection_name, config.timeout(), retry)?
                .with_upsert_batch_size(config.upsert_batch_size),
        )
    }

    pub fn with_upsert_batch_size(mut self, upsert_batch_size: usize) -> Self {
        self.upsert_batch_size = upsert_batch_size.max(1);
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.endpoint, self.collection)
    }

    /// Vector size of the existing collection, `None` when it does not exist.
    async fn collection_vector_size(&self) -> Result<Option<usize>, StoreError> {
        let info = self
            .retry
            .run("qdrant.get_collection", || self.get_collection(), StoreError::is_transient)
            .await?;
        let Some(info) = info else {
            return Ok(None);
        };

        info.pointer("/result/config/params/vectors/size")
            .and_then(Value::as_u64)
            .map(|size| Some(size as usize))
            .ok_or_else(|| StoreError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("collection {} has no single unnamed vector config", self.collection),
            })
    }

    async fn get_collection(&self) -> Result<Option<Value>, StoreError> {
        let response = self.client.get(self.collection_url()).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(expect_success(response).await?.json().await?))
    }

    async fn create_collection(&self, vector_size: usize) -> Result<(), StoreError> {
        let body = json!({ "vectors": { "size": vector_size, "distance": "Cosine" } });
        let response = self.client.put(self.collection_url()).json(&body).send().await?;
        expect_success(response).await?;
        Ok(())
    }

    async fn delete_collection(&self) -> Result<(), StoreError> {
        let response = self.client.delete(self.collection_url()).send().await?;
        if response.status() != StatusCode::NOT_FOUND {
            expect_success(response).await?;
        }
        Ok(())
    }

    async fn put_points(&self, body: &UpsertBody<'_>) -> Result<(), StoreError> {
        let url = format!("{}/points?wait=true", self.collection_url());
        let response = self.client.put(url).json(body).send().await?;
        expect_success(response).await?;
        Ok(())
    }

    async fn post_delete(&self, body: &Value) -> Result<(), StoreError> {
        let url = format!("{}/points/delete?wait=true", self.collection_url());
        let response = self.client.post(url).json(body).send().await?;
        if response.status() != StatusCode::NOT_FOUND {
            expect_success(response).await?;
        }
        Ok(())
    }

    async fn send_points(&self, records: &[IndexRecord]) -> Result<(), StoreError> {
        let body = UpsertBody {
            points: records
                .iter()
                .map(|record| PointStruct {
                    id: record.point_id,
                    vector: &record.vector,
                    payload: &record.payload,
                })
                .collect(),
        };
        self.retry
            .run("qdrant.upsert", || self.put_points(&body), StoreError::is_transient)
            .await
    }

    /// Sends one batch; a failing batch above the split threshold is halved
    /// and each half sent on its own.
    async fn upsert_batch(&self, batch: &[IndexRecord]) -> Result<(), StoreError> {
        let mut pending = vec![batch];
        while let Some(slice) = pending.pop() {
            match self.send_points(slice).await {
                Ok(()) => debug!(points = slice.len(), "qdrant batch stored"),
                Err(error) if slice.len() > SPLIT_THRESHOLD => {
                    warn!(points = slice.len(), error = %error, "qdrant batch failed, splitting in halves");
                    let (left, right) = slice.split_at(slice.len() / 2);
                    pending.push(right);
                    pending.push(left);
                }
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }

    async fn delete_by_filter(&self, filter: Value) -> Result<(), StoreError> {
        let body = json!({ "filter": filter });
        self.retry
            .run("qdrant.delete", || self.post_delete(&body), StoreError::is_transient)
            .await
    }
}

async fn expect_success(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    Err(StoreError::Status {
        backend: BACKEND.to_string(),
        status: status.as_u16(),
        body,
    })
}

fn document_condition(document_id: &str) -> Value {
    json!({ "key": "document_id", "match": { "value": document_id } })
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn ensure_collection(&self, vector_size: usize) -> Result<(), StoreError> {
        match self.collection_vector_size().await? {
            Some(actual) if actual == vector_size => {
                debug!(collection = %self.collection, vector_size, "collection exists");
                Ok(())
            }
            Some(actual) => Err(StoreError::CollectionMismatch {
                collection: self.collection.clone(),
                expected: vector_size,
                actual,
            }),
            None => {
                self.retry
                    .run(
                        "qdrant.create_collection",
                        || self.create_collection(vector_size),
                        StoreError::is_transient,
                    )
                    .await?;
                info!(collection = %self.collection, vector_size, "collection created");
                Ok(())
            }
        }
    }

    async fn drop_collection(&self) -> Result<(), StoreError> {
        self.retry
            .run("qdrant.drop_collection", || self.delete_collection(), StoreError::is_transient)
            .await?;
        info!(collection = %self.collection, "collection dropped");
        Ok(())
    }

    async fn upsert(&self, records: &[IndexRecord]) -> Result<(), StoreError> {
        for batch in records.chunks(self.upsert_batch_size) {
            self.upsert_batch(batch).await?;
        }
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), StoreError> {
        self.delete_by_filter(json!({ "must": [document_condition(document_id)] }))
            .await
    }

    async fn prune_document(&self, document_id: &str, keep: u64) -> Result<(), StoreError> {
        self.delete_by_filter(json!({
            "must": [
                document_condition(document_id),
                { "key": "chunk_index", "range": { "gte": keep } },
            ]
        }))
        .await
    }
}
