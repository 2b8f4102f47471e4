//! TurboIntegrator documentation lookup.
//!
//! Queries are embedded by an external service and ranked by the document
//! store; nothing is scored locally.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::{StreamExt, TryStreamExt, stream};
use serde::{Deserialize, Serialize};
use surrealdb::Connection;
use tm1_types::{DocMatch, DocRecord, DocumentationResult};
use tracing::{debug, info};

use crate::control::{ControlError, ControlResult};
use crate::store::SurrealDocStore;

/// Number of documents returned when the caller gives no limit.
pub const DEFAULT_DOC_LIMIT: usize = 1;

const SEED_CONCURRENCY: usize = 4;
const SEED_EXTENSIONS: [&str; 2] = ["md", "txt"];

/// Turns text into a vector in the same space as the stored documents.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> ControlResult<Vec<f32>>;
}

/// Ranked documentation search.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Returns up to `top_k` documents, best match first.
    async fn query(&self, text: &str, top_k: usize) -> ControlResult<Vec<DocMatch>>;
}

/// Embedder backed by an Ollama-compatible `/api/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    /// # Errors
    /// Returns `ControlError::Embed` if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        timeout: Duration,
    ) -> ControlResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ControlError::Embed(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/embeddings", base_url.trim_end_matches('/')),
            model: model.into(),
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> ControlResult<Vec<f32>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|err| ControlError::Embed(err.to_string()))?
            .error_for_status()
            .map_err(|err| ControlError::Embed(err.to_string()))?;
        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| ControlError::Embed(err.to_string()))?;
        if body.embedding.is_empty() {
            return Err(ControlError::Embed("empty embedding returned".to_string()));
        }
        Ok(body.embedding)
    }
}

/// Document index stored in `SurrealDB`.
pub struct SurrealDocIndex<C: Connection> {
    store: SurrealDocStore<C>,
    embedder: Arc<dyn Embedder>,
}

impl<C: Connection> Clone for SurrealDocIndex<C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            embedder: self.embedder.clone(),
        }
    }
}

impl<C: Connection> SurrealDocIndex<C> {
    pub fn new(store: SurrealDocStore<C>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    #[must_use]
    pub const fn store(&self) -> &SurrealDocStore<C> {
        &self.store
    }

    /// Embeds and stores one document.
    ///
    /// # Errors
    /// Returns `ControlError` if embedding or the database write fails.
    pub async fn add_document(
        &self,
        text: &str,
        source: Option<String>,
    ) -> ControlResult<DocRecord> {
        let embedding = self.embedder.embed(text).await?;
        let record = DocRecord {
            text: text.to_string(),
            source,
            embedding,
            ingested_at: Some(Utc::now().to_rfc3339()),
        };
        Ok(self.store.add_document(record).await?)
    }

    /// Loads every `.md` and `.txt` file in `dir` into the index and returns
    /// how many were added.
    ///
    /// # Errors
    /// Returns `ControlError` if the directory cannot be read or a document
    /// fails to load.
    pub async fn seed_directory(&self, dir: &Path) -> ControlResult<usize> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if is_seed_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let added: Vec<()> = stream::iter(paths)
            .map(|path| self.seed_file(path))
            .buffer_unordered(SEED_CONCURRENCY)
            .try_collect()
            .await?;
        info!(count = added.len(), dir = %dir.display(), "documentation seeded");
        Ok(added.len())
    }

    async fn seed_file(&self, path: PathBuf) -> ControlResult<()> {
        let text = tokio::fs::read_to_string(&path).await?;
        if text.trim().is_empty() {
            return Err(ControlError::InvalidInput(format!(
                "documentation file {} is empty",
                path.display()
            )));
        }
        let source = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        self.add_document(&text, source).await?;
        debug!(path = %path.display(), "documentation file indexed");
        Ok(())
    }
}

#[async_trait]
impl<C: Connection> DocumentIndex for SurrealDocIndex<C> {
    async fn query(&self, text: &str, top_k: usize) -> ControlResult<Vec<DocMatch>> {
        let embedding = self.embedder.embed(text).await?;
        Ok(self.store.nearest(embedding, top_k).await?)
    }
}

fn is_seed_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SEED_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

/// Looks up documentation for `query`, `limit` defaulting to one match.
///
/// # Errors
/// Returns `ControlError::InvalidInput` for an empty query or a zero limit,
/// and any error raised by the index.
pub async fn lookup(
    index: &dyn DocumentIndex,
    query: &str,
    limit: Option<usize>,
) -> ControlResult<DocumentationResult> {
    let query = query.trim();
    if query.is_empty() {
        return Err(ControlError::InvalidInput("query_text is required".to_string()));
    }
    let limit = limit.unwrap_or(DEFAULT_DOC_LIMIT);
    if limit == 0 {
        return Err(ControlError::InvalidInput("limit must be at least 1".to_string()));
    }
    let documents = index.query(query, limit).await?;
    Ok(DocumentationResult {
        query: query.to_string(),
        documents,
    })
}
