use std::{error::Error, fmt, sync::Arc};

use serde::Deserialize;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tm1_types::schema::TABLE_TI_DOC;
use tm1_types::{DocMatch, DocRecord};

#[derive(Debug)]
pub enum StoreError {
    Surreal(Box<surrealdb::Error>),
    InvalidInput(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Surreal(err) => write!(f, "SurrealDB error: {err}"),
            Self::InvalidInput(message) => write!(f, "Invalid input: {message}"),
        }
    }
}

impl Error for StoreError {}

impl From<surrealdb::Error> for StoreError {
    fn from(err: surrealdb::Error) -> Self {
        Self::Surreal(Box::new(err))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Deserialize, SurrealValue)]
struct CountRow {
    count: u64,
}

pub struct SurrealDocStore<C: Connection> {
    db: Arc<Surreal<C>>,
}

impl<C: Connection> Clone for SurrealDocStore<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

impl<C: Connection> SurrealDocStore<C> {
    #[must_use]
    pub fn new(db: Surreal<C>) -> Self {
        Self { db: Arc::new(db) }
    }

    /// Stores a documentation record.
    ///
    /// # Errors
    /// Returns `StoreError` if the record has no text or embedding, or the
    /// database write fails.
    pub async fn add_document(&self, record: DocRecord) -> StoreResult<DocRecord> {
        ensure_non_empty(&record.text, "text")?;
        if record.embedding.is_empty() {
            return Err(StoreError::InvalidInput("embedding must not be empty".to_string()));
        }
        let fallback = record.clone();
        let created: Option<DocRecord> = self.db.create(TABLE_TI_DOC).content(record).await?;
        Ok(created.unwrap_or(fallback))
    }

    /// Returns the `limit` records closest to `embedding` by cosine similarity,
    /// best match first.
    ///
    /// # Errors
    /// Returns `StoreError` if the inputs are invalid or the database query fails.
    pub async fn nearest(&self, embedding: Vec<f32>, limit: usize) -> StoreResult<Vec<DocMatch>> {
        if embedding.is_empty() {
            return Err(StoreError::InvalidInput("embedding must not be empty".to_string()));
        }
        let limit = limit_to_i64(limit)?;
        let query = "SELECT text, source, vector::similarity::cosine(embedding, $embedding) AS score FROM ti_doc ORDER BY score DESC LIMIT $limit;";
        let mut response = self
            .db
            .query(query)
            .bind(("embedding", embedding))
            .bind(("limit", limit))
            .await?;
        let records: Vec<DocMatch> = response.take(0)?;
        Ok(records)
    }

    /// Counts stored documentation records.
    ///
    /// # Errors
    /// Returns `StoreError` if the database query fails.
    pub async fn count(&self) -> StoreResult<u64> {
        let query = "SELECT count() AS count FROM ti_doc GROUP ALL;";
        let mut response = self.db.query(query).await?;
        let rows: Vec<CountRow> = response.take(0)?;
        Ok(rows.first().map_or(0, |row| row.count))
    }
}

fn ensure_non_empty(value: &str, field: &str) -> StoreResult<()> {
    if value.trim().is_empty() {
        return Err(StoreError::InvalidInput(format!("{field} is required")));
    }
    Ok(())
}

fn limit_to_i64(limit: usize) -> StoreResult<i64> {
    if limit == 0 {
        return Err(StoreError::InvalidInput("limit must be at least 1".to_string()));
    }
    i64::try_from(limit).map_err(|_| StoreError::InvalidInput("limit is too large".to_string()))
}
