use std::path::Path;
use std::sync::Arc;

use surrealdb::Surreal;
use surrealdb::engine::any::{self, Any};
use surrealdb::opt::auth::Root;
use tm1_core::OllamaEmbedder;
use tm1_core::docs::{Embedder, SurrealDocIndex};
use tm1_core::store::SurrealDocStore;
use tracing::info;

use crate::config::DocsConfig;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Connects the documentation store and seeds it when a seed directory is
/// configured. A failed seed aborts start-up.
pub async fn build_doc_index(config: &DocsConfig) -> Result<SurrealDocIndex<Any>, BoxError> {
    let db: Surreal<Any> = any::connect(config.db_uri.as_str()).await?;

    if let (Some(username), Some(password)) =
        (config.db_username.as_ref(), config.db_password.as_ref())
    {
        db.signin(Root {
            username: username.clone(),
            password: password.clone(),
        })
        .await?;
    }

    db.use_ns(config.namespace.as_str())
        .use_db(config.database.as_str())
        .await?;

    let embedder: Arc<dyn Embedder> = Arc::new(OllamaEmbedder::new(
        &config.embed_url,
        config.embed_model.as_str(),
        config.embed_timeout,
    )?);
    let index = SurrealDocIndex::new(SurrealDocStore::new(db), embedder);

    if let Some(dir) = &config.seed_dir {
        seed_if_empty(&index, dir).await?;
    }

    info!(
        uri = %config.db_uri,
        namespace = %config.namespace,
        database = %config.database,
        model = %config.embed_model,
        "documentation index ready"
    );
    Ok(index)
}

async fn seed_if_empty(
    index: &SurrealDocIndex<Any>,
    dir: &Path,
) -> Result<(), BoxError> {
    let metadata = tokio::fs::metadata(dir).await.map_err(|err| {
        format!("documentation seed directory {}: {err}", dir.display())
    })?;
    if !metadata.is_dir() {
        return Err(format!("documentation seed path {} is not a directory", dir.display()).into());
    }

    let stored = index.store().count().await?;
    if stored > 0 {
        info!(stored, "documentation index already populated; skipping seed");
        return Ok(());
    }
    index.seed_directory(dir).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn docs_config(seed_dir: PathBuf) -> DocsConfig {
        DocsConfig {
            db_uri: "mem://".to_string(),
            db_username: None,
            db_password: None,
            namespace: "tm1".to_string(),
            database: "ti_documentation".to_string(),
            seed_dir: Some(seed_dir),
            embed_url: "http://127.0.0.1:9".to_string(),
            embed_model: "nomic-embed-text".to_string(),
            embed_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn missing_seed_directory_fails_startup() {
        let dir = std::env::temp_dir().join("tm1-mcpd-no-such-seed-dir");
        let Err(err) = build_doc_index(&docs_config(dir)).await else {
            panic!("missing seed directory should fail");
        };
        assert!(err.to_string().contains("tm1-mcpd-no-such-seed-dir"));
    }

    #[tokio::test]
    async fn seed_path_must_be_a_directory() {
        let file = std::env::temp_dir().join(format!("tm1-mcpd-seed-{}.md", std::process::id()));
        tokio::fs::write(&file, "CellPutN writes a number.")
            .await
            .expect("seed file should be written");

        let result = build_doc_index(&docs_config(file.clone())).await;
        tokio::fs::remove_file(&file)
            .await
            .expect("seed file should be removed");

        let Err(err) = result else {
            panic!("file seed path should fail");
        };
        assert!(err.to_string().contains("is not a directory"));
    }
}
