use std::sync::Arc;

use async_trait::async_trait;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use tm1_core::control::ControlResult;
use tm1_core::docs::{self, DocumentIndex, Embedder, SurrealDocIndex};
use tm1_core::store::SurrealDocStore;
use uuid::Uuid;

const KEYWORDS: [&str; 4] = ["cell", "dimension", "process", "subset"];

/// Counts keyword hits so related texts point the same way.
struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> ControlResult<Vec<f32>> {
        let lowered = text.to_lowercase();
        Ok(KEYWORDS
            .iter()
            .map(|keyword| {
                let hits = lowered.matches(keyword).count();
                u16::try_from(hits).map_or(f32::MAX, f32::from) + 0.01
            })
            .collect())
    }
}

async fn build_index(db_name: &str) -> SurrealDocIndex<Db> {
    let db = Surreal::new::<Mem>(())
        .await
        .expect("failed to create in-memory surrealdb instance");
    db.use_ns("tm1")
        .use_db(db_name)
        .await
        .expect("failed to select surrealdb namespace/db");
    SurrealDocIndex::new(SurrealDocStore::new(db), Arc::new(KeywordEmbedder))
}

#[tokio::test]
async fn ranks_documents_by_similarity() {
    let index = build_index("ranking").await;
    index
        .add_document(
            "CellPutN writes a number into a cell. Cell addresses list one element per dimension.",
            Some("CellPutN.md".to_string()),
        )
        .await
        .expect("document should be stored");
    index
        .add_document(
            "ExecuteProcess runs another process and returns its status.",
            Some("ExecuteProcess.md".to_string()),
        )
        .await
        .expect("document should be stored");
    index
        .add_document(
            "SubsetCreate adds a named subset to a dimension.",
            Some("SubsetCreate.md".to_string()),
        )
        .await
        .expect("document should be stored");

    assert_eq!(index.store().count().await.expect("count should run"), 3);

    let matches = index
        .query("how do I write a cell value", 2)
        .await
        .expect("query should run");
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].source.as_deref(), Some("CellPutN.md"));
    assert!(matches[0].score >= matches[1].score);
}

#[tokio::test]
async fn lookup_returns_single_best_match_by_default() {
    let index = build_index("lookup").await;
    index
        .add_document("ExecuteProcess runs a process.", Some("ExecuteProcess.md".to_string()))
        .await
        .expect("document should be stored");
    index
        .add_document("CellGetS reads a string cell.", Some("CellGetS.md".to_string()))
        .await
        .expect("document should be stored");

    let result = docs::lookup(&index, "process", None)
        .await
        .expect("lookup should run");

    assert_eq!(result.query, "process");
    assert_eq!(result.documents.len(), 1);
    assert_eq!(result.documents[0].source.as_deref(), Some("ExecuteProcess.md"));
}

#[tokio::test]
async fn seeds_markdown_and_text_files() {
    let dir = std::env::temp_dir().join(format!("tm1-docs-{}", Uuid::new_v4().simple()));
    tokio::fs::create_dir_all(&dir)
        .await
        .expect("seed directory should be created");
    tokio::fs::write(dir.join("CellPutS.md"), "CellPutS writes a string cell.")
        .await
        .expect("seed file should be written");
    tokio::fs::write(dir.join("SubsetGetSize.txt"), "SubsetGetSize counts subset elements.")
        .await
        .expect("seed file should be written");
    tokio::fs::write(dir.join("ignored.json"), "{}")
        .await
        .expect("seed file should be written");

    let index = build_index("seed").await;
    let added = index.seed_directory(&dir).await;
    tokio::fs::remove_dir_all(&dir)
        .await
        .expect("seed directory should be removed");

    assert_eq!(added.expect("seeding should succeed"), 2);
    assert_eq!(index.store().count().await.expect("count should run"), 2);
}

#[tokio::test]
async fn empty_seed_file_fails_seeding() {
    let dir = std::env::temp_dir().join(format!("tm1-docs-{}", Uuid::new_v4().simple()));
    tokio::fs::create_dir_all(&dir)
        .await
        .expect("seed directory should be created");
    tokio::fs::write(dir.join("Blank.md"), "  \n")
        .await
        .expect("seed file should be written");

    let index = build_index("seed_empty").await;
    let result = index.seed_directory(&dir).await;
    tokio::fs::remove_dir_all(&dir)
        .await
        .expect("seed directory should be removed");

    let err = result.expect_err("an empty document should fail seeding");
    assert!(err.to_string().contains("Blank.md"));
}
