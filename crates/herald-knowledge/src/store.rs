use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use futures::future::BoxFuture;
use rusqlite::{params, Connection};
use tracing::debug;

use herald_core::error::{HeraldError, Result};
use herald_core::traits::Retriever;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS chunks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source TEXT NOT NULL,
        content TEXT NOT NULL,
        added_at TEXT NOT NULL
    );

    CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
        content,
        source UNINDEXED,
        content_rowid=id,
        tokenize='porter unicode61'
    );

    CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
        INSERT INTO chunks_fts(rowid, content, source)
        VALUES (new.id, new.content, new.source);
    END;";

fn db_err(e: impl std::fmt::Display) -> HeraldError {
    HeraldError::Database(e.to_string())
}

/// SQLite-backed chunk store with FTS5 search.
pub struct KnowledgeBase {
    conn: Mutex<Connection>,
}

impl KnowledgeBase {
    /// Open or create a knowledge base at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                HeraldError::Database(format!("Failed to create knowledge directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!(path = %path.display(), "Knowledge base opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory knowledge base (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Store chunks from one source document. Returns how many were added.
    pub fn add_chunks(&self, source: &str, chunks: &[String]) -> Result<usize> {
        let mut conn = self.conn.lock().map_err(db_err)?;
        let tx = conn.transaction().map_err(db_err)?;
        let now = Utc::now().to_rfc3339();
        let mut added = 0;
        {
            let mut stmt = tx
                .prepare("INSERT INTO chunks (source, content, added_at) VALUES (?1, ?2, ?3)")
                .map_err(db_err)?;
            for chunk in chunks.iter().filter(|c| !c.trim().is_empty()) {
                stmt.execute(params![source, chunk, now]).map_err(db_err)?;
                added += 1;
            }
        }
        tx.commit().map_err(db_err)?;
        debug!(source, added, "Chunks stored");
        Ok(added)
    }

    /// Best-matching chunks for `query`, most relevant first.
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<String>> {
        let Some(expr) = match_expression(query) else {
            return Ok(vec![]);
        };
        if top_k == 0 {
            return Ok(vec![]);
        }

        let conn = self.conn.lock().map_err(db_err)?;
        let mut stmt = conn
            .prepare(
                "SELECT content
                 FROM chunks_fts
                 WHERE chunks_fts MATCH ?1
                 ORDER BY rank
                 LIMIT ?2",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![expr, top_k as i64], |row| row.get::<_, String>(0))
            .map_err(db_err)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(db_err)?);
        }
        Ok(results)
    }

    /// Number of stored chunks.
    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().map_err(db_err)?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(n as usize)
    }

    /// Remove every chunk.
    pub fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(db_err)?;
        conn.execute_batch("DELETE FROM chunks; DELETE FROM chunks_fts;")
            .map_err(db_err)?;
        Ok(())
    }
}

/// Build an FTS5 expression that ORs the query's words.
///
/// Each word is quoted so punctuation in user text can never be parsed as
/// FTS5 syntax. Returns `None` when the query has no searchable words.
fn match_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.to_lowercase()))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

impl Retriever for KnowledgeBase {
    fn retrieve(&self, query: String, top_k: usize) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            self.search(&query, top_k)
                .map_err(|e| HeraldError::RetrievalUnavailable(e.to_string()))
        })
    }
}
