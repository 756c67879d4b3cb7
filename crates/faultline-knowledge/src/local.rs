//! In-process vector store using sqlite-vec.
//!
//! The corpus is small and read-only after startup, so the whole index lives
//! in an in-memory SQLite database: a plain table for the case fields and a
//! `vec0` virtual table for the embeddings (L2 distance).

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::sync::Once;
use tracing::{debug, info};
use zerocopy::IntoBytes;

use crate::error::{KnowledgeError, Result};
use crate::store::{StoredDocument, VectorHit, VectorStore, check_lengths};
use crate::types::IncidentCase;

static VECTOR_EXTENSION: Once = Once::new();

/// Register sqlite-vec for every connection opened by this process.
pub fn init_vector_extension() {
    use rusqlite::ffi::sqlite3_auto_extension;
    use sqlite_vec::sqlite3_vec_init;

    VECTOR_EXTENSION.call_once(|| unsafe {
        #[allow(clippy::missing_transmute_annotations)]
        sqlite3_auto_extension(Some(std::mem::transmute(sqlite3_vec_init as *const ())));
    });
}

/// Embedded-corpus index held in memory.
pub struct LocalVectorStore {
    conn: Mutex<Connection>,
    dims: usize,
}

impl LocalVectorStore {
    /// Open an empty in-memory index for vectors of width `dims`.
    pub fn open_in_memory(dims: usize) -> Result<Self> {
        if dims == 0 {
            return Err(KnowledgeError::InvalidData(
                "embedding dimensions must be positive".to_string(),
            ));
        }

        init_vector_extension();
        let conn = Connection::open_in_memory()?;

        conn.execute_batch(&format!(
            r#"
            CREATE TABLE incident_documents (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                error_type TEXT NOT NULL,
                log_content TEXT NOT NULL,
                root_cause TEXT NOT NULL,
                solution TEXT NOT NULL,
                severity TEXT NOT NULL
            );
            CREATE VIRTUAL TABLE incident_embeddings USING vec0(
                document_id TEXT PRIMARY KEY,
                embedding float[{dims}]
            );
            "#
        ))?;

        info!(dims, "Created local vector index");
        Ok(Self {
            conn: Mutex::new(conn),
            dims,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dims
    }

    /// sqlite-vec version string, for diagnostics.
    pub fn extension_version(&self) -> Result<String> {
        let conn = self.conn.lock();
        let version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
        Ok(version)
    }

    fn load_document(conn: &Connection, id: &str) -> Result<Option<StoredDocument>> {
        let doc = conn
            .query_row(
                r#"
                SELECT content, error_type, log_content, root_cause, solution, severity
                FROM incident_documents WHERE id = ?1
                "#,
                params![id],
                |row| {
                    Ok(StoredDocument {
                        id: id.to_string(),
                        content: row.get(0)?,
                        case: IncidentCase {
                            error_type: row.get(1)?,
                            log_content: row.get(2)?,
                            root_cause: row.get(3)?,
                            solution: row.get(4)?,
                            severity: row.get(5)?,
                        },
                    })
                },
            )
            .optional()?;
        Ok(doc)
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn upsert(&self, documents: &[StoredDocument], embeddings: &[Vec<f32>]) -> Result<()> {
        check_lengths(documents, embeddings)?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for (doc, embedding) in documents.iter().zip(embeddings) {
            if embedding.len() != self.dims {
                return Err(KnowledgeError::InvalidData(format!(
                    "embedding for {} has {} dimensions, expected {}",
                    doc.id,
                    embedding.len(),
                    self.dims
                )));
            }

            tx.execute(
                r#"
                INSERT OR REPLACE INTO incident_documents
                    (id, content, error_type, log_content, root_cause, solution, severity)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    doc.id,
                    doc.content,
                    doc.case.error_type,
                    doc.case.log_content,
                    doc.case.root_cause,
                    doc.case.solution,
                    doc.case.severity,
                ],
            )?;

            // vec0 doesn't support INSERT OR REPLACE
            tx.execute(
                "DELETE FROM incident_embeddings WHERE document_id = ?1",
                params![doc.id],
            )?;
            tx.execute(
                "INSERT INTO incident_embeddings (document_id, embedding) VALUES (?1, ?2)",
                params![doc.id, embedding.as_bytes()],
            )?;
        }
        tx.commit()?;

        debug!(count = documents.len(), "Indexed documents locally");
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dims {
            return Err(KnowledgeError::InvalidData(format!(
                "query has {} dimensions, expected {}",
                query.len(),
                self.dims
            )));
        }

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT document_id, distance
            FROM incident_embeddings
            WHERE embedding MATCH ?1
            ORDER BY distance
            LIMIT ?2
            "#,
        )?;

        let mut rows = stmt.query(params![query.as_bytes(), k as i64])?;
        let mut matches = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let distance: f32 = row.get(1)?;
            matches.push((id, distance));
        }
        drop(rows);
        drop(stmt);

        let mut hits = Vec::with_capacity(matches.len());
        for (id, distance) in matches {
            match Self::load_document(&conn, &id)? {
                Some(document) => hits.push(VectorHit { document, distance }),
                None => {
                    return Err(KnowledgeError::InvalidData(format!(
                        "embedding {id} has no document row"
                    )));
                }
            }
        }

        debug!(hits = hits.len(), limit = k, "Local vector search");
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM incident_embeddings", [], |row| {
                row.get(0)
            })?;
        Ok(count as usize)
    }
}
