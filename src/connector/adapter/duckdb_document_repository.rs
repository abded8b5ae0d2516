use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::{params, Connection};
use tracing::{debug, warn};

use super::duckdb_connection::{DuckdbTarget, LazyConnection};
use crate::application::{DocumentChanges, DocumentRepository};
use crate::domain::{Document, DomainError, ListQuery, EMBEDDING_DIMENSIONS};

const SELECT_COLUMNS: &str = "id, title, content, tags, category, CAST(embedding AS VARCHAR), \
                              created_at, updated_at";

/// Vector store backed by a DuckDB table with a `FLOAT[384]` embedding column.
pub struct DuckdbDocumentRepository {
    conn: LazyConnection,
}

struct DocumentRow {
    id: String,
    title: String,
    content: String,
    tags: String,
    category: String,
    embedding: String,
    created_at: i64,
    updated_at: i64,
}

impl DuckdbDocumentRepository {
    /// Nothing is opened until the first call.
    pub fn new(target: DuckdbTarget) -> Self {
        Self {
            conn: LazyConnection::new(target, Self::initialize),
        }
    }

    /// Like [`new`](Self::new), also building an HNSW cosine index through the
    /// `vss` extension when it can be loaded.
    pub fn with_hnsw_index(target: DuckdbTarget) -> Self {
        Self {
            conn: LazyConnection::new(target, Self::initialize_with_hnsw),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(DuckdbTarget::InMemory)
    }

    pub fn target(&self) -> &DuckdbTarget {
        self.conn.target()
    }

    fn initialize(conn: &Connection) -> Result<(), DomainError> {
        let create_tables = format!(
            "\
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                tags TEXT NOT NULL,
                category TEXT NOT NULL,
                embedding FLOAT[{dims}] NOT NULL,
                created_at BIGINT NOT NULL,
                updated_at BIGINT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_category ON documents(category);
            ",
            dims = EMBEDDING_DIMENSIONS
        );

        conn.execute_batch(&create_tables).map_err(|e| {
            DomainError::storage(format!("Failed to initialize documents table: {}", e))
        })?;
        debug!("DuckDB documents table initialized");
        Ok(())
    }

    fn initialize_with_hnsw(conn: &Connection) -> Result<(), DomainError> {
        Self::initialize(conn)?;

        let hnsw = conn
            .execute_batch("INSTALL vss; LOAD vss; SET hnsw_enable_experimental_persistence = true;")
            .and_then(|_| {
                conn.execute_batch(
                    "CREATE INDEX IF NOT EXISTS documents_embedding_hnsw_idx \
                     ON documents USING HNSW (embedding) WITH (metric = 'cosine');",
                )
            });
        if let Err(e) = hnsw {
            warn!(
                "HNSW index unavailable ({}), similarity search will scan the table",
                e
            );
        }
        Ok(())
    }

    fn vector_to_array_literal(vector: &[f32]) -> Result<String, DomainError> {
        if vector.len() != EMBEDDING_DIMENSIONS {
            return Err(DomainError::validation(format!(
                "Expected embedding dimension {}, got {}",
                EMBEDDING_DIMENSIONS,
                vector.len()
            )));
        }
        let mut s = String::with_capacity(vector.len() * 8);
        s.push('[');
        for (i, v) in vector.iter().enumerate() {
            if i > 0 {
                s.push_str(", ");
            }
            s.push_str(&format!("{}", v));
        }
        s.push(']');
        s.push_str(&format!("::FLOAT[{}]", EMBEDDING_DIMENSIONS));
        Ok(s)
    }

    fn read_row(row: &duckdb::Row<'_>) -> duckdb::Result<DocumentRow> {
        Ok(DocumentRow {
            id: row.get(0)?,
            title: row.get(1)?,
            content: row.get(2)?,
            tags: row.get(3)?,
            category: row.get(4)?,
            embedding: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_document(row: DocumentRow) -> Result<Document, DomainError> {
        let tags: Vec<String> = serde_json::from_str(&row.tags).map_err(|e| {
            DomainError::storage(format!("Corrupt tags for document {}: {}", row.id, e))
        })?;
        let embedding: Vec<f32> = serde_json::from_str(&row.embedding).map_err(|e| {
            DomainError::storage(format!("Corrupt embedding for document {}: {}", row.id, e))
        })?;

        Ok(Document::reconstitute(
            row.id,
            row.title,
            row.content,
            tags,
            row.category,
            embedding,
            from_micros(row.created_at)?,
            from_micros(row.updated_at)?,
        ))
    }

    fn collect_documents(
        stmt: &mut duckdb::Statement<'_>,
        params: &[&dyn duckdb::ToSql],
    ) -> Result<Vec<Document>, DomainError> {
        let rows = stmt
            .query_map(params, Self::read_row)
            .map_err(|e| DomainError::storage(format!("Failed to query documents: {}", e)))?;

        let mut documents = Vec::new();
        for row in rows {
            let row = row.map_err(|e| DomainError::storage(format!("Failed to read row: {}", e)))?;
            documents.push(Self::into_document(row)?);
        }
        Ok(documents)
    }
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>, DomainError> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| DomainError::storage(format!("Invalid timestamp: {}", micros)))
}

fn encode_tags(tags: &[String]) -> Result<String, DomainError> {
    serde_json::to_string(tags)
        .map_err(|e| DomainError::internal(format!("Failed to encode tags: {}", e)))
}

#[async_trait]
impl DocumentRepository for DuckdbDocumentRepository {
    async fn insert(&self, document: &Document) -> Result<(), DomainError> {
        let array_lit = Self::vector_to_array_literal(document.embedding())?;
        let tags = encode_tags(document.tags())?;

        let conn = self.conn.get().await?;
        let conn = conn.lock().await;

        // FLOAT[384] cannot be bound as a parameter; the literal is built from our own floats.
        let sql = format!(
            "INSERT INTO documents (id, title, content, tags, category, embedding, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, {}, ?, ?)",
            array_lit
        );
        conn.execute(
            &sql,
            params![
                document.id(),
                document.title(),
                document.content(),
                tags,
                document.category(),
                document.created_at().timestamp_micros(),
                document.updated_at().timestamp_micros(),
            ],
        )
        .map_err(|e| {
            DomainError::storage(format!("Failed to insert document {}: {}", document.id(), e))
        })?;

        debug!("Inserted document {} into DuckDB", document.id());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Document>, DomainError> {
        let conn = self.conn.get().await?;
        let conn = conn.lock().await;

        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM documents WHERE id = ?", SELECT_COLUMNS))
            .map_err(|e| DomainError::storage(format!("Failed to prepare statement: {}", e)))?;

        match stmt.query_row(params![id], Self::read_row) {
            Ok(row) => Ok(Some(Self::into_document(row)?)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DomainError::storage(format!(
                "Failed to query document {}: {}",
                id, e
            ))),
        }
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<Document>, DomainError> {
        let conn = self.conn.get().await?;
        let conn = conn.lock().await;

        let mut sql = format!("SELECT {} FROM documents", SELECT_COLUMNS);
        let category = query.category();
        let limit = query.limit() as i64;
        let skip = query.skip() as i64;
        let mut params_vec: Vec<&dyn duckdb::ToSql> = Vec::new();

        if let Some(category) = category.as_ref() {
            sql.push_str(" WHERE category = ?");
            params_vec.push(category);
        }
        sql.push_str(" ORDER BY created_at DESC, id LIMIT ? OFFSET ?");
        params_vec.push(&limit);
        params_vec.push(&skip);

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| DomainError::storage(format!("Failed to prepare list: {}", e)))?;
        Self::collect_documents(&mut stmt, &params_vec)
    }

    async fn update(&self, id: &str, changes: &DocumentChanges) -> Result<bool, DomainError> {
        let conn = self.conn.get().await?;
        let conn = conn.lock().await;

        let mut set_clauses = vec!["updated_at = ?".to_string()];
        let mut params_vec: Vec<Box<dyn duckdb::ToSql>> =
            vec![Box::new(changes.updated_at.timestamp_micros())];

        if let Some(ref title) = changes.title {
            set_clauses.push("title = ?".to_string());
            params_vec.push(Box::new(title.clone()));
        }
        if let Some(ref content) = changes.content {
            set_clauses.push("content = ?".to_string());
            params_vec.push(Box::new(content.clone()));
        }
        if let Some(ref tags) = changes.tags {
            set_clauses.push("tags = ?".to_string());
            params_vec.push(Box::new(encode_tags(tags)?));
        }
        if let Some(ref category) = changes.category {
            set_clauses.push("category = ?".to_string());
            params_vec.push(Box::new(category.clone()));
        }
        if let Some(ref embedding) = changes.embedding {
            set_clauses.push(format!(
                "embedding = {}",
                Self::vector_to_array_literal(embedding)?
            ));
        }
        params_vec.push(Box::new(id.to_string()));

        let sql = format!(
            "UPDATE documents SET {} WHERE id = ?",
            set_clauses.join(", ")
        );
        let params_refs: Vec<&dyn duckdb::ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();

        let changed = conn
            .execute(&sql, params_refs.as_slice())
            .map_err(|e| DomainError::storage(format!("Failed to update document {}: {}", id, e)))?;

        Ok(changed > 0)
    }

    async fn delete(&self, id: &str) -> Result<bool, DomainError> {
        let conn = self.conn.get().await?;
        let conn = conn.lock().await;
        let removed = conn
            .execute("DELETE FROM documents WHERE id = ?", params![id])
            .map_err(|e| DomainError::storage(format!("Failed to delete document {}: {}", id, e)))?;
        Ok(removed > 0)
    }

    async fn nearest(
        &self,
        embedding: &[f32],
        limit: usize,
        category: Option<&str>,
    ) -> Result<Vec<Document>, DomainError> {
        let array_lit = Self::vector_to_array_literal(embedding)?;
        let limit = limit as i64;

        let conn = self.conn.get().await?;
        let conn = conn.lock().await;

        let mut sql = format!("SELECT {} FROM documents", SELECT_COLUMNS);
        let mut params_vec: Vec<&dyn duckdb::ToSql> = Vec::new();
        if let Some(category) = category.as_ref() {
            sql.push_str(" WHERE category = ?");
            params_vec.push(category);
        }
        sql.push_str(&format!(
            " ORDER BY array_cosine_distance(embedding, {}) ASC, id LIMIT ?",
            array_lit
        ));
        params_vec.push(&limit);

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| DomainError::storage(format!("Failed to prepare search: {}", e)))?;
        Self::collect_documents(&mut stmt, &params_vec)
    }

    async fn count(&self) -> Result<u64, DomainError> {
        let conn = self.conn.get().await?;
        let conn = conn.lock().await;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .map_err(|e| DomainError::storage(format!("Failed to count documents: {}", e)))?;
        Ok(count as u64)
    }

    async fn list_ids(&self) -> Result<Vec<String>, DomainError> {
        let conn = self.conn.get().await?;
        let conn = conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT id FROM documents ORDER BY id")
            .map_err(|e| DomainError::storage(format!("Failed to prepare statement: {}", e)))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| DomainError::storage(format!("Failed to query ids: {}", e)))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.map_err(|e| DomainError::storage(format!("Failed to read row: {}", e)))?);
        }
        Ok(ids)
    }

    async fn ping(&self) -> Result<(), DomainError> {
        let conn = self.conn.get().await?;
        let conn = conn.lock().await;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i32>(0))
            .map_err(|e| DomainError::unavailable(format!("DuckDB ping failed: {}", e)))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), DomainError> {
        self.conn.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_literal_rejects_wrong_dimension() {
        assert!(DuckdbDocumentRepository::vector_to_array_literal(&[0.5; 3]).is_err());

        let literal = DuckdbDocumentRepository::vector_to_array_literal(&[0.0; 384]).unwrap();
        assert!(literal.starts_with("[0, 0"));
        assert!(literal.ends_with("]::FLOAT[384]"));
    }

    #[test]
    fn timestamps_convert_from_micros() {
        let ts = from_micros(1_700_000_000_123_456).unwrap();
        assert_eq!(ts.timestamp_micros(), 1_700_000_000_123_456);
    }
}
