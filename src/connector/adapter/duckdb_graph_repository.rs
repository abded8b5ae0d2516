use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::{params, Connection};
use tracing::debug;

use super::duckdb_connection::{DuckdbTarget, LazyConnection};
use crate::application::GraphRepository;
use crate::domain::{
    current_timestamp, DocumentMetadata, DocumentNode, DomainError, MetadataFilter,
    RelatedDocument, Relationship,
};

/// Node fields stored in their own columns and filtered in SQL.
const NODE_COLUMNS: [&str; 5] = ["id", "title", "region", "topic", "document_type"];

const NODE_SELECT: &str =
    "n.id, n.title, n.region, n.topic, n.document_type, n.custom_fields, n.created_at, n.updated_at";

/// Graph mirror kept in two DuckDB tables: `nodes` and `edges`.
pub struct DuckdbGraphRepository {
    conn: LazyConnection,
}

struct NodeRow {
    id: String,
    title: String,
    region: String,
    topic: String,
    document_type: String,
    custom_fields: String,
    created_at: i64,
    updated_at: i64,
}

struct EdgeRow {
    source_id: String,
    target_id: String,
    rel_type: String,
    confidence: f64,
    metadata: String,
    created_at: i64,
}

impl DuckdbGraphRepository {
    pub fn new(target: DuckdbTarget) -> Self {
        Self {
            conn: LazyConnection::new(target, Self::initialize),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(DuckdbTarget::InMemory)
    }

    pub fn target(&self) -> &DuckdbTarget {
        self.conn.target()
    }

    fn initialize(conn: &Connection) -> Result<(), DomainError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                region TEXT NOT NULL,
                topic TEXT NOT NULL,
                document_type TEXT NOT NULL,
                custom_fields TEXT NOT NULL,
                created_at BIGINT NOT NULL,
                updated_at BIGINT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_nodes_region ON nodes(region);
            CREATE INDEX IF NOT EXISTS idx_nodes_topic ON nodes(topic);

            CREATE TABLE IF NOT EXISTS edges (
                source_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                rel_type TEXT NOT NULL,
                confidence DOUBLE NOT NULL,
                metadata TEXT NOT NULL,
                created_at BIGINT NOT NULL,
                PRIMARY KEY (source_id, target_id, rel_type)
            );

            -- Incoming-edge lookups during detach delete
            CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);
            "#,
        )
        .map_err(|e| DomainError::storage(format!("Failed to initialize graph schema: {}", e)))?;

        debug!("DuckDB graph tables initialized");
        Ok(())
    }

    fn read_node(row: &duckdb::Row<'_>) -> duckdb::Result<NodeRow> {
        Ok(NodeRow {
            id: row.get(0)?,
            title: row.get(1)?,
            region: row.get(2)?,
            topic: row.get(3)?,
            document_type: row.get(4)?,
            custom_fields: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_node(row: NodeRow) -> Result<DocumentNode, DomainError> {
        let custom_fields = serde_json::from_str(&row.custom_fields).map_err(|e| {
            DomainError::storage(format!("Corrupt custom fields for node {}: {}", row.id, e))
        })?;

        Ok(DocumentNode {
            metadata: DocumentMetadata {
                region: row.region,
                topic: row.topic,
                document_type: row.document_type,
                custom_fields,
            },
            created_at: from_micros(row.created_at)?,
            updated_at: from_micros(row.updated_at)?,
            id: row.id,
            title: row.title,
        })
    }

    fn into_relationship(row: EdgeRow) -> Result<Relationship, DomainError> {
        let metadata = serde_json::from_str(&row.metadata).map_err(|e| {
            DomainError::storage(format!(
                "Corrupt metadata for edge {}-[{}]->{}: {}",
                row.source_id, row.rel_type, row.target_id, e
            ))
        })?;

        Ok(Relationship {
            created_at: from_micros(row.created_at)?,
            source_id: row.source_id,
            target_id: row.target_id,
            rel_type: row.rel_type,
            confidence: row.confidence,
            metadata,
        })
    }

    fn node_exists(conn: &Connection, id: &str) -> Result<bool, DomainError> {
        match conn.query_row("SELECT 1 FROM nodes WHERE id = ?", params![id], |row| {
            row.get::<_, i32>(0)
        }) {
            Ok(_) => Ok(true),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(false),
            Err(e) => Err(DomainError::storage(format!(
                "Failed to look up node {}: {}",
                id, e
            ))),
        }
    }
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>, DomainError> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| DomainError::storage(format!("Invalid timestamp: {}", micros)))
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, DomainError> {
    serde_json::to_string(value)
        .map_err(|e| DomainError::internal(format!("Failed to encode JSON column: {}", e)))
}

#[async_trait]
impl GraphRepository for DuckdbGraphRepository {
    async fn upsert_document_node(
        &self,
        id: &str,
        title: &str,
        metadata: &DocumentMetadata,
    ) -> Result<bool, DomainError> {
        let custom_fields = encode_json(&metadata.custom_fields)?;
        let now = current_timestamp().timestamp_micros();

        let conn = self.conn.get().await?;
        let conn = conn.lock().await;
        conn.execute(
            r#"INSERT INTO nodes (
                    id, title, region, topic, document_type, custom_fields, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (id) DO UPDATE SET
                    title = excluded.title,
                    region = excluded.region,
                    topic = excluded.topic,
                    document_type = excluded.document_type,
                    custom_fields = excluded.custom_fields,
                    updated_at = excluded.updated_at
                "#,
            params![
                id,
                title,
                metadata.region,
                metadata.topic,
                metadata.document_type,
                custom_fields,
                now,
                now,
            ],
        )
        .map_err(|e| DomainError::storage(format!("Failed to upsert node {}: {}", id, e)))?;

        debug!("Upserted document node {}", id);
        Ok(true)
    }

    async fn upsert_relationship(
        &self,
        source_id: &str,
        target_id: &str,
        rel_type: &str,
        confidence: f64,
        metadata: Option<&BTreeMap<String, serde_json::Value>>,
    ) -> Result<bool, DomainError> {
        let metadata = match metadata {
            Some(metadata) => encode_json(metadata)?,
            None => "{}".to_string(),
        };
        let now = current_timestamp().timestamp_micros();

        let conn = self.conn.get().await?;
        let mut conn = conn.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))?;

        if !Self::node_exists(&tx, source_id)? || !Self::node_exists(&tx, target_id)? {
            debug!(
                "Skipping edge {} -[{}]-> {}: endpoint node missing",
                source_id, rel_type, target_id
            );
            return Ok(false);
        }

        tx.execute(
            r#"INSERT INTO edges (source_id, target_id, rel_type, confidence, metadata, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT (source_id, target_id, rel_type) DO UPDATE SET
                    confidence = excluded.confidence,
                    metadata = excluded.metadata
                "#,
            params![source_id, target_id, rel_type, confidence, metadata, now],
        )
        .map_err(|e| DomainError::storage(format!("Failed to upsert relationship: {}", e)))?;

        tx.commit()
            .map_err(|e| DomainError::storage(format!("Failed to commit: {}", e)))?;

        debug!("Upserted edge {} -[{}]-> {}", source_id, rel_type, target_id);
        Ok(true)
    }

    async fn get_document_node(&self, id: &str) -> Result<Option<DocumentNode>, DomainError> {
        let conn = self.conn.get().await?;
        let conn = conn.lock().await;

        match conn.query_row(
            &format!("SELECT {} FROM nodes n WHERE n.id = ?", NODE_SELECT),
            params![id],
            Self::read_node,
        ) {
            Ok(row) => Ok(Some(Self::into_node(row)?)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DomainError::storage(format!(
                "Failed to query node {}: {}",
                id, e
            ))),
        }
    }

    async fn get_related_documents(
        &self,
        id: &str,
        rel_type: Option<&str>,
    ) -> Result<Vec<RelatedDocument>, DomainError> {
        let conn = self.conn.get().await?;
        let conn = conn.lock().await;

        let mut sql = format!(
            r#"SELECT {}, e.source_id, e.target_id, e.rel_type, e.confidence, e.metadata, e.created_at
               FROM edges e
               JOIN nodes n ON n.id = e.target_id
               WHERE e.source_id = ?"#,
            NODE_SELECT
        );
        let mut params_vec: Vec<&dyn duckdb::ToSql> = vec![&id];
        if let Some(rel_type) = rel_type.as_ref() {
            sql.push_str(" AND e.rel_type = ?");
            params_vec.push(rel_type);
        }
        sql.push_str(" ORDER BY e.confidence DESC, n.id, e.rel_type");

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| DomainError::storage(format!("Failed to prepare statement: {}", e)))?;
        let rows = stmt
            .query_map(params_vec.as_slice(), |row| {
                Ok((
                    Self::read_node(row)?,
                    EdgeRow {
                        source_id: row.get(8)?,
                        target_id: row.get(9)?,
                        rel_type: row.get(10)?,
                        confidence: row.get(11)?,
                        metadata: row.get(12)?,
                        created_at: row.get(13)?,
                    },
                ))
            })
            .map_err(|e| DomainError::storage(format!("Failed to query related: {}", e)))?;

        let mut related = Vec::new();
        for row in rows {
            let (node, edge) =
                row.map_err(|e| DomainError::storage(format!("Failed to read row: {}", e)))?;
            related.push(RelatedDocument {
                node: Self::into_node(node)?,
                relationship: Self::into_relationship(edge)?,
            });
        }
        Ok(related)
    }

    async fn search_by_metadata(
        &self,
        filters: &MetadataFilter,
        limit: usize,
    ) -> Result<Vec<DocumentNode>, DomainError> {
        let (column_filters, custom_filters): (Vec<_>, Vec<_>) = filters
            .iter()
            .partition(|(field, _)| NODE_COLUMNS.contains(&field.as_str()));
        let custom_filters: MetadataFilter = custom_filters
            .into_iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let conn = self.conn.get().await?;
        let conn = conn.lock().await;

        let sql_limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut sql = format!("SELECT {} FROM nodes n", NODE_SELECT);
        let mut params_vec: Vec<&dyn duckdb::ToSql> = Vec::new();
        if !column_filters.is_empty() {
            // Column names come from NODE_COLUMNS, never from the request.
            let conditions: Vec<String> = column_filters
                .iter()
                .map(|(field, _)| format!("n.{} = ?", field))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
            for (_, value) in &column_filters {
                params_vec.push(*value);
            }
        }
        sql.push_str(" ORDER BY n.created_at DESC, n.id");

        // Custom fields live in a JSON column and are matched after the scan.
        if custom_filters.is_empty() {
            sql.push_str(" LIMIT ?");
            params_vec.push(&sql_limit);
        }

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| DomainError::storage(format!("Failed to prepare statement: {}", e)))?;
        let rows = stmt
            .query_map(params_vec.as_slice(), Self::read_node)
            .map_err(|e| DomainError::storage(format!("Failed to search nodes: {}", e)))?;

        let mut nodes = Vec::new();
        for row in rows {
            let row = row.map_err(|e| DomainError::storage(format!("Failed to read row: {}", e)))?;
            let node = Self::into_node(row)?;
            if node.matches(&custom_filters) {
                nodes.push(node);
                if nodes.len() >= limit {
                    break;
                }
            }
        }
        Ok(nodes)
    }

    async fn delete_document_node(&self, id: &str) -> Result<bool, DomainError> {
        let conn = self.conn.get().await?;
        let mut conn = conn.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))?;

        let edges = tx
            .execute(
                "DELETE FROM edges WHERE source_id = ? OR target_id = ?",
                params![id, id],
            )
            .map_err(|e| DomainError::storage(format!("Failed to delete edges of {}: {}", id, e)))?;
        let removed = tx
            .execute("DELETE FROM nodes WHERE id = ?", params![id])
            .map_err(|e| DomainError::storage(format!("Failed to delete node {}: {}", id, e)))?;

        tx.commit()
            .map_err(|e| DomainError::storage(format!("Failed to commit: {}", e)))?;

        debug!("Detach-deleted node {} ({} edges)", id, edges);
        Ok(removed > 0)
    }

    async fn list_node_ids(&self) -> Result<Vec<String>, DomainError> {
        let conn = self.conn.get().await?;
        let conn = conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT id FROM nodes ORDER BY id")
            .map_err(|e| DomainError::storage(format!("Failed to prepare statement: {}", e)))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| DomainError::storage(format!("Failed to query node ids: {}", e)))?;

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

    #[tokio::test]
    async fn custom_field_filters_apply_after_column_filters() {
        let repo = DuckdbGraphRepository::in_memory();
        let eu = DocumentMetadata::default()
            .with_region("EU")
            .with_custom_field("year", serde_json::json!(2024));
        let eu_old = DocumentMetadata::default()
            .with_region("EU")
            .with_custom_field("year", serde_json::json!(2019));
        repo.upsert_document_node("a", "A", &eu).await.unwrap();
        repo.upsert_document_node("b", "B", &eu_old).await.unwrap();

        let mut filter = MetadataFilter::new();
        filter.insert("region".to_string(), "EU".to_string());
        filter.insert("year".to_string(), "2024".to_string());

        let nodes = repo.search_by_metadata(&filter, 10).await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, "a");
    }

    #[tokio::test]
    async fn edge_requires_both_nodes() {
        let repo = DuckdbGraphRepository::in_memory();
        repo.upsert_document_node("a", "A", &DocumentMetadata::default())
            .await
            .unwrap();

        let written = repo
            .upsert_relationship("a", "missing", "REFERENCES", 0.5, None)
            .await
            .unwrap();
        assert!(!written);
        assert!(repo.get_related_documents("a", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn identical_remerge_leaves_node_unchanged() {
        let repo = DuckdbGraphRepository::in_memory();
        let meta = DocumentMetadata::default()
            .with_region("EU")
            .with_topic("ai")
            .with_custom_field("year", serde_json::json!(2024));

        assert!(repo.upsert_document_node("a", "AI Act", &meta).await.unwrap());
        let first = repo.get_document_node("a").await.unwrap().unwrap();
        assert!(repo.upsert_document_node("a", "AI Act", &meta).await.unwrap());
        let second = repo.get_document_node("a").await.unwrap().unwrap();

        assert_eq!(second.title, first.title);
        assert_eq!(second.metadata, first.metadata);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(repo.list_node_ids().await.unwrap(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn indexed_metadata_columns_can_be_remerged() {
        let repo = DuckdbGraphRepository::in_memory();
        let eu = DocumentMetadata::default().with_region("EU").with_topic("ai");
        repo.upsert_document_node("a", "A", &eu).await.unwrap();

        let us = DocumentMetadata::default().with_region("US").with_topic("privacy");
        assert!(repo.upsert_document_node("a", "A", &us).await.unwrap());

        let node = repo.get_document_node("a").await.unwrap().unwrap();
        assert_eq!(node.region(), "US");
        assert_eq!(node.topic(), "privacy");

        let mut filter = MetadataFilter::new();
        filter.insert("region".to_string(), "US".to_string());
        assert_eq!(repo.search_by_metadata(&filter, 10).await.unwrap().len(), 1);
        filter.insert("region".to_string(), "EU".to_string());
        assert!(repo.search_by_metadata(&filter, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversized_limit_saturates() {
        let repo = DuckdbGraphRepository::in_memory();
        repo.upsert_document_node("a", "A", &DocumentMetadata::default())
            .await
            .unwrap();

        let nodes = repo
            .search_by_metadata(&MetadataFilter::new(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(nodes.len(), 1);
    }
}
