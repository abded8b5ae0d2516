use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::DomainError;

pub const DEFAULT_CATEGORY: &str = "general";
pub const DEFAULT_REGION: &str = "unknown";
pub const DEFAULT_TOPIC: &str = "general";
pub const DEFAULT_DOCUMENT_TYPE: &str = "article";

/// A stored legislative document as held by the vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    id: String,
    title: String,
    content: String,
    tags: Vec<String>,
    category: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    embedding: Vec<f32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Document {
    /// Builds a fresh document with a generated id and both timestamps set to `now`.
    pub fn new(
        title: String,
        content: String,
        tags: Vec<String>,
        category: String,
        embedding: Vec<f32>,
    ) -> Self {
        let now = current_timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            content,
            tags,
            category,
            embedding,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reconstitutes from persisted data (used by adapters).
    #[allow(clippy::too_many_arguments)]
    pub fn reconstitute(
        id: String,
        title: String,
        content: String,
        tags: Vec<String>,
        category: String,
        embedding: Vec<f32>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title,
            content,
            tags,
            category,
            embedding,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Drops the embedding, e.g. before returning search hits to callers.
    pub fn without_embedding(mut self) -> Self {
        self.embedding = Vec::new();
        self
    }

    pub fn embedding_text(&self) -> String {
        embedding_text(&self.title, &self.content)
    }
}

/// Text fed to the embedding provider for a title/content pair.
pub fn embedding_text(title: &str, content: &str) -> String {
    format!("{} {}", title, content)
}

/// Graph-side metadata, mirrored onto the document node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentMetadata {
    pub region: String,
    pub topic: String,
    pub document_type: String,
    pub custom_fields: BTreeMap<String, serde_json::Value>,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            document_type: DEFAULT_DOCUMENT_TYPE.to_string(),
            custom_fields: BTreeMap::new(),
        }
    }
}

impl DocumentMetadata {
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn with_document_type(mut self, document_type: impl Into<String>) -> Self {
        self.document_type = document_type.into();
        self
    }

    pub fn with_custom_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.custom_fields.insert(key.into(), value);
        self
    }
}

/// Input for creating a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl NewDocument {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            tags: Vec::new(),
            category: default_category(),
            metadata: DocumentMetadata::default(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        require_text("title", &self.title)?;
        require_text("content", &self.content)?;
        Ok(())
    }
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

/// Partial update. Only fields that are `Some` are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub category: Option<String>,
    pub metadata: Option<DocumentMetadata>,
}

impl DocumentPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn is_empty(&self) -> bool {
        !self.touches_content_fields() && self.metadata.is_none()
    }

    /// True when any field owned by the vector store is present.
    pub fn touches_content_fields(&self) -> bool {
        self.title.is_some()
            || self.content.is_some()
            || self.tags.is_some()
            || self.category.is_some()
    }

    /// True when the graph mirror (title or metadata) must be refreshed.
    pub fn touches_mirror(&self) -> bool {
        self.title.is_some() || self.metadata.is_some()
    }

    pub fn requires_reembedding(&self) -> bool {
        self.title.is_some() || self.content.is_some()
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if let Some(title) = &self.title {
            require_text("title", title)?;
        }
        if let Some(content) = &self.content {
            require_text("content", content)?;
        }
        Ok(())
    }
}

/// Result of a vector-store update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    Unchanged,
    NotFound,
}

impl UpdateOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, UpdateOutcome::Updated)
    }
}

fn require_text(field: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!(
            "Missing required field: {}",
            field
        )));
    }
    Ok(())
}

/// Current time truncated to microseconds, the precision both stores persist.
pub fn current_timestamp() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}
