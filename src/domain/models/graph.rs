use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Document, DocumentMetadata};
use crate::domain::DomainError;

/// Relationship vocabulary accepted by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    References,
    Amends,
    Implements,
    Supersedes,
    RelatedTo,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 5] = [
        RelationshipType::References,
        RelationshipType::Amends,
        RelationshipType::Implements,
        RelationshipType::Supersedes,
        RelationshipType::RelatedTo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::References => "REFERENCES",
            RelationshipType::Amends => "AMENDS",
            RelationshipType::Implements => "IMPLEMENTS",
            RelationshipType::Supersedes => "SUPERSEDES",
            RelationshipType::RelatedTo => "RELATED_TO",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DomainError> {
        let normalized = s.trim().to_uppercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "Unknown relationship type '{}', expected one of {}",
                    s,
                    Self::ALL
                        .iter()
                        .map(|t| t.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Denormalized mirror of a document held by the graph store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentNode {
    pub id: String,
    pub title: String,
    pub metadata: DocumentMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentNode {
    pub fn region(&self) -> &str {
        &self.metadata.region
    }

    pub fn topic(&self) -> &str {
        &self.metadata.topic
    }

    pub fn document_type(&self) -> &str {
        &self.metadata.document_type
    }

    /// Value of a filterable field, stringified the way metadata filters compare it.
    pub fn field_value(&self, field: &str) -> Option<String> {
        match field {
            "id" => Some(self.id.clone()),
            "title" => Some(self.title.clone()),
            "region" => Some(self.metadata.region.clone()),
            "topic" => Some(self.metadata.topic.clone()),
            "document_type" => Some(self.metadata.document_type.clone()),
            other => self.metadata.custom_fields.get(other).map(filter_string),
        }
    }

    pub fn matches(&self, filter: &MetadataFilter) -> bool {
        filter
            .iter()
            .all(|(field, expected)| self.field_value(field).as_deref() == Some(expected.as_str()))
    }
}

/// Directed, typed edge between two document ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source_id: String,
    pub target_id: String,
    pub rel_type: String,
    pub confidence: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// One hop of a traversal: the related node and the edge leading to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedDocument {
    pub node: DocumentNode,
    pub relationship: Relationship,
}

/// Traversal result returned by the coordinator, optionally carrying content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedSummary {
    pub document_id: String,
    pub title: String,
    pub metadata: DocumentMetadata,
    pub relationship: Relationship,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<Document>,
}

impl RelatedSummary {
    pub fn from_mirror(related: RelatedDocument) -> Self {
        Self {
            document_id: related.node.id,
            title: related.node.title,
            metadata: related.node.metadata,
            relationship: related.relationship,
            document: None,
        }
    }

    pub fn with_document(mut self, document: Document) -> Self {
        self.document = Some(document);
        self
    }
}

/// Exact-match field filters, combined with AND.
pub type MetadataFilter = BTreeMap<String, String>;

/// Strings compare by their raw text, everything else by its JSON rendering.
pub fn filter_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::current_timestamp;

    fn node() -> DocumentNode {
        let now = current_timestamp();
        DocumentNode {
            id: "doc-1".to_string(),
            title: "AI Act".to_string(),
            metadata: DocumentMetadata::default()
                .with_region("EU")
                .with_topic("ai")
                .with_custom_field("year", serde_json::json!(2024))
                .with_custom_field("status", serde_json::json!("adopted")),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn relationship_type_parse_is_case_insensitive() {
        assert_eq!(
            RelationshipType::parse("amends").unwrap(),
            RelationshipType::Amends
        );
        assert_eq!(
            RelationshipType::parse(" RELATED_TO ").unwrap(),
            RelationshipType::RelatedTo
        );
        let err = RelationshipType::parse("CITES").unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn node_matches_builtin_and_custom_fields() {
        let node = node();

        let mut filter = MetadataFilter::new();
        assert!(node.matches(&filter), "empty filter matches everything");

        filter.insert("region".into(), "EU".into());
        filter.insert("year".into(), "2024".into());
        filter.insert("status".into(), "adopted".into());
        assert!(node.matches(&filter));

        filter.insert("topic".into(), "privacy".into());
        assert!(!node.matches(&filter));
    }

    #[test]
    fn unknown_field_never_matches() {
        let mut filter = MetadataFilter::new();
        filter.insert("missing".into(), "x".into());
        assert!(!node().matches(&filter));
    }
}
