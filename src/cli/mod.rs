use anyhow::{bail, Result};
use clap::{Args, Subcommand, ValueEnum};

use crate::domain::{DocumentMetadata, MetadataFilter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Graph-side metadata shared by `create`, `update` and `graph-search`.
#[derive(Debug, Clone, Default, Args)]
pub struct MetadataArgs {
    #[arg(long)]
    pub region: Option<String>,

    #[arg(long)]
    pub topic: Option<String>,

    #[arg(long)]
    pub document_type: Option<String>,

    /// Custom metadata field as KEY=VALUE (repeatable)
    #[arg(long = "field", value_name = "KEY=VALUE")]
    pub fields: Vec<String>,
}

impl MetadataArgs {
    pub fn is_empty(&self) -> bool {
        self.region.is_none()
            && self.topic.is_none()
            && self.document_type.is_none()
            && self.fields.is_empty()
    }

    /// Overlays the given flags on `base`. Field values that parse as JSON
    /// keep their type, anything else is stored as a string.
    pub fn apply_to(&self, mut base: DocumentMetadata) -> Result<DocumentMetadata> {
        if let Some(region) = &self.region {
            base.region = region.clone();
        }
        if let Some(topic) = &self.topic {
            base.topic = topic.clone();
        }
        if let Some(document_type) = &self.document_type {
            base.document_type = document_type.clone();
        }
        for (key, value) in self.parsed_fields()? {
            let value = serde_json::from_str(value)
                .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
            base.custom_fields.insert(key.to_string(), value);
        }
        Ok(base)
    }

    pub fn to_filter(&self) -> Result<MetadataFilter> {
        let mut filter = MetadataFilter::new();
        if let Some(region) = &self.region {
            filter.insert("region".to_string(), region.clone());
        }
        if let Some(topic) = &self.topic {
            filter.insert("topic".to_string(), topic.clone());
        }
        if let Some(document_type) = &self.document_type {
            filter.insert("document_type".to_string(), document_type.clone());
        }
        for (key, value) in self.parsed_fields()? {
            filter.insert(key.to_string(), value.to_string());
        }
        Ok(filter)
    }

    fn parsed_fields(&self) -> Result<Vec<(&str, &str)>> {
        self.fields
            .iter()
            .map(|field| match field.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value)),
                _ => bail!("Invalid --field '{}', expected KEY=VALUE", field),
            })
            .collect()
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the HTTP API
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(short, long, default_value = "8000")]
        port: u16,
    },

    /// Store a document and mirror it into the graph
    Create {
        title: String,

        content: String,

        #[arg(short, long = "tag")]
        tags: Vec<String>,

        #[arg(short, long)]
        category: Option<String>,

        #[command(flatten)]
        metadata: MetadataArgs,

        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    Get {
        id: String,

        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    List {
        #[arg(long, default_value = "0")]
        skip: usize,

        #[arg(short, long, default_value = "100")]
        limit: usize,

        #[arg(short, long)]
        category: Option<String>,

        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Semantic search over title and content
    Search {
        query: String,

        #[arg(long, default_value = "10")]
        num: usize,

        #[arg(short, long)]
        category: Option<String>,

        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    Update {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        content: Option<String>,

        /// Replaces the whole tag list
        #[arg(short, long = "tag")]
        tags: Option<Vec<String>>,

        #[arg(short, long)]
        category: Option<String>,

        #[command(flatten)]
        metadata: MetadataArgs,

        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Delete a document and detach its graph node
    Delete { id: String },

    /// Create or update a typed relationship between two documents
    Relate {
        source: String,

        target: String,

        /// REFERENCES, AMENDS, IMPLEMENTS, SUPERSEDES or RELATED_TO
        #[arg(short = 't', long, default_value = "RELATED_TO")]
        rel_type: String,

        #[arg(long, default_value = "0.0")]
        confidence: f64,
    },

    /// Documents one outgoing hop away
    Related {
        id: String,

        #[arg(short = 't', long)]
        rel_type: Option<String>,

        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Show the graph mirror of a document
    Node {
        id: String,

        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Exact-match search over graph metadata
    GraphSearch {
        #[command(flatten)]
        metadata: MetadataArgs,

        #[arg(short, long, default_value = "100")]
        limit: usize,

        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Compare the vector store with the graph mirror
    Reconcile {
        /// Recreate missing nodes and remove orphaned ones
        #[arg(long)]
        repair: bool,

        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    Stats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_keep_json_types() {
        let args = MetadataArgs {
            region: Some("EU".to_string()),
            fields: vec!["year=2024".to_string(), "status=draft".to_string()],
            ..Default::default()
        };

        let metadata = args.apply_to(DocumentMetadata::default()).unwrap();
        assert_eq!(metadata.region, "EU");
        assert_eq!(metadata.custom_fields["year"], serde_json::json!(2024));
        assert_eq!(metadata.custom_fields["status"], serde_json::json!("draft"));

        let filter = args.to_filter().unwrap();
        assert_eq!(filter["year"], "2024");
        assert_eq!(filter["region"], "EU");
    }

    #[test]
    fn malformed_field_is_rejected() {
        let args = MetadataArgs {
            fields: vec!["no-equals-sign".to_string()],
            ..Default::default()
        };
        assert!(args.to_filter().is_err());
    }
}
