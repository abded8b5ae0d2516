use anyhow::Result;

use crate::cli::{MetadataArgs, OutputFormat};
use crate::{DocumentNode, RelatedSummary};

use super::super::Container;

pub struct GraphController<'a> {
    container: &'a Container,
}

impl<'a> GraphController<'a> {
    pub fn new(container: &'a Container) -> Self {
        Self { container }
    }

    pub async fn relate(
        &self,
        source: String,
        target: String,
        rel_type: String,
        confidence: f64,
    ) -> Result<String> {
        let created = self
            .container
            .coordinator()
            .create_relationship(&source, &target, &rel_type, confidence, None)
            .await?;

        Ok(if created {
            format!(
                "{} -[{}]-> {} (confidence {:.2})",
                source,
                rel_type.to_uppercase(),
                target,
                confidence
            )
        } else {
            format!(
                "Relationship not written: {} or {} has no graph node. Run `reconcile --repair`.",
                source, target
            )
        })
    }

    pub async fn related(
        &self,
        id: String,
        rel_type: Option<String>,
        format: OutputFormat,
    ) -> Result<String> {
        let related = self
            .container
            .coordinator()
            .get_related_documents(&id, rel_type.as_deref())
            .await?;

        Ok(match format {
            OutputFormat::Json => serde_json::to_string_pretty(&related)?,
            OutputFormat::Text => self.format_related(&id, &related),
        })
    }

    pub async fn node(&self, id: String, format: OutputFormat) -> Result<String> {
        let node = self.container.coordinator().get_document_node(&id).await?;

        Ok(match format {
            OutputFormat::Json => serde_json::to_string_pretty(&node)?,
            OutputFormat::Text => format_node(&node),
        })
    }

    pub async fn search(
        &self,
        metadata: MetadataArgs,
        limit: usize,
        format: OutputFormat,
    ) -> Result<String> {
        let filter = metadata.to_filter()?;
        let nodes = self
            .container
            .coordinator()
            .search_by_metadata(&filter, limit)
            .await?;

        if format == OutputFormat::Json {
            return Ok(serde_json::to_string_pretty(&nodes)?);
        }
        if nodes.is_empty() {
            return Ok("No matching nodes.".to_string());
        }
        Ok(nodes.iter().map(format_node).collect::<Vec<_>>().join("\n"))
    }

    fn format_related(&self, id: &str, related: &[RelatedSummary]) -> String {
        if related.is_empty() {
            return format!("No documents related to {}.", id);
        }

        let mut out = format!("{} related document(s) for {}:\n\n", related.len(), id);
        for entry in related {
            out.push_str(&format!(
                "  {} -> {} ({})  confidence {:.2}\n",
                entry.relationship.rel_type, entry.title, entry.document_id, entry.relationship.confidence
            ));
            if let Some(document) = &entry.document {
                if let Some(line) = document.content().lines().next() {
                    out.push_str(&format!("     | {}\n", line));
                }
            }
        }
        out
    }
}

fn format_node(node: &DocumentNode) -> String {
    let mut out = format!(
        "{} ({})\n   Region: {}  Topic: {}  Type: {}\n",
        node.title,
        node.id,
        node.region(),
        node.topic(),
        node.document_type()
    );
    for (key, value) in &node.metadata.custom_fields {
        out.push_str(&format!("   {}: {}\n", key, value));
    }
    out
}
