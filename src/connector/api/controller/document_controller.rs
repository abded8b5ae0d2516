use anyhow::Result;

use crate::cli::{MetadataArgs, OutputFormat};
use crate::{Document, DocumentMetadata, DocumentPatch, ListQuery, NewDocument, SearchQuery};

use super::super::Container;

pub struct DocumentController<'a> {
    container: &'a Container,
}

impl<'a> DocumentController<'a> {
    pub fn new(container: &'a Container) -> Self {
        Self { container }
    }

    pub async fn create(
        &self,
        title: String,
        content: String,
        tags: Vec<String>,
        category: Option<String>,
        metadata: MetadataArgs,
        format: OutputFormat,
    ) -> Result<String> {
        let mut input = NewDocument::new(title, content)
            .with_tags(tags)
            .with_metadata(metadata.apply_to(DocumentMetadata::default())?);
        if let Some(category) = category {
            input = input.with_category(category);
        }

        let document = self.container.coordinator().create_document(input).await?;
        render_document(document, format, "Created")
    }

    pub async fn get(&self, id: String, format: OutputFormat) -> Result<String> {
        let document = self.container.coordinator().get_document(&id).await?;
        render_document(document, format, "Document")
    }

    pub async fn list(
        &self,
        skip: usize,
        limit: usize,
        category: Option<String>,
        format: OutputFormat,
    ) -> Result<String> {
        let mut query = ListQuery::new().with_skip(skip).with_limit(limit);
        if let Some(category) = category {
            query = query.with_category(category);
        }

        let documents = self.container.coordinator().list_documents(&query).await?;
        render_documents(documents, format, "No documents stored.")
    }

    pub async fn search(
        &self,
        query: String,
        num: usize,
        category: Option<String>,
        format: OutputFormat,
    ) -> Result<String> {
        let mut search = SearchQuery::new(query).with_limit(num);
        if let Some(category) = category {
            search = search.with_category(category);
        }

        let documents = self.container.coordinator().search_documents(&search).await?;
        render_documents(documents, format, "No results found.")
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn update(
        &self,
        id: String,
        title: Option<String>,
        content: Option<String>,
        tags: Option<Vec<String>>,
        category: Option<String>,
        metadata: MetadataArgs,
        format: OutputFormat,
    ) -> Result<String> {
        let coordinator = self.container.coordinator();
        let patch = DocumentPatch {
            title,
            content,
            tags,
            category,
            metadata: None,
        };

        // Metadata flags are applied on top of what the mirror already holds.
        let patch = if metadata.is_empty() {
            patch
        } else {
            let current = match coordinator.get_document_node(&id).await {
                Ok(node) => node.metadata,
                Err(e) if e.is_not_found() => DocumentMetadata::default(),
                Err(e) => return Err(e.into()),
            };
            patch.with_metadata(metadata.apply_to(current)?)
        };

        let document = coordinator.update_document(&id, patch).await?;
        render_document(document, format, "Updated")
    }

    pub async fn delete(&self, id: String) -> Result<String> {
        self.container.coordinator().delete_document(&id).await?;
        Ok(format!("Document {} deleted.", id))
    }
}

fn render_document(document: Document, format: OutputFormat, heading: &str) -> Result<String> {
    let document = document.without_embedding();
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(&document)?,
        OutputFormat::Text => format!("{}: {}", heading, describe(&document, true)),
    })
}

fn render_documents(documents: Vec<Document>, format: OutputFormat, empty: &str) -> Result<String> {
    let documents: Vec<Document> = documents.into_iter().map(Document::without_embedding).collect();

    if format == OutputFormat::Json {
        return Ok(serde_json::to_string_pretty(&documents)?);
    }
    if documents.is_empty() {
        return Ok(empty.to_string());
    }

    let mut output = format!("Found {} documents:\n\n", documents.len());
    for (i, document) in documents.iter().enumerate() {
        output.push_str(&format!("{}. {}\n", i + 1, describe(document, false)));
    }
    Ok(output)
}

fn describe(document: &Document, full: bool) -> String {
    let mut out = format!("{} ({})\n", document.title(), document.id());
    out.push_str(&format!("   Category: {}", document.category()));
    if !document.tags().is_empty() {
        out.push_str(&format!("  Tags: {}", document.tags().join(", ")));
    }
    out.push_str(&format!(
        "\n   Updated: {}\n",
        document.updated_at().to_rfc3339()
    ));

    let lines: Box<dyn Iterator<Item = &str>> = if full {
        Box::new(document.content().lines())
    } else {
        Box::new(document.content().lines().take(3))
    };
    for line in lines {
        out.push_str(&format!("   | {}\n", line));
    }
    out
}
