use anyhow::Result;

use crate::Commands;

use super::container::Container;
use super::controller::{
    DocumentController, GraphController, ReconcileController, StatsController,
};

pub struct Router<'a> {
    document_controller: DocumentController<'a>,
    graph_controller: GraphController<'a>,
    reconcile_controller: ReconcileController<'a>,
    stats_controller: StatsController<'a>,
}

impl<'a> Router<'a> {
    pub fn new(container: &'a Container) -> Self {
        Self {
            document_controller: DocumentController::new(container),
            graph_controller: GraphController::new(container),
            reconcile_controller: ReconcileController::new(container),
            stats_controller: StatsController::new(container),
        }
    }

    pub async fn route(&self, command: Commands) -> Result<String> {
        match command {
            Commands::Create {
                title,
                content,
                tags,
                category,
                metadata,
                format,
            } => {
                self.document_controller
                    .create(title, content, tags, category, metadata, format)
                    .await
            }
            Commands::Get { id, format } => self.document_controller.get(id, format).await,
            Commands::List {
                skip,
                limit,
                category,
                format,
            } => {
                self.document_controller
                    .list(skip, limit, category, format)
                    .await
            }
            Commands::Search {
                query,
                num,
                category,
                format,
            } => {
                self.document_controller
                    .search(query, num, category, format)
                    .await
            }
            Commands::Update {
                id,
                title,
                content,
                tags,
                category,
                metadata,
                format,
            } => {
                self.document_controller
                    .update(id, title, content, tags, category, metadata, format)
                    .await
            }
            Commands::Delete { id } => self.document_controller.delete(id).await,
            Commands::Relate {
                source,
                target,
                rel_type,
                confidence,
            } => {
                self.graph_controller
                    .relate(source, target, rel_type, confidence)
                    .await
            }
            Commands::Related {
                id,
                rel_type,
                format,
            } => self.graph_controller.related(id, rel_type, format).await,
            Commands::Node { id, format } => self.graph_controller.node(id, format).await,
            Commands::GraphSearch {
                metadata,
                limit,
                format,
            } => self.graph_controller.search(metadata, limit, format).await,
            Commands::Reconcile { repair, format } => {
                self.reconcile_controller.reconcile(repair, format).await
            }
            Commands::Stats => self.stats_controller.stats().await,
            Commands::Serve { .. } => {
                anyhow::bail!("serve is handled by the HTTP server, not the command router")
            }
        }
    }
}
