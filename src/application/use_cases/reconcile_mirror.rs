use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use crate::application::GraphRepository;
use crate::domain::{DocumentMetadata, DomainError, DriftReport};

use super::VectorStore;

/// Detects, and optionally repairs, drift between the vector store and the
/// graph mirror.
///
/// Repaired mirrors get the document title and default metadata: the vector
/// store never held the original metadata.
pub struct ReconcileMirrorUseCase {
    vector_store: Arc<VectorStore>,
    graph: Arc<dyn GraphRepository>,
}

impl ReconcileMirrorUseCase {
    pub fn new(vector_store: Arc<VectorStore>, graph: Arc<dyn GraphRepository>) -> Self {
        Self {
            vector_store,
            graph,
        }
    }

    pub async fn execute(&self, repair: bool) -> Result<DriftReport, DomainError> {
        let document_ids: HashSet<String> =
            self.vector_store.list_ids().await?.into_iter().collect();
        let node_ids: HashSet<String> = self.graph.list_node_ids().await?.into_iter().collect();

        let mut missing_in_graph: Vec<String> =
            document_ids.difference(&node_ids).cloned().collect();
        let mut orphaned_in_graph: Vec<String> =
            node_ids.difference(&document_ids).cloned().collect();
        missing_in_graph.sort();
        orphaned_in_graph.sort();

        let mut report = DriftReport {
            documents_checked: document_ids.len(),
            nodes_checked: node_ids.len(),
            missing_in_graph,
            orphaned_in_graph,
            repaired_missing: 0,
            removed_orphans: 0,
        };

        info!(
            "Mirror drift: {} documents without node, {} orphaned nodes",
            report.missing_in_graph.len(),
            report.orphaned_in_graph.len()
        );

        if !repair || report.is_consistent() {
            return Ok(report);
        }

        for id in &report.missing_in_graph {
            let Some(document) = self.vector_store.get(id).await? else {
                // Deleted since the id sweep.
                continue;
            };
            match self
                .graph
                .upsert_document_node(id, document.title(), &DocumentMetadata::default())
                .await
            {
                Ok(true) => report.repaired_missing += 1,
                Ok(false) => warn!("Graph store did not accept mirror for {}", id),
                Err(e) => warn!("Failed to repair mirror for {}: {}", id, e),
            }
        }

        for id in &report.orphaned_in_graph {
            if self.vector_store.get(id).await?.is_some() {
                // Created between the two id sweeps.
                continue;
            }
            match self.graph.delete_document_node(id).await {
                Ok(true) => report.removed_orphans += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to remove orphaned node {}: {}", id, e),
            }
        }

        info!(
            "Mirror repair: {} nodes recreated, {} orphans removed",
            report.repaired_missing, report.removed_orphans
        );

        Ok(report)
    }
}
