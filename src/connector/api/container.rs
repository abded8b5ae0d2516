use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::application::{
    ContentEnricher, DocumentCoordinator, DocumentRepository, EmbeddingService, GraphRepository,
    ReconcileMirrorUseCase, VectorStore,
};
use crate::connector::adapter::{
    DuckdbDocumentRepository, DuckdbGraphRepository, DuckdbTarget, InMemoryDocumentRepository,
    InMemoryGraphRepository, MockEmbedding, OrtEmbedding,
};
use crate::domain::MirrorPolicy;

const VECTOR_DB_FILE: &str = "documents.duckdb";
const GRAPH_DB_FILE: &str = "graph.duckdb";

#[derive(Debug, Clone, Default)]
pub struct ContainerConfig {
    pub data_dir: String,
    /// DuckDB location of the vector store; defaults to a file under `data_dir`.
    pub vector_uri: Option<String>,
    /// DuckDB location of the graph mirror; defaults to a file under `data_dir`.
    pub graph_uri: Option<String>,
    /// Accepted for parity with networked graph stores. The embedded backend
    /// has no authentication.
    pub graph_user: Option<String>,
    pub graph_password: Option<String>,
    pub memory_storage: bool,
    pub mock_embeddings: bool,
    pub mirror_policy: MirrorPolicy,
    pub enrich_related: bool,
    pub hnsw_index: bool,
}

impl ContainerConfig {
    /// In-memory backends and mock embeddings; nothing touches disk or network.
    pub fn ephemeral() -> Self {
        Self {
            data_dir: std::env::temp_dir().to_string_lossy().to_string(),
            memory_storage: true,
            mock_embeddings: true,
            ..Default::default()
        }
    }

    fn vector_target(&self) -> DuckdbTarget {
        match self.vector_uri.as_deref() {
            Some(uri) => DuckdbTarget::from_uri(uri),
            None => DuckdbTarget::File(PathBuf::from(&self.data_dir).join(VECTOR_DB_FILE)),
        }
    }

    fn graph_target(&self) -> DuckdbTarget {
        match self.graph_uri.as_deref() {
            Some(uri) => DuckdbTarget::from_uri(uri),
            None => DuckdbTarget::File(PathBuf::from(&self.data_dir).join(GRAPH_DB_FILE)),
        }
    }
}

/// Composition root: builds the backends once and hands out use cases.
pub struct Container {
    vector_store: Arc<VectorStore>,
    graph: Arc<dyn GraphRepository>,
    coordinator: Arc<DocumentCoordinator>,
    vector_location: String,
    graph_location: String,
    config: ContainerConfig,
}

impl Container {
    pub async fn new(config: ContainerConfig) -> Result<Self> {
        let embedding_service: Arc<dyn EmbeddingService> = if config.mock_embeddings {
            debug!("Using mock embedding service");
            Arc::new(MockEmbedding::new())
        } else {
            debug!("Initializing ONNX embedding service...");
            let cache_dir = PathBuf::from(&config.data_dir).join("models");
            Arc::new(OrtEmbedding::new(None, Some(&cache_dir))?)
        };

        if config.graph_user.is_some() || config.graph_password.is_some() {
            debug!("Graph credentials supplied; the embedded graph store does not use them");
        }

        let (repository, graph, vector_location, graph_location): (
            Arc<dyn DocumentRepository>,
            Arc<dyn GraphRepository>,
            String,
            String,
        ) = if config.memory_storage {
            debug!("Using in-memory document and graph storage");
            (
                Arc::new(InMemoryDocumentRepository::new()),
                Arc::new(InMemoryGraphRepository::new()),
                "memory".to_string(),
                "memory".to_string(),
            )
        } else {
            let vector_target = config.vector_target();
            let graph_target = config.graph_target();
            debug!(
                "Using DuckDB storage: vectors at {}, graph at {}",
                vector_target, graph_target
            );

            let vector_location = vector_target.to_string();
            let graph_location = graph_target.to_string();
            let repository = if config.hnsw_index {
                DuckdbDocumentRepository::with_hnsw_index(vector_target)
            } else {
                DuckdbDocumentRepository::new(vector_target)
            };
            (
                Arc::new(repository),
                Arc::new(DuckdbGraphRepository::new(graph_target)),
                vector_location,
                graph_location,
            )
        };

        let vector_store = Arc::new(VectorStore::new(repository, embedding_service)?);
        let mut coordinator = DocumentCoordinator::new(Arc::clone(&vector_store), Arc::clone(&graph))
            .with_policy(config.mirror_policy);
        if config.enrich_related {
            coordinator =
                coordinator.with_enricher(Arc::new(ContentEnricher::new(Arc::clone(&vector_store))));
        }

        info!(
            "Coordinator ready (mirror policy {}, related enrichment {})",
            config.mirror_policy,
            if config.enrich_related { "content" } else { "mirror-only" }
        );

        Ok(Self {
            vector_store,
            graph,
            coordinator: Arc::new(coordinator),
            vector_location,
            graph_location,
            config,
        })
    }

    pub fn coordinator(&self) -> Arc<DocumentCoordinator> {
        Arc::clone(&self.coordinator)
    }

    pub fn reconcile_use_case(&self) -> ReconcileMirrorUseCase {
        ReconcileMirrorUseCase::new(Arc::clone(&self.vector_store), Arc::clone(&self.graph))
    }

    pub fn vector_store(&self) -> Arc<VectorStore> {
        Arc::clone(&self.vector_store)
    }

    pub fn data_dir(&self) -> &str {
        &self.config.data_dir
    }

    pub fn vector_location(&self) -> &str {
        &self.vector_location
    }

    pub fn graph_location(&self) -> &str {
        &self.graph_location
    }

    pub fn mirror_policy(&self) -> MirrorPolicy {
        self.config.mirror_policy
    }

    /// Closes both backend connections. Later calls reconnect on demand.
    pub async fn shutdown(&self) -> Result<()> {
        self.coordinator.shutdown().await?;
        Ok(())
    }
}
