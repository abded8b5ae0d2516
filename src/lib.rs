pub mod application;
pub mod cli;
pub mod connector;
pub mod domain;

pub use cli::{Commands, MetadataArgs, OutputFormat};

pub use application::{
    ContentEnricher, DocumentChanges, DocumentCoordinator, DocumentRepository, EmbeddingService,
    GraphRepository, MirrorOnlyEnricher, ReconcileMirrorUseCase, RelatedEnricher, VectorStore,
};

pub use connector::{
    Container, ContainerConfig, DuckdbDocumentRepository, DuckdbGraphRepository, DuckdbTarget,
    InMemoryDocumentRepository, InMemoryGraphRepository, MockEmbedding, OrtEmbedding, Router,
};

pub use domain::{
    Document, DocumentMetadata, DocumentNode, DocumentPatch, DomainError, DriftReport,
    EmbeddingConfig, ListQuery, MetadataFilter, MirrorPolicy, MirrorStats, NewDocument,
    RelatedDocument, RelatedSummary, Relationship, RelationshipType, SearchQuery, UpdateOutcome,
    EMBEDDING_DIMENSIONS,
};
