mod document_repository;
mod embedding_service;
mod graph_repository;
mod related_enricher;

pub use document_repository::*;
pub use embedding_service::*;
pub use graph_repository::*;
pub use related_enricher::*;
