mod duckdb_connection;
mod duckdb_document_repository;
mod duckdb_graph_repository;
mod in_memory_document_repository;
mod in_memory_graph_repository;
mod mock_embedding;
mod ort_embedding;

pub use duckdb_connection::*;
pub use duckdb_document_repository::*;
pub use duckdb_graph_repository::*;
pub use in_memory_document_repository::*;
pub use in_memory_graph_repository::*;
pub use mock_embedding::*;
pub use ort_embedding::*;
