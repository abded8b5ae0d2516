//! # Connector Layer
//!
//! Implementations of the application ports and the outer surfaces:
//! - DuckDB and in-memory backends for the vector store and the graph mirror
//! - Embedding providers (ONNX Runtime, deterministic mock)
//! - Composition root, CLI controllers and the HTTP API

pub mod adapter;
pub mod api;

pub use adapter::*;
pub use api::*;
