mod document;
mod embedding;
mod graph;
mod mirror;
mod query;

pub use document::*;
pub use embedding::*;
pub use graph::*;
pub use mirror::*;
pub use query::*;
