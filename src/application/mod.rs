//! # Application Layer
//!
//! Ports implemented by the connector layer, and the use cases that
//! coordinate the vector store and the graph mirror.

mod interfaces;
pub mod use_cases;

pub use interfaces::*;
pub use use_cases::*;
