mod document_coordinator;
mod enrichers;
mod reconcile_mirror;
mod vector_store;

pub use document_coordinator::*;
pub use enrichers::*;
pub use reconcile_mirror::*;
pub use vector_store::*;
