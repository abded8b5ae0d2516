pub mod document_controller;
pub mod graph_controller;
pub mod reconcile_controller;
pub mod stats_controller;

pub use document_controller::DocumentController;
pub use graph_controller::GraphController;
pub use reconcile_controller::ReconcileController;
pub use stats_controller::StatsController;
