use anyhow::Result;

use super::super::Container;

pub struct StatsController<'a> {
    container: &'a Container,
}

impl<'a> StatsController<'a> {
    pub fn new(container: &'a Container) -> Self {
        Self { container }
    }

    pub async fn stats(&self) -> Result<String> {
        let documents = self.container.vector_store().count().await?;
        let coordinator = self.container.coordinator();
        let nodes = coordinator.graph_node_count().await?;
        let status = coordinator.check_backends().await;

        Ok(format!(
            "Docgraph Statistics\n===================\nDocuments:     {}\nGraph nodes:   {}\nVector store:  {} ({})\nGraph store:   {} ({})\nMirror policy: {}\nData Dir:      {}",
            documents,
            nodes,
            self.container.vector_location(),
            status.vector_store,
            self.container.graph_location(),
            status.graph_store,
            self.container.mirror_policy(),
            self.container.data_dir()
        ))
    }
}
