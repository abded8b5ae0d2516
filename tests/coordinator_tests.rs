use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use docgraph::{
    ContentEnricher, DocumentCoordinator, DocumentMetadata, DocumentNode, DocumentPatch,
    DocumentRepository, DomainError, DuckdbDocumentRepository, DuckdbGraphRepository,
    GraphRepository, InMemoryDocumentRepository, InMemoryGraphRepository, MetadataFilter,
    MirrorPolicy, MockEmbedding, NewDocument, ReconcileMirrorUseCase, RelatedDocument,
    SearchQuery, VectorStore,
};

fn vector_store() -> Arc<VectorStore> {
    Arc::new(
        VectorStore::new(
            Arc::new(InMemoryDocumentRepository::new()),
            Arc::new(MockEmbedding::new()),
        )
        .expect("vector store"),
    )
}

fn coordinator() -> (DocumentCoordinator, Arc<VectorStore>, Arc<InMemoryGraphRepository>) {
    let store = vector_store();
    let graph = Arc::new(InMemoryGraphRepository::new());
    let coordinator = DocumentCoordinator::new(store.clone(), graph.clone());
    (coordinator, store, graph)
}

/// Graph double whose writes always fail and which records relationship calls.
#[derive(Default)]
struct BrokenGraph {
    relationship_calls: AtomicUsize,
}

#[async_trait]
impl GraphRepository for BrokenGraph {
    async fn upsert_document_node(
        &self,
        _id: &str,
        _title: &str,
        _metadata: &DocumentMetadata,
    ) -> Result<bool, DomainError> {
        Err(DomainError::unavailable("graph store offline"))
    }

    async fn upsert_relationship(
        &self,
        _source_id: &str,
        _target_id: &str,
        _rel_type: &str,
        _confidence: f64,
        _metadata: Option<&BTreeMap<String, serde_json::Value>>,
    ) -> Result<bool, DomainError> {
        self.relationship_calls.fetch_add(1, Ordering::SeqCst);
        Err(DomainError::unavailable("graph store offline"))
    }

    async fn get_document_node(&self, _id: &str) -> Result<Option<DocumentNode>, DomainError> {
        Err(DomainError::unavailable("graph store offline"))
    }

    async fn get_related_documents(
        &self,
        _id: &str,
        _rel_type: Option<&str>,
    ) -> Result<Vec<RelatedDocument>, DomainError> {
        Err(DomainError::unavailable("graph store offline"))
    }

    async fn search_by_metadata(
        &self,
        _filters: &MetadataFilter,
        _limit: usize,
    ) -> Result<Vec<DocumentNode>, DomainError> {
        Err(DomainError::unavailable("graph store offline"))
    }

    async fn delete_document_node(&self, _id: &str) -> Result<bool, DomainError> {
        Err(DomainError::unavailable("graph store offline"))
    }

    async fn list_node_ids(&self) -> Result<Vec<String>, DomainError> {
        Err(DomainError::unavailable("graph store offline"))
    }
}

fn ai_act() -> NewDocument {
    NewDocument::new(
        "AI Act",
        "Regulation laying down harmonised rules on artificial intelligence",
    )
    .with_tags(vec!["ai".into(), "eu".into()])
    .with_category("regulation")
    .with_metadata(
        DocumentMetadata::default()
            .with_region("EU")
            .with_topic("ai")
            .with_document_type("regulation")
            .with_custom_field("year", json!(2024)),
    )
}

#[tokio::test]
async fn create_writes_document_and_mirror() {
    let (coordinator, _, graph) = coordinator();

    let doc = coordinator.create_document(ai_act()).await.expect("create");
    assert_eq!(doc.title(), "AI Act");
    assert_eq!(doc.category(), "regulation");
    assert_eq!(doc.embedding().len(), 384);

    let node = graph
        .get_document_node(doc.id())
        .await
        .expect("node read")
        .expect("node exists");
    assert_eq!(node.title, "AI Act");
    assert_eq!(node.region(), "EU");
    assert_eq!(node.metadata.custom_fields.get("year"), Some(&json!(2024)));
    assert_eq!(coordinator.mirror_stats().mirror_writes, 1);
}

#[tokio::test]
async fn create_rejects_blank_title() {
    let (coordinator, store, _) = coordinator();

    let err = coordinator
        .create_document(NewDocument::new("  ", "body"))
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn amendment_relationship_is_visible_from_source() {
    let (coordinator, _, _) = coordinator();

    let act = coordinator.create_document(ai_act()).await.unwrap();
    let amendment = coordinator
        .create_document(NewDocument::new(
            "AI Act Amendment",
            "Amendment to the artificial intelligence regulation",
        ))
        .await
        .unwrap();

    let created = coordinator
        .create_relationship(amendment.id(), act.id(), "AMENDS", 0.95, None)
        .await
        .expect("relate");
    assert!(created);

    let related = coordinator
        .get_related_documents(amendment.id(), None)
        .await
        .unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].document_id, act.id());
    assert_eq!(related[0].relationship.rel_type, "AMENDS");
    assert!((related[0].relationship.confidence - 0.95).abs() < 1e-9);
    assert!(related[0].document.is_none());

    // Outgoing only.
    let reverse = coordinator
        .get_related_documents(act.id(), None)
        .await
        .unwrap();
    assert!(reverse.is_empty());

    let filtered = coordinator
        .get_related_documents(amendment.id(), Some("references"))
        .await
        .unwrap();
    assert!(filtered.is_empty());
}

#[tokio::test]
async fn relationship_requires_both_documents() {
    let store = vector_store();
    let graph = Arc::new(BrokenGraph::default());
    let coordinator = DocumentCoordinator::new(store.clone(), graph.clone());

    let existing = store.create(&NewDocument::new("Only", "one doc")).await.unwrap();

    let err = coordinator
        .create_relationship(&existing, "missing-id", "REFERENCES", 0.5, None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = coordinator
        .create_relationship("missing-id", &existing, "REFERENCES", 0.5, None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    assert_eq!(graph.relationship_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn relationship_validates_type_and_confidence() {
    let (coordinator, _, _) = coordinator();
    let a = coordinator.create_document(ai_act()).await.unwrap();
    let b = coordinator
        .create_document(NewDocument::new("B", "other"))
        .await
        .unwrap();

    let err = coordinator
        .create_relationship(a.id(), b.id(), "CITES", 0.5, None)
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let err = coordinator
        .create_relationship(a.id(), b.id(), "REFERENCES", 1.5, None)
        .await
        .unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn relationship_with_missing_mirror_node_returns_false() {
    let (coordinator, store, _) = coordinator();

    // Written straight to the vector store, so no graph nodes exist.
    let a = store.create(&NewDocument::new("A", "first")).await.unwrap();
    let b = store.create(&NewDocument::new("B", "second")).await.unwrap();

    let created = coordinator
        .create_relationship(&a, &b, "RELATED_TO", 0.0, None)
        .await
        .unwrap();
    assert!(!created);
}

#[tokio::test]
async fn search_ranks_closest_documents_first() {
    let (coordinator, _, _) = coordinator();

    coordinator.create_document(ai_act()).await.unwrap();
    coordinator
        .create_document(NewDocument::new(
            "Data protection",
            "General data protection regulation for personal data",
        ))
        .await
        .unwrap();
    coordinator
        .create_document(NewDocument::new("Fisheries", "Quotas for the north sea fleet"))
        .await
        .unwrap();

    let results = coordinator
        .search_documents(&SearchQuery::new("artificial intelligence").with_limit(5))
        .await
        .unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].title(), "AI Act");

    let in_category = coordinator
        .search_documents(&SearchQuery::new("regulation").with_category("regulation"))
        .await
        .unwrap();
    assert_eq!(in_category.len(), 1);
}

#[tokio::test]
async fn delete_cascades_to_mirror_edges() {
    let (coordinator, store, graph) = coordinator();

    let a = coordinator.create_document(ai_act()).await.unwrap();
    let b = coordinator
        .create_document(NewDocument::new("B", "other"))
        .await
        .unwrap();
    coordinator
        .create_relationship(b.id(), a.id(), "AMENDS", 0.9, None)
        .await
        .unwrap();

    assert!(coordinator.delete_document(a.id()).await.unwrap());
    assert!(store.get(a.id()).await.unwrap().is_none());
    assert!(graph.get_document_node(a.id()).await.unwrap().is_none());
    assert!(coordinator
        .get_related_documents(b.id(), None)
        .await
        .unwrap()
        .is_empty());

    let err = coordinator.delete_document(a.id()).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn fail_open_keeps_vector_write_and_counts_failure() {
    let store = vector_store();
    let coordinator = DocumentCoordinator::new(store.clone(), Arc::new(BrokenGraph::default()))
        .with_policy(MirrorPolicy::FailOpen);

    let doc = coordinator.create_document(ai_act()).await.expect("create");
    assert!(store.get(doc.id()).await.unwrap().is_some());

    let stats = coordinator.mirror_stats();
    assert_eq!(stats.mirror_writes, 0);
    assert_eq!(stats.mirror_failures, 1);
}

#[tokio::test]
async fn fail_closed_reports_mirror_failure_without_rollback() {
    let store = vector_store();
    let coordinator = DocumentCoordinator::new(store.clone(), Arc::new(BrokenGraph::default()))
        .with_policy(MirrorPolicy::FailClosed);

    let err = coordinator.create_document(ai_act()).await.unwrap_err();
    assert!(err.is_mirror_failure());
    assert_eq!(store.count().await.unwrap(), 1);
    assert_eq!(coordinator.mirror_stats().mirror_failures, 1);
}

#[tokio::test]
async fn update_routes_fields_to_their_store() {
    let (coordinator, store, graph) = coordinator();
    let doc = coordinator.create_document(ai_act()).await.unwrap();
    let original_embedding = doc.embedding().to_vec();

    // Metadata only: vector row untouched, node rewritten.
    let updated = coordinator
        .update_document(
            doc.id(),
            DocumentPatch::new()
                .with_metadata(DocumentMetadata::default().with_region("Global")),
        )
        .await
        .unwrap();
    assert_eq!(updated.updated_at(), doc.updated_at());
    let node = graph.get_document_node(doc.id()).await.unwrap().unwrap();
    assert_eq!(node.region(), "Global");

    // Tags only: no re-embedding.
    coordinator
        .update_document(doc.id(), DocumentPatch::new().with_tags(vec!["law".into()]))
        .await
        .unwrap();
    let stored = store.get(doc.id()).await.unwrap().unwrap();
    assert_eq!(stored.tags(), ["law".to_string()]);
    assert_eq!(stored.embedding(), original_embedding.as_slice());

    // Title: re-embedded and mirrored, node metadata preserved.
    let renamed = coordinator
        .update_document(doc.id(), DocumentPatch::new().with_title("Artificial Intelligence Act"))
        .await
        .unwrap();
    assert_eq!(renamed.title(), "Artificial Intelligence Act");
    assert_ne!(renamed.embedding(), original_embedding.as_slice());
    let node = graph.get_document_node(doc.id()).await.unwrap().unwrap();
    assert_eq!(node.title, "Artificial Intelligence Act");
    assert_eq!(node.region(), "Global");
}

#[tokio::test]
async fn update_errors() {
    let (coordinator, _, _) = coordinator();
    let doc = coordinator.create_document(ai_act()).await.unwrap();

    let err = coordinator
        .update_document(doc.id(), DocumentPatch::new())
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let err = coordinator
        .update_document("nope", DocumentPatch::new().with_title("x"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = coordinator
        .update_document(doc.id(), DocumentPatch::new().with_content(" "))
        .await
        .unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn content_enricher_attaches_documents() {
    let store = vector_store();
    let graph = Arc::new(InMemoryGraphRepository::new());
    let coordinator = DocumentCoordinator::new(store.clone(), graph)
        .with_enricher(Arc::new(ContentEnricher::new(store.clone())));

    let a = coordinator.create_document(ai_act()).await.unwrap();
    let b = coordinator
        .create_document(NewDocument::new("Guidance", "Implementing guidance"))
        .await
        .unwrap();
    coordinator
        .create_relationship(b.id(), a.id(), "IMPLEMENTS", 0.7, None)
        .await
        .unwrap();

    let related = coordinator
        .get_related_documents(b.id(), Some("IMPLEMENTS"))
        .await
        .unwrap();
    assert_eq!(related.len(), 1);
    let document = related[0].document.as_ref().expect("enriched");
    assert_eq!(document.content(), a.content());
    assert!(document.embedding().is_empty());
}

#[tokio::test]
async fn metadata_search_over_mirror() {
    let (coordinator, _, _) = coordinator();
    coordinator.create_document(ai_act()).await.unwrap();
    coordinator
        .create_document(
            NewDocument::new("US AI order", "Executive order")
                .with_metadata(DocumentMetadata::default().with_region("US").with_topic("ai")),
        )
        .await
        .unwrap();

    let mut filters = MetadataFilter::new();
    filters.insert("topic".into(), "ai".into());
    assert_eq!(coordinator.search_by_metadata(&filters, 100).await.unwrap().len(), 2);

    filters.insert("year".into(), "2024".into());
    let nodes = coordinator.search_by_metadata(&filters, 100).await.unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].title, "AI Act");
}

#[tokio::test]
async fn reconcile_detects_and_repairs_drift() {
    let (coordinator, store, graph) = coordinator();

    let mirrored = coordinator.create_document(ai_act()).await.unwrap();
    let unmirrored = store.create(&NewDocument::new("Lost", "never mirrored")).await.unwrap();
    graph
        .upsert_document_node("ghost", "Ghost", &DocumentMetadata::default())
        .await
        .unwrap();

    let reconcile = ReconcileMirrorUseCase::new(store.clone(), graph.clone());

    let report = reconcile.execute(false).await.unwrap();
    assert_eq!(report.documents_checked, 2);
    assert_eq!(report.nodes_checked, 2);
    assert_eq!(report.missing_in_graph, vec![unmirrored.clone()]);
    assert_eq!(report.orphaned_in_graph, vec!["ghost".to_string()]);
    assert_eq!(report.repaired_missing, 0);

    let report = reconcile.execute(true).await.unwrap();
    assert_eq!(report.repaired_missing, 1);
    assert_eq!(report.removed_orphans, 1);

    let node = graph.get_document_node(&unmirrored).await.unwrap().unwrap();
    assert_eq!(node.title, "Lost");
    assert!(graph.get_document_node(mirrored.id()).await.unwrap().is_some());

    assert!(reconcile.execute(false).await.unwrap().is_consistent());
}

/// Graph wrapper that creates, mirrors and links a new document the first time
/// node ids are listed, landing it between the two reconciliation sweeps.
struct CreatesDuringSweep {
    inner: Arc<InMemoryGraphRepository>,
    store: Arc<VectorStore>,
    link_to: String,
    fired: AtomicBool,
    created: Mutex<Option<String>>,
}

#[async_trait]
impl GraphRepository for CreatesDuringSweep {
    async fn upsert_document_node(
        &self,
        id: &str,
        title: &str,
        metadata: &DocumentMetadata,
    ) -> Result<bool, DomainError> {
        self.inner.upsert_document_node(id, title, metadata).await
    }

    async fn upsert_relationship(
        &self,
        source_id: &str,
        target_id: &str,
        rel_type: &str,
        confidence: f64,
        metadata: Option<&BTreeMap<String, serde_json::Value>>,
    ) -> Result<bool, DomainError> {
        self.inner
            .upsert_relationship(source_id, target_id, rel_type, confidence, metadata)
            .await
    }

    async fn get_document_node(&self, id: &str) -> Result<Option<DocumentNode>, DomainError> {
        self.inner.get_document_node(id).await
    }

    async fn get_related_documents(
        &self,
        id: &str,
        rel_type: Option<&str>,
    ) -> Result<Vec<RelatedDocument>, DomainError> {
        self.inner.get_related_documents(id, rel_type).await
    }

    async fn search_by_metadata(
        &self,
        filters: &MetadataFilter,
        limit: usize,
    ) -> Result<Vec<DocumentNode>, DomainError> {
        self.inner.search_by_metadata(filters, limit).await
    }

    async fn delete_document_node(&self, id: &str) -> Result<bool, DomainError> {
        self.inner.delete_document_node(id).await
    }

    async fn list_node_ids(&self) -> Result<Vec<String>, DomainError> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            let id = self
                .store
                .create(&NewDocument::new("Late", "created mid-sweep"))
                .await?;
            self.inner
                .upsert_document_node(&id, "Late", &DocumentMetadata::default())
                .await?;
            self.inner
                .upsert_relationship(&id, &self.link_to, "REFERENCES", 0.4, None)
                .await?;
            *self.created.lock().unwrap() = Some(id);
        }
        self.inner.list_node_ids().await
    }
}

#[tokio::test]
async fn reconcile_repair_keeps_node_of_document_created_mid_sweep() {
    let store = vector_store();
    let inner = Arc::new(InMemoryGraphRepository::new());
    let existing = DocumentCoordinator::new(store.clone(), inner.clone())
        .create_document(ai_act())
        .await
        .unwrap();
    let graph = Arc::new(CreatesDuringSweep {
        inner: inner.clone(),
        store: store.clone(),
        link_to: existing.id().to_string(),
        fired: AtomicBool::new(false),
        created: Mutex::new(None),
    });

    let report = ReconcileMirrorUseCase::new(store.clone(), graph.clone())
        .execute(true)
        .await
        .unwrap();

    let created = graph.created.lock().unwrap().clone().expect("document created");
    assert_eq!(report.orphaned_in_graph, vec![created.clone()]);
    assert_eq!(report.removed_orphans, 0);
    assert!(store.get(&created).await.unwrap().is_some());
    assert!(inner.get_document_node(&created).await.unwrap().is_some());
    let related = inner.get_related_documents(&created, None).await.unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].node.id, existing.id());
}

async fn assert_fail_open_delete(repository: Arc<dyn DocumentRepository>) {
    let store = Arc::new(
        VectorStore::new(repository, Arc::new(MockEmbedding::new())).expect("vector store"),
    );
    let coordinator = DocumentCoordinator::new(store.clone(), Arc::new(BrokenGraph::default()))
        .with_policy(MirrorPolicy::FailOpen);
    let id = store.create(&NewDocument::new("Doomed", "to be deleted")).await.unwrap();

    assert!(coordinator.delete_document(&id).await.expect("delete"));
    assert!(store.get(&id).await.unwrap().is_none());
    let stats = coordinator.mirror_stats();
    assert_eq!(stats.mirror_writes, 0);
    assert_eq!(stats.mirror_failures, 1);
}

#[tokio::test]
async fn fail_open_delete_succeeds_when_graph_is_down() {
    assert_fail_open_delete(Arc::new(InMemoryDocumentRepository::new())).await;
    assert_fail_open_delete(Arc::new(DuckdbDocumentRepository::in_memory())).await;
}

#[tokio::test]
async fn fail_closed_delete_reports_mirror_failure_after_vector_delete() {
    let store = vector_store();
    let coordinator = DocumentCoordinator::new(store.clone(), Arc::new(BrokenGraph::default()))
        .with_policy(MirrorPolicy::FailClosed);
    let id = store.create(&NewDocument::new("Doomed", "to be deleted")).await.unwrap();

    let err = coordinator.delete_document(&id).await.unwrap_err();
    assert!(err.is_mirror_failure());
    assert!(store.get(&id).await.unwrap().is_none());
}

async fn assert_identical_remerge_is_stable(graph: Arc<dyn GraphRepository>) {
    let store = vector_store();
    let coordinator = DocumentCoordinator::new(store, graph.clone());
    let doc = coordinator.create_document(ai_act()).await.unwrap();
    let metadata = ai_act().metadata;

    let first = coordinator.get_document_node(doc.id()).await.unwrap();
    assert!(coordinator
        .upsert_document_node(doc.id(), "AI Act", &metadata)
        .await
        .unwrap());
    assert!(coordinator
        .upsert_document_node(doc.id(), "AI Act", &metadata)
        .await
        .unwrap());
    let second = coordinator.get_document_node(doc.id()).await.unwrap();

    assert_eq!(second.title, first.title);
    assert_eq!(second.metadata, first.metadata);
    assert_eq!(second.created_at, first.created_at);
    assert_eq!(coordinator.graph_node_count().await.unwrap(), 1);
}

#[tokio::test]
async fn identical_node_upserts_are_idempotent_on_both_backends() {
    assert_identical_remerge_is_stable(Arc::new(InMemoryGraphRepository::new())).await;
    assert_identical_remerge_is_stable(Arc::new(DuckdbGraphRepository::in_memory())).await;
}

#[tokio::test]
async fn metadata_search_rejects_zero_limit() {
    let (coordinator, _, _) = coordinator();
    let err = coordinator
        .search_by_metadata(&MetadataFilter::new(), 0)
        .await
        .unwrap_err();
    assert!(err.is_validation());
}
