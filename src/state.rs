//! The knowledge-base state every request works on.
//!
//! [`KbState`] bundles the concept graph, both indices, the reasoner facade,
//! the term allocator and the persistence coordinator. The service keeps it
//! behind a single mutex; everything here assumes exclusive access.

use std::path::Path;
use std::sync::Arc;

use crate::concept::{ConceptId, ModuleId, TermAllocator};
use crate::error::KbResult;
use crate::graph::ConceptGraph;
use crate::persist::{CommitOutcome, PersistenceCoordinator};
use crate::reason::Reasoner;
use crate::store::DurableStore;
use crate::vocab::{LabelIndex, Vocabulary};

pub struct KbState {
    pub graph: ConceptGraph,
    pub vocab: Vocabulary,
    pub labels: LabelIndex,
    pub reasoner: Reasoner,
    pub allocator: TermAllocator,
    pub persistence: PersistenceCoordinator,
}

impl KbState {
    /// Load `path` with its imports and classify it.
    pub fn load(
        store: Arc<dyn DurableStore>,
        path: &Path,
        namespace: &str,
        save: bool,
    ) -> KbResult<Self> {
        let vocab = Vocabulary::new();
        let graph = store.load(path, &vocab)?;
        let persistence = PersistenceCoordinator::new(store, path, save);
        Self::from_parts(graph, vocab, namespace, Reasoner::el(), persistence)
    }

    /// Assemble a state from an already-decoded closure and classify it.
    pub fn from_parts(
        graph: ConceptGraph,
        vocab: Vocabulary,
        namespace: &str,
        mut reasoner: Reasoner,
        persistence: PersistenceCoordinator,
    ) -> KbResult<Self> {
        reasoner.classify(&graph, &vocab)?;
        let labels = LabelIndex::from_graph(&graph);
        let short_ids = vocab.short_ids();
        let allocator = TermAllocator::seeded(namespace, short_ids.iter().map(String::as_str));
        tracing::info!(
            backend = reasoner.backend_name(),
            namespace,
            labels = labels.len(),
            "knowledge base ready"
        );
        Ok(Self {
            graph,
            vocab,
            labels,
            reasoner,
            allocator,
            persistence,
        })
    }

    /// Local-name prefix of terms this knowledge base owns, e.g. `RICORDO_`.
    pub fn local_prefix(&self) -> &str {
        self.allocator.local_prefix()
    }

    /// Record `label` for `concept` in the primary module and commit.
    pub fn add_label(&mut self, concept: ConceptId, label: &str) -> CommitOutcome {
        self.graph.primary_mut().labels.push((concept, label.to_string()));
        self.labels.add(concept, ModuleId::PRIMARY, label);
        tracing::info!(concept = %self.vocab.short_id(concept), label, "label added");
        self.persistence.commit(&self.graph, &self.vocab)
    }
}

impl std::fmt::Debug for KbState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KbState")
            .field("modules", &self.graph.modules().len())
            .field("concepts", &self.vocab.len())
            .field("labels", &self.labels)
            .field("reasoner", &self.reasoner)
            .field("persistence", &self.persistence)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::fixture;

    #[test]
    fn allocator_seeded_past_existing_terms() {
        let mut state = fixture::state();
        assert_eq!(state.local_prefix(), "RICORDO_");
        let next = state.allocator.next_iri(|_| false).unwrap();
        assert_eq!(next, format!("{}8", fixture::NS));
    }

    #[test]
    fn add_label_updates_index_and_primary_module() {
        let mut state = fixture::state();
        let local = fixture::id(&state, "RICORDO_7");
        let outcome = state.add_label(local, "volume of blood");
        assert_eq!(outcome, crate::persist::CommitOutcome::Skipped);
        assert_eq!(state.labels.labels_of(local), vec!["volume of blood".to_string()]);
        assert_eq!(state.graph.primary().added_labels().len(), 1);
    }
}
