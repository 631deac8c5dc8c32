//! Label index: `rdfs:label` multimap scoped by module.
//!
//! Labels are recorded per (concept, module). Reading a concept's labels
//! consults the primary module first and then imports in closure order; the
//! first module carrying any label for the concept wins.

use dashmap::DashMap;

use crate::concept::{Concept, ConceptId, ModuleId};
use crate::error::{KbResult, VocabError};
use crate::graph::ConceptGraph;

use super::Vocabulary;

/// Marker rendered for a class without any label.
pub const UNLABELED: &str = "(Unlabeled class)";

/// Label ↔ concept multimap.
pub struct LabelIndex {
    /// Concept → labels with the module that asserted each, in assertion order.
    by_concept: DashMap<ConceptId, Vec<(ModuleId, String)>>,
    /// Normalized label (trimmed, lowercase) → concepts.
    by_label: DashMap<String, Vec<ConceptId>>,
}

fn normalize(label: &str) -> String {
    label.trim().to_lowercase()
}

impl LabelIndex {
    pub fn new() -> Self {
        Self {
            by_concept: DashMap::new(),
            by_label: DashMap::new(),
        }
    }

    /// Index every label annotation of every module.
    pub fn from_graph(graph: &ConceptGraph) -> Self {
        let index = Self::new();
        for module in graph.modules() {
            for (concept, label) in &module.labels {
                index.add(*concept, module.id, label);
            }
        }
        index
    }

    pub fn add(&self, concept: ConceptId, module: ModuleId, label: &str) {
        self.by_concept
            .entry(concept)
            .or_default()
            .push((module, label.to_string()));
        let mut holders = self.by_label.entry(normalize(label)).or_default();
        if !holders.contains(&concept) {
            holders.push(concept);
        }
    }

    /// Labels of `concept` from the first module that has any; empty means unlabeled.
    pub fn labels_of(&self, concept: ConceptId) -> Vec<String> {
        let Some(entries) = self.by_concept.get(&concept) else {
            return Vec::new();
        };
        let Some(first_module) = entries.iter().map(|(m, _)| *m).min() else {
            return Vec::new();
        };
        entries
            .iter()
            .filter(|(m, _)| *m == first_module)
            .map(|(_, l)| l.clone())
            .collect()
    }

    pub fn first_label(&self, concept: ConceptId) -> Option<String> {
        self.labels_of(concept).into_iter().next()
    }

    /// Whether `module` already asserts exactly `label` for `concept`.
    pub fn has_label_in(&self, concept: ConceptId, module: ModuleId, label: &str) -> bool {
        self.by_concept
            .get(&concept)
            .is_some_and(|entries| entries.iter().any(|(m, l)| *m == module && l == label))
    }

    /// Classes carrying `label`. Individuals and relations are skipped.
    pub fn search(&self, label: &str, vocab: &Vocabulary) -> KbResult<Vec<Concept>> {
        let found: Vec<Concept> = self
            .by_label
            .get(&normalize(label))
            .map(|holders| {
                holders
                    .iter()
                    .filter_map(|id| vocab.get(*id))
                    .filter(Concept::is_class)
                    .collect()
            })
            .unwrap_or_default();

        if found.is_empty() {
            return Err(VocabError::LabelNotFound {
                label: label.to_string(),
            }
            .into());
        }
        Ok(found)
    }

    pub fn len(&self) -> usize {
        self.by_label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_label.is_empty()
    }
}

impl Default for LabelIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LabelIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelIndex")
            .field("concepts", &self.by_concept.len())
            .field("labels", &self.by_label.len())
            .finish()
    }
}
