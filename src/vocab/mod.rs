//! Vocabulary index: bidirectional short identifier ↔ concept mapping.
//!
//! The [`Vocabulary`] is built once while the import closure loads and then
//! only grows, through the term materializer. Lookups by short identifier,
//! by full IRI and by [`ConceptId`] are all O(1) `DashMap` reads.

pub mod labels;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::concept::{
    Concept, ConceptAllocator, ConceptId, ConceptKind, ModuleId, OWL_NOTHING, OWL_THING,
};
use crate::error::{KbResult, VocabError};

pub use labels::LabelIndex;

/// Registry of every named entity of the closure.
pub struct Vocabulary {
    /// Source of truth: id → concept.
    concepts: DashMap<ConceptId, Concept>,
    /// Short identifier → id. First registration wins.
    by_short: DashMap<String, ConceptId>,
    /// Full IRI → id.
    by_iri: DashMap<String, ConceptId>,
    allocator: ConceptAllocator,
}

impl Vocabulary {
    /// Create a vocabulary holding only `owl:Thing` and `owl:Nothing`.
    pub fn new() -> Self {
        let vocab = Self {
            concepts: DashMap::new(),
            by_short: DashMap::new(),
            by_iri: DashMap::new(),
            allocator: ConceptAllocator::starting_from(ConceptId::NOTHING.get() + 1),
        };
        for (id, iri) in [(ConceptId::THING, OWL_THING), (ConceptId::NOTHING, OWL_NOTHING)] {
            vocab.insert(Concept::new(id, iri, ConceptKind::Class, ModuleId::PRIMARY));
        }
        vocab
    }

    fn insert(&self, concept: Concept) {
        self.by_iri.insert(concept.iri.clone(), concept.id);
        self.by_short.insert(concept.short_id.clone(), concept.id);
        self.concepts.insert(concept.id, concept);
    }

    /// Register an entity, or return the existing one for the same IRI.
    ///
    /// A second entity whose short identifier collides with an earlier one
    /// takes its full IRI as short identifier, so every rendered id still
    /// resolves to the entity it names.
    pub fn register(&self, iri: &str, kind: ConceptKind, origin: ModuleId) -> KbResult<Concept> {
        if let Some(existing) = self.resolve_iri(iri) {
            if existing.kind != kind {
                tracing::debug!(iri, first = %existing.kind, other = %kind, "entity punned, keeping first kind");
            }
            return Ok(existing);
        }

        let id = self.allocator.next_id()?;
        let mut concept = Concept::new(id, iri, kind, origin);

        let holder = match self.by_short.entry(concept.short_id.clone()) {
            Entry::Occupied(holder) => Some(*holder.get()),
            Entry::Vacant(slot) => {
                slot.insert(id);
                None
            }
        };
        if let Some(holder) = holder {
            tracing::warn!(
                short_id = %concept.short_id,
                iri,
                existing = %holder,
                "short identifier collision, later entity named by its IRI"
            );
            concept.short_id = concept.iri.clone();
            self.by_short.insert(concept.short_id.clone(), id);
        }
        self.by_iri.insert(concept.iri.clone(), id);
        self.concepts.insert(id, concept.clone());
        Ok(concept)
    }

    /// Remove a concept registered by a materialization that was rolled back.
    pub fn unregister(&self, id: ConceptId) {
        if let Some((_, concept)) = self.concepts.remove(&id) {
            self.by_iri.remove(&concept.iri);
            self.by_short.remove_if(&concept.short_id, |_, holder| *holder == id);
        }
    }

    /// Resolve a short identifier.
    pub fn resolve(&self, short_id: &str) -> KbResult<Concept> {
        self.lookup(short_id)
            .and_then(|id| self.get(id))
            .ok_or_else(|| {
                VocabError::NotFound {
                    short_id: short_id.to_string(),
                }
                .into()
            })
    }

    pub fn lookup(&self, short_id: &str) -> Option<ConceptId> {
        self.by_short.get(short_id).map(|r| *r.value())
    }

    pub fn resolve_iri(&self, iri: &str) -> Option<Concept> {
        let id = *self.by_iri.get(iri)?.value();
        self.get(id)
    }

    pub fn get(&self, id: ConceptId) -> Option<Concept> {
        self.concepts.get(&id).map(|r| r.value().clone())
    }

    pub fn kind_of(&self, id: ConceptId) -> Option<ConceptKind> {
        self.concepts.get(&id).map(|r| r.value().kind)
    }

    /// Short identifier of a concept, falling back to `concept:{id}`.
    pub fn short_id(&self, id: ConceptId) -> String {
        self.concepts
            .get(&id)
            .map(|r| r.value().short_id.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Full IRI of a concept, falling back to `concept:{id}`.
    pub fn iri(&self, id: ConceptId) -> String {
        self.concepts
            .get(&id)
            .map(|r| r.value().iri.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Every short identifier that resolves, for seeding the term allocator.
    pub fn short_ids(&self) -> Vec<String> {
        self.by_short.iter().map(|r| r.key().clone()).collect()
    }

    /// All concepts, ordered by id.
    pub fn all(&self) -> Vec<Concept> {
        let mut all: Vec<Concept> = self.concepts.iter().map(|r| r.value().clone()).collect();
        all.sort_by_key(|c| c.id);
        all
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    pub fn count_of(&self, kind: ConceptKind) -> usize {
        self.concepts.iter().filter(|r| r.value().kind == kind).count()
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Vocabulary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vocabulary")
            .field("concepts", &self.concepts.len())
            .field("short_ids", &self.by_short.len())
            .finish()
    }
}
