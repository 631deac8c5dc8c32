//! Core concept types.
//!
//! Every class, individual and object property of the loaded closure is a
//! [`Concept`] identified by a dense [`ConceptId`]. New knowledge-base terms
//! get their short identifiers from the [`TermAllocator`].

use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{KbResult, VocabError};

pub const OWL_THING: &str = "http://www.w3.org/2002/07/owl#Thing";
pub const OWL_NOTHING: &str = "http://www.w3.org/2002/07/owl#Nothing";

/// Unique, niche-optimized identifier for a concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ConceptId(NonZeroU64);

impl ConceptId {
    /// `owl:Thing`, always registered first.
    pub const THING: ConceptId = ConceptId(NonZeroU64::MIN);
    /// `owl:Nothing`, always registered second.
    pub const NOTHING: ConceptId = ConceptId(NonZeroU64::MIN.saturating_add(1));

    /// Returns `None` if `raw` is zero.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(ConceptId)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for ConceptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "concept:{}", self.0)
    }
}

/// What an entity of the closure is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConceptKind {
    Class,
    Individual,
    /// An object property usable in `relation some Filler`.
    Relation,
}

impl std::fmt::Display for ConceptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConceptKind::Class => write!(f, "Class"),
            ConceptKind::Individual => write!(f, "Individual"),
            ConceptKind::Relation => write!(f, "Relation"),
        }
    }
}

/// Position of a module in the import closure. The primary module is 0,
/// imports follow in breadth-first closure order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ModuleId(pub u32);

impl ModuleId {
    pub const PRIMARY: ModuleId = ModuleId(0);

    pub fn is_primary(self) -> bool {
        self == Self::PRIMARY
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A named entity of the closure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub id: ConceptId,
    /// Canonical long identifier (full IRI).
    pub iri: String,
    /// Short identifier, unique within the closure.
    pub short_id: String,
    pub kind: ConceptKind,
    /// Module that first declared the entity.
    pub origin: ModuleId,
}

impl Concept {
    pub fn new(id: ConceptId, iri: impl Into<String>, kind: ConceptKind, origin: ModuleId) -> Self {
        let iri = iri.into();
        Self {
            id,
            short_id: short_form(&iri).to_string(),
            iri,
            kind,
            origin,
        }
    }

    pub fn is_class(&self) -> bool {
        self.kind == ConceptKind::Class
    }
}

/// Short form of an IRI: the text after the last `#`, else after the last `/`
/// when the IRI has more than one `/`, else the whole IRI.
pub fn short_form(iri: &str) -> &str {
    if let Some(i) = iri.rfind('#') {
        return &iri[i + 1..];
    }
    match (iri.find('/'), iri.rfind('/')) {
        (Some(first), Some(last)) if first != last => &iri[last + 1..],
        _ => iri,
    }
}

/// Thread-safe allocator for dense concept ids.
///
/// Ids 1 and 2 are reserved for `owl:Thing` and `owl:Nothing`.
#[derive(Debug)]
pub struct ConceptAllocator {
    next: AtomicU64,
}

impl ConceptAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Create an allocator that resumes from a given id.
    pub fn starting_from(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start.max(1)),
        }
    }

    /// Allocate the next concept id.
    pub fn next_id(&self) -> KbResult<ConceptId> {
        let raw = self.next.fetch_add(1, Ordering::Relaxed);
        ConceptId::new(raw).ok_or_else(|| VocabError::AllocatorExhausted.into())
    }

    pub fn peek_next(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for ConceptAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Collision-free allocator for the short identifiers of materialized terms.
///
/// Terms are named `<namespace><n>` with a monotonic `n`, seeded one past the
/// largest numeric suffix already present in the namespace. Any candidate
/// that is already taken is skipped.
#[derive(Debug, Clone)]
pub struct TermAllocator {
    namespace: String,
    local_prefix: String,
    next: u64,
}

impl TermAllocator {
    /// Seed from every short identifier currently known.
    pub fn seeded<'a>(namespace: impl Into<String>, existing: impl IntoIterator<Item = &'a str>) -> Self {
        let namespace = namespace.into();
        let local_prefix = short_form(&namespace).to_string();
        let max = existing
            .into_iter()
            .filter_map(|short| short.strip_prefix(local_prefix.as_str()))
            .filter_map(|suffix| suffix.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        Self {
            namespace,
            local_prefix,
            next: max.saturating_add(1),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Local-name prefix shared by every term of the namespace, e.g. `RICORDO_`.
    pub fn local_prefix(&self) -> &str {
        &self.local_prefix
    }

    /// Next full IRI not rejected by `taken`.
    pub fn next_iri(&mut self, taken: impl Fn(&str) -> bool) -> KbResult<String> {
        loop {
            let n = self.next;
            self.next = n.checked_add(1).ok_or(VocabError::AllocatorExhausted)?;
            let iri = format!("{}{n}", self.namespace);
            if !taken(&iri) {
                return Ok(iri);
            }
        }
    }

    /// Give back the most recent allocation after a rolled-back materialization.
    pub fn release(&mut self, iri: &str) {
        let released = iri
            .strip_prefix(self.namespace.as_str())
            .and_then(|s| s.parse::<u64>().ok());
        if released.is_some_and(|n| n.saturating_add(1) == self.next) {
            self.next -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concept_id_niche_optimization() {
        assert_eq!(
            std::mem::size_of::<Option<ConceptId>>(),
            std::mem::size_of::<ConceptId>()
        );
    }

    #[test]
    fn reserved_ids() {
        assert_eq!(ConceptId::THING.get(), 1);
        assert_eq!(ConceptId::NOTHING.get(), 2);
        assert!(ConceptId::new(0).is_none());
    }

    #[test]
    fn short_form_rules() {
        assert_eq!(short_form("http://purl.org/obo/owlapi/quality#PATO_0000014"), "PATO_0000014");
        assert_eq!(short_form("http://purl.org/obo/FMA_7088"), "FMA_7088");
        assert_eq!(short_form("urn/x"), "urn/x");
        assert_eq!(short_form("plain"), "plain");
        assert_eq!(short_form(OWL_THING), "Thing");
    }

    #[test]
    fn allocator_is_sequential() {
        let alloc = ConceptAllocator::new();
        assert_eq!(alloc.next_id().unwrap(), ConceptId::THING);
        assert_eq!(alloc.next_id().unwrap(), ConceptId::NOTHING);
        assert_eq!(alloc.peek_next(), 3);
    }

    #[test]
    fn term_allocator_seeds_past_existing() {
        let ns = "http://www.ricordo.eu/ricordo.owl#RICORDO_";
        let mut alloc = TermAllocator::seeded(ns, ["RICORDO_7", "RICORDO_12", "PATO_99", "RICORDO_x"]);
        assert_eq!(alloc.local_prefix(), "RICORDO_");
        assert_eq!(alloc.next_iri(|_| false).unwrap(), format!("{ns}13"));
        assert_eq!(alloc.next_iri(|_| false).unwrap(), format!("{ns}14"));
    }

    #[test]
    fn term_allocator_skips_taken() {
        let ns = "http://example.org/kb#KB_";
        let mut alloc = TermAllocator::seeded(ns, []);
        let taken = format!("{ns}1");
        assert_eq!(alloc.next_iri(|iri| iri == taken).unwrap(), format!("{ns}2"));
    }

    #[test]
    fn term_allocator_release_reuses_last() {
        let ns = "http://example.org/kb#KB_";
        let mut alloc = TermAllocator::seeded(ns, []);
        let first = alloc.next_iri(|_| false).unwrap();
        alloc.release(&first);
        assert_eq!(alloc.next_iri(|_| false).unwrap(), first);
    }
}
