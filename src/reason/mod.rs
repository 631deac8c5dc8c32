//! Reasoning backend facade.
//!
//! [`ReasoningBackend`] is the capability surface of a classification engine.
//! [`Reasoner`] wraps one and owns the consistency of its classification
//! cache: staging an axiom moves the cache to [`CacheState::Stale`], and no
//! query is answered until [`Reasoner::flush_and_recompute`] has brought it
//! back to [`CacheState::Consistent`].

pub mod el;
pub mod taxonomy;

use crate::concept::ConceptId;
use crate::error::{KbResult, ReasonError};
use crate::expr::ClassExpr;
use crate::graph::{Axiom, ConceptGraph};
use crate::vocab::Vocabulary;

pub use el::ElReasoner;
pub use taxonomy::{Node, Taxonomy};

/// A classification engine.
///
/// Queries take `&mut self`: a backend may need to index an anonymous
/// expression before it can answer for it.
pub trait ReasoningBackend: Send {
    fn name(&self) -> &'static str;

    /// Classify the whole closure from scratch.
    fn classify(&mut self, graph: &ConceptGraph, vocab: &Vocabulary) -> KbResult<()>;

    /// Add axioms and reclassify incrementally. On error the backend keeps
    /// its previous classification.
    fn flush(&mut self, axioms: &[Axiom], vocab: &Vocabulary) -> KbResult<()>;

    fn sub_classes(&mut self, expr: &ClassExpr, direct: bool) -> KbResult<Vec<Node>>;

    fn super_classes(&mut self, expr: &ClassExpr, direct: bool) -> KbResult<Vec<Node>>;

    /// Named classes equivalent to `expr`; empty when there are none.
    fn equivalent_classes(&mut self, expr: &ClassExpr) -> KbResult<Node>;

    fn instances(&mut self, expr: &ClassExpr, direct: bool) -> KbResult<Vec<ConceptId>>;
}

/// Consistency of the classification cache with the concept graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Consistent,
    Stale,
}

/// The facade the rest of the service talks to.
pub struct Reasoner {
    backend: Box<dyn ReasoningBackend>,
    pending: Vec<Axiom>,
}

impl Reasoner {
    pub fn new(backend: Box<dyn ReasoningBackend>) -> Self {
        Self {
            backend,
            pending: Vec::new(),
        }
    }

    /// Facade over the built-in EL backend.
    pub fn el() -> Self {
        Self::new(Box::new(ElReasoner::new()))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn state(&self) -> CacheState {
        if self.pending.is_empty() {
            CacheState::Consistent
        } else {
            CacheState::Stale
        }
    }

    /// Initial classification at load time.
    pub fn classify(&mut self, graph: &ConceptGraph, vocab: &Vocabulary) -> KbResult<()> {
        self.pending.clear();
        self.backend.classify(graph, vocab)
    }

    /// Record an axiom already added to the concept graph. The cache is stale
    /// until the next recompute.
    pub fn stage(&mut self, axiom: Axiom) {
        self.pending.push(axiom);
    }

    /// Push staged axioms into the backend and reclassify.
    ///
    /// On failure the staged axioms are discarded and the previous
    /// classification stays in effect.
    pub fn flush_and_recompute(&mut self, vocab: &Vocabulary) -> KbResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.pending);
        let start = std::time::Instant::now();
        match self.backend.flush(&pending, vocab) {
            Ok(()) => {
                tracing::debug!(
                    axioms = pending.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "reclassified"
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, axioms = pending.len(), "recompute failed, staged axioms dropped");
                Err(e)
            }
        }
    }

    fn ensure_consistent(&self) -> KbResult<()> {
        match self.state() {
            CacheState::Consistent => Ok(()),
            CacheState::Stale => Err(ReasonError::Stale {
                pending: self.pending.len(),
            }
            .into()),
        }
    }

    pub fn subclasses_of(&mut self, expr: &ClassExpr, direct: bool) -> KbResult<Vec<Node>> {
        self.ensure_consistent()?;
        self.backend.sub_classes(expr, direct)
    }

    pub fn superclasses_of(&mut self, expr: &ClassExpr, direct: bool) -> KbResult<Vec<Node>> {
        self.ensure_consistent()?;
        self.backend.super_classes(expr, direct)
    }

    pub fn equivalents_of(&mut self, expr: &ClassExpr) -> KbResult<Node> {
        self.ensure_consistent()?;
        self.backend.equivalent_classes(expr)
    }

    pub fn instances_of(&mut self, expr: &ClassExpr, direct: bool) -> KbResult<Vec<ConceptId>> {
        self.ensure_consistent()?;
        self.backend.instances(expr, direct)
    }
}

impl std::fmt::Debug for Reasoner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reasoner")
            .field("backend", &self.backend.name())
            .field("pending", &self.pending.len())
            .finish()
    }
}
