//! Term materializer: get-or-create a named class for an expression.
//!
//! Lookup is keyed on reasoner equivalence, not on syntax, so `A and B`,
//! `B and A` and `A and (B and A)` all land on the same term. Creation
//! allocates a fresh identifier, stages `EquivalentClasses(new, E)`,
//! reclassifies and commits. If reclassification fails the registration is
//! undone and nothing half-created survives.

use crate::concept::{Concept, ConceptKind, ModuleId, short_form};
use crate::error::{KbResult, ReasonError};
use crate::expr::ClassExpr;
use crate::graph::Axiom;
use crate::persist::CommitOutcome;
use crate::state::KbState;

/// What [`KbState::materialize`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materialized {
    pub concept: Concept,
    /// Commit result for a newly created term; `None` when the term already existed.
    pub commit: Option<CommitOutcome>,
}

impl Materialized {
    pub fn created(&self) -> bool {
        self.commit.is_some()
    }
}

impl KbState {
    /// Named class equivalent to `expr`, created if none exists yet.
    pub fn materialize(&mut self, expr: &ClassExpr) -> KbResult<Materialized> {
        let node = self.reasoner.equivalents_of(expr)?;
        if let Some(existing) = node.first().and_then(|id| self.vocab.get(*id)) {
            return Ok(Materialized {
                concept: existing,
                commit: None,
            });
        }

        let vocab = &self.vocab;
        let iri = self
            .allocator
            .next_iri(|iri| vocab.resolve_iri(iri).is_some() || vocab.lookup(short_form(iri)).is_some())?;
        let concept = self.vocab.register(&iri, ConceptKind::Class, ModuleId::PRIMARY)?;
        let axiom = Axiom::EquivalentClasses(ClassExpr::Named(concept.id), expr.clone());

        let primary = self.graph.primary_mut();
        primary.declarations.push(concept.id);
        primary.axioms.push(axiom.clone());
        self.reasoner.stage(axiom);

        if let Err(e) = self.reasoner.flush_and_recompute(&self.vocab) {
            let primary = self.graph.primary_mut();
            primary.axioms.pop();
            primary.declarations.pop();
            self.vocab.unregister(concept.id);
            self.allocator.release(&iri);
            tracing::warn!(iri = %iri, error = %e, "materialization rolled back");
            return Err(ReasonError::Materialize {
                message: e.to_string(),
            }
            .into());
        }

        tracing::info!(
            concept = %concept.short_id,
            expr = %expr.render(&self.vocab),
            "new term materialized"
        );
        let commit = self.persistence.commit(&self.graph, &self.vocab);
        Ok(Materialized {
            concept,
            commit: Some(commit),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::concept::ConceptId;
    use crate::error::{KbError, KbResult, ReasonError};
    use crate::expr::ClassExpr;
    use crate::expr::parser::ExprParser;
    use crate::graph::{Axiom, ConceptGraph};
    use crate::reason::{CacheState, ElReasoner, Node, Reasoner, ReasoningBackend};
    use crate::state::{KbState, fixture};
    use crate::vocab::Vocabulary;

    fn parse(state: &KbState, text: &str) -> ClassExpr {
        ExprParser::new(&state.vocab, &state.labels).parse(text).unwrap()
    }

    #[test]
    fn existing_equivalent_is_returned() {
        let mut state = fixture::state();
        let expr = parse(&state, "part_of some Heart and Blood");
        let before = state.vocab.len();
        let result = state.materialize(&expr).unwrap();
        assert_eq!(result.concept.short_id, "HeartBlood");
        assert!(!result.created());
        assert_eq!(state.vocab.len(), before);
    }

    #[test]
    fn creates_once_then_reuses() {
        let mut state = fixture::state();
        let first = state.materialize(&parse(&state, "Organ and Fluid")).unwrap();
        assert!(first.created());
        assert_eq!(first.concept.short_id, "RICORDO_8");
        assert_eq!(state.graph.primary().added_declarations(), &[first.concept.id]);

        for text in ["Fluid and Organ", "Organ and (Fluid and Organ)"] {
            let again = state.materialize(&parse(&state, text)).unwrap();
            assert_eq!(again.concept, first.concept);
            assert!(!again.created());
        }
        assert_eq!(state.graph.primary().added_axioms().len(), 1);
    }

    #[test]
    fn new_term_is_classified() {
        let mut state = fixture::state();
        let term = state.materialize(&parse(&state, "Organ and Fluid")).unwrap().concept;
        let supers = state
            .reasoner
            .superclasses_of(&ClassExpr::Named(term.id), true)
            .unwrap();
        let mut names: Vec<String> = supers.iter().map(|n| state.vocab.short_id(n[0])).collect();
        names.sort();
        assert_eq!(names, vec!["Fluid", "Organ"]);
    }

    /// EL backend whose incremental flush always fails.
    struct RefusingFlush(ElReasoner);

    impl ReasoningBackend for RefusingFlush {
        fn name(&self) -> &'static str {
            "refusing"
        }
        fn classify(&mut self, graph: &ConceptGraph, vocab: &Vocabulary) -> KbResult<()> {
            self.0.classify(graph, vocab)
        }
        fn flush(&mut self, _axioms: &[Axiom], _vocab: &Vocabulary) -> KbResult<()> {
            Err(ReasonError::Inconsistent {
                detail: "refused".into(),
            }
            .into())
        }
        fn sub_classes(&mut self, expr: &ClassExpr, direct: bool) -> KbResult<Vec<Node>> {
            self.0.sub_classes(expr, direct)
        }
        fn super_classes(&mut self, expr: &ClassExpr, direct: bool) -> KbResult<Vec<Node>> {
            self.0.super_classes(expr, direct)
        }
        fn equivalent_classes(&mut self, expr: &ClassExpr) -> KbResult<Node> {
            self.0.equivalent_classes(expr)
        }
        fn instances(&mut self, expr: &ClassExpr, direct: bool) -> KbResult<Vec<ConceptId>> {
            self.0.instances(expr, direct)
        }
    }

    #[test]
    fn failed_recompute_rolls_back() {
        let mut state = fixture::state_with(Reasoner::new(Box::new(RefusingFlush(ElReasoner::new()))));
        let before = state.vocab.len();
        let expr = parse(&state, "Organ and Fluid");

        let err = state.materialize(&expr).unwrap_err();
        assert!(matches!(err, KbError::Reason(ReasonError::Materialize { .. })));
        assert_eq!(err.user_message(), crate::error::BACKEND_FAILURE_MESSAGE);

        assert_eq!(state.vocab.len(), before);
        assert!(state.vocab.lookup("RICORDO_8").is_none());
        assert!(state.graph.primary().added_declarations().is_empty());
        assert!(state.graph.primary().added_axioms().is_empty());
        assert_eq!(state.reasoner.state(), CacheState::Consistent);
        // The released identifier is handed out again.
        assert_eq!(
            state.allocator.next_iri(|_| false).unwrap(),
            format!("{}8", fixture::NS)
        );
    }

    #[test]
    fn unsatisfiable_expression_maps_to_nothing() {
        let mut state = fixture::state();
        let blood = fixture::id(&state, "Blood");
        let nothing = ClassExpr::Named(ConceptId::NOTHING);
        let expr = ClassExpr::And(vec![ClassExpr::Named(blood), nothing]);
        let before = state.vocab.len();
        let result = state.materialize(&expr).unwrap();
        // Blood and Nothing is unsatisfiable, so it is equivalent to Nothing.
        assert_eq!(result.concept.id, ConceptId::NOTHING);
        assert_eq!(state.vocab.len(), before);
        assert!(state.graph.primary().added_axioms().is_empty());
    }
}
