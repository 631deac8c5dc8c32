//! Restricted class expressions.
//!
//! A [`ClassExpr`] is the EL fragment of OWL class expressions: named classes,
//! `owl:Thing`, conjunction and existential restriction. There is no
//! disjunction or negation node; the [`safety`] filter rejects those operators
//! before a tree is ever built.

pub mod parser;
pub mod safety;
pub mod translate;

use serde::{Deserialize, Serialize};

use crate::concept::ConceptId;
use crate::vocab::Vocabulary;

/// An immutable EL class expression over concepts of the closure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassExpr {
    /// `owl:Thing`.
    Thing,
    Named(ConceptId),
    /// Conjunction of at least two operands.
    And(Vec<ClassExpr>),
    /// `relation some filler`.
    Some {
        relation: ConceptId,
        filler: Box<ClassExpr>,
    },
}

impl ClassExpr {
    pub fn named(id: ConceptId) -> Self {
        if id == ConceptId::THING {
            ClassExpr::Thing
        } else {
            ClassExpr::Named(id)
        }
    }

    /// Conjunction of `operands`; a single operand is returned unwrapped.
    pub fn and(operands: impl IntoIterator<Item = ClassExpr>) -> Self {
        let mut operands: Vec<ClassExpr> = operands.into_iter().collect();
        match operands.len() {
            0 => ClassExpr::Thing,
            1 => operands.remove(0),
            _ => ClassExpr::And(operands),
        }
    }

    pub fn some(relation: ConceptId, filler: ClassExpr) -> Self {
        ClassExpr::Some {
            relation,
            filler: Box::new(filler),
        }
    }

    /// The named concept, if this is a plain reference.
    pub fn as_named(&self) -> Option<ConceptId> {
        match self {
            ClassExpr::Named(id) => Some(*id),
            ClassExpr::Thing => Some(ConceptId::THING),
            _ => None,
        }
    }

    /// Every concept referenced, classes and relations alike, in first-seen order.
    pub fn signature(&self) -> Vec<ConceptId> {
        let mut out = Vec::new();
        self.collect_signature(&mut out);
        out
    }

    fn collect_signature(&self, out: &mut Vec<ConceptId>) {
        match self {
            ClassExpr::Thing => {}
            ClassExpr::Named(id) => {
                if !out.contains(id) {
                    out.push(*id);
                }
            }
            ClassExpr::And(ops) => ops.iter().for_each(|op| op.collect_signature(out)),
            ClassExpr::Some { relation, filler } => {
                if !out.contains(relation) {
                    out.push(*relation);
                }
                filler.collect_signature(out);
            }
        }
    }

    /// Render in Manchester syntax using short identifiers.
    pub fn render(&self, vocab: &Vocabulary) -> String {
        match self {
            ClassExpr::Thing => "Thing".into(),
            ClassExpr::Named(id) => vocab.short_id(*id),
            ClassExpr::And(ops) => ops
                .iter()
                .map(|op| match op {
                    ClassExpr::And(_) | ClassExpr::Some { .. } => format!("({})", op.render(vocab)),
                    _ => op.render(vocab),
                })
                .collect::<Vec<_>>()
                .join(" and "),
            ClassExpr::Some { relation, filler } => {
                let filler_text = match filler.as_ref() {
                    ClassExpr::And(_) => format!("({})", filler.render(vocab)),
                    other => other.render(vocab),
                };
                format!("{} some {filler_text}", vocab.short_id(*relation))
            }
        }
    }
}
