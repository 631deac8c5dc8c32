//! Hierarchy traversal over the classified knowledge base.
//!
//! Every operation goes through the reasoner facade, so it answers for
//! anonymous expressions as well as named classes. Results name each
//! taxonomy node by its representative; `owl:Nothing` and unsatisfiable
//! classes never appear as subterms.

use std::collections::HashSet;

use serde::Serialize;

use crate::concept::ConceptId;
use crate::error::KbResult;
use crate::expr::ClassExpr;
use crate::state::KbState;

/// A term with its first label, for verbose output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TermEntry {
    pub term: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A sibling and the parent it was first reached through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiblingEntry {
    pub term: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub parent: String,
}

/// One node of a subhierarchy tree. Leaves have an empty `subterms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub term: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub subterms: Vec<TreeNode>,
}

impl KbState {
    pub fn entry(&self, id: ConceptId) -> TermEntry {
        TermEntry {
            term: self.vocab.short_id(id),
            label: self.labels.first_label(id),
        }
    }

    /// Subclasses of `expr`, one representative per taxonomy node.
    pub fn subterms(&mut self, expr: &ClassExpr, direct: bool) -> KbResult<Vec<ConceptId>> {
        let nodes = self.reasoner.subclasses_of(expr, direct)?;
        Ok(nodes.into_iter().filter_map(|n| n.first().copied()).collect())
    }

    /// Named equivalents of `expr` followed by its subterms.
    pub fn terms(&mut self, expr: &ClassExpr) -> KbResult<Vec<ConceptId>> {
        let mut out = self.reasoner.equivalents_of(expr)?;
        for id in self.subterms(expr, false)? {
            if !out.contains(&id) {
                out.push(id);
            }
        }
        Ok(out)
    }

    /// Every individual that is an instance of `expr`.
    pub fn instances(&mut self, expr: &ClassExpr) -> KbResult<Vec<ConceptId>> {
        self.reasoner.instances_of(expr, false)
    }

    /// Direct subclasses of each direct superclass, without `expr`'s own
    /// equivalence class. Pairs are `(sibling, first parent)`.
    pub fn siblings(&mut self, expr: &ClassExpr) -> KbResult<Vec<(ConceptId, ConceptId)>> {
        let own: HashSet<ConceptId> = self.reasoner.equivalents_of(expr)?.into_iter().collect();
        let parents = self.reasoner.superclasses_of(expr, true)?;

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for parent in parents.iter().filter_map(|n| n.first().copied()) {
            for sibling in self.subterms(&ClassExpr::named(parent), true)? {
                if own.contains(&sibling) || !seen.insert(sibling) {
                    continue;
                }
                out.push((sibling, parent));
            }
        }
        Ok(out)
    }

    pub fn sibling_entries(&mut self, expr: &ClassExpr) -> KbResult<Vec<SiblingEntry>> {
        Ok(self
            .siblings(expr)?
            .into_iter()
            .map(|(sibling, parent)| SiblingEntry {
                term: self.vocab.short_id(sibling),
                label: self.labels.first_label(sibling),
                parent: self.vocab.short_id(parent),
            })
            .collect())
    }

    /// Tree of direct subclasses rooted at `expr`.
    ///
    /// The root is named after `expr`'s equivalent class when it has one,
    /// otherwise after the expression text.
    pub fn subhierarchy(&mut self, expr: &ClassExpr) -> KbResult<TreeNode> {
        let root = self
            .reasoner
            .equivalents_of(expr)?
            .first()
            .copied()
            .filter(|id| *id != ConceptId::NOTHING);
        let (term, label) = match root {
            Some(id) => (self.vocab.short_id(id), self.labels.first_label(id)),
            None => (expr.render(&self.vocab), None),
        };
        let subterms = self.subtrees(expr)?;
        Ok(TreeNode {
            term,
            label,
            subterms,
        })
    }

    fn subtrees(&mut self, expr: &ClassExpr) -> KbResult<Vec<TreeNode>> {
        let mut out = Vec::new();
        for child in self.subterms(expr, true)? {
            let subterms = self.subtrees(&ClassExpr::Named(child))?;
            out.push(TreeNode {
                term: self.vocab.short_id(child),
                label: self.labels.first_label(child),
                subterms,
            });
        }
        Ok(out)
    }
}
