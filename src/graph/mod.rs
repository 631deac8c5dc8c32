//! Concept graph: the import closure as an ordered list of modules.
//!
//! The primary module (the knowledge base the service owns) sits at index 0;
//! imported modules follow in breadth-first closure order. Each module holds
//! its declarations, logical [`Axiom`]s and label annotations. Only the primary
//! module is ever mutated, and only by appending.

use std::path::PathBuf;

use oxigraph::model::Triple;

use crate::concept::{ConceptId, ModuleId};
use crate::expr::ClassExpr;

/// A logical axiom of the EL fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Axiom {
    SubClassOf { sub: ClassExpr, sup: ClassExpr },
    EquivalentClasses(ClassExpr, ClassExpr),
    ClassAssertion { individual: ConceptId, class: ClassExpr },
}

/// Counts of loaded content, so a save can tell loaded from appended items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Baseline {
    pub declarations: usize,
    pub axioms: usize,
    pub labels: usize,
}

/// One ontology document of the closure.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub id: ModuleId,
    /// Ontology IRI, if the document declares one.
    pub iri: Option<String>,
    /// File the module was read from.
    pub source: Option<PathBuf>,
    /// `owl:imports` targets, in document order.
    pub imports: Vec<String>,
    pub declarations: Vec<ConceptId>,
    pub axioms: Vec<Axiom>,
    pub labels: Vec<(ConceptId, String)>,
    /// Triples as read from disk, re-emitted verbatim on save.
    pub raw: Vec<Triple>,
    pub baseline: Baseline,
}

impl Module {
    pub fn new(id: ModuleId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Mark everything currently held as loaded content.
    pub fn seal(&mut self) {
        self.baseline = Baseline {
            declarations: self.declarations.len(),
            axioms: self.axioms.len(),
            labels: self.labels.len(),
        };
    }

    pub fn added_declarations(&self) -> &[ConceptId] {
        &self.declarations[self.baseline.declarations.min(self.declarations.len())..]
    }

    pub fn added_axioms(&self) -> &[Axiom] {
        &self.axioms[self.baseline.axioms.min(self.axioms.len())..]
    }

    pub fn added_labels(&self) -> &[(ConceptId, String)] {
        &self.labels[self.baseline.labels.min(self.labels.len())..]
    }
}

/// The loaded closure.
#[derive(Debug, Clone)]
pub struct ConceptGraph {
    modules: Vec<Module>,
}

impl ConceptGraph {
    /// A closure made of an empty primary module.
    pub fn new() -> Self {
        Self {
            modules: vec![Module::new(ModuleId::PRIMARY)],
        }
    }

    pub fn primary(&self) -> &Module {
        &self.modules[0]
    }

    pub fn primary_mut(&mut self) -> &mut Module {
        &mut self.modules[0]
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id.index())
    }

    /// Append an imported module, assigning it the next closure position.
    pub fn push_module(&mut self, mut module: Module) -> ModuleId {
        let id = ModuleId(self.modules.len() as u32);
        module.id = id;
        self.modules.push(module);
        id
    }

    pub fn module_mut(&mut self, id: ModuleId) -> Option<&mut Module> {
        self.modules.get_mut(id.index())
    }

    /// Every axiom of the closure.
    pub fn axioms(&self) -> impl Iterator<Item = &Axiom> {
        self.modules.iter().flat_map(|m| m.axioms.iter())
    }

    pub fn axiom_count(&self) -> usize {
        self.modules.iter().map(|m| m.axioms.len()).sum()
    }

    /// Told superclass expressions of `class`, per module in closure order.
    pub fn told_superclasses(&self, class: ConceptId) -> impl Iterator<Item = &ClassExpr> {
        self.axioms().filter_map(move |axiom| match axiom {
            Axiom::SubClassOf { sub, sup } if sub.as_named() == Some(class) => Some(sup),
            _ => None,
        })
    }

    /// Individuals asserted directly into `class`.
    pub fn asserted_individuals(&self, class: ConceptId) -> impl Iterator<Item = ConceptId> + '_ {
        self.axioms().filter_map(move |axiom| match axiom {
            Axiom::ClassAssertion {
                individual,
                class: ClassExpr::Named(c),
            } if *c == class => Some(*individual),
            _ => None,
        })
    }
}

impl Default for ConceptGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> ConceptId {
        ConceptId::new(raw).unwrap()
    }

    #[test]
    fn primary_is_first() {
        let mut graph = ConceptGraph::new();
        let imported = graph.push_module(Module::new(ModuleId(99)));
        assert_eq!(imported, ModuleId(1));
        assert!(graph.primary().id.is_primary());
        assert_eq!(graph.modules().len(), 2);
    }

    #[test]
    fn added_items_follow_baseline() {
        let mut module = Module::new(ModuleId::PRIMARY);
        module.declarations.push(id(3));
        module.seal();
        module.declarations.push(id(4));
        assert_eq!(module.added_declarations(), &[id(4)]);
        assert!(module.added_axioms().is_empty());
    }

    #[test]
    fn told_superclasses_scan_every_module() {
        let mut graph = ConceptGraph::new();
        let sup = ClassExpr::some(id(5), ClassExpr::Named(id(6)));
        graph.primary_mut().axioms.push(Axiom::SubClassOf {
            sub: ClassExpr::Named(id(3)),
            sup: ClassExpr::Named(id(4)),
        });
        let mut imported = Module::new(ModuleId(1));
        imported.axioms.push(Axiom::SubClassOf {
            sub: ClassExpr::Named(id(3)),
            sup: sup.clone(),
        });
        graph.push_module(imported);

        let supers: Vec<_> = graph.told_superclasses(id(3)).cloned().collect();
        assert_eq!(supers, vec![ClassExpr::Named(id(4)), sup]);
    }

    #[test]
    fn asserted_individuals_match_named_class() {
        let mut graph = ConceptGraph::new();
        graph.primary_mut().axioms.push(Axiom::ClassAssertion {
            individual: id(10),
            class: ClassExpr::Named(id(3)),
        });
        assert_eq!(graph.asserted_individuals(id(3)).collect::<Vec<_>>(), vec![id(10)]);
        assert_eq!(graph.asserted_individuals(id(4)).count(), 0);
    }
}
