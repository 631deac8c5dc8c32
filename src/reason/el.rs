//! EL classification by completion-rule saturation.
//!
//! Every class expression is reduced to an *atom*: named classes and
//! individuals map to their own atoms, and each distinct complex
//! sub-expression gets a fresh atom defined equivalent to it. Structurally
//! identical sub-expressions (conjunct order ignored) share one atom. The
//! resulting axioms are in the normal forms
//!
//! - `A1 ⊓ … ⊓ An ⊑ B`
//! - `A ⊑ ∃r.B`
//! - `∃r.A ⊑ B`
//!
//! and saturation applies the standard completion rules over a worklist.
//! New axioms are added incrementally: each new rule is replayed against the
//! atoms that already satisfy its premise, found through the inverse
//! subsumee index, so a flush never starts from scratch.
//!
//! Every mutation of the saturation state can be journaled. Queries intern
//! their expression under a journal and unwind it once answered, and a
//! failed flush unwinds the same way.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::concept::{ConceptId, ConceptKind};
use crate::error::{KbResult, ReasonError};
use crate::expr::ClassExpr;
use crate::graph::{Axiom, ConceptGraph};
use crate::vocab::Vocabulary;

use super::taxonomy::{ClassInfo, Node, Taxonomy};
use super::ReasoningBackend;

type Atom = usize;
type Role = usize;

const TOP: Atom = 0;
const BOTTOM: Atom = 1;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    And(Vec<Atom>),
    Some(Role, Atom),
}

#[derive(Debug, Clone, Copy)]
enum Task {
    /// `b` is a subsumer of `x`.
    Add(Atom, Atom),
    /// `x` has an `r`-successor `y`.
    Link(Atom, Role, Atom),
}

/// Inverse of one saturation mutation.
#[derive(Debug, Clone)]
enum Undo {
    Atom,
    Named(ConceptId),
    Role(ConceptId),
    Structural(Key),
    Told(Atom),
    Conjunction,
    ExistsRight(Atom),
    ExistsLeft(Role, Atom),
    Subsumer(Atom, Atom),
    Link(Atom, Role, Atom),
}

/// Saturation state.
#[derive(Debug, Clone, Default)]
struct Saturation {
    subsumers: Vec<HashSet<Atom>>,
    /// Inverse of `subsumers`: atom → atoms it subsumes.
    subsumees: Vec<Vec<Atom>>,
    told: Vec<Vec<Atom>>,
    conj_by_operand: Vec<Vec<usize>>,
    exists_right: Vec<Vec<(Role, Atom)>>,
    successors: Vec<HashSet<(Role, Atom)>>,
    predecessors: Vec<HashSet<(Role, Atom)>>,
    conjunctions: Vec<(Vec<Atom>, Atom)>,
    exists_left: HashMap<(Role, Atom), Vec<Atom>>,

    concept_of: Vec<Option<ConceptId>>,
    is_individual: Vec<bool>,
    named: HashMap<ConceptId, Atom>,
    roles: HashMap<ConceptId, Role>,
    structural: HashMap<Key, Atom>,
    queue: VecDeque<Task>,
    /// Open undo journal, if any.
    journal: Option<Vec<Undo>>,
}

impl Saturation {
    fn new() -> Self {
        let mut sat = Self::default();
        sat.new_atom(Some(ConceptId::THING), false);
        sat.new_atom(Some(ConceptId::NOTHING), false);
        sat.named.insert(ConceptId::THING, TOP);
        sat.named.insert(ConceptId::NOTHING, BOTTOM);
        sat
    }

    fn record(&mut self, undo: Undo) {
        if let Some(journal) = &mut self.journal {
            journal.push(undo);
        }
    }

    /// Start journaling. Returns the first atom index the journal may add.
    fn begin(&mut self) -> Atom {
        self.journal = Some(Vec::new());
        self.subsumers.len()
    }

    /// Close the journal and keep its mutations.
    fn commit(&mut self) -> Vec<Undo> {
        self.journal.take().unwrap_or_default()
    }

    /// Close the journal and unwind its mutations, newest first.
    fn rollback(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        self.queue.clear();
        for undo in journal.into_iter().rev() {
            self.undo(undo);
        }
    }

    fn undo(&mut self, undo: Undo) {
        match undo {
            Undo::Atom => {
                self.subsumers.pop();
                self.subsumees.pop();
                self.told.pop();
                self.conj_by_operand.pop();
                self.exists_right.pop();
                self.successors.pop();
                self.predecessors.pop();
                self.concept_of.pop();
                self.is_individual.pop();
            }
            Undo::Named(id) => {
                self.named.remove(&id);
            }
            Undo::Role(id) => {
                self.roles.remove(&id);
            }
            Undo::Structural(key) => {
                self.structural.remove(&key);
            }
            Undo::Told(sub) => {
                self.told[sub].pop();
            }
            Undo::Conjunction => {
                if let Some((operands, _)) = self.conjunctions.pop() {
                    for operand in operands {
                        self.conj_by_operand[operand].pop();
                    }
                }
            }
            Undo::ExistsRight(sub) => {
                self.exists_right[sub].pop();
            }
            Undo::ExistsLeft(role, filler) => {
                if let Some(sups) = self.exists_left.get_mut(&(role, filler)) {
                    sups.pop();
                    if sups.is_empty() {
                        self.exists_left.remove(&(role, filler));
                    }
                }
            }
            Undo::Subsumer(x, a) => {
                self.subsumers[x].remove(&a);
                self.subsumees[a].pop();
            }
            Undo::Link(x, r, y) => {
                self.successors[x].remove(&(r, y));
                self.predecessors[y].remove(&(r, x));
            }
        }
    }

    fn new_atom(&mut self, concept: Option<ConceptId>, individual: bool) -> Atom {
        let atom = self.subsumers.len();
        self.subsumers.push(HashSet::new());
        self.subsumees.push(Vec::new());
        self.told.push(Vec::new());
        self.conj_by_operand.push(Vec::new());
        self.exists_right.push(Vec::new());
        self.successors.push(HashSet::new());
        self.predecessors.push(HashSet::new());
        self.concept_of.push(concept);
        self.is_individual.push(individual);
        self.queue.push_back(Task::Add(atom, atom));
        self.queue.push_back(Task::Add(atom, TOP));
        self.record(Undo::Atom);
        atom
    }

    fn atom_for(&mut self, id: ConceptId, kind: ConceptKind) -> Atom {
        if let Some(atom) = self.named.get(&id) {
            return *atom;
        }
        let atom = self.new_atom(Some(id), kind == ConceptKind::Individual);
        self.named.insert(id, atom);
        self.record(Undo::Named(id));
        atom
    }

    fn role_for(&mut self, id: ConceptId) -> Role {
        if let Some(role) = self.roles.get(&id) {
            return *role;
        }
        let role = self.roles.len();
        self.roles.insert(id, role);
        self.record(Undo::Role(id));
        role
    }

    fn intern(&mut self, expr: &ClassExpr) -> Atom {
        match expr {
            ClassExpr::Thing => TOP,
            ClassExpr::Named(id) => self.atom_for(*id, ConceptKind::Class),
            ClassExpr::And(ops) => {
                let mut operands: Vec<Atom> = ops.iter().map(|op| self.intern(op)).collect();
                operands.sort_unstable();
                operands.dedup();
                match operands.as_slice() {
                    [] => return TOP,
                    [only] => return *only,
                    _ => {}
                }
                let key = Key::And(operands.clone());
                if let Some(atom) = self.structural.get(&key) {
                    return *atom;
                }
                let atom = self.new_atom(None, false);
                self.structural.insert(key.clone(), atom);
                self.record(Undo::Structural(key));
                for operand in &operands {
                    self.add_told(atom, *operand);
                }
                self.add_conjunction(operands, atom);
                atom
            }
            ClassExpr::Some { relation, filler } => {
                let role = self.role_for(*relation);
                let filler = self.intern(filler);
                let key = Key::Some(role, filler);
                if let Some(atom) = self.structural.get(&key) {
                    return *atom;
                }
                let atom = self.new_atom(None, false);
                self.structural.insert(key.clone(), atom);
                self.record(Undo::Structural(key));
                self.add_exists_right(atom, role, filler);
                self.add_exists_left(role, filler, atom);
                atom
            }
        }
    }

    fn add_told(&mut self, sub: Atom, sup: Atom) {
        if sub == sup || self.told[sub].contains(&sup) {
            return;
        }
        self.told[sub].push(sup);
        self.record(Undo::Told(sub));
        for x in self.subsumees[sub].clone() {
            self.queue.push_back(Task::Add(x, sup));
        }
    }

    fn add_conjunction(&mut self, operands: Vec<Atom>, sup: Atom) {
        let idx = self.conjunctions.len();
        for operand in &operands {
            self.conj_by_operand[*operand].push(idx);
        }
        let first = operands[0];
        for x in &self.subsumees[first] {
            if operands.iter().all(|o| self.subsumers[*x].contains(o)) {
                self.queue.push_back(Task::Add(*x, sup));
            }
        }
        self.conjunctions.push((operands, sup));
        self.record(Undo::Conjunction);
    }

    fn add_exists_right(&mut self, sub: Atom, role: Role, filler: Atom) {
        self.exists_right[sub].push((role, filler));
        self.record(Undo::ExistsRight(sub));
        for x in self.subsumees[sub].clone() {
            self.queue.push_back(Task::Link(x, role, filler));
        }
    }

    fn add_exists_left(&mut self, role: Role, filler: Atom, sup: Atom) {
        self.exists_left.entry((role, filler)).or_default().push(sup);
        self.record(Undo::ExistsLeft(role, filler));
        for y in &self.subsumees[filler] {
            for (r, x) in &self.predecessors[*y] {
                if *r == role {
                    self.queue.push_back(Task::Add(*x, sup));
                }
            }
        }
    }

    fn add_axiom(&mut self, axiom: &Axiom) {
        match axiom {
            Axiom::SubClassOf { sub, sup } => {
                let (a, b) = (self.intern(sub), self.intern(sup));
                self.add_told(a, b);
            }
            Axiom::EquivalentClasses(left, right) => {
                let (a, b) = (self.intern(left), self.intern(right));
                self.add_told(a, b);
                self.add_told(b, a);
            }
            Axiom::ClassAssertion { individual, class } => {
                let a = self.atom_for(*individual, ConceptKind::Individual);
                let b = self.intern(class);
                self.add_told(a, b);
            }
        }
    }

    fn saturate(&mut self) {
        let mut derived = Vec::new();
        while let Some(task) = self.queue.pop_front() {
            match task {
                Task::Add(x, a) => {
                    if !self.subsumers[x].insert(a) {
                        continue;
                    }
                    self.subsumees[a].push(x);
                    self.record(Undo::Subsumer(x, a));

                    derived.extend(self.told[a].iter().map(|b| Task::Add(x, *b)));
                    for idx in &self.conj_by_operand[a] {
                        let (operands, sup) = &self.conjunctions[*idx];
                        if operands.iter().all(|o| self.subsumers[x].contains(o)) {
                            derived.push(Task::Add(x, *sup));
                        }
                    }
                    derived.extend(self.exists_right[a].iter().map(|(r, b)| Task::Link(x, *r, *b)));
                    for (r, z) in &self.predecessors[x] {
                        if let Some(sups) = self.exists_left.get(&(*r, a)) {
                            derived.extend(sups.iter().map(|b| Task::Add(*z, *b)));
                        }
                        if a == BOTTOM {
                            derived.push(Task::Add(*z, BOTTOM));
                        }
                    }
                }
                Task::Link(x, r, y) => {
                    if !self.successors[x].insert((r, y)) {
                        continue;
                    }
                    self.predecessors[y].insert((r, x));
                    self.record(Undo::Link(x, r, y));
                    for a in &self.subsumers[y] {
                        if let Some(sups) = self.exists_left.get(&(r, *a)) {
                            derived.extend(sups.iter().map(|b| Task::Add(x, *b)));
                        }
                        if *a == BOTTOM {
                            derived.push(Task::Add(x, BOTTOM));
                        }
                    }
                }
            }
            self.queue.extend(derived.drain(..));
        }
    }

    fn is_unsatisfiable(&self, atom: Atom) -> bool {
        self.subsumers[atom].contains(&BOTTOM)
    }

    fn check_consistency(&self) -> KbResult<()> {
        if self.is_unsatisfiable(TOP) {
            return Err(ReasonError::Inconsistent {
                detail: "owl:Thing is unsatisfiable".into(),
            }
            .into());
        }
        if let Some(atom) = (0..self.subsumers.len())
            .find(|a| self.is_individual[*a] && self.is_unsatisfiable(*a))
        {
            return Err(ReasonError::Inconsistent {
                detail: format!(
                    "individual {} is unsatisfiable",
                    self.concept_of[atom].map(|c| c.to_string()).unwrap_or_default()
                ),
            }
            .into());
        }
        Ok(())
    }

    fn named_class(&self, atom: Atom) -> Option<ConceptId> {
        if self.is_individual[atom] {
            return None;
        }
        self.concept_of[atom]
    }

    /// Whether named class `sub` is subsumed by named class `sup`.
    fn named_subsumed(&self, sub: ConceptId, sup: ConceptId) -> bool {
        if sub == sup || sup == ConceptId::THING {
            return true;
        }
        match (self.named.get(&sub), self.named.get(&sup)) {
            (Some(a), Some(b)) => self.subsumers[*a].contains(b),
            _ => false,
        }
    }

    fn class_info(&self, atom: Atom) -> Option<ClassInfo> {
        let id = self.named_class(atom)?;
        let subsumers = self.subsumers[atom]
            .iter()
            .filter_map(|s| self.named_class(*s))
            .collect::<BTreeSet<_>>();
        Some(ClassInfo {
            id,
            subsumers,
            unsatisfiable: atom != BOTTOM && self.is_unsatisfiable(atom),
        })
    }

    fn class_infos(&self) -> Vec<ClassInfo> {
        (0..self.subsumers.len())
            .filter_map(|atom| self.class_info(atom))
            .collect()
    }
}

/// In-process EL reasoner.
#[derive(Debug, Clone)]
pub struct ElReasoner {
    sat: Saturation,
    taxonomy: Taxonomy,
}

impl ElReasoner {
    pub fn new() -> Self {
        let mut sat = Saturation::new();
        sat.saturate();
        let taxonomy = Taxonomy::build(&sat.class_infos());
        Self { sat, taxonomy }
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    fn validate(axiom: &Axiom, vocab: &Vocabulary) -> KbResult<()> {
        let check_expr = |expr: &ClassExpr| -> KbResult<()> {
            let mut stack = vec![expr];
            while let Some(e) = stack.pop() {
                match e {
                    ClassExpr::Thing => {}
                    ClassExpr::Named(id) => expect_kind(vocab, *id, ConceptKind::Class)?,
                    ClassExpr::And(ops) => {
                        if ops.is_empty() {
                            return Err(unsupported("empty conjunction"));
                        }
                        stack.extend(ops.iter());
                    }
                    ClassExpr::Some { relation, filler } => {
                        expect_kind(vocab, *relation, ConceptKind::Relation)?;
                        stack.push(filler.as_ref());
                    }
                }
            }
            Ok(())
        };
        match axiom {
            Axiom::SubClassOf { sub, sup } | Axiom::EquivalentClasses(sub, sup) => {
                check_expr(sub)?;
                check_expr(sup)
            }
            Axiom::ClassAssertion { individual, class } => {
                expect_kind(vocab, *individual, ConceptKind::Individual)?;
                check_expr(class)
            }
        }
    }

    fn register_declared(&mut self, vocab: &Vocabulary) {
        for concept in vocab.all() {
            match concept.kind {
                ConceptKind::Class | ConceptKind::Individual => {
                    self.sat.atom_for(concept.id, concept.kind);
                }
                ConceptKind::Relation => {
                    self.sat.role_for(concept.id);
                }
            }
        }
    }

    fn rebuild_taxonomy(&mut self) {
        self.taxonomy = Taxonomy::build(&self.sat.class_infos());
    }

    /// Bring the taxonomy up to date after a committed flush.
    ///
    /// A single new named class that leaves the subsumptions between older
    /// named classes untouched is placed in the existing taxonomy. Anything
    /// else rebuilds it.
    fn update_taxonomy(&mut self, mark: Atom, journal: &[Undo]) {
        let sat = &self.sat;
        let reshaped = journal.iter().any(|undo| {
            matches!(undo, Undo::Subsumer(x, a)
                if *x < mark && *a < mark
                    && sat.named_class(*x).is_some()
                    && sat.named_class(*a).is_some())
        });
        let added: Vec<Atom> = (mark..sat.subsumers.len())
            .filter(|a| sat.named_class(*a).is_some())
            .collect();
        match added.as_slice() {
            [] if !reshaped => {}
            [atom] if !reshaped => {
                let Some(info) = sat.class_info(*atom) else {
                    return;
                };
                let below: BTreeSet<ConceptId> = sat.subsumees[*atom]
                    .iter()
                    .filter_map(|s| sat.named_class(*s))
                    .collect();
                self.taxonomy
                    .insert(&info, &below, |sub, sup| sat.named_subsumed(sub, sup));
            }
            _ => self.rebuild_taxonomy(),
        }
    }

    /// Answer a query about `expr` without keeping what interning it added.
    fn with_query<T>(&mut self, expr: &ClassExpr, answer: impl FnOnce(&Self, Atom) -> T) -> T {
        self.sat.begin();
        let atom = self.sat.intern(expr);
        self.sat.saturate();
        let out = answer(self, atom);
        self.sat.rollback();
        out
    }

    fn nodes_of(&self, atoms: impl IntoIterator<Item = Atom>) -> Vec<petgraph::graph::NodeIndex> {
        let mut nodes: Vec<_> = atoms
            .into_iter()
            .filter_map(|a| self.sat.named_class(a))
            .filter_map(|c| self.taxonomy.node_of(c))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        nodes.sort_by_key(|n| self.taxonomy.representative(*n));
        nodes
    }

    fn equivalent_node(&self, atom: Atom) -> Option<petgraph::graph::NodeIndex> {
        if self.sat.is_unsatisfiable(atom) {
            return Some(self.taxonomy.bottom());
        }
        self.sat.subsumers[atom]
            .iter()
            .copied()
            .filter(|s| self.sat.subsumers[*s].contains(&atom))
            .filter_map(|s| self.sat.named_class(s))
            .find_map(|c| self.taxonomy.node_of(c))
    }

    fn to_nodes(&self, nodes: Vec<petgraph::graph::NodeIndex>) -> Vec<Node> {
        nodes
            .into_iter()
            .map(|n| self.taxonomy.members(n).to_vec())
            .collect()
    }
}

impl Default for ElReasoner {
    fn default() -> Self {
        Self::new()
    }
}

fn unsupported(detail: impl Into<String>) -> crate::error::KbError {
    ReasonError::Unsupported {
        detail: detail.into(),
    }
    .into()
}

fn expect_kind(vocab: &Vocabulary, id: ConceptId, kind: ConceptKind) -> KbResult<()> {
    match vocab.kind_of(id) {
        Some(found) if found == kind => Ok(()),
        Some(found) => Err(unsupported(format!(
            "{} is a {found}, expected {kind}",
            vocab.short_id(id)
        ))),
        None => Err(unsupported(format!("{id} is not registered"))),
    }
}

impl ReasoningBackend for ElReasoner {
    fn name(&self) -> &'static str {
        "el-saturation"
    }

    fn classify(&mut self, graph: &ConceptGraph, vocab: &Vocabulary) -> KbResult<()> {
        let start = std::time::Instant::now();
        self.sat = Saturation::new();
        self.register_declared(vocab);

        let mut skipped = 0usize;
        for axiom in graph.axioms() {
            if let Err(e) = Self::validate(axiom, vocab) {
                tracing::warn!(error = %e, "skipping axiom outside the EL fragment");
                skipped += 1;
                continue;
            }
            self.sat.add_axiom(axiom);
        }
        self.sat.saturate();
        self.sat.check_consistency()?;
        self.rebuild_taxonomy();

        tracing::info!(
            atoms = self.sat.subsumers.len(),
            taxonomy_nodes = self.taxonomy.node_count(),
            skipped,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "classification complete"
        );
        Ok(())
    }

    fn flush(&mut self, axioms: &[Axiom], vocab: &Vocabulary) -> KbResult<()> {
        for axiom in axioms {
            Self::validate(axiom, vocab)?;
        }
        let mark = self.sat.begin();
        self.register_declared(vocab);
        for axiom in axioms {
            self.sat.add_axiom(axiom);
        }
        self.sat.saturate();
        if let Err(e) = self.sat.check_consistency() {
            self.sat.rollback();
            return Err(e);
        }
        let journal = self.sat.commit();
        self.update_taxonomy(mark, &journal);
        Ok(())
    }

    fn sub_classes(&mut self, expr: &ClassExpr, direct: bool) -> KbResult<Vec<Node>> {
        Ok(self.with_query(expr, |r, atom| {
            let own = r.equivalent_node(atom);
            let bottom = r.taxonomy.bottom();
            let candidates: Vec<_> = r
                .nodes_of(r.sat.subsumees[atom].iter().copied())
                .into_iter()
                .filter(|n| Some(*n) != own && *n != bottom)
                .collect();
            let chosen = if direct {
                let set: HashSet<_> = candidates.iter().copied().collect();
                candidates
                    .into_iter()
                    .filter(|n| !r.taxonomy.parents(*n).any(|p| set.contains(&p)))
                    .collect()
            } else {
                candidates
            };
            r.to_nodes(chosen)
        }))
    }

    fn super_classes(&mut self, expr: &ClassExpr, direct: bool) -> KbResult<Vec<Node>> {
        Ok(self.with_query(expr, |r, atom| {
            let own = r.equivalent_node(atom);
            let candidates: Vec<_> = r
                .nodes_of(r.sat.subsumers[atom].iter().copied())
                .into_iter()
                .filter(|n| Some(*n) != own)
                .collect();
            let chosen = if direct {
                let set: HashSet<_> = candidates.iter().copied().collect();
                candidates
                    .into_iter()
                    .filter(|n| !r.taxonomy.children(*n).any(|c| set.contains(&c)))
                    .collect()
            } else {
                candidates
            };
            r.to_nodes(chosen)
        }))
    }

    fn equivalent_classes(&mut self, expr: &ClassExpr) -> KbResult<Node> {
        Ok(self.with_query(expr, |r, atom| {
            r.equivalent_node(atom)
                .map(|n| r.taxonomy.members(n).to_vec())
                .unwrap_or_default()
        }))
    }

    fn instances(&mut self, expr: &ClassExpr, direct: bool) -> KbResult<Vec<ConceptId>> {
        Ok(self.with_query(expr, |r, atom| {
            let sat = &r.sat;
            let mut found: Vec<ConceptId> = sat.subsumees[atom]
                .iter()
                .copied()
                .filter(|a| sat.is_individual[*a])
                .filter(|a| {
                    !direct
                        || !sat.subsumers[*a].iter().any(|t| {
                            // a strictly more specific named type rules out a direct instance
                            *t != atom
                                && sat.named_class(*t).is_some()
                                && sat.subsumers[*t].contains(&atom)
                                && !sat.subsumers[atom].contains(t)
                        })
                })
                .filter_map(|a| sat.concept_of[a])
                .collect();
            found.sort();
            found
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concept::ModuleId;

    struct Kb {
        vocab: Vocabulary,
        graph: ConceptGraph,
    }

    impl Kb {
        fn new() -> Self {
            Self {
                vocab: Vocabulary::new(),
                graph: ConceptGraph::new(),
            }
        }

        fn entity(&self, name: &str, kind: ConceptKind) -> ConceptId {
            self.vocab
                .register(&format!("http://example.org/kb#{name}"), kind, ModuleId::PRIMARY)
                .unwrap()
                .id
        }

        fn class(&self, name: &str) -> ClassExpr {
            ClassExpr::Named(self.entity(name, ConceptKind::Class))
        }

        fn sub(&mut self, sub: ClassExpr, sup: ClassExpr) {
            self.graph.primary_mut().axioms.push(Axiom::SubClassOf { sub, sup });
        }

        fn classify(&self) -> ElReasoner {
            let mut reasoner = ElReasoner::new();
            reasoner.classify(&self.graph, &self.vocab).unwrap();
            reasoner
        }

        fn reps(&self, nodes: Vec<Node>) -> Vec<String> {
            nodes.into_iter().map(|n| self.vocab.short_id(n[0])).collect()
        }
    }

    /// Organ ⊒ Heart; Blood; part_of; HeartBlood ≡ Blood ⊓ ∃part_of.Heart
    fn anatomy() -> Kb {
        let mut kb = Kb::new();
        let organ = kb.class("Organ");
        let heart = kb.class("Heart");
        let blood = kb.class("Blood");
        let part_of = kb.entity("part_of", ConceptKind::Relation);
        kb.sub(heart.clone(), organ);
        let hb = kb.class("HeartBlood");
        kb.graph.primary_mut().axioms.push(Axiom::EquivalentClasses(
            hb,
            ClassExpr::and([blood, ClassExpr::some(part_of, heart)]),
        ));
        kb
    }

    #[test]
    fn told_hierarchy_is_classified() {
        let kb = anatomy();
        let mut r = kb.classify();
        let heart = kb.class("Heart");
        let supers = r.super_classes(&heart, true).unwrap();
        assert_eq!(kb.reps(supers), vec!["Organ"]);
        let subs = r.sub_classes(&kb.class("Organ"), false).unwrap();
        assert_eq!(kb.reps(subs), vec!["Heart"]);
    }

    #[test]
    fn defined_class_is_recognized_for_anonymous_query() {
        let kb = anatomy();
        let mut r = kb.classify();
        let part_of = kb.vocab.lookup("part_of").unwrap();
        let query = ClassExpr::and([
            ClassExpr::some(part_of, kb.class("Heart")),
            kb.class("Blood"),
        ]);
        let eq = r.equivalent_classes(&query).unwrap();
        assert_eq!(kb.reps(vec![eq]), vec!["HeartBlood"]);
    }

    #[test]
    fn existential_propagates_through_filler_hierarchy() {
        // ∃part_of.Heart ⊑ ∃part_of.Organ
        let kb = anatomy();
        let mut r = kb.classify();
        let part_of = kb.vocab.lookup("part_of").unwrap();
        let in_organ = ClassExpr::some(part_of, kb.class("Organ"));
        let subs = r.sub_classes(&in_organ, false).unwrap();
        assert_eq!(kb.reps(subs), vec!["HeartBlood"]);
    }

    #[test]
    fn anonymous_query_without_equivalent() {
        let kb = anatomy();
        let mut r = kb.classify();
        let query = ClassExpr::and([kb.class("Heart"), kb.class("Blood")]);
        assert!(r.equivalent_classes(&query).unwrap().is_empty());
        let supers = r.super_classes(&query, true).unwrap();
        assert_eq!(kb.reps(supers), vec!["Heart", "Blood"]);
    }

    #[test]
    fn leaves_have_no_subclasses() {
        let kb = anatomy();
        let mut r = kb.classify();
        assert!(r.sub_classes(&kb.class("Heart"), true).unwrap().is_empty());
    }

    #[test]
    fn flush_adds_incrementally() {
        let kb = anatomy();
        let mut r = kb.classify();
        let ventricle = kb.class("Ventricle");
        let axiom = Axiom::SubClassOf {
            sub: ventricle.clone(),
            sup: kb.class("Heart"),
        };
        r.flush(&[axiom], &kb.vocab).unwrap();
        let supers = r.super_classes(&ventricle, false).unwrap();
        let mut names = kb.reps(supers);
        names.sort();
        assert_eq!(names, vec!["Heart", "Organ", "Thing"]);
    }

    #[test]
    fn instances_follow_subsumption() {
        let kb = anatomy();
        let sample = kb.entity("sample1", ConceptKind::Individual);
        let mut kb = kb;
        let heart = kb.class("Heart");
        kb.graph.primary_mut().axioms.push(Axiom::ClassAssertion {
            individual: sample,
            class: heart.clone(),
        });
        let mut r = kb.classify();
        assert_eq!(r.instances(&kb.class("Organ"), false).unwrap(), vec![sample]);
        assert!(r.instances(&kb.class("Organ"), true).unwrap().is_empty());
        assert_eq!(r.instances(&heart, true).unwrap(), vec![sample]);
    }

    #[test]
    fn inconsistent_flush_is_rolled_back() {
        let kb = anatomy();
        let sample = kb.entity("sample1", ConceptKind::Individual);
        let mut r = kb.classify();
        let bad = Axiom::ClassAssertion {
            individual: sample,
            class: ClassExpr::Named(ConceptId::NOTHING),
        };
        assert!(r.flush(&[bad], &kb.vocab).is_err());
        // the previous state still answers
        assert_eq!(r.instances(&ClassExpr::Thing, false).unwrap(), vec![sample]);
        assert!(r.equivalent_classes(&ClassExpr::Thing).unwrap().contains(&ConceptId::THING));
    }

    fn footprint(r: &ElReasoner) -> (usize, usize, usize, usize) {
        let sat = &r.sat;
        (
            sat.subsumers.len(),
            sat.subsumers.iter().map(HashSet::len).sum(),
            sat.structural.len(),
            sat.successors.iter().map(HashSet::len).sum(),
        )
    }

    #[test]
    fn queries_leave_saturation_unchanged() {
        let mut kb = anatomy();
        let part_of = kb.vocab.lookup("part_of").unwrap();
        let organ = kb.class("Organ");
        let classes: Vec<ClassExpr> = (0..40)
            .map(|i| {
                let class = kb.class(&format!("C{i}"));
                kb.sub(class.clone(), organ.clone());
                class
            })
            .collect();
        let mut r = kb.classify();
        let before = footprint(&r);

        for (i, a) in classes.iter().enumerate() {
            for b in &classes[i + 1..] {
                let query = ClassExpr::and([a.clone(), ClassExpr::some(part_of, b.clone())]);
                r.sub_classes(&query, true).unwrap();
                r.super_classes(&query, true).unwrap();
            }
            r.equivalent_classes(&ClassExpr::and([a.clone(), kb.class("Blood")])).unwrap();
            r.instances(&ClassExpr::some(part_of, a.clone()), false).unwrap();
        }

        assert_eq!(footprint(&r), before);
        assert!(r.sat.journal.is_none());
        let query = ClassExpr::and([kb.class("Blood"), ClassExpr::some(part_of, kb.class("Heart"))]);
        assert_eq!(kb.reps(vec![r.equivalent_classes(&query).unwrap()]), vec!["HeartBlood"]);
    }

    fn shape(kb: &Kb, r: &ElReasoner) -> Vec<(String, Vec<String>, Vec<String>)> {
        let tax = r.taxonomy();
        kb.vocab
            .all()
            .into_iter()
            .filter(|c| c.is_class())
            .map(|c| {
                let node = tax.node_of(c.id).unwrap();
                let names = |ids: Vec<ConceptId>| {
                    let mut out: Vec<String> = ids.into_iter().map(|id| kb.vocab.short_id(id)).collect();
                    out.sort();
                    out
                };
                let members = names(tax.members(node).to_vec());
                let children = names(tax.children(node).map(|n| tax.representative(n)).collect());
                (c.short_id, members, children)
            })
            .collect()
    }

    #[test]
    fn incremental_taxonomy_matches_rebuild() {
        let mut kb = anatomy();
        let part_of = kb.vocab.lookup("part_of").unwrap();
        let mut r = kb.classify();

        // OrganBlood sits between Blood and HeartBlood.
        let organ_blood = kb.class("OrganBlood");
        let definition = Axiom::EquivalentClasses(
            organ_blood,
            ClassExpr::and([kb.class("Blood"), ClassExpr::some(part_of, kb.class("Organ"))]),
        );
        r.flush(std::slice::from_ref(&definition), &kb.vocab).unwrap();

        // A second name for Heart joins its node.
        let cor = kb.class("Cor");
        let synonym = Axiom::EquivalentClasses(cor, kb.class("Heart"));
        r.flush(std::slice::from_ref(&synonym), &kb.vocab).unwrap();

        kb.graph.primary_mut().axioms.extend([definition, synonym]);
        let rebuilt = kb.classify();
        assert_eq!(shape(&kb, &r), shape(&kb, &rebuilt));
        let blood = r.taxonomy().node_of(kb.vocab.lookup("Blood").unwrap()).unwrap();
        let below_blood: Vec<_> = r.taxonomy().children(blood).map(|n| r.taxonomy().representative(n)).collect();
        assert_eq!(below_blood, vec![kb.vocab.lookup("OrganBlood").unwrap()]);
    }

    #[test]
    fn rejected_flush_unwinds_new_atoms() {
        let kb = anatomy();
        let sample = kb.entity("sample1", ConceptKind::Individual);
        let mut r = kb.classify();
        let before = footprint(&r);
        let bad = Axiom::ClassAssertion {
            individual: sample,
            class: ClassExpr::and([kb.class("Heart"), ClassExpr::Named(ConceptId::NOTHING)]),
        };
        assert!(r.flush(&[bad], &kb.vocab).is_err());
        assert_eq!(footprint(&r), before);
    }

    #[test]
    fn flush_rejects_ill_typed_axioms() {
        let kb = anatomy();
        let mut r = kb.classify();
        let heart = kb.vocab.lookup("Heart").unwrap();
        let bad = Axiom::SubClassOf {
            sub: kb.class("Blood"),
            sup: ClassExpr::some(heart, ClassExpr::Thing),
        };
        assert!(r.flush(&[bad], &kb.vocab).is_err());
    }
}
