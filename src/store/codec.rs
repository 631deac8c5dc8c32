//! OWL-in-RDF codec.
//!
//! Decoding walks the triples of one document and lifts the EL fragment into
//! a [`Module`]: declarations, `rdfs:subClassOf`, `owl:equivalentClass`,
//! class assertions and `rdfs:label`. Anonymous class expressions are read
//! from `owl:intersectionOf` lists and `owl:someValuesFrom` restrictions.
//! Anything outside the fragment is skipped with a debug line.
//!
//! Encoding is the reverse, but only for what was appended after load; the
//! loaded triples are re-emitted verbatim by the store.

use std::collections::HashMap;

use oxigraph::model::{BlankNode, Literal, NamedNode, Term, Triple};

use crate::concept::{ConceptId, ConceptKind, ModuleId, OWL_NOTHING, OWL_THING};
use crate::error::KbResult;
use crate::expr::ClassExpr;
use crate::graph::{Axiom, Module};
use crate::vocab::Vocabulary;

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const RDF_FIRST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#first";
pub const RDF_REST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#rest";
pub const RDF_NIL: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#nil";
pub const RDFS_LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";
pub const RDFS_SUBCLASS_OF: &str = "http://www.w3.org/2000/01/rdf-schema#subClassOf";
pub const OWL_ONTOLOGY: &str = "http://www.w3.org/2002/07/owl#Ontology";
pub const OWL_IMPORTS: &str = "http://www.w3.org/2002/07/owl#imports";
pub const OWL_CLASS: &str = "http://www.w3.org/2002/07/owl#Class";
pub const OWL_OBJECT_PROPERTY: &str = "http://www.w3.org/2002/07/owl#ObjectProperty";
pub const OWL_NAMED_INDIVIDUAL: &str = "http://www.w3.org/2002/07/owl#NamedIndividual";
pub const OWL_RESTRICTION: &str = "http://www.w3.org/2002/07/owl#Restriction";
pub const OWL_ON_PROPERTY: &str = "http://www.w3.org/2002/07/owl#onProperty";
pub const OWL_SOME_VALUES_FROM: &str = "http://www.w3.org/2002/07/owl#someValuesFrom";
pub const OWL_INTERSECTION_OF: &str = "http://www.w3.org/2002/07/owl#intersectionOf";
pub const OWL_EQUIVALENT_CLASS: &str = "http://www.w3.org/2002/07/owl#equivalentClass";

const BUILTIN_NAMESPACES: [&str; 4] = [
    "http://www.w3.org/2002/07/owl#",
    "http://www.w3.org/1999/02/22-rdf-syntax-ns#",
    "http://www.w3.org/2000/01/rdf-schema#",
    "http://www.w3.org/2001/XMLSchema#",
];

/// Nesting limit for anonymous expressions.
const MAX_DEPTH: usize = 32;

fn is_builtin(iri: &str) -> bool {
    BUILTIN_NAMESPACES.iter().any(|ns| iri.starts_with(ns))
}

fn named(iri: &str) -> NamedNode {
    NamedNode::new_unchecked(iri)
}

/// Triples of one document, indexed by subject.
struct Document<'t> {
    by_subject: HashMap<Term, Vec<(&'t str, &'t Term)>>,
}

impl<'t> Document<'t> {
    fn index(triples: &'t [Triple]) -> Self {
        let mut by_subject: HashMap<Term, Vec<(&'t str, &'t Term)>> = HashMap::new();
        for t in triples {
            by_subject
                .entry(Term::from(t.subject.clone()))
                .or_default()
                .push((t.predicate.as_str(), &t.object));
        }
        Self { by_subject }
    }

    fn objects(&self, subject: &Term, predicate: &str) -> impl Iterator<Item = &'t Term> + '_ {
        let predicate = predicate.to_string();
        self.by_subject
            .get(subject)
            .into_iter()
            .flatten()
            .filter(move |(p, _)| *p == predicate)
            .map(|(_, o)| *o)
    }

    fn object(&self, subject: &Term, predicate: &str) -> Option<&'t Term> {
        self.objects(subject, predicate).next()
    }

    fn has_type(&self, subject: &Term, class: &str) -> bool {
        self.objects(subject, RDF_TYPE)
            .any(|o| matches!(o, Term::NamedNode(n) if n.as_str() == class))
    }

    /// Items of an `rdf:List`.
    fn list(&self, head: &Term) -> Option<Vec<&'t Term>> {
        let mut items = Vec::new();
        let mut cursor = head.clone();
        for _ in 0..4096 {
            if matches!(&cursor, Term::NamedNode(n) if n.as_str() == RDF_NIL) {
                return Some(items);
            }
            items.push(self.object(&cursor, RDF_FIRST)?);
            cursor = self.object(&cursor, RDF_REST)?.clone();
        }
        None
    }
}

/// Lifts the EL fragment of one document into a module.
struct Decoder<'a, 't> {
    doc: Document<'t>,
    vocab: &'a Vocabulary,
    module: Module,
    skipped: usize,
}

impl<'a, 't> Decoder<'a, 't> {
    fn register(&mut self, iri: &str, kind: ConceptKind) -> KbResult<ConceptId> {
        Ok(self.vocab.register(iri, kind, self.module.id)?.id)
    }

    fn class_expr(&mut self, term: &Term, depth: usize) -> KbResult<Option<ClassExpr>> {
        if depth > MAX_DEPTH {
            tracing::debug!(depth, "class expression nested too deeply, skipped");
            return Ok(None);
        }
        match term {
            Term::NamedNode(n) => match n.as_str() {
                OWL_THING => Ok(Some(ClassExpr::Thing)),
                OWL_NOTHING => Ok(Some(ClassExpr::Named(ConceptId::NOTHING))),
                iri if is_builtin(iri) => Ok(None),
                iri => Ok(Some(ClassExpr::named(self.register(iri, ConceptKind::Class)?))),
            },
            Term::BlankNode(_) => {
                if let Some(list) = self.doc.object(term, OWL_INTERSECTION_OF) {
                    let Some(items) = self.doc.list(list) else {
                        return Ok(None);
                    };
                    let mut operands = Vec::with_capacity(items.len());
                    for item in items {
                        match self.class_expr(item, depth + 1)? {
                            Some(op) => operands.push(op),
                            None => return Ok(None),
                        }
                    }
                    return Ok(Some(ClassExpr::and(operands)));
                }
                let property = self.doc.object(term, OWL_ON_PROPERTY);
                let filler = self.doc.object(term, OWL_SOME_VALUES_FROM);
                match (property, filler) {
                    (Some(Term::NamedNode(p)), Some(f)) => {
                        let relation = self.register(p.as_str(), ConceptKind::Relation)?;
                        Ok(self
                            .class_expr(f, depth + 1)?
                            .map(|filler| ClassExpr::some(relation, filler)))
                    }
                    _ => Ok(None),
                }
            }
            _ => Ok(None),
        }
    }

    fn declarations(&mut self, subjects: &[NamedNode]) -> KbResult<()> {
        for subject in subjects {
            let term = Term::NamedNode(subject.clone());
            let kind = if self.doc.has_type(&term, OWL_CLASS) {
                ConceptKind::Class
            } else if self.doc.has_type(&term, OWL_OBJECT_PROPERTY) {
                ConceptKind::Relation
            } else if self.doc.has_type(&term, OWL_NAMED_INDIVIDUAL) {
                ConceptKind::Individual
            } else {
                continue;
            };
            if is_builtin(subject.as_str()) {
                continue;
            }
            let id = self.register(subject.as_str(), kind)?;
            self.module.declarations.push(id);
        }
        Ok(())
    }

    fn axioms(&mut self, subjects: &[NamedNode]) -> KbResult<()> {
        for subject in subjects {
            if is_builtin(subject.as_str()) {
                continue;
            }
            let term = Term::NamedNode(subject.clone());
            let entries = self.doc.by_subject.get(&term).cloned().unwrap_or_default();
            for (predicate, object) in entries {
                match predicate {
                    RDFS_SUBCLASS_OF | OWL_EQUIVALENT_CLASS => {
                        let sub = ClassExpr::named(self.register(subject.as_str(), ConceptKind::Class)?);
                        let Some(sup) = self.class_expr(object, 0)? else {
                            self.skipped += 1;
                            continue;
                        };
                        self.module.axioms.push(if predicate == RDFS_SUBCLASS_OF {
                            Axiom::SubClassOf { sub, sup }
                        } else {
                            Axiom::EquivalentClasses(sub, sup)
                        });
                    }
                    RDF_TYPE => match object {
                        Term::NamedNode(class) if !is_builtin(class.as_str()) => {
                            let individual = self.register(subject.as_str(), ConceptKind::Individual)?;
                            let class = ClassExpr::named(self.register(class.as_str(), ConceptKind::Class)?);
                            self.module.axioms.push(Axiom::ClassAssertion { individual, class });
                        }
                        Term::BlankNode(_) => {
                            let individual = self.register(subject.as_str(), ConceptKind::Individual)?;
                            match self.class_expr(object, 0)? {
                                Some(class) => {
                                    self.module.axioms.push(Axiom::ClassAssertion { individual, class })
                                }
                                None => self.skipped += 1,
                            }
                        }
                        _ => {}
                    },
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn labels(&mut self, subjects: &[NamedNode]) {
        for subject in subjects {
            let Some(concept) = self.vocab.resolve_iri(subject.as_str()) else {
                continue;
            };
            let term = Term::NamedNode(subject.clone());
            for object in self.doc.objects(&term, RDFS_LABEL) {
                if let Term::Literal(lit) = object {
                    self.module.labels.push((concept.id, lit.value().to_string()));
                }
            }
        }
    }
}

/// Decode one document into module `id`, registering its entities.
pub fn decode(triples: &[Triple], id: ModuleId, vocab: &Vocabulary) -> KbResult<Module> {
    let doc = Document::index(triples);

    // Named subjects in first-seen order, so registration is deterministic.
    let mut subjects: Vec<NamedNode> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for t in triples {
        if let Term::NamedNode(n) = Term::from(t.subject.clone()) {
            if seen.insert(n.clone()) {
                subjects.push(n);
            }
        }
    }

    let mut module = Module::new(id);
    for subject in &subjects {
        let term = Term::NamedNode(subject.clone());
        if doc.has_type(&term, OWL_ONTOLOGY) {
            module.iri = Some(subject.as_str().to_string());
            module.imports = doc
                .objects(&term, OWL_IMPORTS)
                .filter_map(|o| match o {
                    Term::NamedNode(n) => Some(n.as_str().to_string()),
                    _ => None,
                })
                .collect();
            break;
        }
    }

    let mut decoder = Decoder {
        doc,
        vocab,
        module,
        skipped: 0,
    };
    decoder.declarations(&subjects)?;
    decoder.axioms(&subjects)?;
    decoder.labels(&subjects);

    if decoder.skipped > 0 {
        tracing::debug!(
            module = id.0,
            skipped = decoder.skipped,
            "axioms outside the EL fragment skipped"
        );
    }
    Ok(decoder.module)
}

/// Encodes appended axioms back into triples.
struct Encoder<'a> {
    vocab: &'a Vocabulary,
    out: Vec<Triple>,
}

impl Encoder<'_> {
    fn iri(&self, id: ConceptId) -> NamedNode {
        named(&self.vocab.iri(id))
    }

    fn push(&mut self, subject: impl Into<Term>, predicate: &str, object: impl Into<Term>) {
        let subject: Term = subject.into();
        let object: Term = object.into();
        let triple = match subject {
            Term::NamedNode(s) => Triple::new(s, named(predicate), object),
            Term::BlankNode(s) => Triple::new(s, named(predicate), object),
            _ => return,
        };
        self.out.push(triple);
    }

    fn expr(&mut self, expr: &ClassExpr) -> Term {
        match expr {
            ClassExpr::Thing => named(OWL_THING).into(),
            ClassExpr::Named(id) => self.iri(*id).into(),
            ClassExpr::And(ops) => {
                let node = BlankNode::default();
                self.push(node.clone(), RDF_TYPE, named(OWL_CLASS));
                let items: Vec<Term> = ops.iter().map(|op| self.expr(op)).collect();
                let list = self.list(items);
                self.push(node.clone(), OWL_INTERSECTION_OF, list);
                node.into()
            }
            ClassExpr::Some { relation, filler } => {
                let node = BlankNode::default();
                self.push(node.clone(), RDF_TYPE, named(OWL_RESTRICTION));
                let property = self.iri(*relation);
                self.push(node.clone(), OWL_ON_PROPERTY, property);
                let filler = self.expr(filler);
                self.push(node.clone(), OWL_SOME_VALUES_FROM, filler);
                node.into()
            }
        }
    }

    fn list(&mut self, items: Vec<Term>) -> Term {
        let mut tail: Term = named(RDF_NIL).into();
        for item in items.into_iter().rev() {
            let cell = BlankNode::default();
            self.push(cell.clone(), RDF_FIRST, item);
            self.push(cell.clone(), RDF_REST, tail);
            tail = cell.into();
        }
        tail
    }

    fn axiom(&mut self, axiom: &Axiom) {
        match axiom {
            Axiom::SubClassOf { sub, sup } | Axiom::EquivalentClasses(sub, sup) => {
                let Some(sub_id) = sub.as_named() else {
                    tracing::warn!("general class axiom not encodable, skipped");
                    return;
                };
                let predicate = if matches!(axiom, Axiom::SubClassOf { .. }) {
                    RDFS_SUBCLASS_OF
                } else {
                    OWL_EQUIVALENT_CLASS
                };
                let object = self.expr(sup);
                let subject = self.iri(sub_id);
                self.push(subject, predicate, object);
            }
            Axiom::ClassAssertion { individual, class } => {
                let object = self.expr(class);
                let subject = self.iri(*individual);
                self.push(subject, RDF_TYPE, object);
            }
        }
    }
}

/// Triples for everything appended to `module` since it was sealed.
pub fn encode_additions(module: &Module, vocab: &Vocabulary) -> Vec<Triple> {
    let mut enc = Encoder {
        vocab,
        out: Vec::new(),
    };
    for id in module.added_declarations() {
        let kind = match vocab.kind_of(*id) {
            Some(ConceptKind::Class) => OWL_CLASS,
            Some(ConceptKind::Relation) => OWL_OBJECT_PROPERTY,
            Some(ConceptKind::Individual) => OWL_NAMED_INDIVIDUAL,
            None => continue,
        };
        let subject = enc.iri(*id);
        enc.push(subject, RDF_TYPE, named(kind));
    }
    for axiom in module.added_axioms() {
        enc.axiom(axiom);
    }
    for (id, label) in module.added_labels() {
        let subject = enc.iri(*id);
        enc.push(subject, RDFS_LABEL, Literal::new_simple_literal(label));
    }
    enc.out
}

#[cfg(test)]
mod tests {
    use super::*;

    const KB: &str = "http://example.org/kb#";

    fn t(s: &str, p: &str, o: impl Into<Term>) -> Triple {
        Triple::new(named(s), named(p), o)
    }

    fn iri(local: &str) -> String {
        format!("{KB}{local}")
    }

    fn sample() -> Vec<Triple> {
        let restriction = BlankNode::new_unchecked("r1");
        let conj = BlankNode::new_unchecked("c1");
        let cell1 = BlankNode::new_unchecked("l1");
        let cell2 = BlankNode::new_unchecked("l2");
        vec![
            t("http://example.org/kb", RDF_TYPE, named(OWL_ONTOLOGY)),
            t("http://example.org/kb", OWL_IMPORTS, named("http://example.org/pato.owl")),
            t(&iri("Heart"), RDF_TYPE, named(OWL_CLASS)),
            t(&iri("Heart"), RDFS_LABEL, Literal::new_simple_literal("heart")),
            t(&iri("Blood"), RDF_TYPE, named(OWL_CLASS)),
            t(&iri("part_of"), RDF_TYPE, named(OWL_OBJECT_PROPERTY)),
            t(&iri("HeartBlood"), RDF_TYPE, named(OWL_CLASS)),
            t(&iri("HeartBlood"), OWL_EQUIVALENT_CLASS, conj.clone()),
            Triple::new(conj.clone(), named(RDF_TYPE), named(OWL_CLASS)),
            Triple::new(conj, named(OWL_INTERSECTION_OF), cell1.clone()),
            Triple::new(cell1.clone(), named(RDF_FIRST), named(&iri("Blood"))),
            Triple::new(cell1, named(RDF_REST), cell2.clone()),
            Triple::new(cell2.clone(), named(RDF_FIRST), restriction.clone()),
            Triple::new(cell2, named(RDF_REST), named(RDF_NIL)),
            Triple::new(restriction.clone(), named(RDF_TYPE), named(OWL_RESTRICTION)),
            Triple::new(restriction.clone(), named(OWL_ON_PROPERTY), named(&iri("part_of"))),
            Triple::new(restriction, named(OWL_SOME_VALUES_FROM), named(&iri("Heart"))),
            t(&iri("sample1"), RDF_TYPE, named(&iri("Blood"))),
            t(&iri("Blood"), RDFS_SUBCLASS_OF, named(&iri("Fluid"))),
        ]
    }

    #[test]
    fn decodes_el_fragment() {
        let vocab = Vocabulary::new();
        let module = decode(&sample(), ModuleId::PRIMARY, &vocab).unwrap();

        assert_eq!(module.iri.as_deref(), Some("http://example.org/kb"));
        assert_eq!(module.imports, vec!["http://example.org/pato.owl".to_string()]);

        let id = |s: &str| vocab.lookup(s).unwrap();
        assert_eq!(vocab.kind_of(id("part_of")), Some(ConceptKind::Relation));
        assert_eq!(vocab.kind_of(id("sample1")), Some(ConceptKind::Individual));
        // Referenced but undeclared.
        assert_eq!(vocab.kind_of(id("Fluid")), Some(ConceptKind::Class));

        assert!(module.axioms.contains(&Axiom::EquivalentClasses(
            ClassExpr::Named(id("HeartBlood")),
            ClassExpr::And(vec![
                ClassExpr::Named(id("Blood")),
                ClassExpr::some(id("part_of"), ClassExpr::Named(id("Heart"))),
            ]),
        )));
        assert!(module.axioms.contains(&Axiom::ClassAssertion {
            individual: id("sample1"),
            class: ClassExpr::Named(id("Blood")),
        }));
        assert_eq!(module.labels, vec![(id("Heart"), "heart".to_string())]);
    }

    #[test]
    fn unsupported_constructs_are_skipped() {
        let vocab = Vocabulary::new();
        let union = BlankNode::new_unchecked("u1");
        let triples = vec![
            t(&iri("A"), RDF_TYPE, named(OWL_CLASS)),
            t(&iri("A"), RDFS_SUBCLASS_OF, union.clone()),
            Triple::new(
                union,
                named("http://www.w3.org/2002/07/owl#unionOf"),
                named(RDF_NIL),
            ),
        ];
        let module = decode(&triples, ModuleId::PRIMARY, &vocab).unwrap();
        assert!(module.axioms.is_empty());
        assert_eq!(module.declarations.len(), 1);
    }

    #[test]
    fn encodes_only_additions() {
        let vocab = Vocabulary::new();
        let mut module = decode(&sample(), ModuleId::PRIMARY, &vocab).unwrap();
        module.seal();
        assert!(encode_additions(&module, &vocab).is_empty());

        let term = vocab
            .register(&iri("RICORDO_1"), ConceptKind::Class, ModuleId::PRIMARY)
            .unwrap();
        let blood = vocab.lookup("Blood").unwrap();
        let part_of = vocab.lookup("part_of").unwrap();
        let heart = vocab.lookup("Heart").unwrap();
        module.declarations.push(term.id);
        module.axioms.push(Axiom::EquivalentClasses(
            ClassExpr::Named(term.id),
            ClassExpr::And(vec![
                ClassExpr::Named(blood),
                ClassExpr::some(part_of, ClassExpr::Named(heart)),
            ]),
        ));
        module.labels.push((term.id, "blood in heart".into()));

        let triples = encode_additions(&module, &vocab);
        // Re-decoding the additions alone yields the same axiom.
        let again = Vocabulary::new();
        let decoded = decode(&triples, ModuleId::PRIMARY, &again).unwrap();
        let id = |s: &str| again.lookup(s).unwrap();
        assert_eq!(decoded.declarations, vec![id("RICORDO_1")]);
        assert_eq!(
            decoded.axioms,
            vec![Axiom::EquivalentClasses(
                ClassExpr::Named(id("RICORDO_1")),
                ClassExpr::And(vec![
                    ClassExpr::Named(id("Blood")),
                    ClassExpr::some(id("part_of"), ClassExpr::Named(id("Heart"))),
                ]),
            )]
        );
        assert_eq!(decoded.labels, vec![(id("RICORDO_1"), "blood in heart".to_string())]);
    }
}
