//! Class taxonomy: the direct-subsumption DAG over named classes.
//!
//! Equivalent classes collapse into one node. Edges run parent → child and
//! connect direct subsumptions only. `owl:Nothing` and every unsatisfiable
//! class share the bottom node, which has no edges.

use std::collections::{BTreeSet, HashMap};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::concept::ConceptId;

/// Equivalence class of named concepts; the first member represents the node.
pub type Node = Vec<ConceptId>;

/// Direct-subsumption DAG.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    graph: DiGraph<Node, ()>,
    index: HashMap<ConceptId, NodeIndex>,
    top: NodeIndex,
    bottom: NodeIndex,
}

/// What the taxonomy builder needs to know about each named class.
pub struct ClassInfo {
    pub id: ConceptId,
    /// Named subsumers, the class itself and `owl:Thing` included.
    pub subsumers: BTreeSet<ConceptId>,
    pub unsatisfiable: bool,
}

impl Taxonomy {
    /// Build from per-class subsumer sets.
    pub fn build(classes: &[ClassInfo]) -> Self {
        let supers: HashMap<ConceptId, &BTreeSet<ConceptId>> =
            classes.iter().map(|c| (c.id, &c.subsumers)).collect();
        let subsumed_by = |a: ConceptId, b: ConceptId| -> bool {
            a == b || b == ConceptId::THING || supers.get(&a).is_some_and(|s| s.contains(&b))
        };

        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        let top = graph.add_node(vec![ConceptId::THING]);
        index.insert(ConceptId::THING, top);
        let bottom = graph.add_node(vec![ConceptId::NOTHING]);
        index.insert(ConceptId::NOTHING, bottom);

        let mut ordered: Vec<&ClassInfo> = classes.iter().collect();
        ordered.sort_by_key(|c| c.id);

        // Equivalence classes.
        for class in &ordered {
            if index.contains_key(&class.id) {
                continue;
            }
            if class.unsatisfiable {
                graph[bottom].push(class.id);
                index.insert(class.id, bottom);
                continue;
            }
            let equivalent_to_top = subsumed_by(ConceptId::THING, class.id);
            if equivalent_to_top {
                graph[top].push(class.id);
                index.insert(class.id, top);
                continue;
            }
            let members: Node = class
                .subsumers
                .iter()
                .copied()
                .filter(|other| *other == class.id || subsumed_by(*other, class.id))
                .filter(|other| !index.contains_key(other) || *other == class.id)
                .collect();
            let node = graph.add_node(members.clone());
            for member in members {
                index.insert(member, node);
            }
        }

        // Direct edges.
        let nodes: Vec<NodeIndex> = graph.node_indices().collect();
        for node in nodes {
            if node == top || node == bottom {
                continue;
            }
            let rep = graph[node][0];
            let strict: BTreeSet<NodeIndex> = supers
                .get(&rep)
                .into_iter()
                .flat_map(|s| s.iter())
                .filter_map(|s| index.get(s).copied())
                .filter(|n| *n != node && *n != bottom)
                .chain(std::iter::once(top))
                .collect();
            let direct: Vec<NodeIndex> = strict
                .iter()
                .copied()
                .filter(|candidate| {
                    !strict.iter().any(|other| {
                        other != candidate && subsumed_by(graph[*other][0], graph[*candidate][0])
                    })
                })
                .collect();
            for parent in direct {
                graph.add_edge(parent, node, ());
            }
        }

        Self {
            graph,
            index,
            top,
            bottom,
        }
    }

    /// Place one new class without rebuilding.
    ///
    /// `below` holds the named classes it subsumes and `subsumed_by(a, b)`
    /// answers `a ⊑ b` for classes already placed. The caller guarantees that
    /// no subsumption between placed classes changed.
    pub fn insert(
        &mut self,
        class: &ClassInfo,
        below: &BTreeSet<ConceptId>,
        subsumed_by: impl Fn(ConceptId, ConceptId) -> bool,
    ) {
        if self.index.contains_key(&class.id) {
            return;
        }
        if class.unsatisfiable {
            self.graph[self.bottom].push(class.id);
            self.index.insert(class.id, self.bottom);
            return;
        }

        let equivalent = class
            .subsumers
            .iter()
            .filter(|s| **s != class.id && below.contains(s))
            .filter_map(|s| self.index.get(s).copied())
            .find(|n| *n != self.bottom);
        if let Some(node) = equivalent {
            self.graph[node].push(class.id);
            self.index.insert(class.id, node);
            return;
        }

        let above: BTreeSet<NodeIndex> = class
            .subsumers
            .iter()
            .filter(|s| **s != class.id)
            .filter_map(|s| self.index.get(s).copied())
            .filter(|n| *n != self.bottom)
            .chain(std::iter::once(self.top))
            .collect();
        let parents: Vec<NodeIndex> = above
            .iter()
            .copied()
            .filter(|candidate| {
                !above.iter().any(|other| {
                    other != candidate
                        && subsumed_by(self.representative(*other), self.representative(*candidate))
                })
            })
            .collect();

        let under: BTreeSet<NodeIndex> = below
            .iter()
            .filter(|d| **d != class.id)
            .filter_map(|d| self.index.get(d).copied())
            .filter(|n| *n != self.bottom && *n != self.top)
            .collect();
        let children: Vec<NodeIndex> = under
            .iter()
            .copied()
            .filter(|candidate| {
                !under.iter().any(|other| {
                    other != candidate
                        && subsumed_by(self.representative(*candidate), self.representative(*other))
                })
            })
            .collect();

        let node = self.graph.add_node(vec![class.id]);
        self.index.insert(class.id, node);
        for parent in &parents {
            for child in &children {
                if let Some(edge) = self.graph.find_edge(*parent, *child) {
                    self.graph.remove_edge(edge);
                }
            }
            self.graph.add_edge(*parent, node, ());
        }
        for child in children {
            self.graph.add_edge(node, child, ());
        }
    }

    pub fn node_of(&self, id: ConceptId) -> Option<NodeIndex> {
        self.index.get(&id).copied()
    }

    pub fn members(&self, node: NodeIndex) -> &[ConceptId] {
        &self.graph[node]
    }

    pub fn representative(&self, node: NodeIndex) -> ConceptId {
        self.graph[node][0]
    }

    pub fn top(&self) -> NodeIndex {
        self.top
    }

    pub fn bottom(&self) -> NodeIndex {
        self.bottom
    }

    pub fn parents(&self, node: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(node, Direction::Incoming)
    }

    pub fn children(&self, node: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(node, Direction::Outgoing)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> ConceptId {
        ConceptId::new(raw).unwrap()
    }

    fn info(raw: u64, supers: &[u64]) -> ClassInfo {
        let mut subsumers: BTreeSet<ConceptId> = supers.iter().map(|s| id(*s)).collect();
        subsumers.insert(id(raw));
        subsumers.insert(ConceptId::THING);
        ClassInfo {
            id: id(raw),
            subsumers,
            unsatisfiable: false,
        }
    }

    fn sorted_children(tax: &Taxonomy, of: u64) -> Vec<ConceptId> {
        let node = tax.node_of(id(of)).unwrap();
        let mut out: Vec<_> = tax.children(node).map(|n| tax.representative(n)).collect();
        out.sort();
        out
    }

    #[test]
    fn builds_direct_edges_only() {
        // 10 ⊒ 11 ⊒ 12, and 12 also under 13
        let tax = Taxonomy::build(&[
            info(10, &[]),
            info(11, &[10]),
            info(12, &[10, 11, 13]),
            info(13, &[]),
        ]);
        assert_eq!(sorted_children(&tax, 1), vec![id(10), id(13)]);
        assert_eq!(sorted_children(&tax, 10), vec![id(11)]);
        assert_eq!(sorted_children(&tax, 11), vec![id(12)]);
        assert_eq!(sorted_children(&tax, 13), vec![id(12)]);
        assert!(sorted_children(&tax, 12).is_empty());
    }

    #[test]
    fn equivalents_collapse() {
        let tax = Taxonomy::build(&[info(10, &[11]), info(11, &[10]), info(12, &[10, 11])]);
        let node = tax.node_of(id(10)).unwrap();
        assert_eq!(tax.node_of(id(11)), Some(node));
        assert_eq!(tax.members(node), &[id(10), id(11)]);
        assert_eq!(sorted_children(&tax, 11), vec![id(12)]);
    }

    #[test]
    fn insert_splices_between_parent_and_child() {
        // 10 ⊒ 12; insert 11 with 10 ⊒ 11 ⊒ 12
        let mut tax = Taxonomy::build(&[info(10, &[]), info(12, &[10]), info(13, &[])]);
        let below = BTreeSet::from([id(12)]);
        let supers: HashMap<u64, Vec<u64>> = HashMap::from([(11, vec![10]), (12, vec![10, 11])]);
        tax.insert(&info(11, &[10]), &below, |a, b| {
            a == b || b == ConceptId::THING || supers.get(&a.get()).is_some_and(|s| s.contains(&b.get()))
        });

        assert_eq!(sorted_children(&tax, 10), vec![id(11)]);
        assert_eq!(sorted_children(&tax, 11), vec![id(12)]);
        assert_eq!(sorted_children(&tax, 1), vec![id(10), id(13)]);
        assert_eq!(tax.edge_count(), 4);
    }

    #[test]
    fn insert_joins_equivalent_node() {
        let mut tax = Taxonomy::build(&[info(10, &[])]);
        let below = BTreeSet::from([id(10)]);
        tax.insert(&info(11, &[10]), &below, |a, b| a == b || b == ConceptId::THING);
        assert_eq!(tax.node_of(id(11)), tax.node_of(id(10)));
        assert_eq!(tax.members(tax.node_of(id(10)).unwrap()), &[id(10), id(11)]);
    }

    #[test]
    fn unsatisfiable_join_bottom() {
        let mut bad = info(20, &[]);
        bad.unsatisfiable = true;
        let tax = Taxonomy::build(&[bad, info(21, &[])]);
        assert_eq!(tax.node_of(id(20)), Some(tax.bottom()));
        assert_eq!(tax.members(tax.bottom()), &[ConceptId::NOTHING, id(20)]);
        assert_eq!(sorted_children(&tax, 1), vec![id(21)]);
    }
}
