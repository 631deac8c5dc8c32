//! Graph interchange export.
//!
//! Each requested class becomes a document entry with its display name and
//! typed edges to direct subclasses, told `relation some Filler` superclasses
//! and directly asserted individuals. Export runs in three steps so that the
//! service lock is not held during remote calls: [`GraphExporter::plan`]
//! without touching the backend, [`KbState::graph_entries`] under the lock,
//! then [`annotate_counts`] after it is released.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::concept::{ConceptKind, short_form};
use crate::config::ExportConfig;
use crate::error::{ExportError, KbError, KbResult};
use crate::expr::ClassExpr;
use crate::remote::GraphService;
use crate::state::KbState;

pub const SUBCLASS_EDGE: &str = "subclass";

/// Target of an edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(rename = "_id")]
    pub id: String,
}

/// A typed edge from an exported entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    #[serde(rename = "type")]
    pub kind: String,
    pub entity: EntityRef,
}

/// One exported entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub sub: Vec<GraphEdge>,
}

/// What a request resolves to before any backend access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportPlan {
    /// Too many ids; answer with an empty document.
    Empty,
    /// Serve a pre-generated document from disk.
    Cached(PathBuf),
    /// Build entries for these local short ids.
    Entries(Vec<String>),
}

/// Request-side export logic: aliases, batch bound and cached documents.
#[derive(Debug, Clone, Copy)]
pub struct GraphExporter<'c> {
    config: &'c ExportConfig,
}

impl<'c> GraphExporter<'c> {
    pub fn new(config: &'c ExportConfig) -> Self {
        Self { config }
    }

    /// Replace client aliases with local prefixes (`fma:` → `FMA_`).
    pub fn localize(&self, text: &str) -> String {
        self.config
            .aliases
            .iter()
            .fold(text.to_string(), |acc, a| acc.replace(&a.alias, &a.local))
    }

    /// Replace local prefixes with client aliases (`FMA_` → `fma:`).
    pub fn publicize(&self, text: &str) -> String {
        self.config
            .aliases
            .iter()
            .fold(text.to_string(), |acc, a| acc.replace(&a.local, &a.alias))
    }

    pub fn plan(&self, request: &str) -> ExportPlan {
        let request = self.localize(request.trim());
        let ids: Vec<String> = request.split(',').map(|s| s.trim().to_string()).collect();
        if ids.len() > self.config.max_batch {
            tracing::debug!(ids = ids.len(), max = self.config.max_batch, "export batch too large");
            return ExportPlan::Empty;
        }
        if let Some(doc) = self.config.cached.iter().find(|d| d.matches(&request)) {
            return ExportPlan::Cached(self.config.cache_dir.join(&doc.file));
        }
        ExportPlan::Entries(ids.into_iter().filter(|s| !s.is_empty()).collect())
    }

    /// Contents of a cached document.
    pub fn read_cached(&self, path: &std::path::Path) -> KbResult<String> {
        std::fs::read_to_string(path).map_err(|e| {
            ExportError::CachedDocument {
                path: path.display().to_string(),
                source: e,
            }
            .into()
        })
    }

    /// Serialize entries with aliases restored on every id.
    pub fn render(&self, entries: &[GraphEntry]) -> String {
        let public: Vec<GraphEntry> = entries
            .iter()
            .map(|e| GraphEntry {
                id: self.publicize(&e.id),
                name: e.name.clone(),
                sub: e
                    .sub
                    .iter()
                    .map(|edge| GraphEdge {
                        kind: edge.kind.clone(),
                        entity: EntityRef {
                            id: self.publicize(&edge.entity.id),
                        },
                    })
                    .collect(),
            })
            .collect();
        serde_json::to_string_pretty(&public).unwrap_or_else(|_| "[]".into())
    }
}

impl KbState {
    /// Entries for `ids`, named by first label or id. Unknown ids, relations
    /// and relation edges not listed in the config are skipped.
    pub fn graph_entries(&mut self, ids: &[String], config: &ExportConfig) -> KbResult<Vec<GraphEntry>> {
        let mut entries = Vec::new();
        for short in ids {
            let Ok(concept) = self.vocab.resolve(short) else {
                continue;
            };
            if concept.kind == ConceptKind::Relation {
                continue;
            }
            let name = self.labels.first_label(concept.id).unwrap_or_else(|| short.clone());
            let mut sub = Vec::new();

            if concept.is_class() {
                let edge = |kind: &str, id: String| GraphEdge {
                    kind: kind.to_string(),
                    entity: EntityRef { id },
                };
                for node in self.reasoner.subclasses_of(&ClassExpr::named(concept.id), true)? {
                    if let Some(representative) = node.first() {
                        sub.push(edge(SUBCLASS_EDGE, self.vocab.short_id(*representative)));
                    }
                }
                for sup in self.graph.told_superclasses(concept.id) {
                    let ClassExpr::Some { relation, filler } = sup else {
                        continue;
                    };
                    let Some(kind) = config.relations.get(short_form(&self.vocab.iri(*relation))) else {
                        continue;
                    };
                    let target = filler
                        .signature()
                        .into_iter()
                        .find(|id| self.vocab.kind_of(*id) == Some(ConceptKind::Class));
                    if let Some(target) = target {
                        sub.push(edge(kind, self.vocab.short_id(target)));
                    }
                }
                for individual in self.graph.asserted_individuals(concept.id) {
                    sub.push(edge(SUBCLASS_EDGE, self.vocab.short_id(individual)));
                }
            }

            entries.push(GraphEntry {
                id: short.clone(),
                name,
                sub,
            });
        }
        Ok(entries)
    }
}

/// Suffix each entry's name with its remote count, `(?)` when unknown.
///
/// Once the service proves unreachable the remaining entries are not asked.
pub fn annotate_counts(entries: &mut [GraphEntry], service: Option<&dyn GraphService>, iri_prefix: &str) {
    let mut service = service;
    for entry in entries {
        let count = match service {
            Some(remote) => match remote.count(&format!("{iri_prefix}{}", entry.id)) {
                Ok(count) => count,
                Err(KbError::Export(e @ ExportError::Unavailable { .. })) => {
                    tracing::warn!(id = %entry.id, error = %e, "count service unreachable, skipping remaining counts");
                    service = None;
                    "?".into()
                }
                Err(e) => {
                    tracing::debug!(id = %entry.id, error = %e, "count unavailable");
                    "?".into()
                }
            },
            None => "?".into(),
        };
        entry.name = format!("{} ({count})", entry.name);
    }
}
