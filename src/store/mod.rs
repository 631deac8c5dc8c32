//! Durable storage for knowledge bases.
//!
//! [`DurableStore`] is the seam between the service and wherever ontologies
//! live. The shipped implementation, [`RdfFileStore`], reads and writes RDF
//! documents and resolves the `owl:imports` closure from disk.

pub mod codec;
pub mod durable;

use std::path::Path;

use oxigraph::io::RdfFormat;

use crate::error::{KbResult, StoreError};
use crate::graph::ConceptGraph;
use crate::vocab::Vocabulary;

pub use durable::RdfFileStore;

/// Loads a knowledge base with its import closure and writes the primary module back.
pub trait DurableStore: Send + Sync {
    /// Load `path` and its transitive imports, registering every entity in `vocab`.
    fn load(&self, path: &Path, vocab: &Vocabulary) -> KbResult<ConceptGraph>;

    /// Write the primary module of `graph` to `path`.
    fn save(&self, graph: &ConceptGraph, vocab: &Vocabulary, path: &Path) -> KbResult<()>;
}

/// RDF syntax for a file, chosen by extension.
pub fn format_for(path: &Path) -> KbResult<RdfFormat> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match extension.as_str() {
        "owl" | "rdf" | "xml" => Ok(RdfFormat::RdfXml),
        "ttl" => Ok(RdfFormat::Turtle),
        "nt" => Ok(RdfFormat::NTriples),
        _ => Err(StoreError::UnsupportedFormat { extension }.into()),
    }
}
