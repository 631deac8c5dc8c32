//! RDF file store with `owl:imports` closure resolution.
//!
//! Imports are resolved breadth-first. Each import IRI is looked up in the
//! catalog first, then next to the primary file under the IRI's last path
//! segment. An import that cannot be found is logged and skipped; one that is
//! found but does not parse aborts the load.
//!
//! Saves write the primary module to a sibling temporary file and rename it
//! over the original, so a failed write never truncates the knowledge base.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use oxigraph::io::{RdfParser, RdfSerializer};
use oxigraph::model::Triple;

use crate::concept::ModuleId;
use crate::error::{KbResult, StoreError};
use crate::graph::ConceptGraph;
use crate::vocab::Vocabulary;

use super::{DurableStore, codec, format_for};

const PREFIXES: [(&str, &str); 4] = [
    ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
    ("rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
    ("owl", "http://www.w3.org/2002/07/owl#"),
    ("xsd", "http://www.w3.org/2001/XMLSchema#"),
];

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Read every triple of an RDF document.
pub fn read_triples(path: &Path) -> KbResult<Vec<Triple>> {
    let format = format_for(path)?;
    let file = File::open(path).map_err(|e| io_error(path, e))?;
    let mut triples = Vec::new();
    for quad in RdfParser::from_format(format).for_reader(BufReader::new(file)) {
        let quad = quad.map_err(|e| StoreError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        triples.push(Triple::new(quad.subject, quad.predicate, quad.object));
    }
    Ok(triples)
}

/// Write `triples` to `path` through a temporary file and an atomic rename.
pub fn write_triples(path: &Path, triples: &[Triple]) -> KbResult<()> {
    let format = format_for(path)?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "kb".into());
    let tmp = dir.join(format!(".{name}.tmp"));

    let result = (|| -> KbResult<()> {
        let file = File::create(&tmp).map_err(|e| io_error(&tmp, e))?;
        let mut serializer = RdfSerializer::from_format(format);
        for (prefix, namespace) in PREFIXES {
            serializer = serializer
                .with_prefix(prefix, namespace)
                .map_err(|e| StoreError::Serialize {
                    message: e.to_string(),
                })?;
        }
        let mut writer = serializer.for_writer(BufWriter::new(file));
        for triple in triples {
            writer.serialize_triple(triple).map_err(|e| StoreError::Serialize {
                message: e.to_string(),
            })?;
        }
        let mut out = writer.finish().map_err(|e| io_error(&tmp, e))?;
        out.flush().map_err(|e| io_error(&tmp, e))?;
        drop(out);
        std::fs::rename(&tmp, path).map_err(|e| io_error(path, e))?;
        Ok(())
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

/// Knowledge bases as RDF documents on the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct RdfFileStore {
    /// Import IRI → local file.
    catalog: HashMap<String, PathBuf>,
}

impl RdfFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(catalog: HashMap<String, PathBuf>) -> Self {
        Self { catalog }
    }

    /// Where the document for `import` is expected.
    fn locate(&self, import: &str, base_dir: &Path) -> PathBuf {
        if let Some(path) = self.catalog.get(import) {
            return path.clone();
        }
        if let Some(local) = import.strip_prefix("file://") {
            return PathBuf::from(local);
        }
        let trimmed = import.trim_end_matches(['/', '#']);
        let segment = trimmed.rsplit('/').next().unwrap_or(trimmed);
        let candidate = base_dir.join(segment);
        if candidate.extension().is_none() {
            candidate.with_extension("owl")
        } else {
            candidate
        }
    }
}

impl DurableStore for RdfFileStore {
    fn load(&self, path: &Path, vocab: &Vocabulary) -> KbResult<ConceptGraph> {
        let start = Instant::now();
        let triples = read_triples(path)?;
        let mut primary = codec::decode(&triples, ModuleId::PRIMARY, vocab)?;
        primary.source = Some(path.to_path_buf());
        primary.raw = triples;
        primary.seal();

        let base_dir = path.parent().unwrap_or(Path::new("."));
        let mut queue: VecDeque<String> = primary.imports.iter().cloned().collect();
        let mut visited: HashSet<String> = primary.iri.iter().cloned().collect();

        let mut graph = ConceptGraph::new();
        *graph.primary_mut() = primary;

        while let Some(import) = queue.pop_front() {
            if !visited.insert(import.clone()) {
                continue;
            }
            let file = self.locate(&import, base_dir);
            if !file.exists() {
                tracing::warn!(import = %import, path = %file.display(), "import not found, skipped");
                continue;
            }
            let triples = read_triples(&file)?;
            let id = ModuleId(graph.modules().len() as u32);
            let mut module = codec::decode(&triples, id, vocab)?;
            module.source = Some(file);
            if let Some(iri) = &module.iri {
                visited.insert(iri.clone());
            }
            queue.extend(module.imports.iter().cloned());
            module.seal();
            tracing::debug!(import = %import, module = id.0, axioms = module.axioms.len(), "import loaded");
            graph.push_module(module);
        }

        tracing::info!(
            path = %path.display(),
            modules = graph.modules().len(),
            concepts = vocab.len(),
            axioms = graph.axiom_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "knowledge base loaded"
        );
        Ok(graph)
    }

    fn save(&self, graph: &ConceptGraph, vocab: &Vocabulary, path: &Path) -> KbResult<()> {
        let primary = graph.primary();
        let mut triples = primary.raw.clone();
        triples.extend(codec::encode_additions(primary, vocab));
        write_triples(path, &triples)?;
        tracing::info!(path = %path.display(), triples = triples.len(), "knowledge base saved");
        Ok(())
    }
}
