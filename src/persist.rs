//! Persistence coordinator.
//!
//! Commits mutations of the primary module to durable storage. Saving can be
//! switched off by configuration. A failed save is logged and reported as
//! [`CommitOutcome::Failed`]; the in-memory mutation stands either way.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::graph::ConceptGraph;
use crate::store::DurableStore;
use crate::vocab::Vocabulary;

/// Result of a commit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Saving is disabled.
    Skipped,
    Saved,
    Failed,
}

pub struct PersistenceCoordinator {
    store: Arc<dyn DurableStore>,
    path: PathBuf,
    enabled: bool,
}

impl PersistenceCoordinator {
    pub fn new(store: Arc<dyn DurableStore>, path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            store,
            path: path.into(),
            enabled,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn commit(&self, graph: &ConceptGraph, vocab: &Vocabulary) -> CommitOutcome {
        if !self.enabled {
            tracing::info!("Skipping writing to hard drive (disabled by commandline argument).");
            return CommitOutcome::Skipped;
        }
        tracing::info!(path = %self.path.display(), "Saving ontology...");
        match self.store.save(graph, vocab, &self.path) {
            Ok(()) => CommitOutcome::Saved,
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "could not save ontology");
                CommitOutcome::Failed
            }
        }
    }
}

impl std::fmt::Debug for PersistenceCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceCoordinator")
            .field("path", &self.path)
            .field("enabled", &self.enabled)
            .finish()
    }
}
