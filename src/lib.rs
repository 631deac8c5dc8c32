// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # owlkb
//!
//! An OWL knowledge-base service. It loads an ontology with its import
//! closure, classifies it with an EL reasoner, and answers hierarchy queries
//! over named classes and anonymous `and`/`some` expressions. Expressions
//! without a named equivalent can be materialized as new terms, which are
//! written back to the knowledge-base file.
//!
//! ## Architecture
//!
//! - **Vocabulary** (`vocab`): short-id and IRI registry plus the label index
//! - **Expressions** (`expr`): Manchester subset parser, operator safety filter, remote translation
//! - **Reasoning** (`reason`): backend trait, EL saturation, petgraph taxonomy
//! - **Storage** (`store`, `persist`): RDF files via oxigraph, write-back on mutation
//! - **Service** (`service`): route dispatch over a single locked [`state::KbState`]
//!
//! ## Library usage
//!
//! ```no_run
//! use owlkb::config::KbConfig;
//! use owlkb::service::{KnowledgeBase, Request};
//!
//! let kb = KnowledgeBase::open(KbConfig::default()).unwrap();
//! let response = kb.handle(&Request::new("subterms", "PATO_0000014").json());
//! println!("{}", response.body);
//! ```

pub mod concept;
pub mod config;
pub mod error;
pub mod export;
pub mod expr;
pub mod graph;
pub mod hierarchy;
pub mod materialize;
pub mod persist;
pub mod reason;
pub mod remote;
pub mod render;
pub mod service;
pub mod state;
pub mod store;
pub mod vocab;
