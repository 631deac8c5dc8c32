//! Rich diagnostic error types for the owlkb service.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! so the CLI can print codes and help text. At the request boundary every
//! error is converted into a user-visible message by [`KbError::user_message`].

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the knowledge-base service.
#[derive(Debug, Error, Diagnostic)]
pub enum KbError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Vocab(#[from] VocabError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Expr(#[from] ExprError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Reason(#[from] ReasonError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Export(#[from] ExportError),
}

/// Generic message for any reasoning failure surfaced to a client.
pub const BACKEND_FAILURE_MESSAGE: &str = "There was an error getting the results.";

/// Generic message for an expression that does not parse.
pub const MALFORMED_QUERY_MESSAGE: &str = "Malformed Manchester query";

impl KbError {
    /// The text returned to a client when this error reaches the request boundary.
    ///
    /// Backend and storage failures never leak internal state; parse problems
    /// carry the most specific message available.
    pub fn user_message(&self) -> String {
        match self {
            KbError::Expr(e) => e.user_message(),
            KbError::Vocab(VocabError::NotFound { .. }) => "No class by that shortform.".into(),
            KbError::Vocab(VocabError::LabelNotFound { .. }) => "No class with that label.".into(),
            KbError::Vocab(_) => BACKEND_FAILURE_MESSAGE.into(),
            KbError::Reason(_) | KbError::Store(_) | KbError::Config(_) | KbError::Export(_) => {
                BACKEND_FAILURE_MESSAGE.into()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Vocabulary errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum VocabError {
    #[error("no concept with short identifier \"{short_id}\"")]
    #[diagnostic(
        code(owlkb::vocab::not_found),
        help(
            "Short identifiers are the fragment after the last '#' (or '/') of a \
             concept IRI, e.g. PATO_0000014. Check the identifier against the loaded \
             knowledge base and its imports."
        )
    )]
    NotFound { short_id: String },

    #[error("no class labelled \"{label}\"")]
    #[diagnostic(
        code(owlkb::vocab::label_not_found),
        help("Label search is case-insensitive but otherwise exact. Only classes are returned.")
    )]
    LabelNotFound { label: String },

    #[error("concept id space exhausted")]
    #[diagnostic(
        code(owlkb::vocab::exhausted),
        help("More than 2^64 - 1 concepts were registered. Check for registration loops.")
    )]
    AllocatorExhausted,
}

// ---------------------------------------------------------------------------
// Expression errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ExprError {
    #[error("{message}")]
    #[diagnostic(
        code(owlkb::expr::rejected_operator),
        help(
            "Only conjunction ('and') and existential restriction ('some') are \
             accepted, keeping the knowledge base inside the OWL 2 EL profile."
        )
    )]
    RejectedOperator { message: String },

    #[error("malformed expression: {reason}")]
    #[diagnostic(
        code(owlkb::expr::parse),
        help(
            "Expressions use Manchester syntax restricted to 'and', 'some' and \
             parentheses, e.g. `PATO_0000014 and (part_of some FMA_7088)`."
        )
    )]
    ParseFailure { reason: String },

    #[error("unknown identifier \"{name}\" in expression")]
    #[diagnostic(
        code(owlkb::expr::unresolved),
        help("Every name in an expression must resolve to a class or relation of the closure.")
    )]
    UnresolvedIdentifier { name: String },

    #[error("translator reported: {message}")]
    #[diagnostic(
        code(owlkb::expr::translator),
        help("The remote syntax translator rejected the input. Its message is shown verbatim.")
    )]
    Translator { message: String },
}

impl ExprError {
    fn user_message(&self) -> String {
        match self {
            ExprError::RejectedOperator { message } | ExprError::Translator { message } => {
                message.clone()
            }
            ExprError::ParseFailure { .. } | ExprError::UnresolvedIdentifier { .. } => {
                MALFORMED_QUERY_MESSAGE.into()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Reasoning errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ReasonError {
    #[error("classification cache is stale: {pending} staged axiom(s) not yet classified")]
    #[diagnostic(
        code(owlkb::reason::stale),
        help("Call `flush_and_recompute()` after staging axioms and before querying.")
    )]
    Stale { pending: usize },

    #[error("knowledge base is inconsistent: {detail}")]
    #[diagnostic(
        code(owlkb::reason::inconsistent),
        help(
            "The staged axioms make an individual (or owl:Thing) unsatisfiable. \
             They were discarded and the previous classification kept."
        )
    )]
    Inconsistent { detail: String },

    #[error("axiom rejected by the reasoner: {detail}")]
    #[diagnostic(
        code(owlkb::reason::unsupported),
        help("The EL backend accepts named classes, 'and' and 'some' over object properties.")
    )]
    Unsupported { detail: String },

    #[error("materialization failed: {message}")]
    #[diagnostic(
        code(owlkb::reason::materialize),
        help("The new term was rolled back. The previous classification is still usable.")
    )]
    Materialize { message: String },
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    #[diagnostic(
        code(owlkb::store::io),
        help("Check that the knowledge-base file exists and is readable and writable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse RDF in {path}: {message}")]
    #[diagnostic(
        code(owlkb::store::parse),
        help(
            "Knowledge bases are read as RDF/XML (.owl, .rdf), Turtle (.ttl) or \
             N-Triples (.nt). Check that the file matches its extension."
        )
    )]
    Parse { path: String, message: String },

    #[error("failed to serialize the knowledge base: {message}")]
    #[diagnostic(code(owlkb::store::serialize), help("The file on disk was left untouched."))]
    Serialize { message: String },

    #[error("unsupported knowledge-base format: {extension}")]
    #[diagnostic(
        code(owlkb::store::format),
        help("Use one of the extensions .owl, .rdf, .ttl or .nt.")
    )]
    UnsupportedFormat { extension: String },
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    #[diagnostic(code(owlkb::config::io), help("Check the path given with --config."))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {message}")]
    #[diagnostic(
        code(owlkb::config::parse),
        help("The config file is TOML. Every key is optional; see `KbConfig` for defaults.")
    )]
    Parse { path: String, message: String },

    #[error("invalid namespace \"{namespace}\"")]
    #[diagnostic(
        code(owlkb::config::namespace),
        help(
            "The namespace is the IRI prefix for new terms and must end in a local-name \
             prefix, e.g. http://www.ricordo.eu/ricordo.owl#RICORDO_"
        )
    )]
    Namespace { namespace: String },
}

// ---------------------------------------------------------------------------
// Export and remote collaborator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ExportError {
    #[error("{service} unavailable: {message}")]
    #[diagnostic(
        code(owlkb::export::unavailable),
        help("Remote collaborators are optional. The request degrades to a fallback value.")
    )]
    Unavailable { service: String, message: String },

    #[error("unexpected reply from {service}: {message}")]
    #[diagnostic(
        code(owlkb::export::reply),
        help("The remote service answered, but not with the expected JSON document.")
    )]
    BadReply { service: String, message: String },

    #[error("cached document {path} unreadable: {source}")]
    #[diagnostic(
        code(owlkb::export::cached_document),
        help("Cached export documents live under `export.cache_dir` in the config.")
    )]
    CachedDocument {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the crate.
pub type KbResult<T> = std::result::Result<T, KbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_errors_surface_generic_message() {
        let err: KbError = ExprError::UnresolvedIdentifier { name: "Foo".into() }.into();
        assert_eq!(err.user_message(), MALFORMED_QUERY_MESSAGE);
    }

    #[test]
    fn backend_errors_hide_details() {
        let err: KbError = ReasonError::Inconsistent { detail: "x".into() }.into();
        assert_eq!(err.user_message(), BACKEND_FAILURE_MESSAGE);
    }

    #[test]
    fn translator_message_is_verbatim() {
        let err: KbError = ExprError::Translator { message: "Unknown term: foo".into() }.into();
        assert_eq!(err.user_message(), "Unknown term: foo");
    }
}
