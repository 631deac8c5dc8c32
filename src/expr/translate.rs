//! Optional remote syntax translation.
//!
//! When enabled, request text is first sent to a remote translator that
//! rewrites a controlled natural syntax into Manchester syntax. The remote
//! call happens before the service lock is taken; [`parse_translated`] then
//! turns the outcome into an expression under the lock.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{ExprError, KbResult};

use super::ClassExpr;
use super::parser::ExprParser;

pub const UNREACHABLE_MESSAGE: &str = "Could not connect to the translator for UCL syntax parsing";

/// What the translator made of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    /// Rewritten expression, with the translator's guess at what may go wrong.
    Expression {
        text: String,
        possible_error: Option<String>,
    },
    /// Ambiguity report, passed through as a JSON document.
    Ambiguities(String),
    /// Error string reported by the translator.
    Error(String),
    /// Reply without a result, surfaced verbatim.
    Raw(String),
    /// Timed out or not reachable.
    Unreachable,
}

/// Anything that can translate request text.
pub trait Translator: Send + Sync {
    fn translate(&self, text: &str) -> Translation;
}

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(rename = "Result")]
    result: Option<String>,
    #[serde(rename = "Error")]
    error: Option<String>,
    #[serde(rename = "Ambiguities")]
    ambiguities: Option<serde_json::Value>,
    #[serde(rename = "Possible_error")]
    possible_error: Option<String>,
}

fn has_content(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::String(s) => !s.trim().is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
        _ => true,
    }
}

/// Classify a raw translator reply body.
pub fn classify_reply(body: &str) -> Translation {
    let Ok(reply) = serde_json::from_str::<Reply>(body) else {
        return Translation::Raw(body.trim().to_string());
    };

    if let Some(error) = reply.error.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        return Translation::Error(error.to_string());
    }
    if let Some(report) = reply.ambiguities.filter(has_content) {
        let doc = serde_json::json!({ "Ambiguities": report });
        return Translation::Ambiguities(
            serde_json::to_string_pretty(&doc).unwrap_or_else(|_| doc.to_string()),
        );
    }
    match reply.result {
        Some(text) => Translation::Expression {
            text,
            possible_error: reply.possible_error,
        },
        None => Translation::Raw(body.trim().to_string()),
    }
}

/// HTTP translator: `GET {base_url}{percent-encoded text}`.
pub struct RemoteTranslator {
    base_url: String,
    agent: ureq::Agent,
}

impl RemoteTranslator {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl Translator for RemoteTranslator {
    fn translate(&self, text: &str) -> Translation {
        let encoded =
            percent_encoding::utf8_percent_encode(text, percent_encoding::NON_ALPHANUMERIC);
        let url = format!("{}{encoded}", self.base_url);

        match self.agent.get(&url).call() {
            Ok(resp) => match resp.into_string() {
                Ok(body) => classify_reply(&body),
                Err(e) => {
                    tracing::warn!(error = %e, "translator reply unreadable");
                    Translation::Unreachable
                }
            },
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                tracing::debug!(code, "translator returned an error status");
                classify_reply(&body)
            }
            Err(e) => {
                tracing::warn!(error = %e, url = %self.base_url, "translator unreachable");
                Translation::Unreachable
            }
        }
    }
}

fn translator_error(message: impl Into<String>) -> crate::error::KbError {
    ExprError::Translator {
        message: message.into(),
    }
    .into()
}

/// Parse a request given the translator outcome (`None` when translation is off).
///
/// Errors and ambiguity reports abort without parsing the original text. An
/// unreachable translator falls back to parsing the original text.
pub fn parse_translated(
    translation: Option<Translation>,
    original: &str,
    parser: &ExprParser<'_>,
) -> KbResult<ClassExpr> {
    match translation {
        None => parser.parse(original),
        Some(Translation::Unreachable) => parser
            .parse(original)
            .map_err(|_| translator_error(UNREACHABLE_MESSAGE)),
        Some(Translation::Error(message))
        | Some(Translation::Ambiguities(message))
        | Some(Translation::Raw(message)) => Err(translator_error(message)),
        Some(Translation::Expression {
            text,
            possible_error,
        }) => parser.parse(&text).map_err(|e| match possible_error {
            Some(hint) => translator_error(hint),
            None => e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concept::{ConceptKind, ModuleId};
    use crate::error::{KbError, MALFORMED_QUERY_MESSAGE};
    use crate::vocab::{LabelIndex, Vocabulary};

    fn vocab() -> Vocabulary {
        let vocab = Vocabulary::new();
        vocab
            .register("http://example.org/kb#FMA_9670", ConceptKind::Class, ModuleId::PRIMARY)
            .unwrap();
        vocab
    }

    #[test]
    fn classifies_result() {
        let t = classify_reply(r#"{"Result": "FMA_9670", "Possible_error": "check spelling"}"#);
        assert_eq!(
            t,
            Translation::Expression {
                text: "FMA_9670".into(),
                possible_error: Some("check spelling".into()),
            }
        );
    }

    #[test]
    fn error_beats_result() {
        let t = classify_reply(r#"{"Error": " unknown word 'bloood' ", "Result": "x"}"#);
        assert_eq!(t, Translation::Error("unknown word 'bloood'".into()));
    }

    #[test]
    fn ambiguities_are_wrapped() {
        let t = classify_reply(r#"{"Ambiguities": [{"term": "heart", "candidates": ["a", "b"]}]}"#);
        let Translation::Ambiguities(doc) = t else {
            panic!("expected ambiguity report");
        };
        let value: serde_json::Value = serde_json::from_str(&doc).unwrap();
        assert_eq!(value["Ambiguities"][0]["term"], "heart");
    }

    #[test]
    fn empty_ambiguities_are_ignored() {
        let t = classify_reply(r#"{"Ambiguities": [], "Result": "FMA_9670"}"#);
        assert!(matches!(t, Translation::Expression { .. }));
    }

    #[test]
    fn non_json_is_raw() {
        assert_eq!(classify_reply("  teapot \n"), Translation::Raw("teapot".into()));
        assert_eq!(classify_reply("{}"), Translation::Raw("{}".into()));
    }

    #[test]
    fn unreachable_falls_back_to_original() {
        let vocab = vocab();
        let labels = LabelIndex::new();
        let parser = ExprParser::new(&vocab, &labels);
        assert!(parse_translated(Some(Translation::Unreachable), "FMA_9670", &parser).is_ok());

        let err = parse_translated(Some(Translation::Unreachable), "blood of heart", &parser).unwrap_err();
        assert_eq!(err.user_message(), UNREACHABLE_MESSAGE);
    }

    #[test]
    fn translator_error_is_verbatim_and_skips_original() {
        let vocab = vocab();
        let labels = LabelIndex::new();
        let parser = ExprParser::new(&vocab, &labels);
        let err = parse_translated(Some(Translation::Error("no such term".into())), "FMA_9670", &parser)
            .unwrap_err();
        assert!(matches!(err, KbError::Expr(ExprError::Translator { .. })));
        assert_eq!(err.user_message(), "no such term");
    }

    #[test]
    fn failed_translation_uses_possible_error() {
        let vocab = vocab();
        let labels = LabelIndex::new();
        let parser = ExprParser::new(&vocab, &labels);
        let with_hint = Translation::Expression {
            text: "Nope_1".into(),
            possible_error: Some("did you mean FMA_9670?".into()),
        };
        let err = parse_translated(Some(with_hint), "x", &parser).unwrap_err();
        assert_eq!(err.user_message(), "did you mean FMA_9670?");

        let without = Translation::Expression {
            text: "Nope_1".into(),
            possible_error: None,
        };
        let err = parse_translated(Some(without), "x", &parser).unwrap_err();
        assert_eq!(err.user_message(), MALFORMED_QUERY_MESSAGE);
    }
}
