//! Operator safety filter.
//!
//! Runs on the raw request text before translation or parsing. Disjunction
//! and negation would take the knowledge base out of the EL profile, so any
//! whole-word `or` / `not` (any case) is refused with a fixed message.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{ExprError, KbResult};

pub const DISJUNCTION_MESSAGE: &str =
    "Disjunction ('or') is forbidden because it would make the ontology non-EL.";
pub const NEGATION_MESSAGE: &str =
    "Negation ('not') is forbidden because it would make the ontology non-EL.";

static OR_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bor\b").expect("valid or-word regex"));
static NOT_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bnot\b").expect("valid not-word regex"));

/// Reject text containing a disallowed operator. Disjunction is reported first.
pub fn check(text: &str) -> KbResult<()> {
    if OR_WORD.is_match(text) {
        return Err(ExprError::RejectedOperator {
            message: DISJUNCTION_MESSAGE.into(),
        }
        .into());
    }
    if NOT_WORD.is_match(text) {
        return Err(ExprError::RejectedOperator {
            message: NEGATION_MESSAGE.into(),
        }
        .into());
    }
    Ok(())
}
