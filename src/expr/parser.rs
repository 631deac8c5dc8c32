//! Manchester-syntax parser for the EL fragment.
//!
//! Grammar (keywords case-insensitive, `that` is a synonym of `and`):
//!
//! ```text
//! expr    := primary (("and" | "that") primary)*
//! primary := "(" expr ")" | relation "some" primary | class
//! class   := short-id | <full-iri> | 'label'
//! ```
//!
//! Every name is bound against the [`Vocabulary`] while parsing; an unknown
//! name is an error rather than a fresh entity.

use crate::concept::{ConceptId, ConceptKind};
use crate::error::{ExprError, KbResult};
use crate::vocab::{LabelIndex, Vocabulary};

use super::{ClassExpr, safety};

/// Byte span of a token in the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    LParen,
    RParen,
    And,
    Some,
    /// Bare word: short identifier or prefixed name.
    Word(String),
    /// `<...>` full IRI.
    Iri(String),
    /// `'...'` label.
    Quoted(String),
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    span: Span,
}

fn failure(reason: impl Into<String>) -> crate::error::KbError {
    ExprError::ParseFailure {
        reason: reason.into(),
    }
    .into()
}

fn tokenize(text: &str) -> KbResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        match c {
            '(' | ')' => {
                chars.next();
                let kind = if c == '(' { TokenKind::LParen } else { TokenKind::RParen };
                tokens.push(Token {
                    kind,
                    span: Span { start, end: start + 1 },
                });
            }
            '<' | '\'' | '"' => {
                let close = if c == '<' { '>' } else { c };
                chars.next();
                let mut body = String::new();
                let mut end = None;
                for (i, ch) in chars.by_ref() {
                    if ch == close {
                        end = Some(i + 1);
                        break;
                    }
                    body.push(ch);
                }
                let end = end.ok_or_else(|| failure(format!("unterminated {c} at byte {start}")))?;
                let kind = if c == '<' {
                    TokenKind::Iri(body)
                } else {
                    TokenKind::Quoted(body)
                };
                tokens.push(Token {
                    kind,
                    span: Span { start, end },
                });
            }
            _ => {
                let mut word = String::new();
                let mut end = start;
                while let Some(&(i, ch)) = chars.peek() {
                    if ch.is_whitespace() || matches!(ch, '(' | ')' | '<' | '\'' | '"') {
                        break;
                    }
                    word.push(ch);
                    end = i + ch.len_utf8();
                    chars.next();
                }
                let kind = match word.to_ascii_lowercase().as_str() {
                    "and" | "that" => TokenKind::And,
                    "some" => TokenKind::Some,
                    _ => TokenKind::Word(word),
                };
                tokens.push(Token {
                    kind,
                    span: Span { start, end },
                });
            }
        }
    }
    Ok(tokens)
}

/// Parser bound to the current vocabulary and label index.
pub struct ExprParser<'a> {
    vocab: &'a Vocabulary,
    labels: &'a LabelIndex,
}

impl<'a> ExprParser<'a> {
    pub fn new(vocab: &'a Vocabulary, labels: &'a LabelIndex) -> Self {
        Self { vocab, labels }
    }

    /// Parse `text` into an expression. The safety filter runs first.
    pub fn parse(&self, text: &str) -> KbResult<ClassExpr> {
        safety::check(text)?;
        let tokens = tokenize(text)?;
        if tokens.is_empty() {
            return Err(failure("empty expression"));
        }
        let mut cursor = Cursor { tokens: &tokens, pos: 0 };
        let expr = self.conjunction(&mut cursor)?;
        if let Some(extra) = cursor.peek() {
            return Err(failure(format!(
                "unexpected token at byte {}",
                extra.span.start
            )));
        }
        Ok(expr)
    }

    fn conjunction(&self, cursor: &mut Cursor<'_>) -> KbResult<ClassExpr> {
        let mut operands = vec![self.primary(cursor)?];
        while cursor.eat(&TokenKind::And) {
            operands.push(self.primary(cursor)?);
        }
        Ok(ClassExpr::and(operands))
    }

    fn primary(&self, cursor: &mut Cursor<'_>) -> KbResult<ClassExpr> {
        let token = cursor
            .next()
            .ok_or_else(|| failure("expression ends where a class was expected"))?;
        match &token.kind {
            TokenKind::LParen => {
                let inner = self.conjunction(cursor)?;
                if !cursor.eat(&TokenKind::RParen) {
                    return Err(failure(format!(
                        "missing ')' for '(' at byte {}",
                        token.span.start
                    )));
                }
                Ok(inner)
            }
            TokenKind::Word(_) | TokenKind::Iri(_) | TokenKind::Quoted(_) => {
                if cursor.eat(&TokenKind::Some) {
                    let relation = self.relation(token)?;
                    let filler = self.primary(cursor)?;
                    Ok(ClassExpr::some(relation, filler))
                } else {
                    self.class(token)
                }
            }
            TokenKind::RParen | TokenKind::And | TokenKind::Some => Err(failure(format!(
                "unexpected token at byte {}",
                token.span.start
            ))),
        }
    }

    fn entity(&self, token: &Token) -> KbResult<ConceptId> {
        let unresolved = |name: &str| -> crate::error::KbError {
            ExprError::UnresolvedIdentifier {
                name: name.to_string(),
            }
            .into()
        };
        match &token.kind {
            TokenKind::Word(word) => {
                let name = match word.split_once(':') {
                    Some(("owl", local)) => local,
                    _ => word.as_str(),
                };
                self.vocab.lookup(name).ok_or_else(|| unresolved(word.as_str()))
            }
            TokenKind::Iri(iri) => self
                .vocab
                .resolve_iri(iri)
                .map(|c| c.id)
                .ok_or_else(|| unresolved(iri.as_str())),
            TokenKind::Quoted(label) => {
                let classes = self.labels.search(label, self.vocab).map_err(|_| unresolved(label.as_str()))?;
                match classes.as_slice() {
                    [only] => Ok(only.id),
                    _ => Err(failure(format!(
                        "label '{label}' matches {} classes",
                        classes.len()
                    ))),
                }
            }
            _ => Err(failure("expected a name")),
        }
    }

    fn class(&self, token: &Token) -> KbResult<ClassExpr> {
        let id = self.entity(token)?;
        match self.vocab.kind_of(id) {
            Some(ConceptKind::Class) => Ok(ClassExpr::named(id)),
            Some(kind) => Err(failure(format!(
                "{} is a {kind}, not a class",
                self.vocab.short_id(id)
            ))),
            None => Err(failure("dangling concept reference")),
        }
    }

    fn relation(&self, token: &Token) -> KbResult<ConceptId> {
        let id = self.entity(token)?;
        match self.vocab.kind_of(id) {
            Some(ConceptKind::Relation) => Ok(id),
            _ => Err(failure(format!(
                "{} is not an object property",
                self.vocab.short_id(id)
            ))),
        }
    }
}

struct Cursor<'t> {
    tokens: &'t [Token],
    pos: usize,
}

impl<'t> Cursor<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().is_some_and(|t| &t.kind == kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }
}
