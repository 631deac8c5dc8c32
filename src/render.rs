//! Response rendering: HTML for browsers, JSON for programs.
//!
//! Plain output is an HTML fragment (tables for lists, nested `<ul>` for
//! trees). JSON output is produced with `serde_json`. Either can be wrapped
//! in a JSONP callback with [`jsonp`].

use serde::Serialize;

use crate::hierarchy::{SiblingEntry, TermEntry, TreeNode};

/// Output format negotiated from the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Plain,
    Json,
}

impl Format {
    /// JSON when the `Accept` header names `application/json`.
    pub fn from_accept(accept: Option<&str>) -> Self {
        match accept {
            Some(a) if a.contains("application/json") => Format::Json,
            _ => Format::Plain,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Format::Plain => "text/html; charset=utf-8",
            Format::Json => "application/json",
        }
    }
}

/// Escape `"`, `<`, `>`, `&` and every non-ASCII character as a numeric entity.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if (c as u32) > 127 || matches!(c, '"' | '<' | '>' | '&') {
            out.push_str(&format!("&#{};", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "response serialization failed");
        "[]".into()
    })
}

/// A flat identifier list.
pub fn ids(ids: &[String], format: Format) -> String {
    match format {
        Format::Json => to_json(ids),
        Format::Plain => {
            let mut out = String::from("<table><tr><th>ID</th></tr>");
            for id in ids {
                out.push_str(&format!("<tr><td>{}</td></tr>", escape_html(id)));
            }
            out.push_str("</table>");
            out
        }
    }
}

/// A list of terms with their first labels.
pub fn entries(entries: &[TermEntry], format: Format) -> String {
    match format {
        Format::Json => to_json(entries),
        Format::Plain => {
            let mut out = String::from("<table><tr><th>ID</th><th>Label</th></tr>");
            for e in entries {
                out.push_str(&format!(
                    "<tr><td>{}</td><td>{}</td></tr>",
                    escape_html(&e.term),
                    escape_html(e.label.as_deref().unwrap_or(""))
                ));
            }
            out.push_str("</table>");
            out
        }
    }
}

pub fn siblings(entries: &[SiblingEntry], format: Format) -> String {
    match format {
        Format::Json => to_json(entries),
        Format::Plain => {
            let mut out = String::from("<table><tr><th>ID</th><th>Label</th><th>Parent</th></tr>");
            for e in entries {
                out.push_str(&format!(
                    "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                    escape_html(&e.term),
                    escape_html(e.label.as_deref().unwrap_or("")),
                    escape_html(&e.parent)
                ));
            }
            out.push_str("</table>");
            out
        }
    }
}

pub fn tree(root: &TreeNode, format: Format) -> String {
    match format {
        Format::Json => to_json(root),
        Format::Plain => {
            let mut out = String::from("<ul>");
            tree_item(root, &mut out);
            out.push_str("</ul>");
            out
        }
    }
}

fn tree_item(node: &TreeNode, out: &mut String) {
    out.push_str("<li>");
    out.push_str(&escape_html(&node.term));
    if let Some(label) = &node.label {
        out.push_str(&format!(" ({})", escape_html(label)));
    }
    if !node.subterms.is_empty() {
        out.push_str("<ul>");
        for child in &node.subterms {
            tree_item(child, out);
        }
        out.push_str("</ul>");
    }
    out.push_str("</li>");
}

/// A JSON status object for mutation routes, e.g. `{"status": "ok"}`.
pub fn status(status: &str) -> String {
    to_json(&serde_json::json!({ "status": status }))
}

/// Whether `name` may be used as a JSONP callback.
pub fn valid_callback(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.'))
}

/// Wrap `body` so that it invokes `callback` when loaded as a script.
pub fn jsonp(callback: &str, body: &str) -> String {
    format!("typeof {callback} === 'function' && {callback}(\n{body});")
}
