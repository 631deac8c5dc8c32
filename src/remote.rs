//! Remote graph/count service.
//!
//! Two calls are used: a recursive subclass count per class, and an opaque
//! command passthrough (`subgraph`, `shortpath`). Both are optional
//! collaborators; callers turn failures into a fallback value.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{ExportError, KbResult};

const SERVICE: &str = "graph service";

/// Remote graph operations the service delegates.
pub trait GraphService: Send + Sync {
    /// Recursive subclass count for a class IRI, as the service renders it.
    fn count(&self, iri: &str) -> KbResult<String>;

    /// `GET {base}/{command}/{payload}`, body returned verbatim.
    fn command(&self, command: &str, payload: &str) -> KbResult<String>;
}

#[derive(Debug, Deserialize)]
struct CountReply {
    #[serde(rename = "Results")]
    results: Vec<serde_json::Value>,
}

/// Parse a `{"Results": [N]}` reply.
pub fn parse_count(body: &str) -> KbResult<String> {
    let reply: CountReply = serde_json::from_str(body).map_err(|e| ExportError::BadReply {
        service: SERVICE.into(),
        message: e.to_string(),
    })?;
    match reply.results.first() {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(value) => Ok(value.to_string()),
        None => Err(ExportError::BadReply {
            service: SERVICE.into(),
            message: "empty Results".into(),
        }
        .into()),
    }
}

/// HTTP client for the graph service.
pub struct RemoteGraphService {
    base_url: String,
    agent: ureq::Agent,
}

impl RemoteGraphService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }

    /// Transport failures mean the service is unreachable; an error status
    /// is a bad reply from a live service.
    fn get(&self, url: &str) -> KbResult<String> {
        let unavailable = |message: String| ExportError::Unavailable {
            service: SERVICE.into(),
            message,
        };
        let resp = self.agent.get(url).call().map_err(|e| match e {
            ureq::Error::Status(code, _) => ExportError::BadReply {
                service: SERVICE.into(),
                message: format!("HTTP {code}"),
            },
            other => unavailable(other.to_string()),
        })?;
        Ok(resp.into_string().map_err(|e| unavailable(e.to_string()))?)
    }
}

impl GraphService for RemoteGraphService {
    fn count(&self, iri: &str) -> KbResult<String> {
        let body = self.get(&format!("{}/count-recursive/{iri}", self.base_url))?;
        parse_count(&body)
    }

    fn command(&self, command: &str, payload: &str) -> KbResult<String> {
        self.get(&format!("{}/{command}/{payload}", self.base_url))
    }
}

impl std::fmt::Debug for RemoteGraphService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteGraphService")
            .field("base_url", &self.base_url)
            .finish()
    }
}
