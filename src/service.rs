//! Request surface: a closed set of routes over one locked knowledge base.
//!
//! [`KnowledgeBase::handle`] is the only entry point the binaries use. The
//! parse, query or materialize, and serialize steps of a request run while
//! the state mutex is held; remote translation happens before it is taken
//! and remote count lookups after it is released.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::concept::{ConceptId, ConceptKind, ModuleId};
use crate::config::KbConfig;
use crate::error::{KbResult, MALFORMED_QUERY_MESSAGE};
use crate::export::{ExportPlan, GraphExporter, annotate_counts};
use crate::expr::parser::ExprParser;
use crate::expr::safety;
use crate::expr::translate::{RemoteTranslator, Translator, parse_translated};
use crate::remote::{GraphService, RemoteGraphService};
use crate::render::{self, Format, escape_html};
use crate::state::KbState;
use crate::store::RdfFileStore;
use crate::vocab::labels::UNLABELED;

pub const UNRECOGNIZED_MESSAGE: &str = "Unrecognized request";

const ADDLABEL_SYNTAX_MESSAGE: &str =
    "Invalid syntax.  Syntax: /addlabel/iri=label, e.g.: /addlabel/RICORDO_123=volume of blood";
const BLANK_LABEL_MESSAGE: &str = "Blank labels are not allowed.";
const CLASS_NOT_FOUND_MESSAGE: &str = "The specified class could not be found.  Please make sure you're \
     using the shortform of the iri, e.g., RICORDO_123 instead of http://website.com/RICORDO_123";
const SUBTERMS_FAILURE_MESSAGE: &str = "There was an error getting the results";

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Subterms,
    DirectSubterms,
    Siblings,
    Subhierarchy,
    EqTerms,
    Terms,
    Instances,
    Labels,
    Search,
    AddLabel,
    RdfStore,
    ApiNatomy,
    Subgraph,
    ShortestPath,
    Test,
}

impl Route {
    pub const ALL: [Route; 15] = [
        Route::Subterms,
        Route::DirectSubterms,
        Route::Siblings,
        Route::Subhierarchy,
        Route::EqTerms,
        Route::Terms,
        Route::Instances,
        Route::Labels,
        Route::Search,
        Route::AddLabel,
        Route::RdfStore,
        Route::ApiNatomy,
        Route::Subgraph,
        Route::ShortestPath,
        Route::Test,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Route::Subterms => "subterms",
            Route::DirectSubterms => "directsubterms",
            Route::Siblings => "siblings",
            Route::Subhierarchy => "subhierarchy",
            Route::EqTerms => "eqterms",
            Route::Terms => "terms",
            Route::Instances => "instances",
            Route::Labels => "labels",
            Route::Search => "search",
            Route::AddLabel => "addlabel",
            Route::RdfStore => "rdfstore",
            Route::ApiNatomy => "apinatomy",
            Route::Subgraph => "subgraph",
            Route::ShortestPath => "shortestpath",
            Route::Test => "test",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.name() == name)
    }

    /// Routes answering with a JSON document that a callback may wrap.
    pub fn is_document(self) -> bool {
        matches!(self, Route::ApiNatomy | Route::Subgraph | Route::ShortestPath)
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

/// A decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub route: String,
    /// URL-decoded payload after the route segment.
    pub query: String,
    pub format: Format,
    /// Annotate identifier lists with labels.
    pub verbose: bool,
    /// JSONP callback for document routes.
    pub callback: Option<String>,
}

impl Request {
    pub fn new(route: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            query: query.into(),
            format: Format::Plain,
            verbose: false,
            callback: None,
        }
    }

    pub fn json(mut self) -> Self {
        self.format = Format::Json;
        self
    }

    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    pub fn with_callback(mut self, callback: impl Into<String>) -> Self {
        self.callback = Some(callback.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub body: String,
    pub content_type: &'static str,
}

/// Summary of the loaded knowledge base.
#[derive(Debug, Clone, serde::Serialize)]
pub struct KbInfo {
    pub kb_file: String,
    pub namespace: String,
    pub modules: usize,
    pub concepts: usize,
    pub classes: usize,
    pub axioms: usize,
    pub labels: usize,
    pub backend: &'static str,
    pub save: bool,
}

impl std::fmt::Display for KbInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "knowledge base: {}", self.kb_file)?;
        writeln!(f, "namespace:      {}", self.namespace)?;
        writeln!(f, "modules:        {}", self.modules)?;
        writeln!(f, "concepts:       {} ({} classes)", self.concepts, self.classes)?;
        writeln!(f, "axioms:         {}", self.axioms)?;
        writeln!(f, "labels:         {}", self.labels)?;
        writeln!(f, "reasoner:       {}", self.backend)?;
        write!(f, "save:           {}", self.save)
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// The knowledge-base service shared by all request handlers.
pub struct KnowledgeBase {
    state: Mutex<KbState>,
    config: KbConfig,
    translator: Option<Box<dyn Translator>>,
    graph_service: Option<Box<dyn GraphService>>,
}

impl KnowledgeBase {
    /// Load the configured knowledge base and connect the remote collaborators.
    pub fn open(config: KbConfig) -> KbResult<Self> {
        let store = Arc::new(RdfFileStore::with_catalog(config.imports.clone()));
        let state = KbState::load(store, &config.kb_file, &config.namespace, config.save)?;

        let timeout = config.remote_timeout();
        let translator = config.translator.enabled.then(|| {
            Box::new(RemoteTranslator::new(config.translator.url.clone(), timeout)) as Box<dyn Translator>
        });
        let graph_service: Box<dyn GraphService> =
            Box::new(RemoteGraphService::new(config.graph_service.url.clone(), timeout));

        Ok(Self::new(state, config)
            .with_translator(translator)
            .with_graph_service(Some(graph_service)))
    }

    /// Wrap an existing state with no remote collaborators.
    pub fn new(state: KbState, config: KbConfig) -> Self {
        Self {
            state: Mutex::new(state),
            config,
            translator: None,
            graph_service: None,
        }
    }

    pub fn with_translator(mut self, translator: Option<Box<dyn Translator>>) -> Self {
        self.translator = translator;
        self
    }

    pub fn with_graph_service(mut self, service: Option<Box<dyn GraphService>>) -> Self {
        self.graph_service = service;
        self
    }

    pub fn config(&self) -> &KbConfig {
        &self.config
    }

    pub fn info(&self) -> KbInfo {
        let state = self.lock();
        KbInfo {
            kb_file: self.config.kb_file.display().to_string(),
            namespace: self.config.namespace.clone(),
            modules: state.graph.modules().len(),
            concepts: state.vocab.len(),
            classes: state.vocab.count_of(ConceptKind::Class),
            axioms: state.graph.axiom_count(),
            labels: state.labels.len(),
            backend: state.reasoner.backend_name(),
            save: state.persistence.is_enabled(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, KbState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Answer one request. Failures become user-facing messages here.
    pub fn handle(&self, request: &Request) -> Response {
        let started = Instant::now();
        tracing::debug!(route = %request.route, query = %request.query, "got request");

        let Some(route) = Route::parse(&request.route) else {
            return Response {
                body: UNRECOGNIZED_MESSAGE.into(),
                content_type: Format::Plain.content_type(),
            };
        };

        let body = match safety::check(&request.query).and_then(|()| self.dispatch(route, request, started)) {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(route = %route, error = %e, "request failed");
                e.user_message()
            }
        };

        let response = if route.is_document() {
            match request.callback.as_deref() {
                Some(cb) if render::valid_callback(cb) => Response {
                    body: render::jsonp(cb, &body),
                    content_type: "application/javascript",
                },
                Some(cb) => {
                    tracing::debug!(callback = cb, "ignoring invalid callback name");
                    Response {
                        body,
                        content_type: Format::Json.content_type(),
                    }
                }
                None => Response {
                    body,
                    content_type: Format::Json.content_type(),
                },
            }
        } else {
            Response {
                body,
                content_type: request.format.content_type(),
            }
        };

        tracing::info!(
            route = %route,
            elapsed_ms = started.elapsed().as_millis() as u64,
            bytes = response.body.len(),
            "request served"
        );
        response
    }

    fn dispatch(&self, route: Route, request: &Request, started: Instant) -> KbResult<String> {
        match route {
            Route::Labels => Ok(self.labels(request)),
            Route::Search => self.search(request),
            Route::AddLabel => Ok(self.add_label(request)),
            Route::RdfStore => self.rdfstore(request),
            Route::ApiNatomy => self.apinatomy(request),
            Route::Subgraph | Route::ShortestPath => Ok(self.passthrough(route, request)),
            _ => self.expression(route, request, started),
        }
    }

    // -- expression routes ---------------------------------------------------

    fn expression(&self, route: Route, request: &Request, started: Instant) -> KbResult<String> {
        let translation = self.translator.as_ref().map(|t| t.translate(&request.query));

        let mut guard = self.lock();
        let state = &mut *guard;
        let expr = {
            let parser = ExprParser::new(&state.vocab, &state.labels);
            parse_translated(translation, &request.query, &parser)?
        };

        let body = match route {
            Route::Subterms | Route::DirectSubterms => {
                let ids = state.subterms(&expr, route == Route::DirectSubterms)?;
                list(state, &ids, request)
            }
            Route::Terms => {
                let ids = state.terms(&expr)?;
                list(state, &ids, request)
            }
            Route::Instances => {
                let ids = state.instances(&expr)?;
                list(state, &ids, request)
            }
            Route::EqTerms => {
                let term = state.materialize(&expr)?;
                list(state, &[term.concept.id], request)
            }
            Route::Siblings => {
                if request.verbose {
                    render::siblings(&state.sibling_entries(&expr)?, request.format)
                } else {
                    let ids: Vec<ConceptId> = state.siblings(&expr)?.into_iter().map(|(s, _)| s).collect();
                    list(state, &ids, request)
                }
            }
            Route::Subhierarchy => render::tree(&state.subhierarchy(&expr)?, request.format),
            Route::Test => {
                let term = match state.materialize(&expr) {
                    Ok(m) => m.concept,
                    Err(e) => {
                        tracing::debug!(error = %e, "test materialization failed");
                        return Ok(MALFORMED_QUERY_MESSAGE.into());
                    }
                };
                let mut out = format!("<h3>Term</h3><ul><li>{}</li></ul>", escape_html(&term.short_id));
                match state.subterms(&expr, false) {
                    Ok(subs) if subs.is_empty() => {}
                    Ok(subs) => {
                        out.push_str("<h3>Subterms</h3><ul>");
                        for id in subs {
                            out.push_str(&format!("<li>{}</li>", escape_html(&state.vocab.short_id(id))));
                        }
                        out.push_str("</ul>");
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "test subterms failed");
                        out = SUBTERMS_FAILURE_MESSAGE.into();
                    }
                }
                out.push_str(&format!(
                    "<h5>Runtime</h5>This computation took {}ms to complete",
                    started.elapsed().as_millis()
                ));
                out
            }
            _ => UNRECOGNIZED_MESSAGE.into(),
        };
        Ok(body)
    }

    // -- label routes ----------------------------------------------------------

    fn labels(&self, request: &Request) -> String {
        let state = self.lock();
        let Some(class) = state.vocab.resolve(&request.query).ok().filter(|c| c.is_class()) else {
            return "No class by that shortform.".into();
        };
        let mut labels = state.labels.labels_of(class.id);
        if labels.is_empty() {
            labels.push(UNLABELED.to_string());
        }
        render::ids(&labels, request.format)
    }

    fn search(&self, request: &Request) -> KbResult<String> {
        let state = self.lock();
        let ids: Vec<String> = state
            .labels
            .search(&request.query, &state.vocab)?
            .into_iter()
            .map(|c| c.short_id)
            .collect();
        Ok(render::ids(&ids, request.format))
    }

    fn add_label(&self, request: &Request) -> String {
        let json = request.format == Format::Json;
        let reply = |status: &str, message: &str| {
            if json {
                render::status(status)
            } else {
                message.to_string()
            }
        };

        let Some((short, label)) = request.query.split_once('=').filter(|(s, _)| !s.is_empty()) else {
            return reply("syntax error", ADDLABEL_SYNTAX_MESSAGE);
        };

        let mut state = self.lock();
        let prefix = state.local_prefix().to_string();
        if !short.starts_with(&prefix) {
            let owner = prefix.trim_end_matches('_');
            return reply(
                "non-local class error",
                &format!("Only {owner} classes can have labels added to them through OWLKB."),
            );
        }
        if label.trim().is_empty() {
            return reply("blank label error", BLANK_LABEL_MESSAGE);
        }
        let Some(class) = state.vocab.resolve(short).ok().filter(|c| c.is_class()) else {
            return reply("class not found error", CLASS_NOT_FOUND_MESSAGE);
        };

        let done = format!("Class {short} now has label {}", escape_html(label));
        if state.labels.has_label_in(class.id, ModuleId::PRIMARY, label) {
            return reply("ok", &done);
        }
        state.add_label(class.id, label);
        reply("ok", &done)
    }

    // -- rdfstore --------------------------------------------------------------

    /// Full IRI for a short id or IRI; otherwise long-IRI subterms of an expression.
    fn rdfstore(&self, request: &Request) -> KbResult<String> {
        let query = request.query.as_str();
        let mut guard = self.lock();
        let state = &mut *guard;

        if let Ok(concept) = state.vocab.resolve(query) {
            return Ok(concept.iri);
        }
        if state.vocab.resolve_iri(query).is_some_and(|c| c.is_class()) {
            return Ok(query.to_string());
        }

        let parsed = ExprParser::new(&state.vocab, &state.labels).parse(query);
        let Ok(expr) = parsed else {
            return Ok(escape_html(query));
        };
        let iris: Vec<String> = state
            .subterms(&expr, false)?
            .into_iter()
            .map(|id| state.vocab.iri(id))
            .collect();
        Ok(render::ids(&iris, Format::Json))
    }

    // -- document routes -----------------------------------------------------

    fn apinatomy(&self, request: &Request) -> KbResult<String> {
        let exporter = GraphExporter::new(&self.config.export);
        match exporter.plan(&request.query) {
            ExportPlan::Empty => Ok("[]".into()),
            ExportPlan::Cached(path) => Ok(exporter.read_cached(&path).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "cached export document missing");
                "[]".into()
            })),
            ExportPlan::Entries(ids) => {
                let mut entries = self.lock().graph_entries(&ids, &self.config.export)?;
                annotate_counts(
                    &mut entries,
                    self.graph_service.as_deref(),
                    &self.config.graph_service.count_iri_prefix,
                );
                Ok(exporter.render(&entries))
            }
        }
    }

    /// Forward to the graph service; `?` when it does not answer.
    fn passthrough(&self, route: Route, request: &Request) -> String {
        let expanded = self
            .config
            .graph_service
            .expansions
            .iter()
            .fold(request.query.clone(), |acc, (from, to)| acc.replace(from, to));
        let (command, payload) = match route {
            Route::Subgraph => ("subgraph", format!(",{expanded}")),
            _ => ("shortpath", expanded),
        };
        let Some(service) = self.graph_service.as_deref() else {
            return "?".into();
        };
        service.command(command, &payload).unwrap_or_else(|e| {
            tracing::debug!(command, error = %e, "graph service unavailable");
            "?".into()
        })
    }
}

/// Render ids as a bare list, or as labelled entries in verbose mode.
fn list(state: &KbState, ids: &[ConceptId], request: &Request) -> String {
    if request.verbose {
        let entries: Vec<_> = ids.iter().map(|id| state.entry(*id)).collect();
        render::entries(&entries, request.format)
    } else {
        let names: Vec<String> = ids.iter().map(|id| state.vocab.short_id(*id)).collect();
        render::ids(&names, request.format)
    }
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("kb_file", &self.config.kb_file)
            .field("translator", &self.translator.is_some())
            .field("graph_service", &self.graph_service.is_some())
            .finish()
    }
}
