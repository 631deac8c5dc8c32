//! owlkb HTTP server.
//!
//! Every route is `GET /{route}/{query}`, where `query` is the URL-encoded
//! payload (an expression, a short id, a label or `id=label`):
//!
//! - `/subterms`, `/directsubterms`, `/siblings`, `/subhierarchy`, `/terms`,
//!   `/instances`, `/eqterms`, `/test` take an expression
//! - `/labels`, `/search`, `/addlabel`, `/rdfstore` take ids or labels
//! - `/apinatomy`, `/subgraph`, `/shortestpath` return JSON documents and
//!   honour `?callback=name`
//! - `GET /health` reports the loaded knowledge base
//!
//! `Accept: application/json` switches list output to JSON; `?verbose=true`
//! adds labels.
//!
//! Build and run: `cargo run --features server --bin owlkbd -- --file ricordo.owl`

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use miette::IntoDiagnostic;
use tower_http::cors::CorsLayer;

use owlkb::config::{KbConfig, Overrides};
use owlkb::error::BACKEND_FAILURE_MESSAGE;
use owlkb::render::Format;
use owlkb::service::{KbInfo, KnowledgeBase, Request};

#[derive(Parser)]
#[command(name = "owlkbd", version, about = "OWL knowledge-base server")]
struct Cli {
    /// TOML config file.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,
}

const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

async fn health(State(kb): State<Arc<KnowledgeBase>>) -> Result<Json<KbInfo>, StatusCode> {
    tokio::task::spawn_blocking(move || kb.info())
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!(error = %e, "health task failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

async fn route_empty(
    state: State<Arc<KnowledgeBase>>,
    Path(route): Path<String>,
    params: Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    answer(state, route, String::new(), params, headers).await
}

async fn route_query(
    state: State<Arc<KnowledgeBase>>,
    Path((route, query)): Path<(String, String)>,
    params: Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    answer(state, route, query, params, headers).await
}

async fn answer(
    State(kb): State<Arc<KnowledgeBase>>,
    route: String,
    query: String,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let format = Format::from_accept(headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()));
    let request = Request {
        route,
        query,
        format,
        verbose: params
            .get("verbose")
            .is_some_and(|v| !matches!(v.as_str(), "false" | "0")),
        callback: params.get("callback").cloned(),
    };

    match tokio::task::spawn_blocking(move || kb.handle(&request)).await {
        Ok(response) => (
            [
                (header::CONTENT_TYPE, response.content_type),
                (header::CACHE_CONTROL, NO_CACHE),
            ],
            response.body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "request task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, BACKEND_FAILURE_MESSAGE).into_response()
        }
    }
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = KbConfig::resolve(cli.config.as_deref(), cli.overrides)?;
    let addr = format!("{}:{}", config.bind, config.port);

    let kb = tokio::task::spawn_blocking(move || KnowledgeBase::open(config))
        .await
        .into_diagnostic()??;
    let kb = Arc::new(kb);

    tracing::info!(?kb, "owlkb server initialized");

    let app = Router::new()
        .route("/health", get(health))
        .route("/{route}", get(route_empty))
        .route("/{route}/{*query}", get(route_query))
        .layer(CorsLayer::permissive())
        .with_state(kb);

    tracing::info!("owlkb server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await.into_diagnostic()?;
    axum::serve(listener, app).await.into_diagnostic()?;
    Ok(())
}
