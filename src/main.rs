//! owlkb CLI: query a knowledge base without running the server.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use owlkb::config::{KbConfig, Overrides};
use owlkb::service::{KnowledgeBase, Request, Route};

#[derive(Parser)]
#[command(name = "owlkb", version, about = "OWL knowledge-base query tool")]
struct Cli {
    /// TOML config file.
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one request, as the server would.
    Query {
        /// Route name, e.g. subterms, eqterms, labels.
        route: String,

        /// Request payload: an expression, short id or label.
        text: String,

        /// Render JSON instead of HTML.
        #[arg(long)]
        json: bool,

        /// Annotate identifier lists with labels.
        #[arg(long)]
        verbose: bool,

        /// JSONP callback for document routes.
        #[arg(long)]
        callback: Option<String>,
    },

    /// Show knowledge-base statistics.
    Info {
        #[arg(long)]
        json: bool,
    },

    /// List the routes the service answers.
    Routes,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Routes = cli.command {
        for route in Route::ALL {
            println!("{route}");
        }
        return Ok(());
    }

    let config = KbConfig::resolve(cli.config.as_deref(), cli.overrides)?;
    let kb = KnowledgeBase::open(config)?;

    match cli.command {
        Commands::Query {
            route,
            text,
            json,
            verbose,
            callback,
        } => {
            let mut request = Request::new(route, text);
            if json {
                request = request.json();
            }
            request.verbose = verbose;
            request.callback = callback;
            println!("{}", kb.handle(&request).body);
        }
        Commands::Info { json } => {
            let info = kb.info();
            if json {
                println!("{}", serde_json::to_string_pretty(&info).into_diagnostic()?);
            } else {
                println!("{info}");
            }
        }
        Commands::Routes => {}
    }

    Ok(())
}
