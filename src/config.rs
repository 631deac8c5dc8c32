//! Service configuration, read from TOML.
//!
//! Every key is optional. Command-line flags override file values; see
//! [`KbConfig::apply_overrides`].

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::concept::short_form;
use crate::error::{ConfigError, KbResult};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbConfig {
    /// Knowledge-base file (the primary module).
    #[serde(default = "default_kb_file")]
    pub kb_file: PathBuf,
    /// IRI prefix for new terms, ending in the local-name prefix.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Write the knowledge base back after each mutation.
    #[serde(default = "default_true")]
    pub save: bool,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Timeout for every remote call, in milliseconds.
    #[serde(default = "default_remote_timeout_ms")]
    pub remote_timeout_ms: u64,
    #[serde(default)]
    pub translator: TranslatorConfig,
    #[serde(default)]
    pub graph_service: GraphServiceConfig,
    #[serde(default)]
    pub export: ExportConfig,
    /// Import IRI → local file, consulted before the default location.
    #[serde(default)]
    pub imports: HashMap<String, PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatorConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Base URL; the percent-encoded request text is appended.
    #[serde(default = "default_translator_url")]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphServiceConfig {
    #[serde(default = "default_graph_url")]
    pub url: String,
    /// Prepended to a short id to form the IRI sent to `count-recursive`.
    #[serde(default = "default_count_iri_prefix")]
    pub count_iri_prefix: String,
    /// Textual expansions applied to `subgraph` and `shortestpath` payloads.
    #[serde(default = "default_expansions")]
    pub expansions: BTreeMap<String, String>,
}

/// How a cached document's key is matched against the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    Exact,
    Prefix,
}

/// A pre-generated export document served from disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedDocument {
    pub key: String,
    #[serde(rename = "match")]
    pub mode: MatchMode,
    pub file: PathBuf,
}

impl CachedDocument {
    pub fn matches(&self, request: &str) -> bool {
        match self.mode {
            MatchMode::Exact => request == self.key,
            MatchMode::Prefix => request.starts_with(&self.key),
        }
    }
}

/// Client-facing id prefix and the local prefix it stands for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub alias: String,
    pub local: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Requests naming more ids than this return an empty document.
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
    /// Relation short form → edge type, for told `r some F` superclasses.
    #[serde(default = "default_relations")]
    pub relations: BTreeMap<String, String>,
    #[serde(default = "default_aliases")]
    pub aliases: Vec<Alias>,
    /// Directory cached documents are read from.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_cached")]
    pub cached: Vec<CachedDocument>,
}

fn default_kb_file() -> PathBuf {
    "ricordo.owl".into()
}
fn default_namespace() -> String {
    "http://www.ricordo.eu/ricordo.owl#RICORDO_".into()
}
fn default_true() -> bool {
    true
}
fn default_bind() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    20080
}
fn default_remote_timeout_ms() -> u64 {
    1000
}
fn default_translator_url() -> String {
    "http://open-physiology.org:5052/uclsyntax/".into()
}
fn default_graph_url() -> String {
    "http://open-physiology.org:5053".into()
}
fn default_count_iri_prefix() -> String {
    "http://purl.org/obo/owlapi/fma%23".into()
}
fn default_expansions() -> BTreeMap<String, String> {
    BTreeMap::from([(
        "fma:".to_string(),
        "http://purl.org/obo/owlapi/fma%23FMA_".to_string(),
    )])
}
fn default_max_batch() -> usize {
    250
}
fn default_relations() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("regional_part".to_string(), "regional part".to_string()),
        ("constitutional_part".to_string(), "constitutional part".to_string()),
    ])
}
fn default_aliases() -> Vec<Alias> {
    vec![Alias {
        alias: "fma:".into(),
        local: "FMA_".into(),
    }]
}
fn default_cache_dir() -> PathBuf {
    ".".into()
}
fn default_cached() -> Vec<CachedDocument> {
    vec![
        CachedDocument {
            key: "24tile".into(),
            mode: MatchMode::Prefix,
            file: "24tiles.dat".into(),
        },
        CachedDocument {
            key: "pkpd_base".into(),
            mode: MatchMode::Exact,
            file: "pkpdroot.dat".into(),
        },
    ]
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_translator_url(),
        }
    }
}

impl Default for GraphServiceConfig {
    fn default() -> Self {
        Self {
            url: default_graph_url(),
            count_iri_prefix: default_count_iri_prefix(),
            expansions: default_expansions(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_batch: default_max_batch(),
            relations: default_relations(),
            aliases: default_aliases(),
            cache_dir: default_cache_dir(),
            cached: default_cached(),
        }
    }
}

impl Default for KbConfig {
    fn default() -> Self {
        Self {
            kb_file: default_kb_file(),
            namespace: default_namespace(),
            save: true,
            bind: default_bind(),
            port: default_port(),
            remote_timeout_ms: default_remote_timeout_ms(),
            translator: TranslatorConfig::default(),
            graph_service: GraphServiceConfig::default(),
            export: ExportConfig::default(),
            imports: HashMap::new(),
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct Overrides {
    /// Knowledge-base file.
    #[arg(long = "file", visible_alias = "kbfile", global = true)]
    pub kb_file: Option<PathBuf>,
    #[arg(long, short = 'p', global = true)]
    pub port: Option<u16>,
    /// IRI prefix for new terms.
    #[arg(long, visible_alias = "kbns", global = true)]
    pub namespace: Option<String>,
    /// Write the knowledge base back after mutations (true/false).
    #[arg(long, value_parser = parse_switch, global = true)]
    pub save: Option<bool>,
    /// Translate requests through the remote syntax translator (true/false).
    #[arg(long = "uclsyntax", value_parser = parse_switch, global = true)]
    pub translator: Option<bool>,
}

/// Accepts `t`/`true`/`f`/`false`.
fn parse_switch(value: &str) -> Result<bool, String> {
    match value {
        "t" | "true" => Ok(true),
        "f" | "false" => Ok(false),
        other => Err(format!("expected true or false, got \"{other}\"")),
    }
}

impl KbConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> KbResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// File values (or defaults when no file is given) with `overrides` applied.
    pub fn resolve(path: Option<&Path>, overrides: Overrides) -> KbResult<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_overrides(overrides)?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) -> KbResult<()> {
        if let Some(file) = overrides.kb_file {
            self.kb_file = file;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(namespace) = overrides.namespace {
            self.namespace = namespace;
        }
        if let Some(save) = overrides.save {
            self.save = save;
        }
        if let Some(enabled) = overrides.translator {
            self.translator.enabled = enabled;
        }
        self.validate()
    }

    /// The namespace must leave a non-empty local-name prefix, e.g. `RICORDO_`.
    pub fn validate(&self) -> KbResult<()> {
        let local = short_form(&self.namespace);
        if local.is_empty() || local == self.namespace {
            return Err(ConfigError::Namespace {
                namespace: self.namespace.clone(),
            }
            .into());
        }
        Ok(())
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: KbConfig = toml::from_str("").unwrap();
        assert_eq!(config.port, 20080);
        assert!(config.save);
        assert!(!config.translator.enabled);
        assert_eq!(config.export.max_batch, 250);
        assert_eq!(config.export.relations["regional_part"], "regional part");
        assert_eq!(config.remote_timeout(), Duration::from_millis(1000));
        config.validate().unwrap();
    }

    #[test]
    fn parses_nested_sections() {
        let config: KbConfig = toml::from_str(
            r#"
            kb_file = "/srv/kb/ricordo.owl"
            save = false

            [translator]
            enabled = true

            [export]
            max_batch = 10

            [[export.cached]]
            key = "demo"
            match = "exact"
            file = "demo.json"

            [imports]
            "http://purl.org/obo/owl/PATO" = "/srv/kb/pato.owl"
            "#,
        )
        .unwrap();
        assert!(!config.save);
        assert!(config.translator.enabled);
        assert_eq!(config.export.max_batch, 10);
        assert_eq!(config.export.cached.len(), 1);
        assert!(config.export.cached[0].matches("demo"));
        assert!(!config.export.cached[0].matches("demo2"));
        assert_eq!(config.imports.len(), 1);
    }

    #[test]
    fn overrides_win() {
        let mut config = KbConfig::default();
        config
            .apply_overrides(Overrides {
                port: Some(8080),
                save: Some(false),
                translator: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(config.port, 8080);
        assert!(!config.save);
        assert!(config.translator.enabled);
    }

    #[test]
    fn namespace_needs_local_prefix() {
        let mut config = KbConfig::default();
        let err = config.apply_overrides(Overrides {
            namespace: Some("urn".into()),
            ..Default::default()
        });
        assert!(err.is_err());
    }

    #[test]
    fn switches_accept_short_forms() {
        assert_eq!(parse_switch("t"), Ok(true));
        assert_eq!(parse_switch("false"), Ok(false));
        assert!(parse_switch("yes").is_err());
    }

    #[test]
    fn load_reports_path_on_bad_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("owlkb.toml");
        std::fs::write(&path, "port = \"many\"").unwrap();
        let err = KbConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("owlkb.toml"));
    }
}
