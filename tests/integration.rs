//! End-to-end tests for the owlkb service.
//!
//! Each test copies the Turtle fixtures under `tests/data/` into a temporary
//! directory, loads them with their import closure and talks to the service
//! through `KnowledgeBase::handle`, the same entry point the server uses.

use std::path::Path;
use std::sync::{Arc, Barrier};

use owlkb::config::KbConfig;
use owlkb::expr::safety::{DISJUNCTION_MESSAGE, NEGATION_MESSAGE};
use owlkb::service::{KnowledgeBase, Request, UNRECOGNIZED_MESSAGE};
use serde_json::{Value, json};

const NS: &str = "http://example.org/ricordo.owl#RICORDO_";

fn fixture_dir() -> tempfile::TempDir {
    let dir = tempfile::TempDir::new().unwrap();
    let data = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data");
    for name in ["ricordo.ttl", "pato.ttl"] {
        std::fs::copy(data.join(name), dir.path().join(name)).unwrap();
    }
    dir
}

fn config(dir: &Path, save: bool) -> KbConfig {
    let mut config = KbConfig {
        kb_file: dir.join("ricordo.ttl"),
        namespace: NS.into(),
        save,
        remote_timeout_ms: 200,
        ..KbConfig::default()
    };
    // Closed local port: count lookups fail fast and fall back to "?".
    config.graph_service.url = "http://127.0.0.1:9".into();
    config
}

fn open(dir: &Path) -> KnowledgeBase {
    KnowledgeBase::open(config(dir, false)).unwrap()
}

fn json_body(kb: &KnowledgeBase, route: &str, query: &str) -> Value {
    let body = kb.handle(&Request::new(route, query).json()).body;
    serde_json::from_str(&body).unwrap_or_else(|e| panic!("{route}/{query}: {e}: {body}"))
}

fn sorted(value: &Value) -> Vec<String> {
    let mut out: Vec<String> = value
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    out.sort();
    out
}

#[test]
fn loads_primary_and_imports() {
    let dir = fixture_dir();
    let kb = open(dir.path());
    let info = kb.info();
    assert_eq!(info.modules, 2);
    assert!(!info.save);
    assert_eq!(
        sorted(&json_body(&kb, "directsubterms", "PATO_0000001")),
        vec!["PATO_0000014", "PATO_0000070", "PATO_0000122"]
    );
}

#[test]
fn labels_come_from_imports_or_fall_back() {
    let dir = fixture_dir();
    let kb = open(dir.path());
    assert_eq!(json_body(&kb, "labels", "PATO_0000014"), json!(["color"]));
    assert_eq!(json_body(&kb, "labels", "PATO_0000122"), json!(["(Unlabeled class)"]));
    assert_eq!(json_body(&kb, "search", "Color"), json!(["PATO_0000014"]));
}

#[test]
fn labels_resolve_inside_expressions() {
    let dir = fixture_dir();
    let kb = open(dir.path());
    assert_eq!(
        json_body(&kb, "eqterms", "'volume' and part_of some 'blood'"),
        json!(["RICORDO_1"])
    );
}

#[test]
fn materialization_is_idempotent_over_syntax() {
    let dir = fixture_dir();
    let kb = open(dir.path());
    let before = kb.info().concepts;

    let first = json_body(&kb, "eqterms", "PATO_0000014 and part_of some FMA_9670");
    assert_eq!(first, json!(["RICORDO_2"]));
    for text in [
        "part_of some FMA_9670 and PATO_0000014",
        "PATO_0000014 and (part_of some FMA_9670 and PATO_0000014)",
    ] {
        assert_eq!(json_body(&kb, "eqterms", text), first);
    }
    assert_eq!(kb.info().concepts, before + 1);

    // The new term is classified under both conjuncts.
    assert!(sorted(&json_body(&kb, "subterms", "PATO_0000014")).contains(&"RICORDO_2".to_string()));
    assert!(sorted(&json_body(&kb, "subterms", "part_of some FMA_9670")).contains(&"RICORDO_2".to_string()));
}

#[test]
fn concurrent_equivalent_requests_create_one_term() {
    let dir = fixture_dir();
    let kb = Arc::new(open(dir.path()));
    let before = kb.info().concepts;

    let phrasings = [
        "PATO_0000070 and part_of some FMA_7088",
        "part_of some FMA_7088 and PATO_0000070",
        "(part_of some FMA_7088) and PATO_0000070 and PATO_0000070",
        "'amount' and part_of some 'Heart'",
    ];
    let barrier = Arc::new(Barrier::new(16));
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let kb = Arc::clone(&kb);
            let barrier = Arc::clone(&barrier);
            let text = phrasings[i % phrasings.len()];
            std::thread::spawn(move || {
                barrier.wait();
                kb.handle(&Request::new("eqterms", text).json()).body
            })
        })
        .collect();
    let bodies: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(bodies.iter().all(|b| *b == bodies[0]), "{bodies:?}");
    assert_eq!(serde_json::from_str::<Value>(&bodies[0]).unwrap(), json!(["RICORDO_2"]));
    assert_eq!(kb.info().concepts, before + 1);
}

#[test]
fn disallowed_operators_create_nothing() {
    let dir = fixture_dir();
    let kb = open(dir.path());
    let before = kb.info().concepts;

    let or = kb.handle(&Request::new("eqterms", "PATO_0000014 or PATO_0000070"));
    assert_eq!(or.body, DISJUNCTION_MESSAGE);
    let not = kb.handle(&Request::new("eqterms", "not PATO_0000014"));
    assert_eq!(not.body, NEGATION_MESSAGE);
    assert_eq!(kb.info().concepts, before);
}

#[test]
fn subhierarchy_ends_in_empty_leaves() {
    let dir = fixture_dir();
    let kb = open(dir.path());
    let tree = json_body(&kb, "subhierarchy", "PATO_0000001");
    assert_eq!(tree["term"], "PATO_0000001");
    assert_eq!(tree["label"], "quality");

    fn leaves(node: &Value, out: &mut Vec<String>) {
        let children = node["subterms"].as_array().unwrap();
        if children.is_empty() {
            out.push(node["term"].as_str().unwrap().to_string());
        }
        for child in children {
            leaves(child, out);
        }
    }
    let mut found = Vec::new();
    leaves(&tree, &mut found);
    found.sort();
    assert_eq!(found, vec!["PATO_0000014", "PATO_0000122", "RICORDO_1"]);
}

#[test]
fn siblings_record_their_parent() {
    let dir = fixture_dir();
    let kb = open(dir.path());
    let body = kb
        .handle(&Request::new("siblings", "PATO_0000014").json().verbose())
        .body;
    let value: Value = serde_json::from_str(&body).unwrap();
    let mut terms: Vec<(String, String)> = value
        .as_array()
        .unwrap()
        .iter()
        .map(|e| (e["term"].as_str().unwrap().into(), e["parent"].as_str().unwrap().into()))
        .collect();
    terms.sort();
    assert_eq!(
        terms,
        vec![
            ("PATO_0000070".into(), "PATO_0000001".into()),
            ("PATO_0000122".into(), "PATO_0000001".into()),
        ]
    );
}

#[test]
fn graph_export_edges_and_batch_bound() {
    let dir = fixture_dir();
    let kb = open(dir.path());

    let export = json_body(&kb, "apinatomy", "fma:7101,fma:7088,fma:0000");
    let entries = export.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["_id"], "fma:7101");
    assert_eq!(entries[0]["name"], "Left ventricle (?)");
    assert_eq!(
        entries[0]["sub"],
        json!([{"type": "regional part", "entity": {"_id": "fma:7088"}}])
    );

    let too_many: Vec<String> = (0..251).map(|i| format!("fma:{i}")).collect();
    let body = kb.handle(&Request::new("apinatomy", too_many.join(","))).body;
    assert_eq!(body, "[]");
}

#[test]
fn rdfstore_and_unknown_routes() {
    let dir = fixture_dir();
    let kb = open(dir.path());
    assert_eq!(
        kb.handle(&Request::new("rdfstore", "PATO_0000014")).body,
        "http://purl.obolibrary.org/obo/PATO_0000014"
    );
    assert_eq!(kb.handle(&Request::new("nonsense", "PATO_0000014")).body, UNRECOGNIZED_MESSAGE);
}

#[test]
fn missing_knowledge_base_fails_to_open() {
    let dir = tempfile::TempDir::new().unwrap();
    assert!(KnowledgeBase::open(config(dir.path(), false)).is_err());
}
