use serde_json::{Value, json};
use sieve::{
    DataDir,
    Engine,
    Settings,
    Snapshot,
    engine,
    records,
    settings::Overrides,
};

fn ids(snapshot: &Snapshot, query: &str) -> Vec<u64> {
    snapshot
        .search(query)
        .unwrap()
        .records
        .into_iter()
        .collect()
}

fn sanctions() -> Vec<Value> {
    vec![
        json!({"type": "P", "name": "Mustafa Ali", "nationality": ["Egypt"]}),
        json!({"type": "P", "name": "Mostafa Kamal", "nationality": ["Iraq", "Syria"]}),
        json!({"type": "P", "name": "Mark Stone", "ids": [{"type": "passport", "number": "X1"}]}),
        json!({"type": "V", "name": "Sea Star", "ids": [{"type": "imo", "number": "9"}]}),
        json!({"type": "E", "name": "Acme Trading", "ids": [{"type": "registry", "number": "77"}]}),
    ]
}

#[test]
fn build_load_and_query_from_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let data_dir = DataDir::resolve(Some(tmp.path())).unwrap();
    let path = tmp.path().join("records.jsonl");
    let lines: Vec<String> = sanctions().iter().map(Value::to_string).collect();
    std::fs::write(&path, lines.join("\n")).unwrap();

    let records = records::load_jsonl(&path).unwrap();
    let (_, summary) =
        engine::build_generation(&data_dir, records, &Settings::default()).unwrap();
    assert_eq!(summary.records, 5);

    let snapshot = engine::load(&data_dir, &Overrides::default()).unwrap();
    assert_eq!(
        ids(&snapshot, r#"{"and": ["type:p", {"or": ["nationality:iraq", "nationality:egypt"]}]}"#),
        vec![0, 1]
    );
    assert_eq!(ids(&snapshot, r#"{"or": ["ids:type:imo"]}"#), vec![3]);

    let (_, stats, settings) = engine::status(&data_dir).unwrap();
    assert_eq!(stats.records, 5);
    assert_eq!(settings, Settings::default());
    assert_eq!(
        engine::field_paths(&data_dir).unwrap(),
        vec!["ids:number", "ids:type", "name", "nationality", "type"]
    );
}

#[test]
fn exact_and_uses_explicit_record_ids() {
    let settings = Settings {
        id_field: Some("uid".into()),
        ..Settings::default()
    };
    let snapshot = Snapshot::build(
        vec![
            json!({"uid": 7, "type": "P", "name": "John Smith"}),
            json!({"uid": 8, "type": "V", "name": "John Smith"}),
        ],
        settings,
    )
    .unwrap();

    assert_eq!(ids(&snapshot, r#"{"and": ["type:p", "name:john"]}"#), vec![7]);
}

#[test]
fn or_unions_postings() {
    let snapshot = Snapshot::build(sanctions(), Settings::default()).unwrap();
    assert_eq!(
        ids(&snapshot, r#"{"or": ["name:mustafa", "name:mostafa"]}"#),
        vec![0, 1]
    );
}

#[test]
fn wildcard_requires_a_stored_extension() {
    let snapshot = Snapshot::build(sanctions(), Settings::default()).unwrap();
    assert!(ids(&snapshot, r#"{"and": [{"or": ["name:mark?"]}]}"#).is_empty());
    assert_eq!(ids(&snapshot, r#"{"and": [{"or": ["name:mar?"]}]}"#), vec![2]);
    assert_eq!(ids(&snapshot, r#"{"or": ["name:m*stafa"]}"#), vec![0, 1]);
}

#[test]
fn expansion_limit_keeps_the_shortest_prefixes() {
    let records: Vec<Value> = (0..50)
        .map(|i| json!({"aliases": [format!("b{}", "a".repeat(i))]}))
        .collect();
    let snapshot = Snapshot::build(records, Settings::default()).unwrap();

    let outcome = snapshot.search(r#"{"and": ["aliases:b*"], "wel": 20}"#).unwrap();
    assert_eq!(
        outcome.records.iter().copied().collect::<Vec<_>>(),
        (0..20).collect::<Vec<u64>>()
    );
    assert!(outcome.truncated());

    let outcome = snapshot.search(r#"{"and": ["aliases:b*"], "wel": 50}"#).unwrap();
    assert_eq!(outcome.count(), 50);
    assert!(!outcome.truncated());
}

#[test]
fn field_qualified_negation_stays_within_its_field() {
    let snapshot = Snapshot::build(sanctions(), Settings::default()).unwrap();

    assert_eq!(ids(&snapshot, r#"{"and": ["!type:p"]}"#), vec![3, 4]);
    assert_eq!(ids(&snapshot, r#"{"and": ["!ids:type:passport"]}"#), vec![3, 4]);
}

#[test]
fn bare_negation_spans_the_whole_corpus() {
    let snapshot = Snapshot::build(sanctions(), Settings::default()).unwrap();

    assert_eq!(ids(&snapshot, r#"{"and": ["!mustafa"]}"#), vec![0, 1, 2, 3, 4]);
    assert!(ids(&snapshot, r#"{"and": ["!*"]}"#).is_empty());
}

#[test]
fn negation_combines_with_other_terms() {
    let snapshot = Snapshot::build(sanctions(), Settings::default()).unwrap();
    assert_eq!(
        ids(&snapshot, r#"{"and": ["type:p", "!nationality:egypt"]}"#),
        vec![1]
    );
}

#[test]
fn projection_selects_fields_with_placeholders() {
    let snapshot = Snapshot::build(sanctions(), Settings::default()).unwrap();
    let outcome = snapshot
        .search(r#"{"or": ["type:v"], "select": ["name", "nationality"]}"#)
        .unwrap();
    assert_eq!(
        outcome.views,
        vec![json!({"name": "Sea Star", "nationality": "unknown field nationality"})]
    );

    let full = snapshot.search(r#"{"or": ["type:v"], "select": []}"#).unwrap();
    assert_eq!(full.views, vec![sanctions()[3].clone()]);
}

#[test]
fn legacy_select_key_and_unknown_keys() {
    let snapshot = Snapshot::build(sanctions(), Settings::default()).unwrap();
    let outcome = snapshot
        .search(r#"{"or": ["type:e"], "filter_fields": ["name"], "limit": 3}"#)
        .unwrap();
    assert_eq!(outcome.views, vec![json!({"name": "Acme Trading"})]);
    assert_eq!(outcome.ignored_keys, vec!["limit"]);
}

#[test]
fn hybrid_generation_resolves_free_text() {
    let tmp = tempfile::tempdir().unwrap();
    let data_dir = DataDir::resolve(Some(tmp.path())).unwrap();
    let settings = Settings {
        hybrid: true,
        k: 1,
        max_distance: 2.0,
        ..Settings::default()
    };
    let (_, summary) =
        engine::build_generation(&data_dir, sanctions(), &settings).unwrap();
    assert_eq!(summary.embedded, summary.prefixes);

    let engine = Engine::new(engine::load(&data_dir, &Overrides::default()).unwrap());
    let outcome = engine.search(r#"{"or": ["name mostafa"]}"#).unwrap();
    assert_eq!(outcome.records.into_iter().collect::<Vec<_>>(), vec![1]);

    let lexical = Engine::new(
        engine::load(
            &data_dir,
            &Overrides {
                hybrid: Some(false),
                ..Overrides::default()
            },
        )
        .unwrap(),
    );
    assert_eq!(lexical.search(r#"{"or": ["name mostafa"]}"#).unwrap().count(), 0);
}

#[test]
fn concurrent_queries_share_one_engine() {
    let engine = std::sync::Arc::new(Engine::new(
        Snapshot::build(sanctions(), Settings::default()).unwrap(),
    ));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            std::thread::spawn(move || {
                engine
                    .search(r#"{"and": ["type:p", "name:m*"]}"#)
                    .unwrap()
                    .count()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 3);
    }
}
