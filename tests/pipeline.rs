mod common;

use std::fs;

use common::TestWorkspace;
use encoding_rs::UTF_8;
use income_insights::{
    error::{ErrorKind, IncomeError},
    metrics::INCOME_BUCKET_LABELS,
    normalize::{Cell, UNKNOWN_TEXT, normalize},
    query::ClientQuery,
    reader::read_table,
};
use serde_json::Value;

const SEMICOLON_SAMPLE: &str = "id;age;gender;city\n1;30;M;Paris\n2;;F;Lyon\n3;50;M;\n";

fn read_json(path: std::path::PathBuf) -> Value {
    serde_json::from_str(&fs::read_to_string(path).expect("read document")).expect("parse json")
}

#[test]
fn semicolon_upload_is_normalized_with_defaults() {
    let raw = read_table(SEMICOLON_SAMPLE.as_bytes(), UTF_8).expect("read");
    assert_eq!(raw.delimiter, b';');
    let table = normalize(&raw);
    assert_eq!(table.column("age").unwrap().cells[1], Cell::Number(0.0));
    assert_eq!(
        table.column("city").unwrap().cells[2],
        Cell::Text(UNKNOWN_TEXT.to_string())
    );
}

#[test]
fn missing_age_is_scaled_like_age_35() {
    let workspace = TestWorkspace::new();
    let service = workspace.service();
    let missing = service
        .ingest(SEMICOLON_SAMPLE.as_bytes(), "a")
        .expect("ingest");
    let explicit = service
        .ingest(
            "id;age;gender;city\n1;30;M;Paris\n2;35;F;Lyon\n3;50;M;\n".as_bytes(),
            "b",
        )
        .expect("ingest");
    assert_eq!(missing.predictions, explicit.predictions);
}

#[test]
fn reingest_is_deterministic_and_replaces_owner_data() {
    let workspace = TestWorkspace::new();
    let service = workspace.service();
    let first = service
        .ingest(SEMICOLON_SAMPLE.as_bytes(), "u1")
        .expect("first ingest");
    let second = service
        .ingest(SEMICOLON_SAMPLE.as_bytes(), "u1")
        .expect("second ingest");
    assert_eq!(first.predictions, second.predictions);

    for collection in ["users", "metrics", "clients"] {
        let doc = read_json(workspace.data_dir().join(format!("{collection}.json")));
        let keys = doc.as_object().expect("object").keys().collect::<Vec<_>>();
        assert_eq!(keys, vec!["u1"], "collection {collection}");
    }

    let owners = service.list_owners().expect("owners");
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].total_clients, 3);
    let clients = read_json(workspace.data_dir().join("clients.json"));
    assert_eq!(clients["u1"]["total"], 3);
    assert_eq!(clients["u1"]["clients"].as_array().unwrap().len(), 3);
}

#[test]
fn stored_documents_use_expected_shapes() {
    let workspace = TestWorkspace::new();
    let service = workspace.service();
    service
        .ingest(SEMICOLON_SAMPLE.as_bytes(), "u1")
        .expect("ingest");

    let metrics = read_json(workspace.data_dir().join("metrics.json"));
    let bundle = &metrics["u1"];
    let labels = bundle["incomeDistribution"]["labels"].as_array().unwrap();
    assert_eq!(labels.len(), INCOME_BUCKET_LABELS.len());
    let bucket_total: u64 = bundle["incomeDistribution"]["values"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_u64().unwrap())
        .sum();
    assert_eq!(bucket_total, 3);
    assert_eq!(bundle["ageVsIncome"]["ages"][1], Value::Null);
    assert_eq!(bundle["genderDistribution"]["labels"][0], "M");
    assert_eq!(
        bundle["cityDistribution"]["values"].as_array().unwrap().len(),
        2
    );
    assert_eq!(bundle["predictionStats"]["totalUsers"], 3);

    let clients = read_json(workspace.data_dir().join("clients.json"));
    let second = &clients["u1"]["clients"][1];
    assert_eq!(second["id"], "2");
    assert_eq!(second["age"], Value::Null);
    assert_eq!(second["gender"], "F");
    assert!(second["predictedIncome"].as_f64().is_some());
    assert_eq!(clients["u1"]["clients"][2]["city"], Value::Null);

    let users = read_json(workspace.data_dir().join("users.json"));
    assert_eq!(users["u1"]["total_users"], 3);
    assert!(users["u1"]["processed_at"].is_string());
}

#[test]
fn missing_id_column_fails_before_touching_the_store() {
    let workspace = TestWorkspace::new();
    let service = workspace.service();
    let err = service
        .ingest(b"name;age\nAnn;30\nBob;41\n", "u1")
        .expect_err("missing id must fail");
    assert_eq!(err.kind(), ErrorKind::Input);
    match err {
        IncomeError::MissingColumn { column, available } => {
            assert_eq!(column, "id");
            assert_eq!(available, vec!["name", "age"]);
        }
        other => panic!("unexpected error {other:?}"),
    }
    let stored = fs::read_dir(workspace.data_dir())
        .expect("data dir")
        .count();
    assert_eq!(stored, 0);
}

#[test]
fn invalid_utf8_is_an_encoding_error() {
    let workspace = TestWorkspace::new();
    let err = workspace
        .service()
        .ingest(&[b'i', b'd', b'\n', 0xff, b'\n'], "u1")
        .expect_err("invalid utf-8");
    assert!(matches!(err, IncomeError::Encoding { .. }));
}

#[test]
fn search_and_paging_through_the_service() {
    let workspace = TestWorkspace::new();
    let service = workspace.service();
    service
        .ingest(
            b"id;city;gender\n1;Paris;M\n2;Lyon;F\n3;paris;F\n4;Nice;M\n5;PARMA;F\n",
            "u1",
        )
        .expect("ingest");

    let query = ClientQuery::new(2, 2, Some("par")).expect("query");
    let page = service.owner_clients("u1", &query).expect("page");
    assert_eq!(page.total, 3);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.clients.len(), 1);
    assert_eq!(page.clients[0].id, "5");
}

#[test]
fn unknown_owner_gets_an_empty_page() {
    let workspace = TestWorkspace::new();
    let service = workspace.service();
    let query = ClientQuery::new(3, 25, None).expect("query");
    let page = service.owner_clients("nobody", &query).expect("page");
    assert!(page.clients.is_empty());
    assert_eq!(page.total, 0);
    assert_eq!(page.page, 3);
    assert_eq!(page.per_page, 25);
    assert_eq!(page.total_pages, 0);
    assert_eq!(page.user_id, "nobody");
    assert_eq!(service.owner_metrics("nobody").expect("metrics"), None);
}

#[test]
fn non_positive_page_size_is_rejected() {
    let err = ClientQuery::new(1, 0, None).expect_err("zero page size");
    assert_eq!(err.kind(), ErrorKind::Query);
}
