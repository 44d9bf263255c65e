use grid_core::{FieldMap, ParamValue};
use grid_store::ResultStore;

fn fields(pairs: &[(&str, ParamValue)]) -> FieldMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn missing_table_is_not_a_duplicate() {
    let store = ResultStore::open_in_memory().expect("open");
    let candidate = fields(&[("a", ParamValue::Int(1))]);
    assert!(!store.dedup_exists("results", &candidate).expect("dedup"));
}

#[test]
fn exact_match_on_surviving_fields() {
    let store = ResultStore::open_in_memory().expect("open");
    let row = fields(&[("a", ParamValue::Int(1)), ("b", ParamValue::Int(2))]);
    store.insert("results", &row).expect("insert");

    // Same surviving fields: duplicate (run_at was already filtered by the caller).
    let dup = fields(&[("a", ParamValue::Int(1)), ("b", ParamValue::Int(2))]);
    assert!(store.dedup_exists("results", &dup).expect("dedup"));

    // Different value: not a duplicate.
    let other = fields(&[("a", ParamValue::Int(1)), ("b", ParamValue::Int(3))]);
    assert!(!store.dedup_exists("results", &other).expect("dedup"));
}

#[test]
fn candidate_with_unknown_column_is_new() {
    let store = ResultStore::open_in_memory().expect("open");
    let row = fields(&[("a", ParamValue::Int(1)), ("b", ParamValue::Int(2))]);
    store.insert("results", &row).expect("insert");

    // A field the store has never seen means the combination is new.
    let candidate = fields(&[
        ("a", ParamValue::Int(1)),
        ("b", ParamValue::Int(2)),
        ("nproc", ParamValue::Int(4)),
    ]);
    assert!(!store.dedup_exists("results", &candidate).expect("dedup"));
}

#[test]
fn text_and_numeric_fields_compare_by_equality() {
    let store = ResultStore::open_in_memory().expect("open");
    let row = fields(&[
        ("a", ParamValue::Int(2)),
        ("b", ParamValue::Text("3".to_string())),
        ("e", ParamValue::Int(4)),
    ]);
    store.insert("results", &row).expect("insert");
    assert!(store.dedup_exists("results", &row).expect("dedup"));

    let near = fields(&[
        ("a", ParamValue::Int(2)),
        ("b", ParamValue::Text("30".to_string())),
        ("e", ParamValue::Int(4)),
    ]);
    assert!(!store.dedup_exists("results", &near).expect("dedup"));
}
