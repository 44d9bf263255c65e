use std::collections::BTreeSet;
use std::path::PathBuf;

use grid_core::{FieldMap, ParamValue, RunOptions};
use grid_run::{run_worker, ExperimentManifest};
use grid_store::{ResultStore, AUDIT_TABLE};
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    db_path: PathBuf,
    manifest_dir: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let db_path = dir.path().join("results.sqlite");
        let manifest_dir = dir.path().join("manifests");
        Self {
            _dir: dir,
            db_path,
            manifest_dir,
        }
    }

    fn binding(&self) -> FieldMap {
        [
            ("a".to_string(), ParamValue::Int(2)),
            ("b".to_string(), ParamValue::Text("3".to_string())),
            ("run_at".to_string(), ParamValue::Text("T".to_string())),
        ]
        .into_iter()
        .collect()
    }

    /// Creates the audit row and writes a manifest, as the controller does.
    fn manifest(&self, command: &str, expect: &[&str], options: RunOptions) -> PathBuf {
        let store = ResultStore::open(&self.db_path).expect("store");
        let audit_key = store.create_audit(&self.binding()).expect("audit");
        let manifest = ExperimentManifest {
            binding: self.binding(),
            command: command.to_string(),
            database: self.db_path.clone(),
            table: "results".to_string(),
            expect: expect.iter().map(|f| f.to_string()).collect(),
            ignore: BTreeSet::new(),
            parser_pattern: Some(r"(?P<ao>\d+)\s+(?P<bo>\d+)\s+(?P<co>\w+)".to_string()),
            options,
            audit_key,
        };
        manifest
            .write(&self.manifest_dir, &format!("{audit_key}"))
            .expect("manifest")
    }

    fn store(&self) -> ResultStore {
        ResultStore::open(&self.db_path).expect("store")
    }
}

#[test]
fn successful_run_inserts_results_and_clears_the_audit_error() {
    let fx = Fixture::new();
    let path = fx.manifest("printf '12 34 abc\\n'", &["ao", "bo", "co"], RunOptions::default());
    let report = run_worker(&path).expect("worker");
    assert_eq!(report.error, "");
    assert_eq!(report.inserted, 1);

    let store = fx.store();
    let results = store.rows("results", &FieldMap::new()).expect("results");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["ao"], ParamValue::Int(12));
    assert_eq!(results[0]["co"], ParamValue::Text("abc".to_string()));
    // The binding's fields ride along with the parsed ones.
    assert_eq!(results[0]["a"], ParamValue::Int(2));

    let audits = store.rows(AUDIT_TABLE, &FieldMap::new()).expect("audits");
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0]["error"], ParamValue::Text(String::new()));
    let ParamValue::Text(dump) = &audits[0]["results"] else {
        panic!("results dump missing");
    };
    assert!(dump.contains("\"ao\""));
    // Worker-side provenance was stamped onto the audit row.
    assert!(audits[0].contains_key("started_at"));
}

#[test]
fn nonzero_exit_audits_the_failure_and_inserts_nothing() {
    let fx = Fixture::new();
    let path = fx.manifest("exit 3", &["ao"], RunOptions::default());
    let report = run_worker(&path).expect("worker");
    assert_eq!(report.error, "exit status: 3");
    assert_eq!(report.inserted, 0);

    let store = fx.store();
    assert!(!store.table_exists("results").expect("exists"));
    let audits = store.rows(AUDIT_TABLE, &FieldMap::new()).expect("audits");
    assert_eq!(
        audits[0]["error"],
        ParamValue::Text("exit status: 3".to_string())
    );
}

#[test]
fn missing_expected_field_suppresses_every_insertion() {
    let fx = Fixture::new();
    // Output parses, but the pattern only yields ao and bo.
    let path = fx.manifest("printf '12 34 abc\\n'", &["ao", "bo", "co", "do"], {
        RunOptions::default()
    });
    // Narrow the pattern so co is genuinely missing from the record.
    let manifest = ExperimentManifest::load(&path).expect("load");
    let narrowed = ExperimentManifest {
        parser_pattern: Some(r"(?P<ao>\d+)\s+(?P<bo>\d+)".to_string()),
        ..manifest
    };
    let path = narrowed
        .write(&fx.manifest_dir, "narrowed")
        .expect("rewrite");

    let report = run_worker(&path).expect("worker");
    assert!(report.error.starts_with("missing: ["));
    assert!(report.error.contains("co"));
    assert_eq!(report.inserted, 0);

    let store = fx.store();
    assert!(!store.table_exists("results").expect("exists"));
    let audits = store.rows(AUDIT_TABLE, &FieldMap::new()).expect("audits");
    let ParamValue::Text(error) = &audits[0]["error"] else {
        panic!("error missing");
    };
    assert!(error.contains("missing"));
}

#[test]
fn unparsable_output_audits_no_results() {
    let fx = Fixture::new();
    let path = fx.manifest("printf 'nothing structured here\\n'", &["ao"], {
        RunOptions::default()
    });
    let report = run_worker(&path).expect("worker");
    assert_eq!(report.error, "no results");
    assert_eq!(report.inserted, 0);
}

#[test]
fn no_insert_runs_and_audits_but_skips_result_rows() {
    let fx = Fixture::new();
    let options = RunOptions {
        no_insert: true,
        ..RunOptions::default()
    };
    let path = fx.manifest("printf '12 34 abc\\n'", &["ao", "bo", "co"], options);
    let report = run_worker(&path).expect("worker");
    assert_eq!(report.error, "");
    assert_eq!(report.inserted, 0);

    let store = fx.store();
    assert!(!store.table_exists("results").expect("exists"));
    let audits = store.rows(AUDIT_TABLE, &FieldMap::new()).expect("audits");
    assert_eq!(audits[0]["error"], ParamValue::Text(String::new()));
}

#[test]
fn multiple_records_insert_one_row_each() {
    let fx = Fixture::new();
    let store = ResultStore::open(&fx.db_path).expect("store");
    let audit_key = store.create_audit(&fx.binding()).expect("audit");
    let manifest = ExperimentManifest {
        binding: fx.binding(),
        command: "printf 'n=1\\nn=2\\nn=3\\n'".to_string(),
        database: fx.db_path.clone(),
        table: "results".to_string(),
        expect: ["n".to_string()].into_iter().collect(),
        ignore: BTreeSet::new(),
        parser_pattern: Some(r"n=(?P<n>\d+)".to_string()),
        options: RunOptions::default(),
        audit_key,
    };
    let path = manifest.write(&fx.manifest_dir, "multi").expect("write");
    let report = run_worker(&path).expect("worker");
    assert_eq!(report.error, "");
    assert_eq!(report.inserted, 3);
    let rows = fx.store().rows("results", &FieldMap::new()).expect("rows");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2]["n"], ParamValue::Int(3));
}
