//! Controller and worker joined up over a scripted scheduler: submissions
//! write manifests, workers execute them for real, and a second pass dedups
//! against what the workers stored.

use std::path::{Path, PathBuf};

use grid_batch::testing::ScriptedScheduler;
use grid_core::{FieldMap, ParamValue, RunOptions};
use grid_run::{run_worker, Controller};
use grid_store::{ResultStore, AUDIT_TABLE};
use grid_sweep::SweepFile;
use tempfile::TempDir;

const SWEEP: &str = "\
command: \"echo %{a} %{b}\"
table: bench
params:
  a: [1, 2]
  b: [\"x\", \"y\", \"z\"]
parser:
  pattern: \"(?P<ao>\\\\d+) (?P<bo>\\\\w+)\"
expect: [ao, bo]
";

struct Fixture {
    _dir: TempDir,
    db_path: PathBuf,
    manifest_dir: PathBuf,
    sweep_path: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let db_path = dir.path().join("bench.sqlite");
        let manifest_dir = dir.path().join("manifests");
        let sweep_path = dir.path().join("bench.yaml");
        let sweep = format!("{SWEEP}database: \"{}\"\n", db_path.display());
        std::fs::write(&sweep_path, sweep).expect("sweep file");
        Self {
            _dir: dir,
            db_path,
            manifest_dir,
            sweep_path,
        }
    }

    fn controller(&self, options: RunOptions) -> Controller<ScriptedScheduler> {
        let spec = SweepFile::load(&self.sweep_path).expect("load");
        let store = ResultStore::open(&self.db_path).expect("store");
        Controller::new(spec, store, ScriptedScheduler::new(), options)
            .with_manifest_dir(&self.manifest_dir)
            .with_worker_command("gridrun worker")
    }
}

fn manifest_path(worker_command: &str) -> &Path {
    Path::new(
        worker_command
            .strip_prefix("gridrun worker ")
            .expect("worker command shape"),
    )
}

#[test]
fn six_bindings_run_then_dedup_then_force() {
    let fx = Fixture::new();

    // First pass: the whole product is new.
    let mut controller = fx.controller(RunOptions::default());
    let report = controller.submit_all().expect("first pass");
    assert_eq!(report.submitted.len(), 6);

    // "Run" each job the way the scheduler would: invoke the worker on the
    // manifest embedded in the submitted command.
    for (_, _, worker_command) in &controller.scheduler().submissions {
        let report = run_worker(manifest_path(worker_command)).expect("worker");
        assert_eq!(report.error, "");
        assert_eq!(report.inserted, 1);
    }

    let store = ResultStore::open(&fx.db_path).expect("store");
    let results = store.rows("bench", &FieldMap::new()).expect("results");
    assert_eq!(results.len(), 6);
    assert_eq!(results[0]["ao"], ParamValue::Int(1));
    let audits = store.rows(AUDIT_TABLE, &FieldMap::new()).expect("audits");
    assert_eq!(audits.len(), 6);
    for audit in &audits {
        assert_eq!(audit["error"], ParamValue::Text(String::new()));
    }

    // Second pass: every combination is already stored.
    let mut second = fx.controller(RunOptions::default());
    let report = second.submit_all().expect("second pass");
    assert!(report.submitted.is_empty());
    assert_eq!(report.skipped, 6);

    // Force bypasses dedup and submits the product again.
    let mut forced = fx.controller(RunOptions {
        force: true,
        ..RunOptions::default()
    });
    let report = forced.submit_all().expect("forced pass");
    assert_eq!(report.submitted.len(), 6);
}
