use grid_batch::testing::ScriptedScheduler;
use grid_core::{FieldMap, ParamValue, RunOptions};
use grid_run::Controller;
use grid_store::{ResultStore, AUDIT_TABLE};
use grid_sweep::SweepSpec;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    db_path: std::path::PathBuf,
    manifest_dir: std::path::PathBuf,
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

    fn spec(&self) -> SweepSpec {
        SweepSpec::builder("echo %{a}")
            .list("a", [1i64, 2, 3])
            .database(&self.db_path)
            .table("results")
            .build()
            .expect("spec")
    }

    fn controller(&self, options: RunOptions) -> Controller<ScriptedScheduler> {
        let store = ResultStore::open(&self.db_path).expect("store");
        Controller::new(self.spec(), store, ScriptedScheduler::new(), options)
            .with_manifest_dir(&self.manifest_dir)
            .with_worker_command("gridrun worker")
            .with_job_name("controller_flow")
    }

    fn observer(&self) -> ResultStore {
        ResultStore::open(&self.db_path).expect("observer")
    }
}

#[test]
fn submits_every_binding_and_audits_each() {
    let fx = Fixture::new();
    let mut controller = fx.controller(RunOptions::default());
    let report = controller.submit_all().expect("submit");
    assert_eq!(report.submitted.len(), 3);
    assert_eq!(report.skipped, 0);

    // One audit row per submission, created before any worker ran.
    let audits = fx
        .observer()
        .rows(AUDIT_TABLE, &FieldMap::new())
        .expect("audits");
    assert_eq!(audits.len(), 3);
    for row in &audits {
        assert_eq!(row["error"], ParamValue::Text("x".to_string()));
    }

    // The scheduler got defaulted resources and a worker command pointing
    // at a manifest.
    let subs = &controller.scheduler().submissions;
    assert_eq!(subs.len(), 3);
    assert_eq!(subs[0].1.nodes, 1);
    assert_eq!(subs[0].1.tasks_per_node, 1);
    assert!(subs[0].2.starts_with("gridrun worker "));
    assert!(subs[0].2.contains("manifest."));
}

#[test]
fn dedup_skips_already_stored_combinations() {
    let fx = Fixture::new();
    let store = fx.observer();
    for a in [1i64, 2, 3] {
        let row: FieldMap = [
            ("a".to_string(), ParamValue::Int(a)),
            ("command".to_string(), ParamValue::Text(format!("echo {a}"))),
        ]
        .into_iter()
        .collect();
        store.insert("results", &row).expect("seed");
    }

    let mut controller = fx.controller(RunOptions::default());
    let report = controller.submit_all().expect("submit");
    assert_eq!(report.submitted.len(), 0);
    assert_eq!(report.skipped, 3);

    // Force bypasses the dedup check.
    let mut forced = fx.controller(RunOptions {
        force: true,
        ..RunOptions::default()
    });
    let report = forced.submit_all().expect("submit");
    assert_eq!(report.submitted.len(), 3);
}

#[test]
fn changed_value_is_not_a_duplicate() {
    let fx = Fixture::new();
    let store = fx.observer();
    // Only a=1 was ever stored.
    let row: FieldMap = [
        ("a".to_string(), ParamValue::Int(1)),
        ("command".to_string(), ParamValue::Text("echo 1".to_string())),
    ]
    .into_iter()
    .collect();
    store.insert("results", &row).expect("seed");

    let mut controller = fx.controller(RunOptions::default());
    let report = controller.submit_all().expect("submit");
    assert_eq!(report.submitted.len(), 2);
    assert_eq!(report.skipped, 1);
}

#[test]
fn dry_run_renders_but_submits_nothing() {
    let fx = Fixture::new();
    let mut controller = fx.controller(RunOptions {
        dry_run: true,
        ..RunOptions::default()
    });
    let report = controller.submit_all().expect("submit");
    assert_eq!(report.dry_runs, 3);
    assert!(report.submitted.is_empty());
    assert!(controller.scheduler().submissions.is_empty());

    // No audit rows either: nothing was submitted.
    let audits = fx
        .observer()
        .rows(AUDIT_TABLE, &FieldMap::new())
        .expect("audits");
    assert!(audits.is_empty());
}

#[test]
fn submission_failure_skips_only_that_binding() {
    let fx = Fixture::new();
    let mut controller = fx.controller(RunOptions::default());
    // First sbatch acknowledgment is unparsable; the rest succeed.
    {
        let store = ResultStore::open(&fx.db_path).expect("store");
        let mut scheduler = ScriptedScheduler::new();
        scheduler.fail_next_submit = true;
        let mut failing = Controller::new(fx.spec(), store, scheduler, RunOptions::default())
            .with_manifest_dir(&fx.manifest_dir);
        let report = failing.submit_all().expect("submit");
        assert_eq!(report.failures, 1);
        assert_eq!(report.submitted.len(), 2);
    }
    // An untouched controller still submits all three.
    let report = controller.submit_all().expect("submit");
    assert_eq!(report.submitted.len(), 3);
}

#[test]
fn status_replaces_tracked_snapshots_and_tolerates_zero_jobs() {
    let fx = Fixture::new();
    let mut controller = fx.controller(RunOptions::default());
    let report = controller.submit_all().expect("submit");
    assert_eq!(report.submitted.len(), 3);

    let snapshots = controller.status().expect("status");
    assert_eq!(snapshots.len(), 3);

    // A scheduler that knows nothing means everything finished.
    let mut idle = Controller::new(
        fx.spec(),
        ResultStore::open(&fx.db_path).expect("store"),
        ScriptedScheduler::new(),
        RunOptions::default(),
    );
    let snapshots = idle.status().expect("status");
    assert!(snapshots.is_empty());
}

#[test]
fn cancel_is_a_noop_for_unknown_jobs() {
    let fx = Fixture::new();
    let mut controller = fx.controller(RunOptions::default());
    controller.cancel(424242).expect("cancel unknown");
    assert!(controller.scheduler().cancels.is_empty());

    let report = controller.submit_all().expect("submit");
    let id = report.submitted[0];
    controller.cancel(id).expect("cancel live");
    assert_eq!(controller.scheduler().cancels, vec![id]);
}
