//! Controller side of a sweep: enumerate, dedup, submit, track.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use grid_batch::{output_path_template, work_dir, JobSnapshot, JobState, ResourceRequest, Scheduler};
use grid_core::{FieldMap, GridError, ParamValue, RunOptions, RunStamp};
use grid_store::ResultStore;
use grid_sweep::{dedup_view, enumerate, pretty_binding, render_command, SweepSpec};

use crate::attach::{attach, AttachOutcome, AttachPacing, CancelToken};
use crate::manifest::ExperimentManifest;

/// Outcome tally for one `submit_all` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitReport {
    /// Scheduler ids of submitted jobs, in submission order.
    pub submitted: Vec<u64>,
    /// Bindings skipped because the store already held a matching row.
    pub skipped: usize,
    /// Bindings printed but not submitted under `dry_run`.
    pub dry_runs: usize,
    /// Bindings that failed to render or submit; the pass continued.
    pub failures: usize,
}

/// Single-threaded driver owning the in-memory job tracking state.
///
/// The store has no exclusive owner: workers write to it concurrently,
/// coordinated only by dedup checks and additive schema rules.
pub struct Controller<S: Scheduler> {
    spec: SweepSpec,
    store: ResultStore,
    scheduler: S,
    options: RunOptions,
    job_name: String,
    worker_command: String,
    manifest_dir: PathBuf,
    jobs: BTreeMap<u64, JobSnapshot>,
    bindings: BTreeMap<u64, FieldMap>,
}

impl<S: Scheduler> Controller<S> {
    /// New controller over an opened store and scheduler binding.
    pub fn new(spec: SweepSpec, store: ResultStore, scheduler: S, options: RunOptions) -> Self {
        Self {
            spec,
            store,
            scheduler,
            options,
            job_name: "gridrun".to_string(),
            worker_command: "gridrun worker".to_string(),
            manifest_dir: work_dir(),
            jobs: BTreeMap::new(),
            bindings: BTreeMap::new(),
        }
    }

    /// Sets the queue-visible job name (normally the sweep file stem).
    pub fn with_job_name(mut self, name: impl Into<String>) -> Self {
        self.job_name = name.into();
        self
    }

    /// Overrides the command prefix used to launch workers.
    pub fn with_worker_command(mut self, command: impl Into<String>) -> Self {
        self.worker_command = command.into();
        self
    }

    /// Overrides where manifests are written.
    pub fn with_manifest_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.manifest_dir = dir.into();
        self
    }

    /// The sweep being driven.
    pub fn spec(&self) -> &SweepSpec {
        &self.spec
    }

    /// The scheduler binding, e.g. for inspecting a scripted one in tests.
    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Enumerates the sweep and submits every non-duplicate binding.
    ///
    /// Enumeration failure aborts before any submission. Per-binding
    /// failures (render, submit) are reported and skipped; the pass
    /// continues with the next binding.
    pub fn submit_all(&mut self) -> Result<SubmitReport, GridError> {
        let stamp = RunStamp::now(self.spec.tag.clone());
        let bindings = enumerate(&self.spec, &stamp)?;
        let ignore = self.effective_ignore();
        let mut report = SubmitReport::default();

        for (idx, mut binding) in bindings.into_iter().enumerate() {
            let command = match render_command(&self.spec.command_template, &binding) {
                Ok(command) => command,
                Err(err) => {
                    tracing::error!(%err, "failed to render command; skipping binding");
                    report.failures += 1;
                    continue;
                }
            };
            binding.insert("command".to_string(), ParamValue::Text(command.clone()));

            if self.options.dry_run {
                tracing::info!("<dry run> {}", pretty_binding(&binding));
                report.dry_runs += 1;
                continue;
            }

            let candidate = dedup_view(&binding, &ignore);
            if !self.options.force && self.store.dedup_exists(&self.spec.table, &candidate)? {
                tracing::info!("<skipped> {}", pretty_binding(&binding));
                report.skipped += 1;
                continue;
            }

            match self.submit_one(idx, &binding, &command) {
                Ok(id) => {
                    tracing::info!(job = id, "submitted {}", pretty_binding(&binding));
                    report.submitted.push(id);
                }
                Err(err) => {
                    tracing::error!(%err, "submission failed; continuing with next binding");
                    report.failures += 1;
                }
            }
        }
        Ok(report)
    }

    fn submit_one(&mut self, idx: usize, binding: &FieldMap, command: &str) -> Result<u64, GridError> {
        // Audit exists before the remote command can possibly run.
        let audit_key = self.store.create_audit(binding)?;

        let manifest = ExperimentManifest {
            binding: binding.clone(),
            command: command.to_string(),
            database: self.spec.database.clone(),
            table: self.spec.table.clone(),
            expect: self.spec.expect.clone(),
            ignore: self.spec.ignore.clone(),
            parser_pattern: self.spec.parser_pattern.clone(),
            options: self.options.clone(),
            audit_key,
        };
        let nonce = format!("{}.{idx}", std::process::id());
        let manifest_path = manifest.write(&self.manifest_dir, &nonce)?;

        let request = ResourceRequest {
            job_name: self.job_name.clone(),
            nodes: int_field(binding, "nnode").unwrap_or(1),
            tasks_per_node: int_field(binding, "ppn").unwrap_or(1),
            extra_flags: self.spec.sbatch_flags.clone(),
            output_path: output_path_template(),
        };
        let worker = format!("{} {}", self.worker_command, manifest_path.display());
        let id = match self.scheduler.submit(&request, &worker) {
            Ok(id) => id,
            Err(err) => {
                // No worker will ever finalize this audit row; do it here so
                // the failure is recorded instead of dangling as pending.
                let mut finalize = FieldMap::new();
                finalize.insert(
                    "error".to_string(),
                    ParamValue::Text(format!("submission failed: {}", err.info().message)),
                );
                if let Err(audit_err) = self.store.update_audit(audit_key, &finalize) {
                    tracing::error!(%audit_err, "failed to record submission failure");
                }
                return Err(err);
            }
        };

        // Transient placeholder until the first poll reports real state.
        self.jobs.insert(
            id,
            JobSnapshot {
                id,
                state: JobState::Pending,
                nodes: String::new(),
                start_time: None,
                end_time: None,
            },
        );
        self.bindings.insert(id, binding.clone());
        Ok(id)
    }

    /// Polls the scheduler and replaces the tracked snapshots.
    ///
    /// An empty answer means every job finished; it is not an error.
    pub fn status(&mut self) -> Result<Vec<JobSnapshot>, GridError> {
        let snapshots = self.scheduler.poll_all()?;
        self.jobs = snapshots.iter().map(|snap| (snap.id, snap.clone())).collect();
        Ok(snapshots)
    }

    /// Binding submitted under the given job id, if this controller sent it.
    pub fn binding_for(&self, id: u64) -> Option<&FieldMap> {
        self.bindings.get(&id)
    }

    /// Requests remote cancellation. Unknown or already-terminal jobs are a
    /// no-op; this never touches the local attach/wait state.
    pub fn cancel(&mut self, id: u64) -> Result<(), GridError> {
        match self.jobs.get(&id) {
            None => Ok(()),
            Some(snapshot) if snapshot.state.is_terminal() => Ok(()),
            Some(_) => self.scheduler.cancel(id),
        }
    }

    /// Attaches to a job's live output. The token aborts only the local
    /// wait or stream, never the remote job.
    pub fn attach(
        &mut self,
        id: u64,
        token: &CancelToken,
        pacing: &AttachPacing,
        sink: &mut dyn FnMut(&str),
    ) -> Result<AttachOutcome, GridError> {
        attach(&mut self.scheduler, id, token, pacing, sink)
    }

    fn effective_ignore(&self) -> BTreeSet<String> {
        let mut ignore = self.spec.ignore.clone();
        if !self.options.include_tag {
            ignore.insert("tag".to_string());
        }
        ignore
    }
}

fn int_field(binding: &FieldMap, name: &str) -> Option<i64> {
    match binding.get(name) {
        Some(ParamValue::Int(v)) => Some(*v),
        _ => None,
    }
}
