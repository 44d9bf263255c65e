//! Scheduler boundary: the [`Scheduler`] trait, the Slurm binding and a
//! scripted in-memory scheduler for tests.
//!
//! Job state is never inferred locally; it is whatever the most recent poll
//! reported. The orchestrator owns retry and attach policy, this crate only
//! talks to the batch system.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use grid_core::GridError;

pub mod slurm;
pub mod testing;

pub use slurm::SlurmScheduler;
pub use testing::{JobPlan, ScriptedScheduler};

/// Lifecycle of a batch job as observed through polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Queued, waiting for an allocation.
    Pending,
    /// Allocated and executing.
    Running,
    /// Finished with a zero exit.
    Completed,
    /// Finished abnormally (non-zero exit, timeout, node failure).
    Failed,
    /// Cancelled by user request.
    Cancelled,
    /// A scheduler code outside the model, carried through verbatim.
    Unknown(String),
}

impl JobState {
    /// True for states a job can never leave.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

/// Point-in-time view of one job, as last reported by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    /// Scheduler-assigned job id.
    pub id: u64,
    /// Last observed state.
    pub state: JobState,
    /// Node list the job is (or was) running on.
    pub nodes: String,
    /// Scheduled or actual start time, scheduler-formatted.
    pub start_time: Option<String>,
    /// Completion time, scheduler-formatted.
    pub end_time: Option<String>,
}

/// Allocation request built from a binding at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    /// Job name shown in the queue.
    pub job_name: String,
    /// Node count; bindings that leave it unset default to 1.
    pub nodes: i64,
    /// Tasks per node; defaults to 1.
    pub tasks_per_node: i64,
    /// Extra flags forwarded verbatim to the submission command.
    pub extra_flags: Vec<String>,
    /// Combined stdout/stderr destination (scheduler may expand `%j`).
    pub output_path: String,
}

/// Live output handle for a running job step.
pub trait StepStream: Send {
    /// Next line of output, or `None` at end of stream.
    fn next_line(&mut self) -> Result<Option<String>, GridError>;
}

/// Abstract batch scheduler. Bound to Slurm in production and to a scripted
/// in-memory implementation in tests.
pub trait Scheduler {
    /// Submits `command`, returning the scheduler-assigned job id.
    fn submit(&mut self, request: &ResourceRequest, command: &str) -> Result<u64, GridError>;

    /// Snapshots of every job the current principal owns. An empty list
    /// means everything finished; it is not an error.
    fn poll_all(&mut self) -> Result<Vec<JobSnapshot>, GridError>;

    /// Snapshot of a single job.
    fn poll_one(&mut self, id: u64) -> Result<JobSnapshot, GridError>;

    /// Requests cancellation of a job.
    fn cancel(&mut self, id: u64) -> Result<(), GridError>;

    /// Opens a live output stream for the job's executing step, or `None`
    /// while the scheduler has not created the step yet.
    fn open_live_step(&mut self, id: u64) -> Result<Option<Box<dyn StepStream>>, GridError>;
}

/// Directory for manifests and captured job output, under the working dir.
pub fn work_dir() -> PathBuf {
    PathBuf::from(".gridrun")
}

/// Output destination handed to the scheduler; `%j` expands to the job id.
pub fn output_path_template() -> String {
    format!("{}/job.%j.out", work_dir().display())
}

/// Captured-output path for a concrete job id.
pub fn output_path(job_id: u64) -> PathBuf {
    work_dir().join(format!("job.{job_id}.out"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Unknown("S".into()).is_terminal());
    }

    #[test]
    fn output_path_matches_template_expansion() {
        let template = output_path_template();
        assert_eq!(
            template.replace("%j", "123"),
            output_path(123).display().to_string()
        );
    }
}
