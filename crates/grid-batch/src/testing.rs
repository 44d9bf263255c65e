//! Deterministic in-memory scheduler for orchestrator tests.
//!
//! Each submitted job follows a scripted state sequence, one entry per poll,
//! and a scripted step-readiness delay so attach retry behaviour can be
//! exercised without a real batch system.

use std::collections::{BTreeMap, VecDeque};

use grid_core::{ErrorInfo, GridError};

use crate::{JobSnapshot, JobState, ResourceRequest, Scheduler, StepStream};

/// Scripted lifecycle for one job.
#[derive(Debug, Clone)]
pub struct JobPlan {
    /// States observed by successive polls; the last entry repeats forever.
    pub states: Vec<JobState>,
    /// Number of step lookups answered "no step yet" before a stream opens.
    pub step_ready_after: usize,
    /// Line batches served by successive stream openings.
    pub step_lines: Vec<Vec<String>>,
}

impl Default for JobPlan {
    fn default() -> Self {
        Self {
            states: vec![JobState::Pending, JobState::Running, JobState::Completed],
            step_ready_after: 0,
            step_lines: vec![Vec::new()],
        }
    }
}

#[derive(Debug)]
struct ScriptedJob {
    plan: JobPlan,
    polls: usize,
    step_calls: usize,
    streams_served: usize,
    cancelled: bool,
}

impl ScriptedJob {
    fn current_state(&self) -> JobState {
        if self.cancelled {
            return JobState::Cancelled;
        }
        let idx = self.polls.min(self.plan.states.len().saturating_sub(1));
        self.plan
            .states
            .get(idx)
            .cloned()
            .unwrap_or(JobState::Completed)
    }

    fn snapshot(&self, id: u64) -> JobSnapshot {
        JobSnapshot {
            id,
            state: self.current_state(),
            nodes: "node01".to_string(),
            start_time: None,
            end_time: None,
        }
    }
}

/// In-memory [`Scheduler`] with scripted job lifecycles.
#[derive(Debug, Default)]
pub struct ScriptedScheduler {
    next_id: u64,
    plans: VecDeque<JobPlan>,
    jobs: BTreeMap<u64, ScriptedJob>,
    /// Everything submitted, in order: id, request, command.
    pub submissions: Vec<(u64, ResourceRequest, String)>,
    /// Job ids cancellation was requested for.
    pub cancels: Vec<u64>,
    /// When set, the next submission fails like an unparsable acknowledgment.
    pub fail_next_submit: bool,
}

impl ScriptedScheduler {
    /// Empty scheduler; submissions follow [`JobPlan::default`] unless plans
    /// are queued with [`ScriptedScheduler::push_plan`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a plan for the next submission.
    pub fn push_plan(&mut self, plan: JobPlan) {
        self.plans.push_back(plan);
    }
}

impl Scheduler for ScriptedScheduler {
    fn submit(&mut self, request: &ResourceRequest, command: &str) -> Result<u64, GridError> {
        if self.fail_next_submit {
            self.fail_next_submit = false;
            return Err(GridError::Scheduler(ErrorInfo::new(
                "scripted-ack",
                "could not parse job id from sbatch output",
            )));
        }
        self.next_id += 1;
        let id = self.next_id;
        let plan = self.plans.pop_front().unwrap_or_default();
        self.jobs.insert(
            id,
            ScriptedJob {
                plan,
                polls: 0,
                step_calls: 0,
                streams_served: 0,
                cancelled: false,
            },
        );
        self.submissions
            .push((id, request.clone(), command.to_string()));
        Ok(id)
    }

    fn poll_all(&mut self) -> Result<Vec<JobSnapshot>, GridError> {
        let mut out = Vec::new();
        for (id, job) in self.jobs.iter_mut() {
            out.push(job.snapshot(*id));
            job.polls += 1;
        }
        Ok(out)
    }

    fn poll_one(&mut self, id: u64) -> Result<JobSnapshot, GridError> {
        let job = self.jobs.get_mut(&id).ok_or_else(|| {
            GridError::Scheduler(
                ErrorInfo::new("scripted-unknown-job", "no such job")
                    .with_context("job", id.to_string()),
            )
        })?;
        let snapshot = job.snapshot(id);
        job.polls += 1;
        Ok(snapshot)
    }

    fn cancel(&mut self, id: u64) -> Result<(), GridError> {
        self.cancels.push(id);
        if let Some(job) = self.jobs.get_mut(&id) {
            job.cancelled = true;
        }
        Ok(())
    }

    fn open_live_step(&mut self, id: u64) -> Result<Option<Box<dyn StepStream>>, GridError> {
        let job = self.jobs.get_mut(&id).ok_or_else(|| {
            GridError::Scheduler(
                ErrorInfo::new("scripted-unknown-job", "no such job")
                    .with_context("job", id.to_string()),
            )
        })?;
        job.step_calls += 1;
        if job.step_calls <= job.plan.step_ready_after {
            return Ok(None);
        }
        let Some(lines) = job.plan.step_lines.get(job.streams_served) else {
            return Ok(None);
        };
        job.streams_served += 1;
        Ok(Some(Box::new(ScriptedStream {
            lines: lines.clone().into(),
        })))
    }
}

struct ScriptedStream {
    lines: VecDeque<String>,
}

impl StepStream for ScriptedStream {
    fn next_line(&mut self) -> Result<Option<String>, GridError> {
        Ok(self.lines.pop_front())
    }
}
