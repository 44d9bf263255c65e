//! Live output attachment with cooperative cancellation.
//!
//! The attach protocol has to ride out two scheduler races: a job that is
//! still pending when the user asks to watch it, and the lag between a job
//! starting and the scheduler creating its execution step. Both are waits,
//! not errors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use grid_batch::{JobState, Scheduler};
use grid_core::GridError;

/// Cooperative cancellation handle checked at every loop iteration and
/// blocking-call boundary. Cancelling aborts the local wait or attachment
/// only; the remote job is never touched.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// True once [`CancelToken::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Sleep intervals used between polls.
#[derive(Debug, Clone)]
pub struct AttachPacing {
    /// Delay between polls while the job is still pending.
    pub pending_poll: Duration,
    /// Delay between step-discovery attempts once the job is running.
    pub step_poll: Duration,
}

impl Default for AttachPacing {
    fn default() -> Self {
        Self {
            pending_poll: Duration::from_millis(100),
            step_poll: Duration::from_millis(500),
        }
    }
}

impl AttachPacing {
    /// Near-zero pacing for tests.
    pub fn immediate() -> Self {
        Self {
            pending_poll: Duration::from_millis(0),
            step_poll: Duration::from_millis(0),
        }
    }
}

/// How an attachment ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachOutcome {
    /// Output was streamed until end of stream.
    Streamed,
    /// The job left the running state before a step ever appeared; its
    /// captured output file is the place to look.
    NoStep,
    /// The cancel token fired; the remote job is unaffected.
    Interrupted,
}

/// Attaches to a job's live output, forwarding each line to `sink`.
pub fn attach<S: Scheduler + ?Sized>(
    scheduler: &mut S,
    job_id: u64,
    token: &CancelToken,
    pacing: &AttachPacing,
    sink: &mut dyn FnMut(&str),
) -> Result<AttachOutcome, GridError> {
    // Phase 1: wait out the pending queue.
    let mut snapshot = scheduler.poll_one(job_id)?;
    while snapshot.state == JobState::Pending {
        if token.is_cancelled() {
            return Ok(AttachOutcome::Interrupted);
        }
        std::thread::sleep(pacing.pending_poll);
        snapshot = scheduler.poll_one(job_id)?;
    }

    loop {
        // Phase 2: step discovery. Step creation lags job start, so "no
        // step yet" retries until the job stops running.
        let mut stream = loop {
            if token.is_cancelled() {
                return Ok(AttachOutcome::Interrupted);
            }
            match scheduler.open_live_step(job_id)? {
                Some(stream) => break stream,
                None => {
                    let snapshot = scheduler.poll_one(job_id)?;
                    if snapshot.state != JobState::Running {
                        return Ok(AttachOutcome::NoStep);
                    }
                    std::thread::sleep(pacing.step_poll);
                }
            }
        };

        // Phase 3: forward lines until the stream ends. Dropping the stream
        // releases the attachment without cancelling the remote job.
        loop {
            if token.is_cancelled() {
                return Ok(AttachOutcome::Interrupted);
            }
            match stream.next_line()? {
                Some(line) if step_ended(&line) => {
                    // The step finished under us or never matched; go look
                    // for a successor step.
                    break;
                }
                Some(line) => sink(&line),
                None => return Ok(AttachOutcome::Streamed),
            }
        }
    }
}

/// Stream-level conditions that mean "this step is gone", not "failure".
fn step_ended(line: &str) -> bool {
    line.contains("no tasks running") || line.contains("Invalid job id specified")
}
