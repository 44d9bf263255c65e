//! Slurm binding: submission via `sbatch`, polling via `squeue`, cancellation
//! via `scancel` and live attachment via `sattach`.

use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStdout, Command, Stdio};

use grid_core::{ErrorInfo, GridError};
use regex::Regex;

use crate::{JobSnapshot, JobState, ResourceRequest, Scheduler, StepStream};

/// Shells out to the Slurm client tools.
pub struct SlurmScheduler {
    ack_pattern: Regex,
}

impl SlurmScheduler {
    /// New binding. Fails only if the acknowledgment pattern does not
    /// compile, which would be a build defect.
    pub fn new() -> Result<Self, GridError> {
        let ack_pattern = Regex::new(r"Submitted batch job (\d+)")
            .map_err(|err| scheduler_error("slurm-ack-pattern", err.to_string()))?;
        Ok(Self { ack_pattern })
    }

    fn run_tool(&self, tool: &str, args: &[String]) -> Result<String, GridError> {
        let output = Command::new(tool).args(args).output().map_err(|err| {
            GridError::Scheduler(
                ErrorInfo::new("slurm-exec", "failed to run scheduler tool")
                    .with_context("tool", tool.to_string())
                    .with_hint(err.to_string()),
            )
        })?;
        if !output.status.success() {
            return Err(GridError::Scheduler(
                ErrorInfo::new("slurm-tool-status", "scheduler tool exited abnormally")
                    .with_context("tool", tool.to_string())
                    .with_context("status", output.status.to_string())
                    .with_hint(String::from_utf8_lossy(&output.stderr).into_owned()),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Scheduler for SlurmScheduler {
    fn submit(&mut self, request: &ResourceRequest, command: &str) -> Result<u64, GridError> {
        let mut args = vec![
            format!("--job-name={}", request.job_name),
            format!("--nodes={}", request.nodes),
            format!("--ntasks-per-node={}", request.tasks_per_node),
            format!("--output={}", request.output_path),
            format!("--error={}", request.output_path),
        ];
        args.extend(request.extra_flags.iter().cloned());
        args.push(format!("--wrap={command}"));
        tracing::debug!(job_name = %request.job_name, "sbatch {}", args.join(" "));
        let ack = self.run_tool("sbatch", &args)?;
        parse_job_id(&self.ack_pattern, &ack)
    }

    fn poll_all(&mut self) -> Result<Vec<JobSnapshot>, GridError> {
        let mut args = vec![
            "--noheader".to_string(),
            "--format=%i|%t|%N|%S|%e".to_string(),
        ];
        if let Ok(user) = std::env::var("USER") {
            args.push(format!("--user={user}"));
        }
        let out = self.run_tool("squeue", &args)?;
        Ok(out.lines().filter_map(parse_queue_line).collect())
    }

    fn poll_one(&mut self, id: u64) -> Result<JobSnapshot, GridError> {
        let args = vec![
            "--noheader".to_string(),
            "--format=%i|%t|%N|%S|%e".to_string(),
            format!("--jobs={id}"),
        ];
        let out = self.run_tool("squeue", &args).unwrap_or_default();
        match out.lines().filter_map(parse_queue_line).next() {
            Some(snapshot) => Ok(snapshot),
            // squeue forgets jobs shortly after they leave the queue;
            // gone means finished as far as polling is concerned.
            None => Ok(JobSnapshot {
                id,
                state: JobState::Completed,
                nodes: String::new(),
                start_time: None,
                end_time: None,
            }),
        }
    }

    fn cancel(&mut self, id: u64) -> Result<(), GridError> {
        self.run_tool("scancel", &[id.to_string()]).map(|_| ())
    }

    fn open_live_step(&mut self, id: u64) -> Result<Option<Box<dyn StepStream>>, GridError> {
        let args = vec![
            format!("--jobs={id}"),
            "--steps".to_string(),
            "--noheader".to_string(),
            "--format=%i".to_string(),
        ];
        let out = self.run_tool("squeue", &args).unwrap_or_default();
        let Some(step) = out.split_whitespace().next().map(str::to_string) else {
            return Ok(None);
        };
        let mut child = Command::new("sattach")
            .arg(&step)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| {
                GridError::Scheduler(
                    ErrorInfo::new("slurm-attach", "failed to spawn sattach")
                        .with_context("step", step.clone())
                        .with_hint(err.to_string()),
                )
            })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            scheduler_error("slurm-attach-pipe", "sattach stdout pipe missing".to_string())
        })?;
        Ok(Some(Box::new(SattachStream {
            child,
            reader: BufReader::new(stdout),
        })))
    }
}

/// Live `sattach` pipe. Dropping the stream detaches by terminating the
/// local sattach process; the remote job is untouched.
struct SattachStream {
    child: Child,
    reader: BufReader<ChildStdout>,
}

impl StepStream for SattachStream {
    fn next_line(&mut self) -> Result<Option<String>, GridError> {
        let mut line = String::new();
        // Any read failure on the pipe is an end-of-attachment condition,
        // not an error worth surfacing.
        match self.reader.read_line(&mut line) {
            Ok(0) | Err(_) => Ok(None),
            Ok(_) => Ok(Some(line.trim_end().to_string())),
        }
    }
}

impl Drop for SattachStream {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn parse_job_id(pattern: &Regex, ack: &str) -> Result<u64, GridError> {
    let captures = pattern.captures(ack).ok_or_else(|| {
        GridError::Scheduler(
            ErrorInfo::new("slurm-ack", "could not parse job id from sbatch output")
                .with_context("ack", ack.trim().to_string()),
        )
    })?;
    captures[1].parse::<u64>().map_err(|err| {
        scheduler_error("slurm-ack", format!("job id out of range: {err}"))
    })
}

fn parse_queue_line(line: &str) -> Option<JobSnapshot> {
    let mut parts = line.trim().split('|');
    let id = parts.next()?.trim().parse::<u64>().ok()?;
    let state = state_from_code(parts.next()?.trim());
    let nodes = parts.next().unwrap_or("").trim().to_string();
    let start_time = non_placeholder(parts.next());
    let end_time = non_placeholder(parts.next());
    Some(JobSnapshot {
        id,
        state,
        nodes,
        start_time,
        end_time,
    })
}

fn non_placeholder(field: Option<&str>) -> Option<String> {
    let field = field?.trim();
    if field.is_empty() || field == "N/A" {
        return None;
    }
    Some(field.to_string())
}

fn state_from_code(code: &str) -> JobState {
    match code {
        "PD" => JobState::Pending,
        "R" | "CG" => JobState::Running,
        "CD" => JobState::Completed,
        "CA" => JobState::Cancelled,
        "F" | "TO" | "NF" | "OOM" | "BF" | "DL" => JobState::Failed,
        other => JobState::Unknown(other.to_string()),
    }
}

fn scheduler_error(code: &str, hint: String) -> GridError {
    GridError::Scheduler(ErrorInfo::new(code, "scheduler interaction failed").with_hint(hint))
}
