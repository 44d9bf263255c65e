//! Worker side: runs on the allocated node, executes the command, parses
//! output and finalizes the audit row.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Stdio};

use chrono::Utc;
use grid_core::{ErrorInfo, FieldMap, GridError, ParamValue};
use grid_store::ResultStore;

use crate::manifest::ExperimentManifest;
use crate::parser::{validate, OutputParser, ParseOutcome, RegexParser};

/// What one worker run did, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    /// Audit row that was finalized.
    pub audit_key: i64,
    /// Final error text; empty means success.
    pub error: String,
    /// Result rows inserted into the experiment table.
    pub inserted: usize,
}

/// Runs one experiment from its manifest.
///
/// The command's success or failure never aborts the worker: every path
/// ends in audit finalization, because a lost audit row would erase the
/// only record of what happened. Only store or manifest failures, which
/// make auditing itself impossible, propagate as errors.
pub fn run_worker(manifest_path: &Path) -> Result<WorkerReport, GridError> {
    let manifest = ExperimentManifest::load(manifest_path)?;
    let store = ResultStore::open(&manifest.database)?;

    // Stamp scheduler-assigned facts onto the binding and the audit row
    // before anything can fail.
    let mut binding = manifest.binding.clone();
    let mut stamps = FieldMap::new();
    if let Some(jobid) = scheduler_job_id() {
        let outfile = grid_batch::output_path(jobid).display().to_string();
        stamps.insert("jobid".to_string(), ParamValue::Int(jobid as i64));
        stamps.insert("outfile".to_string(), ParamValue::Text(outfile));
    }
    stamps.insert(
        "started_at".to_string(),
        ParamValue::Text(Utc::now().to_rfc3339()),
    );
    for (name, value) in &stamps {
        binding.insert(name.clone(), value.clone());
    }
    store.update_audit(manifest.audit_key, &stamps)?;

    let (error, results_dump, inserted) = execute(&manifest, &binding, &store);

    let mut finalize = FieldMap::new();
    finalize.insert("error".to_string(), ParamValue::Text(error.clone()));
    finalize.insert("results".to_string(), ParamValue::Text(results_dump));
    store.update_audit(manifest.audit_key, &finalize)?;

    Ok(WorkerReport {
        audit_key: manifest.audit_key,
        error,
        inserted,
    })
}

/// Command execution and result handling. Every failure is folded into the
/// returned error string so the caller can audit it.
fn execute(
    manifest: &ExperimentManifest,
    binding: &FieldMap,
    store: &ResultStore,
) -> (String, String, usize) {
    let (raw, exit_error) = match capture_command(&manifest.command) {
        Ok(pair) => pair,
        Err(err) => return (err.to_string(), String::new(), 0),
    };
    if let Some(error) = exit_error {
        tracing::error!(command = %manifest.command, %error, "command failed");
        return (error, String::new(), 0);
    }

    tracing::info!("parsing results");
    let outcome = match parse_output(manifest, &raw) {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!(%err, "parsing failed");
            return (err.to_string(), String::new(), 0);
        }
    };
    let records = match validate(outcome, &manifest.expect) {
        Ok(records) => records,
        Err(err) => {
            tracing::error!(%err, "validation failed; see the jobs table for raw output");
            return (err.info().message.clone(), String::new(), 0);
        }
    };
    let dump = serde_json::to_string(&records).unwrap_or_default();

    let mut inserted = 0;
    if !manifest.options.no_insert {
        for record in &records {
            let mut row = binding.clone();
            for (name, value) in record {
                row.insert(name.clone(), value.clone());
            }
            match store.insert(&manifest.table, &row) {
                Ok(_) => inserted += 1,
                Err(err) => {
                    tracing::error!(%err, "result insertion failed");
                    return (err.info().message.clone(), dump, inserted);
                }
            }
        }
    }
    (String::new(), dump, inserted)
}

fn parse_output(manifest: &ExperimentManifest, raw: &str) -> Result<ParseOutcome, GridError> {
    let Some(pattern) = &manifest.parser_pattern else {
        // No parser configured means no structured results can exist.
        return Ok(ParseOutcome::None);
    };
    RegexParser::new(pattern)?.parse(raw)
}

/// Runs the command with stdout and stderr merged into one captured buffer,
/// echoing each line to the worker's own log as it arrives.
fn capture_command(command: &str) -> Result<(String, Option<String>), GridError> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(format!("{command} 2>&1"))
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|err| {
            GridError::Worker(
                ErrorInfo::new("worker-spawn", "failed to spawn command")
                    .with_context("command", command.to_string())
                    .with_hint(err.to_string()),
            )
        })?;
    let stdout = child.stdout.take().ok_or_else(|| {
        GridError::Worker(ErrorInfo::new("worker-pipe", "command stdout pipe missing"))
    })?;

    let mut captured = String::new();
    for line in BufReader::new(stdout).lines() {
        let Ok(line) = line else { break };
        println!("{line}");
        captured.push_str(&line);
        captured.push('\n');
    }
    let status = child.wait().map_err(|err| {
        GridError::Worker(
            ErrorInfo::new("worker-wait", "failed to wait for command").with_hint(err.to_string()),
        )
    })?;
    let exit_error = if status.success() {
        None
    } else {
        Some(format!(
            "exit status: {}",
            status
                .code()
                .map_or_else(|| "signal".to_string(), |code| code.to_string())
        ))
    };
    Ok((captured, exit_error))
}

fn scheduler_job_id() -> Option<u64> {
    std::env::var("SLURM_JOB_ID").ok()?.trim().parse().ok()
}
