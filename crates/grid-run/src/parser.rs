//! Parser adapter contract and the built-in regex parser.
//!
//! A parser turns raw captured output into zero or more field mappings. It is
//! supplied by the experiment author and must hold no cross-invocation state:
//! the worker reconstructs it from the manifest on whatever node the job
//! landed on.

use std::collections::BTreeSet;

use grid_core::{ErrorInfo, FieldMap, GridError, ParamValue};
use regex::Regex;

/// What a parser produced for one job's output.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// The output held no recognizable result.
    None,
    /// A single result record.
    One(FieldMap),
    /// Multiple result records from one job.
    Many(Vec<FieldMap>),
}

/// User-supplied transform from raw output to structured records.
pub trait OutputParser {
    /// Parses one job's combined output.
    fn parse(&self, raw: &str) -> Result<ParseOutcome, GridError>;
}

/// Built-in parser: a regex with named capture groups, one record per match.
///
/// Numeric-looking captures are narrowed to integers or reals so they land
/// in typed store columns; everything else stays text.
pub struct RegexParser {
    regex: Regex,
}

impl RegexParser {
    /// Compiles the pattern. Group names become record field names.
    pub fn new(pattern: &str) -> Result<Self, GridError> {
        let regex = Regex::new(pattern).map_err(|err| {
            GridError::Parse(
                ErrorInfo::new("parser-pattern", "invalid parser pattern")
                    .with_context("pattern", pattern.to_string())
                    .with_hint(err.to_string()),
            )
        })?;
        Ok(Self { regex })
    }
}

impl OutputParser for RegexParser {
    fn parse(&self, raw: &str) -> Result<ParseOutcome, GridError> {
        let names: Vec<&str> = self.regex.capture_names().flatten().collect();
        let mut records = Vec::new();
        for captures in self.regex.captures_iter(raw) {
            let mut record = FieldMap::new();
            for name in &names {
                if let Some(capture) = captures.name(name) {
                    record.insert((*name).to_string(), ParamValue::coerce(capture.as_str()));
                }
            }
            if !record.is_empty() {
                records.push(record);
            }
        }
        Ok(match records.len() {
            0 => ParseOutcome::None,
            1 => ParseOutcome::One(records.remove(0)),
            _ => ParseOutcome::Many(records),
        })
    }
}

/// Applies the required-field contract to a parse outcome.
///
/// Normalizes a single record to a one-element sequence, rejects empty
/// results, and checks every record against `expect`. A missing field in any
/// record suppresses insertion of all records for the job.
pub fn validate(
    outcome: ParseOutcome,
    expect: &BTreeSet<String>,
) -> Result<Vec<FieldMap>, GridError> {
    let records = match outcome {
        ParseOutcome::None => Vec::new(),
        ParseOutcome::One(record) => vec![record],
        ParseOutcome::Many(records) => records,
    };
    if records.is_empty() {
        return Err(GridError::Parse(ErrorInfo::new(
            "parse-empty",
            "no results",
        )));
    }
    let mut missing: BTreeSet<&String> = BTreeSet::new();
    for record in &records {
        for field in expect {
            if !record.contains_key(field) {
                missing.insert(field);
            }
        }
    }
    if !missing.is_empty() {
        let list: Vec<String> = missing.iter().map(|f| format!("\"{f}\"")).collect();
        return Err(GridError::Parse(
            ErrorInfo::new("parse-missing", format!("missing: [{}]", list.join(", ")))
                .with_context("fields", list.join(",")),
        ));
    }
    Ok(records)
}
