use std::path::{Path, PathBuf};

use grid_core::{ErrorInfo, GridError, ParamValue};
use indexmap::IndexMap;
use serde::Deserialize;

use crate::spec::{ParamSpec, SweepSpec, SweepSpecBuilder};

/// On-disk YAML form of a sweep.
///
/// Generators cannot be expressed in a file; they are a library-level
/// feature for embedders.
#[derive(Debug, Deserialize)]
pub struct SweepFile {
    /// Command template with `%{name}` substitutions.
    pub command: String,
    /// Sqlite database path (default `gridrun.sqlite`).
    #[serde(default)]
    pub database: Option<PathBuf>,
    /// Result table (default `results`).
    #[serde(default)]
    pub table: Option<String>,
    /// Declaration-ordered parameters.
    #[serde(default)]
    pub params: IndexMap<String, ParamEntry>,
    /// Fields required in every parsed record.
    #[serde(default)]
    pub expect: Vec<String>,
    /// Fields excluded from dedup comparison.
    #[serde(default)]
    pub ignore: Vec<String>,
    /// Extra flags forwarded to the batch submission command.
    #[serde(default)]
    pub sbatch_flags: Vec<String>,
    /// Built-in output parser configuration.
    #[serde(default)]
    pub parser: Option<ParserSection>,
    /// Source annotation tag.
    #[serde(default)]
    pub tag: Option<String>,
}

/// Parser section of the sweep file.
#[derive(Debug, Deserialize)]
pub struct ParserSection {
    /// Regex with named capture groups; captures become result fields.
    pub pattern: String,
}

/// YAML forms a parameter may take: scalar, list, or `expr: "..."`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ParamEntry {
    /// Expression over earlier-declared parameters.
    Expr {
        /// Expression source text.
        expr: String,
    },
    /// Single literal value.
    Scalar(ScalarEntry),
    /// Swept dimension.
    Many(Vec<ScalarEntry>),
}

/// Scalar YAML value.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ScalarEntry {
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Real(f64),
    /// String literal.
    Text(String),
}

impl From<ScalarEntry> for ParamValue {
    fn from(entry: ScalarEntry) -> Self {
        match entry {
            ScalarEntry::Int(v) => ParamValue::Int(v),
            ScalarEntry::Real(v) => ParamValue::Real(v),
            ScalarEntry::Text(v) => ParamValue::Text(v),
        }
    }
}

impl SweepFile {
    /// Loads and validates a sweep file.
    pub fn load(path: &Path) -> Result<SweepSpec, GridError> {
        let contents = std::fs::read_to_string(path).map_err(|err| {
            GridError::Sweep(
                ErrorInfo::new("sweep-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        let file: SweepFile = serde_yaml::from_str(&contents).map_err(|err| {
            GridError::Sweep(
                ErrorInfo::new("sweep-parse", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        file.into_spec()
    }

    /// Converts the file form into a [`SweepSpec`].
    pub fn into_spec(self) -> Result<SweepSpec, GridError> {
        let mut builder: SweepSpecBuilder = SweepSpec::builder(self.command);
        if let Some(database) = self.database {
            builder = builder.database(database);
        }
        if let Some(table) = self.table {
            builder = builder.table(table);
        }
        for (name, entry) in self.params {
            let spec = match entry {
                ParamEntry::Expr { expr } => ParamSpec::Expr(expr),
                ParamEntry::Scalar(value) => ParamSpec::Literal(value.into()),
                ParamEntry::Many(values) => {
                    ParamSpec::List(values.into_iter().map(Into::into).collect())
                }
            };
            builder = builder.param(name, spec);
        }
        builder = builder.expect(self.expect).ignore(self.ignore);
        for flag in self.sbatch_flags {
            builder = builder.sbatch_flag(flag);
        }
        if let Some(parser) = self.parser {
            builder = builder.parser_pattern(parser.pattern);
        }
        if let Some(tag) = self.tag {
            builder = builder.tag(tag);
        }
        builder.build()
    }
}
