use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use grid_core::{ErrorInfo, GridError, ParamValue};
use indexmap::IndexMap;

/// One parameter's contribution to the sweep space.
#[derive(Clone)]
pub enum ParamSpec {
    /// A single fixed value.
    Literal(ParamValue),
    /// An ordered list of values forming one sweep dimension.
    List(Vec<ParamValue>),
    /// An expression evaluated against parameters declared earlier.
    Expr(String),
    /// A generator invoked once per combination.
    Generator(Arc<dyn Fn() -> ParamValue + Send + Sync>),
}

impl fmt::Debug for ParamSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamSpec::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            ParamSpec::List(vs) => f.debug_tuple("List").field(vs).finish(),
            ParamSpec::Expr(src) => f.debug_tuple("Expr").field(src).finish(),
            ParamSpec::Generator(_) => f.write_str("Generator(..)"),
        }
    }
}

impl ParamSpec {
    /// Number of candidate values this parameter contributes to the product.
    pub fn cardinality(&self) -> usize {
        match self {
            ParamSpec::List(values) => values.len(),
            _ => 1,
        }
    }
}

/// Declarative description of a parameter sweep.
///
/// Parameter declaration order is semantically significant: it fixes both
/// enumeration order (first declared varies slowest) and expression
/// visibility (expressions see strictly-earlier parameters only).
#[derive(Debug, Clone)]
pub struct SweepSpec {
    /// Declaration-ordered parameter space.
    pub params: IndexMap<String, ParamSpec>,
    /// Format string rendered per binding; `%{name}` substitutes a value.
    pub command_template: String,
    /// Sqlite database holding results and the audit trail.
    pub database: PathBuf,
    /// Result table name.
    pub table: String,
    /// Field names excluded from dedup comparison. Always contains `run_at`.
    pub ignore: BTreeSet<String>,
    /// Field names a parsed record must contain to be valid.
    pub expect: BTreeSet<String>,
    /// Extra flags forwarded verbatim to the batch submission command.
    pub sbatch_flags: Vec<String>,
    /// Named-capture pattern for the built-in output parser.
    pub parser_pattern: Option<String>,
    /// Source annotation stamped onto every binding.
    pub tag: Option<String>,
}

impl SweepSpec {
    /// Starts a builder with the required command template.
    pub fn builder(command_template: impl Into<String>) -> SweepSpecBuilder {
        SweepSpecBuilder {
            params: IndexMap::new(),
            command_template: command_template.into(),
            database: PathBuf::from("gridrun.sqlite"),
            table: "results".to_string(),
            ignore: BTreeSet::new(),
            expect: BTreeSet::new(),
            sbatch_flags: Vec::new(),
            parser_pattern: None,
            tag: None,
        }
    }

    /// Total number of bindings enumeration will produce.
    pub fn combination_count(&self) -> usize {
        self.params.values().map(ParamSpec::cardinality).product()
    }
}

/// Incremental construction of a [`SweepSpec`].
#[derive(Debug, Clone)]
pub struct SweepSpecBuilder {
    params: IndexMap<String, ParamSpec>,
    command_template: String,
    database: PathBuf,
    table: String,
    ignore: BTreeSet<String>,
    expect: BTreeSet<String>,
    sbatch_flags: Vec<String>,
    parser_pattern: Option<String>,
    tag: Option<String>,
}

impl SweepSpecBuilder {
    /// Declares a parameter. Redeclaring a name overwrites its spec but
    /// keeps its original position.
    pub fn param(mut self, name: impl Into<String>, spec: ParamSpec) -> Self {
        self.params.insert(name.into(), spec);
        self
    }

    /// Declares a single-valued parameter.
    pub fn literal(self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.param(name, ParamSpec::Literal(value.into()))
    }

    /// Declares a swept dimension.
    pub fn list<V: Into<ParamValue>>(
        self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.param(
            name,
            ParamSpec::List(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Declares an expression parameter over earlier-declared siblings.
    pub fn expr(self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.param(name, ParamSpec::Expr(source.into()))
    }

    /// Sets the sqlite database path.
    pub fn database(mut self, path: impl Into<PathBuf>) -> Self {
        self.database = path.into();
        self
    }

    /// Sets the result table name.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Excludes fields from dedup comparison.
    pub fn ignore<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.ignore.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Requires fields in every parsed record.
    pub fn expect<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.expect.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Appends a raw batch submission flag.
    pub fn sbatch_flag(mut self, flag: impl Into<String>) -> Self {
        self.sbatch_flags.push(flag.into());
        self
    }

    /// Sets the built-in parser's named-capture pattern.
    pub fn parser_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.parser_pattern = Some(pattern.into());
        self
    }

    /// Sets the source annotation tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Finalizes the specification.
    pub fn build(mut self) -> Result<SweepSpec, GridError> {
        if self.command_template.trim().is_empty() {
            return Err(GridError::Sweep(ErrorInfo::new(
                "sweep-no-command",
                "a sweep needs a command template",
            )));
        }
        // run_at is provenance, never identity.
        self.ignore.insert("run_at".to_string());
        Ok(SweepSpec {
            params: self.params,
            command_template: self.command_template,
            database: self.database,
            table: self.table,
            ignore: self.ignore,
            expect: self.expect,
            sbatch_flags: self.sbatch_flags,
            parser_pattern: self.parser_pattern,
            tag: self.tag,
        })
    }
}
