#![deny(missing_docs)]
#![doc = "Core types shared by the gridrun parameter-sweep orchestrator crates."]

use indexmap::IndexMap;

pub mod errors;
mod options;
mod value;

pub use errors::{ErrorInfo, GridError};
pub use options::{RunOptions, RunStamp};
pub use value::ParamValue;

/// Insertion-ordered field map used for bindings, parsed records and store rows.
///
/// Order matters: parameter declaration order drives enumeration and column
/// creation order, so plain hash maps are never used for these.
pub type FieldMap = IndexMap<String, ParamValue>;

/// Field names the result store always manages itself and which reparse or
/// merge operations must drop before re-insertion.
pub const BOOKKEEPING_FIELDS: [&str; 4] = ["id", "error", "results", "outfile"];
