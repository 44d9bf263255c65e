use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Run-time switches consumed by the orchestrator.
///
/// Normally populated from the command line; defaults match an ordinary
/// dedup-respecting run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Re-run combinations even when the store already holds a matching row.
    #[serde(default)]
    pub force: bool,
    /// Run and audit, but skip result-row insertion.
    #[serde(default)]
    pub no_insert: bool,
    /// Print rendered commands without submitting anything.
    #[serde(default)]
    pub dry_run: bool,
    /// Whether the source annotation tag participates in dedup comparison.
    #[serde(default = "default_include_tag")]
    pub include_tag: bool,
}

fn default_include_tag() -> bool {
    true
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            force: false,
            no_insert: false,
            dry_run: false,
            include_tag: true,
        }
    }
}

/// Provenance stamp injected into every enumerated binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStamp {
    /// Submission timestamp, RFC 3339. Always excluded from dedup.
    pub run_at: String,
    /// Optional source annotation (commit, tag) supplied by the caller.
    pub tag: Option<String>,
}

impl RunStamp {
    /// Stamp for a run starting now.
    pub fn now(tag: Option<String>) -> Self {
        Self {
            run_at: Utc::now().to_rfc3339(),
            tag,
        }
    }
}
