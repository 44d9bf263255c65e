//! Re-run the parser over already-captured job output.
//!
//! Useful after fixing a parser pattern: the audit trail keeps every job's
//! output file, so results can be recovered without re-running jobs.

use std::collections::BTreeSet;

use grid_core::{FieldMap, GridError, ParamValue, BOOKKEEPING_FIELDS};
use grid_store::{ResultStore, AUDIT_TABLE};

use crate::parser::{validate, OutputParser};

/// Reparses audited jobs matching `filter` and inserts recovered records
/// into `table`. Returns how many rows were inserted.
///
/// Jobs whose output file is gone or whose output still does not parse are
/// logged and skipped; they keep their audit rows untouched.
pub fn reparse(
    store: &ResultStore,
    table: &str,
    ignore: &BTreeSet<String>,
    parser: &dyn OutputParser,
    filter: &FieldMap,
) -> Result<usize, GridError> {
    let rows = store.rows(AUDIT_TABLE, filter)?;
    let mut inserted = 0;
    for row in rows {
        let Some(ParamValue::Text(outfile)) = row.get("outfile") else {
            tracing::warn!("audit row without an output file; skipping");
            continue;
        };
        let raw = match std::fs::read_to_string(outfile) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(%outfile, %err, "cannot read job output; skipping");
                continue;
            }
        };
        let outcome = match parser.parse(&raw) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(%outfile, %err, "output still does not parse; skipping");
                continue;
            }
        };
        let records = match validate(outcome, &BTreeSet::new()) {
            Ok(records) => records,
            Err(_) => continue,
        };
        for record in records {
            let mut merged = record;
            // The stored job fields win over freshly parsed ones, then
            // bookkeeping and ignored fields drop out before re-insertion.
            for (name, value) in &row {
                merged.insert(name.clone(), value.clone());
            }
            merged.retain(|name, _| {
                !BOOKKEEPING_FIELDS.contains(&name.as_str()) && !ignore.contains(name)
            });
            store.insert(table, &merged)?;
            inserted += 1;
        }
    }
    Ok(inserted)
}
