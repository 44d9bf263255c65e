use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use grid_core::{FieldMap, ParamValue};
use grid_run::{reparse, RegexParser};
use grid_store::ResultStore;
use grid_sweep::SweepFile;

#[derive(Args, Debug)]
pub struct ReparseArgs {
    /// Sweep description file (YAML); supplies the parser and table.
    #[arg(long)]
    pub sweep: PathBuf,
    /// Restrict to one scheduler job id.
    #[arg(long)]
    pub job: Option<u64>,
}

pub fn run(args: &ReparseArgs) -> Result<(), Box<dyn Error>> {
    let spec = SweepFile::load(&args.sweep)?;
    let Some(pattern) = &spec.parser_pattern else {
        return Err("the sweep file has no parser pattern to reparse with".into());
    };
    let parser = RegexParser::new(pattern)?;
    let store = ResultStore::open(&spec.database)?;

    let mut filter = FieldMap::new();
    if let Some(job) = args.job {
        filter.insert("jobid".to_string(), ParamValue::Int(job as i64));
    }
    let inserted = reparse(&store, &spec.table, &spec.ignore, &parser, &filter)?;
    println!("reparsed and inserted {inserted} rows into {}", spec.table);
    Ok(())
}
