use std::io::Write;

use grid_core::{ParamValue, RunStamp};
use grid_sweep::{enumerate, render_command, SweepFile};

const SAMPLE: &str = "\
command: \"srun slow_loop.sh %{a} %{b} %{e}\"
table: test
params:
  nnode: 2
  ppn: 1
  a: [1, 2]
  b: [\"1\", \"2\", \"3\"]
  c: abc
  e:
    expr: \"a*2\"
expect: [ao, bo, co]
";

fn stamp() -> RunStamp {
    RunStamp {
        run_at: "2026-01-01T00:00:00+00:00".to_string(),
        tag: None,
    }
}

#[test]
fn sample_sweep_enumerates_six_bindings() {
    let mut file = tempfile::NamedTempFile::new().expect("sweep file");
    file.write_all(SAMPLE.as_bytes()).expect("write");
    let spec = SweepFile::load(file.path()).expect("load");

    let bindings = enumerate(&spec, &stamp()).expect("enumerate");
    assert_eq!(bindings.len(), 6);

    // a=2, b="3" is the last binding and carries the derived e=4.
    let last = bindings.last().unwrap();
    assert_eq!(last["a"], ParamValue::Int(2));
    assert_eq!(last["b"], ParamValue::Text("3".to_string()));
    assert_eq!(last["e"], ParamValue::Int(4));
    assert_eq!(last["nnode"], ParamValue::Int(2));
    assert_eq!(last["c"], ParamValue::Text("abc".to_string()));

    let command = render_command(&spec.command_template, last).expect("render");
    assert_eq!(command, "srun slow_loop.sh 2 3 4");
}

#[test]
fn scalar_parameters_are_singleton_dimensions() {
    let mut file = tempfile::NamedTempFile::new().expect("sweep file");
    file.write_all(SAMPLE.as_bytes()).expect("write");
    let spec = SweepFile::load(file.path()).expect("load");
    assert_eq!(spec.combination_count(), 6);
}
