use grid_core::{ErrorInfo, FieldMap, GridError, RunStamp};

use crate::expr;
use crate::spec::{ParamSpec, SweepSpec};

/// Expands a sweep into the full cartesian product of bindings.
///
/// Parameters are processed in declaration order as nested loops: the first
/// declared name is the outermost loop (slowest varying), the last declared
/// the innermost (fastest). Expressions and generators are evaluated once per
/// combination against the parameters already fixed in that pass, so they see
/// strictly-earlier declarations only. Any evaluation failure aborts the whole
/// enumeration before a single further binding is produced.
///
/// Pure with respect to `spec` and `stamp`: re-running yields an identical
/// sequence (generator parameters excepted, by their nature).
pub fn enumerate(spec: &SweepSpec, stamp: &RunStamp) -> Result<Vec<FieldMap>, GridError> {
    let names: Vec<&String> = spec.params.keys().collect();
    let mut seed = FieldMap::new();
    seed.insert("run_at".to_string(), stamp.run_at.as_str().into());
    if let Some(tag) = &stamp.tag {
        seed.insert("tag".to_string(), tag.as_str().into());
    }

    let mut out = Vec::with_capacity(spec.combination_count());
    expand(spec, &names, &mut seed, &mut out)?;
    Ok(out)
}

fn expand(
    spec: &SweepSpec,
    names: &[&String],
    acc: &mut FieldMap,
    out: &mut Vec<FieldMap>,
) -> Result<(), GridError> {
    let Some((name, rest)) = names.split_first() else {
        out.push(acc.clone());
        return Ok(());
    };
    let param = &spec.params[name.as_str()];
    let candidates = match param {
        ParamSpec::List(values) => values.len(),
        _ => 1,
    };
    for idx in 0..candidates {
        let value = match param {
            ParamSpec::Literal(value) => value.clone(),
            ParamSpec::List(values) => values[idx].clone(),
            ParamSpec::Expr(source) => expr::eval(source, acc).map_err(|err| {
                GridError::Expr(
                    ErrorInfo::new("enumerate-expr", err.info().message.clone())
                        .with_context("parameter", name.to_string())
                        .with_context("expression", source.clone()),
                )
            })?,
            ParamSpec::Generator(generate) => generate(),
        };
        acc.insert(name.to_string(), value);
        expand(spec, rest, acc, out)?;
        acc.shift_remove(name.as_str());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    use grid_core::ParamValue;

    use super::*;
    use crate::spec::SweepSpec;

    fn stamp() -> RunStamp {
        RunStamp {
            run_at: "2026-01-01T00:00:00+00:00".to_string(),
            tag: None,
        }
    }

    #[test]
    fn first_declared_varies_slowest() {
        let spec = SweepSpec::builder("t %{a} %{b}")
            .list("a", [1i64, 2])
            .list("b", [10i64, 20, 30])
            .build()
            .unwrap();
        let bindings = enumerate(&spec, &stamp()).unwrap();
        assert_eq!(bindings.len(), 6);
        let pairs: Vec<(i64, i64)> = bindings
            .iter()
            .map(|b| {
                let a = match b["a"] {
                    ParamValue::Int(v) => v,
                    _ => panic!("a not int"),
                };
                let bb = match b["b"] {
                    ParamValue::Int(v) => v,
                    _ => panic!("b not int"),
                };
                (a, bb)
            })
            .collect();
        assert_eq!(
            pairs,
            [(1, 10), (1, 20), (1, 30), (2, 10), (2, 20), (2, 30)]
        );
    }

    #[test]
    fn expression_sees_earlier_parameters_only() {
        let spec = SweepSpec::builder("t")
            .list("a", [1i64, 2])
            .expr("e", "a*2")
            .build()
            .unwrap();
        let bindings = enumerate(&spec, &stamp()).unwrap();
        assert_eq!(bindings[0]["e"], ParamValue::Int(2));
        assert_eq!(bindings[1]["e"], ParamValue::Int(4));
    }

    #[test]
    fn forward_reference_aborts_enumeration() {
        let spec = SweepSpec::builder("t")
            .expr("e", "later*2")
            .list("later", [1i64, 2])
            .build()
            .unwrap();
        let err = enumerate(&spec, &stamp()).unwrap_err();
        assert_eq!(err.info().code, "enumerate-expr");
        assert_eq!(err.info().context.get("parameter").unwrap(), "e");
        assert_eq!(err.info().context.get("expression").unwrap(), "later*2");
    }

    #[test]
    fn generator_runs_once_per_combination() {
        let counter = Arc::new(AtomicI64::new(0));
        let c2 = Arc::clone(&counter);
        let spec = SweepSpec::builder("t")
            .list("a", [1i64, 2, 3])
            .param(
                "g",
                ParamSpec::Generator(Arc::new(move || {
                    ParamValue::Int(c2.fetch_add(1, Ordering::SeqCst))
                })),
            )
            .build()
            .unwrap();
        let bindings = enumerate(&spec, &stamp()).unwrap();
        assert_eq!(bindings.len(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn provenance_is_injected_into_every_binding() {
        let spec = SweepSpec::builder("t").literal("a", 1i64).build().unwrap();
        let stamp = RunStamp {
            run_at: "2026-01-01T00:00:00+00:00".to_string(),
            tag: Some("v1".to_string()),
        };
        let bindings = enumerate(&spec, &stamp).unwrap();
        assert_eq!(bindings[0]["run_at"], ParamValue::Text(stamp.run_at));
        assert_eq!(bindings[0]["tag"], ParamValue::Text("v1".to_string()));
    }

    #[test]
    fn reenumeration_is_idempotent() {
        let spec = SweepSpec::builder("t")
            .list("a", [1i64, 2])
            .list("b", ["x", "y"])
            .expr("e", "a+1")
            .build()
            .unwrap();
        let st = stamp();
        assert_eq!(enumerate(&spec, &st).unwrap(), enumerate(&spec, &st).unwrap());
    }
}
