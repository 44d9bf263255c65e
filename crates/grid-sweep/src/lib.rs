//! Sweep specification and enumeration for the gridrun orchestrator.
//!
//! A [`SweepSpec`] declares an ordered parameter space; [`enumerate`] expands
//! it into the cartesian product of concrete bindings, evaluating expression
//! parameters against earlier-declared siblings along the way.

mod enumerate;
pub mod expr;
mod file;
mod spec;
mod template;

pub use enumerate::enumerate;
pub use file::{ParamEntry, ParserSection, ScalarEntry, SweepFile};
pub use spec::{ParamSpec, SweepSpec, SweepSpecBuilder};
pub use template::{dedup_view, pretty_binding, render_command};
