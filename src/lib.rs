//! trellis — a suite/case test-execution engine.
//!
//! A caller builds a tree of suites and cases through [`model::registry::TestRegistry`],
//! then hands it to [`runner::run`] together with a [`runner::reporter::Reporter`] and
//! [`runner::options::RunnerOptions`]. The engine executes every case (hook chain +
//! body) either strictly in declaration order or across a bounded worker pool, bounds
//! each unit of work with a wall-clock budget, and emits an identical, tree-ordered
//! stream of reporter events in both modes.

pub mod future;
pub mod model;
pub mod runner;
pub mod timeout;
