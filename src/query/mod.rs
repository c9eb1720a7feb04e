//! Concurrent query execution across targets.

pub mod runner;

pub use runner::{ExecutionResult, ExecutionResults, QueryRunner, RunStatus, TargetResult};
