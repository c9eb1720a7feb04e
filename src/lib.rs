//! sql-fanout - run one SQL batch against many databases at once.
//!
//! The library exposes the runner, reconciler and exporter so the binary and
//! integration tests share them.

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod logging;
pub mod query;
pub mod reconcile;
pub mod registry;
