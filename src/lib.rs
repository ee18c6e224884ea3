//! Academic scoring engine: weighted component totals, letter grades, GPA and
//! distribution aggregates, cohort rankings and report projections, over a
//! SQLite grade store.

pub mod aggregate;
pub mod calc;
pub mod config;
pub mod db;
pub mod error;
pub mod ipc;
pub mod ranking;
pub mod record;
pub mod reports;
pub mod roster;
pub mod scoring;
pub mod store;
pub mod telemetry;
pub mod validate;
