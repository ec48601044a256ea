//! Scheduler inspector service: ClickHouse-backed slot inspection, producer
//! classification, leader transition analytics, activity dashboards and
//! prop-AMM win rates on top of `sequencing-core`.

pub mod api;
pub mod batch;
pub mod cache;
pub mod classify_cmd;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod metrics;
pub mod reports;
pub mod store;
pub mod validators_app;
pub mod winrates;

pub use error::{InspectorError, Result};
