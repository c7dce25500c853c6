//! Inventory dashboard engine: capacity resolution, analytics aggregation
//! and ordering of per-location product tables, plus the HTTP service that
//! serves them.

pub mod analytics;
pub mod api;
pub mod autosave;
pub mod capacity;
pub mod client;
pub mod config;
pub mod dashboard;
pub mod expression;
pub mod loader;
pub mod model;
pub mod session;
pub mod sorter;
pub mod status;
pub mod types;
