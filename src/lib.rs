//! Brand Detector
//!
//! Background job orchestrator for frame-by-frame brand logo detection in
//! videos. Jobs are created from uploads or remote URLs, run on a bounded
//! worker pool, tracked in crash-tolerant registries, and exported to
//! PostgreSQL once complete.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
