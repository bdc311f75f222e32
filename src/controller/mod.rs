//! # Controller
//!
//! Core controller modules.
//!
//! - `backoff`: Fibonacci backoff for failing resources
//! - `events`: Kubernetes Event publishing
//! - `reconciler`: Reconciliation logic for ClientConfig, PrometheusRule and AlertConfig
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod events;
pub mod reconciler;
pub mod server;
