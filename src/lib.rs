//! Mimir Rules Controller Library
//!
//! Kubernetes controller that pushes PrometheusRule groups and Alertmanager
//! configuration to Grafana Mimir or Cortex.
//!
//! ## Quick Start
//!
//! ```rust
//! use mimir_rules_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific
//! imports, use the individual modules.

pub mod backend;
pub mod cache;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod store;
