//! # Runtime
//!
//! Process startup, the watch loop and its error policy.
//!
//! - `initialization`: rustls, tracing, metrics, HTTP server, Kubernetes client
//! - `watch_loop`: runs the three controllers until shutdown
//! - `error_policy`: per-resource backoff and watch stream error handling

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
