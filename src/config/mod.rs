//! # Configuration
//!
//! Controller-level configuration loaded from the environment.

mod controller;

pub use controller::{parse_header_list, ControllerConfig};
