//! # Mimir Rules Controller
//!
//! A Kubernetes controller that keeps Grafana Mimir / Cortex in sync with the
//! cluster:
//!
//! 1. **ClientConfig** - declares a backend; the controller keeps a
//!    health-checked client per ClientConfig and reports `Connected` or
//!    `Disconnected`
//! 2. **PrometheusRule** - rule groups are pushed to the ruler of the client
//!    named in the `mimir-controller.io/client-name` annotation
//! 3. **AlertConfig** - Alertmanager configuration and templates are pushed
//!    to the tenant's alertmanager
//!
//! Deleting a PrometheusRule or AlertConfig removes the remote objects before
//! the finalizer is released.

use anyhow::Result;
use mimir_rules_controller::runtime::initialization::initialize;
use mimir_rules_controller::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;
    run_watch_loop(init.client, init.context, init.server_state).await
}
