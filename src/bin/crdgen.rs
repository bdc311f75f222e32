//! # CRD Generator
//!
//! Prints the CustomResourceDefinitions owned by the controller.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/crds.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```
//!
//! PrometheusRule is installed by the Prometheus Operator and not generated here.

use anyhow::Result;
use kube::core::CustomResourceExt;
use mimir_rules_controller::crd::{AlertConfig, ClientConfig};

fn main() -> Result<()> {
    let documents = [
        serde_yaml::to_string(&ClientConfig::crd())?,
        serde_yaml::to_string(&AlertConfig::crd())?,
    ];
    print!("{}", documents.join("---\n"));
    Ok(())
}
