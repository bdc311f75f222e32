//! # Watch Loop
//!
//! Runs the ClientConfig, PrometheusRule and AlertConfig controllers side by side.
//!
//! PrometheusRules also watch ClientConfigs: a rule that referenced a client
//! which was not ready yet is reconciled again as soon as the client changes.

use crate::config::ControllerConfig;
use crate::controller::reconciler::{
    alert_config, client_config, rule_group, Context, ReconcilerError,
};
use crate::controller::server::ServerState;
use crate::crd::{AlertConfig, ClientConfig, PrometheusRule};
use crate::observability::metrics;
use crate::runtime::error_policy::{
    handle_reconciliation_error, handle_watch_stream_error, resource_key,
};
use futures::{Stream, StreamExt};
use kube::api::Api;
use kube::{Client, Resource, ResourceExt};
use kube_runtime::controller::Action;
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, Controller};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn, Instrument};

/// Run the controllers until a shutdown signal is received.
///
/// When all controller streams end without a shutdown, they are restarted
/// after `watch_restart_delay_after_end_secs`.
pub async fn run_watch_loop(
    client: Client,
    ctx: Arc<Context>,
    server_state: Arc<ServerState>,
) -> Result<(), anyhow::Error> {
    let config = ctx.config.clone();

    // Kubernetes sends SIGTERM, interactive runs SIGINT
    let shutdown_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal, initiating graceful shutdown...");
        shutdown_state.set_ready(false);
    });

    server_state.set_ready(true);

    loop {
        info!("Starting ClientConfig, PrometheusRule and AlertConfig controllers...");

        let client_configs = Controller::new(
            Api::<ClientConfig>::all(client.clone()),
            watcher::Config::default().any_semantic(),
        )
        .shutdown_on_signal()
        .run(
            reconcile_client_config,
            |obj, error, ctx| {
                handle_reconciliation_error(client_config::CONTROLLER, obj.as_ref(), error, &ctx)
            },
            Arc::clone(&ctx),
        );

        let rules_controller = Controller::new(
            Api::<PrometheusRule>::all(client.clone()),
            watcher::Config::default().any_semantic(),
        );
        let rule_store = rules_controller.store();
        let prometheus_rules = rules_controller
            .watches(
                Api::<ClientConfig>::all(client.clone()),
                watcher::Config::default(),
                move |client_config: ClientConfig| {
                    rule_group::dependent_rules(&rule_store.state(), &client_config.name_any())
                },
            )
            .shutdown_on_signal()
            .run(
                reconcile_prometheus_rule,
                |obj, error, ctx| {
                    handle_reconciliation_error(rule_group::CONTROLLER, obj.as_ref(), error, &ctx)
                },
                Arc::clone(&ctx),
            );

        let alert_configs = Controller::new(
            Api::<AlertConfig>::all(client.clone()),
            watcher::Config::default().any_semantic(),
        )
        .shutdown_on_signal()
        .run(
            reconcile_alert_config,
            |obj, error, ctx| {
                handle_reconciliation_error(alert_config::CONTROLLER, obj.as_ref(), error, &ctx)
            },
            Arc::clone(&ctx),
        );

        tokio::join!(
            drain(client_config::CONTROLLER, client_configs, &config),
            drain(rule_group::CONTROLLER, prometheus_rules, &config),
            drain(alert_config::CONTROLLER, alert_configs, &config),
        );

        if !server_state.ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let delay = config.watch_restart_delay_after_end_duration();
        warn!(
            "Controller watch streams ended, restarting in {} seconds...",
            delay.as_secs()
        );
        tokio::time::sleep(delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}

/// Consume a controller stream, resetting the throttling backoff on every success
async fn drain<T, E, S>(controller: &'static str, stream: S, config: &ControllerConfig)
where
    S: Stream<Item = Result<T, E>>,
    E: std::fmt::Debug,
{
    let backoff = AtomicU64::new(config.backoff_start_ms);
    stream
        .for_each(|event| {
            let backoff = &backoff;
            async move {
                match event {
                    Ok(_) => {
                        backoff.store(config.backoff_start_ms, Ordering::Relaxed);
                        debug!(controller, "watch.event.success");
                    }
                    Err(e) => {
                        handle_watch_stream_error(
                            controller,
                            &format!("{e:?}"),
                            backoff,
                            config.backoff_max_ms,
                            config.watch_restart_delay_secs,
                        )
                        .await;
                    }
                }
            }
        })
        .await;
}

fn reconcile_span<K: Resource<DynamicType = ()>>(controller: &str, obj: &K) -> tracing::Span {
    tracing::span!(
        tracing::Level::INFO,
        "controller.reconcile",
        controller,
        resource.name = %obj.name_any(),
        resource.namespace = %obj.namespace().unwrap_or_default(),
        resource.generation = obj.meta().generation.unwrap_or(0),
    )
}

/// Record metrics of a finished pass and forget the backoff history on success
fn finish<K: Resource<DynamicType = ()>>(
    controller: &str,
    obj: &K,
    ctx: &Context,
    started: Instant,
    result: &Result<Action, ReconcilerError>,
) {
    metrics::increment_reconciliations(controller);
    metrics::observe_reconciliation_duration(controller, started.elapsed().as_secs_f64());
    match result {
        Ok(action) => {
            ctx.reset_backoff(&resource_key(obj));
            debug!(controller, resource = %obj.name_any(), action = ?action, "watch.event.reconciled");
        }
        Err(e) => {
            debug!(controller, resource = %obj.name_any(), error = %e, "watch.event.reconciliation_failed");
        }
    }
}

async fn reconcile_client_config(
    obj: Arc<ClientConfig>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcilerError> {
    let started = Instant::now();
    let span = reconcile_span(client_config::CONTROLLER, obj.as_ref());
    let result = client_config::reconcile(&ObjectRef::from_obj(obj.as_ref()), &ctx)
        .instrument(span)
        .await;
    finish(client_config::CONTROLLER, obj.as_ref(), &ctx, started, &result);
    result
}

async fn reconcile_prometheus_rule(
    obj: Arc<PrometheusRule>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcilerError> {
    let started = Instant::now();
    let span = reconcile_span(rule_group::CONTROLLER, obj.as_ref());
    let result = rule_group::reconcile(&ObjectRef::from_obj(obj.as_ref()), &ctx)
        .instrument(span)
        .await;
    finish(rule_group::CONTROLLER, obj.as_ref(), &ctx, started, &result);
    result
}

async fn reconcile_alert_config(
    obj: Arc<AlertConfig>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcilerError> {
    let started = Instant::now();
    let span = reconcile_span(alert_config::CONTROLLER, obj.as_ref());
    let result = alert_config::reconcile(&ObjectRef::from_obj(obj.as_ref()), &ctx)
        .instrument(span)
        .await;
    finish(alert_config::CONTROLLER, obj.as_ref(), &ctx, started, &result);
    result
}
