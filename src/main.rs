/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/main.rs
*
* This file is the main entry point for the ph canary operator. It is
* responsible for constructing every collaborator once, wiring them together
* by dependency injection, and running the long-lived tasks concurrently.
*
* Architecture:
* 1.  **Initialization**: structured logging (tracing with an env filter and
*     a JSON formatter), then the typed configuration from the environment.
* 2.  **Bootstrap**: a Kubernetes client is created and the phLambdaCanary
*     CRD is applied so a fresh cluster works without a separate install
*     step.
* 3.  **Clients**: the compute adapter, the metrics adapter, and the
*     resource store are constructed here and handed to the engine and the
*     management API as trait objects. No module-scope client state exists.
* 4.  **Concurrent Execution**: the reconciliation loop, the management API
*     server, and the Prometheus exposition endpoint run under one
*     `tokio::select!`. A Ctrl-C broadcast lets the engine finish its
*     in-flight tick before the process exits.
*
* SPDX-License-Identifier: Apache-2.0
*/

#![allow(non_camel_case_types)]

use std::sync::Arc;

use anyhow::Context as _;
use kube::Client;
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use warp::Filter;

mod api;
mod auth;
mod config;
mod crds;
mod error;
mod metrics;
mod policy;
mod retry;
mod clients {
    pub mod cloudwatch;
    pub mod kubernetes;
    pub mod lambda;
}
mod controllers {
    pub mod canary_controller;
}

use clients::cloudwatch::CloudWatchClient;
use clients::kubernetes::{ensure_crd, KubeCanaryStore};
use clients::lambda::LambdaClient;
use config::Config;

/// Initializes the tracing subscriber: env-filtered, JSON-formatted.
fn init_telemetry() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().json();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}

/// Renders the metrics into the Prometheus text format.
async fn metrics_handler(registry: Arc<Registry>) -> Result<impl warp::Reply, warp::Rejection> {
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    encoder
        .encode(&registry.gather(), &mut buffer)
        .expect("Failed to encode metrics");

    let response = String::from_utf8(buffer).expect("Failed to convert metrics to string");
    Ok(warp::reply::with_header(
        response,
        "Content-Type",
        encoder.format_type(),
    ))
}

/// Runs the HTTP server to expose the /metrics endpoint.
async fn run_metrics_server(registry: Arc<Registry>, port: u16) {
    let metrics_route = warp::path("metrics")
        .and(warp::get())
        .and(warp::any().map(move || Arc::clone(&registry)))
        .and_then(metrics_handler);

    info!(port, "Starting metrics server");
    warp::serve(metrics_route).run(([0, 0, 0, 0], port)).await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Logging and configuration.
    init_telemetry()?;
    let config = Config::from_env().context("loading configuration")?;
    info!(
        lambda_endpoint = %config.lambda_endpoint,
        metrics_endpoint = %config.metrics_endpoint,
        namespace = %config.namespace,
        "ph canary operator starting"
    );

    // 2. Kubernetes client and CRD bootstrap.
    let client = Client::try_default()
        .await
        .context("connecting to the Kubernetes API server")?;
    ensure_crd(client.clone())
        .await
        .context("installing the phLambdaCanary CRD")?;

    // 3. Collaborators, constructed once and injected everywhere.
    let store = Arc::new(KubeCanaryStore::new(client, &config.namespace));
    let lambda = Arc::new(LambdaClient::new(&config.lambda_endpoint));
    let cloudwatch = Arc::new(CloudWatchClient::new(&config.metrics_endpoint));

    let auth = auth::AuthVerifier::new(config.jwt_secret.clone());
    if !auth.is_enabled() {
        warn!("JWT_SECRET is not set; the management API runs UNAUTHENTICATED");
    }

    let engine_ctx = Arc::new(controllers::canary_controller::Context {
        store: store.clone(),
        lambda: lambda.clone(),
        metrics: cloudwatch,
    });
    let api_ctx = Arc::new(api::ApiContext {
        store,
        lambda,
        auth,
    });

    // 4. Metrics registry.
    let registry = Arc::new(metrics::create_and_register_metrics()?);
    info!("Custom metrics registered");

    // 5. Graceful shutdown: Ctrl-C flips the watch channel; the engine
    // finishes its in-flight tick and returns, ending the select.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    // 6. Run everything concurrently until the engine stops.
    tokio::select! {
        _ = controllers::canary_controller::run(engine_ctx, shutdown_rx) => {
            info!("Reconciliation loop stopped");
        }
        _ = api::run_api_server(api_ctx, config.http_port) => {
            warn!("Management API server exited unexpectedly");
        }
        _ = run_metrics_server(registry, config.metrics_port) => {
            warn!("Metrics server exited unexpectedly");
        }
    }

    info!("ph canary operator shut down");
    Ok(())
}
