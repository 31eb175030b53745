/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/controllers/canary_controller.rs
*
* This file implements the reconciliation engine, the core of the operator.
* A single periodic loop lists every phLambdaCanary resource and drives each
* one through its rollout state machine, calling out to the compute platform,
* the metrics gateway, and the resource store.
*
* Architecture:
* - **State machine**: PENDING evaluates the canary (stable lookup,
*   availability probe, error-rate verdict); RUNNING is promoted
*   unconditionally on the next observed tick (a single promotion gate, not
*   continuous ramping); PROMOTED and ROLLED_BACK are terminal and are never
*   left.
* - **Idempotency**: rollback on an already-rolled-back canary and promote
*   on anything but RUNNING are guarded no-ops with zero side-effecting
*   calls. Repeated reconciliation of the same resource is always safe.
* - **Isolation**: one resource failing its step is logged and counted; the
*   tick carries on with the remaining resources. Only a failed canary
*   listing aborts a whole tick, and only until the next one.
* - **Dependency injection**: the engine owns no clients. It receives the
*   `CanaryStore`, `LambdaApi`, and `MetricsProvider` trait objects through
*   a shared `Context`, so tests drive the full state machine with in-memory
*   implementations.
*
* SPDX-License-Identifier: Apache-2.0
*/

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::clients::cloudwatch::{InvocationCounts, MetricSample, MetricsProvider};
use crate::clients::kubernetes::CanaryStore;
use crate::clients::lambda::LambdaApi;
use crate::config::{CANARY_ALIAS, RECONCILE_INTERVAL, STABLE_ALIAS};
use crate::crds::{phLambdaCanary, phLambdaCanaryStatus, CanaryPhase, CanaryPolicy};
use crate::error::Result;
use crate::metrics::{
    PHCANARY_ACTIVE, PHCANARY_RECONCILE_ERRORS_TOTAL, PHCANARY_ROLLOUTS_TOTAL,
    PHCANARY_TICK_DURATION_SECONDS,
};
use crate::policy::{evaluate, next_traffic_percent, traffic_config, Verdict};
use crate::retry::with_retry;

/// Shared handles for everything the engine talks to. Constructed once in
/// main and injected; the engine holds no client state of its own.
pub struct Context {
    pub store: Arc<dyn CanaryStore>,
    pub lambda: Arc<dyn LambdaApi>,
    pub metrics: Arc<dyn MetricsProvider>,
}

// --- Loop ---

/// Runs the reconciliation loop until a shutdown is signalled. The shutdown
/// only races the inter-tick sleep, so an in-flight tick always completes
/// before the loop returns.
pub async fn run(ctx: Arc<Context>, mut shutdown: watch::Receiver<bool>) {
    info!(
        interval_secs = RECONCILE_INTERVAL.as_secs(),
        "Reconciliation loop started"
    );
    loop {
        tick(&ctx).await;
        tokio::select! {
            _ = tokio::time::sleep(RECONCILE_INTERVAL) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("Shutdown requested; reconciliation loop stopping");
                    return;
                }
            }
        }
    }
}

/// One pass over every canary resource. Listing failures abort the whole
/// tick; per-resource failures abort only that resource's step.
pub async fn tick(ctx: &Context) {
    let timer = PHCANARY_TICK_DURATION_SECONDS.start_timer();

    let canaries = match ctx.store.list_canaries().await {
        Ok(canaries) => canaries,
        Err(err) => {
            error!(error = %err, "Listing canaries failed; aborting this tick");
            timer.observe_duration();
            return;
        }
    };

    let mut active = 0i64;
    for canary in &canaries {
        let function = canary.spec.function_name.as_str();
        match reconcile_canary(ctx, canary).await {
            Ok(phase) => {
                if !phase.is_terminal() {
                    active += 1;
                }
            }
            Err(err) => {
                PHCANARY_RECONCILE_ERRORS_TOTAL.inc();
                error!(function, error = %err, "Reconciliation step failed");
                if canary.phase().map(|p| !p.is_terminal()).unwrap_or(true) {
                    active += 1;
                }
            }
        }
    }

    PHCANARY_ACTIVE.set(active);
    timer.observe_duration();
}

// --- State machine ---

/// Advances one canary by at most one transition and returns the phase it
/// ended the tick in.
pub async fn reconcile_canary(ctx: &Context, canary: &phLambdaCanary) -> Result<CanaryPhase> {
    let function = canary.spec.function_name.as_str();
    match canary.phase() {
        None => initialize(ctx, canary).await,
        Some(CanaryPhase::Pending) => reconcile_pending(ctx, canary).await,
        Some(CanaryPhase::Running) => promote(ctx, canary).await,
        Some(phase) => {
            debug!(function, ?phase, "Rollout finished; nothing to reconcile");
            Ok(phase)
        }
    }
}

/// First observation of a new resource: expose the new version under the
/// canary alias, record the restore point, and enter PENDING.
async fn initialize(ctx: &Context, canary: &phLambdaCanary) -> Result<CanaryPhase> {
    let function = canary.spec.function_name.as_str();
    let new_version = canary.spec.new_version.as_str();

    with_retry("update_alias", || {
        ctx.lambda.update_alias(function, CANARY_ALIAS, new_version)
    })
    .await?;

    // The release alias is the restore point for a later rollback. A
    // function without one yet falls back to the spec's oldVersion.
    let stable = match ctx.lambda.get_stable_version(function).await {
        Ok(version) => version,
        Err(err) if err.is_not_found() => {
            debug!(function, "No release alias yet; using spec.oldVersion as restore point");
            canary.spec.old_version.clone()
        }
        Err(err) => return Err(err),
    };

    let status = phLambdaCanaryStatus {
        phase: Some(CanaryPhase::Pending),
        traffic_percent: Some(0),
        stable_version: Some(stable),
        last_evaluation_time: None,
        message: Some(format!(
            "Canary alias points at version {}; evaluation started",
            new_version
        )),
    };
    ctx.store.update_status(function, status).await?;
    info!(function, new_version, "Canary rollout entered PENDING");
    Ok(CanaryPhase::Pending)
}

/// The evaluation step of a PENDING canary: stable lookup, availability
/// probe, idempotent alias re-apply, then the metric verdict.
async fn reconcile_pending(ctx: &Context, canary: &phLambdaCanary) -> Result<CanaryPhase> {
    let function = canary.spec.function_name.as_str();
    let new_version = canary.spec.new_version.as_str();
    let policy = &canary.spec.policy;
    let now = Utc::now();

    // Without a stable version there is nothing to roll back to, so the
    // canary must not move at all this tick.
    match ctx.lambda.get_stable_version(function).await {
        Ok(_) => {}
        Err(err) if err.is_not_found() => {
            warn!(function, "Stable version lookup failed; retrying next tick");
            return Ok(CanaryPhase::Pending);
        }
        Err(err) => return Err(err),
    }

    // Availability probe. An unhealthy version or a platform fault during
    // the probe aborts the rollout; a missing version is retried instead.
    match ctx.lambda.is_function_available(function, new_version).await {
        Ok(true) => {}
        Ok(false) => {
            warn!(function, new_version, "Canary version failed the availability probe");
            return rollback(ctx, canary, "availability probe failed").await;
        }
        Err(err) if err.is_not_found() => {
            warn!(function, new_version, "Canary version not published yet; retrying next tick");
            return Ok(CanaryPhase::Pending);
        }
        Err(err) => {
            warn!(function, new_version, error = %err, "Availability probe errored");
            return rollback(ctx, canary, "availability probe errored").await;
        }
    }

    // Re-applied every tick; the platform treats it as a no-op when the
    // alias already points at the new version.
    with_retry("update_alias", || {
        ctx.lambda.update_alias(function, CANARY_ALIAS, new_version)
    })
    .await?;

    if !cooldown_elapsed(canary.status.as_ref(), policy.cooldown, now) {
        debug!(function, cooldown = policy.cooldown, "Cooldown not elapsed; skipping evaluation");
        return Ok(CanaryPhase::Pending);
    }

    let (start, end) = evaluation_window(policy, now);
    let sample = observe(ctx, function, start, end).await;
    if let Some(latency) = sample.latency {
        debug!(
            function,
            average_ms = latency.average,
            maximum_ms = latency.maximum,
            "Canary latency over the evaluation window"
        );
    }

    match evaluate(sample.counts.errors, sample.counts.requests, policy) {
        Verdict::Hold => {
            debug!(function, "No traffic observed; holding canary at current share");
            let mut status = canary.status.clone().unwrap_or_default();
            status.phase = Some(CanaryPhase::Pending);
            status.last_evaluation_time = Some(now.to_rfc3339());
            status.message = Some("No traffic observed; holding".to_string());
            ctx.store.update_status(function, status).await?;
            Ok(CanaryPhase::Pending)
        }
        Verdict::Rollback => {
            warn!(
                function,
                errors = sample.counts.errors,
                requests = sample.counts.requests,
                threshold = policy.threshold,
                "Error rate reached the policy threshold"
            );
            rollback(ctx, canary, "error rate reached the policy threshold").await
        }
        Verdict::Advance => {
            let split = traffic_config(next_traffic_percent(
                canary.traffic_percent(),
                Verdict::Advance,
                policy,
            ));
            let mut status = canary.status.clone().unwrap_or_default();
            status.phase = Some(CanaryPhase::Running);
            status.traffic_percent = Some(split.canary);
            status.last_evaluation_time = Some(now.to_rfc3339());
            status.message = Some(format!(
                "Error rate below threshold; shifting traffic to {}% canary / {}% stable",
                split.canary, split.stable
            ));
            ctx.store.update_status(function, status).await?;
            info!(
                function,
                canary_percent = split.canary,
                stable_percent = split.stable,
                "Canary cleared for promotion"
            );
            Ok(CanaryPhase::Running)
        }
    }
}

/// Collects the per-tick observation bundle for one canary. Metric outages
/// degrade to silence (no latency, zero counts), never to an error: the
/// policy layer decides what silence means.
async fn observe(
    ctx: &Context,
    function: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> MetricSample {
    let latency = match ctx.metrics.get_statistics(function, start, end).await {
        Ok(latency) => latency,
        Err(err) => {
            warn!(function, error = %err, "Latency statistics unavailable");
            None
        }
    };
    let counts = match ctx.metrics.get_invocation_counts(function, start, end).await {
        Ok(counts) => counts,
        Err(err) => {
            warn!(function, error = %err, "Invocation counts unavailable; treating window as no signal");
            InvocationCounts::default()
        }
    };
    MetricSample { latency, counts }
}

// --- Procedures ---

/// Restores production traffic to the stable version and marks the rollout
/// as failed. Idempotent: an already-rolled-back canary is a logged no-op
/// with zero side-effecting calls.
pub async fn rollback(ctx: &Context, canary: &phLambdaCanary, reason: &str) -> Result<CanaryPhase> {
    let function = canary.spec.function_name.as_str();
    if canary.phase() == Some(CanaryPhase::RolledBack) {
        info!(function, "Already rolled back; nothing to do");
        return Ok(CanaryPhase::RolledBack);
    }

    // The restore target only ever involves the known-good stable version,
    // so a rollback cannot fail because the canary itself is unhealthy.
    let stable = match ctx.lambda.get_stable_version(function).await {
        Ok(version) => version,
        Err(err) if err.is_not_found() => canary
            .status
            .as_ref()
            .and_then(|s| s.stable_version.clone())
            .unwrap_or_else(|| canary.spec.old_version.clone()),
        Err(err) => return Err(err),
    };

    with_retry("update_alias", || {
        ctx.lambda.update_alias(function, STABLE_ALIAS, &stable)
    })
    .await?;

    let mut status = canary.status.clone().unwrap_or_default();
    status.phase = Some(CanaryPhase::RolledBack);
    status.traffic_percent = Some(0);
    status.message = Some(format!("Rolled back to version {}: {}", stable, reason));
    ctx.store.update_status(function, status).await?;

    PHCANARY_ROLLOUTS_TOTAL.with_label_values(&["rolled_back"]).inc();
    warn!(function, stable = %stable, reason, "Canary rolled back");
    Ok(CanaryPhase::RolledBack)
}

/// Moves the release alias to the new version and marks the rollout as
/// succeeded. Guarded: anything but RUNNING is a no-op.
pub async fn promote(ctx: &Context, canary: &phLambdaCanary) -> Result<CanaryPhase> {
    let function = canary.spec.function_name.as_str();
    let current = canary.phase();
    if current != Some(CanaryPhase::Running) {
        debug!(function, ?current, "Promotion requested outside RUNNING; ignoring");
        return Ok(current.unwrap_or(CanaryPhase::Pending));
    }

    let new_version = canary.spec.new_version.as_str();
    with_retry("update_alias", || {
        ctx.lambda.update_alias(function, STABLE_ALIAS, new_version)
    })
    .await?;

    let mut status = canary.status.clone().unwrap_or_default();
    status.phase = Some(CanaryPhase::Promoted);
    status.traffic_percent = Some(100);
    status.message = Some(format!("Promoted version {} to release", new_version));
    ctx.store.update_status(function, status).await?;

    PHCANARY_ROLLOUTS_TOTAL.with_label_values(&["promoted"]).inc();
    info!(function, new_version, "Canary promoted");
    Ok(CanaryPhase::Promoted)
}

// --- Pure helpers ---

/// Whether enough time has passed since the last evaluation to look at the
/// metrics again. A missing or unparseable timestamp counts as elapsed.
fn cooldown_elapsed(status: Option<&phLambdaCanaryStatus>, cooldown: u64, now: DateTime<Utc>) -> bool {
    let Some(last) = status.and_then(|s| s.last_evaluation_time.as_deref()) else {
        return true;
    };
    match DateTime::parse_from_rfc3339(last) {
        Ok(at) => {
            now.signed_duration_since(at.with_timezone(&Utc)).num_seconds() >= cooldown as i64
        }
        Err(_) => true,
    }
}

/// Metric window ending now. Tied to the cooldown so one evaluation sees
/// roughly one cooldown period of traffic, with a floor of one minute.
fn evaluation_window(policy: &CanaryPolicy, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let span = policy.cooldown.max(60);
    (now - ChronoDuration::seconds(span as i64), now)
}

// --- Tests ---
