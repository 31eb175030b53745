/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/policy.rs
*
* This file implements the canary policy evaluator. It is deliberately free
* of I/O: the reconciliation engine feeds it observed counts and a policy,
* and it answers with a verdict. Keeping it pure makes the promotion and
* rollback rules unit-testable without any cluster or platform access.
*
* Architecture:
* - `evaluate` turns (error_count, request_count, policy) into a `Verdict`.
*   No traffic means no signal: a canary that served zero requests holds its
*   position instead of being promoted on silence.
* - `next_traffic_percent` applies a verdict to the cumulative traffic share,
*   clamping at 100.
* - `traffic_config` derives the alias weight pair; canary and stable always
*   sum to exactly 100.
*
* SPDX-License-Identifier: Apache-2.0
*/

use crate::crds::CanaryPolicy;

/// Outcome of one metric evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// No signal (zero requests) or cooldown not elapsed. Keep the current
    /// traffic share and stay in the current phase.
    Hold,
    /// Error rate below the threshold. Grant the canary another step of
    /// traffic and clear it for promotion.
    Advance,
    /// Error rate reached the threshold. Abort the rollout.
    Rollback,
}

/// Decide what the observed window means for the canary.
///
/// The threshold comparison is inclusive: an error rate exactly at
/// `policy.threshold` already triggers a rollback.
pub fn evaluate(error_count: u64, request_count: u64, policy: &CanaryPolicy) -> Verdict {
    if request_count == 0 {
        return Verdict::Hold;
    }
    let error_rate = error_count as f64 / request_count as f64;
    if error_rate >= policy.threshold {
        return Verdict::Rollback;
    }
    Verdict::Advance
}

/// Cumulative traffic share after applying a verdict, clamped to 100.
pub fn next_traffic_percent(current: u8, verdict: Verdict, policy: &CanaryPolicy) -> u8 {
    match verdict {
        Verdict::Hold => current,
        Verdict::Rollback => 0,
        Verdict::Advance => current.saturating_add(policy.step).min(100),
    }
}

/// Weight pair for the alias routing configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrafficConfig {
    pub canary: u8,
    pub stable: u8,
}

/// Splits traffic between the canary and stable aliases. The two shares
/// always sum to 100; a share of 0 simply means no traffic, it is not a
/// rollback by itself.
pub fn traffic_config(canary_percent: u8) -> TrafficConfig {
    let canary = canary_percent.min(100);
    TrafficConfig {
        canary,
        stable: 100 - canary,
    }
}

// --- Tests ---
