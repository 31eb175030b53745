/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/retry.rs
*
* This file provides a bounded retry decorator for side-effecting calls
* against the compute platform. A single tick of the reconciliation loop
* should survive a blip on the platform API without waiting a full tick
* period, but it must never retry forever or mask a persistent outage.
*
* Architecture:
* - Only transient faults (5xx responses, transport errors) are retried;
*   NotFound and client errors surface immediately so the state machine can
*   react to them.
* - The attempt budget and delay are fixed and small. Anything the budget
*   cannot absorb is handed back to the caller, which logs it and leaves the
*   resource for the next tick.
*
* SPDX-License-Identifier: Apache-2.0
*/

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::Result;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Runs `call` until it succeeds, fails non-transiently, or exhausts the
/// default attempt budget.
pub async fn with_retry<T, Fut, F>(operation: &str, call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_retry_policy(operation, MAX_ATTEMPTS, RETRY_DELAY, call).await
}

pub async fn with_retry_policy<T, Fut, F>(
    operation: &str,
    max_attempts: u32,
    delay: Duration,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    error = %err,
                    "Transient platform fault, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

// --- Tests ---
