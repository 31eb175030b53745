/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/config.rs
*
* This file centralizes runtime configuration for the operator. Everything
* deployment-specific is read from environment variables once at startup and
* carried through the process as an immutable `Config` value; protocol
* constants that external tooling depends on (alias names, the tick period)
* are compile-time constants instead.
*
* SPDX-License-Identifier: Apache-2.0
*/

use std::time::Duration;

use crate::error::{Error, Result};

/// Alias that production traffic resolves through.
pub const STABLE_ALIAS: &str = "release";
/// Alias the new version is exposed under while it is being evaluated.
pub const CANARY_ALIAS: &str = "canary";

/// Period of the reconciliation loop. Fixed by contract; per-resource pacing
/// is expressed through `CanaryPolicy.cooldown`, not by tuning the tick.
pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

/// Field manager used for server-side apply patches.
pub const FIELD_MANAGER: &str = "ph-canary-operator";

#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL of the Lambda-compatible REST API.
    pub lambda_endpoint: String,
    /// Base URL of the CloudWatch-compatible metrics gateway.
    pub metrics_endpoint: String,
    /// Namespace the canary resources live in.
    pub namespace: String,
    /// Port of the management API.
    pub http_port: u16,
    /// Port of the Prometheus exposition endpoint.
    pub metrics_port: u16,
    /// HS256 secret for management-API bearer tokens. When absent the API
    /// runs unauthenticated and a warning is logged at startup.
    pub jwt_secret: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            lambda_endpoint: env_or("LAMBDA_ENDPOINT", "http://localhost:4566"),
            metrics_endpoint: env_or("METRICS_ENDPOINT", "http://localhost:4566"),
            namespace: env_or("NAMESPACE", "default"),
            http_port: env_port("HTTP_PORT", 8080)?,
            metrics_port: env_port("METRICS_PORT", 9090)?,
            jwt_secret: std::env::var("JWT_SECRET").ok().filter(|s| !s.is_empty()),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_port(key: &str, default: u16) -> Result<u16> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<u16>()
            .map_err(|_| Error::Config(format!("{} must be a port number, got '{}'", key, raw))),
        Err(_) => Ok(default),
    }
}

// --- Tests ---
