/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/error.rs
*
* This file defines the crate-wide error type and Result alias. Every
* fallible operation in the operator funnels into this single enum so the
* reconciliation engine can make control-flow decisions on the error class
* instead of string matching.
*
* Architecture:
* - `NotFound` is the one class the engine treats specially: the tick that
*   observes it logs and moves on, leaving the resource to be retried on the
*   next pass. It is never an excuse to roll back or promote.
* - `Platform` carries the HTTP status and body returned by the compute
*   backend. During the availability probe of a PENDING canary it triggers a
*   rollback; everywhere else it aborts only the current resource's step.
* - `Validation` and `Unauthorized` exist for the management API boundary and
*   never originate inside the reconciliation loop.
* - Infrastructure errors (kube, reqwest, serde_json) convert via `#[from]`.
*
* SPDX-License-Identifier: Apache-2.0
*/

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("Compute platform returned {status}: {message}")]
    Platform { status: u16, message: String },

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// True when the failure means "the thing does not exist", as opposed to
    /// "the platform misbehaved". The reconciler retries these on the next
    /// tick instead of rolling back.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    /// Transient faults are worth an immediate bounded retry. Everything
    /// else (missing resources, client errors, validation) is not going to
    /// heal within the same tick.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Platform { status, .. } => *status >= 500,
            Error::Http(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
