/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/crds.rs
*
* This file defines the Rust data structures that correspond to our Custom
* Resource Definition (CRD). By using the `kube::CustomResource` derive macro,
* we create a strongly-typed representation of the canary API, enabling safe
* and idiomatic interaction with the Kubernetes API server.
*
* Architecture:
* - `phLambdaCanary` represents one progressive rollout of a serverless
*   function version. The resource name doubles as the function name, which
*   is the identity key for the whole system.
* - The standard Kubernetes object structure is followed by separating the
*   user's desired state (`spec`) from the controller's observed state
*   (`status`). The spec is immutable for the duration of one rollout; a new
*   rollout is started by replacing the spec through the management API.
* - `CanaryPhase` is the wire-visible lifecycle of a rollout. The values are
*   serialized in SCREAMING_SNAKE_CASE because external tooling matches on
*   the literal strings (e.g. `PROMOTED`).
* - `serde` attributes map between idiomatic Rust `snake_case` and idiomatic
*   Kubernetes `camelCase`.
* - `schemars` generates an OpenAPI v3 schema from the Rust types, which is
*   embedded into the CRD manifest for server-side validation.
*
* SPDX-License-Identifier: Apache-2.0
*/

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// --- phLambdaCanary Custom Resource Definition ---

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "ph.io",
    version = "v1alpha1",
    kind = "phLambdaCanary",
    plural = "phlambdacanaries",
    namespaced,
    status = "phLambdaCanaryStatus",
    printcolumn = r#"{"name":"Function", "type":"string", "jsonPath":".spec.functionName"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Traffic", "type":"integer", "jsonPath":".status.trafficPercent"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#,
    shortname = "pglc"
)]
#[serde(rename_all = "camelCase")]
pub struct phLambdaCanarySpec {
    /// The serverless function this rollout targets. Unique key of the
    /// canary; also used as the resource's metadata.name.
    pub function_name: String,
    /// The function version under evaluation.
    pub new_version: String,
    /// The version to fall back to when the rollout is aborted.
    pub old_version: String,
    /// The promotion/rollback policy applied by the reconciliation loop.
    #[serde(default)]
    pub policy: CanaryPolicy,
}

/// Thresholds driving the per-tick canary verdict.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CanaryPolicy {
    /// Percentage points added to the canary's traffic share on each
    /// successful evaluation. Bounds: 0..=100.
    pub step: u8,
    /// Error-rate ceiling (errors / requests). Reaching it triggers a
    /// rollback. Bounds: 0.0..=1.0.
    pub threshold: f64,
    /// Seconds between metric evaluations of the same canary.
    pub cooldown: u64,
}

impl Default for CanaryPolicy {
    fn default() -> Self {
        Self {
            step: 10,
            threshold: 0.05,
            cooldown: 60,
        }
    }
}

impl CanaryPolicy {
    /// Bounds check applied at the management-API boundary before any
    /// resource is created or updated.
    pub fn validate(&self) -> Result<(), String> {
        if self.step > 100 {
            return Err(format!("policy.step must be within 0..=100, got {}", self.step));
        }
        if !(0.0..=1.0).contains(&self.threshold) || self.threshold.is_nan() {
            return Err(format!(
                "policy.threshold must be within 0.0..=1.0, got {}",
                self.threshold
            ));
        }
        Ok(())
    }
}

/// Lifecycle of one rollout. PROMOTED and ROLLED_BACK are terminal; the
/// reconciler never leaves them.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CanaryPhase {
    /// Canary alias points at the new version; metrics are being evaluated.
    Pending,
    /// The policy cleared the canary; it will be promoted on the next tick.
    Running,
    /// The release alias points at the new version.
    Promoted,
    /// The release alias was restored to the stable version.
    RolledBack,
}

impl CanaryPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CanaryPhase::Promoted | CanaryPhase::RolledBack)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct phLambdaCanaryStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<CanaryPhase>,
    /// Cumulative traffic share granted to the canary, clamped to 100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traffic_percent: Option<u8>,
    /// Release-alias target observed when the rollout started. Used as the
    /// restore point if the live alias cannot be read during rollback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stable_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_evaluation_time: Option<String>, // Using String to align with Kubernetes API conventions for timestamps
    /// Human-readable description of the last action taken.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl phLambdaCanary {
    /// Current phase, if the controller has written one yet.
    pub fn phase(&self) -> Option<CanaryPhase> {
        self.status.as_ref().and_then(|s| s.phase)
    }

    pub fn traffic_percent(&self) -> u8 {
        self.status
            .as_ref()
            .and_then(|s| s.traffic_percent)
            .unwrap_or(0)
    }
}

// --- Tests ---

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_values_use_screaming_snake_case_on_the_wire() {
        assert_eq!(
            serde_json::to_string(&CanaryPhase::Pending).unwrap(),
            "\"PENDING\""
        );
        assert_eq!(
            serde_json::to_string(&CanaryPhase::RolledBack).unwrap(),
            "\"ROLLED_BACK\""
        );
        let parsed: CanaryPhase = serde_json::from_str("\"PROMOTED\"").unwrap();
        assert_eq!(parsed, CanaryPhase::Promoted);
    }

    #[test]
    fn spec_fields_are_camel_case_on_the_wire() {
        let spec = phLambdaCanarySpec {
            function_name: "orders".to_string(),
            new_version: "4".to_string(),
            old_version: "3".to_string(),
            policy: CanaryPolicy::default(),
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["functionName"], "orders");
        assert_eq!(json["newVersion"], "4");
        assert_eq!(json["oldVersion"], "3");
        assert_eq!(json["policy"]["step"], 10);
    }

    #[test]
    fn policy_validation_rejects_out_of_range_values() {
        let mut policy = CanaryPolicy::default();
        assert!(policy.validate().is_ok());

        policy.step = 101;
        assert!(policy.validate().is_err());

        policy.step = 100;
        policy.threshold = 1.5;
        assert!(policy.validate().is_err());

        policy.threshold = 0.0;
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn terminal_phases_are_flagged() {
        assert!(CanaryPhase::Promoted.is_terminal());
        assert!(CanaryPhase::RolledBack.is_terminal());
        assert!(!CanaryPhase::Pending.is_terminal());
        assert!(!CanaryPhase::Running.is_terminal());
    }
}
