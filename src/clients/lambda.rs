/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/clients/lambda.rs
*
* This module is the compute-platform adapter. The reconciliation engine and
* the management API only ever talk to the `LambdaApi` trait; `LambdaClient`
* implements it over the Lambda-compatible REST API exposed by
* `LAMBDA_ENDPOINT` (a real region endpoint, a LocalStack edge port, or an
* internal gateway).
*
* Architecture:
* - `LambdaApi` is the seam for dependency injection. Tests drive the engine
*   with an in-memory implementation; production wires `LambdaClient`.
* - The adapter speaks the `/2015-03-31/...` resource paths and PascalCase
*   JSON documents of the platform API.
* - HTTP 404 maps to `Error::NotFound`, every other non-success status to
*   `Error::Platform`. Callers decide what either means for the rollout.
* - Request signing is the gateway's concern, not this adapter's.
*
* SPDX-License-Identifier: Apache-2.0
*/

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::STABLE_ALIAS;
use crate::error::{Error, Result};

// --- Trait ---

/// Operations the operator needs from the serverless compute platform.
#[async_trait]
pub trait LambdaApi: Send + Sync {
    /// Version the stable ("release") alias currently points at.
    async fn get_stable_version(&self, function_name: &str) -> Result<String>;

    /// Points `alias_name` on `function_name` at `version`.
    async fn update_alias(&self, function_name: &str, alias_name: &str, version: &str)
        -> Result<()>;

    /// Availability probe for one published version.
    async fn is_function_available(&self, function_name: &str, version: &str) -> Result<bool>;

    /// Ad-hoc invocation; returns the platform status code and the response
    /// payload. Not used on the reconciliation hot path.
    async fn invoke(&self, function_name: &str, payload: Value) -> Result<Invocation>;

    /// Code hash of a published version (or $LATEST).
    async fn get_code_sha256(&self, function_name: &str, qualifier: &str) -> Result<String>;

    /// Publishes a new version pinned to `code_sha256`; returns the version.
    async fn publish_version(&self, function_name: &str, code_sha256: &str) -> Result<String>;

    /// Deletes one published version.
    async fn delete_version(&self, function_name: &str, version: &str) -> Result<()>;

    /// Installs the asynchronous-invoke failure destination used as the
    /// canary's health check.
    async fn create_health_check(&self, function_name: &str) -> Result<()>;

    /// Removes the health check. Absence is not an error.
    async fn delete_health_check(&self, function_name: &str) -> Result<()>;
}

/// Result of an ad-hoc function invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
    pub status_code: u16,
    pub payload: Value,
}

// --- Wire types (PascalCase platform documents) ---

#[derive(Deserialize, Debug)]
struct AliasList {
    #[serde(rename = "Aliases", default)]
    aliases: Vec<AliasConfiguration>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AliasConfiguration {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "FunctionVersion")]
    pub function_version: String,
}

#[derive(Deserialize, Debug)]
struct GetFunctionResponse {
    #[serde(rename = "Configuration")]
    configuration: Option<FunctionConfiguration>,
}

#[derive(Deserialize, Debug, Default)]
pub struct FunctionConfiguration {
    #[serde(rename = "State")]
    pub state: Option<String>,
    #[serde(rename = "LastUpdateStatus")]
    pub last_update_status: Option<String>,
    #[serde(rename = "CodeSha256")]
    pub code_sha256: Option<String>,
}

#[derive(Deserialize, Debug)]
struct PublishVersionResponse {
    #[serde(rename = "Version")]
    version: String,
}

// --- Pure helpers ---

/// Scans an alias listing for the stable alias target.
fn release_version_from(aliases: &[AliasConfiguration]) -> Option<&str> {
    aliases
        .iter()
        .find(|alias| alias.name == STABLE_ALIAS)
        .map(|alias| alias.function_version.as_str())
}

/// A version can take traffic once it is active and its last update did not
/// fail. An in-flight update counts as unavailable.
fn is_available(config: &FunctionConfiguration) -> bool {
    config.state.as_deref() == Some("Active")
        && config.last_update_status.as_deref() == Some("Successful")
}

/// Maps a non-success platform status to the error taxonomy.
fn status_error(status: u16, message: String, kind: &'static str, name: &str) -> Error {
    if status == 404 {
        Error::not_found(kind, name.to_string())
    } else {
        Error::Platform { status, message }
    }
}

// --- HTTP adapter ---

/// A client for the Lambda-compatible REST API.
pub struct LambdaClient {
    client: reqwest::Client,
    endpoint: String,
}

impl LambdaClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/2015-03-31{}", self.endpoint, path)
    }

    /// Rejects non-success responses, classifying them for the caller.
    async fn checked(
        &self,
        response: reqwest::Response,
        kind: &'static str,
        name: &str,
    ) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(status_error(status.as_u16(), message, kind, name))
    }
}

#[async_trait]
impl LambdaApi for LambdaClient {
    async fn get_stable_version(&self, function_name: &str) -> Result<String> {
        let url = self.url(&format!("/functions/{}/aliases", function_name));
        debug!(function = function_name, "Listing aliases");
        let response = self.client.get(&url).send().await?;
        let response = self.checked(response, "function", function_name).await?;
        let listing: AliasList = response.json().await?;
        release_version_from(&listing.aliases)
            .map(str::to_string)
            .ok_or_else(|| Error::not_found("release alias", function_name))
    }

    async fn update_alias(
        &self,
        function_name: &str,
        alias_name: &str,
        version: &str,
    ) -> Result<()> {
        let url = self.url(&format!("/functions/{}/aliases/{}", function_name, alias_name));
        let body = serde_json::json!({ "FunctionVersion": version });
        let response = self.client.put(&url).json(&body).send().await?;
        self.checked(response, "alias", alias_name).await?;
        info!(
            function = function_name,
            alias = alias_name,
            version,
            "Alias updated"
        );
        Ok(())
    }

    async fn is_function_available(&self, function_name: &str, version: &str) -> Result<bool> {
        let url = self.url(&format!("/functions/{}", function_name));
        let response = self
            .client
            .get(&url)
            .query(&[("Qualifier", version)])
            .send()
            .await?;
        let response = self.checked(response, "function version", version).await?;
        let body: GetFunctionResponse = response.json().await?;
        Ok(body
            .configuration
            .map(|config| is_available(&config))
            .unwrap_or(false))
    }

    async fn invoke(&self, function_name: &str, payload: Value) -> Result<Invocation> {
        let url = self.url(&format!("/functions/{}/invocations", function_name));
        let response = self.client.post(&url).json(&payload).send().await?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Err(Error::not_found("function", function_name));
        }
        if status.is_server_error() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Platform {
                status: status.as_u16(),
                message,
            });
        }
        // Function-level errors still produce a payload; hand both back.
        let payload = response.json().await.unwrap_or(Value::Null);
        info!(function = function_name, status = status.as_u16(), "Function invoked");
        Ok(Invocation {
            status_code: status.as_u16(),
            payload,
        })
    }

    async fn get_code_sha256(&self, function_name: &str, qualifier: &str) -> Result<String> {
        let url = self.url(&format!("/functions/{}", function_name));
        let response = self
            .client
            .get(&url)
            .query(&[("Qualifier", qualifier)])
            .send()
            .await?;
        let response = self.checked(response, "function", function_name).await?;
        let body: GetFunctionResponse = response.json().await?;
        body.configuration
            .and_then(|config| config.code_sha256)
            .ok_or_else(|| Error::not_found("code hash", function_name))
    }

    async fn publish_version(&self, function_name: &str, code_sha256: &str) -> Result<String> {
        let url = self.url(&format!("/functions/{}/versions", function_name));
        let body = serde_json::json!({ "CodeSha256": code_sha256 });
        let response = self.client.post(&url).json(&body).send().await?;
        let response = self.checked(response, "function", function_name).await?;
        let published: PublishVersionResponse = response.json().await?;
        info!(
            function = function_name,
            version = %published.version,
            "Version published"
        );
        Ok(published.version)
    }

    async fn delete_version(&self, function_name: &str, version: &str) -> Result<()> {
        let url = self.url(&format!("/functions/{}", function_name));
        let response = self
            .client
            .delete(&url)
            .query(&[("Qualifier", version)])
            .send()
            .await?;
        self.checked(response, "function version", version).await?;
        info!(function = function_name, version, "Version deleted");
        Ok(())
    }

    async fn create_health_check(&self, function_name: &str) -> Result<()> {
        let url = self.url(&format!("/functions/{}/event-invoke-config", function_name));
        let body = serde_json::json!({
            "MaximumRetryAttempts": 3,
            "DestinationConfig": {
                "OnSuccess": { "Destination": function_name },
                "OnFailure": { "Destination": function_name }
            }
        });
        let response = self.client.put(&url).json(&body).send().await?;
        self.checked(response, "function", function_name).await?;
        info!(function = function_name, "Health check created");
        Ok(())
    }

    async fn delete_health_check(&self, function_name: &str) -> Result<()> {
        let url = self.url(&format!("/functions/{}/event-invoke-config", function_name));
        let response = self.client.delete(&url).send().await?;
        match self.checked(response, "health check", function_name).await {
            Ok(_) => {
                info!(function = function_name, "Health check deleted");
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                warn!(function = function_name, "No health check found");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

// --- Tests ---

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_listing_parses_platform_json() {
        let json = r#"
        {
            "Aliases": [
                { "Name": "canary", "FunctionVersion": "4" },
                { "Name": "release", "FunctionVersion": "3" }
            ]
        }
        "#;
        let listing: AliasList = serde_json::from_str(json).unwrap();
        assert_eq!(listing.aliases.len(), 2);
        assert_eq!(release_version_from(&listing.aliases), Some("3"));
    }

    #[test]
    fn missing_release_alias_yields_none() {
        let aliases = vec![AliasConfiguration {
            name: "canary".to_string(),
            function_version: "4".to_string(),
        }];
        assert_eq!(release_version_from(&aliases), None);
    }

    #[test]
    fn availability_requires_active_state_and_clean_update() {
        let healthy = FunctionConfiguration {
            state: Some("Active".to_string()),
            last_update_status: Some("Successful".to_string()),
            code_sha256: None,
        };
        assert!(is_available(&healthy));

        let pending = FunctionConfiguration {
            state: Some("Pending".to_string()),
            last_update_status: Some("Successful".to_string()),
            code_sha256: None,
        };
        assert!(!is_available(&pending));

        let failed_update = FunctionConfiguration {
            state: Some("Active".to_string()),
            last_update_status: Some("Failed".to_string()),
            code_sha256: None,
        };
        assert!(!is_available(&failed_update));

        assert!(!is_available(&FunctionConfiguration::default()));
    }

    #[test]
    fn http_statuses_map_to_the_error_taxonomy() {
        let not_found = status_error(404, String::new(), "function", "orders");
        assert!(not_found.is_not_found());

        let server_fault = status_error(503, "unavailable".to_string(), "function", "orders");
        assert!(server_fault.is_transient());
        assert!(matches!(server_fault, Error::Platform { status: 503, .. }));

        let client_fault = status_error(400, "bad".to_string(), "function", "orders");
        assert!(!client_fault.is_transient());
    }

    #[test]
    fn publish_version_response_parses() {
        let json = r#"{ "Version": "5", "FunctionName": "orders" }"#;
        let parsed: PublishVersionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.version, "5");
    }
}
