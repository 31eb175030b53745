/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/api.rs
*
* This file implements the HTTP management API of the operator. It is the
* only write path into the canary resource set besides the engine's status
* updates: operators create, inspect, update, and delete rollouts here.
*
* Architecture:
* - Built on warp filters over a shared `ApiContext` holding the resource
*   store, the compute client, and the token verifier. Handlers never touch
*   a concrete client type.
* - Every request is authorized before any collaborator is called: reads
*   need the viewer or operator role, mutations need operator. Validation
*   also happens before the first store call, so a malformed request never
*   mutates anything.
* - Requests and responses are typed serde structs with camelCase wire
*   names; errors map onto the taxonomy (validation and missing resources
*   are 400, failed auth is 401, platform faults are 500).
* - Creation fills in what the caller omitted: a missing newVersion is
*   published from $LATEST's code hash, a missing oldVersion is the current
*   release-alias target. Deletion undoes the rollout's side effects before
*   the resource goes away.
*
* SPDX-License-Identifier: Apache-2.0
*/

use std::convert::Infallible;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::auth::{AuthVerifier, ROLE_OPERATOR, ROLE_VIEWER};
use crate::clients::kubernetes::CanaryStore;
use crate::clients::lambda::LambdaApi;
use crate::config::CANARY_ALIAS;
use crate::crds::{phLambdaCanary, phLambdaCanarySpec, phLambdaCanaryStatus, CanaryPhase, CanaryPolicy};
use crate::error::{Error, Result};

/// Collaborators shared by every request handler.
pub struct ApiContext {
    pub store: Arc<dyn CanaryStore>,
    pub lambda: Arc<dyn LambdaApi>,
    pub auth: AuthVerifier,
}

// --- Wire types ---

/// Body of POST /canary and PUT /canary/{name}. Everything except the
/// function name (required on create, forbidden to change on update) is
/// optional and filled in from the platform or the existing spec.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CanaryRequest {
    pub function_name: Option<String>,
    pub new_version: Option<String>,
    pub old_version: Option<String>,
    pub policy: Option<CanaryPolicy>,
}

/// Status representation returned by every read endpoint.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CanaryView {
    function_name: String,
    new_version: String,
    old_version: String,
    policy: CanaryPolicy,
    phase: Option<CanaryPhase>,
    traffic_percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl From<&phLambdaCanary> for CanaryView {
    fn from(canary: &phLambdaCanary) -> Self {
        Self {
            function_name: canary.spec.function_name.clone(),
            new_version: canary.spec.new_version.clone(),
            old_version: canary.spec.old_version.clone(),
            policy: canary.spec.policy.clone(),
            phase: canary.phase(),
            traffic_percent: canary.traffic_percent(),
            message: canary.status.as_ref().and_then(|s| s.message.clone()),
        }
    }
}

// --- Routing ---

fn with_context(
    ctx: Arc<ApiContext>,
) -> impl Filter<Extract = (Arc<ApiContext>,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

fn auth_header() -> impl Filter<Extract = (Option<String>,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
}

/// Assembles the full management-API route tree.
pub fn routes(
    ctx: Arc<ApiContext>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let health = warp::path("health_check")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::json(&json!({ "status": "OK" })));

    // "/canary/all" must be matched before the name capture.
    let get_all = warp::path!("canary" / "all")
        .and(warp::get())
        .and(auth_header())
        .and(with_context(ctx.clone()))
        .and_then(handle_get_all);

    let get_one = warp::path!("canary" / String)
        .and(warp::get())
        .and(auth_header())
        .and(with_context(ctx.clone()))
        .and_then(handle_get_one);

    let create = warp::path!("canary")
        .and(warp::post())
        .and(auth_header())
        .and(warp::body::json())
        .and(with_context(ctx.clone()))
        .and_then(handle_create);

    let update = warp::path!("canary" / String)
        .and(warp::put())
        .and(auth_header())
        .and(warp::body::json())
        .and(with_context(ctx.clone()))
        .and_then(handle_update);

    let delete = warp::path!("canary" / String)
        .and(warp::delete())
        .and(auth_header())
        .and(with_context(ctx.clone()))
        .and_then(handle_delete);

    // Administrative ad-hoc invocation; never on the reconciliation path.
    let invoke = warp::path!("canary" / String / "invoke")
        .and(warp::post())
        .and(auth_header())
        .and(warp::body::json())
        .and(with_context(ctx))
        .and_then(handle_invoke);

    health
        .or(get_all)
        .or(invoke)
        .or(get_one)
        .or(create)
        .or(update)
        .or(delete)
}

/// Runs the management API server until the process shuts down.
pub async fn run_api_server(ctx: Arc<ApiContext>, port: u16) {
    info!(port, "Starting management API server");
    warp::serve(routes(ctx)).run(([0, 0, 0, 0], port)).await;
}

// --- Handlers ---

type JsonReply = warp::reply::WithStatus<warp::reply::Json>;

fn json_reply<T: Serialize>(code: StatusCode, body: &T) -> JsonReply {
    warp::reply::with_status(warp::reply::json(body), code)
}

fn error_reply(err: Error) -> JsonReply {
    let code = match &err {
        Error::NotFound { .. } | Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    json_reply(code, &json!({ "error": err.to_string() }))
}

async fn handle_get_all(
    auth: Option<String>,
    ctx: Arc<ApiContext>,
) -> std::result::Result<JsonReply, Rejection> {
    if let Err(err) = ctx.auth.authorize(auth.as_deref(), &[ROLE_VIEWER, ROLE_OPERATOR]) {
        return Ok(error_reply(err));
    }
    match ctx.store.list_canaries().await {
        Ok(canaries) => {
            let views: Vec<CanaryView> = canaries.iter().map(CanaryView::from).collect();
            Ok(json_reply(StatusCode::OK, &views))
        }
        Err(err) => Ok(error_reply(err)),
    }
}

async fn handle_get_one(
    name: String,
    auth: Option<String>,
    ctx: Arc<ApiContext>,
) -> std::result::Result<JsonReply, Rejection> {
    if let Err(err) = ctx.auth.authorize(auth.as_deref(), &[ROLE_VIEWER, ROLE_OPERATOR]) {
        return Ok(error_reply(err));
    }
    match ctx.store.get_canary(&name).await {
        Ok(canary) => Ok(json_reply(StatusCode::OK, &CanaryView::from(&canary))),
        Err(err) => Ok(error_reply(err)),
    }
}

async fn handle_create(
    auth: Option<String>,
    body: CanaryRequest,
    ctx: Arc<ApiContext>,
) -> std::result::Result<JsonReply, Rejection> {
    if let Err(err) = ctx.auth.authorize(auth.as_deref(), &[ROLE_OPERATOR]) {
        return Ok(error_reply(err));
    }
    match create_canary(&ctx, body).await {
        Ok(canary) => Ok(json_reply(StatusCode::CREATED, &CanaryView::from(&canary))),
        Err(err) => Ok(error_reply(err)),
    }
}

async fn handle_update(
    name: String,
    auth: Option<String>,
    body: CanaryRequest,
    ctx: Arc<ApiContext>,
) -> std::result::Result<JsonReply, Rejection> {
    if let Err(err) = ctx.auth.authorize(auth.as_deref(), &[ROLE_OPERATOR]) {
        return Ok(error_reply(err));
    }
    match update_canary(&ctx, &name, body).await {
        Ok(canary) => Ok(json_reply(StatusCode::OK, &CanaryView::from(&canary))),
        Err(err) => Ok(error_reply(err)),
    }
}

async fn handle_delete(
    name: String,
    auth: Option<String>,
    ctx: Arc<ApiContext>,
) -> std::result::Result<JsonReply, Rejection> {
    if let Err(err) = ctx.auth.authorize(auth.as_deref(), &[ROLE_OPERATOR]) {
        return Ok(error_reply(err));
    }
    match delete_canary(&ctx, &name).await {
        Ok(()) => Ok(json_reply(StatusCode::OK, &json!({ "deleted": name }))),
        Err(err) => Ok(error_reply(err)),
    }
}

async fn handle_invoke(
    name: String,
    auth: Option<String>,
    payload: serde_json::Value,
    ctx: Arc<ApiContext>,
) -> std::result::Result<JsonReply, Rejection> {
    if let Err(err) = ctx.auth.authorize(auth.as_deref(), &[ROLE_OPERATOR]) {
        return Ok(error_reply(err));
    }
    match ctx.lambda.invoke(&name, payload).await {
        Ok(invocation) => Ok(json_reply(StatusCode::OK, &invocation)),
        Err(err) => Ok(error_reply(err)),
    }
}

// --- Operations ---

/// Validates and materializes a creation request. Validation failures are
/// rejected before any store call is made.
async fn create_canary(ctx: &ApiContext, body: CanaryRequest) -> Result<phLambdaCanary> {
    let function_name = body
        .function_name
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::Validation("functionName is required".to_string()))?;

    let policy = body.policy.unwrap_or_default();
    policy.validate().map_err(Error::Validation)?;

    // An omitted newVersion means "roll out what is in $LATEST": pin its
    // code hash into a fresh published version.
    let new_version = match body.new_version {
        Some(version) => version,
        None => {
            let sha = ctx.lambda.get_code_sha256(&function_name, "$LATEST").await?;
            ctx.lambda.publish_version(&function_name, &sha).await?
        }
    };

    let old_version = match body.old_version {
        Some(version) => version,
        None => ctx.lambda.get_stable_version(&function_name).await?,
    };

    ctx.lambda.create_health_check(&function_name).await?;

    let spec = phLambdaCanarySpec {
        function_name: function_name.clone(),
        new_version,
        old_version,
        policy,
    };
    let canary = ctx.store.create_canary(spec).await?;
    info!(function = %function_name, "Canary created");
    Ok(canary)
}

/// Merges a partial request over the existing spec and resets the status so
/// the engine starts a fresh rollout from the merged spec.
async fn update_canary(ctx: &ApiContext, name: &str, body: CanaryRequest) -> Result<phLambdaCanary> {
    let existing = ctx.store.get_canary(name).await?;

    if let Some(requested) = body.function_name.as_deref() {
        if requested != name {
            return Err(Error::Validation(
                "functionName cannot be changed by an update".to_string(),
            ));
        }
    }

    let merged = phLambdaCanarySpec {
        function_name: name.to_string(),
        new_version: body.new_version.unwrap_or(existing.spec.new_version),
        old_version: body.old_version.unwrap_or(existing.spec.old_version),
        policy: body.policy.unwrap_or(existing.spec.policy),
    };
    merged.policy.validate().map_err(Error::Validation)?;

    let canary = ctx.store.replace_spec(name, merged).await?;
    // A replaced spec is a new rollout; wiping the status sends the engine
    // back through initialization on its next tick.
    ctx.store
        .update_status(name, phLambdaCanaryStatus::default())
        .await?;
    info!(function = name, "Canary spec replaced; rollout restarted");
    Ok(canary)
}

/// Deletes a canary and undoes its platform side effects: the canary alias
/// is parked on the stable version, the health check is removed, and an
/// unpromoted canary version is deleted.
async fn delete_canary(ctx: &ApiContext, name: &str) -> Result<()> {
    let canary = ctx.store.get_canary(name).await?;

    let stable = canary
        .status
        .as_ref()
        .and_then(|s| s.stable_version.clone())
        .unwrap_or_else(|| canary.spec.old_version.clone());

    if let Err(err) = ctx.lambda.update_alias(name, CANARY_ALIAS, &stable).await {
        if !err.is_not_found() {
            return Err(err);
        }
    }
    ctx.lambda.delete_health_check(name).await?;

    // A promoted rollout's version is live behind the release alias and
    // stays; anything else was only ever an experiment.
    if canary.phase() != Some(CanaryPhase::Promoted) {
        if let Err(err) = ctx
            .lambda
            .delete_version(name, &canary.spec.new_version)
            .await
        {
            if !err.is_not_found() {
                return Err(err);
            }
        }
    }

    ctx.store.delete_canary(name).await?;
    info!(function = name, "Canary deleted");
    Ok(())
}

// --- Tests ---

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::Value;

    use crate::clients::lambda::Invocation;

    // --- In-memory collaborators ---

    #[derive(Default)]
    struct MockStore {
        canaries: Mutex<HashMap<String, phLambdaCanary>>,
        create_calls: AtomicU32,
    }

    impl MockStore {
        fn with_canary(canary: phLambdaCanary) -> Self {
            let store = Self::default();
            store
                .canaries
                .lock()
                .unwrap()
                .insert(canary.spec.function_name.clone(), canary);
            store
        }
    }

    #[async_trait]
    impl CanaryStore for MockStore {
        async fn list_canaries(&self) -> Result<Vec<phLambdaCanary>> {
            Ok(self.canaries.lock().unwrap().values().cloned().collect())
        }

        async fn get_canary(&self, name: &str) -> Result<phLambdaCanary> {
            self.canaries
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .ok_or_else(|| Error::not_found("canary", name))
        }

        async fn create_canary(&self, spec: phLambdaCanarySpec) -> Result<phLambdaCanary> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            let name = spec.function_name.clone();
            let canary = phLambdaCanary::new(&name, spec);
            self.canaries.lock().unwrap().insert(name, canary.clone());
            Ok(canary)
        }

        async fn replace_spec(&self, name: &str, spec: phLambdaCanarySpec) -> Result<phLambdaCanary> {
            let mut canaries = self.canaries.lock().unwrap();
            let canary = canaries
                .get_mut(name)
                .ok_or_else(|| Error::not_found("canary", name))?;
            canary.spec = spec;
            Ok(canary.clone())
        }

        async fn delete_canary(&self, name: &str) -> Result<()> {
            self.canaries
                .lock()
                .unwrap()
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| Error::not_found("canary", name))
        }

        async fn update_status(&self, name: &str, status: phLambdaCanaryStatus) -> Result<()> {
            if let Some(canary) = self.canaries.lock().unwrap().get_mut(name) {
                canary.status = Some(status);
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockLambda {
        alias_updates: Mutex<Vec<(String, String, String)>>,
        deleted_versions: Mutex<Vec<String>>,
        deleted_health_checks: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LambdaApi for MockLambda {
        async fn get_stable_version(&self, _function_name: &str) -> Result<String> {
            Ok("3".to_string())
        }

        async fn update_alias(
            &self,
            function_name: &str,
            alias_name: &str,
            version: &str,
        ) -> Result<()> {
            self.alias_updates.lock().unwrap().push((
                function_name.to_string(),
                alias_name.to_string(),
                version.to_string(),
            ));
            Ok(())
        }

        async fn is_function_available(&self, _function_name: &str, _version: &str) -> Result<bool> {
            Ok(true)
        }

        async fn invoke(&self, _function_name: &str, _payload: Value) -> Result<Invocation> {
            Ok(Invocation {
                status_code: 200,
                payload: Value::Null,
            })
        }

        async fn get_code_sha256(&self, _function_name: &str, _qualifier: &str) -> Result<String> {
            Ok("abc123".to_string())
        }

        async fn publish_version(&self, _function_name: &str, _code_sha256: &str) -> Result<String> {
            Ok("5".to_string())
        }

        async fn delete_version(&self, function_name: &str, _version: &str) -> Result<()> {
            self.deleted_versions
                .lock()
                .unwrap()
                .push(function_name.to_string());
            Ok(())
        }

        async fn create_health_check(&self, _function_name: &str) -> Result<()> {
            Ok(())
        }

        async fn delete_health_check(&self, function_name: &str) -> Result<()> {
            self.deleted_health_checks
                .lock()
                .unwrap()
                .push(function_name.to_string());
            Ok(())
        }
    }

    // --- Fixtures ---

    fn open_context(store: Arc<MockStore>, lambda: Arc<MockLambda>) -> Arc<ApiContext> {
        Arc::new(ApiContext {
            store,
            lambda,
            auth: AuthVerifier::new(None),
        })
    }

    fn pending_canary(name: &str) -> phLambdaCanary {
        let spec = phLambdaCanarySpec {
            function_name: name.to_string(),
            new_version: "4".to_string(),
            old_version: "3".to_string(),
            policy: CanaryPolicy::default(),
        };
        let mut canary = phLambdaCanary::new(name, spec);
        canary.status = Some(phLambdaCanaryStatus {
            phase: Some(CanaryPhase::Pending),
            traffic_percent: Some(0),
            stable_version: Some("3".to_string()),
            ..Default::default()
        });
        canary
    }

    // --- Routes ---

    #[tokio::test]
    async fn post_without_function_name_is_rejected_before_the_store() {
        let store = Arc::new(MockStore::default());
        let lambda = Arc::new(MockLambda::default());
        let routes = routes(open_context(store.clone(), lambda));

        let response = warp::test::request()
            .method("POST")
            .path("/canary")
            .json(&json!({ "newVersion": "4" }))
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn post_with_invalid_policy_is_rejected_before_the_store() {
        let store = Arc::new(MockStore::default());
        let lambda = Arc::new(MockLambda::default());
        let routes = routes(open_context(store.clone(), lambda));

        let response = warp::test::request()
            .method("POST")
            .path("/canary")
            .json(&json!({
                "functionName": "f1",
                "newVersion": "4",
                "policy": { "step": 10, "threshold": 1.5, "cooldown": 60 }
            }))
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn post_creates_a_canary_and_fills_in_omitted_versions() {
        let store = Arc::new(MockStore::default());
        let lambda = Arc::new(MockLambda::default());
        let routes = routes(open_context(store.clone(), lambda));

        let response = warp::test::request()
            .method("POST")
            .path("/canary")
            .json(&json!({ "functionName": "f1" }))
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::CREATED);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        // newVersion published from $LATEST, oldVersion from the release alias.
        assert_eq!(body["functionName"], "f1");
        assert_eq!(body["newVersion"], "5");
        assert_eq!(body["oldVersion"], "3");
        assert_eq!(store.create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn get_returns_the_canary_status() {
        let store = Arc::new(MockStore::with_canary(pending_canary("f1")));
        let routes = routes(open_context(store, Arc::new(MockLambda::default())));

        let response = warp::test::request()
            .method("GET")
            .path("/canary/f1")
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["phase"], "PENDING");
        assert_eq!(body["trafficPercent"], 0);
    }

    #[tokio::test]
    async fn get_unknown_canary_is_400() {
        let store = Arc::new(MockStore::default());
        let routes = routes(open_context(store, Arc::new(MockLambda::default())));

        let response = warp::test::request()
            .method("GET")
            .path("/canary/ghost")
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_all_lists_every_canary() {
        let store = Arc::new(MockStore::with_canary(pending_canary("f1")));
        store
            .canaries
            .lock()
            .unwrap()
            .insert("f2".to_string(), pending_canary("f2"));
        let routes = routes(open_context(store, Arc::new(MockLambda::default())));

        let response = warp::test::request()
            .method("GET")
            .path("/canary/all")
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn put_merges_the_spec_and_restarts_the_rollout() {
        let store = Arc::new(MockStore::with_canary(pending_canary("f1")));
        let routes = routes(open_context(store.clone(), Arc::new(MockLambda::default())));

        let response = warp::test::request()
            .method("PUT")
            .path("/canary/f1")
            .json(&json!({ "newVersion": "6" }))
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let stored = store.canaries.lock().unwrap().get("f1").cloned().unwrap();
        assert_eq!(stored.spec.new_version, "6");
        assert_eq!(stored.spec.old_version, "3", "unset fields keep their value");
        assert_eq!(stored.phase(), None, "status reset for a fresh rollout");
    }

    #[tokio::test]
    async fn put_on_a_missing_canary_is_400() {
        let store = Arc::new(MockStore::default());
        let routes = routes(open_context(store, Arc::new(MockLambda::default())));

        let response = warp::test::request()
            .method("PUT")
            .path("/canary/ghost")
            .json(&json!({ "newVersion": "6" }))
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_undoes_side_effects_and_removes_the_resource() {
        let store = Arc::new(MockStore::with_canary(pending_canary("f1")));
        let lambda = Arc::new(MockLambda::default());
        let routes = routes(open_context(store.clone(), lambda.clone()));

        let response = warp::test::request()
            .method("DELETE")
            .path("/canary/f1")
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(store.canaries.lock().unwrap().is_empty());
        // Canary alias parked on stable, health check gone, and the
        // unpromoted version deleted.
        assert_eq!(
            lambda.alias_updates.lock().unwrap().as_slice(),
            &[("f1".to_string(), "canary".to_string(), "3".to_string())]
        );
        assert_eq!(lambda.deleted_health_checks.lock().unwrap().as_slice(), &["f1".to_string()]);
        assert_eq!(lambda.deleted_versions.lock().unwrap().as_slice(), &["f1".to_string()]);
    }

    #[tokio::test]
    async fn delete_keeps_the_version_of_a_promoted_rollout() {
        let mut canary = pending_canary("f1");
        canary.status.as_mut().unwrap().phase = Some(CanaryPhase::Promoted);
        let store = Arc::new(MockStore::with_canary(canary));
        let lambda = Arc::new(MockLambda::default());
        let routes = routes(open_context(store, lambda.clone()));

        let response = warp::test::request()
            .method("DELETE")
            .path("/canary/f1")
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(lambda.deleted_versions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invoke_returns_the_platform_response() {
        let store = Arc::new(MockStore::default());
        let routes = routes(open_context(store, Arc::new(MockLambda::default())));

        let response = warp::test::request()
            .method("POST")
            .path("/canary/f1/invoke")
            .json(&json!({ "ping": true }))
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["statusCode"], 200);
    }

    #[tokio::test]
    async fn health_check_needs_no_token() {
        let secured = Arc::new(ApiContext {
            store: Arc::new(MockStore::default()),
            lambda: Arc::new(MockLambda::default()),
            auth: AuthVerifier::new(Some("secret".to_string())),
        });
        let routes = routes(secured);

        let response = warp::test::request()
            .method("GET")
            .path("/health_check")
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["status"], "OK");
    }

    #[tokio::test]
    async fn requests_without_a_token_are_401_when_auth_is_enabled() {
        let secured = Arc::new(ApiContext {
            store: Arc::new(MockStore::with_canary(pending_canary("f1"))),
            lambda: Arc::new(MockLambda::default()),
            auth: AuthVerifier::new(Some("secret".to_string())),
        });
        let routes = routes(secured);

        let read = warp::test::request()
            .method("GET")
            .path("/canary/f1")
            .reply(&routes)
            .await;
        assert_eq!(read.status(), StatusCode::UNAUTHORIZED);

        let mutation = warp::test::request()
            .method("DELETE")
            .path("/canary/f1")
            .reply(&routes)
            .await;
        assert_eq!(mutation.status(), StatusCode::UNAUTHORIZED);
    }
}
