/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/clients/kubernetes.rs
*
* This module is the resource store. Canary rollouts are represented as
* `phLambdaCanary` custom resources; this file owns every interaction with
* the Kubernetes API server, from the startup CRD bootstrap to the status
* patches written on each reconciliation tick.
*
* Architecture:
* - `CanaryStore` is the injection seam. The engine and the management API
*   consume the trait; tests provide an in-memory store.
* - Resources are keyed by function name: the resource's metadata.name IS the
*   function name, which keeps the unique-key invariant enforceable by the
*   API server itself.
* - Status writes go through the status subresource with server-side apply,
*   using a fixed field manager. The operator is the only status writer.
* - `ensure_crd` performs the idempotent create-or-tolerate-409 bootstrap so
*   a fresh cluster works without a separate install step.
*
* SPDX-License-Identifier: Apache-2.0
*/

use async_trait::async_trait;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{
    api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams},
    client::Client,
    CustomResourceExt,
};
use serde_json::json;
use tracing::info;

use crate::config::FIELD_MANAGER;
use crate::crds::{phLambdaCanary, phLambdaCanarySpec, phLambdaCanaryStatus};
use crate::error::{Error, Result};

// --- Trait ---

/// Persistence operations for canary resources.
#[async_trait]
pub trait CanaryStore: Send + Sync {
    async fn list_canaries(&self) -> Result<Vec<phLambdaCanary>>;

    /// Fetches one canary; `Error::NotFound` when it does not exist.
    async fn get_canary(&self, name: &str) -> Result<phLambdaCanary>;

    async fn create_canary(&self, spec: phLambdaCanarySpec) -> Result<phLambdaCanary>;

    /// Replaces the spec of an existing canary. The caller is responsible
    /// for resetting the status afterwards; a new spec is a new rollout.
    async fn replace_spec(&self, name: &str, spec: phLambdaCanarySpec) -> Result<phLambdaCanary>;

    async fn delete_canary(&self, name: &str) -> Result<()>;

    /// Writes the status subresource.
    async fn update_status(&self, name: &str, status: phLambdaCanaryStatus) -> Result<()>;
}

// --- Kubernetes-backed implementation ---

pub struct KubeCanaryStore {
    api: Api<phLambdaCanary>,
}

impl KubeCanaryStore {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

fn map_kube_err(err: kube::Error, name: &str) -> Error {
    match err {
        kube::Error::Api(ref resp) if resp.code == 404 => {
            Error::not_found("canary", name.to_string())
        }
        kube::Error::Api(ref resp) if resp.code == 409 => {
            Error::Validation(format!("canary '{}' already exists", name))
        }
        other => Error::Kube(other),
    }
}

#[async_trait]
impl CanaryStore for KubeCanaryStore {
    async fn list_canaries(&self) -> Result<Vec<phLambdaCanary>> {
        let listing = self.api.list(&ListParams::default()).await?;
        Ok(listing.items)
    }

    async fn get_canary(&self, name: &str) -> Result<phLambdaCanary> {
        self.api
            .get(name)
            .await
            .map_err(|e| map_kube_err(e, name))
    }

    async fn create_canary(&self, spec: phLambdaCanarySpec) -> Result<phLambdaCanary> {
        let name = spec.function_name.clone();
        let canary = phLambdaCanary::new(&name, spec);
        self.api
            .create(&PostParams::default(), &canary)
            .await
            .map_err(|e| map_kube_err(e, &name))
    }

    async fn replace_spec(&self, name: &str, spec: phLambdaCanarySpec) -> Result<phLambdaCanary> {
        let patch = json!({ "spec": spec });
        self.api
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_kube_err(e, name))
    }

    async fn delete_canary(&self, name: &str) -> Result<()> {
        self.api
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| map_kube_err(e, name))?;
        Ok(())
    }

    async fn update_status(&self, name: &str, status: phLambdaCanaryStatus) -> Result<()> {
        let patch = Patch::Apply(json!({
            "apiVersion": "ph.io/v1alpha1",
            "kind": "phLambdaCanary",
            "status": status,
        }));
        self.api
            .patch_status(name, &PatchParams::apply(FIELD_MANAGER).force(), &patch)
            .await
            .map_err(|e| map_kube_err(e, name))?;
        Ok(())
    }
}

// --- CRD bootstrap ---

/// Installs the phLambdaCanary CRD if the cluster does not have it yet.
/// A 409 from the API server means another replica (or a previous run) got
/// there first, which is fine.
pub async fn ensure_crd(client: Client) -> Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client);
    let crd = phLambdaCanary::crd();
    match crds.create(&PostParams::default(), &crd).await {
        Ok(_) => {
            info!("phLambdaCanary custom resource definition created");
            Ok(())
        }
        Err(kube::Error::Api(resp)) if resp.code == 409 => {
            info!("phLambdaCanary custom resource definition already exists");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

// --- Tests ---
