// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the Service controller.
//!
//! Every reconciliation receives an `Arc<Context>` that contains:
//! - the resource store used to read and write Kubernetes objects
//! - the DNS provider factory
//! - the restart policy and requeue interval chosen on the command line
//!
//! The resource store is a trait so the reconciliation pipeline can run against
//! an in-memory store in tests. [`KubeResources`] is the kube-rs implementation.

use crate::constants::FIELD_MANAGER;
use crate::crd::Tunnel;
use crate::dns::DnsProviderFactory;
use crate::errors::Result;
use crate::reconcilers::aggregate::RestartPolicy;
use crate::reconcilers::pagination::{list_matching, scoped_api};
use crate::selector::TunnelSelector;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Shared context passed to the Service controller.
#[derive(Clone)]
pub struct Context {
    /// Reads and writes of Kubernetes objects
    pub resources: Arc<dyn TunnelResources>,

    /// Source of per-tunnel DNS providers
    pub dns: Arc<dyn DnsProviderFactory>,

    /// When the cloudflared Deployment is re-stamped
    pub restart_policy: RestartPolicy,

    /// Requeue interval after a successful reconciliation
    pub requeue_after: Duration,
}

/// Kubernetes operations needed to reconcile a Service.
///
/// List operations return objects in API server order; the reconciler relies on
/// that order when several tunnels match a selector.
#[async_trait::async_trait]
pub trait TunnelResources: Send + Sync {
    /// `Tunnel`s matching `selector`.
    async fn list_tunnels(&self, selector: &TunnelSelector) -> Result<Vec<Tunnel>>;

    /// `ConfigMap`s matching `selector`.
    async fn list_config_maps(&self, selector: &TunnelSelector) -> Result<Vec<ConfigMap>>;

    /// Services matching `selector`.
    async fn list_services(&self, selector: &TunnelSelector) -> Result<Vec<Service>>;

    /// Set the finalizer list of `service` with a merge patch.
    async fn patch_service_finalizers(
        &self,
        service: &Service,
        finalizers: Vec<String>,
    ) -> Result<Service>;

    /// Merge `labels` into the labels of `service`.
    async fn patch_service_labels(
        &self,
        service: &Service,
        labels: &BTreeMap<String, String>,
    ) -> Result<Service>;

    /// Replace a `ConfigMap`. Fails with a conflict when its `resourceVersion` is stale.
    async fn replace_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap>;

    /// The Deployment `namespace/name`, if it exists.
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>>;

    /// Replace a Deployment.
    async fn replace_deployment(&self, deployment: &Deployment) -> Result<Deployment>;
}

/// [`TunnelResources`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeResources {
    client: Client,
}

impl KubeResources {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn patch_params() -> PatchParams {
        PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }

    fn services(&self, service: &Service) -> Api<Service> {
        Api::namespaced(
            self.client.clone(),
            &service.namespace().unwrap_or_default(),
        )
    }
}

#[async_trait::async_trait]
impl TunnelResources for KubeResources {
    async fn list_tunnels(&self, selector: &TunnelSelector) -> Result<Vec<Tunnel>> {
        let api: Api<Tunnel> = scoped_api(&self.client, selector);
        Ok(list_matching(&api, selector).await?)
    }

    async fn list_config_maps(&self, selector: &TunnelSelector) -> Result<Vec<ConfigMap>> {
        let api: Api<ConfigMap> = scoped_api(&self.client, selector);
        Ok(list_matching(&api, selector).await?)
    }

    async fn list_services(&self, selector: &TunnelSelector) -> Result<Vec<Service>> {
        let api: Api<Service> = scoped_api(&self.client, selector);
        Ok(list_matching(&api, selector).await?)
    }

    async fn patch_service_finalizers(
        &self,
        service: &Service,
        finalizers: Vec<String>,
    ) -> Result<Service> {
        let patch = json!({ "metadata": { "finalizers": finalizers } });
        Ok(self
            .services(service)
            .patch(
                &service.name_any(),
                &Self::patch_params(),
                &Patch::Merge(&patch),
            )
            .await?)
    }

    async fn patch_service_labels(
        &self,
        service: &Service,
        labels: &BTreeMap<String, String>,
    ) -> Result<Service> {
        let patch = json!({ "metadata": { "labels": labels } });
        Ok(self
            .services(service)
            .patch(
                &service.name_any(),
                &Self::patch_params(),
                &Patch::Merge(&patch),
            )
            .await?)
    }

    async fn replace_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap> {
        let api: Api<ConfigMap> = Api::namespaced(
            self.client.clone(),
            &config_map.namespace().unwrap_or_default(),
        );
        debug!(
            configmap = %config_map.name_any(),
            resource_version = ?config_map.resource_version(),
            "Replacing ConfigMap"
        );
        Ok(api
            .replace(&config_map.name_any(), &Self::post_params(), config_map)
            .await?)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn replace_deployment(&self, deployment: &Deployment) -> Result<Deployment> {
        let api: Api<Deployment> = Api::namespaced(
            self.client.clone(),
            &deployment.namespace().unwrap_or_default(),
        );
        Ok(api
            .replace(&deployment.name_any(), &Self::post_params(), deployment)
            .await?)
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
