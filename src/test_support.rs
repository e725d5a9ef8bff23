// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Fixtures and in-memory fakes shared by the unit tests.
//!
//! [`FakeResources`] behaves like the API server for the calls the reconciler makes:
//! lists keep insertion order, `ConfigMap` replaces are checked against
//! `resourceVersion`, and a Service being deleted disappears once its last
//! finalizer is removed.

use crate::constants::CONFIGMAP_KEY;
use crate::context::TunnelResources;
use crate::crd::{CloudflareDetails, Tunnel, TunnelSpec, TunnelStatus};
use crate::dns::{DnsProvider, DnsProviderFactory};
use crate::errors::Result;
use crate::labels::{
    CONFIG_HOSTNAME_LABEL, CONFIG_SERVICE_LABEL, FINALIZER_TUNNEL_SERVICE, TUNNEL_CR_ANNOTATION,
    TUNNEL_DOMAIN_LABEL, TUNNEL_ID_ANNOTATION, TUNNEL_NAME_ANNOTATION, TUNNEL_NS_ANNOTATION,
};
use crate::selector::TunnelSelector;
use anyhow::anyhow;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{ConfigMap, PodTemplateSpec, Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

pub const TEST_TUNNEL_ID: &str = "6ff42ae2-765d-4adf-8112-31c55c1551ef";

pub fn tcp_port(port: i32) -> ServicePort {
    ServicePort {
        port,
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

pub fn udp_port(port: i32) -> ServicePort {
    ServicePort {
        port,
        protocol: Some("UDP".to_string()),
        ..Default::default()
    }
}

pub fn create_test_service(
    name: &str,
    namespace: &str,
    annotations: BTreeMap<String, String>,
    ports: Vec<ServicePort>,
) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            ports: Some(ports),
            ..Default::default()
        }),
        status: None,
    }
}

/// Labels the tunnel provisioning side puts on a Tunnel and its `ConfigMap`.
pub fn tunnel_labels(name: &str, namespace: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (TUNNEL_CR_ANNOTATION.to_string(), name.to_string()),
        (TUNNEL_NS_ANNOTATION.to_string(), namespace.to_string()),
        (TUNNEL_NAME_ANNOTATION.to_string(), name.to_string()),
        (TUNNEL_ID_ANNOTATION.to_string(), TEST_TUNNEL_ID.to_string()),
    ])
}

pub fn create_test_tunnel(name: &str, namespace: &str, domain: &str) -> Tunnel {
    Tunnel {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(tunnel_labels(name, namespace)),
            ..Default::default()
        },
        spec: TunnelSpec {
            cloudflare: CloudflareDetails {
                domain: domain.to_string(),
                secret: "cloudflare-secrets".to_string(),
                ..Default::default()
            },
            existing_tunnel: None,
            new_tunnel: None,
            size: None,
            image: None,
            no_tls_verify: None,
        },
        status: Some(TunnelStatus {
            tunnel_id: Some(TEST_TUNNEL_ID.to_string()),
            ..Default::default()
        }),
    }
}

pub fn create_test_config_map(name: &str, namespace: &str, document: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(tunnel_labels(name, namespace)),
            resource_version: Some("1".to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            CONFIGMAP_KEY.to_string(),
            document.to_string(),
        )])),
        ..Default::default()
    }
}

pub fn create_test_deployment(name: &str, namespace: &str) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta::default()),
                spec: None,
            },
            ..Default::default()
        }),
        status: None,
    }
}

/// A Service already labelled as a member of `tunnel`.
pub fn create_member_service(
    name: &str,
    namespace: &str,
    tunnel: &Tunnel,
    hostname: &str,
    encoded_service: &str,
    port: ServicePort,
) -> Service {
    let mut service = create_test_service(
        name,
        namespace,
        BTreeMap::from([(TUNNEL_NAME_ANNOTATION.to_string(), tunnel.name_any())]),
        vec![port],
    );
    service.metadata.labels = Some(BTreeMap::from([
        (TUNNEL_DOMAIN_LABEL.to_string(), tunnel.domain().to_string()),
        (CONFIG_HOSTNAME_LABEL.to_string(), hostname.to_string()),
        (CONFIG_SERVICE_LABEL.to_string(), encoded_service.to_string()),
        (
            TUNNEL_NS_ANNOTATION.to_string(),
            tunnel.namespace().unwrap_or_default(),
        ),
        (TUNNEL_CR_ANNOTATION.to_string(), tunnel.name_any()),
    ]));
    service.metadata.finalizers = Some(vec![FINALIZER_TUNNEL_SERVICE.to_string()]);
    service
}

fn same_object(meta: &ObjectMeta, namespace: &str, name: &str) -> bool {
    meta.namespace.as_deref() == Some(namespace) && meta.name.as_deref() == Some(name)
}

/// Objects held by [`FakeResources`] and counters of the writes made to them.
#[derive(Default)]
pub struct FakeState {
    pub tunnels: Vec<Tunnel>,
    pub config_maps: Vec<ConfigMap>,
    pub services: Vec<Service>,
    pub deployments: Vec<Deployment>,
    pub config_map_writes: usize,
    pub deployment_writes: usize,
    pub service_patches: usize,
}

#[derive(Default)]
pub struct FakeResources {
    state: Mutex<FakeState>,
}

impl FakeResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn add_tunnel(&self, tunnel: Tunnel) {
        self.state().tunnels.push(tunnel);
    }

    pub fn add_config_map(&self, config_map: ConfigMap) {
        self.state().config_maps.push(config_map);
    }

    pub fn add_service(&self, service: Service) {
        self.state().services.push(service);
    }

    pub fn add_deployment(&self, deployment: Deployment) {
        self.state().deployments.push(deployment);
    }

    pub fn service(&self, namespace: &str, name: &str) -> Option<Service> {
        self.state()
            .services
            .iter()
            .find(|s| same_object(&s.metadata, namespace, name))
            .cloned()
    }

    pub fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        self.state()
            .config_maps
            .iter()
            .find(|c| same_object(&c.metadata, namespace, name))
            .cloned()
    }

    pub fn config_document(&self, namespace: &str, name: &str) -> Option<String> {
        self.config_map(namespace, name)
            .and_then(|cm| cm.data)
            .and_then(|data| data.get(CONFIGMAP_KEY).cloned())
    }

    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        self.state()
            .deployments
            .iter()
            .find(|d| same_object(&d.metadata, namespace, name))
            .cloned()
    }
}

#[async_trait::async_trait]
impl TunnelResources for FakeResources {
    async fn list_tunnels(&self, selector: &TunnelSelector) -> Result<Vec<Tunnel>> {
        Ok(self
            .state()
            .tunnels
            .iter()
            .filter(|t| selector.matches(t.metadata.namespace.as_deref(), t.labels()))
            .cloned()
            .collect())
    }

    async fn list_config_maps(&self, selector: &TunnelSelector) -> Result<Vec<ConfigMap>> {
        Ok(self
            .state()
            .config_maps
            .iter()
            .filter(|c| selector.matches(c.metadata.namespace.as_deref(), c.labels()))
            .cloned()
            .collect())
    }

    async fn list_services(&self, selector: &TunnelSelector) -> Result<Vec<Service>> {
        Ok(self
            .state()
            .services
            .iter()
            .filter(|s| selector.matches(s.metadata.namespace.as_deref(), s.labels()))
            .cloned()
            .collect())
    }

    async fn patch_service_finalizers(
        &self,
        service: &Service,
        finalizers: Vec<String>,
    ) -> Result<Service> {
        let namespace = service.namespace().unwrap_or_default();
        let name = service.name_any();
        let mut state = self.state();
        state.service_patches += 1;

        let index = state
            .services
            .iter()
            .position(|s| same_object(&s.metadata, &namespace, &name))
            .ok_or_else(|| anyhow!("services \"{name}\" not found"))?;

        let stored = &mut state.services[index];
        stored.metadata.finalizers = Some(finalizers.clone());
        let updated = stored.clone();

        if updated.metadata.deletion_timestamp.is_some() && finalizers.is_empty() {
            state.services.remove(index);
        }

        Ok(updated)
    }

    async fn patch_service_labels(
        &self,
        service: &Service,
        labels: &BTreeMap<String, String>,
    ) -> Result<Service> {
        let namespace = service.namespace().unwrap_or_default();
        let name = service.name_any();
        let mut state = self.state();
        state.service_patches += 1;

        let stored = state
            .services
            .iter_mut()
            .find(|s| same_object(&s.metadata, &namespace, &name))
            .ok_or_else(|| anyhow!("services \"{name}\" not found"))?;

        stored
            .metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(labels.clone());

        Ok(stored.clone())
    }

    async fn replace_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap> {
        let namespace = config_map.namespace().unwrap_or_default();
        let name = config_map.name_any();
        let mut state = self.state();

        let stored = state
            .config_maps
            .iter_mut()
            .find(|c| same_object(&c.metadata, &namespace, &name))
            .ok_or_else(|| anyhow!("configmaps \"{name}\" not found"))?;

        if stored.metadata.resource_version != config_map.metadata.resource_version {
            return Err(anyhow!(
                "Operation cannot be fulfilled on configmaps \"{name}\": the object has been modified"
            )
            .into());
        }

        let next_version = stored
            .metadata
            .resource_version
            .as_deref()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or_default()
            + 1;

        *stored = config_map.clone();
        stored.metadata.resource_version = Some(next_version.to_string());
        let updated = stored.clone();
        state.config_map_writes += 1;

        Ok(updated)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        Ok(self.deployment(namespace, name))
    }

    async fn replace_deployment(&self, deployment: &Deployment) -> Result<Deployment> {
        let namespace = deployment.namespace().unwrap_or_default();
        let name = deployment.name_any();
        let mut state = self.state();

        let stored = state
            .deployments
            .iter_mut()
            .find(|d| same_object(&d.metadata, &namespace, &name))
            .ok_or_else(|| anyhow!("deployments.apps \"{name}\" not found"))?;

        *stored = deployment.clone();
        let updated = stored.clone();
        state.deployment_writes += 1;

        Ok(updated)
    }
}

/// A call received by [`FakeDns`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DnsCall {
    Upsert(String),
    Delete(String),
}

/// DNS provider recording calls, with switchable failures.
#[derive(Clone, Default)]
pub struct FakeDns {
    calls: Arc<Mutex<Vec<DnsCall>>>,
    fail_upsert: Arc<AtomicBool>,
    fail_delete: Arc<AtomicBool>,
}

impl FakeDns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<DnsCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_upsert(&self, fail: bool) {
        self.fail_upsert.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl DnsProvider for FakeDns {
    async fn upsert_record(&self, hostname: &str) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(DnsCall::Upsert(hostname.to_string()));
        if self.fail_upsert.load(Ordering::SeqCst) {
            anyhow::bail!("upsert of {hostname} rejected");
        }
        Ok(())
    }

    async fn delete_record(&self, hostname: &str) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(DnsCall::Delete(hostname.to_string()));
        if self.fail_delete.load(Ordering::SeqCst) {
            anyhow::bail!("delete of {hostname} rejected");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DnsProviderFactory for FakeDns {
    async fn provider_for(&self, _tunnel: &Tunnel) -> Result<Box<dyn DnsProvider>> {
        Ok(Box::new(self.clone()))
    }
}
