// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

// Common test utilities for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, Namespace, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::client::Client;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tunnel_operator::constants::CONFIGMAP_KEY;
use tunnel_operator::crd::{CloudflareDetails, Tunnel, TunnelSpec};
use tunnel_operator::dns::{DnsProvider, DnsProviderFactory};
use tunnel_operator::labels::{
    TUNNEL_CR_ANNOTATION, TUNNEL_ID_ANNOTATION, TUNNEL_NAME_ANNOTATION, TUNNEL_NS_ANNOTATION,
};

pub const TEST_TUNNEL_ID: &str = "0c8a5f1e-7d2b-4e43-9f6a-2b1d3c4e5f60";

/// Get a Kubernetes client or skip the test if not in a cluster
pub async fn get_kube_client_or_skip() -> Option<Client> {
    match Client::try_default().await {
        Ok(client) => {
            println!("✓ Successfully connected to Kubernetes cluster");
            Some(client)
        }
        Err(e) => {
            eprintln!("⊘ Skipping integration test: not running in Kubernetes cluster: {e}");
            None
        }
    }
}

/// Whether the `Tunnel` CRD is installed
pub async fn tunnel_crd_installed(client: &Client) -> bool {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    matches!(
        crds.get_opt("tunnels.networking.cfargotunnel.com").await,
        Ok(Some(_))
    )
}

/// Create a test namespace
pub async fn create_test_namespace(
    client: &Client,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let namespaces: Api<Namespace> = Api::all(client.clone());

    let test_ns = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from([
                ("test".to_string(), "integration".to_string()),
                ("managed-by".to_string(), "tunnel-operator-test".to_string()),
            ])),
            ..Default::default()
        },
        ..Default::default()
    };

    match namespaces.create(&PostParams::default(), &test_ns).await {
        Ok(_) => {
            println!("✓ Created test namespace: {name}");
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 409 => {
            println!("  Test namespace already exists: {name}");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

/// Delete a test namespace
pub async fn delete_test_namespace(client: &Client, name: &str) {
    let namespaces: Api<Namespace> = Api::all(client.clone());
    match namespaces.delete(name, &DeleteParams::default()).await {
        Ok(_) => println!("✓ Deleted test namespace: {name}"),
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            println!("  Test namespace already deleted: {name}");
        }
        Err(e) => eprintln!("⚠ Failed to delete test namespace {name}: {e}"),
    }
}

fn tunnel_labels(name: &str, namespace: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (TUNNEL_CR_ANNOTATION.to_string(), name.to_string()),
        (TUNNEL_NS_ANNOTATION.to_string(), namespace.to_string()),
        (TUNNEL_NAME_ANNOTATION.to_string(), name.to_string()),
        (TUNNEL_ID_ANNOTATION.to_string(), TEST_TUNNEL_ID.to_string()),
    ])
}

/// Create a `Tunnel` with its id in the status, plus its `ConfigMap` and Deployment
pub async fn create_tunnel_stack(
    client: &Client,
    namespace: &str,
    name: &str,
    domain: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let labels = tunnel_labels(name, namespace);

    let tunnels: Api<Tunnel> = Api::namespaced(client.clone(), namespace);
    let mut tunnel = Tunnel::new(
        name,
        TunnelSpec {
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
    );
    tunnel.metadata.labels = Some(labels.clone());
    tunnels.create(&PostParams::default(), &tunnel).await?;
    tunnels
        .patch_status(
            name,
            &PatchParams::default(),
            &Patch::Merge(json!({ "status": { "tunnelId": TEST_TUNNEL_ID } })),
        )
        .await?;
    println!("✓ Created Tunnel: {namespace}/{name}");

    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    let config_map = ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            CONFIGMAP_KEY.to_string(),
            format!(
                "tunnel: {TEST_TUNNEL_ID}\ncredentials-file: /etc/cloudflared/creds/credentials.json\ningress:\n- service: http_status:404\n"
            ),
        )])),
        ..Default::default()
    };
    config_maps
        .create(&PostParams::default(), &config_map)
        .await?;
    println!("✓ Created ConfigMap: {namespace}/{name}");

    let pod_labels = BTreeMap::from([("app".to_string(), name.to_string())]);
    let deployments: Api<Deployment> = Api::namespaced(client.clone(), namespace);
    let deployment = Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(0),
            selector: LabelSelector {
                match_labels: Some(pod_labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "cloudflared".to_string(),
                        image: Some("cloudflare/cloudflared:latest".to_string()),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    };
    deployments
        .create(&PostParams::default(), &deployment)
        .await?;
    println!("✓ Created Deployment: {namespace}/{name}");

    Ok(())
}

/// Create a Service routed through tunnel `tunnel`
pub async fn create_tunnel_service(
    client: &Client,
    namespace: &str,
    name: &str,
    tunnel: &str,
    port: i32,
) -> Result<Service, Box<dyn std::error::Error>> {
    let services: Api<Service> = Api::namespaced(client.clone(), namespace);
    let service = Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            annotations: Some(BTreeMap::from([(
                TUNNEL_NAME_ANNOTATION.to_string(),
                tunnel.to_string(),
            )])),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                port,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };

    let created = services.create(&PostParams::default(), &service).await?;
    println!("✓ Created Service: {namespace}/{name}");
    Ok(created)
}

/// DNS provider that records calls instead of reaching a DNS API
#[derive(Clone, Default)]
pub struct RecordingDns {
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingDns {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DnsProvider for RecordingDns {
    async fn upsert_record(&self, hostname: &str) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(format!("upsert {hostname}"));
        Ok(())
    }

    async fn delete_record(&self, hostname: &str) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(format!("delete {hostname}"));
        Ok(())
    }
}

#[async_trait]
impl DnsProviderFactory for RecordingDns {
    async fn provider_for(
        &self,
        _tunnel: &Tunnel,
    ) -> tunnel_operator::errors::Result<Box<dyn DnsProvider>> {
        Ok(Box::new(self.clone()))
    }
}
