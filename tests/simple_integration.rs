// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Integration tests for the tunnel operator
//!
//! These tests run the reconciliation pipeline against a real Kubernetes API
//! server with the `Tunnel` CRD installed. DNS calls are recorded locally.
//!
//! Run with: cargo test --test simple_integration -- --ignored

mod common;

use common::{
    create_test_namespace, create_tunnel_service, create_tunnel_stack, delete_test_namespace,
    get_kube_client_or_skip, tunnel_crd_installed, RecordingDns,
};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Service};
use kube::api::{Api, DeleteParams, ListParams};
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tunnel_operator::constants::CONFIGMAP_KEY;
use tunnel_operator::context::{Context, KubeResources};
use tunnel_operator::labels::{FINALIZER_TUNNEL_SERVICE, TUNNEL_CONFIG_CHECKSUM_ANNOTATION};
use tunnel_operator::reconcilers::{reconcile_service, RestartPolicy};

const TEST_NAMESPACE: &str = "tunnel-operator-it";

async fn config_document(client: &kube::Client, name: &str) -> String {
    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    config_maps
        .get(name)
        .await
        .expect("ConfigMap should exist")
        .data
        .and_then(|mut data| data.remove(CONFIGMAP_KEY))
        .unwrap_or_default()
}

#[tokio::test]
#[ignore] // Run with: cargo test --test simple_integration -- --ignored
async fn test_kubernetes_connectivity() {
    println!("\n=== Test: Kubernetes Connectivity ===\n");

    let Some(client) = get_kube_client_or_skip().await else {
        return;
    };

    let namespaces: Api<Namespace> = Api::all(client);
    let ns_list = namespaces
        .list(&ListParams::default().limit(5))
        .await
        .expect("Failed to list namespaces");

    println!("✓ Found {} namespaces", ns_list.items.len());
    assert!(!ns_list.items.is_empty(), "Expected at least one namespace");
}

#[tokio::test]
#[ignore] // Run with: cargo test --test simple_integration -- --ignored
async fn test_service_lifecycle() {
    println!("\n=== Test: Service Lifecycle ===\n");

    let Some(client) = get_kube_client_or_skip().await else {
        return;
    };
    if !tunnel_crd_installed(&client).await {
        eprintln!("⊘ Skipping: Tunnel CRD not installed (cargo run --bin crdgen)");
        return;
    }

    create_test_namespace(&client, TEST_NAMESPACE)
        .await
        .expect("Failed to create namespace");
    create_tunnel_stack(&client, TEST_NAMESPACE, "t1", "example.com")
        .await
        .expect("Failed to create tunnel");
    let service = create_tunnel_service(&client, TEST_NAMESPACE, "web", "t1", 80)
        .await
        .expect("Failed to create Service");

    let dns = RecordingDns::default();
    let ctx = Context {
        resources: Arc::new(KubeResources::new(client.clone())),
        dns: Arc::new(dns.clone()),
        restart_policy: RestartPolicy::Always,
        requeue_after: Duration::from_secs(300),
    };

    reconcile_service(&ctx, service)
        .await
        .expect("Reconciliation should succeed");

    let document = config_document(&client, "t1").await;
    println!("{document}");
    assert!(document.contains("hostname: web.example.com"));
    assert!(document.contains(&format!("service: http://web.{TEST_NAMESPACE}.svc:80")));
    assert!(document.contains("service: http_status:404"));
    assert!(document.contains("credentials-file:"));

    let deployments: Api<Deployment> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let deployment = deployments.get("t1").await.expect("Deployment should exist");
    let stamped = deployment
        .spec
        .and_then(|spec| spec.template.metadata)
        .and_then(|meta| meta.annotations)
        .is_some_and(|annotations| annotations.contains_key(TUNNEL_CONFIG_CHECKSUM_ANNOTATION));
    assert!(stamped, "Deployment template should carry the checksum");

    let services: Api<Service> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let managed = services.get("web").await.expect("Service should exist");
    assert!(managed
        .finalizers()
        .iter()
        .any(|f| f == FINALIZER_TUNNEL_SERVICE));
    println!("✓ Service exposed through tunnel");

    services
        .delete("web", &DeleteParams::default())
        .await
        .expect("Failed to delete Service");
    let deleting = services.get("web").await.expect("finalizer holds deletion");
    assert!(deleting.metadata.deletion_timestamp.is_some());

    reconcile_service(&ctx, deleting)
        .await
        .expect("Deletion reconciliation should succeed");

    let document = config_document(&client, "t1").await;
    assert!(!document.contains("web.example.com"));
    assert!(document.contains("service: http_status:404"));
    assert_eq!(
        dns.calls(),
        vec!["upsert web.example.com", "delete web.example.com"]
    );
    println!("✓ Service removed from tunnel");

    delete_test_namespace(&client, TEST_NAMESPACE).await;
}
