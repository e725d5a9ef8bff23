// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Service reconciliation.
//!
//! One invocation handles one Service:
//!
//! 1. A Service without targeting annotations is unmanaged; a stale finalizer is
//!    removed and nothing else happens.
//! 2. The governing `Tunnel` and cloudflared `ConfigMap` are found through the
//!    selector built from the annotations, and the Service's ingress rule is derived.
//! 3. A Service being deleted has its DNS record removed and its finalizer
//!    released. Otherwise the finalizer is attached, the DNS record upserted and
//!    the membership labels stamped.
//! 4. The tunnel's ingress list is rebuilt from its membership and the checksum is
//!    stamped on the cloudflared Deployment.
//!
//! Any failure aborts the invocation and is returned unmodified.

use crate::codec::encode_service;
use crate::constants::{KIND_CONFIG_MAP, KIND_TUNNEL};
use crate::context::{Context, TunnelResources};
use crate::crd::Tunnel;
use crate::errors::{Error, Result};
use crate::ingress::{rule_for_service, IngressRule};
use crate::labels::{
    CONFIG_HOSTNAME_LABEL, CONFIG_SERVICE_LABEL, FINALIZER_TUNNEL_SERVICE, TUNNEL_CR_ANNOTATION,
    TUNNEL_DOMAIN_LABEL, TUNNEL_NS_ANNOTATION,
};
use crate::reconcilers::aggregate::{aggregate_tunnel_config, trigger_restart};
use crate::reconcilers::finalizers::{
    cleanup_unmanaged, enter_managed, has_finalizer, leave_managed,
};
use crate::selector::{has_targeting_annotations, selector_for_service, TunnelSelector};
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Everything resolved for one Service during one invocation.
#[derive(Clone, Debug)]
pub struct ReconcileScope {
    pub service: Service,
    pub selector: TunnelSelector,
    pub tunnel: Tunnel,
    pub config_map: ConfigMap,
    pub rule: IngressRule,
}

impl ReconcileScope {
    /// Locate the tunnel and configuration governing `service` and derive its rule.
    ///
    /// When several objects match, the first one listed wins.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoAnnotations`], [`Error::NotFound`] when no `Tunnel` or
    /// `ConfigMap` matches, or a rule derivation error.
    pub async fn resolve(resources: &dyn TunnelResources, service: Service) -> Result<Self> {
        let selector = selector_for_service(&service)?;

        let tunnel = resources
            .list_tunnels(&selector)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound {
                kind: KIND_TUNNEL.to_string(),
                selector: selector.to_string(),
            })?;

        let config_map = resources
            .list_config_maps(&selector)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound {
                kind: KIND_CONFIG_MAP.to_string(),
                selector: selector.to_string(),
            })?;

        let rule = rule_for_service(&service, tunnel.domain())?;

        debug!(
            service = %service.name_any(),
            tunnel = %tunnel.name_any(),
            configmap = %config_map.name_any(),
            selector = %selector,
            "Resolved tunnel for Service"
        );

        Ok(Self {
            service,
            selector,
            tunnel,
            config_map,
            rule,
        })
    }

    /// Labels recording the Service's tunnel membership and rule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] if the rule's service cannot be encoded.
    pub fn membership_labels(&self) -> Result<BTreeMap<String, String>> {
        Ok(BTreeMap::from([
            (
                TUNNEL_DOMAIN_LABEL.to_string(),
                self.tunnel.domain().to_string(),
            ),
            (CONFIG_HOSTNAME_LABEL.to_string(), self.rule.hostname.clone()),
            (
                CONFIG_SERVICE_LABEL.to_string(),
                encode_service(&self.rule.service)?,
            ),
            (
                TUNNEL_NS_ANNOTATION.to_string(),
                self.tunnel.namespace().unwrap_or_default(),
            ),
            (TUNNEL_CR_ANNOTATION.to_string(), self.tunnel.name_any()),
        ]))
    }

    fn is_deleting(&self) -> bool {
        self.service.metadata.deletion_timestamp.is_some()
    }
}

/// Reconcile one Service against its tunnel.
///
/// # Errors
///
/// Returns the first failure of any stage, unmodified.
pub async fn reconcile_service(ctx: &Context, service: Service) -> Result<()> {
    let resources = ctx.resources.as_ref();
    let namespace = service.namespace().unwrap_or_default();
    let name = service.name_any();

    debug!(service = %name, namespace = %namespace, "Reconciling Service");

    if !has_targeting_annotations(&service) {
        debug!(
            service = %name,
            namespace = %namespace,
            "Service has no tunnel annotations, not managed"
        );
        return cleanup_unmanaged(resources, &service).await;
    }

    let mut scope = ReconcileScope::resolve(resources, service).await?;

    if scope.is_deleting() {
        if has_finalizer(&scope.service, FINALIZER_TUNNEL_SERVICE) {
            let dns = ctx.dns.provider_for(&scope.tunnel).await?;
            leave_managed(resources, &scope.service, dns.as_ref(), &scope.rule.hostname).await?;
            info!(
                service = %name,
                namespace = %namespace,
                hostname = %scope.rule.hostname,
                "Removed Service from tunnel"
            );
        }
    } else {
        let dns = ctx.dns.provider_for(&scope.tunnel).await?;
        scope.service =
            enter_managed(resources, &scope.service, dns.as_ref(), &scope.rule.hostname).await?;

        let labels = scope.membership_labels()?;
        scope.service = resources
            .patch_service_labels(&scope.service, &labels)
            .await?;
    }

    let config_map = aggregate_tunnel_config(resources, &scope.tunnel, &scope.config_map).await?;
    trigger_restart(resources, &config_map, ctx.restart_policy).await?;

    info!(
        service = %name,
        namespace = %namespace,
        hostname = %scope.rule.hostname,
        tunnel = %scope.tunnel.name_any(),
        "Reconciled Service"
    );

    Ok(())
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod service_tests;
