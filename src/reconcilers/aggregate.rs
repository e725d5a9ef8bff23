// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Tunnel-wide ingress aggregation and cloudflared restart stamping.
//!
//! The `ingress` list of a tunnel's configuration is never edited in place. On
//! every reconciliation the full membership (all Services labelled for the
//! tunnel, in any namespace) is listed again, each member's rule is decoded from
//! its labels, the catch-all is appended, and the list replaces the previous one.
//! The same membership therefore always renders the same bytes.
//!
//! cloudflared only reads its configuration at startup. After a write, a SHA-256
//! digest of the document is stamped on the Deployment pod template so a changed
//! document rolls the pods.

use crate::codec::decode_service;
use crate::constants::{CONFIGMAP_KEY, KIND_DEPLOYMENT};
use crate::context::TunnelResources;
use crate::crd::Tunnel;
use crate::errors::{Error, Result};
use crate::ingress::{catch_all_rule, CloudflaredConfig, IngressRule};
use crate::labels::{
    CONFIG_HOSTNAME_LABEL, CONFIG_SERVICE_LABEL, TUNNEL_CONFIG_CHECKSUM_ANNOTATION,
};
use crate::metrics::{record_config_write, record_restart_stamp};
use crate::selector::selector_for_tunnel_members;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::ResourceExt;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// When the configuration checksum is written to the cloudflared Deployment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Replace the Deployment after every configuration write.
    #[default]
    Always,
    /// Replace the Deployment only when the stamped checksum differs.
    OnChange,
}

/// The Services currently routed through one tunnel.
#[derive(Clone, Debug)]
pub struct TunnelMembership {
    /// `<namespace>/<name>` of the tunnel
    pub tunnel: String,
    /// Member Services in API server order, excluding those being deleted
    pub services: Vec<Service>,
}

impl TunnelMembership {
    /// Query the current members of `tunnel`.
    ///
    /// # Errors
    ///
    /// Returns an error if the Service list fails.
    pub async fn load(resources: &dyn TunnelResources, tunnel: &Tunnel) -> Result<Self> {
        let selector = selector_for_tunnel_members(tunnel);
        let services: Vec<Service> = resources
            .list_services(&selector)
            .await?
            .into_iter()
            .filter(|s| s.metadata.deletion_timestamp.is_none())
            .collect();

        let tunnel = format!(
            "{}/{}",
            tunnel.namespace().unwrap_or_default(),
            tunnel.name_any()
        );
        debug!(tunnel = %tunnel, members = services.len(), "Loaded tunnel membership");

        Ok(Self { tunnel, services })
    }

    /// Ordered ingress rules of the members, followed by the catch-all.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] when a member's hostname or service label
    /// is missing or malformed.
    pub fn rules(&self) -> Result<Vec<IngressRule>> {
        let mut rules = Vec::with_capacity(self.services.len() + 1);

        for service in &self.services {
            let labels = service.labels();
            let hostname = labels
                .get(CONFIG_HOSTNAME_LABEL)
                .filter(|h| !h.is_empty())
                .ok_or_else(|| Error::InvalidEndpoint {
                    value: format!(
                        "{}/{}",
                        service.namespace().unwrap_or_default(),
                        service.name_any()
                    ),
                    reason: format!("missing label {CONFIG_HOSTNAME_LABEL}"),
                })?;
            let label = labels
                .get(CONFIG_SERVICE_LABEL)
                .map(String::as_str)
                .unwrap_or_default();

            rules.push(IngressRule::new(
                hostname.clone(),
                decode_service(label, service)?,
            ));
        }

        rules.push(catch_all_rule());
        Ok(rules)
    }
}

fn config_document(config_map: &ConfigMap) -> Result<&str> {
    config_map
        .data
        .as_ref()
        .and_then(|data| data.get(CONFIGMAP_KEY))
        .map(String::as_str)
        .ok_or_else(|| Error::MissingConfigKey {
            key: CONFIGMAP_KEY.to_string(),
            namespace: config_map.namespace().unwrap_or_default(),
            name: config_map.name_any(),
        })
}

/// Render the document of `config_map` with its `ingress` list replaced by `rules`.
///
/// # Errors
///
/// Returns [`Error::MissingConfigKey`] or [`Error::Serialization`].
pub fn render_config(config_map: &ConfigMap, rules: Vec<IngressRule>) -> Result<String> {
    let mut config = CloudflaredConfig::parse(config_document(config_map)?)?;
    config.ingress = rules;
    config.to_yaml()
}

/// Rebuild the ingress list of `tunnel` from its membership and write it.
///
/// Returns the `ConfigMap` as stored after the write.
///
/// # Errors
///
/// Returns rendering errors, or the write error (a stale `resourceVersion`
/// surfaces as a conflict).
pub async fn aggregate_tunnel_config(
    resources: &dyn TunnelResources,
    tunnel: &Tunnel,
    config_map: &ConfigMap,
) -> Result<ConfigMap> {
    let membership = TunnelMembership::load(resources, tunnel).await?;
    let rules = membership.rules()?;
    let rule_count = rules.len();
    let document = render_config(config_map, rules)?;

    let mut updated = config_map.clone();
    updated
        .data
        .get_or_insert_with(BTreeMap::new)
        .insert(CONFIGMAP_KEY.to_string(), document);

    let written = resources.replace_config_map(&updated).await?;
    record_config_write(&membership.tunnel);

    info!(
        tunnel = %membership.tunnel,
        configmap = %written.name_any(),
        rules = rule_count,
        "Updated cloudflared ingress configuration"
    );

    Ok(written)
}

/// Lowercase hex SHA-256 digest of a configuration document.
#[must_use]
pub fn config_checksum(document: &str) -> String {
    format!("{:x}", Sha256::digest(document.as_bytes()))
}

/// Stamp the checksum of the document in `config_map` on the cloudflared
/// Deployment sharing its name and namespace.
///
/// Returns whether the Deployment was replaced.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when the Deployment does not exist, or the
/// replace error.
pub async fn trigger_restart(
    resources: &dyn TunnelResources,
    config_map: &ConfigMap,
    policy: RestartPolicy,
) -> Result<bool> {
    let checksum = config_checksum(config_document(config_map)?);
    let namespace = config_map.namespace().unwrap_or_default();
    let name = config_map.name_any();

    let mut deployment = resources
        .get_deployment(&namespace, &name)
        .await?
        .ok_or_else(|| Error::NotFound {
            kind: KIND_DEPLOYMENT.to_string(),
            selector: format!("{namespace}/{name}"),
        })?;

    {
        let annotations = deployment
            .spec
            .get_or_insert_with(Default::default)
            .template
            .metadata
            .get_or_insert_with(Default::default)
            .annotations
            .get_or_insert_with(BTreeMap::new);

        if policy == RestartPolicy::OnChange
            && annotations.get(TUNNEL_CONFIG_CHECKSUM_ANNOTATION) == Some(&checksum)
        {
            debug!(
                deployment = %name,
                namespace = %namespace,
                "Configuration checksum unchanged, not restarting cloudflared"
            );
            record_restart_stamp(false);
            return Ok(false);
        }

        annotations.insert(
            TUNNEL_CONFIG_CHECKSUM_ANNOTATION.to_string(),
            checksum.clone(),
        );
    }

    resources.replace_deployment(&deployment).await?;
    record_restart_stamp(true);

    info!(
        deployment = %name,
        namespace = %namespace,
        checksum = %checksum,
        "Stamped configuration checksum on cloudflared Deployment"
    );

    Ok(true)
}

#[cfg(test)]
#[path = "aggregate_tests.rs"]
mod aggregate_tests;
