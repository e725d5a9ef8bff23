// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! cloudflared ingress rules and configuration document.
//!
//! The cloudflared `ConfigMap` holds a YAML document whose `ingress` list maps public
//! hostnames to origins. This module derives the rule for one Service and models the
//! document so the `ingress` list can be replaced while every other key the
//! provisioning side wrote (`tunnel`, `credentials-file`, `originRequest`, ...) is
//! kept as-is.
//!
//! # Example
//!
//! ```yaml
//! tunnel: my-tunnel
//! credentials-file: /etc/cloudflared/creds/credentials.json
//! ingress:
//!   - hostname: web.example.com
//!     service: http://web.ns1.svc:80
//!   - service: http_status:404
//! ```

use crate::constants::CATCH_ALL_SERVICE;
use crate::errors::{Error, Result};
use crate::labels::{FQDN_ANNOTATION, TUNNEL_PROTO_ANNOTATION};
use crate::protocol::resolve_protocol;
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// One cloudflared ingress rule: public hostname → origin service URL.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressRule {
    /// Public hostname. Empty only for the trailing catch-all rule.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,

    /// Optional path regex
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Origin, e.g. `http://web.ns1.svc:80` or `http_status:404`
    pub service: String,

    /// Per-rule origin settings, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_request: Option<serde_yaml::Value>,
}

impl IngressRule {
    /// Rule with just a hostname and a service.
    #[must_use]
    pub fn new(hostname: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            service: service.into(),
            ..Default::default()
        }
    }
}

/// Trailing rule answering every unmatched request with a 404.
#[must_use]
pub fn catch_all_rule() -> IngressRule {
    IngressRule::new("", CATCH_ALL_SERVICE)
}

/// The cloudflared configuration document stored in the `ConfigMap`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudflaredConfig {
    /// Tunnel name or id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunnel: Option<String>,

    /// Path of the tunnel credentials inside the cloudflared pod
    #[serde(
        rename = "credentials-file",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub credentials_file: Option<String>,

    /// Ordered ingress rules, owned by the Service reconciler
    #[serde(default)]
    pub ingress: Vec<IngressRule>,

    /// Every other top-level key
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl CloudflaredConfig {
    /// Parse a configuration document. A blank document is an empty configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] when the document is not valid YAML for this shape.
    pub fn parse(document: &str) -> Result<Self> {
        if document.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(document)?)
    }

    /// Serialize back to YAML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Build the ingress rule routing to `service` through a tunnel on `tunnel_domain`.
///
/// Only the first port is used. The hostname is the `…/fqdn` annotation if set,
/// otherwise `<service name>.<tunnel_domain>`.
///
/// # Errors
///
/// Returns [`Error::NoPorts`] when the Service declares no ports, and
/// [`Error::UnsupportedProtocol`] when no protocol can be chosen for the first port.
pub fn rule_for_service(service: &Service, tunnel_domain: &str) -> Result<IngressRule> {
    let name = service.name_any();
    let namespace = service.namespace().unwrap_or_default();

    let ports = service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_deref())
        .unwrap_or_default();

    let port = ports.first().ok_or_else(|| Error::NoPorts {
        namespace: namespace.clone(),
        name: name.clone(),
    })?;

    if ports.len() > 1 {
        warn!(
            service = %name,
            namespace = %namespace,
            ports = ports.len(),
            "Multiple ports definition found, picking the first in the list"
        );
    }

    let annotations = service.annotations();
    let proto = resolve_protocol(
        annotations.get(TUNNEL_PROTO_ANNOTATION).map(String::as_str),
        port.protocol.as_deref(),
        port.port,
    )?;

    let origin = format!("{proto}://{name}.{namespace}.svc:{}", port.port);

    let hostname = match annotations.get(FQDN_ANNOTATION).filter(|h| !h.is_empty()) {
        Some(fqdn) => fqdn.clone(),
        None => format!("{name}.{tunnel_domain}"),
    };

    debug!(
        hostname = %hostname,
        service = %origin,
        "Generated cloudflared ingress rule"
    );

    Ok(IngressRule::new(hostname, origin))
}

#[cfg(test)]
#[path = "ingress_tests.rs"]
mod ingress_tests;
