// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions read by the Service reconciler.
//!
//! The operator only reads [`Tunnel`] resources: whatever provisions the tunnel
//! (and its `cloudflared` `ConfigMap` and `Deployment`) owns the spec and status.
//! The fields modelled here are the ones the Service reconciler and the Cloudflare
//! DNS adapter consume, plus the provisioning fields that keep the schema faithful
//! to the resources found in a cluster.
//!
//! # Example: A Tunnel
//!
//! ```yaml
//! apiVersion: networking.cfargotunnel.com/v1alpha1
//! kind: Tunnel
//! metadata:
//!   name: t1
//!   namespace: ns1
//! spec:
//!   cloudflare:
//!     domain: example.com
//!     secret: cloudflare-secrets
//!     accountId: 0123456789abcdef
//!   newTunnel:
//!     name: my-tunnel
//! ```

use crate::constants::{DEFAULT_CLOUDFLARE_API_TOKEN_KEY, TUNNEL_CNAME_SUFFIX};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Cloudflare account and zone details of a tunnel.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloudflareDetails {
    /// Base domain used to synthesize default public hostnames
    /// (`<service>.<domain>`) and to locate the Cloudflare zone.
    pub domain: String,

    /// Name of the Secret, in the tunnel namespace, holding the API token.
    pub secret: String,

    /// Cloudflare account name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,

    /// Cloudflare account id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,

    /// Account email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Zone id of `domain`. Looked up by name when neither this nor the
    /// status carries it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<String>,

    /// Key in the Secret holding the API token. Defaults to `CLOUDFLARE_API_TOKEN`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloudflare_api_token: Option<String>,
}

/// Reference to a tunnel created outside the operator.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExistingTunnel {
    /// Tunnel id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Tunnel name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Request for a tunnel to be created.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewTunnel {
    /// Tunnel name
    pub name: String,
}

/// `Tunnel` describes a Cloudflare tunnel served by a `cloudflared` Deployment.
///
/// Services select a tunnel through the `tunnels.networking.cfargotunnel.com/*`
/// annotations; the selection matches the labels carried by the Tunnel and by
/// its `ConfigMap`.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "networking.cfargotunnel.com",
    version = "v1alpha1",
    kind = "Tunnel",
    namespaced,
    shortname = "tun",
    doc = "Tunnel represents a Cloudflare tunnel and the base domain used for the public hostnames of the Services routed through it."
)]
#[kube(status = "TunnelStatus")]
#[serde(rename_all = "camelCase")]
pub struct TunnelSpec {
    /// Cloudflare account, zone and credential details.
    pub cloudflare: CloudflareDetails,

    /// Use an existing tunnel. Mutually exclusive with `newTunnel`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_tunnel: Option<ExistingTunnel>,

    /// Create a new tunnel. Mutually exclusive with `existingTunnel`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_tunnel: Option<NewTunnel>,

    /// Number of `cloudflared` replicas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i32>,

    /// `cloudflared` image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Disable TLS verification towards origins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_tls_verify: Option<bool>,
}

/// Observed state of a `Tunnel`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TunnelStatus {
    /// Tunnel id assigned by Cloudflare
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunnel_id: Option<String>,

    /// Tunnel name in Cloudflare
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunnel_name: Option<String>,

    /// Account id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,

    /// Zone id of the tunnel domain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<String>,
}

impl Tunnel {
    /// Base domain of the tunnel.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.spec.cloudflare.domain
    }

    /// Tunnel id, preferring the observed status over the spec reference.
    #[must_use]
    pub fn tunnel_id(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.tunnel_id.as_deref())
            .or_else(|| {
                self.spec
                    .existing_tunnel
                    .as_ref()
                    .and_then(|t| t.id.as_deref())
            })
            .filter(|id| !id.is_empty())
    }

    /// Zone id, preferring the observed status over the spec.
    #[must_use]
    pub fn zone_id(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.zone_id.as_deref())
            .or(self.spec.cloudflare.zone_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    /// Key in the credential Secret holding the API token.
    #[must_use]
    pub fn api_token_key(&self) -> &str {
        self.spec
            .cloudflare
            .cloudflare_api_token
            .as_deref()
            .unwrap_or(DEFAULT_CLOUDFLARE_API_TOKEN_KEY)
    }

    /// CNAME target public hostnames are pointed at (`<id>.cfargotunnel.com`).
    #[must_use]
    pub fn cname_target(&self) -> Option<String> {
        self.tunnel_id()
            .map(|id| format!("{id}.{TUNNEL_CNAME_SUFFIX}"))
    }
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
