// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Label, annotation and finalizer keys shared by the Service reconciler.
//!
//! Every key lives under the `tunnels.networking.cfargotunnel.com/` prefix. Several
//! keys are used both as a Service annotation (routing intent written by users) and
//! as a label (correlation written by this operator, or by whatever created the
//! `Tunnel`, `ConfigMap` and `Deployment`).

// ============================================================================
// Tunnel Targeting Annotations (read from Services)
// ============================================================================

/// Name of the `Tunnel` custom resource the Service is exposed through.
///
/// Also written back as a label so the aggregation can list every Service
/// belonging to one tunnel.
pub const TUNNEL_CR_ANNOTATION: &str = "tunnels.networking.cfargotunnel.com/cr";

/// Cloudflare tunnel id of the target tunnel
pub const TUNNEL_ID_ANNOTATION: &str = "tunnels.networking.cfargotunnel.com/id";

/// Cloudflare tunnel name of the target tunnel
pub const TUNNEL_NAME_ANNOTATION: &str = "tunnels.networking.cfargotunnel.com/name";

/// Namespace scope for the tunnel lookup.
///
/// Absent or `"true"` restricts the lookup to the Service namespace, `"false"`
/// removes the restriction (first match wins), anything else is used as the
/// namespace literally.
pub const TUNNEL_NS_ANNOTATION: &str = "tunnels.networking.cfargotunnel.com/ns";

/// Public hostname override. Defaults to `<service>.<tunnel domain>`.
pub const FQDN_ANNOTATION: &str = "tunnels.networking.cfargotunnel.com/fqdn";

/// Protocol override between cloudflared and the Service (http, https, tcp, udp)
pub const TUNNEL_PROTO_ANNOTATION: &str = "tunnels.networking.cfargotunnel.com/proto";

/// Value of [`TUNNEL_NS_ANNOTATION`] meaning "use the Service namespace"
pub const NS_SCOPE_OWN: &str = "true";

/// Value of [`TUNNEL_NS_ANNOTATION`] meaning "any namespace"
pub const NS_SCOPE_ANY: &str = "false";

// ============================================================================
// Correlation Labels (written to Services)
// ============================================================================

/// Label carrying the base domain of the tunnel the Service is routed through
pub const TUNNEL_DOMAIN_LABEL: &str = "tunnels.networking.cfargotunnel.com/domain";

/// Label carrying the public hostname of the Service's routing rule
pub const CONFIG_HOSTNAME_LABEL: &str = "tunnels.networking.cfargotunnel.com/hostname";

/// Label carrying the encoded internal endpoint (`proto.port`)
pub const CONFIG_SERVICE_LABEL: &str = "tunnels.networking.cfargotunnel.com/service";

// ============================================================================
// Workload Annotations
// ============================================================================

/// Pod template annotation holding the digest of the cloudflared configuration.
///
/// A changed value rolls the cloudflared Deployment.
pub const TUNNEL_CONFIG_CHECKSUM_ANNOTATION: &str =
    "tunnels.networking.cfargotunnel.com/checksum";

// ============================================================================
// Finalizers
// ============================================================================

/// Finalizer guarding removal of the Service's DNS record
pub const FINALIZER_TUNNEL_SERVICE: &str = "tunnels.networking.cfargotunnel.com/finalizer";
