// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the tunnel operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// Kind name for `Tunnel` resource
pub const KIND_TUNNEL: &str = "Tunnel";

/// Kind name used in logs for core `Service` objects
pub const KIND_SERVICE: &str = "Service";

/// Kind name of the cloudflared configuration object
pub const KIND_CONFIG_MAP: &str = "ConfigMap";

/// Kind name of the cloudflared workload
pub const KIND_DEPLOYMENT: &str = "Deployment";

// ============================================================================
// cloudflared Configuration Constants
// ============================================================================

/// `ConfigMap` key holding the cloudflared YAML configuration
pub const CONFIGMAP_KEY: &str = "config.yaml";

/// Service of the trailing catch-all ingress rule
pub const CATCH_ALL_SERVICE: &str = "http_status:404";

/// Separator between protocol and port in the encoded service label
pub const CONFIG_SERVICE_LABEL_SPLIT: &str = ".";

/// Suffix of the CNAME target for a tunnel (`<tunnel id>.cfargotunnel.com`)
pub const TUNNEL_CNAME_SUFFIX: &str = "cfargotunnel.com";

// ============================================================================
// Protocol Constants
// ============================================================================

/// Plain HTTP origin
pub const PROTO_HTTP: &str = "http";

/// HTTPS origin
pub const PROTO_HTTPS: &str = "https";

/// Raw TCP origin
pub const PROTO_TCP: &str = "tcp";

/// UDP origin
pub const PROTO_UDP: &str = "udp";

/// Well-known HTTP port, defaults to [`PROTO_HTTP`]
pub const HTTP_PORT: i32 = 80;

/// Well-known HTTPS port, defaults to [`PROTO_HTTPS`]
pub const HTTPS_PORT: i32 = 443;

// ============================================================================
// Cloudflare API Constants
// ============================================================================

/// Default Cloudflare v4 API base URL
pub const DEFAULT_CLOUDFLARE_API_URL: &str = "https://api.cloudflare.com/client/v4";

/// Default key in the tunnel credential Secret holding the API token
pub const DEFAULT_CLOUDFLARE_API_TOKEN_KEY: &str = "CLOUDFLARE_API_TOKEN";

/// TTL value meaning "automatic" in the Cloudflare API
pub const CLOUDFLARE_AUTO_TTL: u32 = 1;

/// Comment attached to DNS records created by the operator
pub const CLOUDFLARE_RECORD_COMMENT: &str = "Managed by tunnel-operator";

/// Timeout for a single Cloudflare API request
pub const CLOUDFLARE_REQUEST_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Controller Error Handling Constants
// ============================================================================

/// Requeue duration for controller errors (30 seconds)
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

/// Default periodic resync for successfully reconciled Services (5 minutes)
pub const DEFAULT_REQUEUE_DURATION_SECS: u64 = 300;

// ============================================================================
// Kubernetes API Constants
// ============================================================================

/// Page size for paginated list calls
pub const KUBE_LIST_PAGE_SIZE: u32 = 100;

/// Field manager used for patches issued by the operator
pub const FIELD_MANAGER: &str = "tunnel-operator";

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Port for Prometheus metrics HTTP server
pub const METRICS_SERVER_PORT: u16 = 8080;

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Bind address for metrics HTTP server
pub const METRICS_SERVER_BIND_ADDRESS: &str = "0.0.0.0";
