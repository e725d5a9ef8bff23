// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for Service reconciliation.
//!
//! Every failure is returned to the controller unmodified; the controller's error
//! policy owns retries. Upstream failures (Kubernetes API, DNS provider) are wrapped
//! in [`Error::Upstream`] without altering their message so a conflicting
//! `ConfigMap` write or a failed DNS delete reads the same in logs as at the source.

use thiserror::Error;

/// Result alias used by the reconciliation pipeline.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while reconciling a Service against its tunnel.
#[derive(Error, Debug)]
pub enum Error {
    /// The Service carries none of the tunnel targeting annotations.
    ///
    /// Such Services are unmanaged; the reconciler handles this variant by
    /// cleaning up a stale finalizer instead of failing.
    #[error("Service {namespace}/{name} has no tunnel targeting annotations")]
    NoAnnotations {
        /// Service namespace
        namespace: String,
        /// Service name
        name: String,
    },

    /// No resource of `kind` matched the selector built from the Service annotations.
    #[error("no {kind} found matching labels [{selector}]")]
    NotFound {
        /// Kind that was listed (`Tunnel`, `ConfigMap`, `Deployment`)
        kind: String,
        /// Rendered label selector used for the lookup
        selector: String,
    },

    /// The Service declares no ports, so no origin can be derived.
    #[error("no ports found in spec of Service {namespace}/{name}")]
    NoPorts {
        /// Service namespace
        namespace: String,
        /// Service name
        name: String,
    },

    /// The first Service port uses a transport protocol the tunnel cannot carry.
    #[error("unsupported protocol '{protocol}' on port {port}")]
    UnsupportedProtocol {
        /// Transport protocol of the port (e.g. `SCTP`)
        protocol: String,
        /// Port number
        port: i32,
    },

    /// An internal endpoint or its encoded label is not `proto://host:port` / `proto.port`.
    #[error("invalid endpoint '{value}': {reason}")]
    InvalidEndpoint {
        /// The offending value
        value: String,
        /// What is wrong with it
        reason: String,
    },

    /// The configuration `ConfigMap` lacks the cloudflared configuration key.
    #[error("unable to find key `{key}` in ConfigMap {namespace}/{name}")]
    MissingConfigKey {
        /// Missing key
        key: String,
        /// `ConfigMap` namespace
        namespace: String,
        /// `ConfigMap` name
        name: String,
    },

    /// The cloudflared configuration document could not be read or written.
    #[error("invalid cloudflared configuration: {0}")]
    Serialization(#[from] serde_yaml::Error),

    /// The tunnel has no id yet, so no CNAME target exists.
    #[error("Tunnel {namespace}/{name} has no tunnel id")]
    TunnelNotReady {
        /// Tunnel namespace
        namespace: String,
        /// Tunnel name
        name: String,
    },

    /// Failure reported by the Kubernetes API or the DNS provider.
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

impl From<kube::Error> for Error {
    fn from(e: kube::Error) -> Self {
        Error::Upstream(e.into())
    }
}

impl Error {
    /// Short, stable identifier for metrics labels.
    #[must_use]
    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::NoAnnotations { .. } => "no_annotations",
            Error::NotFound { .. } => "not_found",
            Error::NoPorts { .. } => "no_ports",
            Error::UnsupportedProtocol { .. } => "unsupported_protocol",
            Error::InvalidEndpoint { .. } => "invalid_endpoint",
            Error::MissingConfigKey { .. } => "missing_config_key",
            Error::Serialization(_) => "serialization",
            Error::TunnelNotReady { .. } => "tunnel_not_ready",
            Error::Upstream(_) => "upstream",
        }
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
