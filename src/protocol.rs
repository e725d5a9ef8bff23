// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Origin protocol selection between cloudflared and a Service.
//!
//! An explicit, recognised `…/proto` annotation wins. Otherwise the protocol is
//! derived from the port: TCP 80 is `http`, TCP 443 is `https`, any other TCP port
//! is `tcp`, and UDP is `udp`. An unrecognised annotation value is logged and
//! ignored rather than rejected.

use crate::constants::{HTTPS_PORT, HTTP_PORT, PROTO_HTTP, PROTO_HTTPS, PROTO_TCP, PROTO_UDP};
use crate::errors::{Error, Result};
use std::fmt;
use tracing::{debug, info};

/// Protocol cloudflared uses to reach an origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TunnelProtocol {
    /// Plain HTTP
    Http,
    /// HTTPS
    Https,
    /// Raw TCP stream
    Tcp,
    /// UDP datagrams
    Udp,
}

impl TunnelProtocol {
    /// Scheme used in the cloudflared `service` URL.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TunnelProtocol::Http => PROTO_HTTP,
            TunnelProtocol::Https => PROTO_HTTPS,
            TunnelProtocol::Tcp => PROTO_TCP,
            TunnelProtocol::Udp => PROTO_UDP,
        }
    }

    /// Parse one of the recognised protocol tokens. Case-sensitive.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            PROTO_HTTP => Some(TunnelProtocol::Http),
            PROTO_HTTPS => Some(TunnelProtocol::Https),
            PROTO_TCP => Some(TunnelProtocol::Tcp),
            PROTO_UDP => Some(TunnelProtocol::Udp),
            _ => None,
        }
    }
}

impl fmt::Display for TunnelProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Select the origin protocol for a Service port.
///
/// # Arguments
///
/// * `override_value` - Value of the protocol annotation, if set
/// * `transport` - Port protocol from the Service spec (`TCP`, `UDP`, ...).
///   Kubernetes defaults an unset port protocol to `TCP`, so `None` is TCP.
/// * `port` - Port number
///
/// # Errors
///
/// Returns [`Error::UnsupportedProtocol`] when no override applies and the transport
/// is neither TCP nor UDP.
pub fn resolve_protocol(
    override_value: Option<&str>,
    transport: Option<&str>,
    port: i32,
) -> Result<TunnelProtocol> {
    if let Some(value) = override_value.filter(|v| !v.is_empty()) {
        if let Some(proto) = TunnelProtocol::parse(value) {
            debug!(protocol = %proto, "Using protocol from annotation");
            return Ok(proto);
        }
        info!(
            annotation = value,
            "Invalid protocol provided, following default protocol logic"
        );
    }

    match transport.unwrap_or("TCP") {
        "TCP" => Ok(match port {
            HTTP_PORT => TunnelProtocol::Http,
            HTTPS_PORT => TunnelProtocol::Https,
            _ => TunnelProtocol::Tcp,
        }),
        "UDP" => Ok(TunnelProtocol::Udp),
        other => Err(Error::UnsupportedProtocol {
            protocol: other.to_string(),
            port,
        }),
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod protocol_tests;
