// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Compact label encoding of a Service's internal endpoint.
//!
//! Label values are limited to 63 characters from a restricted alphabet, so only
//! the parts of `proto://<name>.<namespace>.svc:<port>` that cannot be recovered
//! from the Service itself are stored: the label value is `proto.port`. Decoding
//! needs the owning Service to fill the host back in, which also means a label
//! copied onto another Service decodes to that Service's own address.

use crate::constants::CONFIG_SERVICE_LABEL_SPLIT;
use crate::errors::{Error, Result};
use crate::protocol::TunnelProtocol;
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;

/// Encode `proto://host:port` as `proto.port`.
///
/// # Errors
///
/// Returns [`Error::InvalidEndpoint`] when the endpoint lacks a scheme or its
/// port is not a number in `0..=65535`.
pub fn encode_service(endpoint: &str) -> Result<String> {
    let (proto, authority) = endpoint
        .split_once("://")
        .ok_or_else(|| invalid(endpoint, "missing '://'"))?;
    let (_, port) = authority
        .rsplit_once(':')
        .ok_or_else(|| invalid(endpoint, "missing port"))?;

    if proto.is_empty() {
        return Err(invalid(endpoint, "empty protocol"));
    }
    let port = parse_port(endpoint, port)?;

    Ok(format!("{proto}{CONFIG_SERVICE_LABEL_SPLIT}{port}"))
}

/// Decode `proto.port` into `proto://<name>.<namespace>.svc:port` for `service`.
///
/// # Errors
///
/// Returns [`Error::InvalidEndpoint`] when the label is not `proto.port` with a
/// known protocol and a numeric port.
pub fn decode_service(label: &str, service: &Service) -> Result<String> {
    let (proto, port) = label
        .split_once(CONFIG_SERVICE_LABEL_SPLIT)
        .ok_or_else(|| invalid(label, "expected '<proto>.<port>'"))?;

    let proto = TunnelProtocol::parse(proto)
        .ok_or_else(|| invalid(label, &format!("unknown protocol '{proto}'")))?;
    let port = parse_port(label, port)?;

    Ok(format!(
        "{proto}://{}.{}.svc:{port}",
        service.name_any(),
        service.namespace().unwrap_or_default()
    ))
}

fn parse_port(value: &str, port: &str) -> Result<u16> {
    port.parse()
        .map_err(|_| invalid(value, &format!("invalid port '{port}'")))
}

fn invalid(value: &str, reason: &str) -> Error {
    Error::InvalidEndpoint {
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod codec_tests;
