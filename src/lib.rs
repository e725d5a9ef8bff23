// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # Tunnel Operator - Cloudflare Tunnel ingress for Kubernetes Services
//!
//! The operator watches core `Service` objects. A Service opts in with
//! `tunnels.networking.cfargotunnel.com/*` annotations that select a `Tunnel`
//! resource; the operator then keeps three things in step with it:
//!
//! - the cloudflared ingress rules stored in the tunnel's `ConfigMap`
//! - a proxied CNAME record pointing the Service hostname at the tunnel
//! - a finalizer that holds deletion until the record is gone
//!
//! ## Modules
//!
//! - [`crd`] - The `Tunnel` Custom Resource Definition
//! - [`labels`] - Annotation, label and finalizer keys
//! - [`selector`] - Service annotations to tunnel label selectors
//! - [`protocol`] - Origin protocol selection
//! - [`ingress`] - cloudflared ingress rules and configuration document
//! - [`codec`] - Label encoding of a Service endpoint
//! - [`reconcilers`] - The reconciliation pipeline
//! - [`context`] - Shared controller context and the Kubernetes resource seam
//! - [`dns`] - The DNS provider seam
//! - [`cloudflare`] - Cloudflare API implementation of the DNS provider
//! - [`metrics`] - Prometheus metrics
//!
//! ## Example
//!
//! ```rust,no_run
//! use tunnel_operator::labels::{FQDN_ANNOTATION, TUNNEL_NAME_ANNOTATION};
//!
//! // Annotations exposing a Service as web.example.com through tunnel "t1"
//! let annotations = [
//!     (TUNNEL_NAME_ANNOTATION, "t1"),
//!     (FQDN_ANNOTATION, "web.example.com"),
//! ];
//! # let _ = annotations;
//! ```

pub mod cloudflare;
pub mod codec;
pub mod constants;
pub mod context;
pub mod crd;
pub mod dns;
pub mod errors;
pub mod ingress;
pub mod labels;
pub mod metrics;
pub mod protocol;
pub mod reconcilers;
pub mod selector;

#[cfg(test)]
mod test_support;
