// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes reconciliation for Services exposed through a tunnel.
//!
//! # Reconciliation Architecture
//!
//! A single controller watches core `Service` objects. Each invocation:
//!
//! 1. **Resolve** - Build a selector from the Service annotations and find its
//!    `Tunnel` and configuration `ConfigMap`
//! 2. **Lifecycle** - Attach the finalizer and upsert the DNS record, or delete the
//!    record and detach the finalizer when the Service is being deleted
//! 3. **Aggregate** - Recompute the ingress rules of every Service sharing the
//!    tunnel and write them into the cloudflared configuration
//! 4. **Restart** - Stamp the configuration digest on the cloudflared Deployment
//!
//! # Modules
//!
//! - [`service`] - The per-Service pipeline, [`reconcile_service`]
//! - [`aggregate`] - Tunnel membership, configuration writes and restart stamps
//! - [`finalizers`] - Finalizer handling in step with DNS records
//! - [`pagination`] - Paginated list calls
//! - [`retry`] - Backoff for DNS provider HTTP calls
//!
//! # Example
//!
//! ```rust,no_run
//! use k8s_openapi::api::core::v1::Service;
//! use tunnel_operator::context::Context;
//! use tunnel_operator::reconcilers::reconcile_service;
//!
//! async fn on_change(ctx: &Context, service: Service) -> anyhow::Result<()> {
//!     reconcile_service(ctx, service).await?;
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod finalizers;
pub mod pagination;
pub mod retry;
pub mod service;

pub use aggregate::{aggregate_tunnel_config, trigger_restart, RestartPolicy, TunnelMembership};
pub use service::{reconcile_service, ReconcileScope};
