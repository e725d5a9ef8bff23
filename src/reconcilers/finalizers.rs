// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Finalizer lifecycle of tunnel-routed Services.
//!
//! A Service routed through a tunnel owns a public DNS record. The finalizer
//! [`FINALIZER_TUNNEL_SERVICE`] keeps the Service around until that record is
//! gone:
//!
//! - **Entering managed**: add the finalizer if absent, then upsert the record.
//! - **Deletion requested**: delete the record, then remove the finalizer. If the
//!   delete fails the finalizer stays and the error is returned.
//! - **Unmanaged**: a Service that lost its targeting annotations only has the
//!   stale finalizer removed. No DNS call is made.
//!
//! # Example
//!
//! ```rust,ignore
//! use tunnel_operator::reconcilers::finalizers::{enter_managed, leave_managed};
//!
//! if service.metadata.deletion_timestamp.is_some() {
//!     leave_managed(resources, &service, dns.as_ref(), &rule.hostname).await?;
//! } else {
//!     let service = enter_managed(resources, &service, dns.as_ref(), &rule.hostname).await?;
//! }
//! ```

use crate::context::TunnelResources;
use crate::dns::DnsProvider;
use crate::errors::{Error, Result};
use crate::labels::FINALIZER_TUNNEL_SERVICE;
use crate::metrics::record_dns_operation;
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use tracing::{info, warn};

/// Work that must finish before a finalizer may be removed.
#[async_trait::async_trait]
pub trait FinalizerCleanup: Send + Sync {
    /// Release whatever the finalizer protects.
    ///
    /// # Errors
    ///
    /// An error keeps the finalizer in place; deletion stays blocked until a later
    /// reconciliation succeeds.
    async fn cleanup(&self) -> Result<()>;
}

/// Removes the public DNS record of a hostname.
pub struct DnsRecordCleanup<'a> {
    pub dns: &'a dyn DnsProvider,
    pub hostname: &'a str,
}

#[async_trait::async_trait]
impl FinalizerCleanup for DnsRecordCleanup<'_> {
    async fn cleanup(&self) -> Result<()> {
        let result = self.dns.delete_record(self.hostname).await;
        record_dns_operation("delete", result.is_ok());
        result.map_err(Error::Upstream)
    }
}

/// Whether `service` carries `finalizer`.
#[must_use]
pub fn has_finalizer(service: &Service, finalizer: &str) -> bool {
    service.finalizers().iter().any(|f| f == finalizer)
}

/// Add `finalizer` to `service` if it is not already present.
///
/// Returns the Service as stored after the patch, or unchanged when nothing was
/// written.
///
/// # Errors
///
/// Returns an error if the API patch operation fails.
pub async fn ensure_finalizer(
    resources: &dyn TunnelResources,
    service: &Service,
    finalizer: &str,
) -> Result<Service> {
    if has_finalizer(service, finalizer) {
        return Ok(service.clone());
    }

    info!(
        "Adding finalizer {} to {}/{} Service",
        finalizer,
        service.namespace().unwrap_or_default(),
        service.name_any()
    );

    let mut finalizers = service.finalizers().to_vec();
    finalizers.push(finalizer.to_string());

    resources.patch_service_finalizers(service, finalizers).await
}

/// Remove `finalizer` from `service` if present.
///
/// # Errors
///
/// Returns an error if the API patch operation fails.
pub async fn remove_finalizer(
    resources: &dyn TunnelResources,
    service: &Service,
    finalizer: &str,
) -> Result<()> {
    if !has_finalizer(service, finalizer) {
        return Ok(());
    }

    info!(
        "Removing finalizer {} from {}/{} Service",
        finalizer,
        service.namespace().unwrap_or_default(),
        service.name_any()
    );

    let finalizers = service
        .finalizers()
        .iter()
        .filter(|f| *f != finalizer)
        .cloned()
        .collect();

    resources
        .patch_service_finalizers(service, finalizers)
        .await?;

    Ok(())
}

/// Run `cleanup`, then remove `finalizer`. Does nothing if the finalizer is absent.
///
/// # Errors
///
/// Returns the cleanup error (finalizer kept) or the patch error.
pub async fn handle_deletion(
    resources: &dyn TunnelResources,
    service: &Service,
    finalizer: &str,
    cleanup: &dyn FinalizerCleanup,
) -> Result<()> {
    let namespace = service.namespace().unwrap_or_default();
    let name = service.name_any();

    info!("Service {}/{} is being deleted", namespace, name);

    if !has_finalizer(service, finalizer) {
        return Ok(());
    }

    info!("Running cleanup for Service {}/{}", namespace, name);

    if let Err(e) = cleanup.cleanup().await {
        warn!(
            service = %name,
            namespace = %namespace,
            error = %e,
            "Cleanup failed, keeping finalizer"
        );
        return Err(e);
    }

    remove_finalizer(resources, service, finalizer).await
}

/// Attach the finalizer, then make `hostname` resolve to the tunnel.
///
/// Returns the Service as stored after the finalizer patch.
///
/// # Errors
///
/// Returns the patch error, or the DNS provider error wrapped in [`Error::Upstream`].
pub async fn enter_managed(
    resources: &dyn TunnelResources,
    service: &Service,
    dns: &dyn DnsProvider,
    hostname: &str,
) -> Result<Service> {
    let service = ensure_finalizer(resources, service, FINALIZER_TUNNEL_SERVICE).await?;

    let result = dns.upsert_record(hostname).await;
    record_dns_operation("upsert", result.is_ok());
    result.map_err(Error::Upstream)?;

    info!(
        service = %service.name_any(),
        hostname = %hostname,
        "Ensured DNS record for Service"
    );

    Ok(service)
}

/// Delete the DNS record of `hostname`, then release the Service.
///
/// # Errors
///
/// Returns the DNS provider error (finalizer kept) or the patch error.
pub async fn leave_managed(
    resources: &dyn TunnelResources,
    service: &Service,
    dns: &dyn DnsProvider,
    hostname: &str,
) -> Result<()> {
    let cleanup = DnsRecordCleanup { dns, hostname };
    handle_deletion(resources, service, FINALIZER_TUNNEL_SERVICE, &cleanup).await
}

/// Remove a stale finalizer from a Service that is no longer routed through a tunnel.
///
/// # Errors
///
/// Returns an error if the API patch operation fails.
pub async fn cleanup_unmanaged(resources: &dyn TunnelResources, service: &Service) -> Result<()> {
    remove_finalizer(resources, service, FINALIZER_TUNNEL_SERVICE).await
}

#[cfg(test)]
#[path = "finalizers_tests.rs"]
mod finalizers_tests;
