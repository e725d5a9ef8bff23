// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS provider seam.
//!
//! The reconciler only needs two operations from a DNS provider: make a public
//! hostname resolve to the tunnel, and stop it from resolving. Provider errors are
//! returned verbatim. Credentials are per tunnel, so providers are obtained from a
//! [`DnsProviderFactory`] once the governing `Tunnel` is known.

use crate::crd::Tunnel;
use crate::errors::Result;

/// Creates and removes the public DNS record of a hostname.
#[async_trait::async_trait]
pub trait DnsProvider: Send + Sync {
    /// Create the record for `hostname`, or update it if it already exists.
    ///
    /// # Errors
    ///
    /// Returns the provider's error unmodified.
    async fn upsert_record(&self, hostname: &str) -> anyhow::Result<()>;

    /// Delete the record for `hostname`. A record that does not exist is not an error.
    ///
    /// # Errors
    ///
    /// Returns the provider's error unmodified.
    async fn delete_record(&self, hostname: &str) -> anyhow::Result<()>;
}

/// Builds a [`DnsProvider`] bound to the account and zone of a tunnel.
#[async_trait::async_trait]
pub trait DnsProviderFactory: Send + Sync {
    /// Provider for the records of `tunnel`.
    ///
    /// # Errors
    ///
    /// Returns an error if the tunnel's credentials or zone cannot be resolved.
    async fn provider_for(&self, tunnel: &Tunnel) -> Result<Box<dyn DnsProvider>>;
}
