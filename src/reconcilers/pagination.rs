// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Paginated listing by [`TunnelSelector`].
//!
//! Member Services are listed cluster-wide, so a large cluster can return many
//! objects for one tunnel. Lists are fetched in pages of [`KUBE_LIST_PAGE_SIZE`].

use crate::constants::KUBE_LIST_PAGE_SIZE;
use crate::selector::TunnelSelector;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

/// API handle scoped the way `selector` asks: one namespace, or all of them.
#[must_use]
pub fn scoped_api<K>(client: &Client, selector: &TunnelSelector) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = kube::core::NamespaceResourceScope>,
{
    match selector.namespace.as_deref() {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}

/// List every object matching `selector`, following continue tokens.
///
/// Items are returned in the order the API server produced them.
///
/// # Errors
///
/// Returns the Kubernetes API error of the first failing page.
pub async fn list_matching<K>(api: &Api<K>, selector: &TunnelSelector) -> kube::Result<Vec<K>>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    let mut list_params = selector.list_params().limit(KUBE_LIST_PAGE_SIZE);

    let mut all_items = Vec::new();
    let mut page_count = 0;

    loop {
        page_count += 1;
        let result = api.list(&list_params).await?;

        let item_count = result.items.len();
        all_items.extend(result.items);

        debug!(
            kind = %K::kind(&()),
            selector = %selector,
            page = page_count,
            items_in_page = item_count,
            total_items = all_items.len(),
            "Fetched page from Kubernetes API"
        );

        match result.metadata.continue_ {
            Some(token) if !token.is_empty() => list_params.continue_token = Some(token),
            _ => break,
        }
    }

    Ok(all_items)
}

#[cfg(test)]
#[path = "pagination_tests.rs"]
mod pagination_tests;
