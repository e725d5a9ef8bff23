// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Label selector construction for Service → Tunnel matching.
//!
//! A Service never references its `Tunnel` directly. Instead its annotations are
//! turned into a label selector plus an optional namespace scope, and the `Tunnel`
//! and cloudflared `ConfigMap` are found by listing with that selector. The same
//! type describes the reverse lookup (every Service routed through one tunnel),
//! which is keyed on the labels the reconciler stamps onto Services.
//!
//! # Namespace Scope
//!
//! | `…/ns` annotation | Namespace scope     | `…/ns` label required |
//! |-------------------|---------------------|-----------------------|
//! | absent / `"true"` | Service namespace   | Service namespace     |
//! | `"false"`         | none (all)          | none                  |
//! | anything else     | the value           | the value             |
//!
//! With `"false"` the first resource returned by the list wins. Which one that is
//! depends on the API server's ordering.

use crate::crd::Tunnel;
use crate::errors::{Error, Result};
use crate::labels::{
    NS_SCOPE_ANY, NS_SCOPE_OWN, TUNNEL_CR_ANNOTATION, TUNNEL_ID_ANNOTATION,
    TUNNEL_NAME_ANNOTATION, TUNNEL_NS_ANNOTATION,
};
use k8s_openapi::api::core::v1::Service;
use kube::api::ListParams;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::fmt;

/// Annotations that mark a Service as routed through a tunnel.
const TARGETING_ANNOTATIONS: [&str; 3] = [
    TUNNEL_ID_ANNOTATION,
    TUNNEL_NAME_ANNOTATION,
    TUNNEL_CR_ANNOTATION,
];

/// Equality-based label selector with an optional namespace scope.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TunnelSelector {
    /// Labels that must all be present with these exact values
    pub match_labels: BTreeMap<String, String>,

    /// Namespace to list in; `None` lists across all namespaces
    pub namespace: Option<String>,
}

impl TunnelSelector {
    /// Render the labels in Kubernetes selector syntax (`k1=v1,k2=v2`).
    #[must_use]
    pub fn label_selector(&self) -> String {
        self.match_labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// List parameters selecting on [`Self::label_selector`].
    #[must_use]
    pub fn list_params(&self) -> ListParams {
        ListParams::default().labels(&self.label_selector())
    }

    /// Whether a resource in `namespace` with `labels` is selected.
    #[must_use]
    pub fn matches(&self, namespace: Option<&str>, labels: &BTreeMap<String, String>) -> bool {
        if let Some(scope) = self.namespace.as_deref() {
            if namespace != Some(scope) {
                return false;
            }
        }

        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
    }
}

impl fmt::Display for TunnelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} in namespace {ns}", self.label_selector()),
            None => write!(f, "{} in all namespaces", self.label_selector()),
        }
    }
}

/// Whether the Service carries at least one tunnel targeting annotation.
#[must_use]
pub fn has_targeting_annotations(service: &Service) -> bool {
    let annotations = service.annotations();
    TARGETING_ANNOTATIONS
        .iter()
        .any(|key| annotations.contains_key(*key))
}

/// Build the selector locating the `Tunnel` and `ConfigMap` that govern a Service.
///
/// # Errors
///
/// Returns [`Error::NoAnnotations`] when none of the targeting annotations are present.
pub fn selector_for_service(service: &Service) -> Result<TunnelSelector> {
    let annotations = service.annotations();
    let service_namespace = service.namespace().unwrap_or_default();

    if !has_targeting_annotations(service) {
        return Err(Error::NoAnnotations {
            namespace: service_namespace,
            name: service.name_any(),
        });
    }

    let mut selector = TunnelSelector::default();
    for key in TARGETING_ANNOTATIONS {
        if let Some(value) = annotations.get(key) {
            selector.match_labels.insert(key.to_string(), value.clone());
        }
    }

    let scope = match annotations.get(TUNNEL_NS_ANNOTATION).map(String::as_str) {
        None | Some(NS_SCOPE_OWN) => Some(service_namespace),
        Some(NS_SCOPE_ANY) => None,
        Some(other) => Some(other.to_string()),
    };

    if let Some(ns) = scope {
        selector
            .match_labels
            .insert(TUNNEL_NS_ANNOTATION.to_string(), ns.clone());
        // An empty namespace lists across all namespaces; the label still applies.
        selector.namespace = Some(ns).filter(|ns| !ns.is_empty());
    }

    Ok(selector)
}

/// Build the selector listing every Service routed through `tunnel`.
///
/// Matches the `…/ns` and `…/cr` labels stamped on Services, in any namespace.
#[must_use]
pub fn selector_for_tunnel_members(tunnel: &Tunnel) -> TunnelSelector {
    TunnelSelector {
        match_labels: BTreeMap::from([
            (
                TUNNEL_NS_ANNOTATION.to_string(),
                tunnel.namespace().unwrap_or_default(),
            ),
            (TUNNEL_CR_ANNOTATION.to_string(), tunnel.name_any()),
        ]),
        namespace: None,
    }
}

#[cfg(test)]
#[path = "selector_tests.rs"]
mod selector_tests;
