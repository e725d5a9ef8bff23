// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cloudflare DNS provider.
//!
//! Public hostnames are proxied CNAME records pointing at
//! `<tunnel id>.cfargotunnel.com` in the zone of the tunnel's domain. The API
//! token comes from the Secret named in the `Tunnel` spec. Rate limiting and
//! server errors are retried with [`http_backoff`]; all other failures are
//! returned as-is.

use crate::constants::{
    CLOUDFLARE_AUTO_TTL, CLOUDFLARE_RECORD_COMMENT, CLOUDFLARE_REQUEST_TIMEOUT_SECS,
};
use crate::crd::Tunnel;
use crate::dns::{DnsProvider, DnsProviderFactory};
use crate::errors::{Error, Result};
use crate::reconcilers::retry::{http_backoff, is_retryable_http_status};
use anyhow::{anyhow, Context as _};
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client, ResourceExt};
use reqwest::{Client as HttpClient, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use url::Url;

/// HTTP error with status code for retry logic.
#[derive(Debug)]
struct HttpError {
    status: StatusCode,
    message: String,
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP {}: {}", self.status, self.message)
    }
}

impl std::error::Error for HttpError {}

/// Standard Cloudflare v4 response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
}

/// A DNS record as returned by the API.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct DnsRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub proxied: bool,
}

/// Body of a CNAME create or update.
#[derive(Debug, Serialize)]
struct CnameRecord<'a> {
    #[serde(rename = "type")]
    record_type: &'static str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
    proxied: bool,
    comment: &'static str,
}

/// Build a URL under `base`, trimming any trailing slash.
fn api_url(base: &str, path: &str, query: &[(&str, &str)]) -> anyhow::Result<Url> {
    let raw = format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));
    if query.is_empty() {
        Url::parse(&raw).with_context(|| format!("Invalid Cloudflare API URL {raw}"))
    } else {
        Url::parse_with_params(&raw, query)
            .with_context(|| format!("Invalid Cloudflare API URL {raw}"))
    }
}

/// Execute a Cloudflare API request with automatic retry.
///
/// # Retry Behavior
/// - Retries on HTTP 429, 500, 502, 503, 504 and on connection failures
/// - Fails immediately on other 4xx errors
///
/// # Errors
///
/// Returns an error if the request fails after all retries, encounters a
/// non-retryable error, or the API reports `success: false`.
async fn cloudflare_request<T: DeserializeOwned, B: Serialize + std::fmt::Debug + Sync>(
    http: &HttpClient,
    token: &str,
    method: Method,
    url: &Url,
    body: Option<&B>,
) -> anyhow::Result<Option<T>> {
    let mut backoff = http_backoff();
    let start_time = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;

        let e = match cloudflare_request_internal(http, token, method.clone(), url, body).await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        method = %method,
                        url = %url,
                        attempt = attempt,
                        elapsed = ?start_time.elapsed(),
                        "Cloudflare API call succeeded after retries"
                    );
                }
                return Ok(result);
            }
            Err(e) => e,
        };

        let is_retryable = match e.downcast_ref::<HttpError>() {
            Some(http_err) => is_retryable_http_status(http_err.status),
            None => e
                .downcast_ref::<reqwest::Error>()
                .is_some_and(|re| re.is_connect() || re.is_timeout()),
        };

        if !is_retryable {
            error!(
                method = %method,
                url = %url,
                error = %e,
                "Non-retryable Cloudflare API error, failing immediately"
            );
            return Err(e);
        }

        match backoff.next_backoff() {
            Some(duration) => {
                warn!(
                    method = %method,
                    url = %url,
                    attempt = attempt,
                    retry_after = ?duration,
                    error = %e,
                    "Retryable Cloudflare API error, will retry"
                );
                tokio::time::sleep(duration).await;
            }
            None => {
                error!(
                    method = %method,
                    url = %url,
                    attempt = attempt,
                    elapsed = ?start_time.elapsed(),
                    error = %e,
                    "Backoff exhausted, giving up"
                );
                return Err(anyhow!("Backoff exhausted after {attempt} attempts: {e}"));
            }
        }
    }
}

async fn cloudflare_request_internal<T: DeserializeOwned, B: Serialize + std::fmt::Debug>(
    http: &HttpClient,
    token: &str,
    method: Method,
    url: &Url,
    body: Option<&B>,
) -> anyhow::Result<Option<T>> {
    debug!(method = %method, url = %url, body = ?body, "Cloudflare API request");

    let mut request = http.request(method, url.clone()).bearer_auth(token);
    if let Some(body) = body {
        request = request.json(body);
    }

    // Connection errors are kept as `reqwest::Error` so the caller can retry them.
    let response = request.send().await?;
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    if !status.is_success() {
        return Err(HttpError {
            status,
            message: text,
        }
        .into());
    }

    let envelope: Envelope<T> = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse Cloudflare response from {url}"))?;

    if !envelope.success {
        let messages: Vec<String> = envelope
            .errors
            .iter()
            .map(|m| format!("{}: {}", m.code, m.message))
            .collect();
        anyhow::bail!("Cloudflare API error: {}", messages.join(", "));
    }

    Ok(envelope.result)
}

/// Cloudflare API client bound to one zone and one tunnel.
#[derive(Clone, Debug)]
pub struct CloudflareApi {
    http: HttpClient,
    base_url: String,
    token: String,
    zone_id: String,
    cname_target: String,
}

impl CloudflareApi {
    #[must_use]
    pub fn new(
        http: HttpClient,
        base_url: impl Into<String>,
        token: impl Into<String>,
        zone_id: impl Into<String>,
        cname_target: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            token: token.into(),
            zone_id: zone_id.into(),
            cname_target: cname_target.into(),
        }
    }

    /// Id of the zone named `domain`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails or no zone has that name.
    pub async fn lookup_zone_id(
        http: &HttpClient,
        base_url: &str,
        token: &str,
        domain: &str,
    ) -> anyhow::Result<String> {
        let url = api_url(base_url, "zones", &[("name", domain)])?;
        let zones: Vec<Zone> = cloudflare_request(http, token, Method::GET, &url, None::<&()>)
            .await?
            .unwrap_or_default();

        zones
            .into_iter()
            .next()
            .map(|z| z.id)
            .ok_or_else(|| anyhow!("no Cloudflare zone found for domain {domain}"))
    }

    /// CNAME records named `hostname`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn find_cnames(&self, hostname: &str) -> anyhow::Result<Vec<DnsRecord>> {
        let url = api_url(
            &self.base_url,
            &format!("zones/{}/dns_records", self.zone_id),
            &[("type", "CNAME"), ("name", hostname)],
        )?;
        Ok(
            cloudflare_request(&self.http, &self.token, Method::GET, &url, None::<&()>)
                .await?
                .unwrap_or_default(),
        )
    }

    fn record_body<'a>(&'a self, hostname: &'a str) -> CnameRecord<'a> {
        CnameRecord {
            record_type: "CNAME",
            name: hostname,
            content: &self.cname_target,
            ttl: CLOUDFLARE_AUTO_TTL,
            proxied: true,
            comment: CLOUDFLARE_RECORD_COMMENT,
        }
    }
}

#[async_trait::async_trait]
impl DnsProvider for CloudflareApi {
    async fn upsert_record(&self, hostname: &str) -> anyhow::Result<()> {
        let existing = self.find_cnames(hostname).await?;
        let body = self.record_body(hostname);

        match existing.first() {
            Some(record) if record.content == self.cname_target && record.proxied => {
                debug!(hostname = %hostname, "CNAME already points at tunnel");
            }
            Some(record) => {
                let url = api_url(
                    &self.base_url,
                    &format!("zones/{}/dns_records/{}", self.zone_id, record.id),
                    &[],
                )?;
                cloudflare_request::<DnsRecord, _>(
                    &self.http,
                    &self.token,
                    Method::PUT,
                    &url,
                    Some(&body),
                )
                .await?;
                info!(hostname = %hostname, target = %self.cname_target, "Updated CNAME record");
            }
            None => {
                let url = api_url(
                    &self.base_url,
                    &format!("zones/{}/dns_records", self.zone_id),
                    &[],
                )?;
                cloudflare_request::<DnsRecord, _>(
                    &self.http,
                    &self.token,
                    Method::POST,
                    &url,
                    Some(&body),
                )
                .await?;
                info!(hostname = %hostname, target = %self.cname_target, "Created CNAME record");
            }
        }

        Ok(())
    }

    async fn delete_record(&self, hostname: &str) -> anyhow::Result<()> {
        for record in self.find_cnames(hostname).await? {
            let url = api_url(
                &self.base_url,
                &format!("zones/{}/dns_records/{}", self.zone_id, record.id),
                &[],
            )?;

            let result = cloudflare_request::<serde_json::Value, ()>(
                &self.http,
                &self.token,
                Method::DELETE,
                &url,
                None,
            )
            .await;

            match result {
                Ok(_) => info!(hostname = %hostname, id = %record.id, "Deleted CNAME record"),
                Err(e)
                    if e.downcast_ref::<HttpError>()
                        .is_some_and(|h| h.status == StatusCode::NOT_FOUND) =>
                {
                    debug!(hostname = %hostname, id = %record.id, "CNAME record already gone");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}

/// Builds [`CloudflareApi`] clients from `Tunnel` credentials.
#[derive(Clone)]
pub struct CloudflareDnsFactory {
    client: Client,
    http: HttpClient,
    base_url: String,
}

impl CloudflareDnsFactory {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(client: Client, base_url: impl Into<String>) -> anyhow::Result<Self> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(CLOUDFLARE_REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build Cloudflare HTTP client")?;

        Ok(Self {
            client,
            http,
            base_url: base_url.into(),
        })
    }

    async fn api_token(&self, tunnel: &Tunnel) -> anyhow::Result<String> {
        let namespace = tunnel.namespace().unwrap_or_default();
        let secret_name = &tunnel.spec.cloudflare.secret;
        let key = tunnel.api_token_key();

        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        let secret = secrets
            .get(secret_name)
            .await
            .with_context(|| format!("Failed to read Secret {namespace}/{secret_name}"))?;

        let value = secret
            .data
            .as_ref()
            .and_then(|data| data.get(key))
            .ok_or_else(|| anyhow!("key {key} not found in Secret {namespace}/{secret_name}"))?;

        String::from_utf8(value.0.clone())
            .map(|token| token.trim().to_string())
            .with_context(|| format!("key {key} in Secret {namespace}/{secret_name} is not UTF-8"))
    }
}

#[async_trait::async_trait]
impl DnsProviderFactory for CloudflareDnsFactory {
    async fn provider_for(&self, tunnel: &Tunnel) -> Result<Box<dyn DnsProvider>> {
        let cname_target = tunnel.cname_target().ok_or_else(|| Error::TunnelNotReady {
            namespace: tunnel.namespace().unwrap_or_default(),
            name: tunnel.name_any(),
        })?;

        let token = self.api_token(tunnel).await?;

        let zone_id = match tunnel.zone_id() {
            Some(id) => id.to_string(),
            None => {
                CloudflareApi::lookup_zone_id(&self.http, &self.base_url, &token, tunnel.domain())
                    .await?
            }
        };

        Ok(Box::new(CloudflareApi::new(
            self.http.clone(),
            self.base_url.clone(),
            token,
            zone_id,
            cname_target,
        )))
    }
}

#[cfg(test)]
#[path = "cloudflare_tests.rs"]
mod cloudflare_tests;
