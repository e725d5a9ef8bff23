// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use axum::{http::StatusCode, routing::get, Router};
use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Service;
use kube::{
    runtime::{controller::Action, watcher::Config, Controller},
    Api, Client, ResourceExt,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};
use tunnel_operator::{
    cloudflare::CloudflareDnsFactory,
    constants::{
        DEFAULT_CLOUDFLARE_API_URL, DEFAULT_REQUEUE_DURATION_SECS, ERROR_REQUEUE_DURATION_SECS,
        KIND_SERVICE, METRICS_SERVER_BIND_ADDRESS, METRICS_SERVER_PATH, METRICS_SERVER_PORT,
        TOKIO_WORKER_THREADS,
    },
    context::{Context, KubeResources},
    metrics::{gather_metrics, record_reconciliation_error, record_reconciliation_success},
    reconcilers::{reconcile_service, RestartPolicy},
};

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ReconcileError(#[from] anyhow::Error);

/// Exposes annotated Services through a Cloudflare Tunnel.
#[derive(Parser, Debug)]
#[command(name = "tunnel-operator", author, version, about, long_about = None)]
struct Args {
    /// Base URL of the Cloudflare v4 API
    #[arg(long, env = "CLOUDFLARE_API_URL", default_value = DEFAULT_CLOUDFLARE_API_URL)]
    cloudflare_api_url: String,

    /// Port of the Prometheus metrics server
    #[arg(long, env = "METRICS_PORT", default_value_t = METRICS_SERVER_PORT)]
    metrics_port: u16,

    /// Bind address of the Prometheus metrics server
    #[arg(long, env = "METRICS_BIND_ADDRESS", default_value = METRICS_SERVER_BIND_ADDRESS)]
    metrics_bind_address: IpAddr,

    /// Only re-stamp the cloudflared Deployment when its configuration changed
    #[arg(long, env = "RESTART_ON_CHANGE_ONLY")]
    restart_on_change_only: bool,

    /// Seconds between periodic reconciliations of a healthy Service
    #[arg(long, env = "REQUEUE_SECS", default_value_t = DEFAULT_REQUEUE_DURATION_SECS)]
    requeue_secs: u64,
}

impl Args {
    fn restart_policy(&self) -> RestartPolicy {
        if self.restart_on_change_only {
            RestartPolicy::OnChange
        } else {
            RestartPolicy::Always
        }
    }

    fn metrics_addr(&self) -> SocketAddr {
        SocketAddr::new(self.metrics_bind_address, self.metrics_port)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("tunnel-operator")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    // Format: timestamp file:line LEVEL message
    //
    // Respects RUST_LOG (default INFO) and RUST_LOG_FORMAT=json|text
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        restart_policy = ?args.restart_policy(),
        "Starting tunnel operator"
    );

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let dns = CloudflareDnsFactory::new(client.clone(), args.cloudflare_api_url.clone())?;
    debug!(api_url = %args.cloudflare_api_url, "Cloudflare DNS provider configured");

    let ctx = Context {
        resources: Arc::new(KubeResources::new(client.clone())),
        dns: Arc::new(dns),
        restart_policy: args.restart_policy(),
        requeue_after: Duration::from_secs(args.requeue_secs),
    };

    // Neither task should exit; if one does, the process exits
    tokio::select! {
        result = run_service_controller(client, ctx) => {
            error!("CRITICAL: Service controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Service controller exited unexpectedly without error")
        }
        result = run_metrics_server(args.metrics_addr()) => {
            error!("CRITICAL: Metrics server exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Metrics server exited unexpectedly without error")
        }
        result = shutdown_signal() => {
            result?;
            info!("Shutdown complete");
            Ok(())
        }
    }
}

/// Run the `Service` controller
async fn run_service_controller(client: Client, ctx: Context) -> Result<()> {
    info!("Starting Service controller");

    let api = Api::<Service>::all(client);

    Controller::new(api, Config::default())
        .run(reconcile_service_wrapper, error_policy, Arc::new(ctx))
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

async fn reconcile_service_wrapper(
    service: Arc<Service>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let namespace = service.namespace().unwrap_or_default();
    let name = service.name_any();

    match reconcile_service(&ctx, (*service).clone()).await {
        Ok(()) => {
            record_reconciliation_success(start.elapsed());
            debug!(kind = KIND_SERVICE, namespace = %namespace, name = %name, "Reconciliation finished");
            Ok(Action::requeue(ctx.requeue_after))
        }
        Err(e) => {
            record_reconciliation_error(e.metric_label(), start.elapsed());
            error!(
                kind = KIND_SERVICE,
                namespace = %namespace,
                name = %name,
                reason = e.metric_label(),
                "Failed to reconcile: {}",
                e
            );
            Err(ReconcileError(e.into()))
        }
    }
}

fn error_policy(_resource: Arc<Service>, _err: &ReconcileError, _ctx: Arc<Context>) -> Action {
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}

/// Serve the Prometheus registry
async fn run_metrics_server(addr: SocketAddr) -> Result<()> {
    let app = Router::new().route(METRICS_SERVER_PATH, get(metrics_handler));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, path = METRICS_SERVER_PATH, "Metrics server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

async fn metrics_handler() -> (StatusCode, String) {
    match gather_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Resolve on SIGINT, or SIGTERM on Unix
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received SIGINT, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received SIGINT, shutting down");
    }

    Ok(())
}
