//! PixDrop server binary.
//!
//! This crate wires together the upload surfaces (single-shot multipart and
//! chunked base64), artifact serving, and the embedded upload page. The main
//! entry point builds the Axum router and starts the HTTP listener.

mod artifacts;
mod atomic;
mod background;
mod codec;
mod config;
mod error;
mod frontend;
mod http;
mod locking;
mod logging;
mod pending;
mod reassembly;
mod session;
mod storage;
mod upload;
mod version;

use axum::extract::{DefaultBodyLimit, Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::routing::{get, post};
use axum::{Router, middleware};
use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, info_span};

use crate::background::spawn_background_tasks;
use crate::config::Args;
use crate::http::build_cors_layer;
use crate::locking::LockManager;
use crate::pending::PendingStore;
use crate::storage::Storage;
use crate::upload::UploadConfig;

shadow!(build);

/// Starts the PixDrop server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    let storage = Arc::new(Storage::new(PathBuf::from(&args.data_dir)));
    storage.ensure_layout().await?;
    let pending = Arc::new(PendingStore::new(storage.scratch_dir()));
    let locks = Arc::new(LockManager::new());
    let upload_config = Arc::new(UploadConfig {
        max_upload_size: args.upload_max_size,
        pending_max: args.pending_max,
        pending_ttl: Duration::from_secs(args.pending_ttl_secs),
        public_base_url: args.public_base_url.clone(),
    });
    let pending_for_tasks = pending.clone();
    let upload_for_tasks = upload_config.clone();

    let single_shot_limit = if args.upload_max_size > 0 {
        // multipart framing overhead on top of the payload itself
        DefaultBodyLimit::max(args.upload_max_size.saturating_add(1024 * 1024) as usize)
    } else {
        DefaultBodyLimit::disable()
    };

    let mut app = Router::new()
        .route(
            "/api/upload",
            post(upload::upload_image).layer(single_shot_limit),
        )
        .route(
            "/api/upload/chunk",
            post(upload::submit_chunk).layer(DefaultBodyLimit::disable()),
        )
        .route("/api/artifacts", get(artifacts::list_artifacts))
        .route("/api/version", get(version::get_version_info))
        .route("/uploads/{name}", get(artifacts::download_artifact))
        .fallback(frontend::serve_frontend)
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let connect_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.ip());
                    let client_ip = http::resolve_client_ip(request.headers(), connect_ip)
                        .map(|ip| ip.to_string())
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(storage))
        .layer(Extension(pending))
        .layer(Extension(locks))
        .layer(Extension(upload_config));

    if let Some(cors_layer) = build_cors_layer(args.cors_origins.as_deref()) {
        app = app.layer(cors_layer);
    }

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let handle = Handle::new();

    info!("starting HTTP server at {}", addr);

    let server = axum_server::bind(addr)
        .handle(handle.clone())
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());

    spawn_background_tasks(pending_for_tasks, upload_for_tasks);
    tokio::select! {
        result = server => result?,
        _ = shutdown_signal(handle) => {}
    }

    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
