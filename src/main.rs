use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use vidgrab::config::AppConfig;
use vidgrab::state::AppState;
use vidgrab::{routes_downloads, routes_files};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env()?;

    std::fs::create_dir_all(&cfg.downloads_dir)
        .with_context(|| format!("failed to create downloads dir {:?}", cfg.downloads_dir))?;
    info!(dir = ?cfg.downloads_dir, "downloads directory ready");

    let app_state = Arc::new(AppState::new(cfg.clone()));

    // The browser player issues cross-origin Range requests, so the range
    // headers must be exposed explicitly.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::RANGE])
        .expose_headers([
            header::CONTENT_RANGE,
            header::CONTENT_LENGTH,
            header::ACCEPT_RANGES,
        ]);

    let app = Router::new()
        .route("/download", post(routes_downloads::start_download))
        .route("/progress/:download_id", get(routes_downloads::get_progress))
        .route(
            "/cancel-download/:download_id",
            post(routes_downloads::cancel_download),
        )
        .route("/downloads", get(routes_files::list_downloads))
        .route("/downloads/:filename", get(routes_files::stream_video))
        .route("/check-video/:filename", get(routes_files::check_video))
        .route("/delete-video/:filename", delete(routes_files::delete_video))
        .layer(cors)
        .with_state(app_state);

    let addr = &cfg.bind_addr;
    println!("vidgrab listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
