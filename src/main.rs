use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod state;

use leafwiki_backend::config;
use state::AppState;

/// 版本信息 / Version and build info
async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "leafwiki-backend",
        "version": env!("CARGO_PKG_VERSION"),
        "build_time": env!("BUILD_TIME"),
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    config::init_config("config.json")?;
    let cfg = config::config();

    let state = Arc::new(AppState::from_config(&cfg)?);

    // 启动时做一次机会式一致性检查 / opportunistic consistency pass at startup
    {
        let index = state.index.clone();
        tokio::spawn(async move {
            match index.ensure_consistency().await {
                Ok(result) => tracing::info!(
                    "Startup consistency check: reason={}, rebuilt={}",
                    result.reason.as_str(),
                    result.rebuilt
                ),
                Err(e) => tracing::warn!("Startup consistency check failed: {}", e),
            }
        });
    }

    let app = Router::new()
        .route("/api/version", get(version))
        .route("/api/search", post(api::search::query::search))
        .route("/api/search/suggest", get(api::search::query::suggest))
        .route("/api/admin/index/rebuild", post(api::search::admin::rebuild_index))
        .route("/api/admin/index/status", get(api::search::admin::index_status))
        .route("/api/admin/index/info", get(api::search::admin::index_info))
        .route("/api/admin/index/consistency", post(api::search::admin::check_consistency))
        .route(
            "/api/articles",
            get(api::articles::list_articles).post(api::articles::create_article),
        )
        .route(
            "/api/articles/:slug",
            get(api::articles::get_article)
                .put(api::articles::update_article)
                .delete(api::articles::delete_article),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state);

    let addr = format!("{}:{}", cfg.server.host, cfg.server.port);
    tracing::info!("LeafWiki backend listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
