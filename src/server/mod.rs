use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, MethodRouter};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::errors::ApiError;
use crate::generate::{Generator, Settings};
use crate::provider::DynProvider;
use crate::store::{DynBlobs, DynStore};

mod handlers;
mod upload;

/// Process-lifetime handles shared by every request. Nothing in here is
/// mutated after startup.
#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<Generator>,
    pub provider: DynProvider,
    pub store: DynStore,
    pub blobs: DynBlobs,
    pub http: reqwest::Client,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, provider: DynProvider, store: DynStore, blobs: DynBlobs) -> anyhow::Result<Self> {
        let generator = Generator::new(provider.clone(), store.clone(), Settings::from_config(&config));
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            generator: Arc::new(generator),
            provider,
            store,
            blobs,
            http,
            config: Arc::new(config),
        })
    }
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Every endpoint answers other methods with a JSON 405.
fn only<S: Clone + Send + Sync + 'static>(route: MethodRouter<S>) -> MethodRouter<S> {
    route.fallback(method_not_allowed)
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/api/generate", only(post(handlers::generate)))
        .route("/api/personalize", only(post(handlers::personalize)))
        .route("/api/scan-brand", only(post(handlers::scan_brand)))
        .route("/api/get-inspiration", only(get(handlers::get_inspiration)))
        .route("/api/saveProject", only(post(handlers::save_project)))
        .route("/api/getProjects", only(get(handlers::get_projects)))
        .route("/api/deleteProject", only(post(handlers::delete_project)))
        .route("/api/uploadToKnowledgeBase", only(post(handlers::upload_to_knowledge_base)))
        .route("/api/getKnowledgeBaseFiles", only(get(handlers::get_knowledge_base_files)))
        .route("/api/deleteKnowledgeBaseFile", only(post(handlers::delete_knowledge_base_file)))
        .route("/api/uploadLogo", only(post(handlers::upload_logo)))
        .route("/api/deleteLogo", only(post(handlers::delete_logo)))
        .route("/api/uploadImage", only(post(handlers::upload_image)))
        .route("/api/updateColorPalette", only(post(handlers::update_color_palette)))
        .route("/api/updateFontPair", only(post(handlers::update_font_pair)))
        .route("/api/startTrial", only(post(handlers::start_trial)))
        .route("/api/toggleMarketingRule", only(post(handlers::toggle_marketing_rule)))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let bind = state.config.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .map_err(|e| anyhow::anyhow!("binding {bind}: {e}"))?;
    tracing::info!(%bind, "zoltrak listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "could not listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutdown requested");
        })
        .await?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::provider::scripted::ScriptedProvider;
    use crate::store::memory::MemoryStore;

    pub fn state(provider: &Arc<ScriptedProvider>, store: &Arc<MemoryStore>) -> AppState {
        state_with(Config::default(), provider, store)
    }

    pub fn state_with(config: Config, provider: &Arc<ScriptedProvider>, store: &Arc<MemoryStore>) -> AppState {
        AppState::new(config, provider.clone(), store.clone(), store.clone()).expect("test state")
    }
}
