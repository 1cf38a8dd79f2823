use anyhow::Context;
use clap::Parser;
use std::sync::Arc;

mod brand;
mod cli;
mod config;
mod errors;
mod export;
mod generate;
mod knowledge;
mod log;
mod personalize;
mod prompt;
mod provider;
mod quickstart;
mod reply;
mod server;
mod store;
mod templates;
mod wire;

use store::{DynBlobs, DynStore};

/// Supabase when both the URL and the service key are present; otherwise an
/// in-process store that forgets everything on exit.
fn make_backend(cfg: &config::Config) -> anyhow::Result<(DynStore, DynBlobs)> {
    let key = std::env::var("SUPABASE_SERVICE_ROLE_KEY").ok().filter(|k| !k.trim().is_empty());
    match (&cfg.supabase_url, key) {
        (Some(url), Some(key)) => {
            let backend = Arc::new(
                store::supabase::SupabaseStore::new(url.clone(), key, cfg.timeout_secs)
                    .context("building supabase client")?,
            );
            tracing::info!(%url, "using supabase backend");
            Ok((backend.clone(), backend))
        }
        (url, key) => {
            if url.is_some() || key.is_some() {
                tracing::warn!("SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY must both be set; falling back to memory");
            } else {
                tracing::warn!("no supabase configured; data lives in memory only");
            }
            let backend = Arc::new(store::memory::MemoryStore::new());
            Ok((backend.clone(), backend))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = cli::Args::parse();
    log::init(args.debug);

    let cfg = config::Config::load(&args)?;
    tracing::debug!(?cfg, "configuration loaded");

    let provider = provider::make_provider(&cfg)?;
    let (store, blobs) = make_backend(&cfg)?;

    let state = server::AppState::new(cfg, provider, store, blobs)?;
    server::serve(state).await
}
