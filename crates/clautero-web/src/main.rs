use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::routing::get;

use clautero_core::config_file;
use clautero_core::library::ZoteroClient;
use clautero_core::summarize::summarizer_from_config;
use clautero_core::{Config, Workflow};
use clautero_pdf_mupdf::MupdfBackend;

mod handlers;
mod state;

use state::AppState;

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ping/", get(handlers::ping::ping))
        .route("/add_missing_tags/", get(handlers::tags::add_missing_tags))
        .route("/summarize/", get(handlers::summarize::summarize))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let file = config_file::apply_env(config_file::load_config()?)?;
    let config = Config::from_file(file)?;
    clautero_core::logging::init(&config.log_path, &config.log_level)
        .with_context(|| format!("cannot open log file {}", config.log_path.display()))?;

    let library = ZoteroClient::new(
        &config.zotero_base_url,
        config.zotero_user_id,
        &config.zotero_api_key,
    )?;
    let summarizer = summarizer_from_config(&config)?;
    let workflow = Workflow::from_config(
        &config,
        Arc::new(library),
        summarizer,
        Arc::new(MupdfBackend::new()),
    );

    let state = Arc::new(AppState {
        workflow: Arc::new(workflow),
    });
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .with_context(|| format!("invalid listen address {}", config.server_host))?;
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
