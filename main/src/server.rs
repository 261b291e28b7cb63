use std::sync::Arc;

use api_router::{api_routes, api_state::ApiState};
use axum::Router;
use common::{storage::backend::IndexSetup, utils::config::get_config};
use doc_chat::{init_tracing, Runtime};
use ingestion_pipeline::IngestionConfig;
use tracing::info;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = get_config()?;
    let runtime = Runtime::connect(&config, IndexSetup::Connect).await?;

    let ingestion = Arc::new(runtime.ingestion_pipeline(&config, IngestionConfig::default()));
    let chat = Arc::new(runtime.chat_orchestrator(&config));
    let api_state = ApiState::new(config.clone(), ingestion, chat, Arc::clone(&runtime.index));

    let app = Router::new()
        .nest("/api", api_routes(&api_state))
        .with_state(api_state);

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
