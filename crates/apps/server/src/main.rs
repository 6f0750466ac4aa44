use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use streaming::{Dataset, FacilitySource, HttpSource, MemorySource, SessionConfig};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod ws;

use config::{ServerConfig, SourceConfig};

#[derive(Clone)]
struct AppState {
    source: Arc<dyn FacilitySource>,
    session: SessionConfig,
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    source: String,
    version: &'static str,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::from_env()?;
    let source = build_source(&config.source).await?;

    let state = AppState {
        source,
        session: config.session.clone(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods([Method::GET, Method::OPTIONS]);

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_upgrade))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("playmap server listening on http://{}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn build_source(
    config: &SourceConfig,
) -> Result<Arc<dyn FacilitySource>, Box<dyn std::error::Error + Send + Sync>> {
    match config {
        SourceConfig::Backend {
            base_url,
            http_timeout,
        } => {
            let client = reqwest::Client::builder().timeout(*http_timeout).build()?;
            info!("using facility backend at {base_url}");
            Ok(Arc::new(HttpSource::with_client(client, base_url)?))
        }
        SourceConfig::Demo { file: Some(path) } => {
            let bytes = tokio::fs::read(path).await?;
            let dataset = Dataset::from_json(&bytes)?;
            info!(
                facilities = dataset.facilities.len(),
                rides = dataset.rides.len(),
                "serving demo data from {}",
                path.display()
            );
            Ok(Arc::new(MemorySource::from_dataset(dataset)))
        }
        SourceConfig::Demo { file: None } => {
            warn!("neither PLAYMAP_BACKEND_URL nor PLAYMAP_DEMO_FILE set; serving no facilities");
            Ok(Arc::new(MemorySource::from_dataset(Dataset::default())))
        }
    }
}

async fn healthz(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        source: state.source.name().to_string(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| ws::handle_ws_connection(socket, state.source, state.session))
        .into_response()
}
