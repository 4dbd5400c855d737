use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use live_api::auth::tokens::JwtAuthenticator;
use live_api::auth::Authenticator;
use live_api::config::Config;
use live_api::membership::{HttpMembership, MemoryMembership, ProjectMembership};
use live_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let authenticator: Arc<dyn Authenticator> = Arc::new(JwtAuthenticator::from_config(&config));

    let membership: Arc<dyn ProjectMembership> = match &config.membership_url {
        Some(url) => {
            tracing::info!(%url, "using project service for membership checks");
            Arc::new(HttpMembership::new(url))
        }
        None => {
            tracing::warn!("MEMBERSHIP_URL not set; in-memory membership admits nobody");
            Arc::new(MemoryMembership::new())
        }
    };

    let state = AppState::new(config, authenticator, membership);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(live_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "live-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app).await.expect("server error");
}
