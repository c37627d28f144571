use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::bail;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use queue_cell::{ClinicScheduler, MemoryStore, QueueCellState, SchedulingStore, SupabaseStore, SystemClock};
use shared_config::{AppConfig, StoreBackend};
use shared_database::SupabaseClient;

fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn SchedulingStore>> {
    match config.store_backend {
        StoreBackend::Memory => {
            info!("Using in-memory scheduling store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Supabase => {
            if !config.is_configured() {
                bail!("SCHEDULING_STORE=supabase requires SUPABASE_URL and SUPABASE_ANON_PUBLIC_KEY");
            }
            info!("Using Supabase scheduling store at {}", config.supabase_url);
            let client = Arc::new(SupabaseClient::new(config));
            Ok(Arc::new(SupabaseStore::new(client)))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic queue API server");

    let config = AppConfig::from_env();
    let store = build_store(&config)?;

    let scheduler = Arc::new(ClinicScheduler::new(store));
    let state = Arc::new(QueueCellState::new(scheduler, Arc::new(SystemClock)));

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
