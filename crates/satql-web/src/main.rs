//! satql web server
//!
//! Wires the pipeline together and serves the question-to-answer API:
//! schema catalog and executor against Postgres, LLM clients from the
//! configured backend, and the repair loop on top.

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use satql::api::{create_api_router, ApiState};
use satql::{
    AppConfig, ClientSet, QueryPipeline, ReadOnlyExecutor, ResultSummarizer, SchemaCatalog,
    SchemaSource, SqlGenerator,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env before anything reads the environment
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "satql=debug,satql_web=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Configuration error: {}", e);
            return Err(format!("Configuration error: {}", e).into());
        }
    };

    tracing::info!("Starting satql web server");

    let pool = match PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(&config.database.url)
        .await
    {
        Ok(p) => {
            tracing::info!("Database connection established");
            p
        }
        Err(e) => {
            tracing::error!("Failed to connect to database: {}", e);
            tracing::error!(
                "Please check DATABASE_URL environment variable and ensure PostgreSQL is running"
            );
            return Err(format!("Database connection failed: {}", e).into());
        }
    };

    let catalog = Arc::new(SchemaCatalog::new(pool.clone(), config.catalog.cache_ttl()));
    let clients = Arc::new(ClientSet::from_config(&config.llm));
    let generator = Arc::new(SqlGenerator::new(Arc::clone(&clients)));
    let executor = Arc::new(ReadOnlyExecutor::new(
        pool.clone(),
        config.executor.max_rows,
        config.executor.statement_timeout_ms,
    ));
    let summarizer = Arc::new(ResultSummarizer::new(Arc::clone(&clients)));
    let pipeline = Arc::new(QueryPipeline::new(
        Arc::clone(&catalog) as Arc<dyn SchemaSource>,
        generator,
        executor,
        summarizer,
        config.pipeline.clone(),
    ));

    let state = ApiState::new(pipeline, Arc::clone(&catalog), Arc::clone(&clients));
    let app = create_api_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

    tracing::info!("");
    tracing::info!("===========================================");
    tracing::info!("  satql server running on http://{}", addr);
    tracing::info!("===========================================");
    tracing::info!("");
    tracing::info!("API Endpoints:");
    tracing::info!("  POST /api/run     - Answer a question over the catalog");
    tracing::info!("  GET  /api/schema  - Current schema snapshot");
    tracing::info!("  GET  /health      - Health and configured backend");
    tracing::info!("");
    tracing::info!(
        "LLM backend: {} ({})",
        clients.default_client().backend_name(),
        clients.default_client().model_name()
    );

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            if e.kind() == std::io::ErrorKind::AddrInUse {
                tracing::error!("Port {} is already in use", config.server.port);
            }
            return Err(format!("Failed to bind to {}: {}", addr, e).into());
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        return Err(format!("Server error: {}", e).into());
    }

    Ok(())
}
