use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::{AppointmentLifecycleService, SchedulingRules};
use reminder_cell::{
    DispatcherConfig, LogNotifier, ReminderDispatcher, ReminderPlanner, ReminderState,
    ReminderWorkerService, WorkerConfig,
};
use shared_config::AppConfig;
use shared_database::{InMemoryRepository, Repository, RowLocks, SupabaseRepository};
use shared_utils::time::{Clock, SystemClock};

use crate::router::AppServices;

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

    info!("Starting Clinic API server");

    let config = AppConfig::from_env();

    let repository: Arc<dyn Repository> = if config.is_supabase_configured() {
        info!("Using Supabase repository at {}", config.supabase_url);
        Arc::new(SupabaseRepository::new(&config))
    } else {
        warn!("Supabase is not configured, data will only live in memory");
        Arc::new(InMemoryRepository::new())
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let locks = Arc::new(RowLocks::new());

    let appointments = Arc::new(AppointmentLifecycleService::new(
        Arc::clone(&repository),
        Arc::clone(&clock),
        Arc::clone(&locks),
        ReminderPlanner::from_config(&config),
        SchedulingRules::from_config(&config),
    ));

    let dispatcher = Arc::new(ReminderDispatcher::new(
        repository,
        Arc::new(LogNotifier::new()),
        clock,
        locks,
        DispatcherConfig::from_app_config(&config),
    ));
    let worker = Arc::new(ReminderWorkerService::new(
        WorkerConfig::from_app_config(&config),
        Arc::clone(&dispatcher),
    ));

    let background = Arc::clone(&worker);
    let worker_handle = tokio::spawn(async move { background.start().await });

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(AppServices {
        appointments,
        reminders: Arc::new(ReminderState {
            dispatcher,
            worker: Arc::clone(&worker),
        }),
    })
    .layer(
        TraceLayer::new_for_http()
            .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
            .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
    )
    .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    worker.shutdown().await;
    worker_handle.await.context("reminder worker panicked")?;

    info!("Clinic API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
