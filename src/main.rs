//! Pomodoro Keeper - a Pomodoro countdown host with redundant timing
//!
//! This is the main entry point for the pomodoro-keeper application.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use pomodoro_keeper::{
    alarms::{AlarmDispatcher, TokioAlarmBackend},
    api::create_router,
    clock::{Clock, SystemClock},
    config::Config,
    state::AppState,
    tasks::completion_listener_task,
    utils::shutdown_signal,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("pomodoro_keeper={},tower_http=info", config.log_level()))
        .init();

    let redundancy = config.redundancy();
    let durations = config.cycle_durations();

    info!("Starting pomodoro-keeper v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration: host={}, port={}, work={}min, break={}min, long break={}min every {}",
        config.host,
        config.port,
        config.work_minutes,
        config.break_minutes,
        config.long_break_minutes,
        config.long_break_interval
    );
    info!(
        "Redundancy: safety margin={}ms, health check every {}ms, failover after {}ms",
        redundancy.safety_margin_ms,
        redundancy.health_check_interval_ms,
        redundancy.failover_timeout_ms
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let dispatcher = AlarmDispatcher::global();
    let backend = Arc::new(TokioAlarmBackend::new(clock.clone(), dispatcher.clone()));

    // Create application state
    let state = Arc::new(AppState::assemble(
        clock,
        redundancy,
        durations,
        backend,
        &dispatcher,
        config.port,
        config.host.clone(),
    ));

    // Start the completion listener background task
    let listener_state = Arc::clone(&state);
    tokio::spawn(async move {
        completion_listener_task(listener_state).await;
    });

    // Create HTTP router with all endpoints
    let app = create_router(state.clone());

    // Bind to the specified address
    let addr = config.address();
    let listener = TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);
    info!("Endpoints:");
    info!("  POST /start       - Start a session (optional cycle, duration_ms)");
    info!("  POST /pause       - Pause the running session");
    info!("  POST /resume      - Resume the paused session");
    info!("  POST /stop        - Stop the session");
    info!("  GET  /status      - Timer state, health and remaining time");
    info!("  GET  /diagnostics - Health telemetry");
    info!("  GET  /health      - Health check");

    // Setup graceful shutdown
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    state.stop_session();
    info!("Server shutdown complete");
    Ok(())
}
