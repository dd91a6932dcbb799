//! Completion listener background task

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::{host::TimerEvent, state::AppState};

/// Background task that turns completion events into session bookkeeping
pub async fn completion_listener_task(state: Arc<AppState>) {
    info!("Starting completion listener task");

    let mut events = state.subscribe_events();

    loop {
        match events.recv().await {
            Ok(TimerEvent::Completed { cycle, source, generation }) => {
                debug!("Completion event received: {} via {:?}", cycle, source);
                if let Some(next) = state.finish_cycle(cycle, source, generation) {
                    info!("Ready for {} session", next);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Completion listener lagged, {} events skipped", skipped);
            }
            Err(RecvError::Closed) => {
                info!("Completion channel closed, listener exiting");
                break;
            }
        }
    }
}
