//! Primary countdown loop
//!
//! The loop is the untrusted half of the redundancy pair: a one-second tick
//! that decrements the remaining time, publishes progress and heartbeats into
//! the state manager. It never decides anything on its own beyond "I reached
//! zero"; the state manager's record stays authoritative.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::{
    runtime::Handle,
    sync::{broadcast, watch},
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{
    health::HealthTelemetry,
    host::{CompletionSource, TimerEvent, TimerHost},
    session::CycleType,
    state::{TimerRedundancyState, TimerStateManager},
};

/// Progress of the running countdown as seen by the primary loop
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CountdownProgress {
    pub cycle: CycleType,
    pub remaining_ms: u64,
    pub total_ms: u64,
    /// 0.0 .. 1.0
    pub progress: f64,
}

impl CountdownProgress {
    fn new(cycle: CycleType, remaining_ms: u64, total_ms: u64) -> Self {
        let progress = if total_ms == 0 {
            1.0
        } else {
            1.0 - (remaining_ms as f64 / total_ms as f64)
        };
        Self {
            cycle,
            remaining_ms,
            total_ms,
            progress: progress.clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug)]
struct Active {
    cycle: CycleType,
    total_ms: u64,
    /// Bumped whenever a loop is spawned or halted
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl Active {
    fn halt(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Primary countdown loop halted");
        }
    }
}

/// Hosts the primary countdown loop. At most one loop runs at a time.
#[derive(Debug)]
pub struct CountdownHost {
    state: Arc<TimerStateManager>,
    telemetry: Arc<HealthTelemetry>,
    tick: Duration,
    active: Mutex<Active>,
    progress_tx: watch::Sender<CountdownProgress>,
    events_tx: broadcast::Sender<TimerEvent>,
}

impl CountdownHost {
    pub fn new(state: Arc<TimerStateManager>, telemetry: Arc<HealthTelemetry>) -> Self {
        Self::with_tick(state, telemetry, Duration::from_secs(1))
    }

    pub fn with_tick(
        state: Arc<TimerStateManager>,
        telemetry: Arc<HealthTelemetry>,
        tick: Duration,
    ) -> Self {
        let (progress_tx, _) = watch::channel(CountdownProgress::new(CycleType::Work, 0, 0));
        let (events_tx, _) = broadcast::channel(16);

        Self {
            state,
            telemetry,
            tick,
            active: Mutex::new(Active {
                cycle: CycleType::Work,
                total_ms: 0,
                generation: 0,
                task: None,
            }),
            progress_tx,
            events_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Active> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a fresh loop for a new session of `cycle`
    pub fn launch(&self, cycle: CycleType, duration_ms: u64) {
        let mut active = self.lock();
        active.cycle = cycle;
        active.total_ms = duration_ms;
        self.spawn_loop(&mut active, duration_ms);
    }

    /// Continue the current session with `remaining_ms` left (after a resume)
    pub fn resume(&self, remaining_ms: u64) {
        let mut active = self.lock();
        self.spawn_loop(&mut active, remaining_ms);
    }

    /// Abort the running loop, if any
    pub fn halt(&self) {
        self.lock().halt();
    }

    pub fn is_running(&self) -> bool {
        self.lock().task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn current_cycle(&self) -> CycleType {
        self.lock().cycle
    }

    /// True while `generation` still names the current countdown
    pub fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    /// Last progress published by the primary loop
    pub fn progress(&self) -> CountdownProgress {
        *self.progress_tx.borrow()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<TimerEvent> {
        self.events_tx.subscribe()
    }

    fn spawn_loop(&self, active: &mut Active, remaining_ms: u64) {
        active.halt();

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!("Cannot host primary countdown loop without a runtime: {}", e);
                return;
            }
        };

        let ctx = LoopContext {
            state: Arc::clone(&self.state),
            telemetry: Arc::clone(&self.telemetry),
            progress_tx: self.progress_tx.clone(),
            events_tx: self.events_tx.clone(),
            state_rx: self.state.subscribe_state(),
            tick: self.tick,
            cycle: active.cycle,
            total_ms: active.total_ms.max(remaining_ms),
            generation: active.generation,
        };

        self.progress_tx
            .send_replace(CountdownProgress::new(ctx.cycle, remaining_ms, ctx.total_ms));
        active.task = Some(runtime.spawn(run_countdown(ctx, remaining_ms)));
        info!(
            "Primary countdown loop started for {} with {}ms remaining",
            active.cycle, remaining_ms
        );
    }
}

impl TimerHost for CountdownHost {
    fn complete_timer(&self, source: CompletionSource) {
        let (cycle, generation) = {
            let mut active = self.lock();
            active.halt();
            (active.cycle, active.generation)
        };
        info!("{} session completed ({:?})", cycle, source);
        let event = TimerEvent::Completed { cycle, source, generation };
        if self.events_tx.send(event).is_err() {
            debug!("No listeners for completion event");
        }
    }

    fn restart_primary(&self, remaining_ms: u64) {
        warn!("Restarting primary countdown loop with {}ms remaining", remaining_ms);
        self.resume(remaining_ms);
    }
}

impl Drop for CountdownHost {
    fn drop(&mut self) {
        if let Some(task) = self.lock().task.take() {
            task.abort();
        }
    }
}

struct LoopContext {
    state: Arc<TimerStateManager>,
    telemetry: Arc<HealthTelemetry>,
    progress_tx: watch::Sender<CountdownProgress>,
    events_tx: broadcast::Sender<TimerEvent>,
    state_rx: watch::Receiver<TimerRedundancyState>,
    tick: Duration,
    cycle: CycleType,
    total_ms: u64,
    generation: u64,
}

async fn run_countdown(mut ctx: LoopContext, mut remaining_ms: u64) {
    let tick_ms = ctx.tick.as_millis() as u64;

    let mut ticker = interval(ctx.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // the first tick completes immediately

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                remaining_ms = remaining_ms.saturating_sub(tick_ms);

                let outcome = ctx.state.report_primary_timer_heartbeat(remaining_ms);
                ctx.telemetry.record_heartbeat(outcome);
                ctx.progress_tx
                    .send_replace(CountdownProgress::new(ctx.cycle, remaining_ms, ctx.total_ms));

                if remaining_ms == 0 {
                    let state = *ctx.state_rx.borrow();
                    if state != TimerRedundancyState::Running {
                        debug!("Countdown reached zero while {}, not completing", state);
                        break;
                    }
                    info!("Primary countdown reached zero");
                    let event = TimerEvent::Completed {
                        cycle: ctx.cycle,
                        source: CompletionSource::Primary,
                        generation: ctx.generation,
                    };
                    if ctx.events_tx.send(event).is_err() {
                        debug!("No listeners for completion event");
                    }
                    break;
                }
            }

            changed = ctx.state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *ctx.state_rx.borrow_and_update();
                if state != TimerRedundancyState::Running {
                    debug!("Timer is {}, primary countdown loop exiting", state);
                    break;
                }
            }
        }
    }
}
