//! Alarm backends: the platform facility that actually fires alarms

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use tokio::{runtime::Handle, task::JoinHandle, time::sleep};
use tracing::{debug, trace};

use super::{AlarmDispatcher, AlarmKind};
use crate::{clock::Clock, error::AlarmError};

/// Exact-alarm facility.
///
/// `set_exact` replaces any pending alarm of the same kind. Implementations
/// must fail rather than fall back to inexact delivery.
pub trait AlarmBackend: Send + Sync + std::fmt::Debug {
    fn set_exact(&self, kind: AlarmKind, trigger_at_ms: u64) -> Result<(), AlarmError>;
    fn cancel(&self, kind: AlarmKind);
}

#[derive(Debug)]
struct PendingAlarm {
    id: u64,
    trigger_at_ms: u64,
    task: JoinHandle<()>,
}

type PendingTable = Arc<Mutex<HashMap<AlarmKind, PendingAlarm>>>;

fn lock_table(table: &PendingTable) -> MutexGuard<'_, HashMap<AlarmKind, PendingAlarm>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Backend that fires alarms from tokio timers and delivers them through an
/// [`AlarmDispatcher`].
///
/// Requires a tokio runtime at scheduling time; without one there is no exact
/// timer to arm and scheduling fails.
#[derive(Debug)]
pub struct TokioAlarmBackend {
    clock: Arc<dyn Clock>,
    dispatcher: Arc<AlarmDispatcher>,
    pending: PendingTable,
    next_id: AtomicU64,
}

impl TokioAlarmBackend {
    pub fn new(clock: Arc<dyn Clock>, dispatcher: Arc<AlarmDispatcher>) -> Self {
        Self {
            clock,
            dispatcher,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Trigger time of the pending alarm of `kind`, if any
    pub fn trigger_time(&self, kind: AlarmKind) -> Option<u64> {
        lock_table(&self.pending).get(&kind).map(|alarm| alarm.trigger_at_ms)
    }

    pub fn pending_kinds(&self) -> Vec<AlarmKind> {
        let table = lock_table(&self.pending);
        AlarmKind::ALL.into_iter().filter(|kind| table.contains_key(kind)).collect()
    }
}

impl AlarmBackend for TokioAlarmBackend {
    fn set_exact(&self, kind: AlarmKind, trigger_at_ms: u64) -> Result<(), AlarmError> {
        let runtime = Handle::try_current().map_err(|e| AlarmError::ExactAlarmUnavailable {
            kind,
            reason: e.to_string(),
        })?;

        let delay = Duration::from_millis(trigger_at_ms.saturating_sub(self.clock.now_ms()));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        // Hold the table while spawning so the task cannot look itself up
        // before it has been recorded.
        let mut table = lock_table(&self.pending);
        if let Some(previous) = table.remove(&kind) {
            previous.task.abort();
        }

        let pending = Arc::clone(&self.pending);
        let dispatcher = Arc::clone(&self.dispatcher);
        let task = runtime.spawn(async move {
            sleep(delay).await;

            let current = {
                let mut table = lock_table(&pending);
                match table.get(&kind) {
                    Some(alarm) if alarm.id == id => table.remove(&kind).is_some(),
                    _ => false,
                }
            };

            if current {
                dispatcher.deliver(kind);
            } else {
                trace!("Superseded {} alarm #{} fired, ignoring", kind, id);
            }
        });

        table.insert(kind, PendingAlarm { id, trigger_at_ms, task });
        debug!("Armed {} alarm #{} in {}ms", kind, id, delay.as_millis());
        Ok(())
    }

    fn cancel(&self, kind: AlarmKind) {
        if let Some(alarm) = lock_table(&self.pending).remove(&kind) {
            alarm.task.abort();
            debug!("Cancelled {} alarm #{}", kind, alarm.id);
        }
    }
}

impl Drop for TokioAlarmBackend {
    fn drop(&mut self) {
        for (_, alarm) in lock_table(&self.pending).drain() {
            alarm.task.abort();
        }
    }
}

/// Backend that records requested alarms without ever firing them.
///
/// Useful for driving the handlers by hand and for simulating a platform that
/// refuses exact alarms.
#[derive(Debug, Default)]
pub struct RecordingAlarmBackend {
    pending: Mutex<HashMap<AlarmKind, u64>>,
    history: Mutex<Vec<(AlarmKind, u64)>>,
    deny_exact: AtomicBool,
}

impl RecordingAlarmBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `set_exact` calls fail as if permission was revoked
    pub fn deny_exact_alarms(&self, deny: bool) {
        self.deny_exact.store(deny, Ordering::SeqCst);
    }

    pub fn trigger_time(&self, kind: AlarmKind) -> Option<u64> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).get(&kind).copied()
    }

    pub fn is_pending(&self, kind: AlarmKind) -> bool {
        self.trigger_time(kind).is_some()
    }

    pub fn pending_kinds(&self) -> Vec<AlarmKind> {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        AlarmKind::ALL.into_iter().filter(|kind| pending.contains_key(kind)).collect()
    }

    /// How many times `kind` has been armed
    pub fn schedule_count(&self, kind: AlarmKind) -> usize {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(armed, _)| *armed == kind)
            .count()
    }
}

impl AlarmBackend for RecordingAlarmBackend {
    fn set_exact(&self, kind: AlarmKind, trigger_at_ms: u64) -> Result<(), AlarmError> {
        if self.deny_exact.load(Ordering::SeqCst) {
            return Err(AlarmError::ExactAlarmUnavailable {
                kind,
                reason: "exact alarm permission denied".to_string(),
            });
        }
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, trigger_at_ms);
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((kind, trigger_at_ms));
        Ok(())
    }

    fn cancel(&self, kind: AlarmKind) {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).remove(&kind);
    }
}
