//! Delivery table for fired alarms
//!
//! A fired alarm is routed by kind to whichever handler is registered when it
//! fires. Handlers are held weakly: the table never keeps the timer system
//! alive, and a delivery that finds no live handler is dropped.

use std::{
    collections::HashMap,
    sync::{Arc, OnceLock, PoisonError, RwLock, Weak},
};

use tracing::{debug, error, warn};

use super::AlarmKind;
use crate::error::AlarmError;

/// Receives fired alarms
pub trait AlarmHandler: Send + Sync {
    fn on_alarm(&self, kind: AlarmKind) -> Result<(), AlarmError>;
}

/// Process-wide routing table from alarm kind to handler
#[derive(Default)]
pub struct AlarmDispatcher {
    handlers: RwLock<HashMap<AlarmKind, Weak<dyn AlarmHandler>>>,
}

impl AlarmDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// The dispatcher shared by the whole process.
    ///
    /// This is the one service-locator lookup in the crate; only the binary's
    /// entry point should call it.
    pub fn global() -> Arc<AlarmDispatcher> {
        static GLOBAL: OnceLock<Arc<AlarmDispatcher>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(AlarmDispatcher::new())))
    }

    pub fn register(&self, kind: AlarmKind, handler: Weak<dyn AlarmHandler>) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        if handlers.insert(kind, handler).is_some() {
            debug!("Replaced handler for {} alarms", kind);
        }
    }

    /// Register one handler for every alarm kind
    pub fn register_all<H: AlarmHandler + 'static>(&self, handler: &Arc<H>) {
        let handler: Arc<dyn AlarmHandler> = handler.clone();
        for kind in AlarmKind::ALL {
            self.register(kind, Arc::downgrade(&handler));
        }
    }

    pub fn unregister(&self, kind: AlarmKind) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        handlers.remove(&kind);
    }

    /// Deliver a fired alarm. Returns whether a live handler received it.
    pub fn deliver(&self, kind: AlarmKind) -> bool {
        let handler = {
            let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            handlers.get(&kind).and_then(Weak::upgrade)
        };

        let Some(handler) = handler else {
            warn!("No live handler for {} alarm, dropping delivery", kind);
            return false;
        };

        debug!("Delivering {} alarm", kind);
        if let Err(e) = handler.on_alarm(kind) {
            error!("Handling {} alarm failed: {}", kind, e);
        }
        true
    }
}

impl std::fmt::Debug for AlarmDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let live: Vec<AlarmKind> = handlers
            .iter()
            .filter(|(_, handler)| handler.strong_count() > 0)
            .map(|(kind, _)| *kind)
            .collect();
        f.debug_struct("AlarmDispatcher").field("live_handlers", &live).finish()
    }
}
