//! System events and the observer registry
//!
//! Handlers subscribe by [`EventKind`] and are called synchronously, in
//! registration order, on the emitting task. A failing handler is logged and
//! skipped; it never stops delivery to the handlers after it.

use crate::{CortexResult, SystemHealth, SystemStatus};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Event names observers can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SystemInitialized,
    HealthCheck,
    SystemDegraded,
    SystemRecovered,
    SystemOptimized,
    SystemShutdown,
    RequestSuccess,
    RequestError,
    RequestQueued,
    BatchProcessed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SystemInitialized => "system:initialized",
            EventKind::HealthCheck => "health:check",
            EventKind::SystemDegraded => "system:degraded",
            EventKind::SystemRecovered => "system:recovered",
            EventKind::SystemOptimized => "system:optimized",
            EventKind::SystemShutdown => "system:shutdown",
            EventKind::RequestSuccess => "request:success",
            EventKind::RequestError => "request:error",
            EventKind::RequestQueued => "request:queued",
            EventKind::BatchProcessed => "batch:processed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event payloads.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SystemEvent {
    SystemInitialized {
        status: SystemStatus,
        duration: Duration,
    },
    HealthCheck {
        health: Box<SystemHealth>,
    },
    SystemDegraded {
        previous: SystemStatus,
        unhealthy_engines: Vec<String>,
    },
    SystemRecovered {
        previous: SystemStatus,
    },
    SystemOptimized {
        expired: usize,
        evicted: usize,
        compacted_namespaces: usize,
        engines_optimized: usize,
        engine_failures: usize,
        duration: Duration,
    },
    SystemShutdown,
    RequestSuccess {
        request_type: String,
        response_time: Duration,
        result: Value,
        cached: bool,
    },
    RequestError {
        request_type: String,
        response_time: Duration,
        error: String,
    },
    RequestQueued {
        request_type: String,
        batch_id: String,
    },
    BatchProcessed {
        request_type: String,
        batch_id: String,
        size: usize,
        succeeded: usize,
        failed: usize,
    },
}

impl SystemEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SystemEvent::SystemInitialized { .. } => EventKind::SystemInitialized,
            SystemEvent::HealthCheck { .. } => EventKind::HealthCheck,
            SystemEvent::SystemDegraded { .. } => EventKind::SystemDegraded,
            SystemEvent::SystemRecovered { .. } => EventKind::SystemRecovered,
            SystemEvent::SystemOptimized { .. } => EventKind::SystemOptimized,
            SystemEvent::SystemShutdown => EventKind::SystemShutdown,
            SystemEvent::RequestSuccess { .. } => EventKind::RequestSuccess,
            SystemEvent::RequestError { .. } => EventKind::RequestError,
            SystemEvent::RequestQueued { .. } => EventKind::RequestQueued,
            SystemEvent::BatchProcessed { .. } => EventKind::BatchProcessed,
        }
    }
}

/// Observer of system events.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &SystemEvent) -> CortexResult<()>;
}

impl<F> EventHandler for F
where
    F: Fn(&SystemEvent) + Send + Sync,
{
    fn handle(&self, event: &SystemEvent) -> CortexResult<()> {
        self(event);
        Ok(())
    }
}

/// Handle returned by [`EventBus::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    kind: EventKind,
    handler: Arc<dyn EventHandler>,
}

/// Registry of event handlers.
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe a handler to one event kind.
    pub fn on(&self, kind: EventKind, handler: impl EventHandler + 'static) -> SubscriptionId {
        self.on_arc(kind, Arc::new(handler))
    }

    pub fn on_arc(&self, kind: EventKind, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscription { id, kind, handler });
        id
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut subs = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.kind == kind)
            .count()
    }

    /// Deliver an event to its subscribers.
    ///
    /// The handler list is copied before delivery, so handlers may subscribe
    /// or unsubscribe without deadlocking.
    pub fn emit(&self, event: &SystemEvent) {
        let kind = event.kind();
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| Arc::clone(&s.handler))
            .collect();

        for (idx, handler) in handlers.iter().enumerate() {
            if let Err(e) = handler.handle(event) {
                tracing::warn!(
                    event = %kind,
                    listener_index = idx,
                    error = %e,
                    "Event listener failed"
                );
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self
            .subscriptions
            .read()
            .map(|s| s.len())
            .unwrap_or_default();
        f.debug_struct("EventBus")
            .field("subscriptions", &count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CortexError, LifecycleError};
    use std::sync::Mutex;

    struct FailingHandler;

    impl EventHandler for FailingHandler {
        fn handle(&self, _event: &SystemEvent) -> CortexResult<()> {
            Err(CortexError::Lifecycle(LifecycleError::HealthCheckFailure {
                component: "listener".to_string(),
                reason: "boom".to_string(),
            }))
        }
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            bus.on(EventKind::SystemShutdown, move |_: &SystemEvent| {
                seen.lock().unwrap().push(label);
            });
        }

        bus.emit(&SystemEvent::SystemShutdown);
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_only_matching_kind_is_delivered() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        bus.on(EventKind::SystemRecovered, move |_: &SystemEvent| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&SystemEvent::SystemShutdown);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        bus.emit(&SystemEvent::SystemRecovered {
            previous: SystemStatus::Degraded,
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_handler_does_not_block_later_handlers() {
        let bus = EventBus::new();
        let delivered = Arc::new(AtomicU64::new(0));
        bus.on(EventKind::SystemShutdown, FailingHandler);
        let d = Arc::clone(&delivered);
        bus.on(EventKind::SystemShutdown, move |_: &SystemEvent| {
            d.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&SystemEvent::SystemShutdown);
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_off_removes_subscription() {
        let bus = EventBus::new();
        let id = bus.on(EventKind::HealthCheck, |_: &SystemEvent| {});
        assert_eq!(bus.subscriber_count(EventKind::HealthCheck), 1);
        assert!(bus.off(id));
        assert!(!bus.off(id));
        assert_eq!(bus.subscriber_count(EventKind::HealthCheck), 0);
    }

    #[test]
    fn test_event_kind_names() {
        let event = SystemEvent::RequestQueued {
            request_type: "leadScoring".to_string(),
            batch_id: "b".to_string(),
        };
        assert_eq!(event.kind().as_str(), "request:queued");
        assert_eq!(EventKind::HealthCheck.to_string(), "health:check");
    }
}
