//! Change-event routing.
//!
//! Handlers are registered under a `"table:operation"` [`RouteKey`]. A batch
//! is dispatched strictly in order: one event at a time and, for each event,
//! every matching handler in registration order. A failing handler is logged
//! and recorded in the [`DispatchReport`]; it never stops later handlers or
//! later events. The router does not retry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reconcile::{ChangeEvent, EventId, Operation, ReconcileError, RouteKey, TableName};
use tracing::{debug, info, instrument, warn};

use crate::Invocation;

/// Reacts to one kind of change event.
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    /// Stable name used in logs and failure reports.
    fn name(&self) -> &'static str;

    async fn handle(&self, invocation: &Invocation, event: &ChangeEvent) -> Result<(), ReconcileError>;
}

/// One handler invocation that did not succeed.
#[derive(Debug)]
pub struct HandlerFailure {
    pub event_id: EventId,
    pub route: RouteKey,
    pub handler: &'static str,
    pub error: ReconcileError,
}

/// The outcome of dispatching one batch.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub events_seen: usize,
    /// Handler invocations that returned `Ok`.
    pub handled: usize,
    /// Handler invocations that ended in a benign "nothing to do" error.
    pub benign: usize,
    /// Events with no registered handler.
    pub unrouted: usize,
    pub failures: Vec<HandlerFailure>,
}

impl DispatchReport {
    /// `true` when no handler failed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A multimap from route key to handlers, in registration order.
#[derive(Default)]
pub struct EventRouter {
    routes: HashMap<RouteKey, Vec<Arc<dyn ChangeHandler>>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `handler` for events on `table` with `operation`.
    pub fn register(&mut self, table: &TableName, operation: Operation, handler: Arc<dyn ChangeHandler>) {
        let key = RouteKey::new(table, operation);
        debug!(route = %key, handler = handler.name(), "registering change handler");
        self.routes.entry(key).or_default().push(handler);
    }

    /// Number of handlers registered for `key`.
    pub fn handler_count(&self, key: &RouteKey) -> usize {
        self.routes.get(key).map_or(0, Vec::len)
    }

    /// Dispatches `batch` sequentially.
    ///
    /// Once the invocation deadline has passed no further event is started;
    /// each remaining event is recorded as a [`ReconcileError::Cancelled`] failure.
    #[instrument(skip_all, fields(invocation = %invocation.id(), events = batch.len()))]
    pub async fn dispatch(&self, invocation: &Invocation, batch: &[ChangeEvent]) -> DispatchReport {
        let mut report = DispatchReport::default();

        for event in batch {
            report.events_seen += 1;
            let route = event.route_key();

            if invocation.is_expired() {
                warn!(event_id = %event.event_id, route = %route, "deadline exceeded; event not processed");
                report.failures.push(HandlerFailure {
                    event_id: event.event_id.clone(),
                    route,
                    handler: "dispatch",
                    error: ReconcileError::Cancelled,
                });
                continue;
            }

            let Some(handlers) = self.routes.get(&route) else {
                debug!(event_id = %event.event_id, route = %route, "no handler registered");
                report.unrouted += 1;
                continue;
            };

            info!(
                event_id = %event.event_id,
                route = %route,
                handlers = handlers.len(),
                lag_ms = event.approximate_creation.map(|at| at.elapsed().as_millis() as u64),
                "processing change event"
            );

            for handler in handlers {
                match handler.handle(invocation, event).await {
                    Ok(()) => report.handled += 1,
                    Err(error) if error.is_benign() => {
                        info!(
                            event_id = %event.event_id,
                            route = %route,
                            handler = handler.name(),
                            reason = %error,
                            "nothing to do"
                        );
                        report.benign += 1;
                    }
                    Err(error) => {
                        warn!(
                            event_id = %event.event_id,
                            route = %route,
                            handler = handler.name(),
                            error = %error,
                            "change handler failed"
                        );
                        report.failures.push(HandlerFailure {
                            event_id: event.event_id.clone(),
                            route: route.clone(),
                            handler: handler.name(),
                            error,
                        });
                    }
                }
            }
        }

        report
    }
}
