//! Subscribe-side dispatch.
//!
//! Every inbound message is handled on its own: look up the channel's
//! handler, decode the payload, then hand it to the channel's worker. Each
//! channel has one worker task that starts handler invocations in broker
//! order. A worker only waits for an invocation to begin running, never for
//! it to finish, so a handler that suspends does not hold up later messages
//! on its own channel or any other.

use crate::broker::InboundMessage;
use crate::error::HandlerError;
use crate::registry::{HandlerRegistry, SharedHandler};
use dashmap::DashMap;
use opentelemetry::{
    Context, KeyValue, global,
    trace::{FutureExt, SpanKind, Status, TraceContextExt, Tracer},
};
use serde_json::Value;
use std::future::poll_fn;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

/// What happened to an inbound message at the dispatch step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handed to the channel worker.
    Queued,
    /// No handler registered; dropped.
    Unregistered,
    /// Payload was not valid JSON; dropped.
    Malformed,
    /// The channel worker is gone; dropped.
    WorkerClosed,
}

struct Delivery {
    handler: SharedHandler,
    payload: Value,
}

struct DispatchContext {
    service_name: String,
    system: String,
}

/// Routes inbound messages to registered handlers.
#[derive(Clone)]
pub struct Dispatcher {
    registry: HandlerRegistry,
    context: Arc<DispatchContext>,
    workers: Arc<DashMap<String, mpsc::UnboundedSender<Delivery>>>,
}

impl Dispatcher {
    /// Create a dispatcher reading from the given registry.
    ///
    /// `service_name` names the tracer, `system` is reported as
    /// `messaging.system` on every delivery span.
    pub fn new(
        registry: HandlerRegistry,
        service_name: impl Into<String>,
        system: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            context: Arc::new(DispatchContext {
                service_name: service_name.into(),
                system: system.into(),
            }),
            workers: Arc::new(DashMap::new()),
        }
    }

    /// Dispatch one inbound message. Never fails; the outcome is informational.
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self, message: InboundMessage) -> DispatchOutcome {
        let InboundMessage { channel, payload } = message;

        let Some(handler) = self.registry.get(&channel) else {
            warn!(channel = %channel, "Received message on unsubscribed channel");
            return DispatchOutcome::Unregistered;
        };

        let payload: Value = match serde_json::from_str(&payload) {
            Ok(value) => value,
            Err(e) => {
                error!(
                    channel = %channel,
                    error = %e,
                    "Error parsing message for channel"
                );
                return DispatchOutcome::Malformed;
            }
        };

        debug!(channel = %channel, "Received message on channel");

        let worker = self
            .workers
            .entry(channel.clone())
            .or_insert_with(|| self.spawn_worker(&channel))
            .clone();

        match worker.send(Delivery { handler, payload }) {
            Ok(()) => DispatchOutcome::Queued,
            Err(_) => {
                self.workers.remove(&channel);
                error!(channel = %channel, "Delivery worker stopped; message dropped");
                DispatchOutcome::WorkerClosed
            }
        }
    }

    fn spawn_worker(&self, channel: &str) -> mpsc::UnboundedSender<Delivery> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Delivery>();
        let channel = channel.to_string();
        let context = self.context.clone();

        tokio::spawn(async move {
            while let Some(delivery) = rx.recv().await {
                let (started_tx, started_rx) = oneshot::channel();
                tokio::spawn(deliver(
                    context.clone(),
                    channel.clone(),
                    delivery,
                    started_tx,
                ));
                // Resolves once the handler has been polled, or if it panicked
                // before that.
                let _ = started_rx.await;
            }
            debug!(channel = %channel, "Delivery worker finished");
        });

        tx
    }
}

/// Run one handler invocation inside its own span and task.
///
/// The span is the active OpenTelemetry context while the handler runs, so
/// spans the handler starts are its children. `started` fires after the
/// handler's first poll.
async fn deliver(
    context: Arc<DispatchContext>,
    channel: String,
    delivery: Delivery,
    started: oneshot::Sender<()>,
) -> Result<(), HandlerError> {
    let tracer = global::tracer(context.service_name.clone());
    let span = tracer
        .span_builder(format!("EVENT_HANDLER {channel}"))
        .with_kind(SpanKind::Consumer)
        .with_attributes(vec![
            KeyValue::new("messaging.system", context.system.clone()),
            KeyValue::new("messaging.destination", channel.clone()),
            KeyValue::new("messaging.operation", "process"),
        ])
        .start(&tracer);
    let cx = Context::current_with_span(span);

    let Delivery { handler, payload } = delivery;
    let invocation = async move {
        let mut handling = handler.handle(payload);
        let mut started = Some(started);
        poll_fn(|task_cx| {
            let poll = handling.as_mut().poll(task_cx);
            if let Some(started) = started.take() {
                let _ = started.send(());
            }
            poll
        })
        .await
    };

    let outcome = match tokio::spawn(invocation.with_context(cx.clone())).await {
        Ok(result) => result,
        Err(join_error) => Err(HandlerError::Panicked(join_error.to_string())),
    };

    let span = cx.span();
    match &outcome {
        Ok(()) => span.set_status(Status::Ok),
        Err(e) => {
            error!(
                channel = %channel,
                error = %e,
                "Error processing event from channel"
            );
            span.set_status(Status::error(e.to_string()));
            span.record_error(e);
        }
    }
    span.end();

    outcome
}
