use std::{fmt, sync::Arc, time::Duration};

use crate::{
    errors::RetryMetadata,
    execution::ExecutionPhase,
    identifiers::{ActorId, RunId},
};

/// User-provided event sinks. Nothing is logged through process-wide state;
/// every component reports through the callbacks it was constructed with.
#[derive(Clone, Default)]
pub struct EventCallbacks {
    pub http_request: Option<Arc<dyn Fn(HttpRequestMetrics) + Send + Sync>>,
    pub resolver: Option<Arc<dyn Fn(ResolverEvent) + Send + Sync>>,
    pub execution: Option<Arc<dyn Fn(ExecutionEvent) + Send + Sync>>,
}

impl fmt::Debug for EventCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventCallbacks")
            .field(
                "http_request",
                &self.http_request.as_ref().map(|_| "callback"),
            )
            .field("resolver", &self.resolver.as_ref().map(|_| "callback"))
            .field("execution", &self.execution.as_ref().map(|_| "callback"))
            .finish()
    }
}

/// Common request metadata shared by HTTP telemetry events.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub actor_id: Option<ActorId>,
    pub request_id: Option<String>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_actor(mut self, actor_id: Option<ActorId>) -> Self {
        self.actor_id = actor_id;
        self
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        if let Some(id) = request_id {
            if !id.trim().is_empty() {
                self.request_id = Some(id);
            }
        }
        self
    }
}

/// HTTP request latency and outcome.
#[derive(Clone, Debug)]
pub struct HttpRequestMetrics {
    pub latency: Duration,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub retries: Option<RetryMetadata>,
    pub context: RequestContext,
}

/// Result of asking one schema source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    Found,
    Absent,
    Unavailable(String),
    ParseError(String),
}

/// Schema resolution progress for one actor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolverEvent {
    Attempt {
        actor_id: ActorId,
        source: String,
        outcome: AttemptOutcome,
    },
    Resolved {
        actor_id: ActorId,
        source: String,
    },
    Exhausted {
        actor_id: ActorId,
    },
    Synthesized {
        actor_id: ActorId,
        from_example: bool,
    },
}

/// One transition of the execution state machine.
#[derive(Clone, Debug)]
pub struct ExecutionEvent {
    pub actor_id: ActorId,
    pub phase: ExecutionPhase,
    pub run_id: Option<RunId>,
    pub detail: Option<String>,
}

/// Internal helper that owns the registered callbacks (if any).
#[derive(Clone, Debug, Default)]
pub(crate) struct Telemetry {
    callbacks: EventCallbacks,
}

impl Telemetry {
    pub fn new(callbacks: Option<EventCallbacks>) -> Self {
        Self {
            callbacks: callbacks.unwrap_or_default(),
        }
    }

    pub fn http_enabled(&self) -> bool {
        self.callbacks.http_request.is_some()
    }

    pub fn record_http(&self, metrics: HttpRequestMetrics) {
        if let Some(cb) = &self.callbacks.http_request {
            cb(metrics);
        }
    }

    pub fn record_resolver(&self, event: ResolverEvent) {
        #[cfg(feature = "tracing")]
        trace_resolver(&event);
        if let Some(cb) = &self.callbacks.resolver {
            cb(event);
        }
    }

    pub fn record_execution(&self, event: ExecutionEvent) {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            actor = %event.actor_id,
            phase = ?event.phase,
            run_id = ?event.run_id,
            detail = ?event.detail,
            "execution phase"
        );
        if let Some(cb) = &self.callbacks.execution {
            cb(event);
        }
    }
}

#[cfg(feature = "tracing")]
fn trace_resolver(event: &ResolverEvent) {
    match event {
        ResolverEvent::Attempt {
            actor_id,
            source,
            outcome,
        } => match outcome {
            AttemptOutcome::Unavailable(reason) | AttemptOutcome::ParseError(reason) => {
                tracing::debug!(actor = %actor_id, source = %source, reason = %reason, "schema source skipped")
            }
            _ => tracing::debug!(actor = %actor_id, source = %source, ?outcome, "schema source answered"),
        },
        ResolverEvent::Resolved { actor_id, source } => {
            tracing::debug!(actor = %actor_id, source = %source, "schema resolved")
        }
        ResolverEvent::Exhausted { actor_id } => {
            tracing::debug!(actor = %actor_id, "no schema source answered")
        }
        ResolverEvent::Synthesized {
            actor_id,
            from_example,
        } => tracing::info!(actor = %actor_id, from_example, "schema synthesized"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn resolver_events_reach_the_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let callbacks = EventCallbacks {
            resolver: Some({
                let seen = seen.clone();
                Arc::new(move |event| seen.lock().unwrap().push(event))
            }),
            ..Default::default()
        };
        let telemetry = Telemetry::new(Some(callbacks));
        telemetry.record_resolver(ResolverEvent::Exhausted {
            actor_id: "a/b".into(),
        });

        let seen = seen.lock().unwrap();
        assert_eq!(
            seen.as_slice(),
            &[ResolverEvent::Exhausted {
                actor_id: "a/b".into()
            }]
        );
    }

    #[test]
    fn missing_callbacks_are_noops() {
        let telemetry = Telemetry::new(None);
        assert!(!telemetry.http_enabled());
        telemetry.record_execution(ExecutionEvent {
            actor_id: "a".into(),
            phase: ExecutionPhase::Normalizing,
            run_id: None,
            detail: None,
        });
    }

    #[test]
    fn request_context_ignores_blank_request_ids() {
        let ctx = RequestContext::new("GET", "/acts").with_request_id(Some("  ".into()));
        assert!(ctx.request_id.is_none());
    }
}
