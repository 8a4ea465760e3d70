//! One actor selection: a frozen schema plus the per-attempt execution flow.
//!
//! Every attempt walks `Idle -> Normalizing -> PolicyApplied -> Dispatched ->
//! {Succeeded | Failed} -> ResultsFetched`; each transition is reported to the
//! execution sink.

use std::fmt;

use crate::{
    errors::{Error, Result},
    fields::{to_fields, ParameterField},
    identifiers::{ActorId, RunId},
    normalize::{InputNormalizer, RawInput},
    policy::{PolicyEngine, RunRequest},
    resolver::{ResolvedSchema, SchemaOrigin},
    runs::{RunDispatcher, RunResult},
    schema::InputSchema,
    synthesize::{synthesize, ActorMetadata},
    telemetry::{EventCallbacks, ExecutionEvent, ResolverEvent, Telemetry},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExecutionPhase {
    Idle,
    Normalizing,
    PolicyApplied,
    Dispatched,
    Succeeded,
    Failed,
    ResultsFetched,
}

impl ExecutionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionPhase::Idle => "idle",
            ExecutionPhase::Normalizing => "normalizing",
            ExecutionPhase::PolicyApplied => "policy_applied",
            ExecutionPhase::Dispatched => "dispatched",
            ExecutionPhase::Succeeded => "succeeded",
            ExecutionPhase::Failed => "failed",
            ExecutionPhase::ResultsFetched => "results_fetched",
        }
    }

    /// Legal transitions of the state machine.
    pub fn can_advance_to(self, next: ExecutionPhase) -> bool {
        use ExecutionPhase::*;
        matches!(
            (self, next),
            (Idle, Normalizing)
                | (Normalizing, PolicyApplied)
                | (PolicyApplied, Dispatched)
                | (Dispatched, Succeeded)
                | (Dispatched, Failed)
                | (Succeeded, ResultsFetched)
                | (Failed, ResultsFetched)
        )
    }
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema and fields for one selected actor, immutable for the session.
///
/// Normalized input and policy results are built fresh for every attempt.
#[derive(Clone, Debug)]
pub struct ActorSession {
    actor_id: ActorId,
    metadata: Option<ActorMetadata>,
    schema: InputSchema,
    fields: Vec<ParameterField>,
    origin: SchemaOrigin,
    normalizer: InputNormalizer,
    policy: PolicyEngine,
    telemetry: Telemetry,
}

impl ActorSession {
    pub fn new(actor_id: impl Into<ActorId>, schema: InputSchema, origin: SchemaOrigin) -> Self {
        let fields = to_fields(&schema);
        Self {
            actor_id: actor_id.into(),
            metadata: None,
            schema,
            fields,
            origin,
            normalizer: InputNormalizer::default(),
            policy: PolicyEngine::default(),
            telemetry: Telemetry::default(),
        }
    }

    /// Build a session from a resolver outcome.
    ///
    /// A resolved schema wins. Otherwise the schema is synthesized from
    /// `metadata`; with neither, the actor is reported as not found.
    pub fn from_resolution(
        actor_id: impl Into<ActorId>,
        resolved: Option<ResolvedSchema>,
        metadata: Option<ActorMetadata>,
    ) -> Result<Self> {
        Self::assemble(actor_id.into(), resolved, metadata, &Telemetry::default())
    }

    pub(crate) fn assemble(
        actor_id: ActorId,
        resolved: Option<ResolvedSchema>,
        metadata: Option<ActorMetadata>,
        telemetry: &Telemetry,
    ) -> Result<Self> {
        let (schema, origin) = match (resolved, &metadata) {
            (Some(found), _) => (
                found.schema,
                SchemaOrigin::Declared {
                    source: found.source,
                },
            ),
            (None, Some(meta)) => {
                let from_example = meta.example_input().is_some();
                telemetry.record_resolver(ResolverEvent::Synthesized {
                    actor_id: actor_id.clone(),
                    from_example,
                });
                (synthesize(meta), SchemaOrigin::Synthesized { from_example })
            }
            (None, None) => {
                return Err(Error::ActorNotFound {
                    actor_id: actor_id.to_string(),
                })
            }
        };
        let mut session = Self::new(actor_id, schema, origin).with_telemetry(telemetry.clone());
        session.metadata = metadata;
        Ok(session)
    }

    pub fn with_metadata(mut self, metadata: ActorMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_normalizer(mut self, normalizer: InputNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_policy(mut self, policy: PolicyEngine) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_callbacks(mut self, callbacks: EventCallbacks) -> Self {
        self.telemetry = Telemetry::new(Some(callbacks));
        self
    }

    pub(crate) fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn actor_id(&self) -> &ActorId {
        &self.actor_id
    }

    pub fn metadata(&self) -> Option<&ActorMetadata> {
        self.metadata.as_ref()
    }

    pub fn schema(&self) -> &InputSchema {
        &self.schema
    }

    pub fn fields(&self) -> &[ParameterField] {
        &self.fields
    }

    pub fn origin(&self) -> &SchemaOrigin {
        &self.origin
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    /// Normalize `raw` and apply `policy`, producing the dispatch payload.
    pub fn prepare(&self, raw: RawInput, use_proxy: bool, policy: &PolicyEngine) -> Result<RunRequest> {
        self.emit(ExecutionPhase::Normalizing, None, None);
        let input = match self.normalizer.normalize(&self.fields, raw) {
            Ok(input) => input,
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(actor = %self.actor_id, error = %err, "input rejected");
                return Err(err);
            }
        };
        let request = policy.apply(&self.actor_id, input, use_proxy);
        self.emit(ExecutionPhase::PolicyApplied, None, request.policy.clone());
        Ok(request)
    }

    /// Prepare with the session's policy, dispatch, and surface the outcome.
    ///
    /// A run ending in any non-success terminal status is returned as
    /// [`Error::RunFailed`] carrying its diagnostics.
    pub async fn execute<D>(&self, dispatcher: &D, raw: RawInput, use_proxy: bool) -> Result<RunResult>
    where
        D: RunDispatcher + ?Sized,
    {
        let request = self.prepare(raw, use_proxy, &self.policy)?;
        self.emit(ExecutionPhase::Dispatched, None, None);

        let result = match dispatcher.dispatch(request).await {
            Ok(result) => result,
            Err(err) => {
                self.emit(ExecutionPhase::Failed, None, Some(err.to_string()));
                return Err(err);
            }
        };

        let run_id = Some(result.run_id.clone());
        if result.is_success() {
            self.emit(ExecutionPhase::Succeeded, run_id.clone(), None);
            self.emit(
                ExecutionPhase::ResultsFetched,
                run_id,
                Some(format!("{} items", result.stats.item_count)),
            );
            return Ok(result);
        }

        let detail = result
            .error_detail
            .as_ref()
            .and_then(|d| d.status_message.clone())
            .unwrap_or_else(|| result.status.to_string());
        self.emit(ExecutionPhase::Failed, run_id.clone(), Some(detail));
        self.emit(ExecutionPhase::ResultsFetched, run_id, None);
        Err(Error::RunFailed(Box::new(result)))
    }

    fn emit(&self, phase: ExecutionPhase, run_id: Option<RunId>, detail: Option<String>) {
        self.telemetry.record_execution(ExecutionEvent {
            actor_id: self.actor_id.clone(),
            phase,
            run_id,
            detail,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;
    use crate::{
        runs::{ErrorDetail, RunStats, RunStatus},
        synthesize::ExampleRunInput,
        BoxFuture,
    };

    struct Recorded {
        requests: Mutex<Vec<RunRequest>>,
        status: RunStatus,
    }

    impl RunDispatcher for Recorded {
        fn dispatch<'a>(&'a self, request: RunRequest) -> BoxFuture<'a, Result<RunResult>> {
            self.requests.lock().unwrap().push(request);
            let status = self.status.clone();
            Box::pin(async move {
                let failed = !status.is_success();
                Ok(RunResult {
                    run_id: "run-1".into(),
                    status,
                    items: vec![json!({ "title": "Example" }).as_object().unwrap().clone()],
                    stats: RunStats {
                        item_count: 1,
                        execution_time_secs: 1.5,
                    },
                    error_detail: failed.then(|| ErrorDetail {
                        exit_code: Some(1),
                        status_message: Some("crashed".into()),
                        last_log_lines: None,
                    }),
                })
            })
        }
    }

    fn dispatcher(status: RunStatus) -> Recorded {
        Recorded {
            requests: Mutex::new(Vec::new()),
            status,
        }
    }

    fn crawler_session() -> (ActorSession, Arc<Mutex<Vec<ExecutionPhase>>>) {
        let schema = InputSchema::from_value(&json!({
            "type": "object",
            "properties": {
                "startUrls": { "type": "array" },
                "maxConcurrency": { "type": "integer" }
            },
            "required": ["startUrls"]
        }))
        .unwrap();
        let phases = Arc::new(Mutex::new(Vec::new()));
        let callbacks = EventCallbacks {
            execution: Some({
                let phases = phases.clone();
                Arc::new(move |event: ExecutionEvent| phases.lock().unwrap().push(event.phase))
            }),
            ..Default::default()
        };
        let session = ActorSession::new(
            "apify/web-scraper",
            schema,
            SchemaOrigin::Declared {
                source: "actor".into(),
            },
        )
        .with_callbacks(callbacks);
        (session, phases)
    }

    #[tokio::test]
    async fn successful_run_walks_every_phase() {
        let (session, phases) = crawler_session();
        let runner = dispatcher(RunStatus::Succeeded);
        let raw = RawInput::fields([("startUrls", "https://a.com"), ("maxConcurrency", "2")]);

        let result = session.execute(&runner, raw, false).await.unwrap();
        assert_eq!(result.stats.item_count, 1);

        let requests = runner.requests.lock().unwrap();
        assert_eq!(requests[0].input["startUrls"], json!([{ "url": "https://a.com" }]));
        assert_eq!(requests[0].input["maxConcurrency"], json!(2));
        assert_eq!(requests[0].input["maxPagesPerCrawl"], json!(3));

        let phases = phases.lock().unwrap();
        assert_eq!(
            *phases,
            vec![
                ExecutionPhase::Normalizing,
                ExecutionPhase::PolicyApplied,
                ExecutionPhase::Dispatched,
                ExecutionPhase::Succeeded,
                ExecutionPhase::ResultsFetched,
            ]
        );
        assert!(phases.windows(2).all(|w| w[0].can_advance_to(w[1])));
    }

    #[tokio::test]
    async fn failed_run_surfaces_diagnostics() {
        let (session, phases) = crawler_session();
        let runner = dispatcher(RunStatus::Failed);
        let err = session
            .execute(&runner, RawInput::SeedUrl("https://a.com".into()), false)
            .await
            .unwrap_err();
        match err {
            Error::RunFailed(result) => {
                assert_eq!(result.status, RunStatus::Failed);
                let detail = result.error_detail.unwrap();
                assert_eq!(detail.status_message.as_deref(), Some("crashed"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(phases.lock().unwrap().contains(&ExecutionPhase::Failed));
    }

    #[tokio::test]
    async fn invalid_input_never_dispatches() {
        let (session, _) = crawler_session();
        let runner = dispatcher(RunStatus::Succeeded);
        let err = session
            .execute(&runner, RawInput::fields([("maxConcurrency", "2")]), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingRequiredFields { ref keys } if keys == &["startUrls"]));
        assert!(runner.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn prepare_uses_the_given_policy() {
        let (session, _) = crawler_session();
        let request = session
            .prepare(
                RawInput::fields([("startUrls", "https://a.com")]),
                true,
                &PolicyEngine::new(),
            )
            .unwrap();
        assert!(request.policy.is_none());
        assert!(!request.input.contains_key("maxPagesPerCrawl"));
        assert!(request.input.contains_key("proxyConfiguration"));
    }

    #[test]
    fn resolution_outcomes_pick_origin() {
        let schema = InputSchema::new("Declared");
        let session = ActorSession::from_resolution(
            "a/b",
            Some(ResolvedSchema {
                schema,
                source: "definition".into(),
            }),
            None,
        )
        .unwrap();
        assert!(session.origin().is_declared());

        let meta = ActorMetadata {
            id: "a/b".into(),
            name: "b".into(),
            example_run_input: Some(ExampleRunInput {
                body: Some(json!({ "query": "cats" })),
                content_type: None,
            }),
            ..Default::default()
        };
        let session = ActorSession::from_resolution("a/b", None, Some(meta)).unwrap();
        assert_eq!(
            session.origin(),
            &SchemaOrigin::Synthesized { from_example: true }
        );
        assert_eq!(session.fields()[0].key, "query");

        let err = ActorSession::from_resolution("a/b", None, None).unwrap_err();
        assert!(matches!(err, Error::ActorNotFound { .. }));
    }
}
