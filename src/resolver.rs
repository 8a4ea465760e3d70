//! Declared-schema lookup across an ordered list of upstream sources.
//!
//! Each source is a [`SchemaSource`] strategy. A source that fails (network,
//! auth, 404, unparseable stored schema) is reported to the resolver sink and
//! skipped; the caller only ever sees `Some(schema)` or `None`.

use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::Value;

use crate::{
    client::ClientInner,
    http::RetryConfig,
    identifiers::ActorId,
    schema::InputSchema,
    synthesize::ActorMetadata,
    telemetry::{AttemptOutcome, EventCallbacks, ResolverEvent, Telemetry},
    BoxFuture,
};

/// Why a single source produced no schema. Never escapes [`SchemaResolver`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("stored schema is not valid JSON: {0}")]
    Parse(String),
}

impl SourceError {
    fn outcome(&self) -> AttemptOutcome {
        match self {
            SourceError::Unavailable(reason) => AttemptOutcome::Unavailable(reason.clone()),
            SourceError::Parse(reason) => AttemptOutcome::ParseError(reason.clone()),
        }
    }
}

/// One place a declared input schema may be stored.
pub trait SchemaSource: Send + Sync {
    /// Short name used in events and [`SchemaOrigin::Declared`].
    fn name(&self) -> &str;

    /// Single try, no retries. `Ok(None)` means the record has no schema.
    fn attempt<'a>(
        &'a self,
        actor_id: &'a ActorId,
    ) -> BoxFuture<'a, Result<Option<InputSchema>, SourceError>>;
}

/// How sources are queried.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResolveMode {
    /// One at a time, stopping at the first schema.
    #[default]
    Sequential,
    /// All at once; the highest-priority schema wins once every source answered.
    Concurrent,
}

/// Where a session's schema came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchemaOrigin {
    Declared { source: String },
    Synthesized { from_example: bool },
}

impl SchemaOrigin {
    pub fn is_declared(&self) -> bool {
        matches!(self, SchemaOrigin::Declared { .. })
    }
}

/// A schema together with the name of the source that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedSchema {
    pub schema: InputSchema,
    pub source: String,
}

/// Ordered chain of [`SchemaSource`]s; index 0 has the highest priority.
#[derive(Clone)]
pub struct SchemaResolver {
    sources: Vec<Arc<dyn SchemaSource>>,
    mode: ResolveMode,
    telemetry: Telemetry,
}

impl std::fmt::Debug for SchemaResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaResolver")
            .field("sources", &self.source_names())
            .field("mode", &self.mode)
            .finish()
    }
}

impl SchemaResolver {
    pub fn new(sources: Vec<Arc<dyn SchemaSource>>) -> Self {
        Self {
            sources,
            mode: ResolveMode::default(),
            telemetry: Telemetry::default(),
        }
    }

    pub fn with_mode(mut self, mode: ResolveMode) -> Self {
        self.mode = mode;
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

    pub fn mode(&self) -> ResolveMode {
        self.mode
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// First declared schema by source priority, or `None` when every source
    /// came up empty. Absence is an expected outcome, not an error.
    pub async fn resolve(&self, actor_id: &ActorId) -> Option<ResolvedSchema> {
        let resolved = match self.mode {
            ResolveMode::Sequential => self.resolve_sequential(actor_id).await,
            ResolveMode::Concurrent => self.resolve_concurrent(actor_id).await,
        };
        match &resolved {
            Some(found) => self.telemetry.record_resolver(ResolverEvent::Resolved {
                actor_id: actor_id.clone(),
                source: found.source.clone(),
            }),
            None => self.telemetry.record_resolver(ResolverEvent::Exhausted {
                actor_id: actor_id.clone(),
            }),
        }
        resolved
    }

    async fn resolve_sequential(&self, actor_id: &ActorId) -> Option<ResolvedSchema> {
        for source in &self.sources {
            let result = source.attempt(actor_id).await;
            if let Some(found) = self.settle(actor_id, source.as_ref(), result) {
                return Some(found);
            }
        }
        None
    }

    async fn resolve_concurrent(&self, actor_id: &ActorId) -> Option<ResolvedSchema> {
        let results = join_all(self.sources.iter().map(|s| s.attempt(actor_id))).await;
        let mut winner = None;
        for (source, result) in self.sources.iter().zip(results) {
            let found = self.settle(actor_id, source.as_ref(), result);
            if winner.is_none() {
                winner = found;
            }
        }
        winner
    }

    fn settle(
        &self,
        actor_id: &ActorId,
        source: &dyn SchemaSource,
        result: Result<Option<InputSchema>, SourceError>,
    ) -> Option<ResolvedSchema> {
        let outcome = match &result {
            Ok(Some(_)) => AttemptOutcome::Found,
            Ok(None) => AttemptOutcome::Absent,
            Err(err) => err.outcome(),
        };
        self.telemetry.record_resolver(ResolverEvent::Attempt {
            actor_id: actor_id.clone(),
            source: source.name().to_string(),
            outcome,
        });
        result.ok().flatten().map(|schema| ResolvedSchema {
            schema,
            source: source.name().to_string(),
        })
    }
}

/// A schema stored on one of the actor's upstream records.
///
/// `pointers` are JSON pointers into the record's `data` payload, tried in
/// order; the first non-null value is decoded.
pub struct HttpSchemaSource {
    name: &'static str,
    suffix: &'static [&'static str],
    pointers: &'static [&'static str],
    inner: Arc<ClientInner>,
}

impl HttpSchemaSource {
    pub(crate) fn actor_record(inner: Arc<ClientInner>) -> Self {
        Self {
            name: "actor",
            suffix: &[],
            pointers: &["/inputSchema"],
            inner,
        }
    }

    pub(crate) fn definition(inner: Arc<ClientInner>) -> Self {
        Self {
            name: "definition",
            suffix: &["definition"],
            pointers: &["/input", "/inputSchema"],
            inner,
        }
    }

    pub(crate) fn latest_build(inner: Arc<ClientInner>) -> Self {
        Self {
            name: "latest-build",
            suffix: &["builds", "latest"],
            pointers: &["/inputSchema"],
            inner,
        }
    }

    pub(crate) fn latest_version(inner: Arc<ClientInner>) -> Self {
        Self {
            name: "latest-version",
            suffix: &["versions", "latest"],
            pointers: &["/inputSchema"],
            inner,
        }
    }

    /// The four upstream records in priority order.
    pub(crate) fn defaults(inner: &Arc<ClientInner>) -> Vec<Arc<dyn SchemaSource>> {
        let mut sources: Vec<Arc<dyn SchemaSource>> =
            vec![Arc::new(Self::actor_record(inner.clone()))];
        sources.extend(Self::fallbacks(inner));
        sources
    }

    /// Every record after the actor record itself.
    pub(crate) fn fallbacks(inner: &Arc<ClientInner>) -> Vec<Arc<dyn SchemaSource>> {
        vec![
            Arc::new(Self::definition(inner.clone())),
            Arc::new(Self::latest_build(inner.clone())),
            Arc::new(Self::latest_version(inner.clone())),
        ]
    }

    fn extract(&self, record: &Value) -> Result<Option<InputSchema>, SourceError> {
        let field = self
            .pointers
            .iter()
            .filter_map(|pointer| record.pointer(pointer))
            .find(|value| !value.is_null());
        InputSchema::from_record_field(field).map_err(|err| SourceError::Parse(err.to_string()))
    }
}

impl SchemaSource for HttpSchemaSource {
    fn name(&self) -> &str {
        self.name
    }

    fn attempt<'a>(
        &'a self,
        actor_id: &'a ActorId,
    ) -> BoxFuture<'a, Result<Option<InputSchema>, SourceError>> {
        Box::pin(async move {
            let mut segments = vec!["acts", actor_id.as_str()];
            segments.extend_from_slice(self.suffix);
            let record = self
                .inner
                .get_data::<Value>(&segments, &[], Some(RetryConfig::disabled()), Some(actor_id))
                .await;
            match record {
                Ok(record) => self.extract(&record),
                Err(err) if err.is_not_found() => Ok(None),
                Err(err) => Err(SourceError::Unavailable(err.to_string())),
            }
        })
    }
}

/// The `actor` source answered from a metadata record fetched beforehand.
pub(crate) struct RecordSchemaSource {
    metadata: Option<ActorMetadata>,
}

impl RecordSchemaSource {
    pub(crate) fn new(metadata: Option<ActorMetadata>) -> Self {
        Self { metadata }
    }
}

impl SchemaSource for RecordSchemaSource {
    fn name(&self) -> &str {
        "actor"
    }

    fn attempt<'a>(
        &'a self,
        _actor_id: &'a ActorId,
    ) -> BoxFuture<'a, Result<Option<InputSchema>, SourceError>> {
        let answer = match &self.metadata {
            Some(meta) => InputSchema::from_record_field(meta.input_schema.as_ref())
                .map_err(|err| SourceError::Parse(err.to_string())),
            None => Err(SourceError::Unavailable("actor record unreachable".into())),
        };
        Box::pin(async move { answer })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    struct FakeSource {
        name: &'static str,
        answer: Result<Option<InputSchema>, SourceError>,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl SchemaSource for FakeSource {
        fn name(&self) -> &str {
            self.name
        }

        fn attempt<'a>(
            &'a self,
            _actor_id: &'a ActorId,
        ) -> BoxFuture<'a, Result<Option<InputSchema>, SourceError>> {
            self.calls.lock().unwrap().push(self.name);
            let answer = self.answer.clone();
            Box::pin(async move { answer })
        }
    }

    fn schema(title: &str) -> InputSchema {
        InputSchema::from_value(&json!({ "title": title, "type": "object", "properties": {} }))
            .unwrap()
    }

    fn stored(raw: &str) -> Result<Option<InputSchema>, SourceError> {
        InputSchema::from_record_field(Some(&Value::String(raw.into())))
            .map_err(|err| SourceError::Parse(err.to_string()))
    }

    fn chain(
        answers: Vec<(&'static str, Result<Option<InputSchema>, SourceError>)>,
    ) -> (Vec<Arc<dyn SchemaSource>>, Arc<Mutex<Vec<&'static str>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sources = answers
            .into_iter()
            .map(|(name, answer)| {
                Arc::new(FakeSource {
                    name,
                    answer,
                    calls: calls.clone(),
                }) as Arc<dyn SchemaSource>
            })
            .collect();
        (sources, calls)
    }

    #[tokio::test]
    async fn definition_beats_latest_build() {
        let (sources, calls) = chain(vec![
            ("actor", Ok(None)),
            ("definition", Ok(Some(schema("from definition")))),
            ("latest-build", Ok(Some(schema("from build")))),
            ("latest-version", Ok(Some(schema("from version")))),
        ]);
        let resolved = SchemaResolver::new(sources)
            .resolve(&"user/actor".into())
            .await
            .unwrap();
        assert_eq!(resolved.source, "definition");
        assert_eq!(resolved.schema.title.as_deref(), Some("from definition"));
        assert_eq!(*calls.lock().unwrap(), vec!["actor", "definition"]);
    }

    #[tokio::test]
    async fn concurrent_mode_keeps_priority() {
        let (sources, calls) = chain(vec![
            ("actor", Err(SourceError::Unavailable("403".into()))),
            ("definition", Ok(Some(schema("from definition")))),
            ("latest-build", Ok(Some(schema("from build")))),
        ]);
        let resolved = SchemaResolver::new(sources)
            .with_mode(ResolveMode::Concurrent)
            .resolve(&"user/actor".into())
            .await
            .unwrap();
        assert_eq!(resolved.source, "definition");
        assert_eq!(calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn invalid_stored_schema_is_skipped() {
        let broken = stored("{not json");
        assert!(matches!(broken, Err(SourceError::Parse(_))));

        let events = Arc::new(Mutex::new(Vec::new()));
        let callbacks = EventCallbacks {
            resolver: Some({
                let events = events.clone();
                Arc::new(move |event| events.lock().unwrap().push(event))
            }),
            ..Default::default()
        };
        let (sources, _) = chain(vec![
            ("definition", broken),
            (
                "latest-build",
                stored(r#"{"type":"object","properties":{"q":{"type":"string"}}}"#),
            ),
        ]);
        let resolved = SchemaResolver::new(sources)
            .with_callbacks(callbacks)
            .resolve(&"abc".into())
            .await
            .unwrap();
        assert_eq!(resolved.source, "latest-build");
        assert!(resolved.schema.properties.contains_key("q"));

        let events = events.lock().unwrap();
        assert!(matches!(
            &events[0],
            ResolverEvent::Attempt { source, outcome: AttemptOutcome::ParseError(_), .. }
                if source == "definition"
        ));
        assert!(matches!(
            events.last(),
            Some(ResolverEvent::Resolved { source, .. }) if source == "latest-build"
        ));
    }

    #[tokio::test]
    async fn exhausted_sources_yield_none() {
        let (sources, calls) = chain(vec![
            ("actor", Err(SourceError::Unavailable("404".into()))),
            ("definition", Ok(None)),
            ("latest-build", stored("")),
            ("latest-version", Err(SourceError::Unavailable("timeout".into()))),
        ]);
        let resolver = SchemaResolver::new(sources);
        assert!(resolver.resolve(&"user/actor".into()).await.is_none());
        assert_eq!(calls.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn empty_chain_resolves_nothing() {
        assert!(SchemaResolver::new(Vec::new())
            .resolve(&"x".into())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn prefetched_record_answers_the_actor_source() {
        let actor: ActorId = "user/actor".into();
        let embedded = RecordSchemaSource::new(Some(ActorMetadata {
            id: actor.clone(),
            input_schema: Some(json!({ "type": "object", "properties": { "q": { "type": "string" } } })),
            ..Default::default()
        }));
        let found = embedded.attempt(&actor).await.unwrap().expect("schema");
        assert!(found.properties.contains_key("q"));

        let bare = RecordSchemaSource::new(Some(ActorMetadata {
            id: actor.clone(),
            ..Default::default()
        }));
        assert_eq!(bare.attempt(&actor).await, Ok(None));

        let missing = RecordSchemaSource::new(None);
        assert!(matches!(
            missing.attempt(&actor).await,
            Err(SourceError::Unavailable(_))
        ));
    }
}
