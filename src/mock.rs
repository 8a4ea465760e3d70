#![cfg(feature = "mock")]

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use crate::{
    errors::{Error, Result},
    identifiers::ActorId,
    policy::RunRequest,
    resolver::{SchemaSource, SourceError},
    runs::{RunDispatcher, RunResult},
    schema::InputSchema,
    BoxFuture,
};

/// In-memory dispatcher that answers from a queue and records every request.
#[derive(Default)]
pub struct MockDispatcher {
    results: Mutex<VecDeque<Result<RunResult>>>,
    requests: Mutex<Vec<RunRequest>>,
}

impl MockDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(self, result: RunResult) -> Self {
        self.results
            .lock()
            .expect("lock poisoned")
            .push_back(Ok(result));
        self
    }

    pub fn with_error(self, err: Error) -> Self {
        self.results
            .lock()
            .expect("lock poisoned")
            .push_back(Err(err));
        self
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<RunRequest> {
        self.requests.lock().expect("lock poisoned").clone()
    }

    fn next_result(&self) -> Result<RunResult> {
        self.results
            .lock()
            .expect("lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(Error::Validation("no mock run result queued".into())))
    }
}

impl RunDispatcher for MockDispatcher {
    fn dispatch<'a>(&'a self, request: RunRequest) -> BoxFuture<'a, Result<RunResult>> {
        self.requests.lock().expect("lock poisoned").push(request);
        let result = self.next_result();
        Box::pin(async move { result })
    }
}

/// Schema source with a fixed answer.
pub struct StaticSchemaSource {
    name: String,
    answer: Result<Option<InputSchema>, SourceError>,
    calls: AtomicUsize,
}

impl StaticSchemaSource {
    fn with_answer(name: impl Into<String>, answer: Result<Option<InputSchema>, SourceError>) -> Self {
        Self {
            name: name.into(),
            answer,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn found(name: impl Into<String>, schema: InputSchema) -> Self {
        Self::with_answer(name, Ok(Some(schema)))
    }

    pub fn absent(name: impl Into<String>) -> Self {
        Self::with_answer(name, Ok(None))
    }

    pub fn unavailable(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::with_answer(name, Err(SourceError::Unavailable(reason.into())))
    }

    /// A source whose record stores the schema as a JSON-encoded string.
    pub fn stored(name: impl Into<String>, raw: &str) -> Self {
        let answer = InputSchema::from_record_field(Some(&serde_json::Value::String(raw.into())))
            .map_err(|err| SourceError::Parse(err.to_string()));
        Self::with_answer(name, answer)
    }

    /// How many times the resolver asked this source.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SchemaSource for StaticSchemaSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn attempt<'a>(
        &'a self,
        _actor_id: &'a ActorId,
    ) -> BoxFuture<'a, Result<Option<InputSchema>, SourceError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = self.answer.clone();
        Box::pin(async move { answer })
    }
}

pub mod fixtures {
    use serde_json::{json, Map, Value};

    use crate::{
        runs::{ErrorDetail, RunResult, RunStats, RunStatus},
        schema::InputSchema,
    };

    pub fn succeeded_run(items: Vec<Value>) -> RunResult {
        let items: Vec<Map<String, Value>> = items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        RunResult {
            run_id: "run_mock_123".into(),
            status: RunStatus::Succeeded,
            stats: RunStats {
                item_count: items.len(),
                execution_time_secs: 1.0,
            },
            items,
            error_detail: None,
        }
    }

    pub fn failed_run(status_message: &str) -> RunResult {
        RunResult {
            run_id: "run_mock_failed".into(),
            status: RunStatus::Failed,
            items: Vec::new(),
            stats: RunStats::default(),
            error_detail: Some(ErrorDetail {
                exit_code: Some(1),
                status_message: Some(status_message.to_string()),
                last_log_lines: Some(vec![format!("ERROR {status_message}")]),
            }),
        }
    }

    /// Crawler-style schema with a required `startUrls` list.
    pub fn crawler_schema() -> InputSchema {
        InputSchema::from_value(&json!({
            "title": "Crawler input",
            "type": "object",
            "schemaVersion": 1,
            "properties": {
                "startUrls": {
                    "title": "Start URLs",
                    "type": "array",
                    "editor": "requestListSources"
                },
                "maxPagesPerCrawl": { "title": "Max pages", "type": "integer", "default": 10 },
                "useChrome": { "title": "Use Chrome", "type": "boolean" }
            },
            "required": ["startUrls"]
        }))
        .unwrap_or_default()
    }
}
