use std::{fmt, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::sleep;

use crate::{
    client::{ClientInner, RequestOptions},
    errors::Result,
    http::RetryConfig,
    execution::ExecutionPhase,
    identifiers::{ActorId, DatasetId, RunId},
    normalize::NormalizedInput,
    policy::RunRequest,
    telemetry::ExecutionEvent,
    BoxFuture,
};

/// Status of a run as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunStatus {
    Ready,
    Running,
    Succeeded,
    Failed,
    TimingOut,
    TimedOut,
    Aborting,
    Aborted,
    Other(String),
}

impl RunStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Ready => "READY",
            RunStatus::Running => "RUNNING",
            RunStatus::Succeeded => "SUCCEEDED",
            RunStatus::Failed => "FAILED",
            RunStatus::TimingOut => "TIMING-OUT",
            RunStatus::TimedOut => "TIMED-OUT",
            RunStatus::Aborting => "ABORTING",
            RunStatus::Aborted => "ABORTED",
            RunStatus::Other(s) => s.as_str(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::TimedOut | RunStatus::Aborted
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Succeeded)
    }
}

impl From<String> for RunStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "READY" => RunStatus::Ready,
            "RUNNING" => RunStatus::Running,
            "SUCCEEDED" => RunStatus::Succeeded,
            "FAILED" => RunStatus::Failed,
            "TIMING-OUT" => RunStatus::TimingOut,
            "TIMED-OUT" => RunStatus::TimedOut,
            "ABORTING" => RunStatus::Aborting,
            "ABORTED" => RunStatus::Aborted,
            _ => RunStatus::Other(raw),
        }
    }
}

impl From<RunStatus> for String {
    fn from(status: RunStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub item_count: usize,
    pub execution_time_secs: f64,
}

/// Best-effort diagnostics for a failed run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_log_lines: Option<Vec<String>>,
}

/// Terminal outcome of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub run_id: RunId,
    pub status: RunStatus,
    #[serde(default)]
    pub items: Vec<Map<String, Value>>,
    #[serde(default)]
    pub stats: RunStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<ErrorDetail>,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Executes a [`RunRequest`] and reports its terminal state.
///
/// Implementations return `Ok` for every run that reached a terminal status,
/// including failed ones; `Err` is reserved for the dispatch itself failing.
/// No retries and no internal deadline: callers wrap the future in their own
/// timeout.
pub trait RunDispatcher: Send + Sync {
    fn dispatch<'a>(&'a self, request: RunRequest) -> BoxFuture<'a, Result<RunResult>>;
}

/// Polling and diagnostics knobs for [`RunsClient`].
#[derive(Clone, Debug)]
pub struct RunWaitOptions {
    /// Server-side long-poll per status request (`waitForFinish`, max 60).
    pub wait_secs: u32,
    /// Pause between polls that came back non-terminal.
    pub poll_interval: Duration,
    /// Number of trailing log lines attached to a failed run.
    pub log_tail_lines: usize,
}

/// Floor for the pause between polls when the server does not hold requests.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Budget for the single log request made while diagnosing a failed run.
const LOG_TAIL_TIMEOUT: Duration = Duration::from_secs(10);

impl RunWaitOptions {
    /// Pause after a non-terminal poll. Without a server-side wait the
    /// pause never drops below [`MIN_POLL_INTERVAL`].
    pub fn poll_pause(&self) -> Duration {
        if self.wait_secs == 0 {
            self.poll_interval.max(MIN_POLL_INTERVAL)
        } else {
            self.poll_interval
        }
    }
}

impl Default for RunWaitOptions {
    fn default() -> Self {
        Self {
            wait_secs: 60,
            poll_interval: Duration::from_millis(500),
            log_tail_lines: 20,
        }
    }
}

/// Run record as returned by `/acts/{id}/runs` and `/actor-runs/{id}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub id: RunId,
    #[serde(default)]
    pub act_id: Option<ActorId>,
    pub status: RunStatus,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub exit_code: Option<i64>,
    #[serde(default)]
    pub default_dataset_id: Option<DatasetId>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stats: RunRecordStats,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecordStats {
    #[serde(default)]
    pub run_time_secs: Option<f64>,
}

#[derive(Clone)]
pub struct RunsClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl RunsClient {
    /// Start a run; the input map is the request body. Never retried.
    pub async fn start(&self, actor_id: &ActorId, input: &NormalizedInput) -> Result<RunRecord> {
        self.inner
            .post_data(&["acts", actor_id.as_str(), "runs"], input, Some(actor_id))
            .await
    }

    /// Fetch a run record, letting the server hold the request up to `wait_secs`.
    pub async fn get(&self, run_id: &RunId, wait_secs: Option<u32>) -> Result<RunRecord> {
        let query: Vec<(&str, String)> = wait_secs
            .filter(|w| *w > 0)
            .map(|w| ("waitForFinish", w.to_string()))
            .into_iter()
            .collect();
        self.inner
            .get_data(&["actor-runs", run_id.as_str()], &query, None, None)
            .await
    }

    /// Poll until the run reaches a terminal status.
    pub async fn wait_for_finish(&self, run_id: &RunId) -> Result<RunRecord> {
        let opts = &self.inner.run_wait;
        loop {
            let record = self.get(run_id, Some(opts.wait_secs.min(60))).await?;
            if record.status.is_terminal() {
                return Ok(record);
            }
            let pause = opts.poll_pause();
            if !pause.is_zero() {
                sleep(pause).await;
            }
        }
    }

    /// Items of a dataset; non-object entries are skipped.
    pub async fn items(&self, dataset_id: &DatasetId) -> Result<Vec<Map<String, Value>>> {
        let items: Vec<Value> = self
            .inner
            .get_json(
                &["datasets", dataset_id.as_str(), "items"],
                &[("clean", "true".to_string())],
                RequestOptions::default(),
            )
            .await?;
        Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect())
    }

    /// Last `lines` non-empty lines of a run's log. Single attempt with a
    /// short timeout.
    pub async fn log_tail(&self, run_id: &RunId, lines: usize) -> Result<Vec<String>> {
        let opts = RequestOptions {
            retry: Some(RetryConfig::disabled()),
            timeout: Some(LOG_TAIL_TIMEOUT),
            ..Default::default()
        };
        let text = self.inner.get_text(&["logs", run_id.as_str()], opts).await?;
        let all: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let skip = all.len().saturating_sub(lines);
        Ok(all[skip..].iter().map(|l| l.to_string()).collect())
    }

    async fn run(&self, request: RunRequest) -> Result<RunResult> {
        let started = self.start(&request.actor_id, &request.input).await?;
        let record = if started.status.is_terminal() {
            started
        } else {
            self.wait_for_finish(&started.id).await?
        };
        let execution_time_secs = record.stats.run_time_secs.unwrap_or(0.0);

        if record.status.is_success() {
            let items = match &record.default_dataset_id {
                Some(dataset_id) => self.items(dataset_id).await?,
                None => Vec::new(),
            };
            return Ok(RunResult {
                run_id: record.id,
                status: record.status,
                stats: RunStats {
                    item_count: items.len(),
                    execution_time_secs,
                },
                items,
                error_detail: None,
            });
        }

        let error_detail = self.diagnose(&request.actor_id, &record).await;
        Ok(RunResult {
            run_id: record.id,
            status: record.status,
            items: Vec::new(),
            stats: RunStats {
                item_count: 0,
                execution_time_secs,
            },
            error_detail: Some(error_detail),
        })
    }

    /// Never fails: an unreachable log only leaves `last_log_lines` empty.
    async fn diagnose(&self, actor_id: &ActorId, record: &RunRecord) -> ErrorDetail {
        let lines = self.inner.run_wait.log_tail_lines;
        let last_log_lines = if lines == 0 {
            None
        } else {
            match self.log_tail(&record.id, lines).await {
                Ok(tail) => Some(tail),
                Err(err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(run_id = %record.id, error = %err, "run log unavailable");
                    self.inner.telemetry.record_execution(ExecutionEvent {
                        actor_id: actor_id.clone(),
                        phase: ExecutionPhase::Failed,
                        run_id: Some(record.id.clone()),
                        detail: Some(format!("log unavailable: {err}")),
                    });
                    None
                }
            }
        };
        ErrorDetail {
            exit_code: record.exit_code,
            status_message: record.status_message.clone(),
            last_log_lines,
        }
    }
}

impl RunDispatcher for RunsClient {
    fn dispatch<'a>(&'a self, request: RunRequest) -> BoxFuture<'a, Result<RunResult>> {
        Box::pin(self.run(request))
    }
}
