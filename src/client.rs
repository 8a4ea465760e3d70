use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use reqwest::{
    header::{HeaderName, HeaderValue, ACCEPT},
    Method, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tokio::time::sleep;

use crate::{
    actors::ActorsClient,
    errors::{Error, Result, RetryMetadata, TransportError, TransportErrorKind},
    http::{parse_api_error_parts, request_id_from_headers, HeaderList, RetryConfig},
    identifiers::ActorId,
    normalize::FieldConventions,
    policy::PolicyEngine,
    resolver::ResolveMode,
    runs::{RunWaitOptions, RunsClient},
    telemetry::{EventCallbacks, HttpRequestMetrics, RequestContext, Telemetry},
    CLIENT_HEADER, DEFAULT_BASE_URL, DEFAULT_CLIENT_HEADER, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_REQUEST_TIMEOUT,
};

#[derive(Clone, Debug, Default)]
pub struct Config {
    pub base_url: Option<String>,
    /// Opaque API token, forwarded as a bearer credential.
    pub token: Option<String>,
    pub client_header: Option<String>,
    pub http_client: Option<reqwest::Client>,
    /// Override the connect timeout (defaults to 5s).
    pub connect_timeout: Option<Duration>,
    /// Override the request timeout (defaults to 60s).
    pub timeout: Option<Duration>,
    /// Retry/backoff policy for reads. Starting a run and schema lookups are never retried.
    pub retry: Option<RetryConfig>,
    /// Default extra headers applied to all requests.
    pub default_headers: Option<HeaderList>,
    /// Optional event sinks (HTTP, resolver, execution).
    pub callbacks: Option<EventCallbacks>,
    /// Policies applied before dispatch (defaults to the fast-path profile).
    pub policy: Option<PolicyEngine>,
    /// Field-name conventions used by sessions (defaults to `startUrls`, `pseudoUrls`, `pageFunction`).
    pub conventions: Option<FieldConventions>,
    pub resolve_mode: Option<ResolveMode>,
    pub run_wait: Option<RunWaitOptions>,
}

#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    base_url: reqwest::Url,
    token: String,
    client_header: Option<String>,
    http: reqwest::Client,
    request_timeout: Duration,
    retry: RetryConfig,
    default_headers: Option<HeaderList>,
    pub(crate) telemetry: Telemetry,
    pub(crate) policy: PolicyEngine,
    pub(crate) conventions: FieldConventions,
    pub(crate) resolve_mode: ResolveMode,
    pub(crate) run_wait: RunWaitOptions,
}

impl Client {
    pub fn new(cfg: Config) -> Result<Self> {
        let base_source = cfg
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base = base_source.trim_end_matches('/').to_string();
        let base_url = reqwest::Url::parse(&base)
            .map_err(|err| Error::Config(format!("invalid base url: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!("invalid base url: {base}")));
        }

        let token = cfg
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Config("api token is required".to_string()))?
            .to_string();

        let connect_timeout = cfg.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let request_timeout = cfg.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let http = match cfg.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .connect_timeout(connect_timeout)
                .build()
                .map_err(|err| TransportError {
                    kind: TransportErrorKind::Connect,
                    message: "failed to build http client".to_string(),
                    source: Some(err),
                    retries: None,
                })?,
        };

        let client_header = cfg
            .client_header
            .filter(|s| !s.trim().is_empty())
            .or_else(|| Some(DEFAULT_CLIENT_HEADER.to_string()));

        Ok(Self {
            inner: Arc::new(ClientInner {
                base_url,
                token,
                client_header,
                http,
                request_timeout,
                retry: cfg.retry.unwrap_or_default(),
                default_headers: cfg.default_headers,
                telemetry: Telemetry::new(cfg.callbacks),
                policy: cfg.policy.unwrap_or_default(),
                conventions: cfg.conventions.unwrap_or_default(),
                resolve_mode: cfg.resolve_mode.unwrap_or_default(),
                run_wait: cfg.run_wait.unwrap_or_default(),
            }),
        })
    }

    pub fn actors(&self) -> ActorsClient {
        ActorsClient {
            inner: self.inner.clone(),
        }
    }

    pub fn runs(&self) -> RunsClient {
        RunsClient {
            inner: self.inner.clone(),
        }
    }
}

fn apply_header_list(
    mut builder: reqwest::RequestBuilder,
    headers: &HeaderList,
) -> Result<reqwest::RequestBuilder> {
    for entry in headers.iter() {
        if !entry.is_valid() {
            continue;
        }
        let name = HeaderName::from_bytes(entry.key.trim().as_bytes())
            .map_err(|err| Error::Config(format!("invalid header name: {err}")))?;
        let val = HeaderValue::from_str(entry.value.trim())
            .map_err(|err| Error::Config(format!("invalid header value: {err}")))?;
        builder = builder.header(name, val);
    }
    Ok(builder)
}

/// `{"data": ...}` wrapper used by most endpoints.
#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

/// Per-call overrides of the client's request defaults.
#[derive(Clone, Debug, Default)]
pub(crate) struct RequestOptions<'a> {
    pub retry: Option<RetryConfig>,
    pub timeout: Option<Duration>,
    pub actor: Option<&'a ActorId>,
    /// Send without the bearer credential.
    pub anonymous: bool,
}

/// Paginated list payload.
#[derive(Deserialize)]
pub(crate) struct ListPage<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

impl ClientInner {
    /// Base URL plus percent-encoded path segments. Segments are used
    /// verbatim, so an actor id like `user/name` stays one segment.
    fn endpoint(&self, segments: &[&str], query: &[(&str, String)]) -> Result<reqwest::Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config("base url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    fn with_headers(
        &self,
        mut builder: reqwest::RequestBuilder,
        accept: Option<&str>,
        anonymous: bool,
    ) -> Result<reqwest::RequestBuilder> {
        if let Some(accept) = accept {
            builder = builder.header(ACCEPT, accept);
        }
        if let Some(client_header) = self.client_header.as_deref() {
            builder = builder.header(CLIENT_HEADER, client_header);
        }
        if !anonymous {
            builder = self.apply_auth(builder);
        }
        if let Some(defaults) = &self.default_headers {
            builder = apply_header_list(builder, defaults)?;
        }
        Ok(builder)
    }

    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let bearer = self
            .token
            .strip_prefix("Bearer ")
            .or_else(|| self.token.strip_prefix("bearer "))
            .unwrap_or(&self.token);
        builder.bearer_auth(bearer)
    }

    fn make_context(&self, method: &Method, path: &str, actor: Option<&ActorId>) -> RequestContext {
        RequestContext::new(method.as_str(), path).with_actor(actor.cloned())
    }

    async fn send(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<Value>,
        opts: RequestOptions<'_>,
        accept: &str,
    ) -> Result<reqwest::Response> {
        let url = self.endpoint(segments, query)?;
        let ctx = self.make_context(&method, url.path(), opts.actor);
        let mut builder = self.http.request(method.clone(), url);
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        builder = self.with_headers(builder, Some(accept), opts.anonymous)?;
        builder = builder.timeout(opts.timeout.unwrap_or(self.request_timeout));
        let retry_cfg = opts.retry.unwrap_or_else(|| self.retry.clone());
        self.send_with_retry(builder, method, retry_cfg, ctx).await
    }

    async fn read_json<T: DeserializeOwned>(&self, resp: reqwest::Response) -> Result<T> {
        let bytes = resp
            .bytes()
            .await
            .map_err(|err| self.to_transport_error(err, None))?;
        serde_json::from_slice::<T>(&bytes).map_err(Error::Serialization)
    }

    /// GET a `data`-wrapped resource.
    pub(crate) async fn get_data<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
        retry: Option<RetryConfig>,
        actor: Option<&ActorId>,
    ) -> Result<T> {
        let opts = RequestOptions {
            retry,
            actor,
            ..Default::default()
        };
        self.get_data_with(segments, query, opts).await
    }

    pub(crate) async fn get_data_with<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
        opts: RequestOptions<'_>,
    ) -> Result<T> {
        let resp = self
            .send(Method::GET, segments, query, None, opts, "application/json")
            .await?;
        let envelope: DataEnvelope<T> = self.read_json(resp).await?;
        Ok(envelope.data)
    }

    /// GET a bare JSON payload.
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
        opts: RequestOptions<'_>,
    ) -> Result<T> {
        let resp = self
            .send(Method::GET, segments, query, None, opts, "application/json")
            .await?;
        self.read_json(resp).await
    }

    pub(crate) async fn get_text(
        &self,
        segments: &[&str],
        opts: RequestOptions<'_>,
    ) -> Result<String> {
        let resp = self
            .send(Method::GET, segments, &[], None, opts, "text/plain")
            .await?;
        resp.text()
            .await
            .map_err(|err| self.to_transport_error(err, None))
    }

    /// POST a JSON body and unwrap the `data` envelope of the response.
    pub(crate) async fn post_data<T, B>(
        &self,
        segments: &[&str],
        body: &B,
        actor: Option<&ActorId>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_value(body)?;
        let resp = self
            .send(
                Method::POST,
                segments,
                &[],
                Some(body),
                RequestOptions {
                    actor,
                    ..Default::default()
                },
                "application/json",
            )
            .await?;
        let envelope: DataEnvelope<T> = self.read_json(resp).await?;
        Ok(envelope.data)
    }

    async fn send_with_retry(
        &self,
        builder: reqwest::RequestBuilder,
        method: Method,
        retry: RetryConfig,
        ctx: RequestContext,
    ) -> Result<reqwest::Response> {
        let max_attempts = retry.max_attempts.max(1);
        let mut state = RetryState::new();
        let start = Instant::now();

        for attempt in 1..=max_attempts {
            let attempt_builder = builder
                .try_clone()
                .ok_or_else(|| Error::Config("request body is not cloneable for retry".into()))?;
            #[cfg(feature = "tracing")]
            let span = tracing::debug_span!(
                "actorpad.http",
                method = %ctx.method,
                path = %ctx.path,
                attempt,
                max_attempts
            );
            #[cfg(feature = "tracing")]
            let _guard = span.enter();
            let result = attempt_builder.send().await;

            match result {
                Ok(resp) => {
                    let status = resp.status();
                    let mut http_ctx = ctx.clone();
                    if http_ctx.request_id.is_none() {
                        http_ctx.request_id = request_id_from_headers(resp.headers());
                    }
                    if status.is_success() {
                        if self.telemetry.http_enabled() {
                            self.telemetry.record_http(HttpRequestMetrics {
                                latency: start.elapsed(),
                                status: Some(status.as_u16()),
                                error: None,
                                retries: state.metadata(),
                                context: http_ctx,
                            });
                        }
                        #[cfg(feature = "tracing")]
                        tracing::debug!(
                            status = %status,
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            "request completed"
                        );
                        return Ok(resp);
                    }
                    state.record_attempt(attempt);
                    state.record_status(status);

                    if retry.should_retry_status(&method, status) && attempt < max_attempts {
                        sleep(retry.backoff_delay(attempt)).await;
                        continue;
                    }

                    let retries = state.metadata();
                    let headers = resp.headers().clone();
                    if self.telemetry.http_enabled() {
                        self.telemetry.record_http(HttpRequestMetrics {
                            latency: start.elapsed(),
                            status: Some(status.as_u16()),
                            error: Some(format!("http {}", status.as_u16())),
                            retries: retries.clone(),
                            context: http_ctx,
                        });
                    }
                    #[cfg(feature = "tracing")]
                    tracing::warn!(status = %status, attempt, "request failed; returning error");
                    let body = resp.text().await.unwrap_or_default();
                    return Err(parse_api_error_parts(status, &headers, body, retries));
                }
                Err(err) => {
                    state.record_attempt(attempt);
                    state.record_error(&err);
                    if retry.should_retry_error(&method, &err) && attempt < max_attempts {
                        sleep(retry.backoff_delay(attempt)).await;
                        continue;
                    }

                    let retries = state.metadata();
                    if self.telemetry.http_enabled() {
                        self.telemetry.record_http(HttpRequestMetrics {
                            latency: start.elapsed(),
                            status: None,
                            error: Some(err.to_string()),
                            retries: retries.clone(),
                            context: ctx.clone(),
                        });
                    }
                    #[cfg(feature = "tracing")]
                    tracing::warn!(attempt, error = %err, "transport error");
                    return Err(self.to_transport_error(err, retries));
                }
            }
        }

        Err(Error::Transport(TransportError {
            kind: TransportErrorKind::Other,
            message: "request failed".to_string(),
            source: None,
            retries: state.metadata(),
        }))
    }

    fn to_transport_error(&self, err: reqwest::Error, retries: Option<RetryMetadata>) -> Error {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_request() {
            TransportErrorKind::Request
        } else {
            TransportErrorKind::Other
        };

        TransportError {
            kind,
            message: err.to_string(),
            source: Some(err),
            retries,
        }
        .into()
    }
}

#[derive(Default)]
struct RetryState {
    attempts: u32,
    last_status: Option<u16>,
    last_error: Option<String>,
}

impl RetryState {
    fn new() -> Self {
        Self::default()
    }

    fn record_attempt(&mut self, attempt: u32) {
        self.attempts = attempt;
    }

    fn record_status(&mut self, status: StatusCode) {
        self.last_status = Some(status.as_u16());
    }

    fn record_error(&mut self, err: &reqwest::Error) {
        self.last_error = Some(err.to_string());
    }

    fn metadata(&self) -> Option<RetryMetadata> {
        if self.attempts <= 1 {
            None
        } else {
            Some(RetryMetadata {
                attempts: self.attempts,
                last_status: self.last_status,
                last_error: self.last_error.clone(),
            })
        }
    }
}
