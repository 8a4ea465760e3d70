//! Schema-driven input preparation and execution for hosted actors.
//!
//! An actor's declared input schema is looked up across several upstream
//! records (or synthesized from an example input), projected into form
//! fields, and used to turn free-form user input into a typed payload that
//! passes through execution policies before a run is dispatched.
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(clippy::result_large_err)]

use std::{future::Future, pin::Pin};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.apify.com/v2";

/// Default client identification header value.
pub(crate) const DEFAULT_CLIENT_HEADER: &str = concat!("actorpad-rust/", env!("CARGO_PKG_VERSION"));

/// Header carrying the client identification.
pub(crate) const CLIENT_HEADER: &str = "X-Actorpad-Client";

/// Default connection timeout (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Default request timeout (60 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// HTTP header name for request ID tracing.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Boxed future used by the strategy traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

mod actors;
mod client;
mod errors;
mod execution;
mod fields;
mod http;
mod identifiers;
#[cfg(feature = "mock")]
mod mock;
pub mod normalize;
pub mod policy;
mod resolver;
mod runs;
mod schema;
mod synthesize;
mod telemetry;
#[doc(hidden)]
pub mod testing;

pub use actors::{fallback_store_catalog, ActorSummary, ActorsClient, STORE_LIMIT};
pub use client::{Client, Config};
pub use errors::{
    APIError, Error, Result, RetryMetadata, TransportError, TransportErrorKind, ValidationError,
};
pub use execution::{ActorSession, ExecutionPhase};
pub use fields::{to_fields, ParameterField};
pub use http::{HeaderEntry, HeaderList, RetryConfig};
pub use identifiers::{ActorId, DatasetId, RunId};
#[cfg(feature = "mock")]
pub use mock::{fixtures, MockDispatcher, StaticSchemaSource};
pub use normalize::{
    normalize, FieldConventions, FieldTransformer, InputNormalizer, NormalizedInput, RawInput,
    RawValue,
};
pub use policy::{ExecutionPolicy, PolicyEngine, RunRequest};
pub use resolver::{
    ResolveMode, ResolvedSchema, SchemaOrigin, SchemaResolver, SchemaSource, SourceError,
};
pub use runs::{
    ErrorDetail, RunDispatcher, RunRecord, RunRecordStats, RunResult, RunStats, RunStatus,
    RunWaitOptions, RunsClient,
};
pub use schema::{FieldType, InputSchema, PropertyKind, SchemaProperty, URL_LIST_EDITOR};
pub use synthesize::{humanize_key, synthesize, ActorMetadata, ExampleRunInput};
pub use telemetry::{
    AttemptOutcome, EventCallbacks, ExecutionEvent, HttpRequestMetrics, RequestContext,
    ResolverEvent,
};
