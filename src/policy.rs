//! Pre-dispatch policies: cost-bounding defaults and the proxy gate.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::{identifiers::ActorId, normalize::NormalizedInput};

/// Policy input key stripped from every payload before dispatch.
pub const PROXY_FLAG_KEY: &str = "useProxy";

/// Payload key holding the proxy configuration.
pub const PROXY_CONFIGURATION_KEY: &str = "proxyConfiguration";

pub const DEFAULT_PROXY_GROUP: &str = "RESIDENTIAL";

const FAST_PATH_ACTORS: [&str; 8] = [
    "apify/web-scraper",
    "apify~web-scraper",
    "apify/cheerio-scraper",
    "apify~cheerio-scraper",
    "apify/puppeteer-scraper",
    "apify~puppeteer-scraper",
    "apify/playwright-scraper",
    "apify~playwright-scraper",
];

/// A named set of defaults applied to an allow-list of actors.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionPolicy {
    pub name: String,
    pub actors: Vec<ActorId>,
    pub defaults: Map<String, Value>,
}

impl ExecutionPolicy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actors: Vec::new(),
            defaults: Map::new(),
        }
    }

    pub fn with_actor(mut self, actor_id: impl Into<ActorId>) -> Self {
        self.actors.push(actor_id.into());
        self
    }

    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }

    /// Cost-bounding limits for the generic scraper actors.
    pub fn fast_path() -> Self {
        let policy = FAST_PATH_ACTORS
            .iter()
            .fold(Self::new("fast-path"), |policy, actor| policy.with_actor(*actor));
        policy
            .with_default("pageLoadTimeoutSecs", 20)
            .with_default("pageFunctionTimeoutSecs", 15)
            .with_default("maxPagesPerCrawl", 3)
            .with_default("maxCrawlingDepth", 1)
            .with_default("maxResultsPerCrawl", 10)
            .with_default("maxConcurrency", 8)
            .with_default("downloadMedia", false)
            .with_default("downloadCss", false)
            .with_default("maxRequestRetries", 1)
            .with_default("navigationTimeoutSecs", 15)
            .with_default("requestTimeoutSecs", 15)
    }

    pub fn applies_to(&self, actor_id: &ActorId) -> bool {
        self.actors.iter().any(|a| a == actor_id)
    }

    /// Fill every default whose key the caller left unset.
    fn fill(&self, input: &mut NormalizedInput) {
        for (key, value) in &self.defaults {
            input
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

/// Payload handed to a [`RunDispatcher`](crate::RunDispatcher).
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub actor_id: ActorId,
    pub input: NormalizedInput,
    /// Name of the policy whose defaults were applied, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    /// Outcome of the proxy gate. Local only: never serialized.
    #[serde(skip)]
    pub use_proxy: bool,
}

/// Applies [`ExecutionPolicy`] profiles and the proxy gate.
///
/// The default engine carries [`ExecutionPolicy::fast_path`] and injects the
/// `RESIDENTIAL` proxy group when the proxy is enabled.
#[derive(Clone, Debug)]
pub struct PolicyEngine {
    policies: Vec<ExecutionPolicy>,
    proxy_groups: Vec<String>,
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new().with_policy(ExecutionPolicy::fast_path())
    }
}

impl PolicyEngine {
    /// An engine with no policies; only the proxy gate and `startUrls` cleanup run.
    pub fn new() -> Self {
        Self {
            policies: Vec::new(),
            proxy_groups: vec![DEFAULT_PROXY_GROUP.to_string()],
        }
    }

    pub fn with_policy(mut self, policy: ExecutionPolicy) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn with_proxy_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.proxy_groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn policies(&self) -> &[ExecutionPolicy] {
        &self.policies
    }

    /// Turn a normalized input into the payload sent for execution.
    ///
    /// The first policy listing `actor_id` fills unset keys; explicit values,
    /// falsy ones included, are kept. The proxy is enabled when `use_proxy` is
    /// set or the input carries `useProxy: true`; the flag key never reaches
    /// the payload. A disabled proxy strips any `proxyConfiguration`.
    pub fn apply(&self, actor_id: &ActorId, mut input: NormalizedInput, use_proxy: bool) -> RunRequest {
        let policy = self.policies.iter().find(|p| p.applies_to(actor_id));
        if let Some(policy) = policy {
            policy.fill(&mut input);
        }

        let flagged = matches!(input.remove(PROXY_FLAG_KEY), Some(Value::Bool(true)));
        let use_proxy = use_proxy || flagged;
        if use_proxy {
            input.insert(
                PROXY_CONFIGURATION_KEY.to_string(),
                json!({
                    "useApifyProxy": true,
                    "apifyProxyGroups": self.proxy_groups,
                }),
            );
        } else {
            input.remove(PROXY_CONFIGURATION_KEY);
        }

        wrap_start_urls(&mut input);

        RunRequest {
            actor_id: actor_id.clone(),
            input,
            policy: policy.map(|p| p.name.clone()),
            use_proxy,
        }
    }
}

fn wrap_start_urls(input: &mut NormalizedInput) {
    let Some(start_urls) = input.get_mut("startUrls") else {
        return;
    };
    match start_urls {
        Value::String(url) => {
            let url = url.trim().to_string();
            *start_urls = if url.is_empty() {
                Value::Array(Vec::new())
            } else {
                json!([{ "url": url }])
            };
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                if let Value::String(url) = item {
                    *item = json!({ "url": url.trim() });
                }
            }
        }
        _ => {}
    }
}
