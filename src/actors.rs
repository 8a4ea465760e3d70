//! Actor discovery and session opening.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    client::{ClientInner, ListPage, RequestOptions},
    errors::{Error, Result, ValidationError},
    execution::ActorSession,
    http::RetryConfig,
    identifiers::ActorId,
    normalize::InputNormalizer,
    resolver::{
        HttpSchemaSource, RecordSchemaSource, ResolvedSchema, SchemaResolver, SchemaSource,
    },
    synthesize::ActorMetadata,
};

/// Most entries [`ActorsClient::store`] returns.
pub const STORE_LIMIT: usize = 20;

const STORE_FALLBACK: [(&str, &str, &str); 4] = [
    (
        "web-scraper",
        "Web Scraper",
        "Crawls arbitrary websites using the Chrome browser and extracts data from pages using a provided JavaScript code. Perfect for scraping SPAs.",
    ),
    (
        "google-search-results-scraper",
        "Google Search Results Scraper",
        "Scrape Google Search results for any keyword. Get organic results, ads, shopping results, and more. Fast and reliable.",
    ),
    (
        "cheerio-scraper",
        "Cheerio Scraper",
        "Fast and efficient web scraper using Cheerio for server-side HTML parsing. Ideal for simple websites.",
    ),
    (
        "puppeteer-scraper",
        "Puppeteer Scraper",
        "Advanced web scraper using Puppeteer for complex JavaScript-heavy websites and SPAs.",
    ),
];

/// Listing entry with display fallbacks applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorSummary {
    pub id: ActorId,
    pub name: String,
    /// Title, or the name when the actor has none.
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl From<ActorMetadata> for ActorSummary {
    fn from(meta: ActorMetadata) -> Self {
        let title = meta
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| meta.name.clone());
        let description = meta.description_or_default();
        Self {
            id: meta.id,
            name: meta.name,
            title,
            description,
            username: meta.username,
        }
    }
}

/// Well-known public scrapers listed when the store cannot be reached.
pub fn fallback_store_catalog() -> Vec<ActorSummary> {
    STORE_FALLBACK
        .iter()
        .map(|(name, title, description)| ActorSummary {
            id: ActorId::new(format!("apify/{name}")),
            name: name.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            username: Some("apify".to_string()),
        })
        .collect()
}

#[derive(Clone)]
pub struct ActorsClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl ActorsClient {
    /// Metadata record of one actor (`GET /acts/{id}`).
    pub async fn get(&self, actor_id: &ActorId) -> Result<ActorMetadata> {
        validate_actor_id(actor_id)?;
        self.inner
            .get_data(&["acts", actor_id.as_str()], &[], None, Some(actor_id))
            .await
    }

    /// Metadata for an actor the token may not own.
    ///
    /// After the authenticated record, tries the record without credentials
    /// and then the public store entry (`GET /store/{id}`). The first error is
    /// returned when all three fail.
    pub async fn lookup(&self, actor_id: &ActorId) -> Result<ActorMetadata> {
        validate_actor_id(actor_id)?;
        let err = match self.get(actor_id).await {
            Ok(meta) => return Ok(meta),
            Err(err) => err,
        };
        #[cfg(feature = "tracing")]
        tracing::debug!(actor = %actor_id, error = %err, "actor record unreadable with token");

        let public = RequestOptions {
            retry: Some(RetryConfig::disabled()),
            actor: Some(actor_id),
            anonymous: true,
            ..Default::default()
        };
        if let Ok(meta) = self
            .inner
            .get_data_with::<ActorMetadata>(&["acts", actor_id.as_str()], &[], public.clone())
            .await
        {
            return Ok(meta);
        }
        match self
            .inner
            .get_json::<Value>(&["store", actor_id.as_str()], &[], public)
            .await
        {
            Ok(entry) => store_entry(entry),
            Err(_) => Err(err),
        }
    }

    /// Actors owned by the token's account.
    pub async fn list(&self) -> Result<Vec<ActorSummary>> {
        let page: ListPage<ActorMetadata> = self.inner.get_data(&["acts"], &[], None, None).await?;
        Ok(page.items.into_iter().map(ActorSummary::from).collect())
    }

    /// Public actors from the store, at most [`STORE_LIMIT`].
    ///
    /// Never fails: an unreachable store or an empty answer yields
    /// [`fallback_store_catalog`].
    pub async fn store(&self, limit: usize) -> Vec<ActorSummary> {
        let limit = limit.clamp(1, STORE_LIMIT);
        let query = [("limit", limit.to_string())];
        let page: Result<ListPage<ActorMetadata>> =
            self.inner.get_data(&["store"], &query, None, None).await;
        let actors: Vec<ActorSummary> = match page {
            Ok(page) => page
                .items
                .into_iter()
                .filter(|a| a.is_public != Some(false) && !a.id.is_blank())
                .take(limit)
                .map(|meta| {
                    let mut summary = ActorSummary::from(meta);
                    summary.username.get_or_insert_with(|| "apify".to_string());
                    summary
                })
                .collect(),
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_err, "store listing failed; using fallback catalog");
                Vec::new()
            }
        };
        if actors.is_empty() {
            return fallback_store_catalog();
        }
        actors
    }

    /// Resolver over the four upstream schema records, in priority order.
    pub fn resolver(&self) -> SchemaResolver {
        self.resolver_over(HttpSchemaSource::defaults(&self.inner))
    }

    fn resolver_over(&self, sources: Vec<Arc<dyn SchemaSource>>) -> SchemaResolver {
        SchemaResolver::new(sources)
            .with_mode(self.inner.resolve_mode)
            .with_telemetry(self.inner.telemetry.clone())
    }

    pub async fn resolve_schema(&self, actor_id: &ActorId) -> Result<Option<ResolvedSchema>> {
        validate_actor_id(actor_id)?;
        Ok(self.resolver().resolve(actor_id).await)
    }

    /// Resolve (or synthesize) the actor's schema and freeze it in a session.
    ///
    /// The metadata record comes from [`lookup`](Self::lookup) and also
    /// answers the `actor` schema source. Fails with [`Error::ActorNotFound`]
    /// only when no source holds a schema and no metadata could be read.
    pub async fn open(&self, actor_id: impl Into<ActorId>) -> Result<ActorSession> {
        let actor_id = actor_id.into();
        validate_actor_id(&actor_id)?;
        let metadata = match self.lookup(&actor_id).await {
            Ok(meta) => Some(meta),
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(actor = %actor_id, error = %_err, "actor metadata unavailable");
                None
            }
        };
        let mut sources: Vec<Arc<dyn SchemaSource>> =
            vec![Arc::new(RecordSchemaSource::new(metadata.clone()))];
        sources.extend(HttpSchemaSource::fallbacks(&self.inner));
        let resolved = self.resolver_over(sources).resolve(&actor_id).await;
        let session =
            ActorSession::assemble(actor_id, resolved, metadata, &self.inner.telemetry)?;
        Ok(session
            .with_normalizer(InputNormalizer::new(self.inner.conventions.clone()))
            .with_policy(self.inner.policy.clone()))
    }
}

/// Store entries arrive either bare or inside the `data` envelope.
fn store_entry(entry: Value) -> Result<ActorMetadata> {
    let record = match entry {
        Value::Object(mut map) if map.get("data").is_some_and(Value::is_object) => {
            map.remove("data").unwrap_or_default()
        }
        other => other,
    };
    Ok(serde_json::from_value(record)?)
}

fn validate_actor_id(actor_id: &ActorId) -> Result<()> {
    if actor_id.is_blank() {
        return Err(Error::Validation(
            ValidationError::new("actor id is required").with_field("actor_id"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_falls_back_to_name_and_default_description() {
        let summary = ActorSummary::from(ActorMetadata {
            id: "abc".into(),
            name: "my-actor".into(),
            title: Some("  ".into()),
            ..Default::default()
        });
        assert_eq!(summary.title, "my-actor");
        assert_eq!(summary.description, "No description available");
    }

    #[test]
    fn fallback_catalog_lists_four_scrapers() {
        let catalog = fallback_store_catalog();
        let ids: Vec<&str> = catalog.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "apify/web-scraper",
                "apify/google-search-results-scraper",
                "apify/cheerio-scraper",
                "apify/puppeteer-scraper",
            ]
        );
        assert!(catalog.iter().all(|a| a.username.as_deref() == Some("apify")));
    }

    #[test]
    fn store_entries_decode_with_or_without_envelope() {
        let wrapped = store_entry(serde_json::json!({
            "data": { "id": "apify/public", "name": "public" }
        }))
        .unwrap();
        assert_eq!(wrapped.name, "public");

        let bare =
            store_entry(serde_json::json!({ "id": "apify/public", "title": "Public" })).unwrap();
        assert_eq!(bare.display_name(), "Public");
    }

    #[test]
    fn blank_ids_are_rejected() {
        let err = validate_actor_id(&ActorId::new(" ")).unwrap_err();
        assert_eq!(err.field(), Some("actor_id"));
    }
}
