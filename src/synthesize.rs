//! Best-effort schema synthesis for actors without a declared input schema.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{
    identifiers::ActorId,
    schema::{FieldType, InputSchema, SchemaProperty, URL_LIST_EDITOR},
};

const DEFAULT_DESCRIPTION: &str = "No description available";

/// Actor metadata record as returned by `GET /acts/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorMetadata {
    pub id: ActorId,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    /// Raw embedded schema: an object, a JSON-encoded string, or absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example_run_input: Option<ExampleRunInput>,
}

/// Example input stored alongside an actor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExampleRunInput {
    /// Example body, either a JSON-encoded string or an inline object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl ActorMetadata {
    /// Title, then name, then id.
    pub fn display_name(&self) -> String {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| Some(self.name.as_str()).filter(|n| !n.trim().is_empty()))
            .map(str::to_string)
            .unwrap_or_else(|| self.id.to_string())
    }

    pub fn description_or_default(&self) -> String {
        self.description
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string())
    }

    /// The example input as an object. Unparseable or non-object bodies yield `None`.
    pub fn example_input(&self) -> Option<Map<String, Value>> {
        let body = self.example_run_input.as_ref()?.body.as_ref()?;
        let parsed = match body {
            Value::String(raw) => serde_json::from_str::<Value>(raw).ok()?,
            other => other.clone(),
        };
        match parsed {
            Value::Object(map) if !map.is_empty() => Some(map),
            _ => None,
        }
    }
}

/// Build a schema for an actor whose declared schema could not be resolved.
///
/// With an example input, each top-level key becomes one property typed after
/// its example value. Without one, the schema holds a single `startUrls` list.
pub fn synthesize(actor: &ActorMetadata) -> InputSchema {
    let title = format!("{} Input", actor.display_name());
    match actor.example_input() {
        Some(example) => from_example(title, &example),
        None => InputSchema::new(title).with_property("startUrls", start_urls_property()),
    }
}

fn from_example(title: String, example: &Map<String, Value>) -> InputSchema {
    let mut schema = InputSchema::new(title);
    for (key, value) in example {
        let field_type = FieldType::of_value(value);
        let mut property = SchemaProperty::of_type(field_type)
            .with_title(humanize_key(key))
            .with_prefill(value.clone());
        if field_type == FieldType::Array && key.to_ascii_lowercase().contains("url") {
            property = property.with_editor(URL_LIST_EDITOR);
        }
        schema.properties.insert(key.clone(), property);
    }
    schema
}

fn start_urls_property() -> SchemaProperty {
    SchemaProperty::of_type(FieldType::Array)
        .with_title("Start URLs")
        .with_description("List of URLs to start scraping from")
        .with_editor(URL_LIST_EDITOR)
        .with_prefill(json!([{ "url": "https://example.com" }]))
}

/// `maxPagesPerCrawl` -> `Max Pages Per Crawl`, `pageURLList` -> `Page URL List`.
pub fn humanize_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' {
            if !out.ends_with(' ') && !out.is_empty() {
                out.push(' ');
            }
            continue;
        }
        if i > 0 && c.is_uppercase() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_is_lower);
            if boundary && !out.ends_with(' ') {
                out.push(' ');
            }
        }
        if out.is_empty() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
    }
    out.trim_end().to_string()
}
