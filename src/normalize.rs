//! Normalization of user-supplied input into an actor input map.
//!
//! Input arrives in one of three shapes ([`RawInput`]): free text per form
//! field, a pasted JSON document, or a single seed URL. Each value is coerced
//! to its field's declared type. Fields with a naming convention (`startUrls`,
//! `pseudoUrls`, `pageFunction`) are handled by transformers registered in
//! [`FieldConventions`]; everything else uses [`coerce_value`].

use std::{collections::HashMap, sync::Arc};

use indexmap::IndexMap;
use serde_json::{json, Map, Number, Value};

use crate::{
    errors::{Error, Result},
    fields::ParameterField,
    schema::FieldType,
};

/// Normalized actor input, keyed by field name.
pub type NormalizedInput = Map<String, Value>;

/// Default page script used by the seed-URL input mode.
pub const DEFAULT_PAGE_FUNCTION: &str = r#"async function pageFunction(context) {
    const title = document.title || document.querySelector('h1')?.textContent || 'No title found';
    const url = context.request.url;
    const bodyText = document.body?.textContent?.trim().substring(0, 500) || 'No content found';

    const headings = [];
    const headingElements = document.querySelectorAll('h1, h2, h3');
    for (let i = 0; i < Math.min(headingElements.length, 5); i++) {
        const headingText = headingElements[i].textContent?.trim();
        if (headingText) headings.push(headingText);
    }

    const links = [];
    const linkElements = document.querySelectorAll('a[href]');
    for (let i = 0; i < Math.min(linkElements.length, 10); i++) {
        const linkText = linkElements[i].textContent?.trim();
        const linkUrl = linkElements[i].getAttribute('href');
        if (linkText && linkUrl) {
            links.push({ text: linkText, url: linkUrl });
        }
    }

    return {
        title,
        url,
        bodyText,
        headings,
        links,
        timestamp: new Date().toISOString()
    };
}"#;

const TRUTHY: [&str; 6] = ["true", "1", "yes", "y", "on", "checked"];
const FALSY: [&str; 5] = ["false", "0", "no", "n", "off"];

/// User input as collected by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum RawInput {
    /// Free text per field key, as typed into a form. Keys keep their order.
    Fields(IndexMap<String, String>),
    /// A pasted JSON document; must be an object.
    Json(String),
    /// A single URL to crawl with the default page script.
    SeedUrl(String),
}

impl RawInput {
    pub fn fields<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        RawInput::Fields(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A single raw value before coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Text(String),
    Json(Value),
}

/// Per-field-name transformer. `Ok(None)` means the field is left unset.
pub type FieldTransformer =
    Arc<dyn Fn(&ParameterField, &RawValue) -> Result<Option<Value>> + Send + Sync>;

/// Registry mapping field names to convention transformers.
#[derive(Clone)]
pub struct FieldConventions {
    transformers: HashMap<String, FieldTransformer>,
}

impl Default for FieldConventions {
    fn default() -> Self {
        Self::new()
            .register("startUrls", url_list("url"))
            .register("pseudoUrls", url_list("purl"))
            .register("pageFunction", script())
    }
}

impl std::fmt::Debug for FieldConventions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = self.names();
        names.sort();
        f.debug_struct("FieldConventions")
            .field("fields", &names)
            .finish()
    }
}

impl FieldConventions {
    /// An empty registry; every field uses the type-based fallback.
    pub fn new() -> Self {
        Self {
            transformers: HashMap::new(),
        }
    }

    pub fn register(mut self, name: impl Into<String>, transformer: FieldTransformer) -> Self {
        self.transformers.insert(name.into(), transformer);
        self
    }

    pub fn register_mut(
        &mut self,
        name: impl Into<String>,
        transformer: FieldTransformer,
    ) -> &mut Self {
        self.transformers.insert(name.into(), transformer);
        self
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.transformers.remove(name).is_some()
    }

    pub fn has(&self, name: &str) -> bool {
        self.transformers.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.transformers.keys().cloned().collect()
    }

    fn transform(&self, field: &ParameterField, raw: &RawValue) -> Result<Option<Value>> {
        match self.transformers.get(&field.key) {
            Some(transformer) => transformer(field, raw),
            None => coerce_value(field, raw),
        }
    }
}

/// Array convention wrapping each line as `{ <key>: line }`.
///
/// A raw JSON array is kept verbatim. Fields not declared as arrays fall back
/// to [`coerce_value`].
pub fn url_list(key: &'static str) -> FieldTransformer {
    Arc::new(move |field, raw| {
        if field.field_type() != FieldType::Array {
            return coerce_value(field, raw);
        }
        let text = match raw {
            RawValue::Json(Value::Array(items)) => return Ok(Some(Value::Array(items.clone()))),
            RawValue::Json(Value::Null) => return Ok(None),
            RawValue::Json(Value::String(s)) | RawValue::Text(s) => s,
            RawValue::Json(_) => {
                return Err(Error::invalid_input(&field.key, "expected a list of URLs"))
            }
        };
        if let Some(items) = parse_json_array(text) {
            return Ok(Some(Value::Array(items)));
        }
        let wrapped: Vec<Value> = non_empty_lines(text)
            .map(|line| {
                let mut entry = Map::new();
                entry.insert(key.to_string(), Value::String(line.to_string()));
                Value::Object(entry)
            })
            .collect();
        Ok(non_empty_array(wrapped))
    })
}

/// Free-form script convention: text is kept byte-for-byte.
pub fn script() -> FieldTransformer {
    Arc::new(|field, raw| match raw {
        RawValue::Text(s) | RawValue::Json(Value::String(s)) => {
            Ok(Some(Value::String(s.clone())).filter(|_| !s.trim().is_empty()))
        }
        RawValue::Json(Value::Null) => Ok(None),
        RawValue::Json(_) => Err(Error::invalid_input(&field.key, "expected script text")),
    })
}

/// Type-based coercion used for fields without a convention.
pub fn coerce_value(field: &ParameterField, raw: &RawValue) -> Result<Option<Value>> {
    let coerced = match raw {
        RawValue::Json(Value::Null) => None,
        RawValue::Json(Value::String(s)) => coerce_text(field, s)?,
        RawValue::Text(s) => coerce_text(field, s)?,
        RawValue::Json(value) => coerce_json(field, value)?,
    };
    match coerced {
        Some(value) => check_enum(field, value).map(Some),
        None => Ok(None),
    }
}

fn coerce_text(field: &ParameterField, text: &str) -> Result<Option<Value>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match field.field_type() {
        FieldType::String => Ok(Some(Value::String(text.to_string()))),
        FieldType::Boolean => {
            let lowered = trimmed.to_ascii_lowercase();
            if TRUTHY.contains(&lowered.as_str()) {
                Ok(Some(Value::Bool(true)))
            } else if FALSY.contains(&lowered.as_str()) {
                Ok(Some(Value::Bool(false)))
            } else {
                Err(Error::invalid_input(
                    &field.key,
                    format!("expected true or false, got '{trimmed}'"),
                ))
            }
        }
        FieldType::Integer => parse_integer(trimmed)
            .map(|i| Some(Value::from(i)))
            .ok_or_else(|| {
                Error::invalid_input(&field.key, format!("expected an integer, got '{trimmed}'"))
            }),
        FieldType::Number => parse_number(trimmed).map(Some).ok_or_else(|| {
            Error::invalid_input(&field.key, format!("expected a number, got '{trimmed}'"))
        }),
        FieldType::Array => {
            if let Some(items) = parse_json_array(trimmed) {
                return Ok(Some(Value::Array(items)));
            }
            let lines = non_empty_lines(text)
                .map(|line| Value::String(line.to_string()))
                .collect();
            Ok(non_empty_array(lines))
        }
        // Unparseable object text is kept as a string; the service validates it.
        FieldType::Object => match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(map)) => Ok(Some(Value::Object(map))),
            _ => Ok(Some(Value::String(text.to_string()))),
        },
    }
}

fn coerce_json(field: &ParameterField, value: &Value) -> Result<Option<Value>> {
    let mismatch = || {
        Error::invalid_input(
            &field.key,
            format!("expected {}, got {}", field.field_type(), json_kind(value)),
        )
    };
    match (field.field_type(), value) {
        (FieldType::String, Value::Number(_) | Value::Bool(_)) => {
            Ok(Some(Value::String(value.to_string())))
        }
        (FieldType::Boolean, Value::Bool(_)) => Ok(Some(value.clone())),
        (FieldType::Boolean, Value::Number(n)) => match n.as_i64() {
            Some(0) => Ok(Some(Value::Bool(false))),
            Some(1) => Ok(Some(Value::Bool(true))),
            _ => Err(mismatch()),
        },
        (FieldType::Integer, Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(whole_number))
            .map(|i| Some(Value::from(i)))
            .ok_or_else(mismatch),
        (FieldType::Number, Value::Number(_)) => Ok(Some(value.clone())),
        (FieldType::Array, Value::Array(_)) => Ok(Some(value.clone())),
        (FieldType::Object, _) => Ok(Some(value.clone())),
        _ => Err(mismatch()),
    }
}

/// Scalars with a declared enum must match one of its values; the declared
/// value (with its original typing) is returned. Arrays and objects skip the check.
fn check_enum(field: &ParameterField, value: Value) -> Result<Value> {
    let Some(allowed) = field.enum_values() else {
        return Ok(value);
    };
    if matches!(
        field.field_type(),
        FieldType::Array | FieldType::Object
    ) || allowed.is_empty()
    {
        return Ok(value);
    }
    let label = scalar_label(&value);
    allowed
        .iter()
        .find(|candidate| **candidate == value || scalar_label(candidate) == label)
        .cloned()
        .ok_or_else(|| {
            let options: Vec<String> = allowed.iter().map(scalar_label).collect();
            Error::invalid_input(
                &field.key,
                format!("'{}' is not one of: {}", label, options.join(", ")),
            )
        })
}

/// Normalizes raw input against a field list.
#[derive(Clone, Debug, Default)]
pub struct InputNormalizer {
    conventions: FieldConventions,
}

impl InputNormalizer {
    pub fn new(conventions: FieldConventions) -> Self {
        Self { conventions }
    }

    pub fn conventions(&self) -> &FieldConventions {
        &self.conventions
    }

    /// Coerce every value to its field's type and check required fields.
    ///
    /// The first value that cannot be coerced aborts with
    /// [`Error::InvalidInput`]. Afterwards every required field still unset
    /// (and without a schema default) is reported at once through
    /// [`Error::MissingRequiredFields`]. Keys not declared in `fields` are
    /// passed through unchanged.
    pub fn normalize(&self, fields: &[ParameterField], raw: RawInput) -> Result<NormalizedInput> {
        let mut values = raw_values(raw)?;
        let mut out = NormalizedInput::new();
        let mut missing = Vec::new();

        for field in fields {
            let value = match values.shift_remove(&field.key) {
                Some(raw) => self.conventions.transform(field, &raw)?,
                None => None,
            };
            let value = match value {
                Some(value) => Some(value),
                None if field.required => field.default_value().or_else(|| {
                    (field.field_type() == FieldType::Boolean).then_some(Value::Bool(false))
                }),
                None => None,
            };
            match value {
                Some(value) => {
                    out.insert(field.key.clone(), value);
                }
                None if field.required => missing.push(field.key.clone()),
                None => {}
            }
        }

        for (key, raw) in values {
            match raw {
                RawValue::Json(Value::Null) => {}
                RawValue::Json(value) => {
                    out.insert(key, value);
                }
                RawValue::Text(text) if !text.trim().is_empty() => {
                    out.insert(key, Value::String(text));
                }
                RawValue::Text(_) => {}
            }
        }

        if !missing.is_empty() {
            return Err(Error::MissingRequiredFields { keys: missing });
        }
        Ok(out)
    }
}

/// Normalize with the default conventions.
pub fn normalize(fields: &[ParameterField], raw: RawInput) -> Result<NormalizedInput> {
    InputNormalizer::default().normalize(fields, raw)
}

/// Crawler input for a single seed URL.
pub fn seed_input(url: &str) -> Result<NormalizedInput> {
    let url = url.trim();
    if url.is_empty() {
        return Err(Error::invalid_input("startUrls", "a URL is required"));
    }
    let mut input = NormalizedInput::new();
    input.insert("startUrls".into(), json!([{ "url": url }]));
    input.insert("pageFunction".into(), Value::from(DEFAULT_PAGE_FUNCTION));
    input.insert("maxPagesPerCrawl".into(), Value::from(5));
    input.insert("maxCrawlingDepth".into(), Value::from(1));
    input.insert("navigationTimeoutSecs".into(), Value::from(30));
    input.insert("requestTimeoutSecs".into(), Value::from(30));
    Ok(input)
}

fn raw_values(raw: RawInput) -> Result<IndexMap<String, RawValue>> {
    match raw {
        RawInput::Fields(map) => Ok(map
            .into_iter()
            .map(|(k, v)| (k, RawValue::Text(v)))
            .collect()),
        RawInput::Json(text) => {
            let parsed: Value = serde_json::from_str(text.trim()).map_err(|err| {
                Error::invalid_input("input", format!("invalid JSON: {err}"))
            })?;
            match parsed {
                Value::Object(map) => Ok(map
                    .into_iter()
                    .map(|(k, v)| (k, RawValue::Json(v)))
                    .collect()),
                other => Err(Error::invalid_input(
                    "input",
                    format!("expected a JSON object, got {}", json_kind(&other)),
                )),
            }
        }
        RawInput::SeedUrl(url) => Ok(seed_input(&url)?
            .into_iter()
            .map(|(k, v)| (k, RawValue::Json(v)))
            .collect()),
    }
}

fn parse_json_array(text: &str) -> Option<Vec<Value>> {
    let trimmed = text.trim();
    if !trimmed.starts_with('[') {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(items)) => Some(items),
        _ => None,
    }
}

fn non_empty_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|line| !line.is_empty())
}

fn non_empty_array(items: Vec<Value>) -> Option<Value> {
    if items.is_empty() {
        None
    } else {
        Some(Value::Array(items))
    }
}

fn parse_integer(text: &str) -> Option<i64> {
    text.parse::<i64>()
        .ok()
        .or_else(|| text.parse::<f64>().ok().and_then(whole_number))
}

fn parse_number(text: &str) -> Option<Value> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::from(i));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn whole_number(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn scalar_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fields::to_fields, schema::InputSchema};

    fn fields(schema: Value) -> Vec<ParameterField> {
        to_fields(&InputSchema::from_value(&schema).expect("schema"))
    }

    fn form(entries: &[(&str, &str)]) -> RawInput {
        RawInput::fields(entries.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    fn crawler_fields() -> Vec<ParameterField> {
        fields(json!({
            "type": "object",
            "properties": {
                "startUrls": { "type": "array" },
                "pseudoUrls": { "type": "array" },
                "keywords": { "type": "array" },
                "maxItems": { "type": "integer" },
                "ratio": { "type": "number" },
                "headless": { "type": "boolean" },
                "extra": { "type": "object" },
                "mode": { "type": "string", "enum": ["fast", "full"] }
            }
        }))
    }

    #[test]
    fn undeclared_form_keys_keep_their_order() {
        let out = normalize(
            &crawler_fields(),
            form(&[("zeta", "1"), ("maxItems", "3"), ("alpha", "2"), ("mid", "x")]),
        )
        .unwrap();
        let keys: Vec<&str> = out.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["maxItems", "zeta", "alpha", "mid"]);
    }

    #[test]
    fn start_urls_lines_become_url_objects() {
        let out = normalize(
            &crawler_fields(),
            form(&[("startUrls", "https://a.com\nhttps://b.com")]),
        )
        .unwrap();
        assert_eq!(
            out["startUrls"],
            json!([{ "url": "https://a.com" }, { "url": "https://b.com" }])
        );
    }

    #[test]
    fn start_urls_json_array_is_kept_verbatim() {
        let out = normalize(
            &crawler_fields(),
            form(&[("startUrls", r#"[{"url":"https://x.com"}]"#)]),
        )
        .unwrap();
        assert_eq!(out["startUrls"], json!([{ "url": "https://x.com" }]));
    }

    #[test]
    fn pseudo_urls_wrap_as_purl() {
        let out = normalize(
            &crawler_fields(),
            form(&[("pseudoUrls", "  https://a.com/[.*]  \n\n")]),
        )
        .unwrap();
        assert_eq!(out["pseudoUrls"], json!([{ "purl": "https://a.com/[.*]" }]));
    }

    #[test]
    fn generic_arrays_split_lines() {
        let out = normalize(&crawler_fields(), form(&[("keywords", "cats\n\n dogs \n")])).unwrap();
        assert_eq!(out["keywords"], json!(["cats", "dogs"]));
    }

    #[test]
    fn numbers_are_parsed_or_rejected() {
        let out = normalize(
            &crawler_fields(),
            form(&[("maxItems", " 25 "), ("ratio", "0.5")]),
        )
        .unwrap();
        assert_eq!(out["maxItems"], json!(25));
        assert_eq!(out["ratio"], json!(0.5));

        let err = normalize(&crawler_fields(), form(&[("maxItems", "lots")])).unwrap_err();
        assert!(matches!(&err, Error::InvalidInput { field, .. } if field == "maxItems"));

        let err = normalize(&crawler_fields(), form(&[("maxItems", "2.5")])).unwrap_err();
        assert_eq!(err.field(), Some("maxItems"));
    }

    #[test]
    fn empty_optional_number_is_left_unset() {
        let out = normalize(&crawler_fields(), form(&[("maxItems", "   ")])).unwrap();
        assert!(!out.contains_key("maxItems"));
    }

    #[test]
    fn booleans_accept_truthy_forms() {
        for (text, expected) in [("true", true), ("YES", true), ("on", true), ("0", false)] {
            let out = normalize(&crawler_fields(), form(&[("headless", text)])).unwrap();
            assert_eq!(out["headless"], json!(expected), "input {text}");
        }
        assert!(normalize(&crawler_fields(), form(&[("headless", "maybe")])).is_err());
    }

    #[test]
    fn invalid_object_text_is_preserved() {
        let out = normalize(&crawler_fields(), form(&[("extra", "{broken")])).unwrap();
        assert_eq!(out["extra"], json!("{broken"));

        let out = normalize(&crawler_fields(), form(&[("extra", r#"{"a":1}"#)])).unwrap();
        assert_eq!(out["extra"], json!({ "a": 1 }));
    }

    #[test]
    fn enum_membership_is_enforced() {
        let out = normalize(&crawler_fields(), form(&[("mode", "full")])).unwrap();
        assert_eq!(out["mode"], json!("full"));

        let out = normalize(&crawler_fields(), form(&[("mode", "")])).unwrap();
        assert!(!out.contains_key("mode"));

        let err = normalize(&crawler_fields(), form(&[("mode", "turbo")])).unwrap_err();
        assert_eq!(err.field(), Some("mode"));
    }

    #[test]
    fn enum_match_returns_declared_typing() {
        let fields = fields(json!({
            "type": "object",
            "properties": { "level": { "type": "string", "enum": [1, 2] } }
        }));
        let out = normalize(&fields, form(&[("level", "2")])).unwrap();
        assert_eq!(out["level"], json!(2));
    }

    #[test]
    fn enum_on_array_falls_through_to_array_handling() {
        // Precedence between `enum` and `type: array` is undefined upstream;
        // the array rules win and the enum is not checked.
        let fields = fields(json!({
            "type": "object",
            "properties": { "tags": { "type": "array", "enum": ["a", "b"] } }
        }));
        let out = normalize(&fields, form(&[("tags", "a\nzzz")])).unwrap();
        assert_eq!(out["tags"], json!(["a", "zzz"]));
    }

    #[test]
    fn all_missing_required_fields_are_reported() {
        let fields = fields(json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "headless": { "type": "boolean" },
                "limit": { "type": "integer" },
                "country": { "type": "string", "default": "US" },
                "startUrls": { "type": "array" }
            },
            "required": ["query", "headless", "limit", "country", "startUrls"]
        }));
        let err = normalize(&fields, form(&[("query", "  ")])).unwrap_err();
        match err {
            Error::MissingRequiredFields { keys } => {
                assert_eq!(keys, vec!["query", "limit", "startUrls"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn required_boolean_and_defaults_are_filled() {
        let fields = fields(json!({
            "type": "object",
            "properties": {
                "headless": { "type": "boolean" },
                "country": { "type": "string", "default": "US" }
            },
            "required": ["headless", "country"]
        }));
        let out = normalize(&fields, form(&[])).unwrap();
        assert_eq!(out["headless"], json!(false));
        assert_eq!(out["country"], json!("US"));
    }

    #[test]
    fn pasted_json_is_coerced_per_field() {
        let out = normalize(
            &crawler_fields(),
            RawInput::Json(
                r#"{"maxItems": "7", "headless": true, "unknownKey": {"x": 1}, "startUrls": ["https://a.com"]}"#
                    .into(),
            ),
        )
        .unwrap();
        assert_eq!(out["maxItems"], json!(7));
        assert_eq!(out["headless"], json!(true));
        assert_eq!(out["unknownKey"], json!({ "x": 1 }));
        // bare strings are left for the policy engine to wrap
        assert_eq!(out["startUrls"], json!(["https://a.com"]));
    }

    #[test]
    fn pasted_json_must_be_an_object() {
        let err = normalize(&crawler_fields(), RawInput::Json("[1, 2]".into())).unwrap_err();
        assert_eq!(err.field(), Some("input"));
        let err = normalize(&crawler_fields(), RawInput::Json("{nope".into())).unwrap_err();
        assert_eq!(err.field(), Some("input"));
    }

    #[test]
    fn pasted_json_type_mismatch_is_rejected() {
        let err = normalize(
            &crawler_fields(),
            RawInput::Json(r#"{"keywords": 5}"#.into()),
        )
        .unwrap_err();
        assert_eq!(err.field(), Some("keywords"));
    }

    #[test]
    fn seed_url_builds_crawler_input() {
        let out = normalize(
            &crawler_fields(),
            RawInput::SeedUrl(" https://apify.com ".into()),
        )
        .unwrap();
        assert_eq!(out["startUrls"], json!([{ "url": "https://apify.com" }]));
        assert_eq!(out["maxPagesPerCrawl"], json!(5));
        assert_eq!(out["pageFunction"], json!(DEFAULT_PAGE_FUNCTION));

        let err = normalize(&crawler_fields(), RawInput::SeedUrl("   ".into())).unwrap_err();
        assert_eq!(err.field(), Some("startUrls"));
    }

    #[test]
    fn script_fields_keep_their_text() {
        let fields = fields(json!({
            "type": "object",
            "properties": { "pageFunction": { "type": "string" } }
        }));
        let script = "async function pageFunction() {\n  return 1;\n}\n";
        let out = normalize(&fields, form(&[("pageFunction", script)])).unwrap();
        assert_eq!(out["pageFunction"], json!(script));
    }

    #[test]
    fn custom_conventions_can_be_registered() {
        let conventions = FieldConventions::new().register(
            "keywords",
            Arc::new(|_field: &ParameterField, raw: &RawValue| -> Result<Option<Value>> {
                match raw {
                    RawValue::Text(s) => {
                        Ok(Some(json!(s.split(',').map(str::trim).collect::<Vec<_>>())))
                    }
                    _ => Ok(None),
                }
            }) as FieldTransformer,
        );
        let normalizer = InputNormalizer::new(conventions);
        assert!(!normalizer.conventions().has("startUrls"));

        let out = normalizer
            .normalize(&crawler_fields(), form(&[("keywords", "a, b"), ("startUrls", "https://a.com")]))
            .unwrap();
        assert_eq!(out["keywords"], json!(["a", "b"]));
        // without the convention startUrls is a plain list
        assert_eq!(out["startUrls"], json!(["https://a.com"]));
    }
}
