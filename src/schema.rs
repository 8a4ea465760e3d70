//! Actor input schemas.
//!
//! Upstream records describe an actor's input with a JSON-Schema-like document
//! whose shape is only loosely enforced: the document may arrive as a native
//! object, as a JSON-encoded string, or not at all, and individual properties
//! may omit their `type`. Decoding here is lenient. A property always decodes
//! into one of the six [`PropertyKind`] variants, and a document is accepted as
//! soon as it is an object carrying `type` or `properties`.

use std::fmt;

use indexmap::IndexMap;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};

/// Editor hint marking an array property as a list of request URLs.
pub const URL_LIST_EDITOR: &str = "requestListSources";

/// Declared type of a schema property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "string" => Some(FieldType::String),
            "integer" => Some(FieldType::Integer),
            "number" => Some(FieldType::Number),
            "boolean" => Some(FieldType::Boolean),
            "array" => Some(FieldType::Array),
            "object" => Some(FieldType::Object),
            _ => None,
        }
    }

    /// Primitive kind of an example value. All numbers map to `number`, `null` to `string`.
    pub fn of_value(value: &Value) -> Self {
        match value {
            Value::Bool(_) => FieldType::Boolean,
            Value::Number(_) => FieldType::Number,
            Value::Array(_) => FieldType::Array,
            Value::Object(_) => FieldType::Object,
            Value::String(_) | Value::Null => FieldType::String,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific payload of a property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKind {
    String {
        default: Option<String>,
        format: Option<String>,
        pattern: Option<String>,
    },
    Integer {
        default: Option<i64>,
        minimum: Option<i64>,
        maximum: Option<i64>,
    },
    Number {
        default: Option<f64>,
        minimum: Option<f64>,
        maximum: Option<f64>,
    },
    Boolean {
        default: Option<bool>,
    },
    Array {
        default: Option<Vec<Value>>,
        items: Option<Box<SchemaProperty>>,
    },
    Object {
        default: Option<Map<String, Value>>,
    },
}

impl PropertyKind {
    /// Empty payload for the given type.
    pub fn empty(field_type: FieldType) -> Self {
        match field_type {
            FieldType::String => PropertyKind::String {
                default: None,
                format: None,
                pattern: None,
            },
            FieldType::Integer => PropertyKind::Integer {
                default: None,
                minimum: None,
                maximum: None,
            },
            FieldType::Number => PropertyKind::Number {
                default: None,
                minimum: None,
                maximum: None,
            },
            FieldType::Boolean => PropertyKind::Boolean { default: None },
            FieldType::Array => PropertyKind::Array {
                default: None,
                items: None,
            },
            FieldType::Object => PropertyKind::Object { default: None },
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            PropertyKind::String { .. } => FieldType::String,
            PropertyKind::Integer { .. } => FieldType::Integer,
            PropertyKind::Number { .. } => FieldType::Number,
            PropertyKind::Boolean { .. } => FieldType::Boolean,
            PropertyKind::Array { .. } => FieldType::Array,
            PropertyKind::Object { .. } => FieldType::Object,
        }
    }
}

/// One property of an [`InputSchema`].
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaProperty {
    pub kind: PropertyKind,
    pub title: Option<String>,
    pub description: Option<String>,
    /// UI editor hint, e.g. [`URL_LIST_EDITOR`].
    pub editor: Option<String>,
    /// Allowed values with their original JSON typing.
    pub enum_values: Option<Vec<Value>>,
    /// Suggested initial value (not applied by the service).
    pub prefill: Option<Value>,
}

impl SchemaProperty {
    pub fn new(kind: PropertyKind) -> Self {
        Self {
            kind,
            title: None,
            description: None,
            editor: None,
            enum_values: None,
            prefill: None,
        }
    }

    pub fn of_type(field_type: FieldType) -> Self {
        Self::new(PropertyKind::empty(field_type))
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_editor(mut self, editor: impl Into<String>) -> Self {
        self.editor = Some(editor.into());
        self
    }

    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    pub fn with_prefill(mut self, prefill: Value) -> Self {
        self.prefill = Some(prefill);
        self
    }

    pub fn field_type(&self) -> FieldType {
        self.kind.field_type()
    }

    /// Declared default as a JSON value, if any.
    pub fn default_value(&self) -> Option<Value> {
        match &self.kind {
            PropertyKind::String { default, .. } => default.clone().map(Value::String),
            PropertyKind::Integer { default, .. } => default.map(Value::from),
            PropertyKind::Number { default, .. } => default.and_then(float_value),
            PropertyKind::Boolean { default } => default.map(Value::Bool),
            PropertyKind::Array { default, .. } => default.clone().map(Value::Array),
            PropertyKind::Object { default } => default.clone().map(Value::Object),
        }
    }

    pub fn format(&self) -> Option<&str> {
        match &self.kind {
            PropertyKind::String { format, .. } => format.as_deref(),
            _ => None,
        }
    }

    /// Decode one property bag. Never fails: unknown or missing types fall back
    /// to an inferred kind, and defaults of the wrong shape are dropped.
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::of_type(FieldType::String);
        };
        let enum_values = obj.get("enum").and_then(Value::as_array).cloned();
        let field_type = declared_type(obj.get("type")).unwrap_or_else(|| infer_type(obj));
        let default = obj.get("default");

        let kind = match field_type {
            FieldType::String => PropertyKind::String {
                default: default.and_then(Value::as_str).map(str::to_string),
                format: string_attr(obj, "format"),
                pattern: string_attr(obj, "pattern"),
            },
            FieldType::Integer => PropertyKind::Integer {
                default: default.and_then(as_integer),
                minimum: obj.get("minimum").and_then(as_integer),
                maximum: obj.get("maximum").and_then(as_integer),
            },
            FieldType::Number => PropertyKind::Number {
                default: default.and_then(Value::as_f64),
                minimum: obj.get("minimum").and_then(Value::as_f64),
                maximum: obj.get("maximum").and_then(Value::as_f64),
            },
            FieldType::Boolean => PropertyKind::Boolean {
                default: default.and_then(Value::as_bool),
            },
            FieldType::Array => PropertyKind::Array {
                default: default.and_then(Value::as_array).cloned(),
                items: obj
                    .get("items")
                    .filter(|v| v.is_object())
                    .map(|v| Box::new(SchemaProperty::from_value(v))),
            },
            FieldType::Object => PropertyKind::Object {
                default: default.and_then(Value::as_object).cloned(),
            },
        };

        Self {
            kind,
            title: string_attr(obj, "title"),
            description: string_attr(obj, "description"),
            editor: string_attr(obj, "editor"),
            enum_values,
            prefill: obj.get("prefill").filter(|v| !v.is_null()).cloned(),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        out.insert("type".into(), Value::from(self.field_type().as_str()));
        insert_opt(&mut out, "title", self.title.clone().map(Value::String));
        insert_opt(
            &mut out,
            "description",
            self.description.clone().map(Value::String),
        );
        insert_opt(&mut out, "editor", self.editor.clone().map(Value::String));
        insert_opt(&mut out, "enum", self.enum_values.clone().map(Value::Array));
        insert_opt(&mut out, "default", self.default_value());
        insert_opt(&mut out, "prefill", self.prefill.clone());
        match &self.kind {
            PropertyKind::String {
                format, pattern, ..
            } => {
                insert_opt(&mut out, "format", format.clone().map(Value::String));
                insert_opt(&mut out, "pattern", pattern.clone().map(Value::String));
            }
            PropertyKind::Integer {
                minimum, maximum, ..
            } => {
                insert_opt(&mut out, "minimum", minimum.map(Value::from));
                insert_opt(&mut out, "maximum", maximum.map(Value::from));
            }
            PropertyKind::Number {
                minimum, maximum, ..
            } => {
                insert_opt(&mut out, "minimum", minimum.and_then(float_value));
                insert_opt(&mut out, "maximum", maximum.and_then(float_value));
            }
            PropertyKind::Array { items, .. } => {
                insert_opt(&mut out, "items", items.as_ref().map(|p| p.to_value()));
            }
            PropertyKind::Boolean { .. } | PropertyKind::Object { .. } => {}
        }
        Value::Object(out)
    }
}

impl Serialize for SchemaProperty {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SchemaProperty {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(SchemaProperty::from_value(&value))
    }
}

/// Input schema of an actor.
///
/// `properties` keeps declaration order. `required` only ever names keys that
/// exist in `properties`; unknown required keys from upstream are dropped.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InputSchema {
    pub title: Option<String>,
    pub description: Option<String>,
    pub schema_version: Option<u64>,
    pub properties: IndexMap<String, SchemaProperty>,
    pub required: Vec<String>,
}

impl InputSchema {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            schema_version: Some(1),
            ..Default::default()
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, property: SchemaProperty) -> Self {
        self.properties.insert(key.into(), property);
        self
    }

    /// Mark a declared property as required. Unknown keys are ignored.
    pub fn with_required(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if self.properties.contains_key(&key) && !self.required.contains(&key) {
            self.required.push(key);
        }
        self
    }

    pub fn is_required(&self, key: &str) -> bool {
        self.required.iter().any(|k| k == key)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Decode a schema document. Returns `None` unless the value is an object
    /// carrying at least `type` or `properties`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        if !obj.contains_key("type") && !obj.contains_key("properties") {
            return None;
        }

        let properties: IndexMap<String, SchemaProperty> = obj
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(key, prop)| (key.clone(), SchemaProperty::from_value(prop)))
                    .collect()
            })
            .unwrap_or_default();

        let mut required: Vec<String> = Vec::new();
        for key in obj
            .get("required")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
        {
            if properties.contains_key(key) && !required.iter().any(|k| k == key) {
                required.push(key.to_string());
            }
        }

        Some(Self {
            title: string_attr(obj, "title"),
            description: string_attr(obj, "description"),
            schema_version: obj.get("schemaVersion").and_then(Value::as_u64),
            properties,
            required,
        })
    }

    /// Decode the schema field of an upstream record, which may be a native
    /// object, a JSON-encoded string, or absent.
    ///
    /// `Ok(None)` means the record carries no usable schema; `Err` means the
    /// stored string is not valid JSON.
    pub fn from_record_field(
        field: Option<&Value>,
    ) -> std::result::Result<Option<Self>, serde_json::Error> {
        match field {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(raw)) => {
                if raw.trim().is_empty() {
                    return Ok(None);
                }
                let parsed: Value = serde_json::from_str(raw)?;
                Ok(Self::from_value(&parsed))
            }
            Some(other) => Ok(Self::from_value(other)),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        insert_opt(&mut out, "title", self.title.clone().map(Value::String));
        out.insert("type".into(), Value::from("object"));
        insert_opt(
            &mut out,
            "description",
            self.description.clone().map(Value::String),
        );
        insert_opt(&mut out, "schemaVersion", self.schema_version.map(Value::from));
        let props: Map<String, Value> = self
            .properties
            .iter()
            .map(|(k, p)| (k.clone(), p.to_value()))
            .collect();
        out.insert("properties".into(), Value::Object(props));
        if !self.required.is_empty() {
            out.insert(
                "required".into(),
                Value::Array(self.required.iter().cloned().map(Value::String).collect()),
            );
        }
        Value::Object(out)
    }
}

impl Serialize for InputSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for InputSchema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        InputSchema::from_value(&value).ok_or_else(|| {
            de::Error::custom("input schema must be an object with `type` or `properties`")
        })
    }
}

fn declared_type(raw: Option<&Value>) -> Option<FieldType> {
    match raw? {
        Value::String(s) => FieldType::parse(s),
        // ["string", "null"] style unions: first concrete member wins.
        Value::Array(types) => types.iter().filter_map(Value::as_str).find_map(FieldType::parse),
        _ => None,
    }
}

fn infer_type(obj: &Map<String, Value>) -> FieldType {
    if obj.contains_key("items") {
        FieldType::Array
    } else if obj.contains_key("properties") {
        FieldType::Object
    } else if let Some(default) = obj.get("default").filter(|v| !v.is_null()) {
        match default {
            Value::Number(n) if n.is_i64() || n.is_u64() => FieldType::Integer,
            other => FieldType::of_value(other),
        }
    } else {
        FieldType::String
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    if let Some(i) = value.as_i64() {
        return Some(i);
    }
    value
        .as_f64()
        .filter(|f| f.fract() == 0.0 && f.is_finite())
        .map(|f| f as i64)
}

fn float_value(f: f64) -> Option<Value> {
    Number::from_f64(f).map(Value::Number)
}

fn string_attr(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

fn insert_opt(out: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        out.insert(key.to_string(), value);
    }
}
