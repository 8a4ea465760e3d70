//! Form-field projection of an [`InputSchema`].

use serde::Serialize;
use serde_json::Value;

use crate::schema::{FieldType, InputSchema, PropertyKind, SchemaProperty};

/// One input field derived from a schema property.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterField {
    pub key: String,
    /// Property title, or the key when the schema gives none.
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
    #[serde(rename = "schema")]
    pub property: SchemaProperty,
}

impl ParameterField {
    pub fn field_type(&self) -> FieldType {
        self.property.field_type()
    }

    pub fn default_value(&self) -> Option<Value> {
        self.property.default_value()
    }

    pub fn format(&self) -> Option<&str> {
        self.property.format()
    }

    pub fn editor(&self) -> Option<&str> {
        self.property.editor.as_deref()
    }

    /// Allowed values with their original typing, used for validation.
    pub fn enum_values(&self) -> Option<&[Value]> {
        self.property.enum_values.as_deref()
    }

    /// Allowed values rendered as strings, used for display.
    pub fn enum_labels(&self) -> Option<Vec<String>> {
        self.enum_values()
            .map(|values| values.iter().map(display_label).collect())
    }

    /// Declared item type for array fields.
    pub fn item_type(&self) -> Option<FieldType> {
        match &self.property.kind {
            PropertyKind::Array { items, .. } => items.as_ref().map(|p| p.field_type()),
            _ => None,
        }
    }
}

/// Project a schema into its ordered field list: one field per property,
/// in declaration order.
pub fn to_fields(schema: &InputSchema) -> Vec<ParameterField> {
    schema
        .properties
        .iter()
        .map(|(key, property)| ParameterField {
            key: key.clone(),
            title: property
                .title
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| key.clone()),
            description: property.description.clone(),
            required: schema.is_required(key),
            property: property.clone(),
        })
        .collect()
}

fn display_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample_schema() -> InputSchema {
        InputSchema::from_value(&json!({
            "type": "object",
            "properties": {
                "startUrls": { "type": "array", "title": "Start URLs", "items": { "type": "object" } },
                "maxItems": { "type": "integer" },
                "mode": { "type": "string", "enum": ["fast", "full"], "title": "" },
                "level": { "type": "integer", "enum": [1, 2, 3] }
            },
            "required": ["startUrls", "level"]
        }))
        .unwrap()
    }

    #[test]
    fn one_field_per_property_in_order() {
        let schema = sample_schema();
        let fields = to_fields(&schema);
        assert_eq!(fields.len(), schema.len());
        let keys: Vec<&str> = fields.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["startUrls", "maxItems", "mode", "level"]);
    }

    #[test]
    fn required_flags_follow_schema() {
        let fields = to_fields(&sample_schema());
        let required: Vec<bool> = fields.iter().map(|f| f.required).collect();
        assert_eq!(required, vec![true, false, false, true]);
    }

    #[test]
    fn title_falls_back_to_key() {
        let fields = to_fields(&sample_schema());
        assert_eq!(fields[0].title, "Start URLs");
        assert_eq!(fields[1].title, "maxItems");
        assert_eq!(fields[2].title, "mode");
    }

    #[test]
    fn enum_labels_are_strings_but_values_keep_type() {
        let fields = to_fields(&sample_schema());
        let level = &fields[3];
        assert_eq!(
            level.enum_labels(),
            Some(vec!["1".to_string(), "2".to_string(), "3".to_string()])
        );
        assert_eq!(level.enum_values().unwrap()[0], json!(1));
        assert_eq!(fields[0].item_type(), Some(FieldType::Object));
    }

    #[test]
    fn empty_schema_yields_no_fields() {
        let schema = InputSchema::from_value(&json!({ "type": "object" })).unwrap();
        assert!(to_fields(&schema).is_empty());
    }
}
