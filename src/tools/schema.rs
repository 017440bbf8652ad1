//! Declarative parameter schemas and the typed values they produce.
//!
//! A [`ParamSchema`] is an ordered list of [`FieldSpec`]s. Order matters: it is
//! the order missing fields are reported in and the order a bare follow-up
//! message fills them.

use serde_json::{json, Map, Value};
use std::fmt;

/// Raw parameters as extracted by the classifier.
pub type RawParams = Map<String, Value>;

/// Scalar type of a field plus its constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    Str { min_len: usize },
    Int,
}

impl ParamKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Str { .. } => "string",
            Self::Int => "integer",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Requirement {
    Required,
    Default(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: ParamKind,
    pub requirement: Requirement,
    pub description: String,
}

impl FieldSpec {
    /// Required string field with no length constraint.
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Str { min_len: 0 },
            requirement: Requirement::Required,
            description: String::new(),
        }
    }

    /// Required integer field.
    pub fn integer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Int,
            requirement: Requirement::Required,
            description: String::new(),
        }
    }

    #[must_use]
    pub fn min_len(mut self, min_len: usize) -> Self {
        if let ParamKind::Str { .. } = self.kind {
            self.kind = ParamKind::Str { min_len };
        }
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: Value) -> Self {
        self.requirement = Requirement::Default(value);
        self
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn default_value(&self) -> Option<&Value> {
        match &self.requirement {
            Requirement::Required => None,
            Requirement::Default(v) => Some(v),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSchema {
    fields: Vec<FieldSpec>,
}

impl ParamSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// JSON Schema rendering used in the classifier prompt and `deskhand tools`.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for field in &self.fields {
            let mut prop = Map::new();
            prop.insert("type".into(), json!(field.kind.type_name()));
            if !field.description.is_empty() {
                prop.insert("description".into(), json!(field.description));
            }
            if let ParamKind::Str { min_len } = field.kind {
                if min_len > 0 {
                    prop.insert("minLength".into(), json!(min_len));
                }
            }
            match &field.requirement {
                Requirement::Required => required.push(json!(field.name)),
                Requirement::Default(v) => {
                    prop.insert("default".into(), v.clone());
                }
            }
            properties.insert(field.name.clone(), Value::Object(prop));
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// A coerced parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
}

impl ParamValue {
    pub fn to_json(&self) -> Value {
        match self {
            Self::Str(s) => json!(s),
            Self::Int(i) => json!(i),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
        }
    }
}

/// Parameters that passed both validation passes, in schema order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedParams {
    values: Vec<(String, ParamValue)>,
}

impl ValidatedParams {
    pub(crate) fn push(&mut self, name: impl Into<String>, value: ParamValue) {
        self.values.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            ParamValue::Str(s) => Some(s),
            ParamValue::Int(_) => None,
        }
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            ParamValue::Int(i) => Some(*i),
            ParamValue::Str(_) => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trip_schema() -> ParamSchema {
        ParamSchema::new(vec![
            FieldSpec::integer("trip_no").describe("Trip number"),
            FieldSpec::string("reason").min_len(1),
            FieldSpec::integer("usr").with_default(json!(192_731)),
        ])
    }

    #[test]
    fn json_schema_lists_required_and_defaults() {
        let schema = trip_schema().to_json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["trip_no", "reason"]));
        assert_eq!(schema["properties"]["trip_no"]["type"], "integer");
        assert_eq!(schema["properties"]["trip_no"]["description"], "Trip number");
        assert_eq!(schema["properties"]["reason"]["minLength"], 1);
        assert_eq!(schema["properties"]["usr"]["default"], 192_731);
    }

    #[test]
    fn field_order_is_preserved() {
        assert_eq!(trip_schema().field_names(), vec!["trip_no", "reason", "usr"]);
    }

    #[test]
    fn min_len_ignored_on_integer_fields() {
        let f = FieldSpec::integer("n").min_len(3);
        assert_eq!(f.kind, ParamKind::Int);
    }

    #[test]
    fn validated_params_typed_getters() {
        let mut params = ValidatedParams::default();
        params.push("trip_no", ParamValue::Int(42));
        params.push("reason", ParamValue::Str("sick".into()));

        assert_eq!(params.get_int("trip_no"), Some(42));
        assert_eq!(params.get_str("reason"), Some("sick"));
        assert_eq!(params.get_str("trip_no"), None);
        assert!(params.get("usr").is_none());
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("trip_no").unwrap().to_string(), "42");
    }
}
