//! Untyped payloads.

use schemars::JsonSchema;
use schemars::r#gen::SchemaGenerator;
use schemars::schema::{InstanceType, ObjectValidation, Schema, SchemaObject};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{RuntimeResult, SchemeError};
use crate::typed::Typed;
use crate::types::Type;

/// The JSON field holding a payload's type tag.
pub const TYPE_FIELD: &str = "type";

/// An untyped payload that keeps its type tag.
///
/// On the wire a `Raw` is a JSON object with a `"type"` member plus
/// arbitrary other members. The type tag is held separately from the
/// remaining fields so it can be inspected without decoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Raw {
    typ: Type,
    fields: Map<String, Value>,
}

impl Raw {
    /// Create a payload from a type and its (non-type) fields.
    #[must_use]
    pub fn new(typ: Type, mut fields: Map<String, Value>) -> Self {
        fields.remove(TYPE_FIELD);
        Self { typ, fields }
    }

    /// Build a payload from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not an object or its `"type"`
    /// member is not a valid type identifier.
    pub fn from_value(value: Value) -> RuntimeResult<Self> {
        let Value::Object(mut fields) = value else {
            return Err(SchemeError::InvalidPayload(
                "typed payloads must be JSON objects".into(),
            ));
        };
        let typ = match fields.remove(TYPE_FIELD) {
            None | Some(Value::Null) => Type::default(),
            Some(Value::String(s)) => Type::parse(&s)?,
            Some(other) => {
                return Err(SchemeError::InvalidPayload(format!(
                    "type member must be a string, got {other}"
                )));
            },
        };
        Ok(Self { typ, fields })
    }

    /// Serialize any value into a payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the value does not serialize to a typed JSON object.
    pub fn from_serializable<T: Serialize + ?Sized>(value: &T) -> RuntimeResult<Self> {
        Self::from_value(serde_json::to_value(value)?)
    }

    /// The full JSON object, including the `"type"` member.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut object = self.fields.clone();
        if !self.typ.is_empty() {
            object.insert(TYPE_FIELD.to_string(), Value::String(self.typ.to_string()));
        }
        Value::Object(object)
    }

    /// The non-type fields.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Look up a single field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set a single field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if key != TYPE_FIELD {
            self.fields.insert(key, value);
        }
        self
    }
}

impl Typed for Raw {
    fn get_type(&self) -> &Type {
        &self.typ
    }

    fn set_type(&mut self, typ: Type) {
        self.typ = typ;
    }
}

impl Serialize for Raw {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Raw {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

/// Any JSON object with a string `"type"` member.
impl JsonSchema for Raw {
    fn schema_name() -> String {
        "Raw".to_string()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        let mut object = ObjectValidation::default();
        object
            .properties
            .insert(TYPE_FIELD.to_string(), generator.subschema_for::<Type>());
        SchemaObject {
            instance_type: Some(InstanceType::Object.into()),
            object: Some(Box::new(object)),
            ..SchemaObject::default()
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_keeps_type_separate() {
        let raw: Raw =
            serde_json::from_value(json!({"type": "OCIImage/v1", "imageReference": "a:b"}))
                .unwrap();
        assert_eq!(raw.get_type(), &Type::versioned("OCIImage", "v1"));
        assert_eq!(raw.fields().len(), 1);
        assert_eq!(raw.field("imageReference"), Some(&json!("a:b")));
    }

    #[test]
    fn test_raw_serializes_verbatim() {
        let input = json!({"type": "helm/v1", "chart": "podinfo", "version": "6.0.0"});
        let raw: Raw = serde_json::from_value(input.clone()).unwrap();
        assert_eq!(serde_json::to_value(&raw).unwrap(), input);
    }

    #[test]
    fn test_raw_without_type() {
        let raw = Raw::from_value(json!({"path": "/tmp/x"})).unwrap();
        assert!(raw.get_type().is_empty());
        assert_eq!(raw.to_value(), json!({"path": "/tmp/x"}));
    }

    #[test]
    fn test_raw_rejects_non_objects() {
        assert!(Raw::from_value(json!("OCIImage")).is_err());
        assert!(Raw::from_value(json!({"type": 3})).is_err());
    }

    #[test]
    fn test_set_type_and_fields() {
        let mut raw = Raw::new(Type::new("a"), Map::new()).with_field("k", json!(1));
        raw.set_type(Type::versioned("a", "v1"));
        assert_eq!(raw.to_value(), json!({"type": "a/v1", "k": 1}));

        let unchanged = raw.clone().with_field(TYPE_FIELD, json!("b"));
        assert_eq!(unchanged, raw);
    }
}
