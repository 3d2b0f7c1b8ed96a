//! Validation of typed payloads against a plugin's advertised schemas.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use jsonschema::JSONSchema;
use ocm_runtime::{Raw, Type, Typed};
use serde_json::Value;
use tracing::debug;

use crate::error::{PluginError, PluginResult};
use crate::types::PluginId;

/// Validates payloads against JSON Schemas keyed by type.
///
/// Schemas are compiled on first use and cached. Types without an
/// advertised schema always pass.
#[derive(Default)]
pub struct SchemaValidator {
    schemas: HashMap<Type, Value>,
    compiled: Mutex<HashMap<Type, Arc<JSONSchema>>>,
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("types", &self.schemas.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl SchemaValidator {
    /// Create a validator from advertised schemas.
    #[must_use]
    pub fn new(schemas: HashMap<Type, Value>) -> Self {
        Self {
            schemas,
            compiled: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a schema is advertised for the type.
    #[must_use]
    pub fn has_schema(&self, typ: &Type) -> bool {
        self.schemas.contains_key(typ)
    }

    fn compiled(
        &self,
        plugin_id: &PluginId,
        typ: &Type,
        schema: &Value,
    ) -> PluginResult<Arc<JSONSchema>> {
        let mut cache = self.compiled.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(compiled) = cache.get(typ) {
            return Ok(Arc::clone(compiled));
        }

        let compiled = JSONSchema::compile(schema).map_err(|e| PluginError::Validation {
            plugin_id: plugin_id.clone(),
            typ: typ.clone(),
            errors: vec![format!("advertised schema does not compile: {e}")],
        })?;
        debug!(plugin_id = %plugin_id, typ = %typ, "Compiled plugin schema");
        let compiled = Arc::new(compiled);
        cache.insert(typ.clone(), Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Validate a payload against the schema advertised for its type.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Validation`] listing every violation.
    pub fn validate(&self, plugin_id: &PluginId, payload: &Raw) -> PluginResult<()> {
        let typ = payload.get_type();
        let Some(schema) = self.schemas.get(typ) else {
            return Ok(());
        };

        let compiled = self.compiled(plugin_id, typ, schema)?;
        let instance = payload.to_value();
        let result = compiled.validate(&instance);
        if let Err(violations) = result {
            let errors: Vec<String> = violations
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{path}: {e}")
                    }
                })
                .collect();
            return Err(PluginError::Validation {
                plugin_id: plugin_id.clone(),
                typ: typ.clone(),
                errors,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator() -> SchemaValidator {
        let mut schemas = HashMap::new();
        schemas.insert(
            Type::versioned("OCIImage", "v1"),
            json!({
                "type": "object",
                "required": ["imageReference"],
                "properties": {
                    "type": {"type": "string"},
                    "imageReference": {"type": "string"}
                }
            }),
        );
        SchemaValidator::new(schemas)
    }

    #[test]
    fn test_valid_payload_passes() {
        let raw = Raw::from_value(json!({"type": "OCIImage/v1", "imageReference": "a:b"})).unwrap();
        assert!(validator().validate(&PluginId::from_static("oci"), &raw).is_ok());
    }

    #[test]
    fn test_invalid_payload_lists_errors() {
        let raw = Raw::from_value(json!({"type": "OCIImage/v1", "imageReference": 3})).unwrap();
        let err = validator()
            .validate(&PluginId::from_static("oci"), &raw)
            .unwrap_err();
        let PluginError::Validation { errors, typ, .. } = err else {
            panic!("expected validation error");
        };
        assert_eq!(typ, Type::versioned("OCIImage", "v1"));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("imageReference"));
    }

    #[test]
    fn test_missing_required_field() {
        let raw = Raw::from_value(json!({"type": "OCIImage/v1"})).unwrap();
        assert!(validator().validate(&PluginId::from_static("oci"), &raw).is_err());
    }

    #[test]
    fn test_types_without_schema_pass() {
        let raw = Raw::from_value(json!({"type": "helm/v1", "anything": true})).unwrap();
        let validator = validator();
        assert!(!validator.has_schema(raw.get_type()));
        assert!(validator.validate(&PluginId::from_static("oci"), &raw).is_ok());
    }

    #[test]
    fn test_compiled_schema_is_cached() {
        let validator = validator();
        let raw = Raw::from_value(json!({"type": "OCIImage/v1", "imageReference": "a"})).unwrap();
        validator.validate(&PluginId::from_static("oci"), &raw).unwrap();
        validator.validate(&PluginId::from_static("oci"), &raw).unwrap();
        assert_eq!(validator.compiled.lock().unwrap().len(), 1);
    }
}
