//! Validation pipeline.
//!
//! A [`ValidatorFactory`] compiles the tree's live schema into a
//! [`Validator`]; the raw [`ValidatorError`]s it reports are transformed
//! into [`JsonSchemaError`]s carrying a dotted `data_path`, which the tree
//! uses to hand each error to the node that owns it.

mod transform;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use transform::{transform_error, transform_errors};

/// Keyword of the error reported when the schema itself fails to compile.
pub const COMPILE_FAILED_KEYWORD: &str = "schemaCompileFailed";

/// Error as produced by a validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorError {
    pub keyword: String,
    pub instance_path: String,
    pub schema_path: String,
    #[serde(default)]
    pub params: Value,
    pub message: String,
}

/// Validator error located in the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonSchemaError {
    pub keyword: String,
    pub instance_path: String,
    pub schema_path: String,
    #[serde(default)]
    pub params: Value,
    pub message: String,
    /// Dotted path of the owning node (`.a[1].b`).
    pub data_path: String,
    /// Tag of an externally injected error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<u64>,
}

/// A compiled validator.
pub trait Validator {
    fn validate(&self, value: &Value) -> Vec<ValidatorError>;
}

/// Compiles schemas into validators.
pub trait ValidatorFactory {
    fn compile(&self, schema: &Value) -> Result<Box<dyn Validator>, String>;
}

// ──────────────────────────────────────────────
// jsonschema adapter
// ──────────────────────────────────────────────

/// [`ValidatorFactory`] backed by the `jsonschema` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaValidatorFactory;

struct JsonSchemaValidator {
    inner: jsonschema::Validator,
}

impl ValidatorFactory for JsonSchemaValidatorFactory {
    fn compile(&self, schema: &Value) -> Result<Box<dyn Validator>, String> {
        let inner = jsonschema::validator_for(schema).map_err(|e| e.to_string())?;
        Ok(Box::new(JsonSchemaValidator { inner }))
    }
}

impl Validator for JsonSchemaValidator {
    fn validate(&self, value: &Value) -> Vec<ValidatorError> {
        self.inner
            .iter_errors(value)
            .map(|err| {
                let schema_path = err.schema_path().to_string();
                let keyword = schema_path
                    .rsplit('/')
                    .find(|seg| !seg.is_empty() && !seg.bytes().all(|b| b.is_ascii_digit()))
                    .unwrap_or_default()
                    .to_string();
                let params = match err.kind() {
                    jsonschema::error::ValidationErrorKind::Required { property } => {
                        serde_json::json!({ "missingProperty": property })
                    }
                    _ => Value::Object(Default::default()),
                };
                ValidatorError {
                    keyword,
                    instance_path: err.instance_path().to_string(),
                    schema_path,
                    params,
                    message: err.to_string(),
                }
            })
            .collect()
    }
}

// ──────────────────────────────────────────────
// Fallback
// ──────────────────────────────────────────────

/// Validator used when the schema fails to compile: always reports one
/// [`COMPILE_FAILED_KEYWORD`] error so the tree stays usable.
#[derive(Debug, Clone)]
pub struct FallbackValidator {
    message: String,
    schema: Value,
}

impl FallbackValidator {
    pub fn new(message: impl Into<String>, schema: Value) -> Self {
        FallbackValidator {
            message: message.into(),
            schema,
        }
    }
}

impl Validator for FallbackValidator {
    fn validate(&self, _value: &Value) -> Vec<ValidatorError> {
        vec![ValidatorError {
            keyword: COMPILE_FAILED_KEYWORD.to_string(),
            instance_path: String::new(),
            schema_path: String::new(),
            params: serde_json::json!({
                "error": self.message,
                "jsonSchema": self.schema,
            }),
            message: self.message.clone(),
        }]
    }
}

/// Compile with `factory`, degrading to a [`FallbackValidator`] on failure.
pub fn compile_or_fallback(factory: &dyn ValidatorFactory, schema: &Value) -> Box<dyn Validator> {
    match factory.compile(schema) {
        Ok(validator) => validator,
        Err(message) => {
            tracing::warn!(error = %message, "schema failed to compile, using fallback validator");
            Box::new(FallbackValidator::new(message, schema.clone()))
        }
    }
}
