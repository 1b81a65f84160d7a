use serde_json::Value;

use super::{JsonSchemaError, ValidatorError};
use crate::pointer::{push_data_segment, to_data_path};

/// Locate one validator error in the tree.
///
/// The data path is a pure function of `instance_path`, `keyword` and
/// `params`: a `required` error also names the missing property so the
/// error lands on the missing child instead of its parent.
pub fn transform_error(error: ValidatorError) -> JsonSchemaError {
    let mut data_path = to_data_path(&error.instance_path);
    if error.keyword == "required" {
        if let Some(missing) = missing_property(&error.params) {
            push_data_segment(&mut data_path, missing);
        }
    }
    JsonSchemaError {
        keyword: error.keyword,
        instance_path: error.instance_path,
        schema_path: error.schema_path,
        params: error.params,
        message: error.message,
        data_path,
        key: None,
    }
}

pub fn transform_errors(errors: Vec<ValidatorError>) -> Vec<JsonSchemaError> {
    errors.into_iter().map(transform_error).collect()
}

fn missing_property(params: &Value) -> Option<&str> {
    params
        .get("missingProperty")
        .or_else(|| params.get("property"))
        .and_then(Value::as_str)
}
