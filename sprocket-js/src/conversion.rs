use boa_engine::property::PropertyKey;
use boa_engine::{Context, JsString, JsValue, Source};
use serde_json::Value as JsonValue;

use crate::JsExecutionError;

const TEMP_RESULT: &str = "__temp_result";

/// Convert a JavaScript value to JSON through `JSON.stringify`
///
/// `undefined`, functions and symbols become `null`.
pub fn convert_js_result_to_json(context: &mut Context, value: JsValue) -> Result<JsonValue, JsExecutionError> {
    if value.is_undefined() || value.is_null() {
        return Ok(JsonValue::Null);
    }

    context
        .global_object()
        .set(PropertyKey::from(JsString::from(TEMP_RESULT)), value, true, context)
        .map_err(|e| JsExecutionError::OutputError(format!("Failed to stage result: {}", e)))?;

    let text = context
        .eval(Source::from_bytes(&format!("JSON.stringify({})", TEMP_RESULT)))
        .map_err(|e| JsExecutionError::OutputError(format!("Failed to stringify result: {}", e)))?;

    if text.is_undefined() {
        return Ok(JsonValue::Null);
    }

    let text = text
        .to_string(context)
        .map_err(|e| JsExecutionError::OutputError(e.to_string()))?
        .to_std_string_escaped();

    serde_json::from_str(&text)
        .map_err(|e| JsExecutionError::OutputError(format!("Result is not valid JSON: {}", e)))
}
