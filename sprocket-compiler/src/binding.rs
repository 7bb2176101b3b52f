//! Binding raw node values to typed parameters

use serde_json::Value as JsonValue;
use sprocket_core::{ParamType, ScriptDefinition, ScriptNode};

use crate::error::CompileError;

/// A parameter value after type normalization
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    Bool(bool),
    Text(String),
    Number(String),
}

impl BoundValue {
    /// Render as a literal in program text
    pub fn render(&self) -> String {
        match self {
            BoundValue::Bool(true) => "true".to_string(),
            BoundValue::Bool(false) => "false".to_string(),
            BoundValue::Text(text) => JsonValue::String(text.clone()).to_string(),
            BoundValue::Number(number) => number.clone(),
        }
    }

    pub fn as_bool(&self) -> bool {
        matches!(self, BoundValue::Bool(true))
    }

    pub fn as_text(&self) -> &str {
        match self {
            BoundValue::Text(text) | BoundValue::Number(text) => text,
            BoundValue::Bool(_) => "",
        }
    }
}

fn bind_bool(raw: Option<&str>) -> bool {
    match raw.map(str::trim) {
        None => false,
        Some(value) => !(value.is_empty() || value == "0" || value.eq_ignore_ascii_case("false")),
    }
}

/// Bind every declared parameter of `def` from the values of `node`
///
/// Values come back in declaration order. Unknown keys on the node are
/// ignored.
pub fn bind_params(
    def: &ScriptDefinition,
    node: &ScriptNode,
) -> Result<Vec<(String, BoundValue)>, CompileError> {
    let mut bound = Vec::with_capacity(def.params.len());

    for param in &def.params {
        let raw = node.value(&param.name);
        if param.kind.is_boolean() {
            bound.push((param.name.clone(), BoundValue::Bool(bind_bool(raw))));
            continue;
        }

        let mut value = raw.map(str::trim).unwrap_or_default().to_string();
        if value.is_empty() {
            if param.required {
                return Err(CompileError::MissingRequired {
                    field: param.display_title().to_string(),
                    script: def.display_title().to_string(),
                });
            }
            value = param.default.clone().unwrap_or_default();
        }

        let bound_value = match param.kind {
            ParamType::Number => {
                if value.is_empty() {
                    BoundValue::Number("0".to_string())
                } else if value.parse::<f64>().is_ok_and(f64::is_finite) {
                    BoundValue::Number(value)
                } else {
                    return Err(CompileError::InvalidValue {
                        field: param.display_title().to_string(),
                        script: def.display_title().to_string(),
                        value,
                    });
                }
            }
            _ => BoundValue::Text(value),
        };
        bound.push((param.name.clone(), bound_value));
    }

    Ok(bound)
}
