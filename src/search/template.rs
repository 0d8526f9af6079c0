//! Filter template values.
//!
//! A filter such as `age > {min_age} and tag in {tags}` is sent verbatim and
//! its placeholders are bound through a typed map. Scalars map one to one;
//! arrays take their element type from their first element.

use std::collections::HashMap;

use serde_json::{ Map, Value };

use crate::error::{ MarshalError, Result };
use crate::proto::{
    template_array_value,
    template_value,
    BoolArray,
    DoubleArray,
    JsonArray,
    LongArray,
    StringArray,
    TemplateArrayValue,
    TemplateArrayValueArray,
    TemplateValue,
};

/// Converts named filter values into wire template values. Null and
/// top-level object values carry no template type and are skipped.
pub fn format_expr_values(values: &Map<String, Value>) -> Result<HashMap<String, TemplateValue>> {
    let mut out = HashMap::with_capacity(values.len());
    for (key, value) in values {
        let val = match value {
            Value::Bool(b) => template_value::Val::BoolVal(*b),
            Value::Number(n) =>
                match n.as_i64() {
                    Some(i) => template_value::Val::Int64Val(i),
                    None => template_value::Val::FloatVal(n.as_f64().unwrap_or(f64::NAN)),
                }
            Value::String(s) => template_value::Val::StringVal(s.clone()),
            Value::Array(items) =>
                template_value::Val::ArrayVal(
                    convert_array(items).map_err(|reason| {
                        MarshalError::search_config(format!("Filter parameter '{}': {}", key, reason))
                    })?
                ),
            Value::Null | Value::Object(_) => {
                continue;
            }
        };
        out.insert(key.clone(), TemplateValue { val: Some(val) });
    }
    Ok(out)
}

fn convert_array(items: &[Value]) -> std::result::Result<TemplateArrayValue, String> {
    use template_array_value::Data;

    let data = match items.first() {
        None => Data::StringData(StringArray { data: Vec::new() }),
        Some(Value::Bool(_)) =>
            Data::BoolData(BoolArray {
                data: items
                    .iter()
                    .map(|v| v.as_bool().ok_or_else(|| mixed("bool", v)))
                    .collect::<std::result::Result<_, _>>()?,
            }),
        Some(Value::Number(_)) => {
            if items.iter().all(|v| v.is_i64()) {
                Data::LongData(LongArray {
                    data: items.iter().filter_map(Value::as_i64).collect(),
                })
            } else {
                Data::DoubleData(DoubleArray {
                    data: items
                        .iter()
                        .map(|v| v.as_f64().ok_or_else(|| mixed("number", v)))
                        .collect::<std::result::Result<_, _>>()?,
                })
            }
        }
        Some(Value::String(_)) =>
            Data::StringData(StringArray {
                data: items
                    .iter()
                    .map(|v|
                        v
                            .as_str()
                            .map(str::to_string)
                            .ok_or_else(|| mixed("string", v))
                    )
                    .collect::<std::result::Result<_, _>>()?,
            }),
        Some(Value::Array(_)) =>
            Data::ArrayData(TemplateArrayValueArray {
                data: items
                    .iter()
                    .map(|v| {
                        v.as_array()
                            .ok_or_else(|| mixed("array", v))
                            .and_then(|inner| convert_array(inner))
                    })
                    .collect::<std::result::Result<_, _>>()?,
            }),
        Some(Value::Object(_)) =>
            Data::JsonData(JsonArray {
                data: items
                    .iter()
                    .map(|v| v.to_string().into_bytes())
                    .collect(),
            }),
        Some(Value::Null) => {
            return Err("array elements must not be null".to_string());
        }
    };
    Ok(TemplateArrayValue { data: Some(data) })
}

fn mixed(expected: &str, got: &Value) -> String {
    format!("mixed array element types: expected {}, found {}", expected, got)
}
