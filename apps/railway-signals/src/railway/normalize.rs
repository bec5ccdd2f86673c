//! Repairs bulk-load payloads exported with bare `NaN` numbers.
//!
//! Strict JSON has no `NaN`, so the token is rewritten to `null` before
//! decoding. The rewrite only touches `NaN` outside string literals; a signal
//! named `"NaN"` keeps its name. After decoding, the tree is walked once more
//! so any non-finite number that survived becomes `null` too.

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
#[error("payload is not valid JSON: {0}")]
pub struct NormalizeError(#[from] serde_json::Error);

const NAN_TOKEN: &[u8] = b"NaN";
const NULL_TOKEN: &[u8] = b"null";

/// Returns a strict-JSON re-encoding of `input`.
pub fn normalize_json(input: &[u8]) -> Result<Vec<u8>, NormalizeError> {
    let rewritten = replace_nan_tokens(input);
    let mut value: Value = serde_json::from_slice(&rewritten)?;
    null_non_finite(&mut value);
    Ok(serde_json::to_vec(&value)?)
}

fn replace_nan_tokens(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut index = 0;

    while index < input.len() {
        let byte = input[index];
        if in_string {
            out.push(byte);
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            index += 1;
            continue;
        }

        if byte == b'"' {
            in_string = true;
            out.push(byte);
            index += 1;
        } else if input[index..].starts_with(NAN_TOKEN) {
            out.extend_from_slice(NULL_TOKEN);
            index += NAN_TOKEN.len();
        } else {
            out.push(byte);
            index += 1;
        }
    }
    out
}

/// No-op for numbers serde_json produced itself, which are always finite.
fn null_non_finite(value: &mut Value) {
    let non_finite = matches!(
        value,
        Value::Number(number) if number.as_f64().is_some_and(|float| !float.is_finite())
    );
    if non_finite {
        *value = Value::Null;
        return;
    }
    match value {
        Value::Array(items) => items.iter_mut().for_each(null_non_finite),
        Value::Object(map) => map.values_mut().for_each(null_non_finite),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {}
    }
}
