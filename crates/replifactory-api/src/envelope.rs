// Response normalization
//
// The backend reports failure several ways: non-2xx with `{detail}`,
// HTTP 200 with `{success: false, error}`, HTTP 200 with a bare `{error}`
// or `{detail}`. Every endpoint response passes through `decode` once so
// callers only ever see `Ok(payload)` or a typed `Error`.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Error;

const PREVIEW_LEN: usize = 200;

/// Normalize a raw response into the endpoint's payload type.
pub fn decode<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T, Error> {
    let trimmed = body.trim();
    let parsed: Option<Value> = if trimmed.is_empty() {
        Some(Value::Null)
    } else {
        serde_json::from_str(trimmed).ok()
    };

    if !status.is_success() {
        let message = parsed
            .as_ref()
            .and_then(extract_message)
            .unwrap_or_else(|| preview(trimmed));
        return Err(Error::Http {
            status: status.as_u16(),
            message,
        });
    }

    let Some(value) = parsed else {
        return Err(Error::Deserialization {
            message: format!("response is not JSON (body preview: {:?})", preview(trimmed)),
            body: body.to_owned(),
        });
    };

    if is_declared_failure(&value) {
        return Err(Error::Rejected {
            message: extract_message(&value),
        });
    }

    serde_json::from_value(value).map_err(|e| Error::Deserialization {
        message: format!("{e} (body preview: {:?})", preview(trimmed)),
        body: body.to_owned(),
    })
}

/// A 2xx body that still reports failure.
fn is_declared_failure(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    if obj.get("success").and_then(Value::as_bool) == Some(false) {
        return true;
    }
    if obj.get("error").is_some_and(|e| !e.is_null()) {
        return true;
    }
    obj.contains_key("detail") && !obj.contains_key("success") && !obj.contains_key("message")
}

/// Pull a human-readable message out of an error-shaped body.
///
/// Checks `detail`, then `error`, then `message`. FastAPI validation
/// errors put a list of `{msg}` objects under `detail`.
fn extract_message(value: &Value) -> Option<String> {
    let obj = value.as_object()?;
    ["detail", "error", "message"]
        .iter()
        .filter_map(|key| obj.get(*key))
        .find_map(message_text)
}

fn message_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|item| {
                    item.get("msg")
                        .and_then(Value::as_str)
                        .map(String::from)
                        .or_else(|| message_text(item))
                })
                .collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        Value::Object(map) => map
            .get("message")
            .and_then(message_text)
            .or_else(|| Some(value.to_string())),
        other => Some(other.to_string()),
    }
}

fn preview(body: &str) -> String {
    body.chars().take(PREVIEW_LEN).collect()
}

// ── Tests ────────────────────────────────────────────────────────────
