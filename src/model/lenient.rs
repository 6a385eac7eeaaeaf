use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Accepts either a JSON string or a JSON number and yields its textual form.
/// Upstream services are inconsistent about quoting identifiers and amounts.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, found {other}"
        ))),
    }
}
