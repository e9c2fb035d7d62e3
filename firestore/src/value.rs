//! Conversion between JSON values and Firestore REST typed values.
//!
//! Integers travel as strings (`{"integerValue": "42"}`); timestamps, bytes
//! and references decode to strings, geo points to
//! `{"latitude", "longitude"}` objects. Timestamps are written back as
//! `timestampValue` only when marked, see [`timestamp`].

use crate::backend::{Document, Fields};
use crate::error::BackendError;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Number, Value, json};

/// Key of the single-entry object that marks a timestamp field.
pub const TIMESTAMP_MARKER: &str = "$timestamp";

/// Serde adapter for `Option<DateTime<Utc>>` fields stored as Firestore
/// timestamps.
///
/// Serializes to `{"$timestamp": "<rfc3339>"}`, which [`encode_value`] turns
/// into a `timestampValue`. Deserializes from either that object or the plain
/// RFC 3339 string a decoded `timestampValue` becomes.
///
/// ```
/// use chrono::{DateTime, Utc};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Token {
///     #[serde(default, with = "cloudfn_firestore::value::timestamp")]
///     expires_at: Option<DateTime<Utc>>,
/// }
/// ```
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Stored {
        Plain(DateTime<Utc>),
        Marked {
            #[serde(rename = "$timestamp")]
            at: DateTime<Utc>,
        },
    }

    /// Serialize as a marked timestamp, or `null`.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(at) => BTreeMap::from([(super::TIMESTAMP_MARKER, at.to_rfc3339_opts(SecondsFormat::Micros, true))])
                .serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize from a marked timestamp, an RFC 3339 string, or `null`.
    ///
    /// # Errors
    ///
    /// Fails when the value is neither form.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        Ok(Option::<Stored>::deserialize(deserializer)?.map(|stored| match stored {
            Stored::Plain(at) | Stored::Marked { at } => at,
        }))
    }
}

/// Encode a JSON value as a typed value.
#[must_use]
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(fields) => marked_timestamp(fields).map_or_else(
            || json!({ "mapValue": { "fields": encode_fields(fields) } }),
            |at| json!({ "timestampValue": at }),
        ),
    }
}

fn marked_timestamp(fields: &Map<String, Value>) -> Option<&str> {
    if fields.len() != 1 {
        return None;
    }
    fields.get(TIMESTAMP_MARKER)?.as_str()
}

/// Encode every field of a map.
#[must_use]
pub fn encode_fields(fields: &Fields) -> Map<String, Value> {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), encode_value(v)))
        .collect()
}

/// Decode a typed value.
///
/// # Errors
///
/// Returns an error for an unknown value type or a malformed integer.
pub fn decode_value(typed: &Value) -> Result<Value, BackendError> {
    let Some(object) = typed.as_object() else {
        return Err(malformed("typed value is not an object", typed));
    };
    let Some((kind, inner)) = object.iter().next() else {
        return Err(malformed("typed value is empty", typed));
    };

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => inner
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| malformed("booleanValue", inner)),
        "integerValue" => decode_integer(inner),
        "doubleValue" => Ok(decode_double(inner)),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => Ok(inner.clone()),
        "geoPointValue" => Ok(json!({
            "latitude": inner.get("latitude").cloned().unwrap_or(json!(0.0)),
            "longitude": inner.get("longitude").cloned().unwrap_or(json!(0.0)),
        })),
        "arrayValue" => inner
            .get("values")
            .and_then(Value::as_array)
            .map_or(Ok(Vec::new()), |values| values.iter().map(decode_value).collect())
            .map(Value::Array),
        "mapValue" => decode_fields(inner.get("fields")).map(Value::Object),
        other => Err(BackendError::other(format!("unsupported firestore value type '{other}'"))),
    }
}

/// Decode the `fields` object of a document or map value.
///
/// # Errors
///
/// Returns an error if any field fails to decode.
pub fn decode_fields(fields: Option<&Value>) -> Result<Fields, BackendError> {
    let Some(fields) = fields.and_then(Value::as_object) else {
        return Ok(Fields::new());
    };
    fields
        .iter()
        .map(|(k, v)| decode_value(v).map(|decoded| (k.clone(), decoded)))
        .collect()
}

fn decode_integer(inner: &Value) -> Result<Value, BackendError> {
    let parsed = match inner {
        Value::String(s) => s.parse::<i64>().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    };
    parsed
        .map(|i| Value::Number(i.into()))
        .ok_or_else(|| malformed("integerValue", inner))
}

fn decode_double(inner: &Value) -> Value {
    match inner {
        Value::Number(_) => inner.clone(),
        // NaN and infinities have no JSON number form
        Value::String(s) => s
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map_or(Value::Null, Value::Number),
        _ => Value::Null,
    }
}

fn malformed(what: &str, value: &Value) -> BackendError {
    BackendError::other(format!("malformed firestore {what}: {value}"))
}

/// Document resource as returned by the REST API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestDocument {
    /// Full resource name
    pub name: String,
    /// Typed fields
    #[serde(default)]
    pub fields: Option<Value>,
    /// Creation time
    #[serde(default)]
    pub create_time: Option<DateTime<Utc>>,
    /// Last update time
    #[serde(default)]
    pub update_time: Option<DateTime<Utc>>,
}

impl RestDocument {
    /// Convert into a [`Document`].
    ///
    /// # Errors
    ///
    /// Returns an error if a field fails to decode.
    pub fn into_document(self) -> Result<Document, BackendError> {
        let id = self.name.rsplit('/').next().unwrap_or_default().to_string();
        Ok(Document {
            id,
            fields: decode_fields(self.fields.as_ref())?,
            create_time: self.create_time,
            update_time: self.update_time,
        })
    }
}

/// Quote a top-level field name for an update mask.
///
/// Simple names (`[A-Za-z_][A-Za-z0-9_]*`) pass through; anything else is
/// wrapped in backticks with backticks and backslashes escaped.
#[must_use]
pub fn quote_field_path(name: &str) -> String {
    let mut chars = name.chars();
    let simple = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        return name.to_string();
    }
    let escaped = name.replace('\\', "\\\\").replace('`', "\\`");
    format!("`{escaped}`")
}
