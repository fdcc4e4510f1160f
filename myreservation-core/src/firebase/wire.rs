//! Firestore REST JSON encoding.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{Document, Fields, Filter, Query, StoreError, Value};

/// A Firestore `Value` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum WireValue {
    NullValue(()),
    BooleanValue(bool),
    /// int64 travels as a decimal string.
    IntegerValue(String),
    DoubleValue(f64),
    TimestampValue(DateTime<Utc>),
    StringValue(String),
    BytesValue(String),
    ReferenceValue(String),
    GeoPointValue(serde_json::Value),
    ArrayValue(serde_json::Value),
    MapValue(serde_json::Value),
}

/// `ServerTimestamp` has no wire value; it is sent as a field transform.
pub(crate) fn encode_value(value: &Value) -> Option<WireValue> {
    Some(match value {
        Value::Null => WireValue::NullValue(()),
        Value::Bool(b) => WireValue::BooleanValue(*b),
        Value::Integer(n) => WireValue::IntegerValue(n.to_string()),
        Value::Double(d) => WireValue::DoubleValue(*d),
        Value::String(s) => WireValue::StringValue(s.clone()),
        Value::Timestamp(t) => WireValue::TimestampValue(*t),
        Value::ServerTimestamp => return None,
    })
}

/// Kinds the record model has no use for read as null.
pub(crate) fn decode_value(value: WireValue) -> Result<Value, StoreError> {
    Ok(match value {
        WireValue::NullValue(()) => Value::Null,
        WireValue::BooleanValue(b) => Value::Bool(b),
        WireValue::IntegerValue(n) => Value::Integer(
            n.parse()
                .map_err(|_| StoreError::Decode(format!("integerValue {:?}", n)))?,
        ),
        WireValue::DoubleValue(d) => Value::Double(d),
        WireValue::TimestampValue(t) => Value::Timestamp(t),
        WireValue::StringValue(s) | WireValue::ReferenceValue(s) => Value::String(s),
        WireValue::BytesValue(_)
        | WireValue::GeoPointValue(_)
        | WireValue::ArrayValue(_)
        | WireValue::MapValue(_) => Value::Null,
    })
}

/// Splits `fields` into stored values and the paths set to the server clock.
pub(crate) fn encode_fields(fields: &Fields) -> (BTreeMap<String, WireValue>, Vec<String>) {
    let mut values = BTreeMap::new();
    let mut server_timestamps = Vec::new();
    for (name, value) in fields {
        match encode_value(value) {
            Some(wire) => {
                values.insert(name.clone(), wire);
            }
            None => server_timestamps.push(field_path(name)),
        }
    }
    (values, server_timestamps)
}

/// Quotes a field name for use in a field path when it is not a simple name.
pub(crate) fn field_path(name: &str) -> String {
    let simple = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        name.to_string()
    } else {
        format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

/// A Firestore `Document` message.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireDocument {
    pub name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, WireValue>,
}

impl WireDocument {
    pub fn into_document(self) -> Result<Document, StoreError> {
        let id = self
            .name
            .rsplit('/')
            .next()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| StoreError::Decode(format!("document name {:?}", self.name)))?
            .to_string();

        let fields = self
            .fields
            .into_iter()
            .map(|(name, value)| decode_value(value).map(|v| (name, v)))
            .collect::<Result<Fields, _>>()?;

        Ok(Document { id, fields })
    }
}

/// Builds the `structuredQuery` of a `runQuery` request.
pub(crate) fn structured_query(query: &Query) -> Result<serde_json::Value, StoreError> {
    let mut structured = serde_json::json!({
        "from": [{ "collectionId": query.collection }],
    });

    let filters = query
        .filters
        .iter()
        .map(encode_filter)
        .collect::<Result<Vec<_>, _>>()?;

    let condition = match filters.len() {
        0 => None,
        1 => filters.into_iter().next(),
        _ => Some(serde_json::json!({
            "compositeFilter": { "op": "AND", "filters": filters }
        })),
    };
    if let Some(condition) = condition {
        structured["where"] = condition;
    }

    Ok(structured)
}

fn encode_filter(filter: &Filter) -> Result<serde_json::Value, StoreError> {
    let field = serde_json::json!({ "fieldPath": field_path(&filter.field) });

    if filter.value == Value::Null {
        return Ok(serde_json::json!({
            "unaryFilter": { "op": "IS_NULL", "field": field }
        }));
    }

    let value = encode_value(&filter.value).ok_or_else(|| {
        StoreError::InvalidArgument(format!("cannot filter {} on a server timestamp", filter.field))
    })?;

    Ok(serde_json::json!({
        "fieldFilter": { "field": field, "op": "EQUAL", "value": value }
    }))
}
