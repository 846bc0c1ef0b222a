//! Conversion between plain JSON and Firestore typed values

use serde_json::{json, Map, Number, Value};

/// Plain JSON to a Firestore `Value`
pub fn to_firestore(value: &Value) -> Value {
    match value {
        Value::Null => json!({"nullValue": null}),
        Value::Bool(b) => json!({"booleanValue": b}),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({"integerValue": i.to_string()}),
            None => json!({"doubleValue": n}),
        },
        Value::String(s) => json!({"stringValue": s}),
        Value::Array(items) => {
            json!({"arrayValue": {"values": items.iter().map(to_firestore).collect::<Vec<_>>()}})
        }
        Value::Object(map) => json!({"mapValue": {"fields": to_fields(map)}}),
    }
}

/// A JSON object to a Firestore `fields` map
pub fn to_fields(map: &Map<String, Value>) -> Value {
    Value::Object(map.iter().map(|(k, v)| (k.clone(), to_firestore(v))).collect())
}

/// A Firestore `Value` to plain JSON
///
/// Timestamps, bytes and references come back as strings; geo points as
/// `{latitude, longitude}`.
pub fn from_firestore(value: &Value) -> Value {
    let Some(map) = value.as_object() else {
        return value.clone();
    };
    if let Some(v) = map.get("integerValue") {
        return match v {
            Value::String(s) => s
                .parse::<i64>()
                .map(|i| Value::Number(i.into()))
                .unwrap_or_else(|_| v.clone()),
            other => other.clone(),
        };
    }
    if let Some(v) = map.get("doubleValue") {
        return match v {
            Value::String(s) => s
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| v.clone()),
            other => other.clone(),
        };
    }
    if let Some(fields) = map.get("mapValue") {
        return fields
            .get("fields")
            .and_then(Value::as_object)
            .map(from_fields)
            .unwrap_or_else(|| Value::Object(Map::new()));
    }
    if let Some(array) = map.get("arrayValue") {
        return Value::Array(
            array
                .get("values")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(from_firestore).collect())
                .unwrap_or_default(),
        );
    }
    if map.contains_key("nullValue") {
        return Value::Null;
    }
    for key in [
        "booleanValue",
        "stringValue",
        "timestampValue",
        "bytesValue",
        "referenceValue",
        "geoPointValue",
    ] {
        if let Some(v) = map.get(key) {
            return v.clone();
        }
    }
    value.clone()
}

/// A Firestore `fields` map to a JSON object
pub fn from_fields(fields: &Map<String, Value>) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), from_firestore(v)))
            .collect(),
    )
}

/// Quote a field path segment unless it is a simple identifier
pub fn field_path(name: &str) -> String {
    let simple = name
        .chars()
        .next()
        .is_some_and(|c| c == '_' || c.is_ascii_alphabetic())
        && name.chars().all(|c| c == '_' || c.is_ascii_alphanumeric());
    if simple {
        name.to_string()
    } else {
        format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_plain_json() {
        let plain = json!({
            "name": "ada",
            "age": 36,
            "score": 9.5,
            "active": true,
            "tags": ["a", 1],
            "address": {"city": "London"},
            "nickname": null
        });
        let fields = to_fields(plain.as_object().unwrap());
        assert_eq!(fields["age"], json!({"integerValue": "36"}));
        assert_eq!(fields["score"], json!({"doubleValue": 9.5}));
        assert_eq!(from_fields(fields.as_object().unwrap()), plain);
    }

    #[test]
    fn test_from_firestore_special_values() {
        assert_eq!(
            from_firestore(&json!({"timestampValue": "2024-01-01T00:00:00Z"})),
            json!("2024-01-01T00:00:00Z")
        );
        assert_eq!(
            from_firestore(&json!({"geoPointValue": {"latitude": 1.5, "longitude": 2.0}})),
            json!({"latitude": 1.5, "longitude": 2.0})
        );
        assert_eq!(from_firestore(&json!({"arrayValue": {}})), json!([]));
        assert_eq!(from_firestore(&json!({"mapValue": {}})), json!({}));
    }

    #[test]
    fn test_field_path_quoting() {
        assert_eq!(field_path("age"), "age");
        assert_eq!(field_path("first name"), "`first name`");
        assert_eq!(field_path("9lives"), "`9lives`");
    }
}
