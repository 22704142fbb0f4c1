//! JSON codec for leaf scalars and standard containers.

use crate::error::ArborError;
use crate::value::{Key, KeyType, ScalarType, Value};
use serde_json::{Map, Number, Value as Json};
use std::collections::BTreeMap;

pub fn encode(value: &Value) -> Result<Json, ArborError> {
    Ok(match value {
        Value::Null => Json::Null,
        Value::Boolean(v) => Json::Bool(*v),
        Value::Integer(v) => Json::Number((*v).into()),
        Value::Unsigned(v) => Json::Number((*v).into()),
        Value::Float(v) => Json::Number(
            Number::from_f64(*v)
                .ok_or_else(|| ArborError::Encode(format!("non-finite float {v}")))?,
        ),
        Value::Text(v) => Json::String(v.to_string()),
        Value::List(items) => {
            Json::Array(items.iter().map(encode).collect::<Result<_, _>>()?)
        }
        Value::Map(entries) => {
            let mut obj = Map::new();
            for (k, v) in entries {
                obj.insert(k.clone(), encode(v)?);
            }
            Json::Object(obj)
        }
        // `decode` only ever stores re-serialized JSON here; the error arm
        // is reachable through a hand-built `Value::Json` only.
        Value::Json(raw) => serde_json::from_str(raw)
            .map_err(|e| ArborError::Encode(format!("stored json invalid: {e}")))?,
    })
}

pub fn decode(ty: &ScalarType, json: &Json) -> Result<Value, ArborError> {
    let mismatch = || {
        ArborError::Decode(format!(
            "expected {}, got {}",
            ty.name(),
            json_kind(json)
        ))
    };
    Ok(match ty {
        ScalarType::Boolean => Value::Boolean(json.as_bool().ok_or_else(mismatch)?),
        ScalarType::Integer => Value::Integer(json.as_i64().ok_or_else(mismatch)?),
        ScalarType::Unsigned => Value::Unsigned(json.as_u64().ok_or_else(mismatch)?),
        ScalarType::Float => Value::Float(json.as_f64().ok_or_else(mismatch)?),
        ScalarType::Text => Value::Text(json.as_str().ok_or_else(mismatch)?.into()),
        ScalarType::List(inner) => {
            let items = json.as_array().ok_or_else(mismatch)?;
            Value::List(
                items
                    .iter()
                    .map(|v| decode(inner, v))
                    .collect::<Result<_, _>>()?,
            )
        }
        ScalarType::Map(inner) => {
            let obj = json.as_object().ok_or_else(mismatch)?;
            let mut entries = BTreeMap::new();
            for (k, v) in obj {
                entries.insert(k.clone(), decode(inner, v)?);
            }
            Value::Map(entries)
        }
        ScalarType::Json => Value::Json(
            serde_json::to_string(json)
                .map_err(|e| ArborError::Decode(e.to_string()))?
                .into(),
        ),
    })
}

pub fn encode_key(key: &Key) -> Json {
    match key {
        Key::Int(v) => Json::Number((*v).into()),
        Key::Uint(v) => Json::Number((*v).into()),
        Key::Text(v) => Json::String(v.to_string()),
    }
}

pub fn decode_key(ty: KeyType, json: &Json) -> Result<Key, ArborError> {
    let mismatch = || {
        ArborError::Decode(format!(
            "expected {} key, got {}",
            ty.name(),
            json_kind(json)
        ))
    };
    Ok(match ty {
        KeyType::Int => Key::Int(json.as_i64().ok_or_else(mismatch)?),
        KeyType::Uint => Key::Uint(json.as_u64().ok_or_else(mismatch)?),
        KeyType::Text => Key::Text(json.as_str().ok_or_else(mismatch)?.into()),
    })
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::{decode, decode_key, encode, encode_key};
    use crate::value::{Key, KeyType, ScalarType, Value};
    use serde_json::json;

    #[test]
    fn scalar_round_trip() {
        let cases = [
            (ScalarType::Integer, Value::Integer(-7)),
            (ScalarType::Unsigned, Value::Unsigned(7)),
            (ScalarType::Boolean, Value::Boolean(true)),
            (ScalarType::Text, Value::from("ciao")),
            (
                ScalarType::List(Box::new(ScalarType::Integer)),
                Value::from(vec![1i64, 2, 3]),
            ),
        ];
        for (ty, value) in cases {
            let encoded = encode(&value).expect("encode");
            assert_eq!(decode(&ty, &encoded).expect("decode"), value);
        }
    }

    #[test]
    fn decode_is_strict_about_kinds() {
        assert!(decode(&ScalarType::Integer, &json!("3")).is_err());
        assert!(decode(&ScalarType::Text, &json!(3)).is_err());
        assert!(decode(&ScalarType::Unsigned, &json!(-1)).is_err());
        assert!(decode(
            &ScalarType::List(Box::new(ScalarType::Integer)),
            &json!([1, "x"])
        )
        .is_err());
    }

    #[test]
    fn json_payloads_round_trip_through_text() {
        let payload = json!({"b": [1, 2], "a": "x"});
        let decoded = decode(&ScalarType::Json, &payload).expect("decode");
        match &decoded {
            Value::Json(raw) => {
                serde_json::from_str::<serde_json::Value>(raw).expect("stored text is valid json");
            }
            other => panic!("expected a json value, got {other:?}"),
        }
        assert_eq!(encode(&decoded).expect("encode"), payload);
    }

    #[test]
    fn hand_built_corrupt_json_fails_to_encode() {
        let err = encode(&Value::Json("{oops".into())).expect_err("corrupt payload");
        assert_eq!(err.code_str(), "encode");
    }

    #[test]
    fn key_round_trip() {
        for key in [Key::Int(-3), Key::Uint(9), Key::Text("k".into())] {
            let ty = match &key {
                Key::Int(_) => KeyType::Int,
                Key::Uint(_) => KeyType::Uint,
                Key::Text(_) => KeyType::Text,
            };
            assert_eq!(decode_key(ty, &encode_key(&key)).expect("decode"), key);
        }
    }
}
