//! DynamoDB-JSON codec for items.
//!
//! Each attribute value is a single-key object whose key is the type tag:
//! `{"S": "text"}`, `{"N": "12.5"}`, `{"B": "<base64>"}`, `{"BOOL": true}`,
//! `{"NULL": true}`, `{"L": [..]}`, `{"M": {..}}`, `{"SS": [..]}`,
//! `{"NS": [..]}`, `{"BS": [..]}`.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{Map, Value as Json};

use super::error::{CodecError, Result};
use super::value::{Item, Value};

/// Encode a value into its tagged JSON form.
pub fn value_to_json(value: &Value) -> Json {
    let (tag, body) = match value {
        Value::S(s) => ("S", Json::String(s.clone())),
        Value::N(n) => ("N", Json::String(n.clone())),
        Value::B(b) => ("B", Json::String(STANDARD.encode(b))),
        Value::Bool(b) => ("BOOL", Json::Bool(*b)),
        Value::Null => ("NULL", Json::Bool(true)),
        Value::L(l) => ("L", Json::Array(l.iter().map(value_to_json).collect())),
        Value::M(m) => ("M", Json::Object(map_to_json(m))),
        Value::Ss(s) => ("SS", strings_to_json(s)),
        Value::Ns(s) => ("NS", strings_to_json(s)),
        Value::Bs(s) => (
            "BS",
            Json::Array(s.iter().map(|b| Json::String(STANDARD.encode(b))).collect()),
        ),
    };

    let mut obj = Map::new();
    obj.insert(tag.to_string(), body);
    Json::Object(obj)
}

/// Decode a tagged JSON value.
pub fn value_from_json(json: &Json) -> Result<Value> {
    let obj = json.as_object().ok_or(CodecError::NotAnObject)?;
    if obj.len() != 1 {
        return Err(CodecError::Shape {
            tag: "<value>".to_string(),
            expected: "exactly one type tag",
        });
    }
    let (tag, body) = obj.iter().next().ok_or(CodecError::NotAnObject)?;

    match tag.as_str() {
        "S" => Ok(Value::S(expect_str(tag, body)?.to_string())),
        "N" => Ok(Value::N(parse_number(expect_str(tag, body)?)?)),
        "B" => Ok(Value::B(decode_base64(expect_str(tag, body)?)?)),
        "BOOL" => body.as_bool().map(Value::Bool).ok_or(CodecError::Shape {
            tag: tag.clone(),
            expected: "a boolean",
        }),
        "NULL" => match body {
            Json::Bool(true) => Ok(Value::Null),
            _ => Err(CodecError::Shape {
                tag: tag.clone(),
                expected: "true",
            }),
        },
        "L" => expect_array(tag, body)?
            .iter()
            .map(value_from_json)
            .collect::<Result<Vec<_>>>()
            .map(Value::L),
        "M" => {
            let obj = body.as_object().ok_or(CodecError::Shape {
                tag: tag.clone(),
                expected: "an object",
            })?;
            map_from_json(obj).map(Value::M)
        }
        "SS" => expect_array(tag, body)?
            .iter()
            .map(|v| expect_str(tag, v).map(str::to_string))
            .collect::<Result<Vec<_>>>()
            .map(Value::Ss),
        "NS" => expect_array(tag, body)?
            .iter()
            .map(|v| expect_str(tag, v).and_then(parse_number))
            .collect::<Result<Vec<_>>>()
            .map(Value::Ns),
        "BS" => expect_array(tag, body)?
            .iter()
            .map(|v| expect_str(tag, v).and_then(decode_base64))
            .collect::<Result<Vec<_>>>()
            .map(Value::Bs),
        other => Err(CodecError::UnknownType(other.to_string())),
    }
}

/// Encode an item as a JSON object of tagged values.
pub fn item_to_json(item: &Item) -> Json {
    Json::Object(map_to_json(item.attributes()))
}

/// Decode an item from a JSON object of tagged values.
pub fn item_from_json(json: &Json) -> Result<Item> {
    let obj = json.as_object().ok_or(CodecError::NotAnObject)?;
    map_from_json(obj).map(Item::from)
}

/// Serialize an item to a single line of JSON (no trailing newline).
pub fn encode_item(item: &Item) -> String {
    item_to_json(item).to_string()
}

/// Parse an item from one line of JSON.
pub fn decode_item(line: &str) -> Result<Item> {
    let json: Json =
        serde_json::from_str(line).map_err(|e| CodecError::InvalidJson(e.to_string()))?;
    item_from_json(&json)
}

fn map_to_json(map: &BTreeMap<String, Value>) -> Map<String, Json> {
    map.iter()
        .map(|(k, v)| (k.clone(), value_to_json(v)))
        .collect()
}

fn map_from_json(obj: &Map<String, Json>) -> Result<BTreeMap<String, Value>> {
    obj.iter()
        .map(|(k, v)| value_from_json(v).map(|v| (k.clone(), v)))
        .collect()
}

fn strings_to_json(strings: &[String]) -> Json {
    Json::Array(strings.iter().cloned().map(Json::String).collect())
}

fn expect_str<'a>(tag: &str, body: &'a Json) -> Result<&'a str> {
    body.as_str().ok_or(CodecError::Shape {
        tag: tag.to_string(),
        expected: "a string",
    })
}

fn expect_array<'a>(tag: &str, body: &'a Json) -> Result<&'a Vec<Json>> {
    body.as_array().ok_or(CodecError::Shape {
        tag: tag.to_string(),
        expected: "an array",
    })
}

fn decode_base64(s: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(s)
        .map_err(|e| CodecError::InvalidBase64(e.to_string()))
}

/// Validate a decimal number string, keeping its exact text.
pub fn parse_number(s: &str) -> Result<String> {
    let plausible = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'));
    let finite = s.parse::<f64>().map(f64::is_finite).unwrap_or(false);

    if plausible && finite {
        Ok(s.to_string())
    } else {
        Err(CodecError::InvalidNumber(s.to_string()))
    }
}
