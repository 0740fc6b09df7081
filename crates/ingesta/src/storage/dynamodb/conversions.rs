//! DynamoDB attribute conversion functions.
//!
//! Pure functions for converting between `AttributeValue` maps and items.
//! These are testable in isolation without DynamoDB access.

use std::collections::{BTreeMap, HashMap};

use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;
use ingesta_core::item::{decode_item, encode_item, Item, Value};
use ingesta_core::page::Cursor;

use super::error::ConversionError;

/// Convert a value to its SDK representation.
pub fn value_to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::S(s) => AttributeValue::S(s.clone()),
        Value::N(n) => AttributeValue::N(n.clone()),
        Value::B(b) => AttributeValue::B(Blob::new(b.clone())),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Null => AttributeValue::Null(true),
        Value::L(items) => AttributeValue::L(items.iter().map(value_to_attribute).collect()),
        Value::M(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_attribute(v)))
                .collect(),
        ),
        Value::Ss(ss) => AttributeValue::Ss(ss.clone()),
        Value::Ns(ns) => AttributeValue::Ns(ns.clone()),
        Value::Bs(bs) => AttributeValue::Bs(bs.iter().cloned().map(Blob::new).collect()),
    }
}

/// Convert an SDK attribute to a value.
pub fn attribute_to_value(attribute: AttributeValue) -> Result<Value, ConversionError> {
    let value = match attribute {
        AttributeValue::S(s) => Value::S(s),
        AttributeValue::N(n) => Value::N(n),
        AttributeValue::B(b) => Value::B(b.into_inner()),
        AttributeValue::Bool(b) => Value::Bool(b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::L(items) => Value::L(
            items
                .into_iter()
                .map(attribute_to_value)
                .collect::<Result<_, _>>()?,
        ),
        AttributeValue::M(map) => Value::M(attributes_to_map(map)?),
        AttributeValue::Ss(ss) => Value::Ss(ss),
        AttributeValue::Ns(ns) => Value::Ns(ns),
        AttributeValue::Bs(bs) => Value::Bs(bs.into_iter().map(Blob::into_inner).collect()),
        other => return Err(ConversionError(format!("{other:?}"))),
    };
    Ok(value)
}

fn attributes_to_map(
    attributes: HashMap<String, AttributeValue>,
) -> Result<BTreeMap<String, Value>, ConversionError> {
    attributes
        .into_iter()
        .map(|(k, v)| attribute_to_value(v).map(|v| (k, v)))
        .collect()
}

/// Convert an item to a DynamoDB item.
pub fn item_to_attributes(item: &Item) -> HashMap<String, AttributeValue> {
    item.iter()
        .map(|(k, v)| (k.clone(), value_to_attribute(v)))
        .collect()
}

/// Convert a DynamoDB item to an item.
pub fn attributes_to_item(
    attributes: HashMap<String, AttributeValue>,
) -> Result<Item, ConversionError> {
    attributes_to_map(attributes).map(Item::from)
}

/// Encode a `LastEvaluatedKey` as a cursor: the DynamoDB-JSON of the key.
pub fn cursor_from_key(key: HashMap<String, AttributeValue>) -> Result<Cursor, ConversionError> {
    attributes_to_item(key).map(|item| Cursor::new(encode_item(&item)))
}

/// Decode a cursor back into an `ExclusiveStartKey`.
pub fn cursor_to_key(cursor: &Cursor) -> Result<HashMap<String, AttributeValue>, ConversionError> {
    decode_item(cursor.as_str())
        .map(|item| item_to_attributes(&item))
        .map_err(|e| ConversionError(format!("cursor {}: {e}", cursor)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_round_trip() {
        let mut nested = BTreeMap::new();
        nested.insert("city".to_string(), Value::from("Lima"));
        let item = Item::new()
            .with("pk", "USER#1")
            .with("age", 30)
            .with("avatar", Value::B(vec![0, 1, 2]))
            .with("deleted", Value::Null)
            .with("address", Value::M(nested))
            .with("tags", Value::Ss(vec!["a".to_string(), "b".to_string()]))
            .with("history", Value::L(vec![Value::from(true), Value::from("x")]));

        let attributes = item_to_attributes(&item);
        assert_eq!(attributes.get("age"), Some(&AttributeValue::N("30".to_string())));
        assert_eq!(attributes.get("deleted"), Some(&AttributeValue::Null(true)));
        assert_eq!(attributes_to_item(attributes).unwrap(), item);
    }

    #[test]
    fn test_cursor_is_dynamodb_json_of_key() {
        let mut key = HashMap::new();
        key.insert("pk".to_string(), AttributeValue::S("USER#9".to_string()));
        key.insert("sk".to_string(), AttributeValue::N("3".to_string()));

        let cursor = cursor_from_key(key.clone()).unwrap();
        assert_eq!(cursor.as_str(), r#"{"pk":{"S":"USER#9"},"sk":{"N":"3"}}"#);
        assert_eq!(cursor_to_key(&cursor).unwrap(), key);
    }

    #[test]
    fn test_invalid_cursor() {
        assert!(cursor_to_key(&Cursor::new("garbage")).is_err());
    }
}
