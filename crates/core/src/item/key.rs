use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::KeyError;
use super::value::{Item, Value};

/// Names of the key attributes of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySchema {
    pub partition_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_key: Option<String>,
}

impl KeySchema {
    pub fn new(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: None,
        }
    }

    pub fn with_sort_key(mut self, sort_key: impl Into<String>) -> Self {
        self.sort_key = Some(sort_key.into());
        self
    }

    /// Key attribute names in order: partition key first.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.partition_key.as_str()).chain(self.sort_key.as_deref())
    }

    /// Parse `"pk"` or `"pk,sk"`.
    pub fn parse(input: &str) -> Option<Self> {
        let mut parts = input.split(',').map(str::trim).filter(|s| !s.is_empty());
        let pk = parts.next()?;
        let schema = Self::new(pk);
        match (parts.next(), parts.next()) {
            (None, _) => Some(schema),
            (Some(sk), None) => Some(schema.with_sort_key(sk)),
            _ => None,
        }
    }
}

/// The key attribute values of one item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrimaryKey(Vec<(String, Value)>);

impl PrimaryKey {
    pub fn parts(&self) -> &[(String, Value)] {
        &self.0
    }

    /// Project the key attributes into a standalone item.
    pub fn to_item(&self) -> Item {
        self.0.iter().cloned().collect()
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in &self.0 {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{name}={value}")?;
            first = false;
        }
        Ok(())
    }
}

impl Item {
    /// Extract the primary key, verifying every key attribute is present,
    /// non-null and of a scalar key type.
    pub fn primary_key(&self, schema: &KeySchema) -> Result<PrimaryKey, KeyError> {
        schema
            .attribute_names()
            .map(|name| match self.get(name) {
                None => Err(KeyError::Missing(name.to_string())),
                Some(Value::Null) => Err(KeyError::Null(name.to_string())),
                Some(v) if !v.is_scalar_key() => Err(KeyError::UnsupportedType {
                    name: name.to_string(),
                    type_tag: v.type_tag(),
                }),
                Some(v) => Ok((name.to_string(), v.clone())),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(PrimaryKey)
    }
}
