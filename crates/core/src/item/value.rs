use std::collections::BTreeMap;
use std::fmt;

/// A single attribute value.
///
/// Mirrors the attribute types of a wide-column store so that items survive an
/// export/ingest round trip without losing type information. Numbers are kept
/// as their exact decimal string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    S(String),
    N(String),
    B(Vec<u8>),
    Bool(bool),
    Null,
    L(Vec<Value>),
    M(BTreeMap<String, Value>),
    Ss(Vec<String>),
    Ns(Vec<String>),
    Bs(Vec<Vec<u8>>),
}

impl Value {
    /// Short type tag, as used in the wire format.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Value::S(_) => "S",
            Value::N(_) => "N",
            Value::B(_) => "B",
            Value::Bool(_) => "BOOL",
            Value::Null => "NULL",
            Value::L(_) => "L",
            Value::M(_) => "M",
            Value::Ss(_) => "SS",
            Value::Ns(_) => "NS",
            Value::Bs(_) => "BS",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value may be used as a key attribute.
    pub fn is_scalar_key(&self) -> bool {
        matches!(self, Value::S(_) | Value::N(_) | Value::B(_))
    }

    pub fn as_s(&self) -> Option<&str> {
        match self {
            Value::S(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_n(&self) -> Option<&str> {
        match self {
            Value::N(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_m(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::M(m) => Some(m),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::S(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::S(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::N(n.to_string())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::N(n.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::S(s) => write!(f, "{s}"),
            Value::N(n) => write!(f, "{n}"),
            Value::B(b) => write!(f, "<{} bytes>", b.len()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => write!(f, "null"),
            Value::L(l) => write!(f, "<list of {}>", l.len()),
            Value::M(m) => write!(f, "<map of {}>", m.len()),
            Value::Ss(s) => write!(f, "<string set of {}>", s.len()),
            Value::Ns(s) => write!(f, "<number set of {}>", s.len()),
            Value::Bs(s) => write!(f, "<binary set of {}>", s.len()),
        }
    }
}

/// One record from the source table: attribute name to value.
///
/// Attributes are kept sorted by name, which makes serialization of the same
/// item byte-for-byte stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Item(BTreeMap<String, Value>);

impl Item {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.0
    }

    pub fn into_attributes(self) -> BTreeMap<String, Value> {
        self.0
    }
}

impl From<BTreeMap<String, Value>> for Item {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Item {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Item {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_attributes_are_sorted() {
        let item = Item::new().with("zeta", "z").with("alpha", "a").with("mid", 3);
        let names: Vec<_> = item.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_scalar_key_types() {
        assert!(Value::from("x").is_scalar_key());
        assert!(Value::from(1).is_scalar_key());
        assert!(Value::B(vec![1]).is_scalar_key());
        assert!(!Value::Bool(true).is_scalar_key());
        assert!(!Value::Null.is_scalar_key());
        assert!(!Value::L(vec![]).is_scalar_key());
    }

    #[test]
    fn test_type_tags() {
        assert_eq!(Value::Null.type_tag(), "NULL");
        assert_eq!(Value::Bool(false).type_tag(), "BOOL");
        assert_eq!(Value::Ns(vec![]).type_tag(), "NS");
    }
}
