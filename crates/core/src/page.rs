use std::fmt;

use serde::{Deserialize, Serialize};

use crate::item::Item;

/// Opaque continuation token issued by the source store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One scan response: items plus the token to continue from.
///
/// `next` is `None` on the terminal page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Zero-based position of this page within the run, counted from the
    /// resumed cursor.
    pub index: u64,
    pub items: Vec<Item>,
    pub next: Option<Cursor>,
}

impl Page {
    pub fn is_last(&self) -> bool {
        self.next.is_none()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Parameters for one scan call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub table: String,
    pub filter: Option<String>,
    pub limit: u32,
    pub start: Option<Cursor>,
}
