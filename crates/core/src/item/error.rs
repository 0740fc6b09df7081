use thiserror::Error;

/// Errors that can occur when decoding an item from its wire form.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
    #[error("Expected a JSON object")]
    NotAnObject,
    #[error("Unknown attribute type: {0}")]
    UnknownType(String),
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
    #[error("Invalid base64: {0}")]
    InvalidBase64(String),
    #[error("Attribute of type {tag} must be {expected}")]
    Shape { tag: String, expected: &'static str },
}

/// Errors that can occur when extracting a primary key from an item.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Key attribute '{0}' is missing")]
    Missing(String),
    #[error("Key attribute '{0}' is null")]
    Null(String),
    #[error("Key attribute '{name}' has unsupported type {type_tag}")]
    UnsupportedType {
        name: String,
        type_tag: &'static str,
    },
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;
