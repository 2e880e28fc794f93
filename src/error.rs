//! Error types for the ofx_codec library.

use std::io;
use thiserror::Error;

use crate::coerce::CoerceError;

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during registration, parsing, and
/// serialization.
///
/// Configuration errors indicate a broken metadata declaration and surface at
/// registry build time. Everything else is per-document.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred during read or write operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Input was not valid UTF-8.
    #[error("encoding error: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    /// Broken aggregate metadata (duplicate tag, duplicate order,
    /// unregistered type). Fatal at startup.
    #[error("metadata configuration error: {0}")]
    Config(String),

    /// Malformed OFX header block.
    #[error("invalid OFX header: {0}")]
    Header(String),

    /// Tokenizer or structural failure in the document body.
    #[error("OFX syntax error at {path}: {message}")]
    Syntax { message: String, path: String },

    /// A leaf value could not be converted to the declared scalar type.
    #[error("cannot coerce <{tag}> at {path}: {cause}")]
    Coercion {
        tag: String,
        path: String,
        #[source]
        cause: CoerceError,
    },

    /// A required field was absent when its aggregate closed.
    #[error("missing required <{tag}> in <{aggregate}> at {path}")]
    MissingField {
        tag: String,
        aggregate: String,
        path: String,
    },

    /// The top-level tag did not resolve to any registered aggregate.
    #[error("unrecognized root aggregate <{tag}>")]
    UnknownRoot { tag: String },

    /// The root tag did not match the expected aggregate type.
    #[error("unexpected root element <{found}> (expected <{expected}>)")]
    UnexpectedRoot { expected: String, found: String },

    /// Nesting depth exceeded the adversarial-input guard.
    #[error("nesting depth exceeds limit of {limit}")]
    DepthExceeded { limit: usize },

    /// A required field was absent on an object being written.
    #[error("required <{tag}> on <{aggregate}> is not set")]
    RequiredValue { tag: String, aggregate: String },

    /// Error from the XML backend (OFX 2.x documents).
    #[error("XML parsing error: {0}")]
    Xml(String),
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Xml(err.to_string())
    }
}
