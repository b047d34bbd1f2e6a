//! The shared error taxonomy.
//!
//! Every provider maps its native failure vocabulary onto these kinds at the
//! adapter boundary, so the facades behave identically regardless of backend.

use crate::format::Format;
use crate::model::Role;

/// Boxed error produced by lifecycle hooks and backend transports.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by providers, facades and bridges.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The key is absent.
    #[error("not found: {key}")]
    NotFound { key: String },

    /// A unique constraint was violated.
    #[error("duplicate: {message}")]
    Duplicate { message: String },

    /// The backend detected a concurrent modification.
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// Generic integrity violation (e.g. NOT NULL).
    #[error("constraint violated: {message}")]
    Constraint { message: String },

    /// Malformed or empty key.
    #[error("invalid key: {message}")]
    InvalidKey { message: String },

    /// Write attempted on a read-only connection.
    #[error("store is read-only")]
    ReadOnly,

    #[error("table already exists: {table}")]
    TableExists { table: String },

    #[error("table not found: {table}")]
    TableNotFound { table: String },

    /// The key-value backend cannot expire keys.
    #[error("ttl not supported by this provider")]
    TtlNotSupported,

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid vector: {message}")]
    InvalidVector { message: String },

    #[error("index not ready")]
    IndexNotReady,

    /// A filter or statement could not be translated.
    #[error("invalid query: {message}")]
    InvalidQuery { message: String },

    /// The provider cannot translate this filter operator.
    #[error("operator not supported: {operator}")]
    OperatorNotSupported { operator: String },

    /// The provider has no metadata-only filtering.
    #[error("filter not supported by this provider")]
    FilterNotSupported,

    #[error("no primary key declared for {type_name}")]
    NoPrimaryKey { type_name: String },

    #[error("multiple primary keys declared for {type_name}: {}", .fields.join(", "))]
    MultiplePrimaryKeys {
        type_name: String,
        fields: Vec<String>,
    },

    #[error("invalid spec for {type_name}: {message}")]
    InvalidSpec { type_name: String, message: String },

    /// Stored data could not be turned back into a record.
    #[error("decode error ({format}): {message}")]
    Decode { format: Format, message: String },

    /// A record could not be turned into stored data.
    #[error("encode error ({format}): {message}")]
    Encode { format: Format, message: String },

    /// A lifecycle hook failed.
    ///
    /// For the `After*` roles the underlying storage operation has already
    /// taken effect; see [`Error::is_post_commit`].
    #[error("{role} hook failed: {source}")]
    Hook {
        role: Role,
        #[source]
        source: BoxError,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Backend I/O failure with no closer taxonomy kind.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),
}

impl Error {
    /// The key, record or object does not exist.
    pub fn not_found(key: impl Into<String>) -> Self {
        Error::NotFound { key: key.into() }
    }

    /// Stored bytes could not be decoded with `format`.
    pub fn decode(format: Format, message: impl Into<String>) -> Self {
        Error::Decode {
            format,
            message: message.into(),
        }
    }

    /// A value could not be encoded with `format`.
    pub fn encode(format: Format, message: impl Into<String>) -> Self {
        Error::Encode {
            format,
            message: message.into(),
        }
    }

    /// A statement names an unknown field or misses a parameter.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Error::InvalidQuery {
            message: message.into(),
        }
    }

    /// A key string could not be parsed for the primary-key column.
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Error::InvalidKey {
            message: message.into(),
        }
    }

    /// The provider cannot evaluate `operator` in a filter.
    pub fn operator_not_supported(operator: impl Into<String>) -> Self {
        Error::OperatorNotSupported {
            operator: operator.into(),
        }
    }

    /// Wrap a provider I/O or connection failure.
    pub fn transport(e: impl Into<BoxError>) -> Self {
        Error::Transport(e.into())
    }

    /// True for [`Error::NotFound`], whichever operation raised it.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// True for hook failures reported after the storage operation committed.
    pub fn is_post_commit(&self) -> bool {
        matches!(self, Error::Hook { role, .. } if role.is_post_commit())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Transport(Box::new(e))
    }
}
