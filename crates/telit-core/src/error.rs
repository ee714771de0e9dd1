//! Error taxonomy shared by every layer of the driver stack.
//!
//! Decode failures are kept in their own enum so the decoder stays usable on
//! its own; everything above it reports [`Error`].

use std::fmt;

use thiserror::Error;

/// Shape a field was expected to have when decoding failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Float,
    QuotedString,
    Token,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Integer => write!(f, "integer"),
            FieldKind::Float => write!(f, "number"),
            FieldKind::QuotedString => write!(f, "quoted string"),
            FieldKind::Token => write!(f, "unquoted token"),
        }
    }
}

/// Failure to turn a raw AT response into a typed value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("no response line starts with {prefix:?}")]
    PrefixNotFound { prefix: String },

    #[error("field {index} is missing")]
    FieldMissing { index: usize },

    #[error("field {index} is not a {expected}")]
    FieldTypeMismatch { index: usize, expected: FieldKind },

    #[error("response has more than {cap} rows")]
    TooManyRows { cap: usize },

    #[error("modem reported unknown code {code}")]
    UnknownCode { code: i64 },

    #[error("value {value} exceeds {max}")]
    OutOfRange { value: i64, max: i64 },
}

/// Every way a facility operation can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The transport refused to queue the command.
    #[error("transport rejected the command")]
    TransportRejected,

    /// The modem answered with a non-OK final status.
    #[error("modem returned {status}")]
    Protocol { status: String },

    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// Another operation is already pending on this facility instance.
    #[error("operation already in progress")]
    Busy,

    /// The bound driver has no implementation for the operation.
    #[error("operation not implemented by driver")]
    NotImplemented,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The facility instance has been removed.
    #[error("facility instance is gone")]
    InstanceGone,

    /// The serving access technology has no RF status report.
    #[error("access technology {0} has no RF status report")]
    UnsupportedTechnology(i64),

    #[error("a different driver named {0:?} is already registered")]
    DuplicateDriver(String),

    #[error("no driver accepted the {0} instance")]
    NoDriver(String),
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_converts_into_error() {
        let err: Error = DecodeError::UnknownCode { code: 99 }.into();
        assert_eq!(err, Error::Decode(DecodeError::UnknownCode { code: 99 }));
        assert_eq!(err.to_string(), "decode failed: modem reported unknown code 99");
    }

    #[test]
    fn mismatch_message_names_the_expected_kind() {
        let err = DecodeError::FieldTypeMismatch {
            index: 2,
            expected: FieldKind::QuotedString,
        };
        assert_eq!(err.to_string(), "field 2 is not a quoted string");
    }
}
