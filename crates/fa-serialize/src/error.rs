use fa_core::{CoreError, DType};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum SerializeError {
    BadMagic,
    UnsupportedVersion(u8),
    Truncated { needed: usize, remaining: usize },
    TrailingBytes(usize),
    UnknownTag(u8),
    UnknownDType(u8),
    DTypeMismatch { expected: DType, actual: DType },
    InvalidBool(u8),
    InvalidUtf8,
    LengthOverflow(u64),
    TooDeep(usize),
    Shape(CoreError),
    Annotation(String),
    /// Remote handles and pending computations carry no data to encode.
    Unresolved { kind: &'static str },
}

impl fmt::Display for SerializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic => write!(f, "not an encoded value: bad magic"),
            Self::UnsupportedVersion(version) => {
                write!(f, "unsupported encoding version {version}")
            }
            Self::Truncated { needed, remaining } => {
                write!(f, "truncated input: needed {needed} bytes, {remaining} left")
            }
            Self::TrailingBytes(count) => write!(f, "{count} trailing bytes after value"),
            Self::UnknownTag(tag) => write!(f, "unknown value tag {tag}"),
            Self::UnknownDType(tag) => write!(f, "unknown dtype tag {tag}"),
            Self::DTypeMismatch { expected, actual } => {
                write!(f, "expected {expected} elements, found {actual}")
            }
            Self::InvalidBool(byte) => write!(f, "invalid flag byte {byte}"),
            Self::InvalidUtf8 => write!(f, "string is not valid UTF-8"),
            Self::LengthOverflow(raw) => write!(f, "length {raw} does not fit in memory"),
            Self::TooDeep(limit) => write!(f, "nesting deeper than {limit} levels"),
            Self::Shape(err) => write!(f, "invalid array: {err}"),
            Self::Annotation(detail) => write!(f, "invalid annotation: {detail}"),
            Self::Unresolved { kind } => write!(f, "cannot encode an unresolved {kind}"),
        }
    }
}

impl std::error::Error for SerializeError {}
