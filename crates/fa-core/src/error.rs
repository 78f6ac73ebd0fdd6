use std::fmt;

/// Coarse classification every [`CoreError`] maps onto.
///
/// `BadParameter` errors are caused by caller-supplied arguments and are
/// recoverable. `InvalidState` errors mean an internal invariant was broken and
/// are fatal to the evaluation that observed them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadParameter,
    InvalidState,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BadParameter => "bad_parameter",
            Self::InvalidState => "invalid_state",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A value held a different alternative than the caller required.
    TypeMismatch {
        primitive: String,
        expected: &'static str,
        actual: &'static str,
    },
    BadParameter {
        primitive: String,
        detail: String,
    },
    IndexOutOfBounds {
        index: Vec<usize>,
        shape: Vec<usize>,
    },
    ElementCountMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
    RankOverflow {
        rank: usize,
        max_rank: usize,
    },
    RaggedLiteral {
        depth: usize,
        expected: usize,
        actual: usize,
    },
    /// A rank-specific accessor was used on storage of another rank.
    RankMismatch {
        expected: usize,
        actual: usize,
    },
    InvalidState {
        detail: String,
    },
    /// The producing side of a completion went away without fulfilling it.
    BrokenPromise {
        pending_id: u64,
    },
}

impl CoreError {
    pub fn type_mismatch(
        primitive: impl Into<String>,
        expected: &'static str,
        actual: &'static str,
    ) -> Self {
        Self::TypeMismatch {
            primitive: primitive.into(),
            expected,
            actual,
        }
    }

    pub fn bad_parameter(primitive: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::BadParameter {
            primitive: primitive.into(),
            detail: detail.into(),
        }
    }

    pub fn invalid_state(detail: impl Into<String>) -> Self {
        Self::InvalidState {
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TypeMismatch { .. }
            | Self::BadParameter { .. }
            | Self::IndexOutOfBounds { .. }
            | Self::ElementCountMismatch { .. }
            | Self::RankOverflow { .. }
            | Self::RaggedLiteral { .. } => ErrorKind::BadParameter,
            Self::RankMismatch { .. } | Self::InvalidState { .. } | Self::BrokenPromise { .. } => {
                ErrorKind::InvalidState
            }
        }
    }

    #[must_use]
    pub fn is_bad_parameter(&self) -> bool {
        self.kind() == ErrorKind::BadParameter
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch {
                primitive,
                expected,
                actual,
            } => write!(
                f,
                "{primitive}: type mismatch, expected {expected} but the value holds {actual}"
            ),
            Self::BadParameter { primitive, detail } => write!(f, "{primitive}: {detail}"),
            Self::IndexOutOfBounds { index, shape } => {
                write!(f, "index {index:?} out of bounds for shape {shape:?}")
            }
            Self::ElementCountMismatch {
                shape,
                expected,
                actual,
            } => write!(
                f,
                "element count mismatch for shape {shape:?}: expected {expected}, got {actual}"
            ),
            Self::RankOverflow { rank, max_rank } => {
                write!(f, "rank {rank} exceeds the supported maximum of {max_rank}")
            }
            Self::RaggedLiteral {
                depth,
                expected,
                actual,
            } => write!(
                f,
                "ragged nested literal at depth {depth}: expected {expected} entries, got {actual}"
            ),
            Self::RankMismatch { expected, actual } => write!(
                f,
                "invalid state: rank-{expected} access requested on rank-{actual} storage"
            ),
            Self::InvalidState { detail } => write!(f, "invalid state: {detail}"),
            Self::BrokenPromise { pending_id } => {
                write!(f, "pending value p{pending_id} was abandoned before completion")
            }
        }
    }
}

impl std::error::Error for CoreError {}
