use crate::DatabaseError;

/// The outcome classes every engine error falls into.
///
/// Everything except [ErrorKind::Unreachable] is an expected result the caller
/// should present to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    CapacityExceeded,
    PermissionDenied,
    InvalidInput,
    /// The store failed, this is the only hard failure
    Unreachable,
}

impl DatabaseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::InvalidState,
            Self::Internal(_) => ErrorKind::Unreachable,
        }
    }
}
