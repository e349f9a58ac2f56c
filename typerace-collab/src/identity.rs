//! Opaque per-session player identifiers.

use chrono::Utc;
use thiserror::Error;

use crate::{util::random_string, UserId};

const MAX_USER_ID_LENGTH: usize = 64;
const RANDOM_SUFFIX_LENGTH: usize = 9;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Session id is empty")]
    Empty,
    #[error("Session id is longer than 64 characters")]
    TooLong,
    #[error("Session id contains whitespace")]
    Whitespace,
}

/// Generates a new session id without any round-trip to the store
pub fn generate_user_id() -> UserId {
    format!(
        "user_{}_{}",
        Utc::now().timestamp_millis(),
        random_string(RANDOM_SUFFIX_LENGTH).to_lowercase()
    )
}

/// Checks that a client supplied session id is usable as a key
pub fn validate_user_id(user_id: &str) -> Result<(), IdentityError> {
    if user_id.is_empty() {
        return Err(IdentityError::Empty);
    }

    if user_id.chars().count() > MAX_USER_ID_LENGTH {
        return Err(IdentityError::TooLong);
    }

    if user_id.chars().any(char::is_whitespace) {
        return Err(IdentityError::Whitespace);
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn generated_ids_are_valid_and_distinct() {
        let a = generate_user_id();
        let b = generate_user_id();

        assert!(a.starts_with("user_"));
        assert_eq!(validate_user_id(&a), Ok(()));
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_bad_ids() {
        assert_eq!(validate_user_id(""), Err(IdentityError::Empty));
        assert_eq!(validate_user_id("a b"), Err(IdentityError::Whitespace));
        assert_eq!(
            validate_user_id(&"x".repeat(65)),
            Err(IdentityError::TooLong)
        );
    }
}
