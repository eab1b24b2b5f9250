//! Shared primitives for all Rust crates in Lumora.

#![forbid(unsafe_code)]

/// Authentication primitives shared across services.
pub mod auth;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use auth::{AccountRole, UserIdentity};

/// Result type used across Lumora crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates a validated identifier; identifiers are strictly positive.
            pub fn new(value: i64) -> AppResult<Self> {
                if value <= 0 {
                    return Err(AppError::Validation(format!(
                        "{} must be a positive integer, got {value}",
                        $label
                    )));
                }

                Ok(Self(value))
            }

            /// Returns the underlying integer value.
            #[must_use]
            pub fn as_i64(self) -> i64 {
                self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = AppError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let parsed = value.trim().parse::<i64>().map_err(|error| {
                    AppError::Validation(format!("invalid {} '{value}': {error}", $label))
                })?;
                Self::new(parsed)
            }
        }
    };
}

numeric_id!(
    /// Identifier of a registered user account.
    UserId,
    "user id"
);
numeric_id!(
    /// Identifier of a storage space.
    SpaceId,
    "space id"
);
numeric_id!(
    /// Identifier of a stored picture.
    PictureId,
    "picture id"
);
numeric_id!(
    /// Identifier of an outpainting job.
    JobId,
    "job id"
);

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// User is not authenticated or not allowed to access a resource.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// User is authenticated but blocked by authorization policy.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::{JobId, NonEmptyString, SpaceId, UserId};

    #[test]
    fn non_empty_string_rejects_whitespace() {
        let result = NonEmptyString::new("   ");
        assert!(result.is_err());
    }

    #[test]
    fn identifiers_must_be_positive() {
        assert!(UserId::new(0).is_err());
        assert!(SpaceId::new(-4).is_err());
        assert_eq!(JobId::new(42).map(JobId::as_i64).ok(), Some(42));
    }

    #[test]
    fn identifiers_parse_from_path_segments() {
        let parsed = " 9 ".parse::<SpaceId>();
        assert_eq!(parsed.ok().map(|id| id.to_string()), Some("9".to_owned()));
        assert!("nine".parse::<SpaceId>().is_err());
    }
}
