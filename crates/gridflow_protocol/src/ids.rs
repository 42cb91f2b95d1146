//! Canonical identifiers for catalog rows.
//!
//! All three ids are SQLite rowids and therefore non-negative `i64` values.
//! Newtypes keep a production id from being handed to a job lookup.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("id cannot be negative: {0}")]
    Negative(i64),
    #[error("invalid id: {0:?}")]
    Parse(String),
}

macro_rules! catalog_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize, Default,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn as_i64(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$name> for i64 {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl TryFrom<i64> for $name {
            type Error = IdError;

            fn try_from(value: i64) -> Result<Self, Self::Error> {
                if value < 0 {
                    return Err(IdError::Negative(value));
                }
                Ok(Self(value))
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value = s
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| IdError::Parse(s.to_string()))?;
                Self::try_from(value)
            }
        }
    };
}

catalog_id!(
    /// Identifier of a production row.
    ProdId
);
catalog_id!(
    /// Identifier of a job row.
    JobId
);
catalog_id!(
    /// Identifier of a job_submit row (one submission attempt).
    SubmissionId
);
