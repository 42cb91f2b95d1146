//! CLI error taxonomy.
//!
//! Launch-time precondition failures (name taken, missing input file,
//! invalid site) must exit 2 with a readable message and no partial state;
//! they are distinguished from operational failures by type.

use thiserror::Error;

/// A check that must hold before any state is written.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct Precondition(pub String);

/// Shorthand for failing a precondition check.
#[macro_export]
macro_rules! precondition_bail {
    ($($arg:tt)*) => {
        return Err($crate::cli::error::Precondition(format!($($arg)*)).into())
    };
}
