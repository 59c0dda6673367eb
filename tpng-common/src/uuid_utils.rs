//! UUID utilities
//!
//! Identifiers are stored as hyphenated TEXT columns, so every row read goes
//! through [`parse_guid`].

use uuid::Uuid;

use crate::{Error, Result};

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Parse UUID from string
pub fn parse(s: &str) -> std::result::Result<Uuid, uuid::Error> {
    Uuid::parse_str(s)
}

/// Parse a GUID read from a database column
///
/// A malformed value means the row is corrupt, which is reported as an
/// internal error naming the column.
pub fn parse_guid(column: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Invalid GUID in column {}: {} ({})", column, value, e)))
}
