//! Transaction isolation levels.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Isolation level of a transaction.
///
/// The numeric values are the ones accepted by `begin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum IsolationLevel {
    /// Sees every version committed before each read.
    #[default]
    ReadCommitted = 0,
    /// Sees only versions committed before the transaction began.
    RepeatableRead = 1,
}

impl IsolationLevel {
    /// Converts from the numeric level. Any non-zero level is repeatable read.
    #[must_use]
    pub const fn from_u8(level: u8) -> Self {
        if level == 0 {
            Self::ReadCommitted
        } else {
            Self::RepeatableRead
        }
    }

    /// Returns the numeric level.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns true if the level needs a snapshot of active transactions.
    #[must_use]
    pub const fn needs_snapshot(self) -> bool {
        matches!(self, Self::RepeatableRead)
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadCommitted => write!(f, "READ COMMITTED"),
            Self::RepeatableRead => write!(f, "REPEATABLE READ"),
        }
    }
}

impl From<u8> for IsolationLevel {
    fn from(level: u8) -> Self {
        Self::from_u8(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_numeric_level() {
        assert_eq!(IsolationLevel::from(0), IsolationLevel::ReadCommitted);
        assert_eq!(IsolationLevel::from(1), IsolationLevel::RepeatableRead);
        assert_eq!(IsolationLevel::from(7), IsolationLevel::RepeatableRead);
        assert!(!IsolationLevel::ReadCommitted.needs_snapshot());
    }
}
