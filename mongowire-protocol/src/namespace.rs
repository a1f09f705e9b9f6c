//! Fully qualified collection names ("database.collection").

use crate::error::ProtocolError;
use std::fmt;

/// Collection name used for command queries.
pub const COMMAND_COLLECTION: &str = "$cmd";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }

    /// Splits `"db.coll"` at the first dot. Collection names may themselves
    /// contain dots (`"db.system.indexes"`).
    pub fn parse(namespace: &str) -> Result<Self, ProtocolError> {
        let (database, collection) = namespace
            .split_once('.')
            .ok_or_else(|| ProtocolError::InvalidNamespace(namespace.to_string()))?;
        if database.is_empty() || collection.is_empty() {
            return Err(ProtocolError::InvalidNamespace(namespace.to_string()));
        }
        Ok(Self::new(database, collection))
    }

    /// The command namespace of `database`.
    pub fn command(database: impl Into<String>) -> Self {
        Self::new(database, COMMAND_COLLECTION)
    }

    pub fn is_command(&self) -> bool {
        self.collection == COMMAND_COLLECTION
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}
