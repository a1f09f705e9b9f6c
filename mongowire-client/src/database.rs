//! Database handles.

use crate::collection::Collection;
use crate::connection::ConnectionHandle;
use crate::error::ClientError;
use bson::Document;
use mongowire_protocol::Namespace;
use serde::de::DeserializeOwned;

/// A database reached through one Connection.
#[derive(Debug, Clone)]
pub struct Database {
    name: String,
    conn: ConnectionHandle,
}

impl Database {
    pub(crate) fn new(name: impl Into<String>, conn: ConnectionHandle) -> Self {
        Self {
            name: name.into(),
            conn,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection(&self, name: &str) -> Collection {
        Collection::new(Namespace::new(self.name.clone(), name), self.conn.clone())
    }

    /// Runs `command` and returns the reply document unchanged.
    pub async fn run_command(&self, command: &Document) -> Result<Document, ClientError> {
        let mut conn = self.conn.lock().await;
        conn.run_command(&self.name, command).await
    }

    /// Runs `command` and deserializes the reply into `T`.
    ///
    /// `ok: 0` replies are not treated specially; `T` sees whatever the server sent.
    pub async fn execute_command<T: DeserializeOwned>(
        &self,
        command: &Document,
    ) -> Result<T, ClientError> {
        let reply = self.run_command(command).await?;
        Ok(bson::from_document(reply)?)
    }
}
