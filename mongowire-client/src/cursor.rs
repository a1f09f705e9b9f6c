//! Server-side result cursors.
//!
//! A [`Cursor`] buffers one batch of raw documents at a time and fetches the
//! next with GET_MORE when the batch runs out. It holds only a weak reference
//! to the Connection it was issued on.
//!
//! ```text
//!            has_next: buffer empty, id == 0
//!  Active ────────────────────────────────────▶ Exhausted
//!    │        has_next: limit reached / error        │
//!    │                                               │
//!    └──────────────── close() ──────────▶ Closed ◀──┘
//! ```

use crate::connection::{Connection, ConnectionHandle};
use crate::document::decode;
use crate::error::ClientError;
use bytes::Bytes;
use mongowire_protocol::Reply;
use serde::de::DeserializeOwned;
use std::sync::Weak;

/// Cursor lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Buffered documents remain or more can be fetched.
    Active,
    /// No more data.
    Exhausted,
    /// Released, explicitly or on drop.
    Closed,
}

/// Iterator over a server-side result set.
pub struct Cursor {
    id: i64,
    namespace: String,
    limit: i32,
    batch_size: i32,
    served: i32,
    batch: Vec<Bytes>,
    read_index: usize,
    state: CursorState,
    /// Set when the last `has_next` returned true.
    primed: bool,
    error: Option<ClientError>,
    conn: Weak<tokio::sync::Mutex<Connection>>,
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("id", &self.id)
            .field("namespace", &self.namespace)
            .field("limit", &self.limit)
            .field("batch_size", &self.batch_size)
            .field("served", &self.served)
            .field("buffered", &self.buffered())
            .field("state", &self.state)
            .field("error", &self.error)
            .finish()
    }
}

impl Cursor {
    /// Builds a cursor from the first reply of a find.
    pub fn from_reply(
        conn: &ConnectionHandle,
        namespace: impl Into<String>,
        reply: Reply,
        limit: i32,
        batch_size: i32,
    ) -> Self {
        let state = if reply.cursor_id == 0 && reply.documents.is_empty() {
            CursorState::Exhausted
        } else {
            CursorState::Active
        };
        Self {
            id: reply.cursor_id,
            namespace: namespace.into(),
            limit,
            batch_size,
            served: 0,
            batch: reply.documents,
            read_index: 0,
            state,
            primed: false,
            error: None,
            conn: std::sync::Arc::downgrade(conn),
        }
    }

    /// Server cursor ID; 0 once the server has no more results.
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn limit(&self) -> i32 {
        self.limit
    }

    pub fn batch_size(&self) -> i32 {
        self.batch_size
    }

    /// Documents handed out so far.
    pub fn served(&self) -> i32 {
        self.served
    }

    /// Unread documents in the current batch.
    pub fn buffered(&self) -> usize {
        self.batch.len() - self.read_index
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// The error that ended iteration, if any.
    pub fn error(&self) -> Option<&ClientError> {
        self.error.as_ref()
    }

    fn limit_reached(&self) -> bool {
        self.limit > 0 && self.served >= self.limit
    }

    /// Returns whether `next` will yield a document, fetching one more batch
    /// if the current one is used up.
    ///
    /// Errors end iteration instead of being raised; see [`Cursor::error`].
    pub async fn has_next(&mut self) -> bool {
        self.primed = false;
        if self.state == CursorState::Closed || self.error.is_some() {
            return false;
        }
        if self.limit_reached() {
            self.state = CursorState::Exhausted;
            return false;
        }
        if self.read_index < self.batch.len() {
            self.primed = true;
            return true;
        }
        if self.id == 0 {
            self.state = CursorState::Exhausted;
            return false;
        }

        if let Err(e) = self.get_more().await {
            tracing::debug!("Cursor {} on {} ended: {}", self.id, self.namespace, e);
            self.error = Some(e);
            self.state = CursorState::Exhausted;
            return false;
        }

        if self.read_index < self.batch.len() {
            self.primed = true;
            return true;
        }
        if self.id == 0 {
            self.state = CursorState::Exhausted;
        }
        false
    }

    /// Decodes the next document. Must follow a `has_next` that returned true.
    pub fn next<T: DeserializeOwned>(&mut self) -> Result<T, ClientError> {
        let raw = self.next_raw()?;
        decode(&raw)
    }

    /// Returns the next raw document. Must follow a `has_next` that returned true.
    pub fn next_raw(&mut self) -> Result<Bytes, ClientError> {
        if !self.primed {
            return Err(ClientError::CursorExhausted);
        }
        self.primed = false;
        let raw = self
            .batch
            .get(self.read_index)
            .cloned()
            .ok_or(ClientError::CursorExhausted)?;
        self.read_index += 1;
        self.served += 1;
        Ok(raw)
    }

    /// Replaces the buffer with the next batch from the server.
    pub async fn get_more(&mut self) -> Result<(), ClientError> {
        if self.id == 0 {
            return Err(ClientError::CursorExhausted);
        }
        let handle = self.conn.upgrade().ok_or(ClientError::ConnectionDropped)?;
        let mut conn = handle.lock().await;

        match conn.get_more(&self.namespace, self.batch_size, self.id).await {
            Ok(reply) => {
                self.id = reply.cursor_id;
                self.batch = reply.documents;
                self.read_index = 0;
                Ok(())
            }
            Err(e @ ClientError::CursorNotFound(_)) => {
                self.id = 0;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Drains the cursor into a vector, failing with the error that ended it.
    pub async fn collect<T: DeserializeOwned>(&mut self) -> Result<Vec<T>, ClientError> {
        let mut out = Vec::new();
        while self.has_next().await {
            out.push(self.next()?);
        }
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(out),
        }
    }

    /// Releases the cursor. Sends at most one KILL_CURSORS, whose failure is
    /// only logged. Further calls do nothing.
    pub async fn close(&mut self) {
        if self.state == CursorState::Closed {
            return;
        }
        self.mark_closed();

        let id = std::mem::take(&mut self.id);
        if id == 0 {
            return;
        }
        if let Some(handle) = self.conn.upgrade() {
            let mut conn = handle.lock().await;
            if let Err(e) = conn.kill_cursors(&[id]).await {
                tracing::warn!("Failed to kill cursor {} on {}: {}", id, conn.address(), e);
            }
        }
    }

    /// Marks the cursor closed and hands back its live server ID, if any, for
    /// the caller to kill.
    pub(crate) fn detach(&mut self) -> Option<i64> {
        if self.state == CursorState::Closed {
            return None;
        }
        self.mark_closed();
        match std::mem::take(&mut self.id) {
            0 => None,
            id => Some(id),
        }
    }

    fn mark_closed(&mut self) {
        self.state = CursorState::Closed;
        self.primed = false;
        self.batch.clear();
        self.read_index = 0;
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        if self.state == CursorState::Closed || self.id == 0 {
            return;
        }
        let handle = match self.conn.upgrade() {
            Some(handle) => handle,
            None => return,
        };
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => return,
        };
        let id = self.id;
        runtime.spawn(async move {
            let mut conn = handle.lock().await;
            if let Err(e) = conn.kill_cursors(&[id]).await {
                tracing::warn!("Failed to kill dropped cursor {}: {}", id, e);
            }
        });
    }
}
