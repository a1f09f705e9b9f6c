//! Bounded pool of open streams to one address.

use crate::error::ClientError;
use crate::stream::{BoxedStream, Dialer};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Default bound on open streams per address.
pub const DEFAULT_POOL_MAX_SIZE: usize = 30;

struct PoolState {
    idle: VecDeque<BoxedStream>,
    /// Streams dialed and not yet discarded, idle or checked out.
    open: usize,
}

/// Hands out streams to one address, never holding more than `max_size`
/// open at once.
pub struct StreamPool {
    address: String,
    dialer: Arc<dyn Dialer>,
    max_size: usize,
    state: Mutex<PoolState>,
}

impl fmt::Debug for StreamPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("StreamPool")
            .field("address", &self.address)
            .field("max_size", &self.max_size)
            .field("open", &state.open)
            .field("idle", &state.idle.len())
            .finish()
    }
}

impl StreamPool {
    pub fn new(address: impl Into<String>, dialer: Arc<dyn Dialer>, max_size: usize) -> Self {
        Self {
            address: address.into(),
            dialer,
            max_size,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                open: 0,
            }),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Streams currently open, idle or checked out.
    pub fn open_count(&self) -> usize {
        self.state.lock().open
    }

    pub fn idle_count(&self) -> usize {
        self.state.lock().idle.len()
    }

    /// Dials up to `count` idle streams ahead of time.
    pub async fn prefill(&self, count: usize) -> Result<(), ClientError> {
        for _ in 0..count {
            if !self.reserve() {
                break;
            }
            let stream = self.dial_reserved().await?;
            self.state.lock().idle.push_back(stream);
        }
        tracing::debug!("Pool {} prefilled: {:?}", self.address, self);
        Ok(())
    }

    /// Takes an idle stream, or dials a new one while under the bound.
    pub async fn checkout(&self) -> Result<BoxedStream, ClientError> {
        if let Some(stream) = self.state.lock().idle.pop_front() {
            return Ok(stream);
        }
        if !self.reserve() {
            return Err(ClientError::PoolExhausted {
                address: self.address.clone(),
                max: self.max_size,
            });
        }
        self.dial_reserved().await
    }

    /// Forgets a checked-out stream that was dropped as broken.
    pub fn discard(&self) {
        let mut state = self.state.lock();
        state.open = state.open.saturating_sub(1);
    }

    fn reserve(&self) -> bool {
        let mut state = self.state.lock();
        if state.open >= self.max_size {
            return false;
        }
        state.open += 1;
        true
    }

    async fn dial_reserved(&self) -> Result<BoxedStream, ClientError> {
        match self.dialer.dial(&self.address).await {
            Ok(stream) => Ok(stream),
            Err(e) => {
                self.discard();
                Err(e.into())
            }
        }
    }
}
