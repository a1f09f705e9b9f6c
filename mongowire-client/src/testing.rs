//! In-memory server fakes for unit tests.

use crate::connection::{Connection, ConnectionConfig};
use crate::stream::{BoxedStream, Dialer};
use bson::Document;
use bytes::BytesMut;
use futures::future::{BoxFuture, FutureExt};
use mongowire_protocol::{
    Decoder, Frame, GetMoreRequest, KillCursorsRequest, OpCode, QueryRequest, Reply, ResponseFlags,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

/// Encodes a reply carrying `documents`.
pub(crate) fn reply_bytes(response_to: i32, cursor_id: i64, documents: Vec<Document>) -> BytesMut {
    let raw = documents
        .iter()
        .map(|d| crate::document::encode_document(d).unwrap())
        .collect();
    Reply::new(response_to, cursor_id, raw).encode().unwrap()
}

enum Step {
    Reply {
        flags: ResponseFlags,
        cursor_id: i64,
        documents: Vec<Document>,
    },
    HangUp,
}

/// Every frame a fake server received, in order.
#[derive(Clone, Default)]
pub(crate) struct ServerLog(Arc<Mutex<Vec<Frame>>>);

impl ServerLog {
    pub(crate) fn op_codes(&self) -> Vec<OpCode> {
        self.0.lock().iter().map(|f| f.header.op_code).collect()
    }

    pub(crate) fn count(&self, op_code: OpCode) -> usize {
        self.0
            .lock()
            .iter()
            .filter(|f| f.header.op_code == op_code)
            .count()
    }

    pub(crate) fn queries(&self) -> Vec<QueryRequest> {
        self.frames(OpCode::Query)
            .into_iter()
            .map(|f| QueryRequest::decode(f).unwrap())
            .collect()
    }

    pub(crate) fn get_mores(&self) -> Vec<GetMoreRequest> {
        self.frames(OpCode::GetMore)
            .into_iter()
            .map(|f| GetMoreRequest::decode(f).unwrap())
            .collect()
    }

    pub(crate) fn killed_cursors(&self) -> Vec<i64> {
        self.frames(OpCode::KillCursors)
            .into_iter()
            .flat_map(|f| KillCursorsRequest::decode(f).unwrap().cursor_ids)
            .collect()
    }

    /// Decoded query documents, in order.
    pub(crate) fn query_documents(&self) -> Vec<Document> {
        self.queries()
            .iter()
            .map(|q| crate::document::decode_document(&q.query).unwrap())
            .collect()
    }

    fn frames(&self, op_code: OpCode) -> Vec<Frame> {
        self.0
            .lock()
            .iter()
            .filter(|f| f.header.op_code == op_code)
            .cloned()
            .collect()
    }
}

/// Scripted server: answers each request that expects a reply with its next
/// step, and closes the stream when the script runs out.
pub(crate) struct FakeServer {
    script: VecDeque<Step>,
    log: ServerLog,
}

impl FakeServer {
    pub(crate) fn new() -> Self {
        Self {
            script: VecDeque::new(),
            log: ServerLog::default(),
        }
    }

    /// Replies with `documents` and cursor ID 0.
    pub(crate) fn reply(self, documents: Vec<Document>) -> Self {
        self.reply_batch(0, documents)
    }

    pub(crate) fn reply_batch(self, cursor_id: i64, documents: Vec<Document>) -> Self {
        self.reply_with_flags(ResponseFlags::new(), cursor_id, documents)
    }

    pub(crate) fn reply_with_flags(
        mut self,
        flags: ResponseFlags,
        cursor_id: i64,
        documents: Vec<Document>,
    ) -> Self {
        self.script.push_back(Step::Reply {
            flags,
            cursor_id,
            documents,
        });
        self
    }

    /// Closes the stream instead of answering.
    pub(crate) fn hang_up(mut self) -> Self {
        self.script.push_back(Step::HangUp);
        self
    }

    pub(crate) fn log(&self) -> ServerLog {
        self.log.clone()
    }

    /// Starts the server task and returns the client end of its stream.
    pub(crate) fn spawn(self) -> BoxedStream {
        let (client, server) = tokio::io::duplex(64 * 1024);
        tokio::spawn(self.run(server));
        Box::new(client)
    }

    pub(crate) fn into_connection(self, address: &str) -> Connection {
        Connection::from_stream(address, self.spawn(), ConnectionConfig::new())
    }

    async fn run(mut self, mut stream: DuplexStream) {
        let mut decoder = Decoder::new();
        let mut buf = vec![0u8; 4096];
        loop {
            let frame = loop {
                match decoder.decode_frame() {
                    Ok(Some(frame)) => break frame,
                    Ok(None) => {}
                    Err(_) => return,
                }
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => decoder.extend(&buf[..n]),
                }
            };

            let request_id = frame.header.request_id;
            let op_code = frame.header.op_code;
            self.log.0.lock().push(frame);
            if op_code == OpCode::KillCursors {
                continue;
            }

            match self.script.pop_front() {
                Some(Step::Reply {
                    flags,
                    cursor_id,
                    documents,
                }) => {
                    let raw = documents
                        .iter()
                        .map(|d| crate::document::encode_document(d).unwrap())
                        .collect();
                    let reply = Reply::new(request_id, cursor_id, raw).with_flags(flags);
                    let encoded = reply.encode().unwrap();
                    if stream.write_all(&encoded).await.is_err() {
                        return;
                    }
                }
                Some(Step::HangUp) | None => return,
            }
        }
    }
}

/// Dialer that hands out fake servers registered per address.
#[derive(Default)]
pub(crate) struct FakeDialer {
    servers: Mutex<HashMap<String, VecDeque<FakeServer>>>,
    dials: Mutex<HashMap<String, usize>>,
}

impl FakeDialer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queues `server` for the next dial of `address`.
    pub(crate) fn add(&self, address: &str, server: FakeServer) {
        self.servers
            .lock()
            .entry(address.to_string())
            .or_default()
            .push_back(server);
    }

    pub(crate) fn dial_count(&self, address: &str) -> usize {
        self.dials.lock().get(address).copied().unwrap_or(0)
    }
}

impl Dialer for FakeDialer {
    fn dial<'a>(&'a self, address: &'a str) -> BoxFuture<'a, io::Result<BoxedStream>> {
        async move {
            *self.dials.lock().entry(address.to_string()).or_default() += 1;
            let server = self
                .servers
                .lock()
                .get_mut(address)
                .and_then(VecDeque::pop_front);
            match server {
                Some(server) => Ok(server.spawn()),
                None => Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    format!("no fake server at {}", address),
                )),
            }
        }
        .boxed()
    }
}
