//! Command execution and write-result classification.

use crate::connection::Connection;
use crate::document::{decode_document, encode_document, is_ok, lenient_i64};
use crate::error::{ClientError, WriteConcernError, WriteError};
use bson::{doc, Bson, Document};
use mongowire_protocol::QueryRequest;

/// Counts reported by a successful write command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Documents inserted, matched or deleted.
    pub n: i64,
    /// Documents changed by an update.
    pub n_modified: i64,
}

impl Connection {
    /// Runs `command` against `<database>.$cmd` and returns the reply document.
    ///
    /// The reply is returned as-is; callers decide what `ok: 0` means.
    pub async fn run_command(
        &mut self,
        database: &str,
        command: &Document,
    ) -> Result<Document, ClientError> {
        let request = QueryRequest::command(database, encode_document(command)?);
        tracing::debug!(
            "Running command {:?} on {}",
            command.keys().next(),
            database
        );
        let reply = self.query(&request).await?;
        let raw = reply.documents.first().ok_or(ClientError::EmptyReply)?;
        decode_document(raw)
    }
}

/// Fails with `CommandFailed` unless the reply carries `ok: 1`.
pub fn ensure_ok(reply: &Document) -> Result<(), ClientError> {
    if is_ok(reply) {
        return Ok(());
    }
    Err(command_failed(reply))
}

fn command_failed(reply: &Document) -> ClientError {
    ClientError::CommandFailed {
        code: lenient_i64(reply, "code").unwrap_or(0) as i32,
        message: reply.get_str("errmsg").unwrap_or("command failed").to_string(),
    }
}

fn write_error(entry: &Document) -> WriteError {
    WriteError {
        index: lenient_i64(entry, "index").unwrap_or(0) as i32,
        code: lenient_i64(entry, "code").unwrap_or(0) as i32,
        message: entry.get_str("errmsg").unwrap_or_default().to_string(),
    }
}

/// Classifies a write command reply.
///
/// Checked in order: `ok: 1` is success, then a `writeConcernError`
/// sub-document, then a non-empty `writeErrors` array. Anything else is an
/// unclassified `CommandFailed`.
pub fn classify_write_result(reply: &Document) -> Result<WriteOutcome, ClientError> {
    if is_ok(reply) {
        return Ok(WriteOutcome {
            n: lenient_i64(reply, "n").unwrap_or(0),
            n_modified: lenient_i64(reply, "nModified").unwrap_or(0),
        });
    }

    if let Ok(wce) = reply.get_document("writeConcernError") {
        return Err(ClientError::WriteConcern(WriteConcernError {
            code: lenient_i64(wce, "code").unwrap_or(0) as i32,
            message: wce.get_str("errmsg").unwrap_or_default().to_string(),
        }));
    }

    if let Ok(entries) = reply.get_array("writeErrors") {
        let errors: Vec<WriteError> = entries
            .iter()
            .filter_map(Bson::as_document)
            .map(write_error)
            .collect();
        if !errors.is_empty() {
            return Err(ClientError::WriteErrors(errors));
        }
    }

    Err(command_failed(reply))
}

/// `{insert: collection, documents: [...]}`
pub fn insert_command(collection: &str, documents: Vec<Document>) -> Document {
    doc! {
        "insert": collection,
        "documents": documents,
    }
}

/// `{update: collection, updates: [{q, u, upsert, multi}]}`
pub fn update_command(
    collection: &str,
    selector: Document,
    update: Document,
    upsert: bool,
    multi: bool,
) -> Document {
    doc! {
        "update": collection,
        "updates": [{
            "q": selector,
            "u": update,
            "upsert": upsert,
            "multi": multi,
        }],
    }
}

/// `{delete: collection, deletes: [{q, limit}]}`. A limit of 0 removes every match.
pub fn delete_command(collection: &str, selector: Document, limit: i32) -> Document {
    doc! {
        "delete": collection,
        "deletes": [{
            "q": selector,
            "limit": limit,
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeServer;

    #[test]
    fn test_ok_reply_is_success() {
        assert_eq!(
            classify_write_result(&doc! {"ok": 1}).unwrap(),
            WriteOutcome::default()
        );
        assert_eq!(
            classify_write_result(&doc! {"ok": 1.0, "n": 3, "nModified": 2_i64}).unwrap(),
            WriteOutcome { n: 3, n_modified: 2 }
        );
    }

    #[test]
    fn test_write_errors_preserve_order() {
        let reply = doc! {
            "ok": 0,
            "writeErrors": [
                {"index": 4, "code": 11000, "errmsg": "dup"},
                {"index": 1, "code": 121, "errmsg": "invalid"},
            ],
        };
        match classify_write_result(&reply) {
            Err(ClientError::WriteErrors(errors)) => {
                assert_eq!(errors.len(), 2);
                assert_eq!((errors[0].index, errors[0].code), (4, 11000));
                assert_eq!(errors[0].message, "dup");
                assert_eq!((errors[1].index, errors[1].code), (1, 121));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_write_concern_checked_before_write_errors() {
        let reply = doc! {
            "ok": 0.0,
            "writeConcernError": {"code": 64, "errmsg": "waiting for replication timed out"},
            "writeErrors": [{"index": 0, "code": 11000, "errmsg": "dup"}],
        };
        match classify_write_result(&reply) {
            Err(ClientError::WriteConcern(wce)) => {
                assert_eq!(wce.code, 64);
                assert!(wce.message.contains("replication"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_unclassified_failure() {
        assert!(matches!(
            classify_write_result(&doc! {"ok": 0, "writeErrors": []}),
            Err(ClientError::CommandFailed { code: 0, .. })
        ));
        match classify_write_result(&doc! {"ok": 0, "code": 13, "errmsg": "unauthorized"}) {
            Err(ClientError::CommandFailed { code, message }) => {
                assert_eq!(code, 13);
                assert_eq!(message, "unauthorized");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_ensure_ok() {
        assert!(ensure_ok(&doc! {"ok": 1.0}).is_ok());
        assert!(matches!(
            ensure_ok(&doc! {"ok": 0.0, "errmsg": "no such command"}),
            Err(ClientError::CommandFailed { .. })
        ));
    }

    #[test]
    fn test_write_command_shapes() {
        let cmd = insert_command("users", vec![doc! {"_id": 1}]);
        assert_eq!(cmd.keys().next().map(String::as_str), Some("insert"));
        assert_eq!(cmd.get_array("documents").unwrap().len(), 1);

        let cmd = update_command("users", doc! {"_id": 1}, doc! {"$set": {"a": 1}}, true, false);
        let entry = cmd.get_array("updates").unwrap()[0].as_document().unwrap().clone();
        assert!(entry.get_bool("upsert").unwrap());
        assert!(!entry.get_bool("multi").unwrap());

        let cmd = delete_command("users", doc! {}, 0);
        let entry = cmd.get_array("deletes").unwrap()[0].as_document().unwrap().clone();
        assert_eq!(entry.get_i32("limit").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_command_layout() {
        let server = FakeServer::new().reply(vec![doc! {"ok": 1.0, "ismaster": true}]);
        let log = server.log();
        let mut conn = server.into_connection("db1:27017");

        let reply = conn.run_command("admin", &doc! {"isMaster": 1}).await.unwrap();
        assert!(reply.get_bool("ismaster").unwrap());

        let queries = log.queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].full_collection_name, "admin.$cmd");
        assert_eq!(queries[0].number_to_skip, 0);
        assert_eq!(queries[0].number_to_return, -1);
        assert_eq!(log.query_documents()[0], doc! {"isMaster": 1});
    }

    #[tokio::test]
    async fn test_run_command_without_document() {
        let server = FakeServer::new().reply(vec![]);
        let mut conn = server.into_connection("db1:27017");

        let err = conn.run_command("admin", &doc! {"ping": 1}).await.unwrap_err();
        assert!(matches!(err, ClientError::EmptyReply));
    }
}
