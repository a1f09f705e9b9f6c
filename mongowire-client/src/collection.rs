//! Collection operations.

use crate::command::{
    classify_write_result, delete_command, insert_command, update_command, WriteOutcome,
};
use crate::connection::ConnectionHandle;
use crate::cursor::Cursor;
use crate::error::ClientError;
use crate::options::{FindOptions, RemoveOptions, UpdateOptions};
use bson::Document;
use mongowire_protocol::Namespace;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A collection reached through one Connection.
#[derive(Debug, Clone)]
pub struct Collection {
    namespace: Namespace,
    conn: ConnectionHandle,
}

impl Collection {
    pub(crate) fn new(namespace: Namespace, conn: ConnectionHandle) -> Self {
        Self { namespace, conn }
    }

    pub fn name(&self) -> &str {
        &self.namespace.collection
    }

    pub fn database_name(&self) -> &str {
        &self.namespace.database
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Runs a query and returns a cursor over its results.
    pub async fn find(&self, filter: Document, options: FindOptions) -> Result<Cursor, ClientError> {
        let full_name = self.namespace.to_string();
        let request = options.build_request(&full_name, filter)?;

        let reply = {
            let mut conn = self.conn.lock().await;
            conn.query(&request).await?
        };
        tracing::debug!(
            "find on {} returned {} documents, cursor {}",
            full_name,
            reply.documents.len(),
            reply.cursor_id
        );

        Ok(Cursor::from_reply(
            &self.conn,
            full_name,
            reply,
            options.cursor_limit(),
            options.effective_batch_size(),
        ))
    }

    /// Returns the first match, if any.
    pub async fn find_one<T: DeserializeOwned>(
        &self,
        filter: Document,
    ) -> Result<Option<T>, ClientError> {
        let mut cursor = self.find(filter, FindOptions::new().with_limit(-1)).await?;
        let found = if cursor.has_next().await {
            Some(cursor.next()?)
        } else {
            None
        };
        cursor.close().await;
        Ok(found)
    }

    /// Inserts `documents` in one command.
    pub async fn insert<T: Serialize>(&self, documents: &[T]) -> Result<WriteOutcome, ClientError> {
        if documents.is_empty() {
            return Err(ClientError::InvalidArgument(
                "insert requires at least one document".to_string(),
            ));
        }
        let documents = documents
            .iter()
            .map(bson::to_document)
            .collect::<Result<Vec<_>, _>>()?;
        self.run_write(insert_command(self.name(), documents)).await
    }

    /// Applies `update` to documents matching `selector`.
    pub async fn update(
        &self,
        selector: Document,
        update: Document,
        options: UpdateOptions,
    ) -> Result<WriteOutcome, ClientError> {
        let command = update_command(self.name(), selector, update, options.upsert, options.multi);
        self.run_write(command).await
    }

    /// Removes documents matching `selector`.
    pub async fn remove(
        &self,
        selector: Document,
        options: RemoveOptions,
    ) -> Result<WriteOutcome, ClientError> {
        self.run_write(delete_command(self.name(), selector, options.limit()))
            .await
    }

    /// Fetches the next batch of `cursor` into its buffer.
    pub async fn get_more(&self, cursor: &mut Cursor) -> Result<(), ClientError> {
        cursor.get_more().await
    }

    /// Releases every live cursor in `cursors` with a single KILL_CURSORS.
    pub async fn kill_cursors(&self, cursors: &mut [Cursor]) -> Result<(), ClientError> {
        let ids: Vec<i64> = cursors.iter_mut().filter_map(Cursor::detach).collect();
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().await;
        conn.kill_cursors(&ids).await
    }

    async fn run_write(&self, command: Document) -> Result<WriteOutcome, ClientError> {
        let reply = {
            let mut conn = self.conn.lock().await;
            conn.run_command(&self.namespace.database, &command).await?
        };
        classify_write_result(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeServer, ServerLog};
    use bson::doc;
    use mongowire_protocol::{OpCode, QueryFlags};

    fn collection(server: FakeServer) -> (Collection, ServerLog) {
        let log = server.log();
        let conn = server.into_connection("db1:27017").into_handle();
        (Collection::new(Namespace::new("test", "users"), conn), log)
    }

    #[tokio::test]
    async fn test_find_request_shape() {
        let server = FakeServer::new().reply(vec![doc! {"_id": 1}, doc! {"_id": 2}]);
        let (users, log) = collection(server);

        let options = FindOptions::new()
            .with_batch_size(2)
            .with_skip(1)
            .with_sort(doc! {"_id": 1})
            .slave_ok();
        let mut cursor = users.find(doc! {"active": true}, options).await.unwrap();
        let docs: Vec<Document> = cursor.collect().await.unwrap();
        assert_eq!(docs.len(), 2);

        let query = &log.queries()[0];
        assert_eq!(query.full_collection_name, "test.users");
        assert_eq!(query.number_to_return, 2);
        assert_eq!(query.number_to_skip, 1);
        assert!(query.flags.contains(QueryFlags::SLAVE_OK));
        assert_eq!(
            log.query_documents()[0],
            doc! {"$query": {"active": true}, "$orderby": {"_id": 1}}
        );
        assert_eq!(log.count(OpCode::GetMore), 0);
    }

    #[tokio::test]
    async fn test_find_query_failure() {
        let server = FakeServer::new().reply_with_flags(
            mongowire_protocol::ResponseFlags::new()
                .with(mongowire_protocol::ResponseFlags::QUERY_FAILURE),
            0,
            vec![doc! {"$err": "unknown operator: $bogus", "code": 2}],
        );
        let (users, _log) = collection(server);

        let err = users
            .find(doc! {"a": {"$bogus": 1}}, FindOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::QueryFailure { code: 2, .. }));
    }

    #[tokio::test]
    async fn test_find_one() {
        let server = FakeServer::new().reply(vec![doc! {"_id": 7, "name": "a"}]);
        let (users, log) = collection(server);

        let found: Option<Document> = users.find_one(doc! {"_id": 7}).await.unwrap();
        assert_eq!(found.unwrap().get_str("name").unwrap(), "a");
        assert_eq!(log.queries()[0].number_to_return, -1);
    }

    #[tokio::test]
    async fn test_insert_duplicate_key() {
        let server = FakeServer::new().reply(vec![doc! {
            "ok": 0,
            "writeErrors": [{"index": 0, "code": 11000, "errmsg": "dup"}],
        }]);
        let (users, _log) = collection(server);

        match users.insert(&[doc! {"_id": 1}]).await {
            Err(ClientError::WriteErrors(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].index, 0);
                assert_eq!(errors[0].code, 11000);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_insert_serializable() {
        #[derive(Serialize)]
        struct User {
            name: String,
        }

        let server = FakeServer::new().reply(vec![doc! {"ok": 1, "n": 2}]);
        let (users, log) = collection(server);

        let outcome = users
            .insert(&[
                User {
                    name: "a".to_string(),
                },
                User {
                    name: "b".to_string(),
                },
            ])
            .await
            .unwrap();
        assert_eq!(outcome.n, 2);

        let sent = &log.query_documents()[0];
        assert_eq!(sent.get_str("insert").unwrap(), "users");
        assert_eq!(sent.get_array("documents").unwrap().len(), 2);
        assert_eq!(log.queries()[0].full_collection_name, "test.$cmd");
    }

    #[tokio::test]
    async fn test_insert_nothing() {
        let (users, log) = collection(FakeServer::new());
        let err = users.insert::<Document>(&[]).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(_)));
        assert!(log.op_codes().is_empty());
    }

    #[tokio::test]
    async fn test_update_and_remove_ok() {
        let server = FakeServer::new()
            .reply(vec![doc! {"ok": 1, "n": 1, "nModified": 1}])
            .reply(vec![doc! {"ok": 1.0, "n": 4}]);
        let (users, log) = collection(server);

        let updated = users
            .update(
                doc! {"_id": 1},
                doc! {"$set": {"name": "b"}},
                UpdateOptions::new().upsert(),
            )
            .await
            .unwrap();
        assert_eq!(updated.n_modified, 1);

        let removed = users
            .remove(doc! {"stale": true}, RemoveOptions::new().multi())
            .await
            .unwrap();
        assert_eq!(removed.n, 4);

        let sent = log.query_documents();
        let update = sent[0].get_array("updates").unwrap()[0]
            .as_document()
            .unwrap()
            .clone();
        assert!(update.get_bool("upsert").unwrap());
        assert!(!update.get_bool("multi").unwrap());
        let delete = sent[1].get_array("deletes").unwrap()[0]
            .as_document()
            .unwrap()
            .clone();
        assert_eq!(delete.get_i32("limit").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_write_concern_error() {
        let server = FakeServer::new().reply(vec![doc! {
            "ok": 0,
            "writeConcernError": {"code": 100, "errmsg": "not enough data-bearing nodes"},
        }]);
        let (users, _log) = collection(server);

        let err = users
            .remove(doc! {}, RemoveOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::WriteConcern(ref wce) if wce.code == 100));
    }

    #[tokio::test]
    async fn test_get_more_and_kill_cursors() {
        let server = FakeServer::new()
            .reply_batch(31, vec![doc! {"i": 0}])
            .reply_batch(31, vec![doc! {"i": 1}])
            .reply_batch(32, vec![doc! {"i": 2}])
            .reply(vec![doc! {"ok": 1}]);
        let (users, log) = collection(server);

        let mut first = users.find(doc! {}, FindOptions::new()).await.unwrap();
        users.get_more(&mut first).await.unwrap();
        assert_eq!(first.buffered(), 1);
        let second = users.find(doc! {}, FindOptions::new()).await.unwrap();

        let mut cursors = vec![first, second];
        users.kill_cursors(&mut cursors).await.unwrap();
        assert!(cursors
            .iter()
            .all(|c| c.state() == crate::cursor::CursorState::Closed));

        // Cursors already released are not killed again.
        users.kill_cursors(&mut cursors).await.unwrap();
        drop(cursors);

        let mut conn = users.conn.lock().await;
        conn.run_command("admin", &doc! {"ping": 1}).await.unwrap();
        assert_eq!(log.killed_cursors(), vec![31, 32]);
        assert_eq!(log.count(OpCode::KillCursors), 1);
    }
}
