//! Options for find, update and remove.

use crate::document::encode_document;
use crate::error::ClientError;
use bson::{doc, Document};
use mongowire_protocol::{QueryFlags, QueryRequest};

/// Batch size used when none (or 1) is requested.
pub const DEFAULT_BATCH_SIZE: i32 = 20;

/// Find options.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Fields to return.
    pub projection: Option<Document>,
    /// Sort order; wraps the filter as `{$query, $orderby}`.
    pub sort: Option<Document>,
    pub skip: i32,
    /// Maximum documents to serve; 0 is unlimited. A negative limit asks for a
    /// single batch of at most |limit| documents.
    pub limit: i32,
    /// Documents per batch. 0 and 1 fall back to the default.
    pub batch_size: i32,
    pub tailable: bool,
    pub slave_ok: bool,
    pub oplog_replay: bool,
    pub no_cursor_timeout: bool,
    pub await_data: bool,
    pub partial: bool,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_skip(mut self, skip: i32) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_limit(mut self, limit: i32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_batch_size(mut self, batch_size: i32) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn tailable(mut self, await_data: bool) -> Self {
        self.tailable = true;
        self.await_data = await_data;
        self
    }

    pub fn slave_ok(mut self) -> Self {
        self.slave_ok = true;
        self
    }

    pub fn no_cursor_timeout(mut self) -> Self {
        self.no_cursor_timeout = true;
        self
    }

    pub fn partial(mut self) -> Self {
        self.partial = true;
        self
    }

    pub fn flags(&self) -> QueryFlags {
        QueryFlags::new()
            .with_if(QueryFlags::TAILABLE_CURSOR, self.tailable)
            .with_if(QueryFlags::SLAVE_OK, self.slave_ok)
            .with_if(QueryFlags::OPLOG_REPLAY, self.oplog_replay)
            .with_if(QueryFlags::NO_CURSOR_TIMEOUT, self.no_cursor_timeout)
            .with_if(QueryFlags::AWAIT_DATA, self.await_data)
            .with_if(QueryFlags::PARTIAL, self.partial)
    }

    /// Batch size sent with every GET_MORE, never more than a positive limit.
    pub fn effective_batch_size(&self) -> i32 {
        let batch_size = if self.batch_size > 1 {
            self.batch_size
        } else {
            DEFAULT_BATCH_SIZE
        };
        if self.limit > 0 {
            batch_size.min(self.limit)
        } else {
            batch_size
        }
    }

    /// Limit enforced client-side by the cursor.
    pub fn cursor_limit(&self) -> i32 {
        self.limit.saturating_abs()
    }

    /// numberToReturn of the initial OP_QUERY.
    pub fn number_to_return(&self) -> i32 {
        if self.limit < 0 {
            self.limit
        } else {
            self.effective_batch_size()
        }
    }

    /// The query document actually sent for `filter`.
    pub fn query_document(&self, filter: Document) -> Document {
        match self.sort {
            Some(ref sort) => doc! {"$query": filter, "$orderby": sort.clone()},
            None => filter,
        }
    }

    pub(crate) fn build_request(
        &self,
        full_collection_name: &str,
        filter: Document,
    ) -> Result<QueryRequest, ClientError> {
        if self.skip < 0 {
            return Err(ClientError::InvalidArgument(format!(
                "skip must not be negative, got {}",
                self.skip
            )));
        }
        let projection = self.projection.as_ref().map(encode_document).transpose()?;
        Ok(
            QueryRequest::new(full_collection_name, encode_document(&self.query_document(filter))?)
                .with_flags(self.flags())
                .with_number_to_skip(self.skip)
                .with_number_to_return(self.number_to_return())
                .with_return_fields_selector(projection),
        )
    }
}

/// Update options.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    /// Update every matching document instead of the first.
    pub multi: bool,
    /// Insert when nothing matches.
    pub upsert: bool,
}

impl UpdateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn multi(mut self) -> Self {
        self.multi = true;
        self
    }

    pub fn upsert(mut self) -> Self {
        self.upsert = true;
        self
    }
}

/// Remove options.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
    /// Remove every matching document instead of the first.
    pub multi: bool,
}

impl RemoveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn multi(mut self) -> Self {
        self.multi = true;
        self
    }

    /// The `limit` field of the delete entry.
    pub fn limit(&self) -> i32 {
        if self.multi {
            0
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::decode_document;

    #[test]
    fn test_batch_size_defaults() {
        assert_eq!(FindOptions::new().effective_batch_size(), 20);
        assert_eq!(FindOptions::new().with_batch_size(1).effective_batch_size(), 20);
        assert_eq!(FindOptions::new().with_batch_size(50).effective_batch_size(), 50);
    }

    #[test]
    fn test_batch_size_capped_by_limit() {
        let options = FindOptions::new().with_batch_size(50).with_limit(7);
        assert_eq!(options.effective_batch_size(), 7);
        assert_eq!(options.number_to_return(), 7);
        assert_eq!(options.cursor_limit(), 7);
    }

    #[test]
    fn test_negative_limit_is_single_batch() {
        let options = FindOptions::new().with_limit(-5);
        assert_eq!(options.number_to_return(), -5);
        assert_eq!(options.cursor_limit(), 5);
        assert_eq!(options.effective_batch_size(), 20);
    }

    #[test]
    fn test_flags() {
        let flags = FindOptions::new().tailable(true).no_cursor_timeout().flags();
        assert_eq!(flags.bits(), 2 | 16 | 32);
        assert_eq!(FindOptions::new().flags().bits(), 0);
    }

    #[test]
    fn test_sort_wraps_filter() {
        let options = FindOptions::new().with_sort(doc! {"age": -1});
        let query = options.query_document(doc! {"name": "a"});
        assert_eq!(query.get_document("$query").unwrap(), &doc! {"name": "a"});
        assert_eq!(query.get_document("$orderby").unwrap(), &doc! {"age": -1});

        let plain = FindOptions::new().query_document(doc! {"name": "a"});
        assert_eq!(plain, doc! {"name": "a"});
    }

    #[test]
    fn test_build_request() {
        let request = FindOptions::new()
            .with_skip(3)
            .with_projection(doc! {"name": 1})
            .build_request("test.users", doc! {})
            .unwrap();
        assert_eq!(request.full_collection_name, "test.users");
        assert_eq!(request.number_to_skip, 3);
        assert_eq!(request.number_to_return, 20);
        let projection = request.return_fields_selector.unwrap();
        assert_eq!(decode_document(&projection).unwrap(), doc! {"name": 1});
    }

    #[test]
    fn test_negative_skip_rejected() {
        let result = FindOptions::new().with_skip(-1).build_request("a.b", doc! {});
        assert!(matches!(result, Err(ClientError::InvalidArgument(_))));
    }

    #[test]
    fn test_remove_limit() {
        assert_eq!(RemoveOptions::new().limit(), 1);
        assert_eq!(RemoveOptions::new().multi().limit(), 0);
    }
}
