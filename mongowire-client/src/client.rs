//! High-level client API.

use crate::command::ensure_ok;
use crate::config::ClientConfig;
use crate::connection::ConnectionHandle;
use crate::database::Database;
use crate::error::ClientError;
use crate::stream::{Dialer, TcpDialer};
use crate::topology::{IsMasterReply, Topology};
use bson::{doc, Document};
use std::sync::Arc;

/// High-level client for a MongoDB replica set or standalone server.
#[derive(Debug)]
pub struct Client {
    topology: Topology,
    config: ClientConfig,
}

impl Client {
    /// Discovers the replica set reachable from `seed` using default settings.
    pub async fn connect(seed: &str) -> Result<Self, ClientError> {
        Self::connect_with_config(ClientConfig::default().with_seed(seed)).await
    }

    /// Discovers the replica set reachable from `config.network.seed`.
    pub async fn connect_with_config(config: ClientConfig) -> Result<Self, ClientError> {
        let dialer = Arc::new(TcpDialer::new(config.network.connect_timeout()));
        let seed = config.network.seed.clone();
        Self::connect_with_dialer(&seed, dialer, config).await
    }

    /// Discovers through a caller-supplied dialer.
    pub async fn connect_with_dialer(
        seed: &str,
        dialer: Arc<dyn Dialer>,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        let topology = Topology::discover(seed, dialer, &config).await?;
        Ok(Self { topology, config })
    }

    /// Connects to a single server without discovery.
    pub async fn connect_direct(address: &str, config: ClientConfig) -> Result<Self, ClientError> {
        let dialer = Arc::new(TcpDialer::new(config.network.connect_timeout()));
        let topology = Topology::direct(address, dialer, &config).await?;
        Ok(Self { topology, config })
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The connection every database handle shares.
    pub fn connection(&self) -> Result<ConnectionHandle, ClientError> {
        self.topology.default_connection()
    }

    /// Returns a handle to `name` on the default member.
    pub fn database(&self, name: &str) -> Result<Database, ClientError> {
        self.topology.database(name)
    }

    /// Runs `command` against `database` and returns the raw reply.
    pub async fn run_command(
        &self,
        database: &str,
        command: &Document,
    ) -> Result<Document, ClientError> {
        self.database(database)?.run_command(command).await
    }

    /// Asks the default member for its isMaster view.
    pub async fn is_master(&self) -> Result<IsMasterReply, ClientError> {
        let reply = self
            .database("admin")?
            .run_command(&doc! {"isMaster": 1})
            .await?;
        ensure_ok(&reply)?;
        Ok(IsMasterReply::from_document(&reply))
    }

    /// Probes the default connection, replacing its stream if the probe fails.
    pub async fn check_alive(&self) -> Result<(), ClientError> {
        self.topology.check_alive().await
    }

    /// Closes every member connection.
    pub async fn close(&self) {
        self.topology.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::FindOptions;
    use crate::testing::{FakeDialer, FakeServer};
    use mongowire_protocol::OpCode;

    #[tokio::test]
    async fn test_connect_and_query() {
        let dialer = Arc::new(FakeDialer::new());
        let server = FakeServer::new()
            .reply(vec![doc! {
                "ok": 1.0,
                "ismaster": true,
                "me": "primary:27017",
                "hosts": ["primary:27017"],
            }])
            .reply(vec![doc! {"ok": 1.0, "ismaster": true, "me": "primary:27017"}])
            .reply(vec![doc! {"_id": 1}, doc! {"_id": 2}]);
        let log = server.log();
        dialer.add("primary:27017", server);

        let client = Client::connect_with_dialer("primary", dialer, ClientConfig::default())
            .await
            .unwrap();
        assert_eq!(client.topology().len(), 1);

        let view = client.is_master().await.unwrap();
        assert!(view.ismaster);
        assert_eq!(view.me.as_deref(), Some("primary:27017"));

        let mut cursor = client
            .database("app")
            .unwrap()
            .collection("items")
            .find(doc! {}, FindOptions::new())
            .await
            .unwrap();
        let items: Vec<Document> = cursor.collect().await.unwrap();
        assert_eq!(items.len(), 2);

        assert_eq!(log.count(OpCode::Query), 3);
        assert_eq!(log.queries()[2].full_collection_name, "app.items");

        client.close().await;
        let conn = client.connection().unwrap();
        assert!(!conn.lock().await.is_connected());
    }

    #[tokio::test]
    async fn test_connect_failure_propagates() {
        let dialer = Arc::new(FakeDialer::new());
        let err = Client::connect_with_dialer("nowhere", dialer, ClientConfig::default())
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_invalid_seed() {
        let dialer = Arc::new(FakeDialer::new());
        let err = Client::connect_with_dialer("", dialer, ClientConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidAddress(_)));
    }
}
