//! Replica-set discovery.
//!
//! Discovery walks the `hosts` lists returned by isMaster breadth-first from
//! the seed. Members are keyed by the address they report for themselves
//! (`me`), so a host reached under two spellings is registered once.

use crate::command::ensure_ok;
use crate::config::ClientConfig;
use crate::connection::{Connection, ConnectionConfig, ConnectionHandle};
use crate::database::Database;
use crate::document::lenient_bool;
use crate::error::ClientError;
use crate::pool::StreamPool;
use crate::stream::{normalize_address, Dialer};
use bson::{doc, Bson, Document};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// The fields of an isMaster reply discovery reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IsMasterReply {
    pub ismaster: bool,
    pub secondary: bool,
    /// The member's own canonical address.
    pub me: Option<String>,
    pub hosts: Vec<String>,
    pub set_name: Option<String>,
}

impl IsMasterReply {
    /// Reads the reply leniently: role flags may be booleans or numbers, and
    /// absent fields take their defaults.
    pub fn from_document(reply: &Document) -> Self {
        let hosts = reply
            .get_array("hosts")
            .map(|hosts| {
                hosts
                    .iter()
                    .filter_map(Bson::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            ismaster: lenient_bool(reply, "ismaster").unwrap_or(false),
            secondary: lenient_bool(reply, "secondary").unwrap_or(false),
            me: reply.get_str("me").ok().map(str::to_string),
            hosts,
            set_name: reply.get_str("setName").ok().map(str::to_string),
        }
    }
}

fn is_master_command() -> Document {
    doc! {"isMaster": 1}
}

/// One replica-set member.
#[derive(Debug)]
pub struct Member {
    address: String,
    is_primary: bool,
    set_name: Option<String>,
    connection: ConnectionHandle,
    pool: Arc<StreamPool>,
}

impl Member {
    /// Canonical address, as reported by the member.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_primary(&self) -> bool {
        self.is_primary
    }

    pub fn set_name(&self) -> Option<&str> {
        self.set_name.as_deref()
    }

    pub fn connection(&self) -> ConnectionHandle {
        self.connection.clone()
    }

    pub fn pool(&self) -> &StreamPool {
        &self.pool
    }
}

/// Known members and the one used by default.
///
/// Built once by [`Topology::discover`] or [`Topology::direct`]; membership is
/// not refreshed afterwards.
#[derive(Debug)]
pub struct Topology {
    members: HashMap<String, Member>,
    primary: Option<String>,
    default_address: String,
}

struct Probe {
    connection: Connection,
    pool: Arc<StreamPool>,
    reply: IsMasterReply,
}

async fn probe(
    address: &str,
    dialer: &Arc<dyn Dialer>,
    config: &ClientConfig,
    conn_config: &ConnectionConfig,
) -> Result<Probe, ClientError> {
    let pool = Arc::new(StreamPool::new(
        address,
        dialer.clone(),
        config.pool.max_size,
    ));
    pool.prefill(config.pool.initial_size).await?;
    let stream = pool.checkout().await?;

    let mut connection = Connection::from_stream(address, stream, conn_config.clone());
    let reply = connection.run_command("admin", &is_master_command()).await?;
    ensure_ok(&reply)?;
    let reply = IsMasterReply::from_document(&reply);

    Ok(Probe {
        connection,
        pool,
        reply,
    })
}

impl Topology {
    /// Discovers the replica set reachable from `seed`.
    ///
    /// The seed must answer; other members that cannot be reached are
    /// skipped. The primary becomes the default member when one is found,
    /// otherwise the seed does.
    pub async fn discover(
        seed: &str,
        dialer: Arc<dyn Dialer>,
        config: &ClientConfig,
    ) -> Result<Self, ClientError> {
        let seed = normalize_address(seed)?;
        let conn_config = config.connection_config();
        let max_depth = config.discovery.max_depth;
        let max_members = config.discovery.max_members;

        let mut queue = VecDeque::from([(seed.clone(), 0usize)]);
        let mut attempted: HashSet<String> = HashSet::new();
        let mut members: HashMap<String, Member> = HashMap::new();
        let mut primary: Option<String> = None;
        let mut seed_member: Option<String> = None;

        while let Some((address, depth)) = queue.pop_front() {
            if !attempted.insert(address.clone()) {
                continue;
            }
            if members.len() >= max_members {
                tracing::warn!(
                    "Member limit {} reached; not exploring {}",
                    max_members,
                    address
                );
                break;
            }

            let is_seed = address == seed && seed_member.is_none();
            let Probe {
                mut connection,
                pool,
                reply,
            } = match probe(&address, &dialer, config, &conn_config).await {
                Ok(probe) => probe,
                Err(e) if is_seed => return Err(e),
                Err(e) => {
                    tracing::warn!("Skipping member {}: {}", address, e);
                    continue;
                }
            };

            let me = reply
                .me
                .as_deref()
                .and_then(|me| normalize_address(me).ok())
                .unwrap_or_else(|| address.clone());

            if members.contains_key(&me) {
                tracing::debug!("{} is already known as {}; closing", address, me);
                connection.close().await;
                pool.discard();
                continue;
            }
            attempted.insert(me.clone());

            if depth < max_depth {
                for host in &reply.hosts {
                    match normalize_address(host) {
                        Ok(host) if !attempted.contains(&host) && !members.contains_key(&host) => {
                            queue.push_back((host, depth + 1));
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!("Ignoring host listed by {}: {}", me, e),
                    }
                }
            } else if !reply.hosts.is_empty() {
                tracing::debug!("Depth limit {} reached at {}", max_depth, me);
            }

            if reply.ismaster && primary.is_none() {
                primary = Some(me.clone());
            }
            if is_seed {
                seed_member = Some(me.clone());
            }

            tracing::debug!(
                "Registered member {} (primary={}, set={:?})",
                me,
                reply.ismaster,
                reply.set_name
            );
            members.insert(
                me.clone(),
                Member {
                    address: me,
                    is_primary: reply.ismaster,
                    set_name: reply.set_name,
                    connection: connection.into_handle(),
                    pool,
                },
            );
        }

        let default_address = primary
            .clone()
            .or(seed_member)
            .ok_or(ClientError::NoMembers)?;

        tracing::info!(
            "Discovered {} member(s) from {}; primary: {}",
            members.len(),
            seed,
            primary.as_deref().unwrap_or("none")
        );

        Ok(Self {
            members,
            primary,
            default_address,
        })
    }

    /// Registers `address` as the only member without running discovery.
    pub async fn direct(
        address: &str,
        dialer: Arc<dyn Dialer>,
        config: &ClientConfig,
    ) -> Result<Self, ClientError> {
        let address = normalize_address(address)?;
        let pool = Arc::new(StreamPool::new(
            address.clone(),
            dialer,
            config.pool.max_size,
        ));
        pool.prefill(config.pool.initial_size).await?;
        let stream = pool.checkout().await?;
        let connection = Connection::from_stream(address.clone(), stream, config.connection_config());

        let mut members = HashMap::new();
        members.insert(
            address.clone(),
            Member {
                address: address.clone(),
                is_primary: false,
                set_name: None,
                connection: connection.into_handle(),
                pool,
            },
        );
        tracing::info!("Connected directly to {}", address);

        Ok(Self {
            members,
            primary: None,
            default_address: address,
        })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    pub fn member(&self, address: &str) -> Option<&Member> {
        self.members.get(address)
    }

    pub fn primary(&self) -> Option<&Member> {
        self.primary.as_deref().and_then(|a| self.members.get(a))
    }

    fn default_member(&self) -> Result<&Member, ClientError> {
        self.members
            .get(&self.default_address)
            .ok_or(ClientError::NoMembers)
    }

    pub fn default_address(&self) -> &str {
        &self.default_address
    }

    /// The connection operations go through.
    pub fn default_connection(&self) -> Result<ConnectionHandle, ClientError> {
        Ok(self.default_member()?.connection())
    }

    /// A database on the default connection.
    pub fn database(&self, name: &str) -> Result<Database, ClientError> {
        Ok(Database::new(name, self.default_connection()?))
    }

    /// Probes the default connection with isMaster. On failure, and only then,
    /// swaps in a fresh stream from that member's pool.
    pub async fn check_alive(&self) -> Result<(), ClientError> {
        let member = self.default_member()?;
        let mut conn = member.connection.lock().await;

        let probe = match conn.run_command("admin", &is_master_command()).await {
            Ok(reply) => ensure_ok(&reply),
            Err(e) => Err(e),
        };

        match probe {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!("Health probe of {} failed: {}", member.address, e);
                member.pool.discard();
                let stream = member.pool.checkout().await?;
                conn.replace_stream(stream).await;
                tracing::info!("Replaced connection to {}", member.address);
                Ok(())
            }
        }
    }

    /// Closes every member connection.
    pub async fn close(&self) {
        for member in self.members.values() {
            member.connection.lock().await.close().await;
        }
    }
}
