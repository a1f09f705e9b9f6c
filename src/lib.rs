//! # mongowire
//!
//! Client driver for the legacy MongoDB wire protocol.
//!
//! Re-exports [`mongowire_client`] and [`mongowire_protocol`].
//!
//! ```no_run
//! use mongowire::bson::doc;
//! use mongowire::{Client, FindOptions};
//!
//! # async fn run() -> Result<(), mongowire::ClientError> {
//! let client = Client::connect("127.0.0.1:27017").await?;
//! let users = client.database("app")?.collection("users");
//! let mut cursor = users.find(doc! {"active": true}, FindOptions::new()).await?;
//! while cursor.has_next().await {
//!     let user: mongowire::bson::Document = cursor.next()?;
//!     println!("{}", user);
//! }
//! # Ok(())
//! # }
//! ```

pub use mongowire_client::*;
pub use mongowire_protocol as protocol;
