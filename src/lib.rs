//! EmberDB Rust Client SDK
//!
//! A client for EmberDB, a hosted realtime document database. One-shot
//! reads and writes go over REST; live listeners stream change events
//! over a WebSocket.
//!
//! # Example
//!
//! ```no_run
//! use emberdb::{field, ClientOptions, EmberDb, ListenOptions, QueryBuilder, UpdateSpec};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> emberdb::Result<()> {
//!   let db = EmberDb::new(
//!     ClientOptions::new("https://db.example.com", "main").with_auth("secret-token"),
//!   )?;
//!
//!   // Write a document
//!   let users = db.collection("users")?;
//!   let alice = users.document("alice")?;
//!   db.set_document(&alice, &json!({"name": "Alice", "age": 31})).await?;
//!
//!   // Update it
//!   db.update_document(&alice, &UpdateSpec::new().increment("age", 1)).await?;
//!
//!   // Listen for adults
//!   let query = QueryBuilder::new().find(field("age").gte(18));
//!   let mut sub = db.listen_collection(
//!     &users,
//!     ListenOptions::new().with_initial_data(true).with_query(query),
//!   )?;
//!   while let Some(event) = sub.next().await {
//!     println!("Change: {:?}", event?);
//!   }
//!
//!   Ok(())
//! }
//! ```

mod client;
mod error;
pub mod geometry;
pub mod protocol;
pub mod query;
mod reference;
pub mod rest;
pub mod schema;
pub mod subscription;
pub mod transport;
pub mod update;
mod value;

pub use client::{AuthProvider, ClientOptions, EmberDb, StaticAuth};
pub use error::{Error, Result};
pub use geometry::{validate_geometry, GeometryType};
pub use protocol::{ChangeEvent, Collection, Document};
pub use query::{and, element, field, nor, or, Expression, Projection, QueryBuilder, SortDir};
pub use reference::{CollectionReference, DocumentReference, Reference};
pub use rest::RestClient;
pub use subscription::{reconnect_delay, CloseReason, ListenOptions, Subscription, SubscriptionState};
pub use transport::{Connection, Connector, TransportEvent, WebSocketConnector};
pub use update::{UpdateOp, UpdateSpec};
pub use value::Operand;
