mod client;
mod models;
mod node_store;

pub use client::{PostgresClient, PostgresConfig};
pub use node_store::PostgresNodeStore;
