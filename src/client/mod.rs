//! The `client` module provides an async client for the broker's WebSocket
//! protocol, used by the `client` CLI subcommand and by end-to-end tests.

pub mod pubsub_client;
pub use pubsub_client::PostboxClient;
