//! # Postbox
//!
//! `postbox` is a small pull-based publish/subscribe broker. Producers publish
//! to a topic, every subscription of that topic receives its own durable copy,
//! and consumers pull and acknowledge the copies of their subscription.
//!
//! ## Core Modules
//!
//! - `broker`: fan-out of published messages and the `NEW -> REQUESTED -> SENT` delivery lifecycle.
//! - `client`: an async WebSocket client for the broker protocol.
//! - `config`: loads server, broker and logging settings.
//! - `persistence`: the `sled`-backed store for topics, subscriptions and message copies.
//! - `transport`: the WebSocket server and its JSON protocol.
//! - `utils`: error types and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod persistence;
pub mod transport;
pub mod utils;
