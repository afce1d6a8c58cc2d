//! The `persistence` module owns the durable representation of topics,
//! subscriptions and message copies.
//!
//! It uses `sled` as an embedded key-value store. Nothing outside this module
//! keeps its own copy of an entity; every read and write goes through [`Store`].

pub mod sled_store;

pub use sled_store::Store;
