//! The broker: fan-out of published messages into per-subscription copies and
//! the delivery lifecycle of each copy.

pub mod delivery;
pub mod engine;
pub mod fanout;
pub mod message;
pub mod topic;

pub use delivery::AckReport;
pub use engine::Broker;

#[cfg(test)]
mod tests;
