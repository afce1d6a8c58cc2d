//! The `transport` module is responsible for network communication with
//! producers and consumers via WebSockets.
//!
//! It defines the JSON request/response protocol and implements the server
//! that decodes requests and forwards them to the broker.

pub mod message;
pub mod websocket;

pub use message::{ClientMessage, ServerMessage};
pub use websocket::{serve, start_websocket_server};
