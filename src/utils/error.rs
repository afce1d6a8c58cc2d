//! The `error` module defines the error types used within the `postbox` application.
//!
//! Every public broker operation returns [`Result`], whose error side is a
//! [`BrokerError`]. Errors are classified into a small taxonomy ([`ErrorKind`])
//! that the transport maps onto HTTP-style status codes.

use thiserror::Error;

use crate::broker::message::MessageId;
use crate::broker::topic::{SubscriptionId, TopicId};

pub type Result<T> = std::result::Result<T, BrokerError>;

/// Errors raised by the store, the fan-out engine and the delivery state machine.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("topic {0} not found")]
    TopicNotFound(TopicId),

    #[error("subscription {0} not found")]
    SubscriptionNotFound(SubscriptionId),

    #[error("message {0} not found")]
    MessageNotFound(MessageId),

    #[error("there are no subscriptions for topic {0}")]
    NoSubscribers(TopicId),

    #[error("no new messages for subscription {0}")]
    NoNewMessages(SubscriptionId),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("record encoding error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Coarse classification of a [`BrokerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A topic, subscription or message is absent.
    NotFound,
    /// Nothing to do: no subscribers to publish to, or no messages to pull.
    PreconditionFailed,
    InvalidArgument,
    /// Storage or encoding failure. Distinct from the caller-facing taxonomy.
    Internal,
}

impl BrokerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BrokerError::TopicNotFound(_)
            | BrokerError::SubscriptionNotFound(_)
            | BrokerError::MessageNotFound(_) => ErrorKind::NotFound,
            BrokerError::NoSubscribers(_) | BrokerError::NoNewMessages(_) => {
                ErrorKind::PreconditionFailed
            }
            BrokerError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            BrokerError::Storage(_) | BrokerError::Codec(_) => ErrorKind::Internal,
        }
    }

    /// HTTP-style status code reported to clients.
    ///
    /// "Nothing to do" conditions are reported as `404`, the same as a missing entity.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound | ErrorKind::PreconditionFailed => 404,
            ErrorKind::InvalidArgument => 400,
            ErrorKind::Internal => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::PreconditionFailed => "PRECONDITION_FAILED",
            ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

/// Errors raised by [`crate::client::PostboxClient`].
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("invalid frame: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("connection closed by server")]
    Closed,
}
