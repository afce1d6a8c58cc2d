//! Wire protocol
//!
//! Every request frame maps to one broker route and gets exactly one response
//! frame. Responses carry an HTTP-style `status`: `200`/`201` on success,
//! `400`/`404`/`500` on the `error` frame.

use serde::{Deserialize, Serialize};

use crate::broker::message::{DeliveryStatus, Message, MessageId};
use crate::broker::topic::{Subscription, SubscriptionId, Topic, TopicId};

pub const STATUS_OK: u16 = 200;
pub const STATUS_CREATED: u16 = 201;
pub const STATUS_BAD_REQUEST: u16 = 400;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// `POST topics`
    CreateTopic {
        #[serde(default)]
        name: String,
    },

    /// `GET topics`
    ListTopics,

    /// `POST topics/{topic_id}/subscriptions`
    Subscribe { topic_id: TopicId },

    /// `GET topics/{topic_id}/subscriptions`
    ListSubscriptions { topic_id: TopicId },

    /// `POST topics/{topic_id}/messages`
    Publish {
        topic_id: TopicId,
        payload: String,
        #[serde(default)]
        expires_after: Option<u64>,
        #[serde(default)]
        status: Option<DeliveryStatus>,
    },

    /// `GET subscriptions/{subscription_id}/messages`
    Pull { subscription_id: SubscriptionId },

    /// Read-only view of a subscription's copies; does not change their status.
    ListMessages {
        subscription_id: SubscriptionId,
        #[serde(default)]
        exclude: Option<DeliveryStatus>,
    },

    /// `POST subscriptions/{subscription_id}/messages`
    Acknowledge {
        subscription_id: SubscriptionId,
        message_ids: Vec<MessageId>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Topic {
        status: u16,
        topic: Topic,
    },
    Topics {
        status: u16,
        topics: Vec<Topic>,
    },
    Subscription {
        status: u16,
        subscription: Subscription,
    },
    Subscriptions {
        status: u16,
        subscriptions: Vec<Subscription>,
    },
    Published {
        status: u16,
        copies: usize,
        message: String,
    },
    Messages {
        status: u16,
        messages: Vec<Message>,
    },
    Acknowledged {
        status: u16,
        acknowledged: usize,
        submitted: usize,
        message: String,
    },
    Error {
        status: u16,
        error: String,
        message: String,
    },
}

impl ServerMessage {
    pub fn status(&self) -> u16 {
        match self {
            ServerMessage::Topic { status, .. }
            | ServerMessage::Topics { status, .. }
            | ServerMessage::Subscription { status, .. }
            | ServerMessage::Subscriptions { status, .. }
            | ServerMessage::Published { status, .. }
            | ServerMessage::Messages { status, .. }
            | ServerMessage::Acknowledged { status, .. }
            | ServerMessage::Error { status, .. } => *status,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ServerMessage::Error { .. })
    }
}
