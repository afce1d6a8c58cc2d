//! Message definitions for the broker
//!
//! A published message never exists on its own: the fan-out engine turns it
//! into one [`Message`] copy per subscription, and each copy then moves
//! through its own [`DeliveryStatus`] lifecycle.
//!
//! Notes on fields:
//! - `payload`: opaque text, never inspected by the broker
//! - `expires_after`: expiry hint in seconds; carried but not enforced
//! - `created_at`: milliseconds since UNIX epoch, set at fan-out
//! - `deliveries`: how many pulls have returned this copy

use serde::{Deserialize, Serialize};

use crate::broker::topic::SubscriptionId;

pub type MessageId = u64;

/// Lifecycle state of a delivery copy. Serialized as `"NEW"`, `"REQUESTED"`, `"SENT"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    #[default]
    New,
    Requested,
    Sent,
}

/// One subscription-scoped copy of a published payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub subscription_id: SubscriptionId,
    pub payload: String,
    pub expires_after: Option<u64>,
    pub status: DeliveryStatus,
    pub created_at: i64,
    #[serde(default)]
    pub deliveries: u32,
}

/// What a producer submits to a topic; the template every copy is built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub payload: String,
    #[serde(default)]
    pub expires_after: Option<u64>,
    #[serde(default)]
    pub status: DeliveryStatus,
}

impl NewMessage {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            ..Self::default()
        }
    }

    pub fn expires_after(mut self, secs: u64) -> Self {
        self.expires_after = Some(secs);
        self
    }
}
