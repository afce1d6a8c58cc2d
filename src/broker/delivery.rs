//! Delivery state machine
//!
//! Each message copy moves `NEW -> REQUESTED -> SENT`:
//! - a pull moves every copy that is not yet `SENT` to `REQUESTED`. Copies
//!   that were pulled but never acknowledged are returned again, which gives
//!   at-least-once delivery.
//! - an acknowledge moves `REQUESTED` copies to `SENT`. Acknowledging a copy
//!   that is already `SENT` is accepted and counted again.
//!
//! `SENT` is terminal and a copy cannot be acknowledged before it was pulled.
//! The select-and-update of both operations runs as one store transaction.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::broker::message::{DeliveryStatus, Message, MessageId};
use crate::broker::topic::SubscriptionId;
use crate::persistence::Store;
use crate::utils::error::{BrokerError, Result};

impl DeliveryStatus {
    pub fn is_terminal(self) -> bool {
        self == DeliveryStatus::Sent
    }

    /// Status after a pull, or `None` if the copy is not eligible for pulling.
    pub fn on_pull(self) -> Option<Self> {
        match self {
            DeliveryStatus::New | DeliveryStatus::Requested => Some(DeliveryStatus::Requested),
            DeliveryStatus::Sent => None,
        }
    }

    /// Status after an acknowledgement, or `None` if the copy has not been pulled yet.
    pub fn on_acknowledge(self) -> Option<Self> {
        match self {
            DeliveryStatus::Requested | DeliveryStatus::Sent => Some(DeliveryStatus::Sent),
            DeliveryStatus::New => None,
        }
    }
}

/// Outcome of an acknowledge batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckReport {
    pub acknowledged: usize,
    pub submitted: usize,
}

impl fmt::Display for AckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "acknowledged {}/{}", self.acknowledged, self.submitted)
    }
}

/// Hands every not-yet-`SENT` copy of a subscription to the consumer.
///
/// Each returned copy is `REQUESTED` and its `deliveries` counter has been
/// bumped. A copy returned with `deliveries == 1` was claimed from `NEW` by
/// this pull. Pulls on one subscription are serialized by the store
/// transaction, so no two pulls return the same counter value for a copy.
pub fn pull(store: &Store, subscription_id: SubscriptionId) -> Result<Vec<Message>> {
    if !store.subscription_exists(subscription_id)? {
        return Err(BrokerError::SubscriptionNotFound(subscription_id));
    }

    let pending: Vec<MessageId> = store
        .list_messages(subscription_id, Some(DeliveryStatus::Sent))?
        .iter()
        .map(|message| message.id)
        .collect();

    // Status is re-read inside the transaction; a copy acknowledged since the
    // listing above is left alone.
    let delivered = store.transition(&pending, |message| {
        if message.subscription_id != subscription_id {
            return false;
        }
        match message.status.on_pull() {
            Some(next) => {
                message.status = next;
                message.deliveries += 1;
                true
            }
            None => false,
        }
    })?;

    if delivered.is_empty() {
        return Err(BrokerError::NoNewMessages(subscription_id));
    }
    Ok(delivered)
}

/// Marks the given copies as `SENT`.
///
/// Ids that do not exist, belong to another subscription, or have not been
/// pulled yet are skipped and not counted. The rest of the batch still goes
/// through.
pub fn acknowledge(
    store: &Store,
    subscription_id: SubscriptionId,
    message_ids: &[MessageId],
) -> Result<AckReport> {
    if !store.subscription_exists(subscription_id)? {
        return Err(BrokerError::SubscriptionNotFound(subscription_id));
    }
    if message_ids.is_empty() {
        return Err(BrokerError::InvalidArgument(
            "no message ids to acknowledge".to_string(),
        ));
    }

    let acknowledged = store.transition(message_ids, |message| {
        if message.subscription_id != subscription_id {
            return false;
        }
        match message.status.on_acknowledge() {
            Some(next) => {
                message.status = next;
                true
            }
            None => false,
        }
    })?;

    Ok(AckReport {
        acknowledged: acknowledged.len(),
        submitted: message_ids.len(),
    })
}
