//! Fan-out: one published message becomes one copy per subscription.

use chrono::Utc;

use crate::broker::message::{Message, NewMessage};
use crate::broker::topic::TopicId;
use crate::persistence::Store;
use crate::utils::error::{BrokerError, Result};

/// Builds and persists one copy of `template` for every subscription of `topic_id`.
///
/// Fails with `TopicNotFound` for an unknown topic and `NoSubscribers` when the
/// topic has no subscriptions, in which case nothing is written. The copies are
/// written with a single `insert_messages` call, so either all of them become
/// visible or none do. They are returned in subscription id order.
///
/// Only subscriptions that exist at this moment receive a copy; later
/// subscriptions never see messages published before they were created.
pub fn fan_out(store: &Store, topic_id: TopicId, template: &NewMessage) -> Result<Vec<Message>> {
    if !store.topic_exists(topic_id)? {
        return Err(BrokerError::TopicNotFound(topic_id));
    }

    let subscriptions = store.list_subscriptions(topic_id)?;
    if subscriptions.is_empty() {
        return Err(BrokerError::NoSubscribers(topic_id));
    }

    let created_at = Utc::now().timestamp_millis();
    let copies = subscriptions
        .iter()
        .map(|subscription| -> Result<Message> {
            Ok(Message {
                id: store.allocate_id()?,
                subscription_id: subscription.id,
                payload: template.payload.clone(),
                expires_after: template.expires_after,
                status: template.status,
                created_at,
                deliveries: 0,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    store.insert_messages(&copies)?;
    Ok(copies)
}
