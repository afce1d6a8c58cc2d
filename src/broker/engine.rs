//! Broker engine
//!
//! `Broker` is the only entry point the transport talks to. It validates each
//! request, delegates to the fan-out engine or the delivery state machine, and
//! logs the outcome. Publish, pull and acknowledge each map to one store
//! transaction.
//!
//! Concurrency and usage notes:
//! - `Broker` is cheap to clone (the underlying sled handles are reference
//!   counted) and needs no outer lock; hand one clone to each connection.
//! - The broker keeps no state of its own besides the store handle.

use tracing::{debug, info};

use crate::broker::delivery::{self, AckReport};
use crate::broker::fanout;
use crate::broker::message::{DeliveryStatus, Message, MessageId, NewMessage};
use crate::broker::topic::{Subscription, SubscriptionId, Topic, TopicId};
use crate::config::BrokerSettings;
use crate::persistence::Store;
use crate::utils::error::{BrokerError, Result};

#[derive(Debug, Clone)]
pub struct Broker {
    store: Store,
    default_expires_after: Option<u64>,
}

impl Broker {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            default_expires_after: None,
        }
    }

    pub fn with_settings(store: Store, settings: &BrokerSettings) -> Self {
        Self {
            store,
            default_expires_after: settings.default_expires_after_secs,
        }
    }

    /// Opens the store under `settings.data_dir`.
    pub fn open(settings: &BrokerSettings) -> Result<Self> {
        let store = Store::open(&settings.data_dir)?;
        Ok(Self::with_settings(store, settings))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn create_topic(&self, name: &str) -> Result<Topic> {
        let topic = self.store.create_topic(name)?;
        info!(topic_id = topic.id, name = %topic.name, "topic created");
        Ok(topic)
    }

    pub fn list_topics(&self) -> Result<Vec<Topic>> {
        self.store.list_topics()
    }

    /// Registers a new subscription on an existing topic.
    pub fn subscribe(&self, topic_id: TopicId) -> Result<Subscription> {
        if !self.store.topic_exists(topic_id)? {
            return Err(BrokerError::TopicNotFound(topic_id));
        }
        let subscription = self.store.create_subscription(topic_id)?;
        info!(
            topic_id,
            subscription_id = subscription.id,
            "subscription created"
        );
        Ok(subscription)
    }

    pub fn list_subscriptions(&self, topic_id: TopicId) -> Result<Vec<Subscription>> {
        if !self.store.topic_exists(topic_id)? {
            return Err(BrokerError::TopicNotFound(topic_id));
        }
        self.store.list_subscriptions(topic_id)
    }

    /// Publishes a message to every current subscription of `topic_id`.
    ///
    /// A message without an expiry hint gets the configured default.
    pub fn publish(&self, topic_id: TopicId, mut message: NewMessage) -> Result<Vec<Message>> {
        if message.expires_after.is_none() {
            message.expires_after = self.default_expires_after;
        }
        let copies = fanout::fan_out(&self.store, topic_id, &message)?;
        info!(topic_id, copies = copies.len(), "message published");
        Ok(copies)
    }

    /// Returns every unacknowledged copy of a subscription, now `REQUESTED`.
    pub fn pull(&self, subscription_id: SubscriptionId) -> Result<Vec<Message>> {
        let messages = delivery::pull(&self.store, subscription_id)?;
        let claimed = messages.iter().filter(|m| m.deliveries == 1).count();
        debug!(
            subscription_id,
            returned = messages.len(),
            claimed,
            "messages pulled"
        );
        Ok(messages)
    }

    pub fn acknowledge(
        &self,
        subscription_id: SubscriptionId,
        message_ids: &[MessageId],
    ) -> Result<AckReport> {
        let report = delivery::acknowledge(&self.store, subscription_id, message_ids)?;
        info!(
            subscription_id,
            acknowledged = report.acknowledged,
            submitted = report.submitted,
            "messages acknowledged"
        );
        Ok(report)
    }

    /// Lists a subscription's copies without changing their status.
    pub fn list_messages(
        &self,
        subscription_id: SubscriptionId,
        exclude: Option<DeliveryStatus>,
    ) -> Result<Vec<Message>> {
        if !self.store.subscription_exists(subscription_id)? {
            return Err(BrokerError::SubscriptionNotFound(subscription_id));
        }
        self.store.list_messages(subscription_id, exclude)
    }
}
