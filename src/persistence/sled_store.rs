//! Entity store backed by `sled`
//!
//! Topics, subscriptions and messages each live in their own tree, keyed by
//! the big-endian encoding of their id and stored as JSON. Two index trees
//! hold the foreign keys so that children can be enumerated with a prefix
//! scan:
//! - `topic_subscriptions`: `topic_id ‖ subscription_id`
//! - `subscription_messages`: `subscription_id ‖ message_id`
//!
//! Big-endian keys make prefix scans yield children in ascending id order.
//! Every multi-record write runs inside a single sled transaction, so a
//! publish's copies or a pull's status updates land together or not at all.

use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionResult};
use sled::{Db, IVec, Transactional, Tree};
use tracing::debug;

use crate::broker::message::{DeliveryStatus, Message, MessageId};
use crate::broker::topic::{Subscription, SubscriptionId, Topic, TopicId};
use crate::utils::error::{BrokerError, Result};

const TOPICS: &str = "topics";
const SUBSCRIPTIONS: &str = "subscriptions";
const MESSAGES: &str = "messages";
const TOPIC_SUBSCRIPTIONS: &str = "topic_subscriptions";
const SUBSCRIPTION_MESSAGES: &str = "subscription_messages";

type TxResult<T> = std::result::Result<T, ConflictableTransactionError<BrokerError>>;

#[derive(Clone)]
pub struct Store {
    db: Db,
    topics: Tree,
    subscriptions: Tree,
    messages: Tree,
    topic_subscriptions: Tree,
    subscription_messages: Tree,
}

impl Store {
    /// Open or create a store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self {
            topics: db.open_tree(TOPICS)?,
            subscriptions: db.open_tree(SUBSCRIPTIONS)?,
            messages: db.open_tree(MESSAGES)?,
            topic_subscriptions: db.open_tree(TOPIC_SUBSCRIPTIONS)?,
            subscription_messages: db.open_tree(SUBSCRIPTION_MESSAGES)?,
            db,
        })
    }

    /// Hands out a fresh id. Ids are unique across all record kinds and start at 1.
    pub fn allocate_id(&self) -> Result<u64> {
        Ok(self.db.generate_id()? + 1)
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    pub fn create_topic(&self, name: &str) -> Result<Topic> {
        let topic = Topic {
            id: self.allocate_id()?,
            name: name.to_string(),
            created_at: Utc::now().timestamp_millis(),
        };
        self.topics.insert(id_key(topic.id), encode(&topic)?)?;
        Ok(topic)
    }

    pub fn topic_exists(&self, id: TopicId) -> Result<bool> {
        Ok(self.topics.contains_key(id_key(id))?)
    }

    pub fn get_topic(&self, id: TopicId) -> Result<Topic> {
        match self.topics.get(id_key(id))? {
            Some(bytes) => decode(&bytes),
            None => Err(BrokerError::TopicNotFound(id)),
        }
    }

    pub fn list_topics(&self) -> Result<Vec<Topic>> {
        self.topics
            .iter()
            .values()
            .map(|value| -> Result<Topic> { decode(&value?) })
            .collect()
    }

    /// Creates a subscription bound to `topic_id`.
    ///
    /// The topic is re-checked inside the transaction, so a subscription can
    /// never reference a topic that does not exist.
    pub fn create_subscription(&self, topic_id: TopicId) -> Result<Subscription> {
        let subscription = Subscription {
            id: self.allocate_id()?,
            topic_id,
            created_at: Utc::now().timestamp_millis(),
        };
        let value = encode(&subscription)?;
        let index = pair_key(topic_id, subscription.id);

        let result = (
            &self.topics,
            &self.subscriptions,
            &self.topic_subscriptions,
        )
            .transaction(|(topics, subscriptions, by_topic)| -> TxResult<()> {
                if topics.get(id_key(topic_id))?.is_none() {
                    return Err(ConflictableTransactionError::Abort(
                        BrokerError::TopicNotFound(topic_id),
                    ));
                }
                subscriptions.insert(id_key(subscription.id), value.as_slice())?;
                by_topic.insert(index.as_slice(), IVec::default())?;
                Ok(())
            });
        into_result(result)?;

        Ok(subscription)
    }

    pub fn subscription_exists(&self, id: SubscriptionId) -> Result<bool> {
        Ok(self.subscriptions.contains_key(id_key(id))?)
    }

    pub fn get_subscription(&self, id: SubscriptionId) -> Result<Subscription> {
        match self.subscriptions.get(id_key(id))? {
            Some(bytes) => decode(&bytes),
            None => Err(BrokerError::SubscriptionNotFound(id)),
        }
    }

    /// Subscriptions of a topic in ascending id order.
    pub fn list_subscriptions(&self, topic_id: TopicId) -> Result<Vec<Subscription>> {
        let mut found = Vec::new();
        for entry in self.topic_subscriptions.scan_prefix(id_key(topic_id)) {
            let (key, _) = entry?;
            if let Some(bytes) = self.subscriptions.get(child_key(&key))? {
                found.push(decode(&bytes)?);
            }
        }
        Ok(found)
    }

    /// Inserts a batch of message copies atomically.
    ///
    /// Every copy must reference an existing subscription; if any does not,
    /// the whole batch is rejected and nothing is written.
    pub fn insert_messages(&self, copies: &[Message]) -> Result<()> {
        let encoded = copies
            .iter()
            .map(|copy| -> Result<_> { Ok((copy.id, copy.subscription_id, encode(copy)?)) })
            .collect::<Result<Vec<_>>>()?;

        let result = (
            &self.subscriptions,
            &self.messages,
            &self.subscription_messages,
        )
            .transaction(|(subscriptions, messages, by_subscription)| -> TxResult<()> {
                for (id, subscription_id, value) in &encoded {
                    if subscriptions.get(id_key(*subscription_id))?.is_none() {
                        return Err(ConflictableTransactionError::Abort(
                            BrokerError::SubscriptionNotFound(*subscription_id),
                        ));
                    }
                    messages.insert(id_key(*id), value.as_slice())?;
                    by_subscription.insert(pair_key(*subscription_id, *id), IVec::default())?;
                }
                Ok(())
            });
        into_result(result)?;

        debug!(copies = copies.len(), "inserted message copies");
        Ok(())
    }

    /// Messages owned by a subscription, in ascending id order, optionally
    /// excluding those with status `exclude`.
    pub fn list_messages(
        &self,
        subscription_id: SubscriptionId,
        exclude: Option<DeliveryStatus>,
    ) -> Result<Vec<Message>> {
        let mut found = Vec::new();
        for entry in self.subscription_messages.scan_prefix(id_key(subscription_id)) {
            let (key, _) = entry?;
            let Some(bytes) = self.messages.get(child_key(&key))? else {
                continue;
            };
            let message: Message = decode(&bytes)?;
            if Some(message.status) != exclude {
                found.push(message);
            }
        }
        Ok(found)
    }

    pub fn get_message(&self, id: MessageId) -> Result<Message> {
        match self.messages.get(id_key(id))? {
            Some(bytes) => decode(&bytes),
            None => Err(BrokerError::MessageNotFound(id)),
        }
    }

    /// Overwrites the status of a single message. No lifecycle rules are applied here.
    pub fn update_message_status(&self, id: MessageId, status: DeliveryStatus) -> Result<Message> {
        self.transition(&[id], |message| {
            message.status = status;
            true
        })?
        .pop()
        .ok_or(BrokerError::MessageNotFound(id))
    }

    /// Read-modify-write over a set of messages in one transaction.
    ///
    /// `apply` is called on each message that exists; when it returns `true`
    /// the modified message is written back and included in the result.
    /// Missing ids are skipped. The closure may run more than once if the
    /// transaction conflicts with a concurrent writer, so it must not have
    /// side effects outside the message it is given.
    pub fn transition<F>(&self, ids: &[MessageId], apply: F) -> Result<Vec<Message>>
    where
        F: Fn(&mut Message) -> bool,
    {
        let result = self.messages.transaction(|messages| -> TxResult<Vec<Message>> {
            let mut changed = Vec::new();
            for id in ids {
                let Some(bytes) = messages.get(id_key(*id))? else {
                    continue;
                };
                let mut message: Message =
                    decode(&bytes).map_err(ConflictableTransactionError::Abort)?;
                if apply(&mut message) {
                    let value = encode(&message).map_err(ConflictableTransactionError::Abort)?;
                    messages.insert(id_key(*id), value)?;
                    changed.push(message);
                }
            }
            Ok(changed)
        });
        into_result(result)
    }
}

fn id_key(id: u64) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}

fn pair_key(parent: u64, child: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(16);
    key.extend_from_slice(&parent.to_be_bytes());
    key.extend_from_slice(&child.to_be_bytes());
    key
}

/// The child half of a `pair_key`.
fn child_key(pair: &[u8]) -> &[u8] {
    &pair[pair.len().saturating_sub(8)..]
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

fn into_result<T>(result: TransactionResult<T, BrokerError>) -> Result<T> {
    result.map_err(|e| match e {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => BrokerError::Storage(err),
    })
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("db", &"sled::Db").finish()
    }
}
