use serde::{Deserialize, Serialize};

pub type TopicId = u64;
pub type SubscriptionId = u64;

/// A publish target.
///
/// Topics are immutable once created and are never deleted. The `name` is a
/// free-form label and may be empty; identity is the store-assigned `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: TopicId,
    #[serde(default)]
    pub name: String,
    pub created_at: i64,
}

/// A consumer's registration against exactly one topic.
///
/// `topic_id` is fixed at creation. A subscription only receives copies of
/// messages published after it was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub topic_id: TopicId,
    pub created_at: i64,
}
