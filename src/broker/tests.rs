use std::collections::HashSet;
use std::thread;

use super::Broker;
use super::delivery::AckReport;
use super::message::{DeliveryStatus, NewMessage};
use crate::config::BrokerSettings;
use crate::persistence::Store;
use crate::utils::error::BrokerError;
use tempfile::{TempDir, tempdir};

fn test_broker() -> (TempDir, Broker) {
    let dir = tempdir().unwrap();
    let broker = Broker::new(Store::open(dir.path()).unwrap());
    (dir, broker)
}

#[test]
fn test_delivery_status_transitions() {
    assert_eq!(DeliveryStatus::New.on_pull(), Some(DeliveryStatus::Requested));
    assert_eq!(
        DeliveryStatus::Requested.on_pull(),
        Some(DeliveryStatus::Requested)
    );
    assert_eq!(DeliveryStatus::Sent.on_pull(), None);

    assert_eq!(DeliveryStatus::New.on_acknowledge(), None);
    assert_eq!(
        DeliveryStatus::Requested.on_acknowledge(),
        Some(DeliveryStatus::Sent)
    );
    assert_eq!(
        DeliveryStatus::Sent.on_acknowledge(),
        Some(DeliveryStatus::Sent)
    );

    assert!(DeliveryStatus::Sent.is_terminal());
    assert!(!DeliveryStatus::Requested.is_terminal());
    assert_eq!(DeliveryStatus::default(), DeliveryStatus::New);
}

#[test]
fn test_ack_report_display() {
    let report = AckReport {
        acknowledged: 2,
        submitted: 3,
    };
    assert_eq!(report.to_string(), "acknowledged 2/3");
}

#[test]
fn test_publish_fans_out_to_every_subscription() {
    let (_dir, broker) = test_broker();
    let topic = broker.create_topic("orders").unwrap();
    let subs: Vec<_> = (0..3).map(|_| broker.subscribe(topic.id).unwrap()).collect();

    let copies = broker
        .publish(topic.id, NewMessage::new("m1").expires_after(30))
        .unwrap();

    assert_eq!(copies.len(), 3);
    let copy_subs: HashSet<_> = copies.iter().map(|c| c.subscription_id).collect();
    let expected: HashSet<_> = subs.iter().map(|s| s.id).collect();
    assert_eq!(copy_subs, expected);

    let ids: HashSet<_> = copies.iter().map(|c| c.id).collect();
    assert_eq!(ids.len(), 3, "every copy has its own id");

    for copy in &copies {
        assert_eq!(copy.payload, "m1");
        assert_eq!(copy.expires_after, Some(30));
        assert_eq!(copy.status, DeliveryStatus::New);
        assert_eq!(copy.deliveries, 0);
        assert_eq!(broker.store().get_message(copy.id).unwrap(), *copy);
    }
}

#[test]
fn test_publish_to_nonexistent_topic() {
    let (_dir, broker) = test_broker();
    let err = broker.publish(77, NewMessage::new("hello")).unwrap_err();
    assert!(matches!(err, BrokerError::TopicNotFound(77)));
}

#[test]
fn test_publish_without_subscribers_is_rejected() {
    let (_dir, broker) = test_broker();
    let topic = broker.create_topic("empty").unwrap();

    let err = broker.publish(topic.id, NewMessage::new("lost")).unwrap_err();
    assert!(matches!(err, BrokerError::NoSubscribers(id) if id == topic.id));

    // A subscriber added afterwards finds nothing waiting.
    let sub = broker.subscribe(topic.id).unwrap();
    assert!(broker.list_messages(sub.id, None).unwrap().is_empty());
}

#[test]
fn test_no_retroactive_fan_out() {
    let (_dir, broker) = test_broker();
    let topic = broker.create_topic("t").unwrap();
    let early = broker.subscribe(topic.id).unwrap();
    broker.publish(topic.id, NewMessage::new("first")).unwrap();

    let late = broker.subscribe(topic.id).unwrap();
    broker.publish(topic.id, NewMessage::new("second")).unwrap();

    let early_payloads: Vec<_> = broker
        .list_messages(early.id, None)
        .unwrap()
        .into_iter()
        .map(|m| m.payload)
        .collect();
    let late_payloads: Vec<_> = broker
        .list_messages(late.id, None)
        .unwrap()
        .into_iter()
        .map(|m| m.payload)
        .collect();

    assert_eq!(early_payloads, vec!["first", "second"]);
    assert_eq!(late_payloads, vec!["second"]);
}

#[test]
fn test_publish_applies_default_expiry() {
    let dir = tempdir().unwrap();
    let settings = BrokerSettings {
        data_dir: dir.path().to_string_lossy().into_owned(),
        default_expires_after_secs: Some(3600),
    };
    let broker = Broker::open(&settings).unwrap();
    let topic = broker.create_topic("t").unwrap();
    broker.subscribe(topic.id).unwrap();

    let defaulted = broker.publish(topic.id, NewMessage::new("a")).unwrap();
    assert_eq!(defaulted[0].expires_after, Some(3600));

    let explicit = broker
        .publish(topic.id, NewMessage::new("b").expires_after(5))
        .unwrap();
    assert_eq!(explicit[0].expires_after, Some(5));
}

#[test]
fn test_subscribe_to_nonexistent_topic() {
    let (_dir, broker) = test_broker();
    assert!(matches!(
        broker.subscribe(3),
        Err(BrokerError::TopicNotFound(3))
    ));
    assert!(matches!(
        broker.list_subscriptions(3),
        Err(BrokerError::TopicNotFound(3))
    ));
}

#[test]
fn test_pull_unknown_subscription() {
    let (_dir, broker) = test_broker();
    assert!(matches!(
        broker.pull(404),
        Err(BrokerError::SubscriptionNotFound(404))
    ));
}

#[test]
fn test_pull_with_nothing_pending() {
    let (_dir, broker) = test_broker();
    let topic = broker.create_topic("t").unwrap();
    let sub = broker.subscribe(topic.id).unwrap();
    assert!(matches!(
        broker.pull(sub.id),
        Err(BrokerError::NoNewMessages(id)) if id == sub.id
    ));
}

#[test]
fn test_pull_redelivers_until_acknowledged() {
    let (_dir, broker) = test_broker();
    let topic = broker.create_topic("t").unwrap();
    let sub = broker.subscribe(topic.id).unwrap();
    broker.publish(topic.id, NewMessage::new("a")).unwrap();
    broker.publish(topic.id, NewMessage::new("b")).unwrap();

    let first = broker.pull(sub.id).unwrap();
    assert_eq!(first.len(), 2);
    assert!(first.iter().all(|m| m.status == DeliveryStatus::Requested));
    assert!(first.iter().all(|m| m.deliveries == 1));

    // Not acknowledged yet: the same copies come back.
    let second = broker.pull(sub.id).unwrap();
    let first_ids: Vec<_> = first.iter().map(|m| m.id).collect();
    let second_ids: Vec<_> = second.iter().map(|m| m.id).collect();
    assert_eq!(first_ids, second_ids);
    assert!(second.iter().all(|m| m.deliveries == 2));

    let report = broker.acknowledge(sub.id, &[first_ids[0]]).unwrap();
    assert_eq!(report.to_string(), "acknowledged 1/1");

    let third = broker.pull(sub.id).unwrap();
    assert_eq!(third.len(), 1);
    assert_eq!(third[0].id, first_ids[1]);

    broker.acknowledge(sub.id, &[first_ids[1]]).unwrap();
    assert!(matches!(
        broker.pull(sub.id),
        Err(BrokerError::NoNewMessages(_))
    ));
}

#[test]
fn test_acknowledge_is_idempotent() {
    let (_dir, broker) = test_broker();
    let topic = broker.create_topic("t").unwrap();
    let sub = broker.subscribe(topic.id).unwrap();
    broker.publish(topic.id, NewMessage::new("a")).unwrap();
    let id = broker.pull(sub.id).unwrap()[0].id;

    let once = broker.acknowledge(sub.id, &[id]).unwrap();
    let twice = broker.acknowledge(sub.id, &[id]).unwrap();
    assert_eq!(once, AckReport { acknowledged: 1, submitted: 1 });
    assert_eq!(twice, AckReport { acknowledged: 1, submitted: 1 });
    assert_eq!(
        broker.store().get_message(id).unwrap().status,
        DeliveryStatus::Sent
    );
}

#[test]
fn test_acknowledge_counts_only_found_ids() {
    let (_dir, broker) = test_broker();
    let topic = broker.create_topic("t").unwrap();
    let sub = broker.subscribe(topic.id).unwrap();
    broker.publish(topic.id, NewMessage::new("a")).unwrap();
    let id = broker.pull(sub.id).unwrap()[0].id;

    let report = broker.acknowledge(sub.id, &[id, 90_001, 90_002]).unwrap();
    assert_eq!(report.to_string(), "acknowledged 1/3");
}

#[test]
fn test_acknowledge_rejects_empty_batch() {
    let (_dir, broker) = test_broker();
    let topic = broker.create_topic("t").unwrap();
    let sub = broker.subscribe(topic.id).unwrap();

    let err = broker.acknowledge(sub.id, &[]).unwrap_err();
    assert!(matches!(err, BrokerError::InvalidArgument(_)));
    assert_eq!(err.status_code(), 400);

    // Unknown subscription is reported before the empty batch.
    assert!(matches!(
        broker.acknowledge(999, &[]),
        Err(BrokerError::SubscriptionNotFound(999))
    ));
}

#[test]
fn test_acknowledge_requires_ownership() {
    let (_dir, broker) = test_broker();
    let topic = broker.create_topic("t").unwrap();
    let s1 = broker.subscribe(topic.id).unwrap();
    let s2 = broker.subscribe(topic.id).unwrap();
    broker.publish(topic.id, NewMessage::new("a")).unwrap();

    let s2_copy = broker.pull(s2.id).unwrap()[0].id;
    let report = broker.acknowledge(s1.id, &[s2_copy]).unwrap();

    assert_eq!(report.acknowledged, 0);
    assert_eq!(
        broker.store().get_message(s2_copy).unwrap().status,
        DeliveryStatus::Requested
    );
}

#[test]
fn test_acknowledge_before_pull_is_skipped() {
    let (_dir, broker) = test_broker();
    let topic = broker.create_topic("t").unwrap();
    let sub = broker.subscribe(topic.id).unwrap();
    let copy = broker.publish(topic.id, NewMessage::new("a")).unwrap()[0].clone();

    let report = broker.acknowledge(sub.id, &[copy.id]).unwrap();
    assert_eq!(report.to_string(), "acknowledged 0/1");
    assert_eq!(
        broker.store().get_message(copy.id).unwrap().status,
        DeliveryStatus::New
    );
}

#[test]
fn test_publish_pull_acknowledge_scenario() {
    let (_dir, broker) = test_broker();
    let topic = broker.create_topic("T").unwrap();
    let s1 = broker.subscribe(topic.id).unwrap();
    let s2 = broker.subscribe(topic.id).unwrap();

    broker.publish(topic.id, NewMessage::new("m1")).unwrap();

    for sub in [&s1, &s2] {
        let copies = broker.list_messages(sub.id, None).unwrap();
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].payload, "m1");
        assert_eq!(copies[0].status, DeliveryStatus::New);
    }

    let pulled = broker.pull(s1.id).unwrap();
    assert_eq!(pulled.len(), 1);
    assert_eq!(pulled[0].status, DeliveryStatus::Requested);

    let report = broker.acknowledge(s1.id, &[pulled[0].id]).unwrap();
    assert_eq!(report.to_string(), "acknowledged 1/1");
    assert_eq!(
        broker.store().get_message(pulled[0].id).unwrap().status,
        DeliveryStatus::Sent
    );

    let untouched = broker.list_messages(s2.id, None).unwrap();
    assert_eq!(untouched.len(), 1);
    assert_eq!(untouched[0].status, DeliveryStatus::New);
}

#[test]
fn test_concurrent_pulls_on_different_subscriptions() {
    let (_dir, broker) = test_broker();
    let topic = broker.create_topic("t").unwrap();
    let a = broker.subscribe(topic.id).unwrap();
    let b = broker.subscribe(topic.id).unwrap();
    for i in 0..20 {
        broker
            .publish(topic.id, NewMessage::new(format!("m{i}")))
            .unwrap();
    }

    let (from_a, from_b) = thread::scope(|scope| {
        let ha = scope.spawn(|| broker.pull(a.id).unwrap());
        let hb = scope.spawn(|| broker.pull(b.id).unwrap());
        (ha.join().unwrap(), hb.join().unwrap())
    });

    assert_eq!(from_a.len(), 20);
    assert_eq!(from_b.len(), 20);
    assert!(from_a.iter().all(|m| m.subscription_id == a.id));
    assert!(from_b.iter().all(|m| m.subscription_id == b.id));
}

#[test]
fn test_concurrent_pulls_never_claim_the_same_copy() {
    let (_dir, broker) = test_broker();
    let topic = broker.create_topic("t").unwrap();
    let sub = broker.subscribe(topic.id).unwrap();
    for i in 0..25 {
        broker
            .publish(topic.id, NewMessage::new(format!("m{i}")))
            .unwrap();
    }

    let sub_id = sub.id;
    let results: Vec<Vec<_>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let broker = broker.clone();
                scope.spawn(move || broker.pull(sub_id).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // Every copy was claimed from NEW by exactly one pull.
    let mut claimed = HashSet::new();
    for pulled in &results {
        for message in pulled.iter().filter(|m| m.deliveries == 1) {
            assert!(claimed.insert(message.id), "copy {} claimed twice", message.id);
        }
    }
    assert_eq!(claimed.len(), 25);

    // And each (copy, attempt) pair was observed at most once.
    let mut attempts = HashSet::new();
    for message in results.iter().flatten() {
        assert!(attempts.insert((message.id, message.deliveries)));
    }

    let stored = broker.list_messages(sub.id, None).unwrap();
    assert!(stored.iter().all(|m| m.deliveries == 4));
}

#[test]
fn test_concurrent_acknowledgements_on_same_ids() {
    let (_dir, broker) = test_broker();
    let topic = broker.create_topic("t").unwrap();
    let sub = broker.subscribe(topic.id).unwrap();
    for i in 0..10 {
        broker
            .publish(topic.id, NewMessage::new(format!("m{i}")))
            .unwrap();
    }
    let ids: Vec<_> = broker.pull(sub.id).unwrap().iter().map(|m| m.id).collect();

    let reports: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| scope.spawn(|| broker.acknowledge(sub.id, &ids).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for report in reports {
        assert_eq!(report, AckReport { acknowledged: 10, submitted: 10 });
    }
    assert!(
        broker
            .list_messages(sub.id, None)
            .unwrap()
            .iter()
            .all(|m| m.status == DeliveryStatus::Sent)
    );
}
