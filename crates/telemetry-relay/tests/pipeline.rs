// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// End-to-end relay behaviour over in-memory broker, sink and viewers.

mod common;

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use common::*;
use std::sync::Arc;
use std::time::Duration;
use telemetry_relay::config::DecodeFailurePolicy;
use telemetry_relay::{
    ProvisionError, ReadError, Relay, RelayConfig, RelayError, SubscriptionStatus, TopicStatus,
};

const TOPIC: &str = "sensor_data";
const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(150);

fn relay_with(
    config: RelayConfig,
    broker: Arc<MemoryBroker>,
    mode: SinkMode,
) -> (
    Relay<MemoryBroker>,
    Arc<RecordingSink>,
    tokio::sync::mpsc::UnboundedReceiver<telemetry_relay::Reading>,
) {
    let (sink, stored) = RecordingSink::new(mode);
    let relay = Relay::new(config, broker, sink.clone());
    (relay, sink, stored)
}

async fn wait_until_halted(relay: &Relay<MemoryBroker>, topic: &str) -> bool {
    eventually(WAIT, || {
        relay
            .subscriptions()
            .iter()
            .any(|s| s.topic == topic && !s.running)
    })
    .await
}

#[tokio::test]
async fn test_flat_payload_is_stored_and_broadcast() {
    let broker = Arc::new(MemoryBroker::new());
    let (relay, _sink, mut stored) = relay_with(test_config(), broker.clone(), SinkMode::Ok);

    let (a, mut a_probe) = RecordingViewer::healthy();
    let (b, mut b_probe) = RecordingViewer::healthy();
    relay.register_viewer(a).await.expect("register a");
    relay.register_viewer(b).await.expect("register b");
    assert_eq!(relay.active_viewer_count().await, 2);

    let feed = broker.feed(TOPIC);
    let status = relay.provision_and_subscribe(TOPIC).await.expect("subscribe");
    assert_eq!(
        status,
        SubscriptionStatus::Subscribed {
            topic: TOPIC.into(),
            group_id: "sensor_data-consumer".into(),
            topic_status: TopicStatus::Created,
        }
    );
    assert!(broker.has_topic(TOPIC));

    feed.send(Ok(Bytes::from_static(FLAT_ABC0001.as_bytes())))
        .unwrap();

    let reading = recv_within(&mut stored, WAIT).await.expect("stored reading");
    assert_eq!(reading.serial, "ABC0001");
    assert_eq!(reading.sensor_type, "Incubator");
    assert_eq!(
        reading.timestamp,
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    );
    assert_eq!(reading.readings, vec![21.5, 55.0, 400.0]);

    // Viewers get the exact inbound bytes, not a re-encoding.
    for probe in [&mut a_probe, &mut b_probe] {
        let payload = recv_within(&mut probe.received, WAIT)
            .await
            .expect("broadcast");
        assert_eq!(payload, Bytes::from_static(FLAT_ABC0001.as_bytes()));
    }
}

#[tokio::test]
async fn test_bad_timestamp_halts_consumer() {
    let broker = Arc::new(MemoryBroker::new());
    let (relay, sink, mut stored) = relay_with(test_config(), broker.clone(), SinkMode::Ok);

    let (viewer, mut probe) = RecordingViewer::healthy();
    relay.register_viewer(viewer).await.unwrap();

    let feed = broker.feed(TOPIC);
    relay.provision_and_subscribe(TOPIC).await.unwrap();

    feed.send(Ok(Bytes::from_static(ENVELOPED_BAD_TIMESTAMP.as_bytes())))
        .unwrap();
    // Never reached: the consumer stops on the first undecodable message.
    let _ = feed.send(Ok(Bytes::from_static(FLAT_ABC0001.as_bytes())));

    assert!(wait_until_halted(&relay, TOPIC).await);
    assert!(recv_within(&mut stored, QUIET).await.is_none());
    assert!(recv_within(&mut probe.received, QUIET).await.is_none());
    assert_eq!(sink.attempts(), 0);

    let stats = relay.stats();
    assert_eq!(stats.messages_received, 1);
    assert_eq!(stats.decode_errors, 1);
}

#[tokio::test]
async fn test_skip_policy_continues_after_bad_message() {
    let mut config = test_config();
    config.consumer.on_decode_error = DecodeFailurePolicy::Skip;

    let broker = Arc::new(MemoryBroker::new());
    let (relay, _sink, mut stored) = relay_with(config, broker.clone(), SinkMode::Ok);

    let feed = broker.feed(TOPIC);
    relay.provision_and_subscribe(TOPIC).await.unwrap();

    feed.send(Ok(Bytes::from_static(ENVELOPED_BAD_TIMESTAMP.as_bytes())))
        .unwrap();
    feed.send(Ok(Bytes::from_static(b"not json"))).unwrap();
    feed.send(Ok(Bytes::from_static(FLAT_ABC0001.as_bytes())))
        .unwrap();

    let reading = recv_within(&mut stored, WAIT).await.expect("stored reading");
    assert_eq!(reading.serial, "ABC0001");
    assert_eq!(relay.stats().decode_errors, 2);
    assert!(relay.subscriptions()[0].running);
}

#[tokio::test]
async fn test_sink_failure_does_not_block_broadcast() {
    let broker = Arc::new(MemoryBroker::new());
    let (relay, sink, _stored) = relay_with(test_config(), broker.clone(), SinkMode::Fail);

    let (viewer, mut probe) = RecordingViewer::healthy();
    relay.register_viewer(viewer).await.unwrap();

    let feed = broker.feed(TOPIC);
    relay.provision_and_subscribe(TOPIC).await.unwrap();
    feed.send(Ok(Bytes::from_static(FLAT_ABC0001.as_bytes())))
        .unwrap();
    feed.send(Ok(Bytes::from_static(FLAT_ABC0001.as_bytes())))
        .unwrap();

    assert!(recv_within(&mut probe.received, WAIT).await.is_some());
    assert!(recv_within(&mut probe.received, WAIT).await.is_some());
    assert!(eventually(WAIT, || relay.stats().sink_errors == 2).await);
    assert_eq!(sink.attempts(), 2);
    assert!(relay.subscriptions()[0].running);
}

#[tokio::test]
async fn test_hung_sink_does_not_block_broadcast() {
    let config = test_config();
    let pool = config.dispatch.max_in_flight_writes;
    let broker = Arc::new(MemoryBroker::new());
    let (relay, sink, _stored) = relay_with(config, broker.clone(), SinkMode::Hang);

    let (viewer, mut probe) = RecordingViewer::healthy();
    relay.register_viewer(viewer).await.unwrap();

    let feed = broker.feed(TOPIC);
    relay.provision_and_subscribe(TOPIC).await.unwrap();

    // Every write hangs, so the write pool fills after `pool` messages.
    // Viewers must keep receiving past that point.
    for _ in 0..pool + 6 {
        feed.send(Ok(Bytes::from_static(FLAT_ABC0001.as_bytes())))
            .unwrap();
        assert!(recv_within(&mut probe.received, WAIT).await.is_some());
    }

    assert!(eventually(WAIT, || sink.attempts() == pool).await);
    let stats = relay.stats();
    assert_eq!(stats.readings_stored, 0);
    assert_eq!(stats.writes_skipped, 6);
}

#[tokio::test]
async fn test_stalled_viewer_does_not_block_store_writes() {
    let mut config = test_config();
    config.hub.write_timeout_ms = 60_000;
    config.dispatch.max_in_flight_broadcasts = 2;
    let broker = Arc::new(MemoryBroker::new());
    let (relay, _sink, mut stored) = relay_with(config, broker.clone(), SinkMode::Ok);

    let (viewer, _probe) = RecordingViewer::stalled();
    relay.register_viewer(viewer).await.unwrap();

    let feed = broker.feed(TOPIC);
    relay.provision_and_subscribe(TOPIC).await.unwrap();

    // The first broadcast hangs on the viewer and the second waits for the
    // hub; later payloads are not broadcast, but every reading is stored.
    for _ in 0..10 {
        feed.send(Ok(Bytes::from_static(FLAT_ABC0001.as_bytes())))
            .unwrap();
        assert!(recv_within(&mut stored, WAIT).await.is_some());
    }

    assert!(eventually(WAIT, || relay.stats().readings_stored == 10).await);
    assert_eq!(relay.stats().broadcasts_skipped, 8);
}

#[tokio::test]
async fn test_failing_viewer_is_dropped_others_still_receive() {
    let broker = Arc::new(MemoryBroker::new());
    let (relay, _sink, mut stored) = relay_with(test_config(), broker.clone(), SinkMode::Ok);

    let (good_a, mut probe_a) = RecordingViewer::healthy();
    let (bad, bad_probe) = RecordingViewer::failing();
    let (good_b, mut probe_b) = RecordingViewer::healthy();
    relay.register_viewer(good_a).await.unwrap();
    relay.register_viewer(bad).await.unwrap();
    relay.register_viewer(good_b).await.unwrap();

    let feed = broker.feed(TOPIC);
    relay.provision_and_subscribe(TOPIC).await.unwrap();
    feed.send(Ok(Bytes::from_static(FLAT_ABC0001.as_bytes())))
        .unwrap();

    assert!(recv_within(&mut probe_a.received, WAIT).await.is_some());
    assert!(recv_within(&mut probe_b.received, WAIT).await.is_some());
    assert!(recv_within(&mut stored, WAIT).await.is_some());

    assert!(eventually(WAIT, || relay.stats().broadcasts == 1).await);
    assert!(bad_probe.is_closed());
    assert_eq!(relay.active_viewer_count().await, 2);

    let stats = relay.stats();
    assert_eq!(stats.viewer_writes, 2);
    assert_eq!(stats.viewer_drops, 1);
}

#[tokio::test]
async fn test_read_error_is_logged_and_consumption_continues() {
    let broker = Arc::new(MemoryBroker::new());
    let (relay, _sink, mut stored) = relay_with(test_config(), broker.clone(), SinkMode::Ok);

    let feed = broker.feed(TOPIC);
    relay.provision_and_subscribe(TOPIC).await.unwrap();

    feed.send(Err(ReadError("partition leader changed".into())))
        .unwrap();
    feed.send(Ok(Bytes::from_static(FLAT_ABC0001.as_bytes())))
        .unwrap();

    assert!(recv_within(&mut stored, WAIT).await.is_some());
    let stats = relay.stats();
    assert_eq!(stats.read_errors, 1);
    assert_eq!(stats.messages_received, 1);
}

#[tokio::test]
async fn test_closed_stream_ends_consumer() {
    let broker = Arc::new(MemoryBroker::new());
    let (relay, _sink, _stored) = relay_with(test_config(), broker.clone(), SinkMode::Ok);

    let feed = broker.feed(TOPIC);
    relay.provision_and_subscribe(TOPIC).await.unwrap();
    drop(feed);

    assert!(wait_until_halted(&relay, TOPIC).await);
}

#[tokio::test]
async fn test_second_subscribe_reports_existing_consumer() {
    let broker = Arc::new(MemoryBroker::new());
    let (relay, _sink, _stored) = relay_with(test_config(), broker.clone(), SinkMode::Ok);

    relay.provision_and_subscribe(TOPIC).await.unwrap();
    let second = relay.provision_and_subscribe(TOPIC).await.unwrap();

    assert_eq!(
        second,
        SubscriptionStatus::AlreadySubscribed {
            topic: TOPIC.into(),
            group_id: "sensor_data-consumer".into(),
        }
    );
    assert_eq!(broker.subscriptions().len(), 1);
    assert_eq!(relay.subscriptions().len(), 1);
}

#[tokio::test]
async fn test_concurrent_subscribes_start_one_consumer() {
    let broker = Arc::new(MemoryBroker::new());
    broker.yield_on_create();
    let (relay, _sink, _stored) = relay_with(test_config(), broker.clone(), SinkMode::Ok);

    let (a, b) = tokio::join!(
        relay.provision_and_subscribe(TOPIC),
        relay.provision_and_subscribe(TOPIC)
    );

    assert!(matches!(a.unwrap(), SubscriptionStatus::Subscribed { .. }));
    assert!(matches!(
        b.unwrap(),
        SubscriptionStatus::AlreadySubscribed { .. }
    ));
    // Both callers reached the broker; only one consumer was kept.
    assert_eq!(broker.subscriptions().len(), 2);
    assert_eq!(relay.subscriptions().len(), 1);
    assert!(relay.subscriptions()[0].running);
}

#[tokio::test]
async fn test_halted_consumer_can_be_restarted() {
    let broker = Arc::new(MemoryBroker::new());
    let (relay, _sink, mut stored) = relay_with(test_config(), broker.clone(), SinkMode::Ok);

    let feed = broker.feed(TOPIC);
    relay.provision_and_subscribe(TOPIC).await.unwrap();
    feed.send(Ok(Bytes::from_static(ENVELOPED_BAD_TIMESTAMP.as_bytes())))
        .unwrap();
    assert!(wait_until_halted(&relay, TOPIC).await);

    let feed = broker.feed(TOPIC);
    let status = relay.provision_and_subscribe(TOPIC).await.unwrap();
    assert!(matches!(
        status,
        SubscriptionStatus::Subscribed {
            topic_status: TopicStatus::AlreadyExists,
            ..
        }
    ));

    feed.send(Ok(Bytes::from_static(FLAT_ABC0001.as_bytes())))
        .unwrap();
    assert!(recv_within(&mut stored, WAIT).await.is_some());
    assert_eq!(broker.subscriptions().len(), 2);
}

#[tokio::test]
async fn test_independent_topics_use_their_own_groups() {
    let broker = Arc::new(MemoryBroker::new());
    let (relay, _sink, _stored) = relay_with(test_config(), broker.clone(), SinkMode::Ok);

    relay.provision_and_subscribe("lab_b").await.unwrap();
    relay.provision_and_subscribe("lab_a").await.unwrap();

    let subs = relay.subscriptions();
    assert_eq!(subs.len(), 2);
    assert_eq!(subs[0].topic, "lab_a");
    assert_eq!(subs[0].group_id, "lab_a-consumer");
    assert_eq!(subs[1].group_id, "lab_b-consumer");
}

#[tokio::test]
async fn test_shutdown_stops_consumers_and_refuses_new_work() {
    let broker = Arc::new(MemoryBroker::new());
    let (relay, _sink, _stored) = relay_with(test_config(), broker.clone(), SinkMode::Ok);

    relay.provision_and_subscribe(TOPIC).await.unwrap();
    tokio::time::timeout(WAIT, relay.shutdown())
        .await
        .expect("shutdown completes");

    assert!(relay.subscriptions().is_empty());
    assert!(matches!(
        relay.provision_and_subscribe("other").await,
        Err(RelayError::ShuttingDown)
    ));
}

#[tokio::test]
async fn test_provisioning_retries_until_broker_is_up() {
    let broker = Arc::new(MemoryBroker::new());
    broker.fail_probes(2);
    let (relay, _sink, _stored) = relay_with(test_config(), broker.clone(), SinkMode::Ok);

    let status = relay.provision_and_subscribe(TOPIC).await.unwrap();
    assert!(matches!(status, SubscriptionStatus::Subscribed { .. }));
    assert_eq!(broker.probes(), 3);
}

#[tokio::test]
async fn test_provisioning_gives_up_after_retry_cap() {
    let broker = Arc::new(MemoryBroker::new());
    broker.fail_probes(100);
    let (relay, _sink, _stored) = relay_with(test_config(), broker.clone(), SinkMode::Ok);

    let err = relay.provision_and_subscribe(TOPIC).await.unwrap_err();
    assert!(matches!(
        err,
        RelayError::Provision(ProvisionError::BrokerUnavailable { attempts: 3, .. })
    ));
    assert_eq!(broker.probes(), 3);
    assert!(broker.subscriptions().is_empty());
    assert!(relay.subscriptions().is_empty());
}

#[tokio::test]
async fn test_existing_topic_is_not_an_error() {
    let broker = Arc::new(MemoryBroker::new().with_topic(TOPIC));
    let (relay, _sink, _stored) = relay_with(test_config(), broker.clone(), SinkMode::Ok);

    let status = relay.provision_and_subscribe(TOPIC).await.unwrap();
    assert!(matches!(
        status,
        SubscriptionStatus::Subscribed {
            topic_status: TopicStatus::AlreadyExists,
            ..
        }
    ));
}

#[tokio::test]
async fn test_topic_creation_failure_is_reported() {
    let broker = Arc::new(MemoryBroker::new());
    broker.fail_topic_creation();
    let (relay, _sink, _stored) = relay_with(test_config(), broker.clone(), SinkMode::Ok);

    let err = relay.provision_and_subscribe(TOPIC).await.unwrap_err();
    assert!(matches!(
        err,
        RelayError::Provision(ProvisionError::TopicCreateFailed { ref topic, .. }) if topic == TOPIC
    ));
    assert!(broker.subscriptions().is_empty());
}

#[tokio::test]
async fn test_invalid_topic_name_is_rejected_before_provisioning() {
    let broker = Arc::new(MemoryBroker::new());
    let (relay, _sink, _stored) = relay_with(test_config(), broker.clone(), SinkMode::Ok);

    for name in ["", "has space", "a/b"] {
        let err = relay.provision_and_subscribe(name).await.unwrap_err();
        assert!(matches!(err, RelayError::InvalidTopic { .. }));
    }
    assert_eq!(broker.probes(), 0);
}
