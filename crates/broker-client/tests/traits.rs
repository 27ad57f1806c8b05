// SPDX-License-Identifier: Apache-2.0

// tests/traits.rs
// Unit tests for ClientOptions / PublishOptions construction and the
// raw-message BrokerClient surface that doesn't require a live broker.

use broker_client::{BrokerClient, ClientOptions, QoS};

#[tokio::test]
async fn new_client_has_empty_stats_and_queue() {
    let client = BrokerClient::new("127.0.0.1", 1883, "test-client", None)
        .await
        .unwrap();

    assert_eq!(client.client_id(), "test-client");
    assert!(client.is_queue_empty());
    assert_eq!(client.queue_stats().pending, 0);
    assert_eq!(client.publish_stats().published, 0);
}

#[tokio::test]
async fn connect_can_only_be_called_once() {
    let client = BrokerClient::new("127.0.0.1", 1883, "test-client-2", None)
        .await
        .unwrap();

    // First connect takes the event loop out of the client.
    let first = client.connect().await;
    assert!(first.is_ok());

    // A second call finds no event loop left to take.
    let second = client.connect().await;
    assert!(second.is_err());
}

#[tokio::test]
async fn client_options_builder_sets_qos_and_retain() {
    let options = ClientOptions::default()
        .with_qos(QoS::ExactlyOnce)
        .with_retain(true)
        .with_max_concurrency(4);

    let publish_options = options.publish_options.unwrap();
    assert_eq!(publish_options.qos, Some(QoS::ExactlyOnce));
    assert_eq!(publish_options.retain, Some(true));
    assert_eq!(options.max_concurrency, Some(4));
}

#[tokio::test]
async fn reset_stats_zeroes_counters() {
    let client = BrokerClient::new("127.0.0.1", 1883, "test-client-3", None)
        .await
        .unwrap();

    // publish() only queues the request onto rumqttc's internal channel, so
    // it succeeds (and increments publish_stats) even with no event loop
    // running to actually flush it to a socket.
    client
        .publish("pets/cat/mood", b"purring".to_vec())
        .await
        .unwrap();
    assert_eq!(client.publish_stats().published, 1);

    client.reset_stats();
    assert_eq!(client.publish_stats().published, 0);
    assert_eq!(client.publish_stats().failed, 0);
}
