
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use test_utils::{fast_settings, ServerFixture};
use ua_server::address_space::{
    ids, AttributeId, DataValue, NodeId, ReadValueId, StatusCode, Variant,
};
use ua_server::config::settings::Settings;
use ua_server::subscriptions::{
    CreateSubscriptionRequest, MonitoredItemRequest, NotificationData, NotificationOrdering,
    PublishResponse, SubscriptionState,
};
use ua_server::ServiceError;

fn data_values(response: &PublishResponse) -> Vec<Variant> {
    response
        .notification_message
        .notifications
        .iter()
        .filter_map(|n| match n {
            NotificationData::DataChange(change) => Some(change.value.value.clone()),
            NotificationData::Event(_) => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn write_is_published_once() {
    let fx = ServerFixture::new();
    let temperature = fx.demo.temperature.clone();
    let sub = fx.subscribe(100.0, 30, 10);
    fx.monitor_value(sub, &temperature, 0);

    fx.server.store.write_value(&temperature, 22.0).unwrap();
    let response = fx
        .server
        .subscriptions
        .publish(fx.session, sub, &[])
        .await
        .unwrap();

    assert_eq!(response.subscription_id, sub);
    assert_eq!(response.notification_message.sequence_number, 1);
    assert_eq!(data_values(&response), vec![Variant::Double(22.0)]);
    assert!(!response.more_notifications);
    assert_eq!(response.available_sequence_numbers, vec![1]);
}

#[tokio::test(start_paused = true)]
async fn parked_publish_is_answered_on_the_next_tick() {
    let fx = ServerFixture::new();
    let temperature = fx.demo.temperature.clone();
    let sub = fx.subscribe(100.0, 30, 10);
    fx.monitor_value(sub, &temperature, 0);

    let engine = fx.server.subscriptions.clone();
    let session = fx.session;
    let pending = tokio::spawn(async move { engine.publish(session, sub, &[]).await });
    tokio::task::yield_now().await;

    fx.server.store.write_value(&temperature, 23.5).unwrap();
    let response = pending.await.unwrap().unwrap();
    assert_eq!(data_values(&response), vec![Variant::Double(23.5)]);
    assert_eq!(fx.server.subscriptions.state(sub), Some(SubscriptionState::Normal));
}

#[tokio::test(start_paused = true)]
async fn unchanged_write_queues_nothing() {
    let fx = ServerFixture::new();
    let temperature = fx.demo.temperature.clone();
    let sub = fx.subscribe(100.0, 30, 10);
    let item = fx.monitor_value(sub, &temperature, 5);

    fx.server.store.write_value(&temperature, 6.7).unwrap();
    assert_eq!(fx.server.subscriptions.queued_notifications(sub, item), Some(0));

    fx.server.store.write_value(&temperature, 7.0).unwrap();
    fx.server.store.write_value(&temperature, 7.0).unwrap();
    assert_eq!(fx.server.subscriptions.queued_notifications(sub, item), Some(1));

    // A status change alone is a change.
    let mut uncertain = DataValue::new_now(7.0);
    uncertain.status = StatusCode::UNCERTAIN;
    fx.server
        .store
        .set_value_unchecked(&temperature, uncertain)
        .unwrap();
    assert_eq!(fx.server.subscriptions.queued_notifications(sub, item), Some(2));
}

#[tokio::test(start_paused = true)]
async fn initial_value_is_reported_when_enabled() {
    let mut settings = Settings::default();
    settings.subscriptions.report_initial_value = true;
    let fx = ServerFixture::with_settings(settings);
    let sub = fx.subscribe(100.0, 30, 10);
    let item = fx.monitor_value(sub, &fx.demo.temperature, 0);
    assert_eq!(fx.server.subscriptions.queued_notifications(sub, item), Some(1));

    let response = fx
        .server
        .subscriptions
        .publish(fx.session, sub, &[])
        .await
        .unwrap();
    assert_eq!(data_values(&response), vec![Variant::Double(6.7)]);
}

#[tokio::test(start_paused = true)]
async fn queue_overflow_keeps_newest_values() {
    let fx = ServerFixture::new();
    let temperature = fx.demo.temperature.clone();
    let sub = fx.subscribe(100.0, 30, 10);
    fx.monitor_value(sub, &temperature, 2);

    for value in [1.0, 2.0, 3.0] {
        fx.server.store.write_value(&temperature, value).unwrap();
    }
    let response = fx
        .server
        .subscriptions
        .publish(fx.session, sub, &[])
        .await
        .unwrap();
    assert_eq!(
        data_values(&response),
        vec![Variant::Double(2.0), Variant::Double(3.0)]
    );
}

#[tokio::test(start_paused = true)]
async fn discard_newest_keeps_the_first_values() {
    let fx = ServerFixture::new();
    let temperature = fx.demo.temperature.clone();
    let sub = fx.subscribe(100.0, 30, 10);
    let mut request = MonitoredItemRequest::data_change(ReadValueId::value(temperature.clone()), 7)
        .with_queue_size(2);
    request.discard_oldest = false;
    fx.server
        .subscriptions
        .create_monitored_items(fx.session, sub, vec![request])
        .unwrap()
        .remove(0)
        .unwrap();

    for value in [1.0, 2.0, 3.0] {
        fx.server.store.write_value(&temperature, value).unwrap();
    }
    let response = fx
        .server
        .subscriptions
        .publish(fx.session, sub, &[])
        .await
        .unwrap();
    // The newest queued entry makes room for the latest sample.
    assert_eq!(
        data_values(&response),
        vec![Variant::Double(1.0), Variant::Double(3.0)]
    );
}

#[tokio::test(start_paused = true)]
async fn keep_alive_is_sent_after_idle_intervals() {
    let fx = ServerFixture::new();
    let sub = fx.subscribe(100.0, 30, 3);
    fx.monitor_value(sub, &fx.demo.temperature, 0);

    let started = tokio::time::Instant::now();
    let response = fx
        .server
        .subscriptions
        .publish(fx.session, sub, &[])
        .await
        .unwrap();
    assert!(response.notification_message.is_keep_alive());
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(response.notification_message.sequence_number, 1);
    assert_eq!(fx.server.subscriptions.state(sub), Some(SubscriptionState::KeepAlive));

    // Keep-alives do not consume sequence numbers.
    fx.server.store.write_value(&fx.demo.temperature, 30.0).unwrap();
    let response = fx
        .server
        .subscriptions
        .publish(fx.session, sub, &[])
        .await
        .unwrap();
    assert_eq!(response.notification_message.sequence_number, 1);
    assert_eq!(data_values(&response), vec![Variant::Double(30.0)]);
}

#[tokio::test(start_paused = true)]
async fn subscription_goes_late_without_publish_requests() {
    let fx = ServerFixture::new();
    let sub = fx.subscribe(100.0, 30, 10);
    fx.monitor_value(sub, &fx.demo.temperature, 0);

    fx.server.store.write_value(&fx.demo.temperature, 12.0).unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(fx.server.subscriptions.state(sub), Some(SubscriptionState::Late));

    let response = fx
        .server
        .subscriptions
        .publish(fx.session, sub, &[])
        .await
        .unwrap();
    assert_eq!(data_values(&response), vec![Variant::Double(12.0)]);
    assert_eq!(fx.server.subscriptions.state(sub), Some(SubscriptionState::Normal));
}

#[tokio::test(start_paused = true)]
async fn subscription_expires_after_lifetime() {
    let fx = ServerFixture::new();
    let created = fx.server.subscriptions.create_subscription(
        fx.session,
        CreateSubscriptionRequest::new(100.0, 3, 1),
    );
    let sub = created.subscription_id;
    assert_eq!(created.parameters.max_lifetime_count, 3);

    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(fx.server.subscriptions.state(sub), Some(SubscriptionState::Closed));
    assert_eq!(fx.server.subscriptions.subscription_count(), 0);
    let err = fx
        .server
        .subscriptions
        .publish(fx.session, sub, &[])
        .await
        .unwrap_err();
    assert_eq!(err, ServiceError::SessionExpired(sub));
    assert_eq!(err.status_code(), StatusCode::BAD_SUBSCRIPTION_ID_INVALID);
}

#[tokio::test(start_paused = true)]
async fn only_recent_expiries_are_remembered() {
    let mut settings = Settings::default();
    settings.limits.expired_subscription_history = 2;
    let fx = ServerFixture::with_settings(settings);
    let mut subs = Vec::new();
    for _ in 0..3 {
        subs.push(fx.subscribe(100.0, 3, 1));
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    assert_eq!(fx.server.subscriptions.subscription_count(), 0);

    let engine = &fx.server.subscriptions;
    assert_eq!(engine.state(subs[0]), None);
    assert_eq!(
        engine.publish(fx.session, subs[0], &[]).await.unwrap_err(),
        ServiceError::SubscriptionNotFound(subs[0])
    );
    for &sub in &subs[1..] {
        assert_eq!(engine.state(sub), Some(SubscriptionState::Closed));
        assert_eq!(
            engine.publish(fx.session, sub, &[]).await.unwrap_err(),
            ServiceError::SessionExpired(sub)
        );
    }
}

#[tokio::test(start_paused = true)]
async fn parameters_are_revised_against_limits() {
    let fx = ServerFixture::new();
    let created = fx
        .server
        .subscriptions
        .create_subscription(fx.session, CreateSubscriptionRequest::new(1.0, 1, 0));
    let params = created.parameters;
    assert_eq!(params.publishing_interval, Duration::from_millis(50));
    assert_eq!(params.max_keep_alive_count, 10);
    assert_eq!(params.max_lifetime_count, 30);

    let created = fx
        .server
        .subscriptions
        .create_subscription(fx.session, CreateSubscriptionRequest::new(f64::NAN, 100, 5));
    assert_eq!(created.parameters.publishing_interval, Duration::from_millis(50));
    assert_eq!(created.parameters.max_lifetime_count, 100);
}

#[tokio::test(start_paused = true)]
async fn monitored_item_parameters_are_revised() {
    let fx = ServerFixture::new();
    let sub = fx.subscribe(100.0, 30, 10);
    let node = ReadValueId::value(fx.demo.temperature.clone());

    let mut fast = MonitoredItemRequest::data_change(node.clone(), 1);
    fast.sampling_interval = 5.0;
    let default = MonitoredItemRequest::data_change(node.clone(), 2);
    let huge = MonitoredItemRequest::data_change(node, 3).with_queue_size(5000);
    let missing = MonitoredItemRequest::data_change(ReadValueId::value(NodeId::numeric(2, 999_999)), 4);

    let results = fx
        .server
        .subscriptions
        .create_monitored_items(fx.session, sub, vec![fast, default, huge, missing])
        .unwrap();
    let fast = results[0].as_ref().unwrap();
    assert_eq!(fast.revised_sampling_interval, 50.0);
    let default = results[1].as_ref().unwrap();
    assert_eq!(default.revised_sampling_interval, 100.0);
    assert_eq!(default.revised_queue_size, 1);
    assert_eq!(results[2].as_ref().unwrap().revised_queue_size, 1000);
    assert!(matches!(results[3], Err(ServiceError::NodeNotFound(_))));

    let err = fx
        .server
        .subscriptions
        .create_monitored_items(fx.session, 4242, Vec::new())
        .unwrap_err();
    assert_eq!(err, ServiceError::SubscriptionNotFound(4242));
}

#[tokio::test(start_paused = true)]
async fn unreadable_attributes_cannot_be_monitored() {
    let fx = ServerFixture::new();
    let sub = fx.subscribe(100.0, 30, 10);
    let request = MonitoredItemRequest::data_change(
        ReadValueId {
            node_id: fx.demo.machine.clone(),
            attribute_id: AttributeId::Value,
        },
        1,
    );
    let results = fx
        .server
        .subscriptions
        .create_monitored_items(fx.session, sub, vec![request])
        .unwrap();
    assert_eq!(
        results[0].as_ref().unwrap_err().status_code(),
        StatusCode::BAD_ATTRIBUTE_ID_INVALID
    );
}

#[tokio::test(start_paused = true)]
async fn arrival_ordering_interleaves_items() {
    let fx = ServerFixture::new();
    let (temperature, status) = (fx.demo.temperature.clone(), fx.demo.status.clone());
    let sub = fx.subscribe(100.0, 30, 10);
    fx.monitor_value(sub, &temperature, 5);
    fx.monitor_value(sub, &status, 5);

    fx.server.store.write_value(&temperature, 1.0).unwrap();
    fx.server.store.write_value(&status, "Warning").unwrap();
    fx.server.store.write_value(&temperature, 2.0).unwrap();

    let response = fx
        .server
        .subscriptions
        .publish(fx.session, sub, &[])
        .await
        .unwrap();
    assert_eq!(
        data_values(&response),
        vec![Variant::Double(1.0), Variant::from("Warning"), Variant::Double(2.0)]
    );
}

#[tokio::test(start_paused = true)]
async fn item_ordering_groups_by_item() {
    let mut settings = Settings::default();
    settings.subscriptions.ordering = NotificationOrdering::Item;
    let fx = ServerFixture::with_settings(settings);
    let (temperature, status) = (fx.demo.temperature.clone(), fx.demo.status.clone());
    let sub = fx.subscribe(100.0, 30, 10);
    fx.monitor_value(sub, &temperature, 5);
    fx.monitor_value(sub, &status, 5);

    fx.server.store.write_value(&temperature, 1.0).unwrap();
    fx.server.store.write_value(&status, "Warning").unwrap();
    fx.server.store.write_value(&temperature, 2.0).unwrap();

    let response = fx
        .server
        .subscriptions
        .publish(fx.session, sub, &[])
        .await
        .unwrap();
    assert_eq!(
        data_values(&response),
        vec![Variant::Double(1.0), Variant::Double(2.0), Variant::from("Warning")]
    );
}

#[tokio::test(start_paused = true)]
async fn acknowledge_and_republish() {
    let fx = ServerFixture::new();
    let temperature = fx.demo.temperature.clone();
    let sub = fx.subscribe(100.0, 30, 10);
    fx.monitor_value(sub, &temperature, 0);
    let engine = &fx.server.subscriptions;

    fx.server.store.write_value(&temperature, 1.0).unwrap();
    let first = engine.publish(fx.session, sub, &[]).await.unwrap();
    assert_eq!(first.notification_message.sequence_number, 1);
    let again = engine.republish(fx.session, sub, 1).unwrap();
    assert_eq!(again, first.notification_message);

    fx.server.store.write_value(&temperature, 2.0).unwrap();
    let second = engine.publish(fx.session, sub, &[1, 99]).await.unwrap();
    assert_eq!(second.notification_message.sequence_number, 2);
    assert_eq!(
        second.results,
        vec![StatusCode::GOOD, StatusCode::BAD_SEQUENCE_NUMBER_UNKNOWN]
    );
    assert_eq!(second.available_sequence_numbers, vec![2]);
    assert_eq!(
        engine.republish(fx.session, sub, 1),
        Err(ServiceError::MessageNotAvailable(1))
    );
}

#[tokio::test(start_paused = true)]
async fn retransmission_queue_is_bounded() {
    let mut settings = Settings::default();
    settings.limits.retransmission_queue_size = 2;
    let fx = ServerFixture::with_settings(settings);
    let temperature = fx.demo.temperature.clone();
    let sub = fx.subscribe(100.0, 30, 10);
    fx.monitor_value(sub, &temperature, 0);

    let mut last = None;
    for value in [1.0, 2.0, 3.0] {
        fx.server.store.write_value(&temperature, value).unwrap();
        last = Some(
            fx.server
                .subscriptions
                .publish(fx.session, sub, &[])
                .await
                .unwrap(),
        );
    }
    assert_eq!(last.unwrap().available_sequence_numbers, vec![2, 3]);
}

#[tokio::test(start_paused = true)]
async fn large_batches_are_split_across_publishes() {
    let fx = ServerFixture::new();
    let temperature = fx.demo.temperature.clone();
    let mut request = CreateSubscriptionRequest::new(100.0, 30, 10);
    request.max_notifications_per_publish = 2;
    let sub = fx
        .server
        .subscriptions
        .create_subscription(fx.session, request)
        .subscription_id;
    fx.monitor_value(sub, &temperature, 10);

    for value in [1.0, 2.0, 3.0, 4.0, 5.0] {
        fx.server.store.write_value(&temperature, value).unwrap();
    }
    let engine = &fx.server.subscriptions;
    let first = engine.publish(fx.session, sub, &[]).await.unwrap();
    assert_eq!(first.notification_message.notifications.len(), 2);
    assert!(first.more_notifications);
    let second = engine.publish(fx.session, sub, &[]).await.unwrap();
    assert_eq!(second.notification_message.notifications.len(), 2);
    assert!(second.more_notifications);
    let third = engine.publish(fx.session, sub, &[]).await.unwrap();
    assert_eq!(data_values(&third), vec![Variant::Double(5.0)]);
    assert!(!third.more_notifications);
}

#[tokio::test(start_paused = true)]
async fn subscriptions_belong_to_their_session() {
    let fx = ServerFixture::new();
    let sub = fx.subscribe(100.0, 30, 10);
    let other = fx.server.create_session();

    assert_eq!(
        fx.server.subscriptions.publish(other, sub, &[]).await,
        Err(ServiceError::SubscriptionNotFound(sub))
    );
    assert_eq!(
        fx.server.subscriptions.delete_subscription(other, sub),
        Err(ServiceError::SubscriptionNotFound(sub))
    );

    let results = fx.server.subscriptions.delete_subscriptions(fx.session, &[sub, 999]);
    assert_eq!(
        results,
        vec![StatusCode::GOOD, StatusCode::BAD_SUBSCRIPTION_ID_INVALID]
    );
    assert_eq!(fx.server.subscriptions.state(sub), None);
    assert_eq!(
        fx.server.subscriptions.publish(fx.session, sub, &[]).await,
        Err(ServiceError::SubscriptionNotFound(sub))
    );
}

#[tokio::test(start_paused = true)]
async fn deleting_a_subscription_releases_parked_publishes() {
    let fx = ServerFixture::new();
    let sub = fx.subscribe(100.0, 30, 10);

    let engine = fx.server.subscriptions.clone();
    let session = fx.session;
    let pending = tokio::spawn(async move { engine.publish(session, sub, &[]).await });
    tokio::task::yield_now().await;

    fx.server.subscriptions.delete_subscription(fx.session, sub).unwrap();
    let result = pending.await.unwrap();
    assert_eq!(result, Err(ServiceError::SubscriptionNotFound(sub)));
}

#[tokio::test(start_paused = true)]
async fn publish_any_prefers_subscriptions_with_data() {
    let fx = ServerFixture::new();
    let engine = &fx.server.subscriptions;
    assert_eq!(
        engine.publish_any(fx.session, &[]).await,
        Err(ServiceError::NoSubscription)
    );

    let quiet = fx.subscribe(100.0, 30, 10);
    let busy = fx.subscribe(100.0, 30, 10);
    fx.monitor_value(quiet, &fx.demo.status, 0);
    fx.monitor_value(busy, &fx.demo.temperature, 0);
    assert!(quiet < busy);

    fx.server.store.write_value(&fx.demo.temperature, 40.0).unwrap();
    let response = engine.publish_any(fx.session, &[]).await.unwrap();
    assert_eq!(response.subscription_id, busy);
    assert_eq!(data_values(&response), vec![Variant::Double(40.0)]);
}

#[tokio::test(start_paused = true)]
async fn closing_a_session_deletes_its_subscriptions() {
    let fx = ServerFixture::new();
    let other = fx.server.create_session();
    fx.subscribe(100.0, 30, 10);
    fx.subscribe(100.0, 30, 10);
    fx.server
        .subscriptions
        .create_subscription(other, CreateSubscriptionRequest::default());
    assert_eq!(fx.server.subscriptions.subscription_count(), 3);

    assert!(fx.server.close_session(fx.session));
    assert_eq!(fx.server.subscriptions.subscription_count(), 1);
    assert!(!fx.server.has_session(fx.session));
    assert!(!fx.server.close_session(fx.session));
}

#[tokio::test(start_paused = true)]
async fn deleted_items_stop_reporting() {
    let fx = ServerFixture::new();
    let temperature = fx.demo.temperature.clone();
    let sub = fx.subscribe(100.0, 30, 10);
    let item = fx.monitor_value(sub, &temperature, 0);

    let results = fx
        .server
        .subscriptions
        .delete_monitored_items(fx.session, sub, &[item, 999])
        .unwrap();
    assert_eq!(
        results,
        vec![StatusCode::GOOD, StatusCode::BAD_MONITORED_ITEM_ID_INVALID]
    );
    fx.server.store.write_value(&temperature, 50.0).unwrap();
    assert_eq!(fx.server.subscriptions.queued_notifications(sub, item), None);
}

#[tokio::test(start_paused = true)]
async fn queued_notifications_pin_their_node() {
    let fx = ServerFixture::new();
    let ns = fx.demo.namespace;
    let pump = fx.server.store.add_object(&ids::objects_folder(), ns, "Pump").unwrap();
    let flow = fx.server.store.add_variable(&pump, ns, "Flow", 0.0).unwrap();
    let sub = fx.subscribe(100.0, 30, 10);
    fx.monitor_value(sub, &flow, 0);

    fx.server
        .store
        .set_value_unchecked(&flow, DataValue::new_now(3.0))
        .unwrap();
    let err = fx.server.store.delete_node(&pump, true).unwrap_err();
    assert_eq!(err, ServiceError::NodeInUse(flow.clone()));
    assert_eq!(err.status_code(), StatusCode::BAD_INVALID_STATE);

    fx.server
        .subscriptions
        .publish(fx.session, sub, &[])
        .await
        .unwrap();
    fx.server.store.delete_node(&pump, true).unwrap();
    assert!(!fx.server.store.contains(&flow));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_writers_keep_each_item_in_commit_order() {
    let fx = ServerFixture::with_settings(fast_settings());
    let ns = fx.demo.namespace;
    let tank = fx.server.store.add_object(&ids::objects_folder(), ns, "Tank").unwrap();
    let level = fx.server.store.add_variable(&tank, ns, "Level", -1.0).unwrap();
    let sub = fx.subscribe(10.0, 3000, 1000);
    fx.monitor_value(sub, &level, 1000);

    for round in 0..10u32 {
        let writers: Vec<_> = (0..4u32)
            .map(|writer| {
                let store = Arc::clone(&fx.server.store);
                let level = level.clone();
                tokio::task::spawn_blocking(move || {
                    for i in 0..100u32 {
                        let value = f64::from(round * 10_000 + writer * 1_000 + i);
                        store
                            .set_value_unchecked(&level, DataValue::new_now(value))
                            .unwrap();
                    }
                })
            })
            .collect();
        for finished in join_all(writers).await {
            finished.unwrap();
        }

        let mut received = Vec::new();
        let collect = async {
            while received.len() < 400 {
                let response = fx
                    .server
                    .subscriptions
                    .publish(fx.session, sub, &[])
                    .await
                    .unwrap();
                received.extend(data_values(&response));
            }
        };
        tokio::time::timeout(Duration::from_secs(10), collect)
            .await
            .expect("all changes should be published");

        assert_eq!(received.len(), 400);
        let stored = fx
            .server
            .store
            .get_attribute(&level, AttributeId::Value)
            .unwrap()
            .value;
        assert_eq!(received.last(), Some(&stored), "round {}", round);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delete_racing_writes_leaves_nothing_queued() {
    let fx = ServerFixture::with_settings(fast_settings());
    let ns = fx.demo.namespace;
    let pump = fx.server.store.add_object(&ids::objects_folder(), ns, "Pump").unwrap();
    let flow = fx.server.store.add_variable(&pump, ns, "Flow", 0.0).unwrap();
    let sub = fx.subscribe(10.0, 3000, 1000);
    let item = fx.monitor_value(sub, &flow, 1000);

    let store = Arc::clone(&fx.server.store);
    let target = flow.clone();
    let writer = tokio::task::spawn_blocking(move || {
        let mut i = 1.0;
        loop {
            match store.set_value_unchecked(&target, DataValue::new_now(i)) {
                Ok(()) => i += 1.0,
                Err(err) => return err,
            }
            std::thread::sleep(Duration::from_micros(200));
        }
    });

    let mut deleted = false;
    for _ in 0..1000 {
        match fx.server.store.delete_node(&pump, true) {
            Ok(()) => {
                deleted = true;
                break;
            }
            Err(ServiceError::NodeInUse(_)) => {
                fx.server
                    .subscriptions
                    .publish(fx.session, sub, &[])
                    .await
                    .unwrap();
            }
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }
    assert!(deleted);

    // Once the delete commits, no write can reach the item any more.
    assert_eq!(fx.server.subscriptions.queued_notifications(sub, item), Some(0));
    assert_eq!(writer.await.unwrap(), ServiceError::NodeNotFound(flow.clone()));
    assert_eq!(fx.server.subscriptions.queued_notifications(sub, item), Some(0));
    assert!(!fx.server.store.contains(&flow));
}
