use crate::address_space::node::{AttributeId, NodeAttributes, SUBSCRIBE_TO_EVENTS};
use crate::address_space::node_id::NodeId;
use crate::address_space::references::ids;
use crate::address_space::status::StatusCode;
use crate::address_space::store::{AttributeObserver, NodeStore};
use crate::address_space::variant::DataValue;
use crate::config::settings::{Limits, Settings};
use crate::error::{ServiceError, ServiceResult};
use crate::events::event::Event;
use crate::events::filter::EventFilter;
use crate::subscriptions::monitored_item::{MonitoredItem, MonitoredItemCreated, MonitoredItemRequest};
use crate::subscriptions::subscription::{
    NotificationMessage, NotificationOrdering, PublishAttempt, PublishResponse, SessionId,
    Subscription, SubscriptionParameters, SubscriptionState, TimerOutcome,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub limits: Limits,
    pub ordering: NotificationOrdering,
    pub report_initial_value: bool,
}

impl EngineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        EngineConfig {
            limits: settings.limits.clone(),
            ordering: settings.subscriptions.ordering,
            report_initial_value: settings.subscriptions.report_initial_value,
        }
    }
}

/// Client-requested subscription parameters, revised against `Limits`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub publishing_interval_ms: f64,
    pub max_lifetime_count: u32,
    /// 0 selects the configured default.
    pub max_keep_alive_count: u32,
    pub max_notifications_per_publish: u32,
}

impl CreateSubscriptionRequest {
    pub fn new(publishing_interval_ms: f64, max_lifetime_count: u32, max_keep_alive_count: u32) -> Self {
        CreateSubscriptionRequest {
            publishing_interval_ms,
            max_lifetime_count,
            max_keep_alive_count,
            max_notifications_per_publish: 0,
        }
    }
}

impl Default for CreateSubscriptionRequest {
    fn default() -> Self {
        CreateSubscriptionRequest::new(500.0, 30, 10)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SubscriptionCreated {
    pub subscription_id: u32,
    pub parameters: SubscriptionParameters,
}

type ItemKey = (u32, u32);

/// Recently expired subscription ids, oldest first. Older ids are forgotten once
/// `capacity` is reached and then report SubscriptionNotFound.
struct ExpiredIds {
    order: VecDeque<u32>,
    members: HashSet<u32>,
    capacity: usize,
}

impl ExpiredIds {
    fn new(capacity: usize) -> Self {
        ExpiredIds {
            order: VecDeque::new(),
            members: HashSet::new(),
            capacity,
        }
    }

    fn insert(&mut self, id: u32) {
        if self.capacity == 0 || !self.members.insert(id) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
    }

    fn contains(&self, id: u32) -> bool {
        self.members.contains(&id)
    }
}

/// State reachable from the NodeStore observer hook. Holds no reference back to the store.
struct EngineShared {
    subscriptions: DashMap<u32, Arc<Mutex<Subscription>>>,
    data_watchers: DashMap<(NodeId, AttributeId), Vec<ItemKey>>,
    event_watchers: DashMap<NodeId, Vec<ItemKey>>,
    expired: Mutex<ExpiredIds>,
    timers: DashMap<u32, JoinHandle<()>>,
}

fn lock(subscription: &Mutex<Subscription>) -> MutexGuard<'_, Subscription> {
    subscription.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EngineShared {
    fn subscription(&self, id: u32) -> Option<Arc<Mutex<Subscription>>> {
        self.subscriptions.get(&id).map(|s| Arc::clone(s.value()))
    }

    fn was_expired(&self, id: u32) -> bool {
        self.expired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    fn watch(&self, subscription_id: u32, item: &MonitoredItem) {
        let key = (subscription_id, item.id);
        let node_id = item.item_to_monitor.node_id.clone();
        if item.is_event_item() {
            self.event_watchers.entry(node_id).or_default().push(key);
        } else {
            self.data_watchers
                .entry((node_id, item.item_to_monitor.attribute_id))
                .or_default()
                .push(key);
        }
    }

    fn unwatch(&self, subscription_id: u32, item: &MonitoredItem) {
        let key = (subscription_id, item.id);
        let node_id = &item.item_to_monitor.node_id;
        if item.is_event_item() {
            if let Some(mut list) = self.event_watchers.get_mut(node_id) {
                list.retain(|k| *k != key);
            }
            self.event_watchers.remove_if(node_id, |_, list| list.is_empty());
        } else {
            let watch_key = (node_id.clone(), item.item_to_monitor.attribute_id);
            if let Some(mut list) = self.data_watchers.get_mut(&watch_key) {
                list.retain(|k| *k != key);
            }
            self.data_watchers.remove_if(&watch_key, |_, list| list.is_empty());
        }
    }

    /// Removes a subscription from every index and closes it. Returns false if it was unknown.
    fn remove(&self, id: u32) -> bool {
        let Some((_, subscription)) = self.subscriptions.remove(&id) else {
            return false;
        };
        if let Some((_, timer)) = self.timers.remove(&id) {
            timer.abort();
        }
        let mut guard = lock(&subscription);
        for item_id in guard.item_ids() {
            if let Some(item) = guard.remove_item(item_id) {
                self.unwatch(id, &item);
            }
        }
        guard.close();
        true
    }

    /// Lifetime exceeded. Called from the subscription's own timer task.
    fn expire(&self, id: u32) {
        let Some((_, subscription)) = self.subscriptions.remove(&id) else {
            return;
        };
        self.timers.remove(&id);
        self.expired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
        let guard = lock(&subscription);
        info!(
            "Subscription {} of session {:?} expired after {} publishing intervals without a Publish",
            id, guard.session_id, guard.parameters.max_lifetime_count
        );
        drop(guard);
        self.data_watchers.retain(|_, list| {
            list.retain(|(sub, _)| *sub != id);
            !list.is_empty()
        });
        self.event_watchers.retain(|_, list| {
            list.retain(|(sub, _)| *sub != id);
            !list.is_empty()
        });
    }
}

impl AttributeObserver for EngineShared {
    fn attribute_changed(&self, node_id: &NodeId, attribute: AttributeId, value: &DataValue) {
        let watchers = match self.data_watchers.get(&(node_id.clone(), attribute)) {
            Some(list) => list.value().clone(),
            None => return,
        };
        for (subscription_id, item_id) in watchers {
            if let Some(subscription) = self.subscription(subscription_id) {
                lock(&subscription).enqueue_data_change(item_id, value);
            }
        }
    }

    fn references_node(&self, node_id: &NodeId) -> bool {
        let subscriptions: Vec<_> = self
            .subscriptions
            .iter()
            .map(|s| Arc::clone(s.value()))
            .collect();
        subscriptions
            .iter()
            .any(|s| lock(s).references_node(node_id))
    }
}

/// Owns all subscriptions of the server. Each subscription runs its own publishing
/// timer task, aborted when the subscription is deleted.
#[derive(Clone)]
pub struct SubscriptionEngine {
    store: Arc<NodeStore>,
    shared: Arc<EngineShared>,
    config: Arc<EngineConfig>,
    next_subscription_id: Arc<AtomicU32>,
    next_item_id: Arc<AtomicU32>,
}

impl SubscriptionEngine {
    /// Creates the engine and registers it for change notifications on `store`.
    pub fn new(store: Arc<NodeStore>, config: EngineConfig) -> Self {
        let shared = Arc::new(EngineShared {
            subscriptions: DashMap::new(),
            data_watchers: DashMap::new(),
            event_watchers: DashMap::new(),
            expired: Mutex::new(ExpiredIds::new(config.limits.expired_subscription_history)),
            timers: DashMap::new(),
        });
        store.register_observer(Arc::clone(&shared) as Arc<dyn AttributeObserver>);
        SubscriptionEngine {
            store,
            shared,
            config: Arc::new(config),
            next_subscription_id: Arc::new(AtomicU32::new(1)),
            next_item_id: Arc::new(AtomicU32::new(1)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn revise(&self, request: &CreateSubscriptionRequest) -> SubscriptionParameters {
        let limits = &self.config.limits;
        let min = limits.min_publishing_interval_ms as f64;
        let max = limits.max_publishing_interval_ms as f64;
        let interval_ms = if request.publishing_interval_ms.is_finite() {
            request.publishing_interval_ms.clamp(min, max)
        } else {
            min
        };
        let keep_alive = match request.max_keep_alive_count {
            0 => limits.default_keep_alive_count,
            n => n,
        }
        .clamp(1, limits.max_keep_alive_count.max(1));
        let lifetime = request
            .max_lifetime_count
            .min(limits.max_lifetime_count)
            .max(keep_alive.saturating_mul(3));
        let max_notifications = match (limits.max_notifications_per_publish, request.max_notifications_per_publish) {
            (0, requested) => requested,
            (limit, 0) => limit,
            (limit, requested) => requested.min(limit),
        };
        SubscriptionParameters {
            publishing_interval: Duration::from_secs_f64(interval_ms / 1000.0),
            max_lifetime_count: lifetime,
            max_keep_alive_count: keep_alive,
            max_notifications_per_publish: max_notifications,
        }
    }

    /// Creates a subscription and starts its publishing timer. Must run inside a Tokio runtime.
    pub fn create_subscription(
        &self,
        session_id: SessionId,
        request: CreateSubscriptionRequest,
    ) -> SubscriptionCreated {
        let parameters = self.revise(&request);
        let id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);
        let subscription = Subscription::new(
            id,
            session_id,
            parameters,
            self.config.ordering,
            self.config.limits.retransmission_queue_size,
            self.config.limits.max_pending_publish_requests,
        );
        self.shared
            .subscriptions
            .insert(id, Arc::new(Mutex::new(subscription)));
        let timer = spawn_publishing_timer(Arc::clone(&self.shared), id, parameters.publishing_interval);
        self.shared.timers.insert(id, timer);
        info!(
            "Created subscription {} for session {:?} (interval {:?}, keep-alive {}, lifetime {})",
            id,
            session_id,
            parameters.publishing_interval,
            parameters.max_keep_alive_count,
            parameters.max_lifetime_count
        );
        SubscriptionCreated {
            subscription_id: id,
            parameters,
        }
    }

    fn missing(&self, subscription_id: u32) -> ServiceError {
        if self.shared.was_expired(subscription_id) {
            ServiceError::SessionExpired(subscription_id)
        } else {
            ServiceError::SubscriptionNotFound(subscription_id)
        }
    }

    /// Looks up a subscription owned by `session_id`. Other sessions' ids are reported as unknown.
    fn owned(&self, session_id: SessionId, subscription_id: u32) -> ServiceResult<Arc<Mutex<Subscription>>> {
        let subscription = self
            .shared
            .subscription(subscription_id)
            .ok_or_else(|| self.missing(subscription_id))?;
        let owner = lock(&subscription).session_id;
        if owner != session_id {
            return Err(ServiceError::SubscriptionNotFound(subscription_id));
        }
        Ok(subscription)
    }

    pub fn create_monitored_items(
        &self,
        session_id: SessionId,
        subscription_id: u32,
        requests: Vec<MonitoredItemRequest>,
    ) -> ServiceResult<Vec<ServiceResult<MonitoredItemCreated>>> {
        let subscription = self.owned(session_id, subscription_id)?;
        Ok(requests
            .into_iter()
            .map(|request| self.create_monitored_item(subscription_id, &subscription, request))
            .collect())
    }

    fn create_monitored_item(
        &self,
        subscription_id: u32,
        subscription: &Mutex<Subscription>,
        mut request: MonitoredItemRequest,
    ) -> ServiceResult<MonitoredItemCreated> {
        let node_id = request.item_to_monitor.node_id.clone();
        let attribute = request.item_to_monitor.attribute_id;
        let node = self
            .store
            .get_node(&node_id)
            .ok_or_else(|| ServiceError::NodeNotFound(node_id.clone()))?;

        let limits = &self.config.limits;
        let is_event = attribute == AttributeId::EventNotifier;
        let initial_value = if is_event {
            let notifier = match node.attributes {
                NodeAttributes::Object { event_notifier }
                | NodeAttributes::View { event_notifier, .. } => event_notifier,
                _ => 0,
            };
            if notifier & SUBSCRIBE_TO_EVENTS == 0 {
                return Err(ServiceError::InvalidArgument(format!(
                    "{} is not an event notifier",
                    node_id
                )));
            }
            request.filter.get_or_insert_with(EventFilter::default);
            None
        } else {
            if request.filter.is_some() {
                return Err(ServiceError::FilterUnsupported(
                    "event filters require the EventNotifier attribute".to_string(),
                ));
            }
            Some(self.store.get_attribute(&node_id, attribute)?)
        };

        let mut guard = lock(subscription);
        let publishing_ms = guard.parameters.publishing_interval.as_secs_f64() * 1000.0;
        let sampling_interval = if is_event {
            0.0
        } else if request.sampling_interval < 0.0 || !request.sampling_interval.is_finite() {
            publishing_ms
        } else {
            request.sampling_interval.max(limits.min_sampling_interval_ms)
        };
        let queue_size = match request.queue_size {
            0 => limits.default_queue_size,
            n => n,
        }
        .clamp(1, limits.max_queue_size.max(1));

        let id = self.next_item_id.fetch_add(1, Ordering::Relaxed);
        let report_initial = self.config.report_initial_value;
        let item = MonitoredItem::new(
            id,
            request,
            sampling_interval,
            queue_size as usize,
            if report_initial { None } else { initial_value.clone() },
        );
        self.shared.watch(subscription_id, &item);
        guard.add_item(item);
        if let (true, Some(value)) = (report_initial, initial_value.as_ref()) {
            guard.enqueue_data_change(id, value);
        }
        drop(guard);

        debug!(
            "Created monitored item {} on {} ({:?}) in subscription {}",
            id, node_id, attribute, subscription_id
        );
        Ok(MonitoredItemCreated {
            monitored_item_id: id,
            revised_sampling_interval: sampling_interval,
            revised_queue_size: queue_size,
        })
    }

    /// Removes the items together with any notifications they still had queued.
    pub fn delete_monitored_items(
        &self,
        session_id: SessionId,
        subscription_id: u32,
        item_ids: &[u32],
    ) -> ServiceResult<Vec<StatusCode>> {
        let subscription = self.owned(session_id, subscription_id)?;
        let mut guard = lock(&subscription);
        Ok(item_ids
            .iter()
            .map(|item_id| match guard.remove_item(*item_id) {
                Some(item) => {
                    self.shared.unwatch(subscription_id, &item);
                    debug!("Deleted monitored item {} from subscription {}", item_id, subscription_id);
                    StatusCode::GOOD
                }
                None => ServiceError::MonitoredItemNotFound(*item_id).status_code(),
            })
            .collect())
    }

    /// Returns queued notifications right away, otherwise waits for the next publishing
    /// cycle that has data or a keep-alive due. No lock is held while waiting.
    pub async fn publish(
        &self,
        session_id: SessionId,
        subscription_id: u32,
        acknowledgements: &[u32],
    ) -> ServiceResult<PublishResponse> {
        let attempt = {
            let subscription = self.owned(session_id, subscription_id)?;
            let mut guard = lock(&subscription);
            guard.publish(acknowledgements)
        };
        match attempt {
            PublishAttempt::Ready(response) => Ok(response),
            PublishAttempt::Wait(receiver) => receiver.await.map_err(|_| self.missing(subscription_id)),
        }
    }

    /// Publishes on whichever subscription of the session has notifications queued,
    /// falling back to the lowest id.
    pub async fn publish_any(
        &self,
        session_id: SessionId,
        acknowledgements: &[u32],
    ) -> ServiceResult<PublishResponse> {
        let mut owned: Vec<(u32, bool)> = self
            .shared
            .subscriptions
            .iter()
            .map(|s| (*s.key(), Arc::clone(s.value())))
            .collect::<Vec<_>>()
            .into_iter()
            .filter_map(|(id, s)| {
                let guard = lock(&s);
                (guard.session_id == session_id).then(|| (id, guard.has_pending()))
            })
            .collect();
        owned.sort_by_key(|(id, pending)| (!*pending, *id));
        let (subscription_id, _) = owned.first().copied().ok_or(ServiceError::NoSubscription)?;
        self.publish(session_id, subscription_id, acknowledgements).await
    }

    pub fn republish(
        &self,
        session_id: SessionId,
        subscription_id: u32,
        sequence_number: u32,
    ) -> ServiceResult<NotificationMessage> {
        let subscription = self.owned(session_id, subscription_id)?;
        let message = lock(&subscription).republish(sequence_number);
        message.ok_or(ServiceError::MessageNotAvailable(sequence_number))
    }

    pub fn delete_subscription(&self, session_id: SessionId, subscription_id: u32) -> ServiceResult<()> {
        self.owned(session_id, subscription_id)?;
        if self.shared.remove(subscription_id) {
            info!("Deleted subscription {}", subscription_id);
        }
        Ok(())
    }

    pub fn delete_subscriptions(&self, session_id: SessionId, subscription_ids: &[u32]) -> Vec<StatusCode> {
        subscription_ids
            .iter()
            .map(|id| match self.delete_subscription(session_id, *id) {
                Ok(()) => StatusCode::GOOD,
                Err(e) => e.status_code(),
            })
            .collect()
    }

    /// Deletes every subscription owned by the session. Returns how many were removed.
    pub fn delete_session_subscriptions(&self, session_id: SessionId) -> usize {
        let ids: Vec<u32> = self
            .shared
            .subscriptions
            .iter()
            .filter(|s| lock(s.value()).session_id == session_id)
            .map(|s| *s.key())
            .collect();
        ids.into_iter().filter(|id| self.shared.remove(*id)).count()
    }

    /// Fans an event out to event items on the Server object and on the event's source.
    /// Returns the number of items that queued it.
    pub fn notify_event(&self, event: &Event) -> usize {
        let mut watchers = Vec::new();
        let server = ids::server();
        for notifier in [&server, &event.source_node] {
            if let Some(list) = self.shared.event_watchers.get(notifier) {
                for key in list.value() {
                    if !watchers.contains(key) {
                        watchers.push(*key);
                    }
                }
            }
        }

        let mut delivered = 0;
        for (subscription_id, item_id) in watchers {
            let Some(subscription) = self.shared.subscription(subscription_id) else {
                continue;
            };
            let is_subtype = |sub: &NodeId, sup: &NodeId| self.store.is_subtype_of(sub, sup);
            let mut guard = lock(&subscription);
            let fields = match guard.item(item_id).and_then(|i| i.filter.as_ref()) {
                Some(filter) if filter.matches(event, is_subtype) => filter.select_fields(event),
                _ => continue,
            };
            if guard.enqueue_event(item_id, event.source_node.clone(), fields) {
                delivered += 1;
            }
        }
        debug!(
            "Event '{}' (severity {}) delivered to {} monitored items",
            event.message, event.severity, delivered
        );
        delivered
    }

    pub fn subscription_count(&self) -> usize {
        self.shared.subscriptions.len()
    }

    pub fn state(&self, subscription_id: u32) -> Option<SubscriptionState> {
        if let Some(subscription) = self.shared.subscription(subscription_id) {
            let state = lock(&subscription).state();
            return Some(state);
        }
        self.shared
            .was_expired(subscription_id)
            .then_some(SubscriptionState::Closed)
    }

    /// Queue length of one monitored item, if it exists.
    pub fn queued_notifications(&self, subscription_id: u32, item_id: u32) -> Option<usize> {
        let subscription = self.shared.subscription(subscription_id)?;
        let guard = lock(&subscription);
        let len = guard.item(item_id).map(|i| i.queue_len());
        len
    }

    /// Stops all timers and closes every subscription.
    pub fn shutdown(&self) {
        let ids: Vec<u32> = self.shared.subscriptions.iter().map(|s| *s.key()).collect();
        let count = ids.into_iter().filter(|id| self.shared.remove(*id)).count();
        if count > 0 {
            warn!("Closed {} subscriptions at shutdown", count);
        }
    }
}

fn spawn_publishing_timer(shared: Arc<EngineShared>, id: u32, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(subscription) = shared.subscription(id) else {
                break;
            };
            let outcome = lock(&subscription).on_publishing_timer();
            if outcome == TimerOutcome::Closed {
                shared.expire(id);
                break;
            }
        }
    })
}
