use crate::address_space::node_id::NodeId;
use crate::address_space::status::StatusCode;
use crate::address_space::variant::{DataValue, Variant};
use crate::error::ServiceError;
use crate::subscriptions::monitored_item::{MonitoredItem, NotificationData};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

/// Identifies the client session owning a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u32);

/// How notifications of different monitored items are interleaved in one publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationOrdering {
    /// In the order the changes arrived.
    #[default]
    Arrival,
    /// Item by item, in the order the items were created.
    Item,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubscriptionState {
    Creating,
    Normal,
    /// Notifications or a keep-alive are due but no Publish request is waiting.
    Late,
    KeepAlive,
    Closed,
}

/// Revised subscription parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SubscriptionParameters {
    pub publishing_interval: Duration,
    pub max_lifetime_count: u32,
    pub max_keep_alive_count: u32,
    /// 0 means unlimited.
    pub max_notifications_per_publish: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationMessage {
    pub sequence_number: u32,
    pub publish_time: DateTime<Utc>,
    pub notifications: Vec<NotificationData>,
}

impl NotificationMessage {
    pub fn is_keep_alive(&self) -> bool {
        self.notifications.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishResponse {
    pub subscription_id: u32,
    pub notification_message: NotificationMessage,
    pub available_sequence_numbers: Vec<u32>,
    pub more_notifications: bool,
    /// One status per acknowledged sequence number.
    pub results: Vec<StatusCode>,
}

pub(crate) enum PublishAttempt {
    Ready(PublishResponse),
    Wait(oneshot::Receiver<PublishResponse>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerOutcome {
    Continue,
    Closed,
}

struct PendingPublish {
    sender: oneshot::Sender<PublishResponse>,
    ack_results: Vec<StatusCode>,
}

/// Per-subscription state machine. Driven by the publishing timer and by Publish requests;
/// owned by the engine behind a mutex that is never held across an await.
pub struct Subscription {
    pub id: u32,
    pub session_id: SessionId,
    pub parameters: SubscriptionParameters,
    state: SubscriptionState,
    ordering: NotificationOrdering,
    items: BTreeMap<u32, MonitoredItem>,
    keep_alive_counter: u32,
    lifetime_counter: u32,
    next_sequence_number: u32,
    arrival_counter: u64,
    retransmission: VecDeque<NotificationMessage>,
    retransmission_limit: usize,
    waiting: VecDeque<PendingPublish>,
    max_waiting: usize,
}

impl Subscription {
    pub fn new(
        id: u32,
        session_id: SessionId,
        parameters: SubscriptionParameters,
        ordering: NotificationOrdering,
        retransmission_limit: usize,
        max_waiting: usize,
    ) -> Self {
        Subscription {
            id,
            session_id,
            parameters,
            state: SubscriptionState::Creating,
            ordering,
            items: BTreeMap::new(),
            keep_alive_counter: parameters.max_keep_alive_count,
            lifetime_counter: 0,
            next_sequence_number: 1,
            arrival_counter: 0,
            retransmission: VecDeque::new(),
            retransmission_limit: retransmission_limit.max(1),
            waiting: VecDeque::new(),
            max_waiting: max_waiting.max(1),
        }
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    pub fn item(&self, id: u32) -> Option<&MonitoredItem> {
        self.items.get(&id)
    }

    pub fn item_ids(&self) -> Vec<u32> {
        self.items.keys().copied().collect()
    }

    pub(crate) fn add_item(&mut self, item: MonitoredItem) {
        self.items.insert(item.id, item);
    }

    pub(crate) fn remove_item(&mut self, id: u32) -> Option<MonitoredItem> {
        self.items.remove(&id)
    }

    pub fn has_pending(&self) -> bool {
        self.items.values().any(|i| i.queue_len() > 0)
    }

    pub fn pending_count(&self) -> usize {
        self.items.values().map(|i| i.queue_len()).sum()
    }

    pub(crate) fn references_node(&self, node_id: &NodeId) -> bool {
        self.items.values().any(|i| i.references_node(node_id))
    }

    fn next_arrival(&mut self) -> u64 {
        self.arrival_counter += 1;
        self.arrival_counter
    }

    /// Queues a data change for an item. Returns false if the item is gone or the value is a repeat.
    pub(crate) fn enqueue_data_change(&mut self, item_id: u32, value: &DataValue) -> bool {
        if self.state == SubscriptionState::Closed {
            return false;
        }
        let arrival = self.next_arrival();
        match self.items.get_mut(&item_id) {
            Some(item) => item.sample(arrival, value),
            None => false,
        }
    }

    pub(crate) fn enqueue_event(&mut self, item_id: u32, source: NodeId, fields: Vec<Variant>) -> bool {
        if self.state == SubscriptionState::Closed {
            return false;
        }
        let arrival = self.next_arrival();
        match self.items.get_mut(&item_id) {
            Some(item) => {
                item.push_event(arrival, source, fields);
                true
            }
            None => false,
        }
    }

    /// Drains up to `max_notifications_per_publish` notifications in the configured order.
    fn take_notifications(&mut self) -> Vec<NotificationData> {
        let limit = match self.parameters.max_notifications_per_publish {
            0 => usize::MAX,
            n => n as usize,
        };
        let mut out = Vec::new();
        match self.ordering {
            NotificationOrdering::Item => {
                for item in self.items.values_mut() {
                    while out.len() < limit {
                        match item.pop() {
                            Some(data) => out.push(data),
                            None => break,
                        }
                    }
                }
            }
            NotificationOrdering::Arrival => {
                while out.len() < limit {
                    let next = self
                        .items
                        .values_mut()
                        .filter_map(|item| item.front_arrival().map(|a| (a, item)))
                        .min_by_key(|(arrival, _)| *arrival);
                    match next.and_then(|(_, item)| item.pop()) {
                        Some(data) => out.push(data),
                        None => break,
                    }
                }
            }
        }
        out
    }

    fn data_message(&mut self) -> NotificationMessage {
        let message = NotificationMessage {
            sequence_number: self.next_sequence_number,
            publish_time: Utc::now(),
            notifications: self.take_notifications(),
        };
        self.next_sequence_number = self.next_sequence_number.wrapping_add(1).max(1);
        if self.retransmission.len() >= self.retransmission_limit {
            self.retransmission.pop_front();
        }
        self.retransmission.push_back(message.clone());
        message
    }

    /// Keep-alives announce the next sequence number without consuming it.
    fn keep_alive_message(&self) -> NotificationMessage {
        NotificationMessage {
            sequence_number: self.next_sequence_number,
            publish_time: Utc::now(),
            notifications: Vec::new(),
        }
    }

    fn response(&self, message: NotificationMessage, results: Vec<StatusCode>) -> PublishResponse {
        PublishResponse {
            subscription_id: self.id,
            notification_message: message,
            available_sequence_numbers: self.available_sequence_numbers(),
            more_notifications: self.has_pending(),
            results,
        }
    }

    pub fn available_sequence_numbers(&self) -> Vec<u32> {
        self.retransmission.iter().map(|m| m.sequence_number).collect()
    }

    pub(crate) fn acknowledge(&mut self, sequence_numbers: &[u32]) -> Vec<StatusCode> {
        sequence_numbers
            .iter()
            .map(|seq| {
                let position = self
                    .retransmission
                    .iter()
                    .position(|m| m.sequence_number == *seq);
                match position {
                    Some(index) => {
                        self.retransmission.remove(index);
                        StatusCode::GOOD
                    }
                    None => ServiceError::SequenceNumberUnknown(*seq).status_code(),
                }
            })
            .collect()
    }

    pub(crate) fn republish(&self, sequence_number: u32) -> Option<NotificationMessage> {
        self.retransmission
            .iter()
            .find(|m| m.sequence_number == sequence_number)
            .cloned()
    }

    /// Handles a client Publish. Pending notifications are returned at once (this is how a
    /// Late subscription catches up); otherwise the request waits for the timer.
    pub(crate) fn publish(&mut self, acknowledgements: &[u32]) -> PublishAttempt {
        let ack_results = self.acknowledge(acknowledgements);
        self.lifetime_counter = 0;
        if self.state == SubscriptionState::Creating {
            self.state = SubscriptionState::Normal;
        }
        if self.has_pending() {
            let message = self.data_message();
            self.keep_alive_counter = self.parameters.max_keep_alive_count;
            self.state = SubscriptionState::Normal;
            return PublishAttempt::Ready(self.response(message, ack_results));
        }

        if self.waiting.len() >= self.max_waiting {
            // Too many parked requests: answer the oldest with a keep-alive.
            if let Some(oldest) = self.waiting.pop_front() {
                let response = self.response(self.keep_alive_message(), oldest.ack_results);
                let _ = oldest.sender.send(response);
            }
        }
        let (sender, receiver) = oneshot::channel();
        self.waiting.push_back(PendingPublish {
            sender,
            ack_results,
        });
        PublishAttempt::Wait(receiver)
    }

    fn next_waiting(&mut self) -> Option<PendingPublish> {
        while let Some(pending) = self.waiting.pop_front() {
            if !pending.sender.is_closed() {
                return Some(pending);
            }
        }
        None
    }

    /// One publishing-interval tick.
    pub(crate) fn on_publishing_timer(&mut self) -> TimerOutcome {
        if self.state == SubscriptionState::Closed {
            return TimerOutcome::Closed;
        }
        if self.state == SubscriptionState::Creating {
            self.state = SubscriptionState::Normal;
        }

        self.waiting.retain(|p| !p.sender.is_closed());
        if self.waiting.is_empty() {
            self.lifetime_counter += 1;
        } else {
            self.lifetime_counter = 0;
        }

        if self.has_pending() {
            match self.next_waiting() {
                Some(pending) => {
                    let message = self.data_message();
                    let response = self.response(message, pending.ack_results);
                    let _ = pending.sender.send(response);
                    self.keep_alive_counter = self.parameters.max_keep_alive_count;
                    self.state = SubscriptionState::Normal;
                }
                None => self.state = SubscriptionState::Late,
            }
        } else {
            self.keep_alive_counter = self.keep_alive_counter.saturating_sub(1);
            if self.keep_alive_counter == 0 {
                match self.next_waiting() {
                    Some(pending) => {
                        let response = self.response(self.keep_alive_message(), pending.ack_results);
                        let _ = pending.sender.send(response);
                        self.keep_alive_counter = self.parameters.max_keep_alive_count;
                        self.state = SubscriptionState::KeepAlive;
                    }
                    None => self.state = SubscriptionState::Late,
                }
            }
        }

        if self.lifetime_counter > self.parameters.max_lifetime_count {
            debug!(
                "Subscription {} missed {} publishing intervals without a Publish request",
                self.id, self.lifetime_counter
            );
            self.close();
            return TimerOutcome::Closed;
        }
        TimerOutcome::Continue
    }

    /// Releases all items and drops parked Publish requests.
    pub(crate) fn close(&mut self) {
        self.state = SubscriptionState::Closed;
        self.items.clear();
        self.waiting.clear();
    }
}
