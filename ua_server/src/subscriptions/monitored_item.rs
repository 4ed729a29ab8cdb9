use crate::address_space::node::{AttributeId, ReadValueId};
use crate::address_space::node_id::NodeId;
use crate::address_space::variant::{DataValue, Variant};
use crate::events::filter::EventFilter;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Client request for one monitored item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredItemRequest {
    pub item_to_monitor: ReadValueId,
    pub client_handle: u32,
    /// Milliseconds. Negative means "use the publishing interval".
    pub sampling_interval: f64,
    /// 0 selects the server default.
    pub queue_size: u32,
    pub discard_oldest: bool,
    /// Required shape for items on the EventNotifier attribute; rejected elsewhere.
    pub filter: Option<EventFilter>,
}

impl MonitoredItemRequest {
    pub fn data_change(item_to_monitor: ReadValueId, client_handle: u32) -> Self {
        MonitoredItemRequest {
            item_to_monitor,
            client_handle,
            sampling_interval: -1.0,
            queue_size: 0,
            discard_oldest: true,
            filter: None,
        }
    }

    pub fn events(notifier: NodeId, client_handle: u32, filter: EventFilter) -> Self {
        MonitoredItemRequest {
            item_to_monitor: ReadValueId {
                node_id: notifier,
                attribute_id: AttributeId::EventNotifier,
            },
            client_handle,
            sampling_interval: 0.0,
            queue_size: 0,
            discard_oldest: true,
            filter: Some(filter),
        }
    }

    pub fn with_queue_size(mut self, queue_size: u32) -> Self {
        self.queue_size = queue_size;
        self
    }
}

/// Revised parameters returned for a created item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoredItemCreated {
    pub monitored_item_id: u32,
    pub revised_sampling_interval: f64,
    pub revised_queue_size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataChangeNotification {
    pub client_handle: u32,
    pub value: DataValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventFieldList {
    pub client_handle: u32,
    pub fields: Vec<Variant>,
}

/// One entry of a NotificationMessage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum NotificationData {
    DataChange(DataChangeNotification),
    Event(EventFieldList),
}

/// Queued notification tagged with its arrival order inside the subscription and the
/// node it refers to.
#[derive(Debug, Clone)]
pub(crate) struct QueuedNotification {
    pub arrival: u64,
    pub node_id: NodeId,
    pub data: NotificationData,
}

/// A single attribute (or event notifier) sampled under a subscription.
#[derive(Debug)]
pub struct MonitoredItem {
    pub id: u32,
    pub client_handle: u32,
    pub item_to_monitor: ReadValueId,
    pub sampling_interval: f64,
    pub queue_size: usize,
    pub discard_oldest: bool,
    pub filter: Option<EventFilter>,
    last_value: Option<DataValue>,
    queue: VecDeque<QueuedNotification>,
    discarded: u64,
}

impl MonitoredItem {
    pub(crate) fn new(
        id: u32,
        request: MonitoredItemRequest,
        sampling_interval: f64,
        queue_size: usize,
        initial_value: Option<DataValue>,
    ) -> Self {
        MonitoredItem {
            id,
            client_handle: request.client_handle,
            item_to_monitor: request.item_to_monitor,
            sampling_interval,
            queue_size: queue_size.max(1),
            discard_oldest: request.discard_oldest,
            filter: request.filter,
            last_value: initial_value,
            queue: VecDeque::new(),
            discarded: 0,
        }
    }

    pub fn is_event_item(&self) -> bool {
        self.filter.is_some()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Notifications lost to queue overflow so far.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    pub fn last_value(&self) -> Option<&DataValue> {
        self.last_value.as_ref()
    }

    /// Records a sampled value. Equal consecutive samples are ignored.
    pub(crate) fn sample(&mut self, arrival: u64, value: &DataValue) -> bool {
        let unchanged = self
            .last_value
            .as_ref()
            .is_some_and(|last| last.value == value.value && last.status == value.status);
        if unchanged {
            return false;
        }
        self.last_value = Some(value.clone());
        let data = NotificationData::DataChange(DataChangeNotification {
            client_handle: self.client_handle,
            value: value.clone(),
        });
        self.push(arrival, self.item_to_monitor.node_id.clone(), data);
        true
    }

    /// Queues an event notification; `source` pins the event's source node until it is sent.
    pub(crate) fn push_event(&mut self, arrival: u64, source: NodeId, fields: Vec<Variant>) {
        let data = NotificationData::Event(EventFieldList {
            client_handle: self.client_handle,
            fields,
        });
        self.push(arrival, source, data);
    }

    /// Bounded FIFO. On overflow either the oldest entry or the newest one is dropped.
    fn push(&mut self, arrival: u64, node_id: NodeId, data: NotificationData) {
        let entry = QueuedNotification {
            arrival,
            node_id,
            data,
        };
        if self.queue.len() >= self.queue_size {
            self.discarded += 1;
            debug!(
                "Monitored item {} queue full ({}), discarding {}",
                self.id,
                self.queue_size,
                if self.discard_oldest { "oldest" } else { "newest" }
            );
            if self.discard_oldest {
                self.queue.pop_front();
            } else {
                self.queue.pop_back();
            }
        }
        self.queue.push_back(entry);
    }

    pub(crate) fn front_arrival(&self) -> Option<u64> {
        self.queue.front().map(|q| q.arrival)
    }

    pub(crate) fn pop(&mut self) -> Option<NotificationData> {
        self.queue.pop_front().map(|q| q.data)
    }

    pub(crate) fn references_node(&self, node_id: &NodeId) -> bool {
        self.queue.iter().any(|q| q.node_id == *node_id)
    }
}
