use crate::address_space::node::{AttributeId, NodeClass, SUBSCRIBE_TO_EVENTS};
use crate::address_space::node_id::NodeId;
use crate::address_space::references::ids;
use crate::address_space::store::NodeStore;
use crate::address_space::variant::{DataValue, Variant};
use crate::error::{ServiceError, ServiceResult};
use crate::events::event::Event;
use crate::subscriptions::engine::SubscriptionEngine;
use std::sync::Arc;
use tracing::{debug, info};

/// Routes events to the subscriptions whose filters accept them. Nothing is retained:
/// an event no live item matches is dropped.
#[derive(Clone)]
pub struct EventEngine {
    store: Arc<NodeStore>,
    subscriptions: SubscriptionEngine,
}

impl EventEngine {
    pub fn new(store: Arc<NodeStore>, subscriptions: SubscriptionEngine) -> Self {
        EventEngine {
            store,
            subscriptions,
        }
    }

    /// Returns how many monitored items queued the event.
    pub fn trigger(&self, event: Event) -> usize {
        let delivered = self.subscriptions.notify_event(&event);
        if delivered == 0 {
            debug!("Event '{}' from {} matched no subscription", event.message, event.source_node);
        }
        delivered
    }

    /// Generator for events of `event_type` raised by `source`. The type must derive from
    /// BaseEventType and `source` must be an Object, whose EventNotifier bit is switched on.
    pub fn generator(&self, event_type: &NodeId, source: &NodeId) -> ServiceResult<EventGenerator> {
        if !self.store.contains(event_type) {
            return Err(ServiceError::NodeNotFound(event_type.clone()));
        }
        if !self.store.is_subtype_of(event_type, &ids::base_event_type()) {
            return Err(ServiceError::InvalidArgument(format!(
                "{} is not an event type",
                event_type
            )));
        }
        let source_node = self
            .store
            .get_node(source)
            .ok_or_else(|| ServiceError::NodeNotFound(source.clone()))?;
        if source_node.node_class() != NodeClass::Object {
            return Err(ServiceError::InvalidArgument(format!(
                "event source {} is not an Object",
                source
            )));
        }
        self.store.set_attribute_unchecked(
            source,
            AttributeId::EventNotifier,
            DataValue::new_now(Variant::Byte(SUBSCRIBE_TO_EVENTS)),
        )?;
        info!("Event generator for {} on {}", event_type, source);
        Ok(EventGenerator {
            engine: self.clone(),
            event_type: event_type.clone(),
            source_node: source.clone(),
            source_name: source_node.browse_name.name,
            severity: 1,
        })
    }
}

/// Template for repeatedly raising the same kind of event.
#[derive(Clone)]
pub struct EventGenerator {
    engine: EventEngine,
    pub event_type: NodeId,
    pub source_node: NodeId,
    pub source_name: String,
    pub severity: u16,
}

impl EventGenerator {
    pub fn with_severity(mut self, severity: u16) -> Self {
        self.severity = severity.clamp(1, 1000);
        self
    }

    pub fn set_severity(&mut self, severity: u16) {
        self.severity = severity.clamp(1, 1000);
    }

    /// A fresh event from the template with a new EventId and current timestamps.
    pub fn event(&self, message: impl Into<String>) -> Event {
        Event::new(
            self.event_type.clone(),
            self.source_node.clone(),
            self.source_name.clone(),
            message,
            self.severity,
        )
    }

    pub fn trigger(&self, message: impl Into<String>) -> usize {
        self.engine.trigger(self.event(message))
    }
}
