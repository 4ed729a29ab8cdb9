use crate::address_space::node_id::NodeId;
use crate::address_space::references::ids;
use crate::address_space::variant::Variant;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fields of BaseEventType that filters can select or compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventField {
    EventId,
    EventType,
    SourceNode,
    SourceName,
    Time,
    ReceiveTime,
    Message,
    Severity,
}

impl EventField {
    /// Fields returned when a filter selects nothing explicitly.
    pub const DEFAULT_SELECT: [EventField; 6] = [
        EventField::EventId,
        EventField::EventType,
        EventField::SourceNode,
        EventField::Time,
        EventField::Message,
        EventField::Severity,
    ];
}

/// Ephemeral event. Never stored in the address space; routed and dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_id: Vec<u8>,
    pub event_type: NodeId,
    pub source_node: NodeId,
    pub source_name: String,
    pub time: DateTime<Utc>,
    pub receive_time: DateTime<Utc>,
    pub message: String,
    /// 1 (lowest) to 1000 (highest).
    pub severity: u16,
}

impl Event {
    pub fn new(
        event_type: NodeId,
        source_node: NodeId,
        source_name: impl Into<String>,
        message: impl Into<String>,
        severity: u16,
    ) -> Self {
        let now = Utc::now();
        Event {
            event_id: Uuid::new_v4().as_bytes().to_vec(),
            event_type,
            source_node,
            source_name: source_name.into(),
            time: now,
            receive_time: now,
            message: message.into(),
            severity: severity.clamp(1, 1000),
        }
    }

    /// BaseEventType raised by the Server object.
    pub fn base(message: impl Into<String>, severity: u16) -> Self {
        Self::new(ids::base_event_type(), ids::server(), "Server", message, severity)
    }

    pub fn field(&self, field: EventField) -> Variant {
        match field {
            EventField::EventId => Variant::ByteString(self.event_id.clone()),
            EventField::EventType => self.event_type.clone().into(),
            EventField::SourceNode => self.source_node.clone().into(),
            EventField::SourceName => self.source_name.clone().into(),
            EventField::Time => Variant::DateTime(self.time),
            EventField::ReceiveTime => Variant::DateTime(self.receive_time),
            EventField::Message => self.message.clone().into(),
            EventField::Severity => Variant::UInt16(self.severity),
        }
    }
}
