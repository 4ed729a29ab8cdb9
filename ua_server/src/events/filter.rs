use crate::address_space::node_id::NodeId;
use crate::address_space::variant::Variant;
use crate::events::event::{Event, EventField};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    /// Both operands are type NodeIds; passes when the left one is the right one or
    /// derives from it through HasSubtype.
    OfType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterOperand {
    Field(EventField),
    Literal(Variant),
}

impl FilterOperand {
    fn resolve(&self, event: &Event) -> Variant {
        match self {
            FilterOperand::Field(field) => event.field(*field),
            FilterOperand::Literal(value) => value.clone(),
        }
    }
}

/// One binary comparison of the where-clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentFilterElement {
    pub operator: FilterOperator,
    pub left: FilterOperand,
    pub right: FilterOperand,
}

impl ContentFilterElement {
    fn evaluate(&self, event: &Event, is_subtype: &dyn Fn(&NodeId, &NodeId) -> bool) -> bool {
        let left = self.left.resolve(event);
        let right = self.right.resolve(event);
        if self.operator == FilterOperator::OfType {
            return match (&left, &right) {
                (Variant::NodeId(sub_type), Variant::NodeId(super_type)) => {
                    is_subtype(&**sub_type, &**super_type)
                }
                _ => false,
            };
        }
        let ordering = compare(&left, &right);
        match self.operator {
            FilterOperator::Equals => ordering == Some(Ordering::Equal),
            FilterOperator::NotEquals => ordering != Some(Ordering::Equal),
            FilterOperator::GreaterThan => ordering == Some(Ordering::Greater),
            FilterOperator::GreaterThanOrEqual => {
                matches!(ordering, Some(Ordering::Greater | Ordering::Equal))
            }
            FilterOperator::LessThan => ordering == Some(Ordering::Less),
            FilterOperator::LessThanOrEqual => {
                matches!(ordering, Some(Ordering::Less | Ordering::Equal))
            }
            FilterOperator::OfType => false,
        }
    }
}

/// Numbers compare numerically across types, strings and times by value,
/// anything else only for equality.
fn compare(left: &Variant, right: &Variant) -> Option<Ordering> {
    if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
        return l.partial_cmp(&r);
    }
    match (left, right) {
        (Variant::String(l), Variant::String(r)) => Some(l.cmp(r)),
        (Variant::DateTime(l), Variant::DateTime(r)) => Some(l.cmp(r)),
        _ if left == right => Some(Ordering::Equal),
        _ => None,
    }
}

/// Event filter of an event monitored item. The where-clause elements are AND-ed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventFilter {
    pub select_clauses: Vec<EventField>,
    pub where_clause: Vec<ContentFilterElement>,
}

impl EventFilter {
    /// Passes events whose Severity is at least `threshold`.
    pub fn severity_at_least(threshold: u16) -> Self {
        EventFilter {
            select_clauses: Vec::new(),
            where_clause: vec![ContentFilterElement {
                operator: FilterOperator::GreaterThanOrEqual,
                left: FilterOperand::Field(EventField::Severity),
                right: FilterOperand::Literal(Variant::UInt16(threshold)),
            }],
        }
    }

    /// Passes events of `event_type` and of every type derived from it.
    pub fn of_type(event_type: NodeId) -> Self {
        EventFilter {
            select_clauses: Vec::new(),
            where_clause: vec![ContentFilterElement {
                operator: FilterOperator::OfType,
                left: FilterOperand::Field(EventField::EventType),
                right: FilterOperand::Literal(Variant::from(event_type)),
            }],
        }
    }

    pub fn select(mut self, fields: &[EventField]) -> Self {
        self.select_clauses = fields.to_vec();
        self
    }

    /// `is_subtype(sub, super)` answers OfType elements against the type hierarchy.
    pub fn matches(&self, event: &Event, is_subtype: impl Fn(&NodeId, &NodeId) -> bool) -> bool {
        self.where_clause
            .iter()
            .all(|element| element.evaluate(event, &is_subtype))
    }

    /// Values of the selected fields, in select-clause order.
    pub fn select_fields(&self, event: &Event) -> Vec<Variant> {
        let fields: &[EventField] = if self.select_clauses.is_empty() {
            &EventField::DEFAULT_SELECT
        } else {
            &self.select_clauses
        };
        fields.iter().map(|f| event.field(*f)).collect()
    }
}
