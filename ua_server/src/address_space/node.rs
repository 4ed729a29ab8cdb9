use crate::address_space::node_id::{NodeId, QualifiedName};
use crate::address_space::variant::{DataType, DataValue, ValueRank, Variant};
use crate::error::{ServiceError, ServiceResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Node class, fixed when the node is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeClass {
    Object,
    Variable,
    Method,
    ObjectType,
    VariableType,
    ReferenceType,
    DataType,
    View,
}

/// Attribute identifiers, numbered as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttributeId {
    NodeId = 1,
    NodeClass = 2,
    BrowseName = 3,
    DisplayName = 4,
    Description = 5,
    IsAbstract = 8,
    Symmetric = 9,
    InverseName = 10,
    ContainsNoLoops = 11,
    EventNotifier = 12,
    Value = 13,
    DataType = 14,
    ValueRank = 15,
    AccessLevel = 17,
    UserAccessLevel = 18,
    MinimumSamplingInterval = 19,
    Historizing = 20,
    Executable = 21,
    UserExecutable = 22,
}

impl AttributeId {
    pub fn from_u32(value: u32) -> Option<AttributeId> {
        use AttributeId::*;
        let id = match value {
            1 => NodeId,
            2 => NodeClass,
            3 => BrowseName,
            4 => DisplayName,
            5 => Description,
            8 => IsAbstract,
            9 => Symmetric,
            10 => InverseName,
            11 => ContainsNoLoops,
            12 => EventNotifier,
            13 => Value,
            14 => DataType,
            15 => ValueRank,
            17 => AccessLevel,
            18 => UserAccessLevel,
            19 => MinimumSamplingInterval,
            20 => Historizing,
            21 => Executable,
            22 => UserExecutable,
            _ => return None,
        };
        Some(id)
    }
}

/// AccessLevel bit mask of a Variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessLevel(pub u8);

impl AccessLevel {
    pub const NONE: AccessLevel = AccessLevel(0);
    pub const CURRENT_READ: AccessLevel = AccessLevel(0x01);
    pub const CURRENT_WRITE: AccessLevel = AccessLevel(0x02);
    pub const READ_WRITE: AccessLevel = AccessLevel(0x03);

    pub fn contains(&self, other: AccessLevel) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn with(self, other: AccessLevel) -> AccessLevel {
        AccessLevel(self.0 | other.0)
    }
}

/// EventNotifier bit that marks a node as an event source clients may subscribe to.
pub const SUBSCRIBE_TO_EVENTS: u8 = 0x01;

/// Declared input or output argument of a Method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub name: String,
    pub data_type: DataType,
    pub value_rank: ValueRank,
    pub description: Option<String>,
}

impl Argument {
    pub fn scalar(name: impl Into<String>, data_type: DataType) -> Self {
        Argument {
            name: name.into(),
            data_type,
            value_rank: ValueRank::SCALAR,
            description: None,
        }
    }

    /// Checks a supplied value against this declaration.
    pub fn check(&self, value: &Variant) -> Result<(), String> {
        if !value.is_well_formed() {
            return Err(format!(
                "argument '{}' holds elements that do not match its array type",
                self.name
            ));
        }
        match value.data_type() {
            Some(actual) if self.data_type.accepts(actual) && self.value_rank.accepts(value) => {
                Ok(())
            }
            Some(actual) => Err(format!(
                "argument '{}' expects {:?} (rank {}), got {:?}",
                self.name, self.data_type, self.value_rank.0, actual
            )),
            None => Err(format!("argument '{}' is empty", self.name)),
        }
    }
}

/// Variable-specific attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableAttributes {
    pub data_type: DataType,
    pub value_rank: ValueRank,
    pub access_level: AccessLevel,
    pub minimum_sampling_interval: f64,
    pub historizing: bool,
    pub value: DataValue,
}

impl VariableAttributes {
    /// Read-only variable whose data type and rank are inferred from its initial value.
    pub fn from_value(value: impl Into<Variant>) -> Self {
        let value = value.into();
        let data_type = value.data_type().unwrap_or(DataType::BaseDataType);
        let value_rank = if value.is_array() {
            ValueRank::ONE_DIMENSION
        } else {
            ValueRank::SCALAR
        };
        VariableAttributes {
            data_type,
            value_rank,
            access_level: AccessLevel::CURRENT_READ,
            minimum_sampling_interval: 0.0,
            historizing: false,
            value: DataValue::new_now(value),
        }
    }

    /// Rejects values whose type or rank do not fit the declaration.
    pub fn check_value(&self, value: &Variant) -> ServiceResult<()> {
        if !self.value_rank.accepts(value) {
            return Err(ServiceError::TypeMismatch(format!(
                "value rank {} does not accept {}",
                self.value_rank.0,
                if value.is_array() { "an array" } else { "a scalar" }
            )));
        }
        if !value.is_well_formed() {
            return Err(ServiceError::TypeMismatch(
                "array elements do not match the array type".to_string(),
            ));
        }
        match value.data_type() {
            Some(actual) if self.data_type.accepts(actual) => Ok(()),
            None if self.data_type == DataType::BaseDataType => Ok(()),
            actual => Err(ServiceError::TypeMismatch(format!(
                "declared {:?}, got {:?}",
                self.data_type, actual
            ))),
        }
    }
}

/// Class-specific attribute storage. The variant determines the node class.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeAttributes {
    Object {
        event_notifier: u8,
    },
    Variable(VariableAttributes),
    Method {
        executable: bool,
        input_arguments: Vec<Argument>,
        output_arguments: Vec<Argument>,
    },
    ObjectType {
        is_abstract: bool,
    },
    VariableType {
        data_type: DataType,
        value_rank: ValueRank,
        value: Variant,
        is_abstract: bool,
    },
    ReferenceType {
        is_abstract: bool,
        symmetric: bool,
        inverse_name: Option<String>,
    },
    DataType {
        is_abstract: bool,
    },
    View {
        contains_no_loops: bool,
        event_notifier: u8,
    },
}

impl NodeAttributes {
    pub fn node_class(&self) -> NodeClass {
        match self {
            NodeAttributes::Object { .. } => NodeClass::Object,
            NodeAttributes::Variable(_) => NodeClass::Variable,
            NodeAttributes::Method { .. } => NodeClass::Method,
            NodeAttributes::ObjectType { .. } => NodeClass::ObjectType,
            NodeAttributes::VariableType { .. } => NodeClass::VariableType,
            NodeAttributes::ReferenceType { .. } => NodeClass::ReferenceType,
            NodeAttributes::DataType { .. } => NodeClass::DataType,
            NodeAttributes::View { .. } => NodeClass::View,
        }
    }

    pub fn object() -> Self {
        NodeAttributes::Object { event_notifier: 0 }
    }
}

/// Result of applying a write to a node.
#[derive(Debug, Clone)]
pub struct AttributeChange {
    /// False when the written value equals the stored one.
    pub changed: bool,
    pub value: DataValue,
}

/// A node of the address space. Owned exclusively by the NodeStore.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub node_id: NodeId,
    pub browse_name: QualifiedName,
    pub display_name: String,
    pub description: Option<String>,
    pub attributes: NodeAttributes,
}

impl Node {
    pub fn new(node_id: NodeId, browse_name: QualifiedName, attributes: NodeAttributes) -> Self {
        let display_name = browse_name.name.clone();
        Node {
            node_id,
            browse_name,
            display_name,
            description: None,
            attributes,
        }
    }

    pub fn node_class(&self) -> NodeClass {
        self.attributes.node_class()
    }

    pub fn variable(&self) -> Option<&VariableAttributes> {
        match &self.attributes {
            NodeAttributes::Variable(v) => Some(v),
            _ => None,
        }
    }

    fn invalid(&self, attribute: AttributeId) -> ServiceError {
        ServiceError::AttributeInvalid {
            node_id: self.node_id.clone(),
            attribute: format!("{:?}", attribute),
        }
    }

    /// Snapshot of one attribute.
    pub fn read_attribute(&self, attribute: AttributeId) -> ServiceResult<DataValue> {
        use NodeAttributes as A;
        if attribute == AttributeId::Value {
            return match &self.attributes {
                A::Variable(v) => {
                    if !v.access_level.contains(AccessLevel::CURRENT_READ) {
                        return Err(ServiceError::AccessDenied(format!(
                            "{} is not readable",
                            self.node_id
                        )));
                    }
                    Ok(v.value.clone())
                }
                A::VariableType { value, .. } => Ok(DataValue::new_now(value.clone())),
                _ => Err(self.invalid(attribute)),
            };
        }
        let value: Variant = match (attribute, &self.attributes) {
            (AttributeId::NodeId, _) => self.node_id.clone().into(),
            (AttributeId::NodeClass, _) => Variant::Int32(node_class_mask(self.node_class())),
            (AttributeId::BrowseName, _) => self.browse_name.to_string().into(),
            (AttributeId::DisplayName, _) => self.display_name.clone().into(),
            (AttributeId::Description, _) => match &self.description {
                Some(d) => d.clone().into(),
                None => Variant::Empty,
            },
            (AttributeId::EventNotifier, A::Object { event_notifier })
            | (AttributeId::EventNotifier, A::View { event_notifier, .. }) => {
                Variant::Byte(*event_notifier)
            }
            (AttributeId::DataType, A::Variable(v)) => v.data_type.node_id().into(),
            (AttributeId::DataType, A::VariableType { data_type, .. }) => {
                data_type.node_id().into()
            }
            (AttributeId::ValueRank, A::Variable(v)) => Variant::Int32(v.value_rank.0),
            (AttributeId::ValueRank, A::VariableType { value_rank, .. }) => {
                Variant::Int32(value_rank.0)
            }
            (AttributeId::AccessLevel, A::Variable(v))
            | (AttributeId::UserAccessLevel, A::Variable(v)) => Variant::Byte(v.access_level.0),
            (AttributeId::MinimumSamplingInterval, A::Variable(v)) => {
                Variant::Double(v.minimum_sampling_interval)
            }
            (AttributeId::Historizing, A::Variable(v)) => Variant::Boolean(v.historizing),
            (AttributeId::Executable, A::Method { executable, .. })
            | (AttributeId::UserExecutable, A::Method { executable, .. }) => {
                Variant::Boolean(*executable)
            }
            (AttributeId::IsAbstract, A::ObjectType { is_abstract })
            | (AttributeId::IsAbstract, A::VariableType { is_abstract, .. })
            | (AttributeId::IsAbstract, A::ReferenceType { is_abstract, .. })
            | (AttributeId::IsAbstract, A::DataType { is_abstract }) => {
                Variant::Boolean(*is_abstract)
            }
            (AttributeId::Symmetric, A::ReferenceType { symmetric, .. }) => {
                Variant::Boolean(*symmetric)
            }
            (AttributeId::InverseName, A::ReferenceType { inverse_name, .. }) => {
                match inverse_name {
                    Some(name) => name.clone().into(),
                    None => Variant::Empty,
                }
            }
            (AttributeId::ContainsNoLoops, A::View { contains_no_loops, .. }) => {
                Variant::Boolean(*contains_no_loops)
            }
            _ => return Err(self.invalid(attribute)),
        };
        Ok(DataValue {
            value,
            status: Default::default(),
            source_timestamp: None,
            server_timestamp: Some(Utc::now()),
        })
    }

    /// Applies a write. `check_access` is false for server-side writes that bypass AccessLevel.
    pub fn write_attribute(
        &mut self,
        attribute: AttributeId,
        value: DataValue,
        check_access: bool,
    ) -> ServiceResult<AttributeChange> {
        let node_id = self.node_id.clone();
        if attribute == AttributeId::Value {
            let NodeAttributes::Variable(var) = &mut self.attributes else {
                return Err(ServiceError::AttributeInvalid {
                    node_id,
                    attribute: "Value".to_string(),
                });
            };
            var.check_value(&value.value)?;
            if check_access && !var.access_level.contains(AccessLevel::CURRENT_WRITE) {
                return Err(ServiceError::AccessDenied(format!("{} is not writable", node_id)));
            }
            let now = Utc::now();
            let changed = var.value.value != value.value || var.value.status != value.status;
            var.value = DataValue {
                value: value.value,
                status: value.status,
                source_timestamp: value.source_timestamp.or(Some(now)),
                server_timestamp: Some(now),
            };
            return Ok(AttributeChange {
                changed,
                value: var.value.clone(),
            });
        }

        // WriteMask is zero for every node: only the server may change non-Value attributes.
        if check_access {
            return Err(ServiceError::AccessDenied(format!(
                "{:?} of {} is not writable",
                attribute, node_id
            )));
        }
        let new = value.value;
        let mismatch = |expected: &str| {
            ServiceError::TypeMismatch(format!("{:?} expects {}", attribute, expected))
        };
        let changed = match (attribute, &mut self.attributes) {
            (AttributeId::DisplayName, _) => {
                let text = new.as_str().ok_or_else(|| mismatch("String"))?.to_string();
                replace(&mut self.display_name, text)
            }
            (AttributeId::Description, _) => {
                let text = new.as_str().map(str::to_string);
                replace(&mut self.description, text)
            }
            (AttributeId::EventNotifier, NodeAttributes::Object { event_notifier })
            | (AttributeId::EventNotifier, NodeAttributes::View { event_notifier, .. }) => {
                let Variant::Byte(b) = new else {
                    return Err(mismatch("Byte"));
                };
                replace(event_notifier, b)
            }
            (AttributeId::AccessLevel, NodeAttributes::Variable(v)) => {
                let Variant::Byte(b) = new else {
                    return Err(mismatch("Byte"));
                };
                replace(&mut v.access_level, AccessLevel(b))
            }
            (AttributeId::Historizing, NodeAttributes::Variable(v)) => {
                let Variant::Boolean(b) = new else {
                    return Err(mismatch("Boolean"));
                };
                replace(&mut v.historizing, b)
            }
            (AttributeId::MinimumSamplingInterval, NodeAttributes::Variable(v)) => {
                let interval = new.as_f64().ok_or_else(|| mismatch("Double"))?;
                if v.minimum_sampling_interval == interval {
                    false
                } else {
                    v.minimum_sampling_interval = interval;
                    true
                }
            }
            (AttributeId::Executable, NodeAttributes::Method { executable, .. }) => {
                let Variant::Boolean(b) = new else {
                    return Err(mismatch("Boolean"));
                };
                replace(executable, b)
            }
            (AttributeId::NodeId, _)
            | (AttributeId::NodeClass, _)
            | (AttributeId::BrowseName, _)
            | (AttributeId::DataType, NodeAttributes::Variable(_))
            | (AttributeId::ValueRank, NodeAttributes::Variable(_)) => {
                return Err(ServiceError::AccessDenied(format!(
                    "{:?} of {} is not writable",
                    attribute, node_id
                )))
            }
            _ => return Err(self.invalid(attribute)),
        };
        let value = self.read_attribute(attribute)?;
        Ok(AttributeChange { changed, value })
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

/// NodeClass as the bit mask used on the wire.
pub fn node_class_mask(class: NodeClass) -> i32 {
    match class {
        NodeClass::Object => 1,
        NodeClass::Variable => 2,
        NodeClass::Method => 4,
        NodeClass::ObjectType => 8,
        NodeClass::VariableType => 16,
        NodeClass::ReferenceType => 32,
        NodeClass::DataType => 64,
        NodeClass::View => 128,
    }
}

/// Identifies one attribute of one node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReadValueId {
    pub node_id: NodeId,
    pub attribute_id: AttributeId,
}

impl ReadValueId {
    pub fn value(node_id: NodeId) -> Self {
        ReadValueId {
            node_id,
            attribute_id: AttributeId::Value,
        }
    }
}
