use crate::address_space::node_id::NodeId;
use crate::address_space::status::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Built-in data types a Variable or Argument may declare.
/// The abstract types (`BaseDataType`, `Number`, `Integer`, `UInteger`) accept several concrete ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    String,
    DateTime,
    Guid,
    ByteString,
    NodeId,
    BaseDataType,
    Number,
    Integer,
    UInteger,
}

impl DataType {
    pub const ALL: [DataType; 20] = [
        DataType::Boolean,
        DataType::SByte,
        DataType::Byte,
        DataType::Int16,
        DataType::UInt16,
        DataType::Int32,
        DataType::UInt32,
        DataType::Int64,
        DataType::UInt64,
        DataType::Float,
        DataType::Double,
        DataType::String,
        DataType::DateTime,
        DataType::Guid,
        DataType::ByteString,
        DataType::NodeId,
        DataType::BaseDataType,
        DataType::Number,
        DataType::Integer,
        DataType::UInteger,
    ];

    /// NodeId of the DataType node in namespace 0.
    pub fn node_id(&self) -> NodeId {
        let id = match self {
            DataType::Boolean => 1,
            DataType::SByte => 2,
            DataType::Byte => 3,
            DataType::Int16 => 4,
            DataType::UInt16 => 5,
            DataType::Int32 => 6,
            DataType::UInt32 => 7,
            DataType::Int64 => 8,
            DataType::UInt64 => 9,
            DataType::Float => 10,
            DataType::Double => 11,
            DataType::String => 12,
            DataType::DateTime => 13,
            DataType::Guid => 14,
            DataType::ByteString => 15,
            DataType::NodeId => 17,
            DataType::BaseDataType => 24,
            DataType::Number => 26,
            DataType::Integer => 27,
            DataType::UInteger => 28,
        };
        NodeId::numeric(0, id)
    }

    pub fn from_node_id(node_id: &NodeId) -> Option<DataType> {
        DataType::ALL.iter().copied().find(|dt| dt.node_id() == *node_id)
    }

    pub fn is_abstract(&self) -> bool {
        matches!(
            self,
            DataType::BaseDataType | DataType::Number | DataType::Integer | DataType::UInteger
        )
    }

    /// The abstract type this one derives from, `None` for BaseDataType.
    pub fn supertype(&self) -> Option<DataType> {
        match self {
            DataType::BaseDataType => None,
            DataType::SByte | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
                Some(DataType::Integer)
            }
            DataType::Byte | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
                Some(DataType::UInteger)
            }
            DataType::Integer | DataType::UInteger | DataType::Float | DataType::Double => {
                Some(DataType::Number)
            }
            _ => Some(DataType::BaseDataType),
        }
    }

    /// True when a value of type `actual` may be stored where `self` is declared.
    pub fn accepts(&self, actual: DataType) -> bool {
        let mut current = Some(actual);
        while let Some(dt) = current {
            if dt == *self {
                return true;
            }
            current = dt.supertype();
        }
        false
    }
}

/// ValueRank of a Variable: -1 scalar, -2 any, -3 scalar or one dimension,
/// 0 one or more dimensions, n > 0 exactly n dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueRank(pub i32);

impl ValueRank {
    pub const SCALAR: ValueRank = ValueRank(-1);
    pub const ANY: ValueRank = ValueRank(-2);
    pub const SCALAR_OR_ONE_DIMENSION: ValueRank = ValueRank(-3);
    pub const ONE_OR_MORE_DIMENSIONS: ValueRank = ValueRank(0);
    pub const ONE_DIMENSION: ValueRank = ValueRank(1);

    /// Arrays are one-dimensional in this server, so ranks above 1 never match.
    pub fn accepts(&self, value: &Variant) -> bool {
        let is_array = matches!(value, Variant::Array { .. });
        match self.0 {
            -2 | -3 => true,
            -1 => !is_array,
            0 | 1 => is_array,
            _ => false,
        }
    }
}

/// A dynamically typed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Variant {
    Empty,
    Boolean(bool),
    SByte(i8),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(String),
    DateTime(DateTime<Utc>),
    Guid(Uuid),
    ByteString(Vec<u8>),
    NodeId(Box<NodeId>),
    /// One-dimensional array. The element type is kept so empty arrays stay typed.
    Array {
        element_type: DataType,
        values: Vec<Variant>,
    },
}

impl Variant {
    /// Data type of the value (element type for arrays), `None` for Empty.
    pub fn data_type(&self) -> Option<DataType> {
        let dt = match self {
            Variant::Empty => return None,
            Variant::Boolean(_) => DataType::Boolean,
            Variant::SByte(_) => DataType::SByte,
            Variant::Byte(_) => DataType::Byte,
            Variant::Int16(_) => DataType::Int16,
            Variant::UInt16(_) => DataType::UInt16,
            Variant::Int32(_) => DataType::Int32,
            Variant::UInt32(_) => DataType::UInt32,
            Variant::Int64(_) => DataType::Int64,
            Variant::UInt64(_) => DataType::UInt64,
            Variant::Float(_) => DataType::Float,
            Variant::Double(_) => DataType::Double,
            Variant::String(_) => DataType::String,
            Variant::DateTime(_) => DataType::DateTime,
            Variant::Guid(_) => DataType::Guid,
            Variant::ByteString(_) => DataType::ByteString,
            Variant::NodeId(_) => DataType::NodeId,
            Variant::Array { element_type, .. } => *element_type,
        };
        Some(dt)
    }

    /// Builds a typed array. Elements of another type are rejected.
    pub fn array(element_type: DataType, values: Vec<Variant>) -> Option<Variant> {
        let array = Variant::Array {
            element_type,
            values,
        };
        array.is_well_formed().then_some(array)
    }

    /// False for arrays holding nested arrays or elements of another type.
    /// Scalars are always well formed.
    pub fn is_well_formed(&self) -> bool {
        match self {
            Variant::Array {
                element_type,
                values,
            } => values.iter().all(|v| {
                !v.is_array() && v.data_type().is_some_and(|dt| element_type.accepts(dt))
            }),
            _ => true,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Variant::Array { .. })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Variant::Empty)
    }

    /// Numeric view used by comparisons in filters.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Variant::SByte(v) => Some(*v as f64),
            Variant::Byte(v) => Some(*v as f64),
            Variant::Int16(v) => Some(*v as f64),
            Variant::UInt16(v) => Some(*v as f64),
            Variant::Int32(v) => Some(*v as f64),
            Variant::UInt32(v) => Some(*v as f64),
            Variant::Int64(v) => Some(*v as f64),
            Variant::UInt64(v) => Some(*v as f64),
            Variant::Float(v) => Some(*v as f64),
            Variant::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Variant::SByte(v) => Some(*v as i64),
            Variant::Byte(v) => Some(*v as i64),
            Variant::Int16(v) => Some(*v as i64),
            Variant::UInt16(v) => Some(*v as i64),
            Variant::Int32(v) => Some(*v as i64),
            Variant::UInt32(v) => Some(*v as i64),
            Variant::Int64(v) => Some(*v),
            Variant::UInt64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Variant::Boolean(v)
    }
}

impl From<u16> for Variant {
    fn from(v: u16) -> Self {
        Variant::UInt16(v)
    }
}

impl From<i32> for Variant {
    fn from(v: i32) -> Self {
        Variant::Int32(v)
    }
}

impl From<u32> for Variant {
    fn from(v: u32) -> Self {
        Variant::UInt32(v)
    }
}

impl From<i64> for Variant {
    fn from(v: i64) -> Self {
        Variant::Int64(v)
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Variant::Double(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::String(v.to_string())
    }
}

impl From<String> for Variant {
    fn from(v: String) -> Self {
        Variant::String(v)
    }
}

impl From<DateTime<Utc>> for Variant {
    fn from(v: DateTime<Utc>) -> Self {
        Variant::DateTime(v)
    }
}

impl From<NodeId> for Variant {
    fn from(v: NodeId) -> Self {
        Variant::NodeId(Box::new(v))
    }
}

impl From<Vec<f64>> for Variant {
    fn from(v: Vec<f64>) -> Self {
        Variant::Array {
            element_type: DataType::Double,
            values: v.into_iter().map(Variant::Double).collect(),
        }
    }
}

impl From<Vec<String>> for Variant {
    fn from(v: Vec<String>) -> Self {
        Variant::Array {
            element_type: DataType::String,
            values: v.into_iter().map(Variant::String).collect(),
        }
    }
}

/// Value of an attribute together with its quality and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValue {
    pub value: Variant,
    pub status: StatusCode,
    pub source_timestamp: Option<DateTime<Utc>>,
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl DataValue {
    /// Good value stamped with the current time as both source and server timestamp.
    pub fn new_now(value: impl Into<Variant>) -> Self {
        let now = Utc::now();
        DataValue {
            value: value.into(),
            status: StatusCode::GOOD,
            source_timestamp: Some(now),
            server_timestamp: Some(now),
        }
    }

    /// Value-less result carrying only a status (e.g. a failed read).
    pub fn from_status(status: StatusCode) -> Self {
        DataValue {
            value: Variant::Empty,
            status,
            source_timestamp: None,
            server_timestamp: Some(Utc::now()),
        }
    }
}
