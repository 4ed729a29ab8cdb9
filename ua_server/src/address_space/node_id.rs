use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The identifier part of a NodeId.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identifier {
    Numeric(u32),
    String(String),
    Guid(Uuid),
    Opaque(Vec<u8>),
}

/// Unique identifier of a node: namespace index plus identifier.
/// Immutable once assigned to a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub namespace: u16,
    pub identifier: Identifier,
}

impl NodeId {
    pub fn numeric(namespace: u16, value: u32) -> Self {
        NodeId {
            namespace,
            identifier: Identifier::Numeric(value),
        }
    }

    pub fn string(namespace: u16, value: impl Into<String>) -> Self {
        NodeId {
            namespace,
            identifier: Identifier::String(value.into()),
        }
    }

    pub fn guid(namespace: u16, value: Uuid) -> Self {
        NodeId {
            namespace,
            identifier: Identifier::Guid(value),
        }
    }

    pub fn opaque(namespace: u16, value: Vec<u8>) -> Self {
        NodeId {
            namespace,
            identifier: Identifier::Opaque(value),
        }
    }

    /// The null NodeId (ns=0;i=0).
    pub fn null() -> Self {
        Self::numeric(0, 0)
    }

    pub fn is_null(&self) -> bool {
        self.namespace == 0 && self.identifier == Identifier::Numeric(0)
    }
}

/// Error returned when a NodeId string cannot be parsed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid NodeId '{0}'")]
pub struct ParseNodeIdError(pub String);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace != 0 {
            write!(f, "ns={};", self.namespace)?;
        }
        match &self.identifier {
            Identifier::Numeric(v) => write!(f, "i={}", v),
            Identifier::String(v) => write!(f, "s={}", v),
            Identifier::Guid(v) => write!(f, "g={}", v),
            Identifier::Opaque(v) => {
                write!(f, "b=")?;
                for byte in v {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for NodeId {
    type Err = ParseNodeIdError;

    /// Parses the usual text form, e.g. `ns=2;s=Temperature` or `i=85`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseNodeIdError(s.to_string());
        let (namespace, rest) = match s.strip_prefix("ns=") {
            Some(tail) => {
                let (ns, rest) = tail.split_once(';').ok_or_else(err)?;
                (ns.parse::<u16>().map_err(|_| err())?, rest)
            }
            None => (0, s),
        };
        let (kind, value) = rest.split_once('=').ok_or_else(err)?;
        let identifier = match kind {
            "i" => Identifier::Numeric(value.parse().map_err(|_| err())?),
            "s" => Identifier::String(value.to_string()),
            "g" => Identifier::Guid(Uuid::parse_str(value).map_err(|_| err())?),
            "b" => {
                if value.len() % 2 != 0 || !value.is_ascii() {
                    return Err(err());
                }
                let bytes = value
                    .as_bytes()
                    .chunks(2)
                    .map(|pair| {
                        std::str::from_utf8(pair)
                            .ok()
                            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                    })
                    .collect::<Option<Vec<u8>>>()
                    .ok_or_else(err)?;
                Identifier::Opaque(bytes)
            }
            _ => return Err(err()),
        };
        Ok(NodeId {
            namespace,
            identifier,
        })
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        NodeId::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// A name qualified by the namespace that defines it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    pub namespace: u16,
    pub name: String,
}

impl QualifiedName {
    pub fn new(namespace: u16, name: impl Into<String>) -> Self {
        QualifiedName {
            namespace,
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

impl FromStr for QualifiedName {
    type Err = ParseNodeIdError;

    /// Accepts `2:controller` or a bare name in namespace 0.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((ns, name)) => match ns.parse::<u16>() {
                Ok(ns) => Ok(QualifiedName::new(ns, name)),
                Err(_) => Ok(QualifiedName::new(0, s)),
            },
            None => Ok(QualifiedName::new(0, s)),
        }
    }
}
