pub mod bootstrap;
pub mod builder;
pub mod node;
pub mod node_id;
pub mod references;
pub mod status;
pub mod store;
pub mod variant;

pub use node::{
    AccessLevel, Argument, AttributeId, Node, NodeAttributes, NodeClass, ReadValueId,
    VariableAttributes,
};
pub use node_id::{Identifier, NodeId, QualifiedName};
pub use references::{ids, BrowseDirection, Reference};
pub use status::StatusCode;
pub use store::{AttributeObserver, NodeStore, ReferenceDescription};
pub use variant::{DataType, DataValue, ValueRank, Variant};
