use crate::address_space::node_id::NodeId;
use crate::address_space::status::StatusCode;
use thiserror::Error;

/// Errors produced by the address-space services.
/// Each one is reported to the client as a status code on the request that caused it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("subscription {0} not found")]
    SubscriptionNotFound(u32),

    #[error("monitored item {0} not found")]
    MonitoredItemNotFound(u32),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("method {0} not found")]
    MethodNotFound(NodeId),

    #[error("method execution failed: {0}")]
    ExecutionError(String),

    #[error("subscription {0} expired after missed publish requests")]
    SessionExpired(u32),

    #[error("node id {0} already exists")]
    NodeIdExists(NodeId),

    #[error("parent node {0} is invalid")]
    InvalidParent(NodeId),

    #[error("reference type {0} is invalid")]
    InvalidReferenceType(NodeId),

    #[error("attribute {attribute} is not supported by node {node_id}")]
    AttributeInvalid { node_id: NodeId, attribute: String },

    #[error("node {0} is referenced by pending notifications")]
    NodeInUse(NodeId),

    #[error("sequence number {0} unknown")]
    SequenceNumberUnknown(u32),

    #[error("message {0} no longer available")]
    MessageNotAvailable(u32),

    #[error("no subscription available for the session")]
    NoSubscription,

    #[error("event filter rejected: {0}")]
    FilterUnsupported(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NodeNotFound(_) => StatusCode::BAD_NODE_ID_UNKNOWN,
            ServiceError::SubscriptionNotFound(_) | ServiceError::SessionExpired(_) => {
                StatusCode::BAD_SUBSCRIPTION_ID_INVALID
            }
            ServiceError::MonitoredItemNotFound(_) => StatusCode::BAD_MONITORED_ITEM_ID_INVALID,
            ServiceError::AccessDenied(_) => StatusCode::BAD_NOT_WRITABLE,
            ServiceError::TypeMismatch(_) => StatusCode::BAD_TYPE_MISMATCH,
            ServiceError::InvalidArgument(_) => StatusCode::BAD_INVALID_ARGUMENT,
            ServiceError::MethodNotFound(_) => StatusCode::BAD_METHOD_INVALID,
            ServiceError::ExecutionError(_) => StatusCode::BAD_INTERNAL_ERROR,
            ServiceError::NodeIdExists(_) => StatusCode::BAD_NODE_ID_EXISTS,
            ServiceError::InvalidParent(_) => StatusCode::BAD_PARENT_NODE_ID_INVALID,
            ServiceError::InvalidReferenceType(_) => StatusCode::BAD_REFERENCE_TYPE_ID_INVALID,
            ServiceError::AttributeInvalid { .. } => StatusCode::BAD_ATTRIBUTE_ID_INVALID,
            ServiceError::NodeInUse(_) => StatusCode::BAD_INVALID_STATE,
            ServiceError::SequenceNumberUnknown(_) => StatusCode::BAD_SEQUENCE_NUMBER_UNKNOWN,
            ServiceError::MessageNotAvailable(_) => StatusCode::BAD_MESSAGE_NOT_AVAILABLE,
            ServiceError::NoSubscription => StatusCode::BAD_NO_SUBSCRIPTION,
            ServiceError::FilterUnsupported(_) => StatusCode::BAD_MONITORED_ITEM_FILTER_UNSUPPORTED,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
