use crate::address_space::node::{AttributeId, ReadValueId};
use crate::address_space::node_id::NodeId;
use crate::address_space::references::BrowseDirection;
use crate::address_space::status::StatusCode;
use crate::address_space::store::ReferenceDescription;
use crate::address_space::variant::{DataValue, Variant};
use crate::error::ServiceError;
use crate::server::context::ServerContext;
use crate::subscriptions::engine::{CreateSubscriptionRequest, SubscriptionCreated};
use crate::subscriptions::monitored_item::{MonitoredItemCreated, MonitoredItemRequest};
use crate::subscriptions::subscription::{NotificationMessage, PublishResponse, SessionId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteValue {
    pub node_id: NodeId,
    pub attribute_id: AttributeId,
    pub value: DataValue,
}

impl WriteValue {
    pub fn value(node_id: NodeId, value: impl Into<Variant>) -> Self {
        WriteValue {
            node_id,
            attribute_id: AttributeId::Value,
            value: DataValue::new_now(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowseDescription {
    pub node_id: NodeId,
    /// `None` returns every reference.
    pub reference_type: Option<NodeId>,
    pub include_subtypes: bool,
    pub direction: BrowseDirection,
}

impl BrowseDescription {
    pub fn forward(node_id: NodeId) -> Self {
        BrowseDescription {
            node_id,
            reference_type: None,
            include_subtypes: true,
            direction: BrowseDirection::Forward,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrowseResult {
    pub status: StatusCode,
    pub references: Vec<ReferenceDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallMethodRequest {
    pub object_id: NodeId,
    pub method_id: NodeId,
    pub input_arguments: Vec<Variant>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallMethodResult {
    pub status: StatusCode,
    pub output_arguments: Vec<Variant>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoredItemResult {
    pub status: StatusCode,
    pub created: Option<MonitoredItemCreated>,
}

/// Decoded service requests as delivered by the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServiceRequest {
    Read(Vec<ReadValueId>),
    Write(Vec<WriteValue>),
    Browse(Vec<BrowseDescription>),
    Call(Vec<CallMethodRequest>),
    CreateSubscription(CreateSubscriptionRequest),
    CreateMonitoredItems {
        subscription_id: u32,
        items: Vec<MonitoredItemRequest>,
    },
    DeleteMonitoredItems {
        subscription_id: u32,
        monitored_item_ids: Vec<u32>,
    },
    /// Without a subscription id the session's busiest subscription answers.
    Publish {
        subscription_id: Option<u32>,
        acknowledgements: Vec<u32>,
    },
    Republish {
        subscription_id: u32,
        sequence_number: u32,
    },
    DeleteSubscriptions(Vec<u32>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ServiceResponse {
    Read(Vec<DataValue>),
    Write(Vec<StatusCode>),
    Browse(Vec<BrowseResult>),
    Call(Vec<CallMethodResult>),
    CreateSubscription(SubscriptionCreated),
    CreateMonitoredItems(Vec<MonitoredItemResult>),
    DeleteMonitoredItems(Vec<StatusCode>),
    Publish(PublishResponse),
    Republish(NotificationMessage),
    DeleteSubscriptions(Vec<StatusCode>),
    /// The whole request failed; per-operation failures are reported inside the responses above.
    ServiceFault(StatusCode),
}

impl ServiceResponse {
    pub fn fault(&self) -> Option<StatusCode> {
        match self {
            ServiceResponse::ServiceFault(status) => Some(*status),
            _ => None,
        }
    }
}

/// Routes requests to the server components and turns every error into a status code.
#[derive(Clone)]
pub struct Dispatcher {
    server: Arc<ServerContext>,
}

impl Dispatcher {
    pub fn new(server: Arc<ServerContext>) -> Self {
        Dispatcher { server }
    }

    pub fn server(&self) -> &Arc<ServerContext> {
        &self.server
    }

    pub async fn handle(&self, session_id: SessionId, request: ServiceRequest) -> ServiceResponse {
        if !self.server.has_session(session_id) {
            warn!("Request from unknown session {:?}", session_id);
            return ServiceResponse::ServiceFault(StatusCode::BAD_SESSION_ID_INVALID);
        }
        let server = &self.server;
        match request {
            ServiceRequest::Read(nodes) => ServiceResponse::Read(nodes.iter().map(|n| self.read(n)).collect()),
            ServiceRequest::Write(values) => ServiceResponse::Write(
                values
                    .into_iter()
                    .map(|w| match server.store.set_attribute(&w.node_id, w.attribute_id, w.value) {
                        Ok(()) => StatusCode::GOOD,
                        Err(e) => {
                            debug!("Write to {} rejected: {}", w.node_id, e);
                            e.status_code()
                        }
                    })
                    .collect(),
            ),
            ServiceRequest::Browse(descriptions) => ServiceResponse::Browse(
                descriptions
                    .iter()
                    .map(|d| {
                        match server.store.browse(
                            &d.node_id,
                            d.reference_type.as_ref(),
                            d.include_subtypes,
                            d.direction,
                        ) {
                            Ok(references) => BrowseResult {
                                status: StatusCode::GOOD,
                                references,
                            },
                            Err(e) => BrowseResult {
                                status: e.status_code(),
                                references: Vec::new(),
                            },
                        }
                    })
                    .collect(),
            ),
            ServiceRequest::Call(calls) => {
                let mut results = Vec::with_capacity(calls.len());
                for call in calls {
                    let result = server
                        .methods
                        .call(&call.object_id, &call.method_id, call.input_arguments)
                        .await;
                    results.push(match result {
                        Ok(output_arguments) => CallMethodResult {
                            status: StatusCode::GOOD,
                            output_arguments,
                        },
                        Err(e) => CallMethodResult {
                            status: e.status_code(),
                            output_arguments: Vec::new(),
                        },
                    });
                }
                ServiceResponse::Call(results)
            }
            ServiceRequest::CreateSubscription(request) => ServiceResponse::CreateSubscription(
                server.subscriptions.create_subscription(session_id, request),
            ),
            ServiceRequest::CreateMonitoredItems {
                subscription_id,
                items,
            } => match server
                .subscriptions
                .create_monitored_items(session_id, subscription_id, items)
            {
                Ok(results) => ServiceResponse::CreateMonitoredItems(
                    results
                        .into_iter()
                        .map(|r| match r {
                            Ok(created) => MonitoredItemResult {
                                status: StatusCode::GOOD,
                                created: Some(created),
                            },
                            Err(e) => MonitoredItemResult {
                                status: e.status_code(),
                                created: None,
                            },
                        })
                        .collect(),
                ),
                Err(e) => fault(e),
            },
            ServiceRequest::DeleteMonitoredItems {
                subscription_id,
                monitored_item_ids,
            } => match server.subscriptions.delete_monitored_items(
                session_id,
                subscription_id,
                &monitored_item_ids,
            ) {
                Ok(results) => ServiceResponse::DeleteMonitoredItems(results),
                Err(e) => fault(e),
            },
            ServiceRequest::Publish {
                subscription_id,
                acknowledgements,
            } => {
                let result = match subscription_id {
                    Some(id) => server.subscriptions.publish(session_id, id, &acknowledgements).await,
                    None => server.subscriptions.publish_any(session_id, &acknowledgements).await,
                };
                match result {
                    Ok(response) => ServiceResponse::Publish(response),
                    Err(e) => fault(e),
                }
            }
            ServiceRequest::Republish {
                subscription_id,
                sequence_number,
            } => match server
                .subscriptions
                .republish(session_id, subscription_id, sequence_number)
            {
                Ok(message) => ServiceResponse::Republish(message),
                Err(e) => fault(e),
            },
            ServiceRequest::DeleteSubscriptions(ids) => ServiceResponse::DeleteSubscriptions(
                server.subscriptions.delete_subscriptions(session_id, &ids),
            ),
        }
    }

    fn read(&self, node: &ReadValueId) -> DataValue {
        match self.server.store.get_attribute(&node.node_id, node.attribute_id) {
            Ok(value) => value,
            // Read failures on the access level are reported as not readable.
            Err(ServiceError::AccessDenied(_)) => DataValue::from_status(StatusCode::BAD_NOT_READABLE),
            Err(e) => DataValue::from_status(e.status_code()),
        }
    }
}

fn fault(error: ServiceError) -> ServiceResponse {
    debug!("Service fault: {}", error);
    ServiceResponse::ServiceFault(error.status_code())
}
