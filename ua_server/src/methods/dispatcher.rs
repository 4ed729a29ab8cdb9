use crate::address_space::node::{Argument, NodeAttributes, NodeClass};
use crate::address_space::node_id::{NodeId, QualifiedName};
use crate::address_space::references::{ids, BrowseDirection};
use crate::address_space::store::NodeStore;
use crate::address_space::variant::Variant;
use crate::error::{ServiceError, ServiceResult};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a method implementation gets to see besides its arguments.
#[derive(Clone)]
pub struct MethodContext {
    /// The object the method was called on.
    pub object_id: NodeId,
    pub method_id: NodeId,
    pub store: Arc<NodeStore>,
}

/// Server-side implementation of a Method node.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Inputs are already validated against the InputArguments schema.
    async fn call(&self, context: MethodContext, inputs: Vec<Variant>) -> ServiceResult<Vec<Variant>>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> MethodHandler for FnHandler<F>
where
    F: Fn(&MethodContext, Vec<Variant>) -> ServiceResult<Vec<Variant>> + Send + Sync,
{
    async fn call(&self, context: MethodContext, inputs: Vec<Variant>) -> ServiceResult<Vec<Variant>> {
        (self.0)(&context, inputs)
    }
}

/// Wraps a synchronous closure as a handler.
pub fn method_fn<F>(f: F) -> Arc<dyn MethodHandler>
where
    F: Fn(&MethodContext, Vec<Variant>) -> ServiceResult<Vec<Variant>> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

pub struct MethodDispatcher {
    store: Arc<NodeStore>,
    handlers: DashMap<NodeId, Arc<dyn MethodHandler>>,
}

impl MethodDispatcher {
    pub fn new(store: Arc<NodeStore>) -> Self {
        MethodDispatcher {
            store,
            handlers: DashMap::new(),
        }
    }

    /// Adds a Method node as a component of `parent` (an object or an object type)
    /// and binds its implementation.
    pub fn add_method(
        &self,
        parent: &NodeId,
        namespace: u16,
        name: &str,
        input_arguments: Vec<Argument>,
        output_arguments: Vec<Argument>,
        handler: Arc<dyn MethodHandler>,
    ) -> ServiceResult<NodeId> {
        let method_id = self.store.add_node(
            parent,
            &ids::has_component(),
            QualifiedName::new(namespace, name),
            NodeAttributes::Method {
                executable: true,
                input_arguments,
                output_arguments,
            },
        )?;
        self.handlers.insert(method_id.clone(), handler);
        info!("Added method '{}' ({}) on {}", name, method_id, parent);
        Ok(method_id)
    }

    /// Replaces or sets the implementation of an existing Method node.
    pub fn bind(&self, method_id: &NodeId, handler: Arc<dyn MethodHandler>) -> ServiceResult<()> {
        if self.store.node_class(method_id) != Some(NodeClass::Method) {
            return Err(ServiceError::MethodNotFound(method_id.clone()));
        }
        self.handlers.insert(method_id.clone(), handler);
        Ok(())
    }

    /// True if `method_id` is a component of the object or of its type (or a supertype).
    fn belongs_to(&self, object_id: &NodeId, method_id: &NodeId) -> bool {
        let is_component = |holder: &NodeId| {
            self.store
                .find_targets(holder, &ids::has_component(), BrowseDirection::Forward)
                .contains(method_id)
        };
        if is_component(object_id) {
            return true;
        }
        let mut current = self.store.type_definition_of(object_id);
        while let Some(type_id) = current {
            if is_component(&type_id) {
                return true;
            }
            current = self
                .store
                .find_targets(&type_id, &ids::has_subtype(), BrowseDirection::Inverse)
                .into_iter()
                .next();
        }
        false
    }

    /// Validates the inputs, runs the handler on its own task and validates the outputs.
    /// The caller observes completion; the publishing timers keep running meanwhile.
    pub async fn call(
        &self,
        object_id: &NodeId,
        method_id: &NodeId,
        inputs: Vec<Variant>,
    ) -> ServiceResult<Vec<Variant>> {
        if !self.store.contains(object_id) {
            return Err(ServiceError::NodeNotFound(object_id.clone()));
        }
        let method = self
            .store
            .get_node(method_id)
            .ok_or_else(|| ServiceError::MethodNotFound(method_id.clone()))?;
        let NodeAttributes::Method {
            input_arguments,
            output_arguments,
            ..
        } = method.attributes
        else {
            return Err(ServiceError::MethodNotFound(method_id.clone()));
        };
        if !self.belongs_to(object_id, method_id) {
            return Err(ServiceError::MethodNotFound(method_id.clone()));
        }
        check_inputs(&input_arguments, &inputs)?;
        let handler = self
            .handlers
            .get(method_id)
            .map(|h| Arc::clone(h.value()))
            .ok_or_else(|| ServiceError::MethodNotFound(method_id.clone()))?;

        debug!("Calling {} on {} with {:?}", method.browse_name, object_id, inputs);
        let context = MethodContext {
            object_id: object_id.clone(),
            method_id: method_id.clone(),
            store: Arc::clone(&self.store),
        };
        let outcome = tokio::spawn(async move { handler.call(context, inputs).await }).await;
        let outputs = match outcome {
            Ok(Ok(outputs)) => outputs,
            Ok(Err(e)) => {
                warn!("Method {} failed: {}", method.browse_name, e);
                return Err(match e {
                    ServiceError::ExecutionError(_) => e,
                    other => ServiceError::ExecutionError(other.to_string()),
                });
            }
            Err(join_error) => {
                warn!("Method {} aborted: {}", method.browse_name, join_error);
                return Err(ServiceError::ExecutionError(format!(
                    "method {} did not complete",
                    method.browse_name
                )));
            }
        };

        if outputs.len() != output_arguments.len() {
            return Err(ServiceError::ExecutionError(format!(
                "method {} returned {} outputs, {} declared",
                method.browse_name,
                outputs.len(),
                output_arguments.len()
            )));
        }
        for (argument, value) in output_arguments.iter().zip(&outputs) {
            argument.check(value).map_err(ServiceError::ExecutionError)?;
        }
        Ok(outputs)
    }
}

fn check_inputs(declared: &[Argument], inputs: &[Variant]) -> ServiceResult<()> {
    if inputs.len() < declared.len() {
        return Err(ServiceError::InvalidArgument(format!(
            "expected {} arguments, got {}",
            declared.len(),
            inputs.len()
        )));
    }
    if inputs.len() > declared.len() {
        return Err(ServiceError::InvalidArgument(format!(
            "too many arguments: expected {}, got {}",
            declared.len(),
            inputs.len()
        )));
    }
    for (argument, value) in declared.iter().zip(inputs) {
        argument.check(value).map_err(ServiceError::InvalidArgument)?;
    }
    Ok(())
}

