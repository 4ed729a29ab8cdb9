use crate::address_space::bootstrap::OPC_UA_NAMESPACE;
use crate::address_space::references::ids;
use crate::address_space::store::NodeStore;
use crate::address_space::variant::{DataValue, Variant};
use crate::config::settings::Settings;
use crate::error::ServiceResult;
use crate::events::engine::EventEngine;
use crate::methods::dispatcher::MethodDispatcher;
use crate::subscriptions::engine::{EngineConfig, SubscriptionEngine};
use crate::subscriptions::subscription::SessionId;
use crate::types::type_system::{InstantiateOptions, TypeSystem};
use dashmap::DashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Everything one server instance owns. Built once at startup and passed by `Arc`
/// to whatever needs it; `shutdown` tears down the background tasks.
pub struct ServerContext {
    pub settings: Settings,
    pub store: Arc<NodeStore>,
    pub types: TypeSystem,
    pub subscriptions: SubscriptionEngine,
    pub methods: MethodDispatcher,
    pub events: EventEngine,
    namespaces: RwLock<Vec<String>>,
    sessions: DashSet<SessionId>,
    next_session_id: AtomicU32,
}

impl ServerContext {
    pub fn new(settings: Settings) -> Self {
        let store = Arc::new(NodeStore::new());
        let types = TypeSystem::new(
            Arc::clone(&store),
            InstantiateOptions {
                include_optional: settings.types.instantiate_optional,
            },
        );
        let subscriptions =
            SubscriptionEngine::new(Arc::clone(&store), EngineConfig::from_settings(&settings));
        let methods = MethodDispatcher::new(Arc::clone(&store));
        let events = EventEngine::new(Arc::clone(&store), subscriptions.clone());
        info!(
            "Server context '{}' created ({} namespace-0 nodes)",
            settings.server.application_name,
            store.node_count()
        );
        ServerContext {
            settings,
            store,
            types,
            subscriptions,
            methods,
            events,
            namespaces: RwLock::new(vec![OPC_UA_NAMESPACE.to_string()]),
            sessions: DashSet::new(),
            next_session_id: AtomicU32::new(1),
        }
    }

    /// Returns the index of `uri`, adding it to the namespace table if new.
    pub fn register_namespace(&self, uri: &str) -> ServiceResult<u16> {
        let mut namespaces = self
            .namespaces
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(index) = namespaces.iter().position(|n| n == uri) {
            return Ok(index as u16);
        }
        namespaces.push(uri.to_string());
        self.store.set_value_unchecked(
            &ids::namespace_array(),
            DataValue::new_now(Variant::from(namespaces.clone())),
        )?;
        let index = (namespaces.len() - 1) as u16;
        info!("Registered namespace {} as ns={}", uri, index);
        Ok(index)
    }

    pub fn namespace_index(&self, uri: &str) -> Option<u16> {
        self.namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .position(|n| n == uri)
            .map(|i| i as u16)
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn create_session(&self) -> SessionId {
        let id = SessionId(self.next_session_id.fetch_add(1, Ordering::Relaxed));
        self.sessions.insert(id);
        debug!("Session {:?} created", id);
        id
    }

    pub fn has_session(&self, session_id: SessionId) -> bool {
        self.sessions.contains(&session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Ends a session and deletes its subscriptions. Returns false for an unknown session.
    pub fn close_session(&self, session_id: SessionId) -> bool {
        if self.sessions.remove(&session_id).is_none() {
            return false;
        }
        let removed = self.subscriptions.delete_session_subscriptions(session_id);
        info!(
            "Session {:?} closed, {} subscriptions deleted",
            session_id, removed
        );
        true
    }

    pub fn shutdown(&self) {
        self.sessions.clear();
        self.subscriptions.shutdown();
        info!("Server context shut down");
    }
}
