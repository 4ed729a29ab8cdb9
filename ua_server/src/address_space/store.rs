use crate::address_space::node::{AttributeId, Node, NodeAttributes, NodeClass};
use crate::address_space::node_id::{NodeId, QualifiedName};
use crate::address_space::references::{ids, BrowseDirection, Reference};
use crate::address_space::variant::{DataValue, Variant};
use crate::error::{ServiceError, ServiceResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, info};

/// Receives committed attribute changes. Implemented by the subscription engine.
pub trait AttributeObserver: Send + Sync {
    /// Called after a write changed the stored attribute. No node lock is held.
    fn attribute_changed(&self, node_id: &NodeId, attribute: AttributeId, value: &DataValue);

    /// True while queued, unsent notifications still refer to `node_id`.
    fn references_node(&self, _node_id: &NodeId) -> bool {
        false
    }
}

/// One entry of a browse result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceDescription {
    pub reference_type: NodeId,
    pub is_forward: bool,
    pub node_id: NodeId,
    pub browse_name: QualifiedName,
    pub display_name: String,
    pub node_class: NodeClass,
    pub type_definition: Option<NodeId>,
}

const WRITE_STRIPES: usize = 64;

/// Owns the address-space graph.
/// Nodes live in a flat table keyed by NodeId; references are a separate index keyed by
/// the node holding them, so the graph can be cyclic without owning pointers.
///
/// Writes and deletes of a node are serialized by a striped lock keyed by NodeId. The
/// stripe is held from the swap until every observer has seen the change, so observers
/// receive one node's changes in commit order. It is never a DashMap guard, so observers
/// may read the store.
pub struct NodeStore {
    nodes: DashMap<NodeId, Node>,
    references: DashMap<NodeId, Vec<Reference>>,
    next_id: AtomicU32,
    observers: RwLock<Vec<Arc<dyn AttributeObserver>>>,
    write_stripes: Vec<Mutex<()>>,
}

impl NodeStore {
    /// Empty store with no namespace-0 nodes. See `bootstrap` for a usable address space.
    pub fn empty() -> Self {
        NodeStore {
            nodes: DashMap::new(),
            references: DashMap::new(),
            next_id: AtomicU32::new(1000),
            observers: RwLock::new(Vec::new()),
            write_stripes: (0..WRITE_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    fn stripe_of(&self, node_id: &NodeId) -> usize {
        let mut hasher = DefaultHasher::new();
        node_id.hash(&mut hasher);
        (hasher.finish() as usize) % self.write_stripes.len()
    }

    fn lock_stripe(&self, index: usize) -> MutexGuard<'_, ()> {
        self.write_stripes[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register_observer(&self, observer: Arc<dyn AttributeObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.nodes.contains_key(node_id)
    }

    /// Snapshot of a whole node.
    pub fn get_node(&self, node_id: &NodeId) -> Option<Node> {
        self.nodes.get(node_id).map(|n| n.value().clone())
    }

    pub fn node_class(&self, node_id: &NodeId) -> Option<NodeClass> {
        self.nodes.get(node_id).map(|n| n.node_class())
    }

    /// Inserts a fully formed node without linking it. Used for well-known nodes.
    pub fn insert_node(&self, node: Node) -> ServiceResult<()> {
        match self.nodes.entry(node.node_id.clone()) {
            Entry::Occupied(e) => Err(ServiceError::NodeIdExists(e.key().clone())),
            Entry::Vacant(e) => {
                e.insert(node);
                Ok(())
            }
        }
    }

    /// Creates a node under `parent` with a freshly allocated numeric NodeId
    /// in the namespace of its browse name.
    pub fn add_node(
        &self,
        parent: &NodeId,
        reference_type: &NodeId,
        browse_name: QualifiedName,
        attributes: NodeAttributes,
    ) -> ServiceResult<NodeId> {
        self.check_parent(parent, reference_type)?;
        let namespace = browse_name.namespace;
        let mut node = Node::new(NodeId::null(), browse_name, attributes);
        let node_id = loop {
            let candidate = NodeId::numeric(namespace, self.next_id.fetch_add(1, Ordering::Relaxed));
            if let Entry::Vacant(e) = self.nodes.entry(candidate.clone()) {
                node.node_id = candidate.clone();
                e.insert(node);
                break candidate;
            }
        };
        self.link(parent, reference_type, &node_id);
        debug!("Added node {} under {}", node_id, parent);
        Ok(node_id)
    }

    /// Creates a node with a caller-chosen NodeId.
    pub fn add_node_with_id(
        &self,
        node_id: NodeId,
        parent: &NodeId,
        reference_type: &NodeId,
        browse_name: QualifiedName,
        attributes: NodeAttributes,
    ) -> ServiceResult<NodeId> {
        self.check_parent(parent, reference_type)?;
        self.insert_node(Node::new(node_id.clone(), browse_name, attributes))?;
        self.link(parent, reference_type, &node_id);
        debug!("Added node {} under {}", node_id, parent);
        Ok(node_id)
    }

    fn check_parent(&self, parent: &NodeId, reference_type: &NodeId) -> ServiceResult<()> {
        if !self.contains(parent) {
            return Err(ServiceError::InvalidParent(parent.clone()));
        }
        if !self.is_subtype_of(reference_type, &ids::hierarchical_references()) {
            return Err(ServiceError::InvalidReferenceType(reference_type.clone()));
        }
        Ok(())
    }

    fn link(&self, source: &NodeId, reference_type: &NodeId, target: &NodeId) {
        push_unique(
            &mut self.references.entry(source.clone()).or_default(),
            Reference {
                reference_type: reference_type.clone(),
                target: target.clone(),
                is_forward: true,
            },
        );
        push_unique(
            &mut self.references.entry(target.clone()).or_default(),
            Reference {
                reference_type: reference_type.clone(),
                target: source.clone(),
                is_forward: false,
            },
        );
    }

    /// Adds a reference. With `forward` false the edge points from `target` to `source`.
    pub fn add_reference(
        &self,
        source: &NodeId,
        reference_type: &NodeId,
        target: &NodeId,
        forward: bool,
    ) -> ServiceResult<()> {
        for id in [source, target] {
            if !self.contains(id) {
                return Err(ServiceError::NodeNotFound(id.clone()));
            }
        }
        if self.node_class(reference_type) != Some(NodeClass::ReferenceType) {
            return Err(ServiceError::InvalidReferenceType(reference_type.clone()));
        }
        if forward {
            self.link(source, reference_type, target);
        } else {
            self.link(target, reference_type, source);
        }
        Ok(())
    }

    /// Inserts a reference without validation. Only used while bootstrapping namespace 0,
    /// where reference types may not exist yet.
    pub(crate) fn link_unchecked(&self, source: &NodeId, reference_type: &NodeId, target: &NodeId) {
        self.link(source, reference_type, target);
    }

    /// Removes the forward edge and its inverse mirror. Returns false if absent.
    pub fn delete_reference(&self, source: &NodeId, reference_type: &NodeId, target: &NodeId) -> bool {
        let removed = remove_matching(&self.references, source, |r| {
            r.is_forward && r.reference_type == *reference_type && r.target == *target
        });
        remove_matching(&self.references, target, |r| {
            !r.is_forward && r.reference_type == *reference_type && r.target == *source
        });
        removed
    }

    /// All references held by a node (forward and inverse).
    pub fn references_of(&self, node_id: &NodeId) -> Vec<Reference> {
        self.references
            .get(node_id)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    /// Targets of references of exactly `reference_type` in `direction`.
    pub fn find_targets(
        &self,
        node_id: &NodeId,
        reference_type: &NodeId,
        direction: BrowseDirection,
    ) -> Vec<NodeId> {
        self.references_of(node_id)
            .into_iter()
            .filter(|r| r.reference_type == *reference_type && direction.matches(r.is_forward))
            .map(|r| r.target)
            .collect()
    }

    /// Walks the inverse HasSubtype chain from `sub_type` looking for `super_type`.
    pub fn is_subtype_of(&self, sub_type: &NodeId, super_type: &NodeId) -> bool {
        let mut current = sub_type.clone();
        let mut seen = HashSet::new();
        loop {
            if current == *super_type {
                return true;
            }
            if !seen.insert(current.clone()) {
                return false;
            }
            match self
                .find_targets(&current, &ids::has_subtype(), BrowseDirection::Inverse)
                .into_iter()
                .next()
            {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    pub fn type_definition_of(&self, node_id: &NodeId) -> Option<NodeId> {
        self.find_targets(node_id, &ids::has_type_definition(), BrowseDirection::Forward)
            .into_iter()
            .next()
    }

    /// Lists references of a node filtered by type (optionally including subtypes) and direction.
    pub fn browse(
        &self,
        node_id: &NodeId,
        reference_type: Option<&NodeId>,
        include_subtypes: bool,
        direction: BrowseDirection,
    ) -> ServiceResult<Vec<ReferenceDescription>> {
        if !self.contains(node_id) {
            return Err(ServiceError::NodeNotFound(node_id.clone()));
        }
        let mut results = Vec::new();
        for reference in self.references_of(node_id) {
            if !direction.matches(reference.is_forward) {
                continue;
            }
            if let Some(filter) = reference_type {
                let matches = reference.reference_type == *filter
                    || (include_subtypes && self.is_subtype_of(&reference.reference_type, filter));
                if !matches {
                    continue;
                }
            }
            // Targets deleted without their inverse references are skipped.
            let Some(target) = self.get_node(&reference.target) else {
                continue;
            };
            results.push(ReferenceDescription {
                type_definition: self.type_definition_of(&target.node_id),
                reference_type: reference.reference_type,
                is_forward: reference.is_forward,
                node_id: target.node_id,
                browse_name: target.browse_name,
                display_name: target.display_name,
                node_class: target.attributes.node_class(),
            });
        }
        Ok(results)
    }

    /// Finds the hierarchical child of `node_id` with the given browse name.
    pub fn find_child(&self, node_id: &NodeId, name: &QualifiedName) -> Option<NodeId> {
        self.browse(
            node_id,
            Some(&ids::hierarchical_references()),
            true,
            BrowseDirection::Forward,
        )
        .ok()?
        .into_iter()
        .find(|r| r.browse_name == *name)
        .map(|r| r.node_id)
    }

    /// Resolves a relative path of browse names starting at `start`.
    pub fn browse_path(&self, start: &NodeId, path: &[QualifiedName]) -> ServiceResult<NodeId> {
        let mut current = start.clone();
        for name in path {
            current = self.find_child(&current, name).ok_or_else(|| {
                ServiceError::NodeNotFound(NodeId::string(name.namespace, name.name.clone()))
            })?;
        }
        Ok(current)
    }

    /// Reads one attribute under the node's lock, so the snapshot is never torn.
    pub fn get_attribute(&self, node_id: &NodeId, attribute: AttributeId) -> ServiceResult<DataValue> {
        let node = self
            .nodes
            .get(node_id)
            .ok_or_else(|| ServiceError::NodeNotFound(node_id.clone()))?;
        node.read_attribute(attribute)
    }

    /// Client write: checks AccessLevel, DataType and ValueRank.
    pub fn set_attribute(
        &self,
        node_id: &NodeId,
        attribute: AttributeId,
        value: DataValue,
    ) -> ServiceResult<()> {
        self.write(node_id, attribute, value, true)
    }

    /// Convenience for writing a Variable's value with current timestamps.
    pub fn write_value(&self, node_id: &NodeId, value: impl Into<Variant>) -> ServiceResult<()> {
        self.write(node_id, AttributeId::Value, DataValue::new_now(value), true)
    }

    /// Server-side write of a Variable's value. Skips the AccessLevel check but still
    /// validates the type and notifies subscribers.
    pub fn set_value_unchecked(&self, node_id: &NodeId, value: DataValue) -> ServiceResult<()> {
        self.write(node_id, AttributeId::Value, value, false)
    }

    /// Server-side write of any writable attribute, bypassing access checks.
    pub fn set_attribute_unchecked(
        &self,
        node_id: &NodeId,
        attribute: AttributeId,
        value: DataValue,
    ) -> ServiceResult<()> {
        self.write(node_id, attribute, value, false)
    }

    fn write(
        &self,
        node_id: &NodeId,
        attribute: AttributeId,
        value: DataValue,
        check_access: bool,
    ) -> ServiceResult<()> {
        let _serial = self.lock_stripe(self.stripe_of(node_id));
        let change = {
            let mut node = self
                .nodes
                .get_mut(node_id)
                .ok_or_else(|| ServiceError::NodeNotFound(node_id.clone()))?;
            node.write_attribute(attribute, value, check_access)?
        };
        if change.changed {
            let observers = self
                .observers
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            for observer in observers {
                observer.attribute_changed(node_id, attribute, &change.value);
            }
        }
        Ok(())
    }

    /// Deletes a node and the aggregated (HasComponent/HasProperty) subtree below it.
    /// References from other nodes pointing at deleted nodes are removed only when
    /// `delete_references` is set.
    pub fn delete_node(&self, node_id: &NodeId, delete_references: bool) -> ServiceResult<()> {
        if !self.contains(node_id) {
            return Err(ServiceError::NodeNotFound(node_id.clone()));
        }
        if node_id.namespace == 0 {
            return Err(ServiceError::AccessDenied(format!(
                "{} belongs to namespace 0",
                node_id
            )));
        }

        let doomed = self.aggregated_subtree(node_id);
        // Ascending stripe order; writers only ever hold one stripe.
        let stripes: BTreeSet<usize> = doomed.iter().map(|id| self.stripe_of(id)).collect();
        let _serial: Vec<_> = stripes.into_iter().map(|i| self.lock_stripe(i)).collect();
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(pinned) = doomed
            .iter()
            .find(|id| observers.iter().any(|o| o.references_node(id)))
        {
            return Err(ServiceError::NodeInUse(pinned.clone()));
        }

        for id in &doomed {
            self.nodes.remove(id);
            let Some((_, refs)) = self.references.remove(id) else {
                continue;
            };
            for reference in refs {
                if doomed.contains(&reference.target) {
                    continue;
                }
                if reference.is_forward || delete_references {
                    remove_matching(&self.references, &reference.target, |r| {
                        r.target == *id
                            && r.reference_type == reference.reference_type
                            && r.is_forward != reference.is_forward
                    });
                }
            }
        }
        info!("Deleted node {} ({} nodes removed)", node_id, doomed.len());
        Ok(())
    }

    fn aggregated_subtree(&self, root: &NodeId) -> HashSet<NodeId> {
        let mut found = HashSet::new();
        let mut queue = VecDeque::from([root.clone()]);
        while let Some(id) = queue.pop_front() {
            if !found.insert(id.clone()) {
                continue;
            }
            for reference in self.references_of(&id) {
                let aggregated = reference.reference_type == ids::has_component()
                    || reference.reference_type == ids::has_property();
                if reference.is_forward && aggregated {
                    queue.push_back(reference.target);
                }
            }
        }
        found
    }
}

fn push_unique(list: &mut Vec<Reference>, reference: Reference) {
    if !list.contains(&reference) {
        list.push(reference);
    }
}

fn remove_matching(
    references: &DashMap<NodeId, Vec<Reference>>,
    holder: &NodeId,
    predicate: impl Fn(&Reference) -> bool,
) -> bool {
    match references.get_mut(holder) {
        Some(mut list) => {
            let before = list.len();
            list.retain(|r| !predicate(r));
            before != list.len()
        }
        None => false,
    }
}
