use crate::address_space::node::{
    AccessLevel, Node, NodeAttributes, VariableAttributes, SUBSCRIBE_TO_EVENTS,
};
use crate::address_space::node_id::{NodeId, QualifiedName};
use crate::address_space::references::ids;
use crate::address_space::store::NodeStore;
use crate::address_space::variant::{DataType, ValueRank, Variant};
use tracing::{debug, warn};

/// URI of namespace 0.
pub const OPC_UA_NAMESPACE: &str = "http://opcfoundation.org/UA/";

impl NodeStore {
    /// Store pre-populated with the namespace-0 skeleton every server needs:
    /// standard folders, reference types, base object/variable/event types,
    /// data types, modelling rules and the Server object.
    pub fn new() -> Self {
        let store = NodeStore::empty();
        populate(&store);
        debug!("Namespace 0 bootstrapped with {} nodes", store.node_count());
        store
    }
}

impl Default for NodeStore {
    fn default() -> Self {
        Self::new()
    }
}

fn put(store: &NodeStore, node_id: NodeId, name: &str, attributes: NodeAttributes) {
    let node = Node::new(node_id, QualifiedName::new(0, name), attributes);
    if let Err(e) = store.insert_node(node) {
        warn!("Skipping well-known node {}: {}", name, e);
    }
}

fn folder(store: &NodeStore, node_id: NodeId, name: &str, parent: &NodeId) {
    put(store, node_id.clone(), name, NodeAttributes::object());
    store.link_unchecked(parent, &ids::organizes(), &node_id);
    store.link_unchecked(&node_id, &ids::has_type_definition(), &ids::folder_type());
}

fn reference_type(
    store: &NodeStore,
    node_id: NodeId,
    name: &str,
    parent: Option<&NodeId>,
    is_abstract: bool,
    inverse_name: Option<&str>,
) {
    put(
        store,
        node_id.clone(),
        name,
        NodeAttributes::ReferenceType {
            is_abstract,
            symmetric: inverse_name.is_none() && parent.is_none(),
            inverse_name: inverse_name.map(str::to_string),
        },
    );
    if let Some(parent) = parent {
        store.link_unchecked(parent, &ids::has_subtype(), &node_id);
    }
}

fn subtype(store: &NodeStore, node_id: NodeId, name: &str, parent: &NodeId, attributes: NodeAttributes) {
    put(store, node_id.clone(), name, attributes);
    store.link_unchecked(parent, &ids::has_subtype(), &node_id);
}

fn populate(store: &NodeStore) {
    // Reference types first: everything else is linked with them.
    reference_type(store, ids::references(), "References", None, true, None);
    reference_type(store, ids::hierarchical_references(), "HierarchicalReferences", Some(&ids::references()), true, None);
    reference_type(store, ids::non_hierarchical_references(), "NonHierarchicalReferences", Some(&ids::references()), true, None);
    reference_type(store, ids::has_child(), "HasChild", Some(&ids::hierarchical_references()), true, None);
    reference_type(store, ids::organizes(), "Organizes", Some(&ids::hierarchical_references()), false, Some("OrganizedBy"));
    reference_type(store, ids::has_event_source(), "HasEventSource", Some(&ids::hierarchical_references()), false, Some("EventSourceOf"));
    reference_type(store, ids::has_notifier(), "HasNotifier", Some(&ids::has_event_source()), false, Some("NotifierOf"));
    reference_type(store, ids::aggregates(), "Aggregates", Some(&ids::has_child()), true, None);
    reference_type(store, ids::has_subtype(), "HasSubtype", Some(&ids::has_child()), false, Some("SubtypeOf"));
    reference_type(store, ids::has_component(), "HasComponent", Some(&ids::aggregates()), false, Some("ComponentOf"));
    reference_type(store, ids::has_property(), "HasProperty", Some(&ids::aggregates()), false, Some("PropertyOf"));
    reference_type(store, ids::has_modelling_rule(), "HasModellingRule", Some(&ids::non_hierarchical_references()), false, Some("ModellingRuleOf"));
    reference_type(store, ids::has_type_definition(), "HasTypeDefinition", Some(&ids::non_hierarchical_references()), false, Some("TypeDefinitionOf"));
    reference_type(store, ids::generates_event(), "GeneratesEvent", Some(&ids::non_hierarchical_references()), false, Some("GeneratedBy"));

    // Object and variable types.
    put(store, ids::base_object_type(), "BaseObjectType", NodeAttributes::ObjectType { is_abstract: false });
    subtype(store, ids::folder_type(), "FolderType", &ids::base_object_type(), NodeAttributes::ObjectType { is_abstract: false });
    subtype(store, ids::base_event_type(), "BaseEventType", &ids::base_object_type(), NodeAttributes::ObjectType { is_abstract: true });
    subtype(store, ids::modelling_rule_type(), "ModellingRuleType", &ids::base_object_type(), NodeAttributes::ObjectType { is_abstract: false });
    put(
        store,
        ids::base_variable_type(),
        "BaseVariableType",
        NodeAttributes::VariableType {
            data_type: DataType::BaseDataType,
            value_rank: ValueRank::ANY,
            value: Variant::Empty,
            is_abstract: true,
        },
    );
    for (node_id, name) in [
        (ids::base_data_variable_type(), "BaseDataVariableType"),
        (ids::property_type(), "PropertyType"),
    ] {
        subtype(
            store,
            node_id,
            name,
            &ids::base_variable_type(),
            NodeAttributes::VariableType {
                data_type: DataType::BaseDataType,
                value_rank: ValueRank::ANY,
                value: Variant::Empty,
                is_abstract: false,
            },
        );
    }

    // Folder hierarchy.
    put(store, ids::root_folder(), "Root", NodeAttributes::object());
    store.link_unchecked(&ids::root_folder(), &ids::has_type_definition(), &ids::folder_type());
    folder(store, ids::objects_folder(), "Objects", &ids::root_folder());
    folder(store, ids::types_folder(), "Types", &ids::root_folder());
    folder(store, ids::views_folder(), "Views", &ids::root_folder());
    folder(store, ids::object_types_folder(), "ObjectTypes", &ids::types_folder());
    folder(store, ids::variable_types_folder(), "VariableTypes", &ids::types_folder());
    folder(store, ids::data_types_folder(), "DataTypes", &ids::types_folder());
    folder(store, ids::reference_types_folder(), "ReferenceTypes", &ids::types_folder());
    store.link_unchecked(&ids::object_types_folder(), &ids::organizes(), &ids::base_object_type());
    store.link_unchecked(&ids::variable_types_folder(), &ids::organizes(), &ids::base_variable_type());
    store.link_unchecked(&ids::reference_types_folder(), &ids::organizes(), &ids::references());

    // Data types, linked along their abstract supertypes.
    for data_type in DataType::ALL {
        put(
            store,
            data_type.node_id(),
            &format!("{:?}", data_type),
            NodeAttributes::DataType {
                is_abstract: data_type.is_abstract(),
            },
        );
    }
    for data_type in DataType::ALL {
        match data_type.supertype() {
            Some(parent) => store.link_unchecked(&parent.node_id(), &ids::has_subtype(), &data_type.node_id()),
            None => store.link_unchecked(&ids::data_types_folder(), &ids::organizes(), &data_type.node_id()),
        }
    }

    // Modelling rules.
    for (node_id, name) in [
        (ids::modelling_rule_mandatory(), "Mandatory"),
        (ids::modelling_rule_optional(), "Optional"),
    ] {
        put(store, node_id.clone(), name, NodeAttributes::object());
        store.link_unchecked(&ids::types_folder(), &ids::organizes(), &node_id);
        store.link_unchecked(&node_id, &ids::has_type_definition(), &ids::modelling_rule_type());
    }

    // Server object with the namespace table.
    put(
        store,
        ids::server(),
        "Server",
        NodeAttributes::Object {
            event_notifier: SUBSCRIBE_TO_EVENTS,
        },
    );
    store.link_unchecked(&ids::objects_folder(), &ids::organizes(), &ids::server());
    store.link_unchecked(&ids::server(), &ids::has_type_definition(), &ids::base_object_type());
    let mut namespace_array =
        VariableAttributes::from_value(Variant::from(vec![OPC_UA_NAMESPACE.to_string()]));
    namespace_array.access_level = AccessLevel::CURRENT_READ;
    put(store, ids::namespace_array(), "NamespaceArray", NodeAttributes::Variable(namespace_array));
    store.link_unchecked(&ids::server(), &ids::has_property(), &ids::namespace_array());
    store.link_unchecked(&ids::namespace_array(), &ids::has_type_definition(), &ids::property_type());
}
