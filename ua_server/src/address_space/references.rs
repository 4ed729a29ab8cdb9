use crate::address_space::node_id::NodeId;
use serde::{Deserialize, Serialize};

/// Well-known node ids of namespace 0.
pub mod ids {
    use crate::address_space::node_id::NodeId;

    macro_rules! well_known {
        ($($name:ident = $value:expr),* $(,)?) => {
            $(
                pub fn $name() -> NodeId {
                    NodeId::numeric(0, $value)
                }
            )*
        };
    }

    well_known! {
        references = 31,
        non_hierarchical_references = 32,
        hierarchical_references = 33,
        has_child = 34,
        organizes = 35,
        has_event_source = 36,
        has_modelling_rule = 37,
        has_type_definition = 40,
        generates_event = 41,
        aggregates = 44,
        has_subtype = 45,
        has_property = 46,
        has_component = 47,
        has_notifier = 48,
        base_object_type = 58,
        folder_type = 61,
        base_variable_type = 62,
        base_data_variable_type = 63,
        property_type = 68,
        modelling_rule_mandatory = 78,
        modelling_rule_optional = 80,
        root_folder = 84,
        objects_folder = 85,
        types_folder = 86,
        views_folder = 87,
        object_types_folder = 88,
        variable_types_folder = 89,
        data_types_folder = 90,
        reference_types_folder = 91,
        modelling_rule_type = 77,
        base_event_type = 2041,
        server = 2253,
        namespace_array = 2255,
    }
}

/// Directed, typed edge between two nodes.
/// Each reference is stored twice: forward on its source, inverse on its target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub reference_type: NodeId,
    pub target: NodeId,
    pub is_forward: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BrowseDirection {
    #[default]
    Forward,
    Inverse,
    Both,
}

impl BrowseDirection {
    pub fn matches(&self, is_forward: bool) -> bool {
        match self {
            BrowseDirection::Forward => is_forward,
            BrowseDirection::Inverse => !is_forward,
            BrowseDirection::Both => true,
        }
    }
}
