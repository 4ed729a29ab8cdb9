use crate::address_space::node::{AccessLevel, AttributeId, NodeAttributes, VariableAttributes};
use crate::address_space::node_id::{NodeId, QualifiedName};
use crate::address_space::references::ids;
use crate::address_space::store::NodeStore;
use crate::address_space::variant::{DataType, DataValue, ValueRank, Variant};
use crate::error::ServiceResult;

/// Shortcuts for building an address space by hand.
impl NodeStore {
    /// Reference type used to hang a new child under `parent`: Organizes below folders, HasComponent otherwise.
    pub(crate) fn child_reference(&self, parent: &NodeId) -> NodeId {
        let is_folder = self
            .type_definition_of(parent)
            .is_some_and(|t| t == ids::folder_type());
        if is_folder {
            ids::organizes()
        } else {
            ids::has_component()
        }
    }

    pub fn add_folder(&self, parent: &NodeId, namespace: u16, name: &str) -> ServiceResult<NodeId> {
        let reference = self.child_reference(parent);
        let id = self.add_node(
            parent,
            &reference,
            QualifiedName::new(namespace, name),
            NodeAttributes::object(),
        )?;
        self.add_reference(&id, &ids::has_type_definition(), &ids::folder_type(), true)?;
        Ok(id)
    }

    /// Plain object of BaseObjectType. Use the TypeSystem to create typed instances.
    pub fn add_object(&self, parent: &NodeId, namespace: u16, name: &str) -> ServiceResult<NodeId> {
        let reference = self.child_reference(parent);
        let id = self.add_node(
            parent,
            &reference,
            QualifiedName::new(namespace, name),
            NodeAttributes::object(),
        )?;
        self.add_reference(&id, &ids::has_type_definition(), &ids::base_object_type(), true)?;
        Ok(id)
    }

    /// Read-only data variable; data type and rank follow the initial value.
    pub fn add_variable(
        &self,
        parent: &NodeId,
        namespace: u16,
        name: &str,
        value: impl Into<Variant>,
    ) -> ServiceResult<NodeId> {
        self.add_variable_with(parent, namespace, name, VariableAttributes::from_value(value))
    }

    /// Variable with an explicit declaration, e.g. a typed empty array.
    pub fn add_typed_variable(
        &self,
        parent: &NodeId,
        namespace: u16,
        name: &str,
        data_type: DataType,
        value_rank: ValueRank,
        value: Variant,
    ) -> ServiceResult<NodeId> {
        let mut attributes = VariableAttributes::from_value(value);
        attributes.data_type = data_type;
        attributes.value_rank = value_rank;
        attributes.check_value(&attributes.value.value)?;
        self.add_variable_with(parent, namespace, name, attributes)
    }

    pub fn add_variable_with(
        &self,
        parent: &NodeId,
        namespace: u16,
        name: &str,
        attributes: VariableAttributes,
    ) -> ServiceResult<NodeId> {
        let reference = self.child_reference(parent);
        let id = self.add_node(
            parent,
            &reference,
            QualifiedName::new(namespace, name),
            NodeAttributes::Variable(attributes),
        )?;
        self.add_reference(&id, &ids::has_type_definition(), &ids::base_data_variable_type(), true)?;
        Ok(id)
    }

    pub fn add_property(
        &self,
        parent: &NodeId,
        namespace: u16,
        name: &str,
        value: impl Into<Variant>,
    ) -> ServiceResult<NodeId> {
        let id = self.add_node(
            parent,
            &ids::has_property(),
            QualifiedName::new(namespace, name),
            NodeAttributes::Variable(VariableAttributes::from_value(value)),
        )?;
        self.add_reference(&id, &ids::has_type_definition(), &ids::property_type(), true)?;
        Ok(id)
    }

    /// Grants or revokes client write access to a Variable's value.
    pub fn set_writable(&self, node_id: &NodeId, writable: bool) -> ServiceResult<()> {
        let level = if writable {
            AccessLevel::READ_WRITE
        } else {
            AccessLevel::CURRENT_READ
        };
        self.set_attribute_unchecked(
            node_id,
            AttributeId::AccessLevel,
            DataValue::new_now(Variant::Byte(level.0)),
        )
    }
}
