use crate::address_space::node::{AccessLevel, NodeAttributes, NodeClass, VariableAttributes};
use crate::address_space::node_id::{NodeId, QualifiedName};
use crate::address_space::references::ids;
use crate::address_space::store::NodeStore;
use crate::address_space::variant::{DataType, DataValue, ValueRank, Variant};
use crate::error::{ServiceError, ServiceResult};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Decides whether an instance declaration is copied when its type is instantiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModellingRule {
    Mandatory,
    Optional,
    /// Structural only: visible on the type, never copied to instances.
    None,
}

impl ModellingRule {
    fn node_id(&self) -> Option<NodeId> {
        match self {
            ModellingRule::Mandatory => Some(ids::modelling_rule_mandatory()),
            ModellingRule::Optional => Some(ids::modelling_rule_optional()),
            ModellingRule::None => None,
        }
    }
}

/// What a declaration turns into when copied.
#[derive(Debug, Clone, PartialEq)]
pub enum DeclarationKind {
    Object {
        /// Registered type whose own declarations are merged under this child.
        type_definition: Option<NodeId>,
    },
    Variable {
        value: Variant,
        data_type: DataType,
        value_rank: ValueRank,
        access_level: AccessLevel,
        is_property: bool,
    },
}

/// A child declared on a type, with its own declared children.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceDeclaration {
    pub browse_name: QualifiedName,
    pub kind: DeclarationKind,
    pub modelling_rule: ModellingRule,
    pub children: Vec<InstanceDeclaration>,
}

impl InstanceDeclaration {
    pub fn object(namespace: u16, name: &str, modelling_rule: ModellingRule) -> Self {
        InstanceDeclaration {
            browse_name: QualifiedName::new(namespace, name),
            kind: DeclarationKind::Object {
                type_definition: None,
            },
            modelling_rule,
            children: Vec::new(),
        }
    }

    pub fn variable(
        namespace: u16,
        name: &str,
        value: impl Into<Variant>,
        modelling_rule: ModellingRule,
    ) -> Self {
        Self::data(namespace, name, value.into(), modelling_rule, false)
    }

    pub fn property(
        namespace: u16,
        name: &str,
        value: impl Into<Variant>,
        modelling_rule: ModellingRule,
    ) -> Self {
        Self::data(namespace, name, value.into(), modelling_rule, true)
    }

    fn data(
        namespace: u16,
        name: &str,
        value: Variant,
        modelling_rule: ModellingRule,
        is_property: bool,
    ) -> Self {
        let template = VariableAttributes::from_value(value);
        InstanceDeclaration {
            browse_name: QualifiedName::new(namespace, name),
            kind: DeclarationKind::Variable {
                value: template.value.value,
                data_type: template.data_type,
                value_rank: template.value_rank,
                access_level: template.access_level,
                is_property,
            },
            modelling_rule,
            children: Vec::new(),
        }
    }

    pub fn of_type(mut self, type_definition: NodeId) -> Self {
        if let DeclarationKind::Object { type_definition: t } = &mut self.kind {
            *t = Some(type_definition);
        }
        self
    }

    pub fn writable(mut self) -> Self {
        if let DeclarationKind::Variable { access_level, .. } = &mut self.kind {
            *access_level = AccessLevel::READ_WRITE;
        }
        self
    }

    pub fn with_child(mut self, child: InstanceDeclaration) -> Self {
        self.children.push(child);
        self
    }
}

/// An ObjectType or VariableType and its instance declarations.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDefinition {
    pub browse_name: QualifiedName,
    pub node_class: NodeClass,
    pub supertype: NodeId,
    pub is_abstract: bool,
    /// Default value for VariableType instances.
    pub default_value: Variant,
    pub declarations: Vec<InstanceDeclaration>,
}

impl TypeDefinition {
    pub fn object_type(namespace: u16, name: &str) -> Self {
        TypeDefinition {
            browse_name: QualifiedName::new(namespace, name),
            node_class: NodeClass::ObjectType,
            supertype: ids::base_object_type(),
            is_abstract: false,
            default_value: Variant::Empty,
            declarations: Vec::new(),
        }
    }

    pub fn variable_type(namespace: u16, name: &str, default_value: impl Into<Variant>) -> Self {
        TypeDefinition {
            browse_name: QualifiedName::new(namespace, name),
            node_class: NodeClass::VariableType,
            supertype: ids::base_data_variable_type(),
            is_abstract: false,
            default_value: default_value.into(),
            declarations: Vec::new(),
        }
    }

    pub fn subtype_of(mut self, supertype: NodeId) -> Self {
        self.supertype = supertype;
        self
    }

    pub fn with(mut self, declaration: InstanceDeclaration) -> Self {
        self.declarations.push(declaration);
        self
    }
}

/// Copy policy for instantiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstantiateOptions {
    pub include_optional: bool,
}

impl Default for InstantiateOptions {
    fn default() -> Self {
        InstantiateOptions {
            include_optional: true,
        }
    }
}

/// Registers types and instantiates them into the NodeStore.
pub struct TypeSystem {
    store: Arc<NodeStore>,
    definitions: DashMap<NodeId, TypeDefinition>,
    defaults: InstantiateOptions,
}

impl TypeSystem {
    pub fn new(store: Arc<NodeStore>, defaults: InstantiateOptions) -> Self {
        TypeSystem {
            store,
            definitions: DashMap::new(),
            defaults,
        }
    }

    pub fn definition(&self, type_id: &NodeId) -> Option<TypeDefinition> {
        self.definitions.get(type_id).map(|d| d.value().clone())
    }

    /// Creates the type node below its supertype, mirrors its declarations as child nodes
    /// (so clients can browse them) and remembers the definition for instantiation.
    pub fn register_type(&self, definition: TypeDefinition) -> ServiceResult<NodeId> {
        let super_class = self
            .store
            .node_class(&definition.supertype)
            .ok_or_else(|| ServiceError::NodeNotFound(definition.supertype.clone()))?;
        if super_class != definition.node_class {
            return Err(ServiceError::TypeMismatch(format!(
                "{} cannot derive from a {:?}",
                definition.browse_name, super_class
            )));
        }
        let attributes = match definition.node_class {
            NodeClass::ObjectType => NodeAttributes::ObjectType {
                is_abstract: definition.is_abstract,
            },
            NodeClass::VariableType => {
                let template = VariableAttributes::from_value(definition.default_value.clone());
                NodeAttributes::VariableType {
                    data_type: template.data_type,
                    value_rank: template.value_rank,
                    value: definition.default_value.clone(),
                    is_abstract: definition.is_abstract,
                }
            }
            other => {
                return Err(ServiceError::InvalidArgument(format!(
                    "{:?} is not a type node class",
                    other
                )))
            }
        };
        let type_id = self.store.add_node(
            &definition.supertype,
            &ids::has_subtype(),
            definition.browse_name.clone(),
            attributes,
        )?;
        for declaration in &definition.declarations {
            self.materialize_declaration(&type_id, declaration)?;
        }
        info!(
            "Registered type {} as {} ({} declarations)",
            definition.browse_name,
            type_id,
            definition.declarations.len()
        );
        self.definitions.insert(type_id.clone(), definition);
        Ok(type_id)
    }

    fn materialize_declaration(
        &self,
        parent: &NodeId,
        declaration: &InstanceDeclaration,
    ) -> ServiceResult<NodeId> {
        let id = self.create_node(parent, declaration)?;
        if let Some(rule) = declaration.modelling_rule.node_id() {
            self.store
                .add_reference(&id, &ids::has_modelling_rule(), &rule, true)?;
        }
        for child in &declaration.children {
            self.materialize_declaration(&id, child)?;
        }
        Ok(id)
    }

    /// Creates the concrete node for one declaration under `parent`, without children.
    fn create_node(&self, parent: &NodeId, declaration: &InstanceDeclaration) -> ServiceResult<NodeId> {
        match &declaration.kind {
            DeclarationKind::Object { type_definition } => {
                let id = self.store.add_node(
                    parent,
                    &ids::has_component(),
                    declaration.browse_name.clone(),
                    NodeAttributes::object(),
                )?;
                let type_definition = type_definition.clone().unwrap_or_else(ids::base_object_type);
                self.store
                    .add_reference(&id, &ids::has_type_definition(), &type_definition, true)?;
                Ok(id)
            }
            DeclarationKind::Variable {
                value,
                data_type,
                value_rank,
                access_level,
                is_property,
            } => {
                let (reference, type_definition) = if *is_property {
                    (ids::has_property(), ids::property_type())
                } else {
                    (ids::has_component(), ids::base_data_variable_type())
                };
                let id = self.store.add_node(
                    parent,
                    &reference,
                    declaration.browse_name.clone(),
                    NodeAttributes::Variable(VariableAttributes {
                        data_type: *data_type,
                        value_rank: *value_rank,
                        access_level: *access_level,
                        minimum_sampling_interval: 0.0,
                        historizing: false,
                        value: DataValue::new_now(value.clone()),
                    }),
                )?;
                self.store
                    .add_reference(&id, &ids::has_type_definition(), &type_definition, true)?;
                Ok(id)
            }
        }
    }

    /// Declarations of a type including everything inherited from registered ancestors.
    /// Base declarations come first; a closer ancestor replaces a same-named one.
    pub fn effective_declarations(&self, type_id: &NodeId) -> Vec<InstanceDeclaration> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(type_id.clone());
        while let Some(id) = current.take() {
            if !seen.insert(id.clone()) {
                break;
            }
            if let Some(definition) = self.definition(&id) {
                current = Some(definition.supertype.clone());
                chain.push(definition);
            }
        }

        let mut merged: Vec<InstanceDeclaration> = Vec::new();
        for definition in chain.into_iter().rev() {
            for declaration in definition.declarations {
                override_or_push(&mut merged, declaration);
            }
        }
        merged
    }

    /// Instantiates with the configured copy policy.
    pub fn instantiate(
        &self,
        type_id: &NodeId,
        parent: &NodeId,
        browse_name: QualifiedName,
    ) -> ServiceResult<NodeId> {
        self.instantiate_with(type_id, parent, browse_name, self.defaults)
    }

    /// Creates a concrete object (or variable, for a VariableType) under `parent` and deep-copies
    /// every Mandatory and, per `options`, Optional declaration with fresh NodeIds.
    pub fn instantiate_with(
        &self,
        type_id: &NodeId,
        parent: &NodeId,
        browse_name: QualifiedName,
        options: InstantiateOptions,
    ) -> ServiceResult<NodeId> {
        let type_node = self
            .store
            .get_node(type_id)
            .ok_or_else(|| ServiceError::NodeNotFound(type_id.clone()))?;
        let attributes = match &type_node.attributes {
            NodeAttributes::ObjectType { is_abstract: false } => NodeAttributes::object(),
            NodeAttributes::VariableType {
                data_type,
                value_rank,
                value,
                is_abstract: false,
            } => NodeAttributes::Variable(VariableAttributes {
                data_type: *data_type,
                value_rank: *value_rank,
                access_level: AccessLevel::CURRENT_READ,
                minimum_sampling_interval: 0.0,
                historizing: false,
                value: DataValue::new_now(value.clone()),
            }),
            NodeAttributes::ObjectType { is_abstract: true }
            | NodeAttributes::VariableType { is_abstract: true, .. } => {
                return Err(ServiceError::InvalidArgument(format!(
                    "type {} is abstract",
                    type_id
                )))
            }
            _ => {
                return Err(ServiceError::InvalidArgument(format!(
                    "{} is not an ObjectType or VariableType",
                    type_id
                )))
            }
        };

        let reference = self.store.child_reference(parent);
        let instance = self
            .store
            .add_node(parent, &reference, browse_name.clone(), attributes)?;
        self.store
            .add_reference(&instance, &ids::has_type_definition(), type_id, true)?;

        let mut copied = 0;
        for declaration in self.effective_declarations(type_id) {
            copied += self.copy_declaration(&instance, &declaration, options)?;
        }
        info!(
            "Instantiated {} as {} '{}' ({} nodes copied)",
            type_node.browse_name, instance, browse_name, copied
        );
        Ok(instance)
    }

    fn copy_declaration(
        &self,
        parent: &NodeId,
        declaration: &InstanceDeclaration,
        options: InstantiateOptions,
    ) -> ServiceResult<usize> {
        match declaration.modelling_rule {
            ModellingRule::None => return Ok(0),
            ModellingRule::Optional if !options.include_optional => {
                debug!("Skipping optional declaration {}", declaration.browse_name);
                return Ok(0);
            }
            _ => {}
        }
        let id = self.create_node(parent, declaration)?;

        // Children of an object declaration: those of its own type, overridden by inline ones.
        let mut children = match &declaration.kind {
            DeclarationKind::Object {
                type_definition: Some(type_definition),
            } => self.effective_declarations(type_definition),
            _ => Vec::new(),
        };
        for child in &declaration.children {
            override_or_push(&mut children, child.clone());
        }

        let mut copied = 1;
        for child in &children {
            copied += self.copy_declaration(&id, child, options)?;
        }
        Ok(copied)
    }
}

fn override_or_push(list: &mut Vec<InstanceDeclaration>, declaration: InstanceDeclaration) {
    match list
        .iter_mut()
        .find(|d| d.browse_name == declaration.browse_name)
    {
        Some(existing) => *existing = declaration,
        None => list.push(declaration),
    }
}
