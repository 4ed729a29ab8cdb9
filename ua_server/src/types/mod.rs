pub mod type_system;

pub use type_system::{
    DeclarationKind, InstanceDeclaration, InstantiateOptions, ModellingRule, TypeDefinition,
    TypeSystem,
};
