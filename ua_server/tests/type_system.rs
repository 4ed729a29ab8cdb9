use std::sync::Arc;
use ua_server::address_space::{
    ids, AttributeId, BrowseDirection, NodeClass, NodeId, NodeStore, QualifiedName, Variant,
};
use ua_server::types::{
    InstanceDeclaration, InstantiateOptions, ModellingRule, TypeDefinition, TypeSystem,
};
use ua_server::ServiceError;

const NS: u16 = 2;

fn setup() -> (Arc<NodeStore>, TypeSystem) {
    let store = Arc::new(NodeStore::new());
    let types = TypeSystem::new(Arc::clone(&store), InstantiateOptions::default());
    (store, types)
}

fn qn(name: &str) -> QualifiedName {
    QualifiedName::new(NS, name)
}

fn value_of(store: &NodeStore, node_id: &NodeId) -> Variant {
    store
        .get_attribute(node_id, AttributeId::Value)
        .expect("variable should be readable")
        .value
}

fn pump_type() -> TypeDefinition {
    TypeDefinition::object_type(NS, "PumpType")
        .with(InstanceDeclaration::variable(NS, "Flow", 0.0, ModellingRule::Mandatory))
        .with(InstanceDeclaration::property(NS, "Vendor", "ACME", ModellingRule::Mandatory))
        .with(InstanceDeclaration::variable(NS, "Diagnostics", 0i32, ModellingRule::Optional))
        .with(InstanceDeclaration::variable(NS, "Placeholder", 0i32, ModellingRule::None))
}

#[test]
fn instantiate_copies_declarations_by_modelling_rule() {
    let (store, types) = setup();
    let pump_type = types.register_type(pump_type()).unwrap();

    let pump = types
        .instantiate(&pump_type, &ids::objects_folder(), qn("Pump1"))
        .unwrap();
    assert_eq!(store.node_class(&pump), Some(NodeClass::Object));
    assert_eq!(store.type_definition_of(&pump), Some(pump_type.clone()));

    let flow = store.find_child(&pump, &qn("Flow")).expect("mandatory variable copied");
    assert_eq!(value_of(&store, &flow), Variant::Double(0.0));
    let vendor = store.find_child(&pump, &qn("Vendor")).expect("mandatory property copied");
    assert_eq!(store.type_definition_of(&vendor), Some(ids::property_type()));
    assert!(store.find_child(&pump, &qn("Diagnostics")).is_some());
    assert!(store.find_child(&pump, &qn("Placeholder")).is_none());

    let lean = types
        .instantiate_with(
            &pump_type,
            &ids::objects_folder(),
            qn("Pump2"),
            InstantiateOptions {
                include_optional: false,
            },
        )
        .unwrap();
    assert!(store.find_child(&lean, &qn("Flow")).is_some());
    assert!(store.find_child(&lean, &qn("Diagnostics")).is_none());
}

#[test]
fn type_node_exposes_its_declarations() {
    let (store, types) = setup();
    let pump_type = types.register_type(pump_type()).unwrap();

    assert!(store.is_subtype_of(&pump_type, &ids::base_object_type()));
    let diagnostics = store
        .find_child(&pump_type, &qn("Diagnostics"))
        .expect("declaration visible on the type");
    assert_eq!(
        store.find_targets(&diagnostics, &ids::has_modelling_rule(), BrowseDirection::Forward),
        vec![ids::modelling_rule_optional()]
    );
    let placeholder = store.find_child(&pump_type, &qn("Placeholder")).unwrap();
    assert!(store
        .find_targets(&placeholder, &ids::has_modelling_rule(), BrowseDirection::Forward)
        .is_empty());
}

#[test]
fn instances_get_fresh_node_ids() {
    let (store, types) = setup();
    let pump_type = types.register_type(pump_type()).unwrap();
    let declaration = store.find_child(&pump_type, &qn("Flow")).unwrap();

    let first = types
        .instantiate(&pump_type, &ids::objects_folder(), qn("Pump1"))
        .unwrap();
    let second = types
        .instantiate(&pump_type, &ids::objects_folder(), qn("Pump2"))
        .unwrap();
    let first_flow = store.find_child(&first, &qn("Flow")).unwrap();
    let second_flow = store.find_child(&second, &qn("Flow")).unwrap();

    assert_ne!(first, second);
    assert_ne!(first_flow, second_flow);
    assert_ne!(first_flow, declaration);
}

#[test]
fn instance_values_are_independent_of_the_type() {
    let (store, types) = setup();
    let pump_type = types.register_type(pump_type()).unwrap();
    let pump = types
        .instantiate(&pump_type, &ids::objects_folder(), qn("Pump1"))
        .unwrap();
    let flow = store.find_child(&pump, &qn("Flow")).unwrap();

    store
        .set_value_unchecked(&flow, ua_server::address_space::DataValue::new_now(12.5))
        .unwrap();
    let declaration = store.find_child(&pump_type, &qn("Flow")).unwrap();
    assert_eq!(value_of(&store, &declaration), Variant::Double(0.0));
    assert_eq!(value_of(&store, &flow), Variant::Double(12.5));
}

#[test]
fn subtypes_inherit_and_override_declarations() {
    let (store, types) = setup();
    let base = types
        .register_type(
            TypeDefinition::object_type(NS, "MotorType")
                .with(InstanceDeclaration::variable(NS, "Speed", 0.0, ModellingRule::Mandatory))
                .with(InstanceDeclaration::property(NS, "Model", "M0", ModellingRule::Mandatory)),
        )
        .unwrap();
    let servo = types
        .register_type(
            TypeDefinition::object_type(NS, "ServoType")
                .subtype_of(base.clone())
                .with(InstanceDeclaration::variable(NS, "Speed", 5.0, ModellingRule::Mandatory))
                .with(InstanceDeclaration::variable(NS, "Torque", 1.5, ModellingRule::Mandatory)),
        )
        .unwrap();
    assert!(store.is_subtype_of(&servo, &base));

    let motor = types
        .instantiate(&servo, &ids::objects_folder(), qn("Servo1"))
        .unwrap();
    let children = store
        .browse(&motor, Some(&ids::aggregates()), true, BrowseDirection::Forward)
        .unwrap();
    let speeds: Vec<_> = children
        .iter()
        .filter(|r| r.browse_name == qn("Speed"))
        .collect();
    assert_eq!(speeds.len(), 1);
    assert_eq!(value_of(&store, &speeds[0].node_id), Variant::Double(5.0));
    assert!(store.find_child(&motor, &qn("Model")).is_some());
    assert!(store.find_child(&motor, &qn("Torque")).is_some());
}

#[test]
fn nested_declarations_and_typed_children_are_copied() {
    let (store, types) = setup();
    let sensor_type = types
        .register_type(
            TypeDefinition::object_type(NS, "SensorType")
                .with(InstanceDeclaration::variable(NS, "Reading", 0.0, ModellingRule::Mandatory)),
        )
        .unwrap();
    let device_type = types
        .register_type(
            TypeDefinition::object_type(NS, "DeviceType")
                .with(
                    InstanceDeclaration::object(NS, "controller", ModellingRule::Mandatory).with_child(
                        InstanceDeclaration::property(NS, "state", "Idle", ModellingRule::Mandatory),
                    ),
                )
                .with(
                    InstanceDeclaration::object(NS, "thermocouple", ModellingRule::Mandatory)
                        .of_type(sensor_type.clone())
                        .with_child(
                            InstanceDeclaration::variable(NS, "Unit", "degC", ModellingRule::Mandatory),
                        ),
                ),
        )
        .unwrap();

    let device = types
        .instantiate(&device_type, &ids::objects_folder(), qn("Device1"))
        .unwrap();
    let state = store
        .browse_path(&device, &[qn("controller"), qn("state")])
        .unwrap();
    assert_eq!(value_of(&store, &state), Variant::from("Idle"));

    let thermocouple = store.find_child(&device, &qn("thermocouple")).unwrap();
    assert_eq!(store.type_definition_of(&thermocouple), Some(sensor_type));
    assert!(store.find_child(&thermocouple, &qn("Reading")).is_some());
    assert!(store.find_child(&thermocouple, &qn("Unit")).is_some());
}

#[test]
fn writable_declarations_stay_writable_on_instances() {
    let (store, types) = setup();
    let valve_type = types
        .register_type(
            TypeDefinition::object_type(NS, "ValveType").with(
                InstanceDeclaration::variable(NS, "Position", 0.0, ModellingRule::Mandatory)
                    .writable(),
            ),
        )
        .unwrap();
    let valve = types
        .instantiate(&valve_type, &ids::objects_folder(), qn("Valve1"))
        .unwrap();
    let position = store.find_child(&valve, &qn("Position")).unwrap();
    store.write_value(&position, 45.0).unwrap();
    assert_eq!(value_of(&store, &position), Variant::Double(45.0));
}

#[test]
fn abstract_types_cannot_be_instantiated() {
    let (_store, types) = setup();
    let mut definition = TypeDefinition::object_type(NS, "AbstractMachine");
    definition.is_abstract = true;
    let abstract_type = types.register_type(definition).unwrap();

    let err = types
        .instantiate(&abstract_type, &ids::objects_folder(), qn("Nope"))
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidArgument(_)));

    let err = types
        .instantiate(&ids::base_event_type(), &ids::objects_folder(), qn("Event"))
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidArgument(_)));
}

#[test]
fn instantiate_rejects_non_type_nodes() {
    let (_store, types) = setup();
    let err = types
        .instantiate(&ids::server(), &ids::objects_folder(), qn("Copy"))
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidArgument(_)));

    let missing = NodeId::numeric(NS, 5555);
    assert_eq!(
        types.instantiate(&missing, &ids::objects_folder(), qn("Ghost")),
        Err(ServiceError::NodeNotFound(missing))
    );
}

#[test]
fn supertype_must_match_node_class() {
    let (_store, types) = setup();
    let err = types
        .register_type(
            TypeDefinition::variable_type(NS, "Weird", 0.0).subtype_of(ids::base_object_type()),
        )
        .unwrap_err();
    assert!(matches!(err, ServiceError::TypeMismatch(_)));
}

#[test]
fn variable_types_instantiate_as_variables() {
    let (store, types) = setup();
    let setpoint_type = types
        .register_type(
            TypeDefinition::variable_type(NS, "SetpointType", 50.0)
                .with(InstanceDeclaration::property(NS, "EngineeringUnit", "%", ModellingRule::Mandatory)),
        )
        .unwrap();
    let machine = store.add_object(&ids::objects_folder(), NS, "Machine").unwrap();
    let setpoint = types.instantiate(&setpoint_type, &machine, qn("Setpoint")).unwrap();

    assert_eq!(store.node_class(&setpoint), Some(NodeClass::Variable));
    assert_eq!(value_of(&store, &setpoint), Variant::Double(50.0));
    assert!(store.find_child(&setpoint, &qn("EngineeringUnit")).is_some());
}
