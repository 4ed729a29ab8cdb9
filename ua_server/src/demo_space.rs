//! The example address space served by the binary: a `MyDevice` object type with one
//! instance, a hand-built `MachineOne` object with variables and methods, and an event
//! generator on the Server object.

use crate::address_space::node::{Argument, AttributeId};
use crate::address_space::node_id::{NodeId, QualifiedName};
use crate::address_space::references::ids;
use crate::address_space::variant::{DataType, DataValue, ValueRank, Variant};
use crate::error::{ServiceError, ServiceResult};
use crate::events::engine::EventGenerator;
use crate::methods::dispatcher::method_fn;
use crate::server::context::ServerContext;
use crate::types::type_system::{InstanceDeclaration, ModellingRule, TypeDefinition};
use chrono::Utc;
use tracing::info;

/// Handles to the nodes the binary and the tests poke at.
pub struct DemoSpace {
    pub namespace: u16,
    pub device_type: NodeId,
    pub folder: NodeId,
    pub compressor: NodeId,
    pub compressor_state: NodeId,
    pub machine: NodeId,
    pub temperature: NodeId,
    pub status: NodeId,
    pub date_time: NodeId,
    pub array: NodeId,
    pub uint: NodeId,
    pub strongly_typed: NodeId,
    pub machine_type: NodeId,
    pub is_even: NodeId,
    pub multiply: NodeId,
    pub event_generator: EventGenerator,
}

fn int_input(inputs: &[Variant], index: usize) -> ServiceResult<i64> {
    inputs
        .get(index)
        .and_then(Variant::as_i64)
        .ok_or_else(|| ServiceError::InvalidArgument(format!("argument {} is not an integer", index)))
}

pub fn build(server: &ServerContext) -> ServiceResult<DemoSpace> {
    let ns = server.register_namespace(&server.settings.server.product_namespace_uri)?;
    let store = &server.store;
    let objects = ids::objects_folder();

    let device_type = server.types.register_type(
        TypeDefinition::object_type(ns, "MyDevice")
            .with(InstanceDeclaration::variable(ns, "sensor1", 1.0, ModellingRule::Mandatory))
            .with(InstanceDeclaration::property(ns, "device_id", "0340", ModellingRule::Mandatory))
            .with(
                InstanceDeclaration::object(ns, "controller", ModellingRule::Mandatory).with_child(
                    InstanceDeclaration::property(ns, "state", "Idle", ModellingRule::Mandatory),
                ),
            ),
    )?;

    let folder = store.add_folder(&objects, ns, "myEmptyFolder")?;
    let compressor = server
        .types
        .instantiate(&device_type, &objects, QualifiedName::new(ns, "Compressor"))?;
    let compressor_state = store.browse_path(
        &compressor,
        &[QualifiedName::new(ns, "controller"), QualifiedName::new(ns, "state")],
    )?;

    let machine = store.add_object(&objects, ns, "MachineOne")?;
    let temperature = store.add_variable(&machine, ns, "Temperature", 6.7)?;
    store.set_writable(&temperature, true)?;
    let status = store.add_variable(&machine, ns, "Status", "Operational")?;
    store.set_writable(&status, true)?;
    let date_time = store.add_variable(&machine, ns, "MyDateTimeVar", Utc::now())?;
    store.set_writable(&date_time, true)?;
    let array = store.add_variable(&machine, ns, "myarrayvar", vec![6.7, 7.9])?;
    let uint = store.add_variable(&machine, ns, "myuintvar", 4u16)?;
    let strongly_typed = store.add_typed_variable(
        &machine,
        ns,
        "myStronglytTypedVariable",
        DataType::UInt32,
        ValueRank::ONE_DIMENSION,
        Variant::Array {
            element_type: DataType::UInt32,
            values: Vec::new(),
        },
    )?;
    store.set_writable(&array, true)?;
    let machine_type = store.add_property(&machine, ns, "Machine Type", "Compressor")?;

    let is_even = server.methods.add_method(
        &machine,
        ns,
        "mymethod",
        vec![Argument::scalar("value", DataType::Int64)],
        vec![Argument::scalar("is_even", DataType::Boolean)],
        method_fn(|_, inputs| {
            let value = int_input(&inputs, 0)?;
            Ok(vec![Variant::Boolean(value % 2 == 0)])
        }),
    )?;
    let multiply = server.methods.add_method(
        &machine,
        ns,
        "multiply",
        vec![
            Argument::scalar("x", DataType::Int64),
            Argument::scalar("y", DataType::Int64),
        ],
        vec![Argument::scalar("product", DataType::Int64)],
        method_fn(|_, inputs| {
            let (x, y) = (int_input(&inputs, 0)?, int_input(&inputs, 1)?);
            info!("multiply method call with parameters: {} {}", x, y);
            x.checked_mul(y)
                .map(|product| vec![Variant::Int64(product)])
                .ok_or_else(|| ServiceError::ExecutionError(format!("{} * {} overflows", x, y)))
        }),
    )?;

    let event_generator = server
        .events
        .generator(&ids::base_event_type(), &ids::server())?
        .with_severity(300);

    info!(
        "Demo address space ready in ns={} ({} nodes total)",
        ns,
        store.node_count()
    );
    Ok(DemoSpace {
        namespace: ns,
        device_type,
        folder,
        compressor,
        compressor_state,
        machine,
        temperature,
        status,
        date_time,
        array,
        uint,
        strongly_typed,
        machine_type,
        is_even,
        multiply,
        event_generator,
    })
}

impl DemoSpace {
    /// The writes the server performs once at startup.
    pub fn run_initial_writes(&self, server: &ServerContext) -> ServiceResult<()> {
        let store = &server.store;

        let mut current = store.get_attribute(&self.array, AttributeId::Value)?.value;
        if let Variant::Array { values, .. } = &mut current {
            values.push(Variant::Double(9.3));
        }
        store.write_value(&self.array, current)?;

        store.set_value_unchecked(&self.compressor_state, DataValue::new_now("Running"))?;
        self.event_generator.trigger("This is BaseEvent");
        store.set_value_unchecked(&self.temperature, DataValue::new_now(0.9))?;
        Ok(())
    }

    /// Value written by the periodic update loop at `seconds` since the epoch.
    pub fn temperature_at(seconds: f64) -> DataValue {
        DataValue::new_now(seconds.sin())
    }
}
