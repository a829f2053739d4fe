//! S1: admits two `LinearIntegrator` slaves, wires one's output into the
//! other's input, and drives a handful of real steps over loopback TCP
//! sockets end to end (Execution Manager <-> two Slave Agents), checking
//! that the connected value actually propagates and `current_t` advances.

use cosim_master::{ExecutionError, ExecutionManager};
use cosim_model::linear::{LinearIntegrator, VAR_U, VAR_Y};
use cosim_proto::config::ExecutionOptions;
use cosim_proto::model::{SlaveId, VariableConnection, VariableRef, VariableSetting};
use cosim_slave::SlaveAgent;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

fn spawn_slave(name: &str, instance: LinearIntegrator) -> SlaveAgent {
    let control_addr = cosim_devutil::free_tcp_addr().to_string();
    let pub_addr = cosim_devutil::free_tcp_addr().to_string();
    SlaveAgent::bind(&control_addr, &pub_addr, name.to_string(), Box::new(instance), cosim_support::logging::discard())
        .expect("slave agent binds its control and pub listeners")
}

/// Pumps all three reactors round-robin until `done` reports true or the
/// wall-clock budget runs out.
fn pump_until(manager: &mut ExecutionManager, source: &mut SlaveAgent, sink: &mut SlaveAgent, done: &dyn Fn() -> bool, budget: Duration) -> bool {
    let deadline = Instant::now() + budget;
    while !done() && Instant::now() < deadline {
        manager.run_once();
        source.run_once();
        sink.run_once();
    }
    done()
}

#[test]
fn two_slaves_wire_output_to_input_and_step_together() {
    let mut source = spawn_slave("source", LinearIntegrator::new(1.0, -0.5, 0.0));
    let mut sink = spawn_slave("sink", LinearIntegrator::new(0.0, 0.0, 1.0));

    let source_control = source.control_endpoint().to_string();
    let sink_control = sink.control_endpoint().to_string();

    let mut manager = ExecutionManager::new(ExecutionOptions::default(), cosim_support::logging::discard()).unwrap();

    let slave_ids: Rc<RefCell<HashMap<String, SlaveId>>> = Rc::new(RefCell::new(HashMap::new()));
    let slave_ids_clone = slave_ids.clone();
    let on_per_slave = Rc::new(RefCell::new(move |name: &str, outcome: Result<SlaveId, ExecutionError>| {
        if let Ok(id) = outcome {
            slave_ids_clone.borrow_mut().insert(name.to_string(), id);
        }
    }));

    let reconstituted = Rc::new(RefCell::new(false));
    let reconstituted_clone = reconstituted.clone();
    manager.reconstitute(
        vec![("source".to_string(), source_control), ("sink".to_string(), sink_control)],
        2_000,
        on_per_slave,
        Box::new(move |result| {
            result.expect("both slaves admit cleanly");
            *reconstituted_clone.borrow_mut() = true;
        }),
    );

    let ok = pump_until(&mut manager, &mut source, &mut sink, &|| *reconstituted.borrow(), Duration::from_secs(2));
    assert!(ok, "reconstitute did not complete in time");

    let source_id = slave_ids.borrow()["source"];
    let sink_id = slave_ids.borrow()["sink"];

    let reconfigured = Rc::new(RefCell::new(false));
    let reconfigured_clone = reconfigured.clone();
    let no_op = Rc::new(RefCell::new(|_: &str, _: Result<SlaveId, ExecutionError>| {}));
    manager.reconfigure(
        vec![(
            sink_id,
            vec![VariableSetting::Connect(VariableConnection {
                input: VAR_U,
                source: VariableRef::new(source_id, VAR_Y),
                source_endpoint: String::new(),
            })],
        )],
        2_000,
        no_op.clone(),
        Box::new(move |result| {
            result.expect("reconfigure succeeds against a known connect source");
            *reconfigured_clone.borrow_mut() = true;
        }),
    );

    let ok = pump_until(&mut manager, &mut source, &mut sink, &|| *reconfigured.borrow(), Duration::from_secs(2));
    assert!(ok, "reconfigure did not complete in time");

    for _ in 0..5 {
        let stepped = Rc::new(RefCell::new(false));
        let stepped_clone = stepped.clone();
        manager.step(
            0.1,
            2_000,
            Box::new(move |result| {
                result.expect("step completes once both slaves report in");
                *stepped_clone.borrow_mut() = true;
            }),
            no_op.clone(),
        );
        let ok = pump_until(&mut manager, &mut source, &mut sink, &|| *stepped.borrow(), Duration::from_secs(2));
        assert!(ok, "step did not complete in time");

        let accepted = Rc::new(RefCell::new(false));
        let accepted_clone = accepted.clone();
        manager.accept_step(
            2_000,
            Box::new(move |result| {
                result.expect("accept_step completes");
                *accepted_clone.borrow_mut() = true;
            }),
            no_op.clone(),
        );
        let ok = pump_until(&mut manager, &mut source, &mut sink, &|| *accepted.borrow(), Duration::from_secs(2));
        assert!(ok, "accept_step did not complete in time");
    }

    assert!((manager.core().borrow().current_t() - 0.5).abs() < 1e-9);

    let sink_core = sink.core().borrow();
    let u = sink_core.instance().get_real(VAR_U).unwrap();
    assert_ne!(u, 0.0, "sink's input should have been overwritten by the source's published output");
    assert!(u <= 1.0, "source's output only decays from its initial value of 1.0, got {}", u);
    drop(sink_core);

    manager.terminate();
}
