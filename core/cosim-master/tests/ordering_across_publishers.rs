//! S5: `sink` subscribes to two different publishers (`a` wired into
//! `VAR_U`, `b` wired into `VAR_A`) for the same step. Regardless of which
//! publisher's sample happens to arrive on the wire first, `sink`'s step-N
//! input map must contain both before it runs `DoStep(N)` — this is the
//! end-to-end counterpart of `VariableBus`'s
//! `barrier_completes_once_every_input_has_a_value` unit test.

use cosim_master::{ExecutionError, ExecutionManager};
use cosim_model::linear::{LinearIntegrator, VAR_A, VAR_U, VAR_Y};
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

fn pump_all(manager: &mut ExecutionManager, agents: &mut [&mut SlaveAgent], done: &dyn Fn() -> bool, budget: Duration) -> bool {
    let deadline = Instant::now() + budget;
    while !done() && Instant::now() < deadline {
        manager.run_once();
        for agent in agents.iter_mut() {
            agent.run_once();
        }
    }
    done()
}

#[test]
fn sink_collects_both_publishers_before_stepping_regardless_of_arrival_order() {
    let mut a = spawn_slave("a", LinearIntegrator::new(1.0, -0.5, 0.0));
    let mut b = spawn_slave("b", LinearIntegrator::new(2.0, -1.0, 0.0));
    let mut sink = spawn_slave("sink", LinearIntegrator::new(0.0, 0.0, 0.0));

    let a_control = a.control_endpoint().to_string();
    let b_control = b.control_endpoint().to_string();
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
        vec![("a".to_string(), a_control), ("b".to_string(), b_control), ("sink".to_string(), sink_control)],
        2_000,
        on_per_slave,
        Box::new(move |result| {
            result.expect("all three slaves admit cleanly");
            *reconstituted_clone.borrow_mut() = true;
        }),
    );
    let ok = pump_all(&mut manager, &mut [&mut a, &mut b, &mut sink], &|| *reconstituted.borrow(), Duration::from_secs(2));
    assert!(ok, "reconstitute did not complete in time");

    let a_id = slave_ids.borrow()["a"];
    let b_id = slave_ids.borrow()["b"];
    let sink_id = slave_ids.borrow()["sink"];

    let reconfigured = Rc::new(RefCell::new(false));
    let reconfigured_clone = reconfigured.clone();
    let no_op = Rc::new(RefCell::new(|_: &str, _: Result<SlaveId, ExecutionError>| {}));
    manager.reconfigure(
        vec![(
            sink_id,
            vec![
                VariableSetting::Connect(VariableConnection {
                    input: VAR_U,
                    source: VariableRef::new(a_id, VAR_Y),
                    source_endpoint: String::new(),
                }),
                VariableSetting::Connect(VariableConnection {
                    input: VAR_A,
                    source: VariableRef::new(b_id, VAR_Y),
                    source_endpoint: String::new(),
                }),
            ],
        )],
        2_000,
        no_op.clone(),
        Box::new(move |result| {
            result.expect("reconfigure wires both publishers into sink");
            *reconfigured_clone.borrow_mut() = true;
        }),
    );
    let ok = pump_all(&mut manager, &mut [&mut a, &mut b, &mut sink], &|| *reconfigured.borrow(), Duration::from_secs(2));
    assert!(ok, "reconfigure did not complete in time");

    let stepped = Rc::new(RefCell::new(false));
    let stepped_clone = stepped.clone();
    manager.step(
        0.1,
        2_000,
        Box::new(move |result| {
            result.expect("step completes once sink has collected both publishers' samples");
            *stepped_clone.borrow_mut() = true;
        }),
        no_op.clone(),
    );
    let ok = pump_all(&mut manager, &mut [&mut a, &mut b, &mut sink], &|| *stepped.borrow(), Duration::from_secs(2));
    assert!(ok, "step did not complete in time");

    let accepted = Rc::new(RefCell::new(false));
    let accepted_clone = accepted.clone();
    manager.accept_step(
        2_000,
        Box::new(move |result| {
            result.expect("accept_step completes");
            *accepted_clone.borrow_mut() = true;
        }),
        no_op,
    );
    let ok = pump_all(&mut manager, &mut [&mut a, &mut b, &mut sink], &|| *accepted.borrow(), Duration::from_secs(2));
    assert!(ok, "accept_step did not complete in time");

    let sink_core = sink.core().borrow();
    let u = sink_core.instance().get_real(VAR_U).unwrap();
    let received_a = sink_core.instance().get_real(VAR_A).unwrap();
    drop(sink_core);

    assert_ne!(u, 0.0, "sink's VAR_U should have been overwritten by a's published output");
    assert_ne!(received_a, 0.0, "sink's VAR_A should have been overwritten by b's published output, independent of wire arrival order");

    manager.terminate();
}
