//! S3: `Reconfigure` with a `Connect` whose source names an unknown slave
//! fails the whole operation with `InputError` and never opens a SUB
//! connection to anyone.

use cosim_master::{ExecutionError, ExecutionManager};
use cosim_model::linear::{LinearIntegrator, VAR_U, VAR_Y};
use cosim_proto::config::ExecutionOptions;
use cosim_proto::model::{SlaveId, VariableConnection, VariableRef, VariableSetting};
use cosim_slave::SlaveAgent;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

fn spawn_slave(name: &str) -> SlaveAgent {
    let control_addr = cosim_devutil::free_tcp_addr().to_string();
    let pub_addr = cosim_devutil::free_tcp_addr().to_string();
    SlaveAgent::bind(
        &control_addr,
        &pub_addr,
        name.to_string(),
        Box::new(LinearIntegrator::new(0.0, 0.0, 0.0)),
        cosim_support::logging::discard(),
    )
    .expect("slave agent binds its control and pub listeners")
}

fn pump_until(manager: &mut ExecutionManager, slave: &mut SlaveAgent, done: &dyn Fn() -> bool, budget: Duration) -> bool {
    let deadline = Instant::now() + budget;
    while !done() && Instant::now() < deadline {
        manager.run_once();
        slave.run_once();
    }
    done()
}

#[test]
fn connect_to_unknown_slave_fails_reconfigure_without_opening_a_subscription() {
    let mut slave = spawn_slave("lonely");
    let control_endpoint = slave.control_endpoint().to_string();

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
        vec![("lonely".to_string(), control_endpoint)],
        2_000,
        on_per_slave,
        Box::new(move |result| {
            result.expect("the one slave admits cleanly");
            *reconstituted_clone.borrow_mut() = true;
        }),
    );
    let ok = pump_until(&mut manager, &mut slave, &|| *reconstituted.borrow(), Duration::from_secs(2));
    assert!(ok, "reconstitute did not complete in time");

    let lonely_id = slave_ids.borrow()["lonely"];

    let failed = Rc::new(RefCell::new(None));
    let failed_clone = failed.clone();
    let no_op = Rc::new(RefCell::new(|_: &str, _: Result<SlaveId, ExecutionError>| {}));
    manager.reconfigure(
        vec![(
            lonely_id,
            vec![VariableSetting::Connect(VariableConnection {
                input: VAR_U,
                source: VariableRef::new(SlaveId(99), VAR_Y),
                source_endpoint: String::new(),
            })],
        )],
        2_000,
        no_op,
        Box::new(move |result| {
            *failed_clone.borrow_mut() = Some(result);
        }),
    );
    let ok = pump_until(&mut manager, &mut slave, &|| failed.borrow().is_some(), Duration::from_secs(2));
    assert!(ok, "reconfigure did not complete in time");

    let outcome = failed.borrow_mut().take().unwrap();
    assert!(matches!(outcome, Err(ExecutionError::InputError(_))));

    // The setting was rejected before anything was sent over the wire, so
    // the slave's own bus never saw a Connect for VAR_U.
    let remote_peers = slave.core().borrow_mut().bus().remote_slaves().count();
    assert_eq!(remote_peers, 0, "no subscription should have been opened");
}
