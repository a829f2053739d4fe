//! S2: three slaves are admitted; during `Step`, one of them (`slow`) is
//! simply never pumped, standing in for "a slave whose `do_step` hangs
//! past the deadline" without needing a real sleeping process. The
//! aggregate callback must fail with `Timeout`, the two responsive slaves
//! must be `STEPPED`, and the unresponsive one must be dropped as `Lost`.

use cosim_master::{ExecutionError, ExecutionManager, RecordPhase};
use cosim_model::linear::LinearIntegrator;
use cosim_proto::config::ExecutionOptions;
use cosim_proto::model::SlaveId;
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
        Box::new(LinearIntegrator::new(0.0, -0.1, 0.0)),
        cosim_support::logging::discard(),
    )
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
fn slave_that_never_replies_to_step_is_timed_out_and_lost() {
    let mut a = spawn_slave("a");
    let mut b = spawn_slave("b");
    let mut slow = spawn_slave("slow");

    let a_control = a.control_endpoint().to_string();
    let b_control = b.control_endpoint().to_string();
    let slow_control = slow.control_endpoint().to_string();

    let options = ExecutionOptions { variable_recv_timeout_ms: 200, ..ExecutionOptions::default() };
    let mut manager = ExecutionManager::new(options, cosim_support::logging::discard()).unwrap();

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
        vec![
            ("a".to_string(), a_control),
            ("b".to_string(), b_control),
            ("slow".to_string(), slow_control),
        ],
        2_000,
        on_per_slave,
        Box::new(move |result| {
            result.expect("all three slaves admit cleanly");
            *reconstituted_clone.borrow_mut() = true;
        }),
    );
    let ok = pump_all(&mut manager, &mut [&mut a, &mut b, &mut slow], &|| *reconstituted.borrow(), Duration::from_secs(2));
    assert!(ok, "reconstitute did not complete in time");

    let slow_id = slave_ids.borrow()["slow"];

    let step_result: Rc<RefCell<Option<Result<(), ExecutionError>>>> = Rc::new(RefCell::new(None));
    let step_result_clone = step_result.clone();
    let no_op = Rc::new(RefCell::new(|_: &str, _: Result<SlaveId, ExecutionError>| {}));
    manager.step(0.1, 200, Box::new(move |result| *step_result_clone.borrow_mut() = Some(result)), no_op);

    // Pump everything except `slow`: its STEP request sits unread on its
    // socket, exactly as if its `do_step` never returned.
    let ok = pump_all(&mut manager, &mut [&mut a, &mut b], &|| step_result.borrow().is_some(), Duration::from_secs(2));
    assert!(ok, "step's timeout never fired");

    let outcome = step_result.borrow_mut().take().unwrap();
    assert!(matches!(outcome, Err(ExecutionError::Timeout(_))), "expected Timeout, got {:?}", outcome);

    let core = manager.core().borrow();
    let a_id = slave_ids.borrow()["a"];
    let b_id = slave_ids.borrow()["b"];
    assert_eq!(core.record(a_id).unwrap().phase, RecordPhase::Stepped);
    assert_eq!(core.record(b_id).unwrap().phase, RecordPhase::Stepped);
    assert_eq!(core.record(slow_id).unwrap().phase, RecordPhase::Lost);
}
