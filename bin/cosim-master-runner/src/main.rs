//! Scenario-driven Execution Manager runner (spec.md §4.6): loads a TOML
//! scenario describing the slaves to admit and the step schedule to drive,
//! then runs an `ExecutionManager` through `Reconstitute` ->
//! `(Step, AcceptStep)*` -> `Terminate`. Grounded on `game/runner`'s
//! `gamerunner_config.rs` CLI-plus-`serdeconv` shape.

use clap::{App, Arg};
use cosim_master::{ExecutionError, ExecutionManager};
use cosim_proto::config::ScenarioConfig;
use cosim_proto::model::SlaveId;
use cosim_support::logging::{self, Logger};
use sloggers::types::Severity;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

type Completion = Rc<RefCell<Option<Result<(), ExecutionError>>>>;

fn drive_to_completion(manager: &mut ExecutionManager, done: &Completion) -> Result<(), ExecutionError> {
    while done.borrow().is_none() {
        manager.run_once();
    }
    done.borrow_mut().take().unwrap()
}

fn main() {
    let matches = App::new("Co-simulation Execution Manager")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Runs a co-simulation scenario to completion.")
        .arg(Arg::with_name("SCENARIO_FILE").help("Path to the scenario TOML file").required(true))
        .arg(Arg::with_name("verbose").short("v").long("verbose").help("Enable debug logging"))
        .get_matches();

    let scenario_path = matches.value_of("SCENARIO_FILE").unwrap();
    let level = if matches.is_present("verbose") { Severity::Debug } else { Severity::Info };
    let log: Logger = logging::init_terminal(level);

    let scenario: ScenarioConfig = serdeconv::from_toml_file(scenario_path).expect("Error loading scenario configuration file");

    logging::info!(
        log, "starting execution manager";
        "execution" => &scenario.options.execution_name, "slaves" => scenario.slaves.len()
    );

    let mut manager = ExecutionManager::new(scenario.options.clone(), log.new(logging::o!("component" => "execution-manager")))
        .expect("failed to bind execution manager reactor");

    let slave_ids: Rc<RefCell<HashMap<String, SlaveId>>> = Rc::new(RefCell::new(HashMap::new()));
    let slave_ids_clone = slave_ids.clone();
    let reconstitute_log = log.clone();
    let on_per_slave = Rc::new(RefCell::new(move |name: &str, outcome: Result<SlaveId, ExecutionError>| match outcome {
        Ok(id) => {
            logging::info!(reconstitute_log, "slave admitted"; "name" => name, "slave_id" => id.0);
            slave_ids_clone.borrow_mut().insert(name.to_string(), id);
        }
        Err(err) => logging::error!(reconstitute_log, "slave admission failed"; "name" => name, "error" => %err),
    }));

    let targets = scenario.slaves.iter().map(|slave| (slave.name.clone(), slave.control_endpoint.clone())).collect();

    let reconstitute_done: Completion = Rc::new(RefCell::new(None));
    let reconstitute_done_clone = reconstitute_done.clone();
    manager.reconstitute(
        targets,
        scenario.comm_timeout_ms,
        on_per_slave,
        Box::new(move |result| *reconstitute_done_clone.borrow_mut() = Some(result)),
    );
    drive_to_completion(&mut manager, &reconstitute_done).expect("reconstitute failed");

    let per_slave_log = log.clone();
    let on_slave_outcome = Rc::new(RefCell::new(move |name: &str, outcome: Result<SlaveId, ExecutionError>| {
        if let Err(err) = outcome {
            logging::warn!(per_slave_log, "slave reported a failure"; "name" => name, "error" => %err);
        }
    }));

    while manager.core().borrow().current_t() < scenario.options.stop_time {
        let step_done: Completion = Rc::new(RefCell::new(None));
        let step_done_clone = step_done.clone();
        manager.step(
            scenario.step_size,
            scenario.comm_timeout_ms,
            Box::new(move |result| *step_done_clone.borrow_mut() = Some(result)),
            on_slave_outcome.clone(),
        );
        drive_to_completion(&mut manager, &step_done).expect("step failed");

        let accept_done: Completion = Rc::new(RefCell::new(None));
        let accept_done_clone = accept_done.clone();
        manager.accept_step(
            scenario.comm_timeout_ms,
            Box::new(move |result| *accept_done_clone.borrow_mut() = Some(result)),
            on_slave_outcome.clone(),
        );
        drive_to_completion(&mut manager, &accept_done).expect("accept_step failed");

        logging::debug!(log, "completed step"; "current_t" => manager.core().borrow().current_t());
    }

    manager.terminate();
    logging::info!(log, "execution complete"; "final_t" => manager.core().borrow().current_t());
}
