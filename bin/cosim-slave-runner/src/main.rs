//! Hosts a single configured `Instance` as a Slave Agent (spec.md §4.5),
//! answering one Execution Manager's control connection until it sends
//! `TERMINATE`. Grounded on `game/runner`'s CLI shape. The "which
//! `Instance`" choice is the reference `LinearIntegrator` — this workspace
//! carries no other built-in slave type; a real deployment would plug in
//! an FMU-backed `Instance` here instead, and this binary is exactly the
//! executable `services/cosim-provider`'s `Instantiate` spawns.

use clap::{App, Arg};
use cosim_model::linear::LinearIntegrator;
use cosim_slave::SlaveAgent;
use cosim_support::logging::{self, Logger};
use sloggers::types::Severity;

fn main() {
    let matches = App::new("Co-simulation Slave Agent")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Hosts one slave instance and answers an Execution Manager's control connection.")
        .arg(Arg::with_name("CONTROL_ADDR").help("Address to bind the control listener on").required(true))
        .arg(Arg::with_name("NAME").help("Slave name reported at HELLO time").required(true))
        .arg(
            Arg::with_name("pub-addr")
                .long("pub-addr")
                .takes_value(true)
                .default_value("127.0.0.1:0")
                .help("Address to bind the PUB listener on"),
        )
        .arg(
            Arg::with_name("initial-y")
                .long("initial-y")
                .takes_value(true)
                .default_value("0.0")
                .help("Initial value of the integrator's output variable"),
        )
        .arg(Arg::with_name("a").short("a").takes_value(true).default_value("0.0").help("Coefficient of y in y' = a*y + b*u"))
        .arg(Arg::with_name("b").short("b").takes_value(true).default_value("0.0").help("Coefficient of u in y' = a*y + b*u"))
        .arg(Arg::with_name("verbose").short("v").long("verbose").help("Enable debug logging"))
        .get_matches();

    let control_addr = matches.value_of("CONTROL_ADDR").unwrap();
    let name = matches.value_of("NAME").unwrap().to_string();
    let pub_addr = matches.value_of("pub-addr").unwrap();
    let initial_y: f64 = matches.value_of("initial-y").unwrap().parse().expect("initial-y must be a number");
    let a: f64 = matches.value_of("a").unwrap().parse().expect("a must be a number");
    let b: f64 = matches.value_of("b").unwrap().parse().expect("b must be a number");

    let level = if matches.is_present("verbose") { Severity::Debug } else { Severity::Info };
    let log: Logger = logging::init_terminal(level);

    let instance = LinearIntegrator::new(initial_y, a, b);

    let mut agent =
        SlaveAgent::bind(control_addr, pub_addr, name.clone(), Box::new(instance), log.clone()).expect("failed to bind slave agent's listeners");

    logging::info!(
        log, "slave agent listening";
        "name" => &name, "control_endpoint" => agent.control_endpoint(), "pub_endpoint" => agent.pub_endpoint()
    );

    agent.run();

    logging::info!(log, "slave agent terminated"; "name" => &name);
}
