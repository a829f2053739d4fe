//! Runs a slave-provider directory service (spec.md §4.7) from a TOML
//! directory file listing the slave types it can spawn. Grounded on
//! `game/runner`'s CLI-plus-`serdeconv` shape.

use clap::{App, Arg};
use cosim_provider::{ProviderAgent, ProviderConfig};
use cosim_support::logging::{self, Logger};
use sloggers::types::Severity;

fn main() {
    let matches = App::new("Co-simulation Slave Provider")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Advertises a directory of slave types and spawns them on request.")
        .arg(Arg::with_name("CONFIG_FILE").help("Path to the provider directory TOML file").required(true))
        .arg(Arg::with_name("verbose").short("v").long("verbose").help("Enable debug logging"))
        .get_matches();

    let config_path = matches.value_of("CONFIG_FILE").unwrap();
    let level = if matches.is_present("verbose") { Severity::Debug } else { Severity::Info };
    let log: Logger = logging::init_terminal(level);

    let config: ProviderConfig = serdeconv::from_toml_file(config_path).expect("Error loading provider configuration file");
    let listen_addr = config.listen_addr.clone();

    let mut agent = ProviderAgent::bind(&listen_addr, config, log.new(logging::o!("component" => "provider")))
        .expect("failed to bind provider listener");

    logging::info!(log, "provider listening"; "endpoint" => agent.listen_endpoint());

    agent.run();
}
