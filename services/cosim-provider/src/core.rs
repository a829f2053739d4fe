//! Directory + spawner logic for the slave-provider (spec.md §4.7),
//! grounded on `services/authenticator`'s `Authenticator`: a small struct
//! that owns a lookup table loaded once at startup and logs every request
//! through `cosim_support::logging`, kept separate from the reactor/socket
//! plumbing in `network.rs` exactly as `cosim_slave::core`/`network` split.

use cosim_proto::model::SlaveTypeDescription;
use cosim_support::logging::{self, Logger};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::TcpListener;
use std::process::{Child, Command};

/// One entry in the provider's directory: a slave type's description plus
/// the command used to spawn a fresh instance of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaveTypeEntry {
    pub description: SlaveTypeDescription,
    pub spawn_command: String,
    /// Arguments passed to `spawn_command`. `{control_addr}` and
    /// `{instance_name}` are substituted at instantiation time.
    pub spawn_args: Vec<String>,
}

/// A loaded provider directory, matching one `cosim-provider-runner`
/// scenario file (`serdeconv`, TOML).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub listen_addr: String,
    pub slave_types: Vec<SlaveTypeEntry>,
}

/// Owns the directory and every child process spawned so far.
/// `Instantiate` never hosts the `Instance` itself — it only spawns the
/// slave type's own executable and hands back the control endpoint it will
/// bind, preserving the ownership split of §3.
pub struct ProviderCore {
    slave_types: HashMap<String, SlaveTypeEntry>,
    children: Vec<Child>,
    log: Logger,
}

impl ProviderCore {
    pub fn new(config: ProviderConfig, log: Logger) -> ProviderCore {
        let slave_types = config
            .slave_types
            .into_iter()
            .map(|entry| (entry.description.uuid.clone(), entry))
            .collect();

        ProviderCore { slave_types, children: Vec::new(), log }
    }

    pub fn descriptions(&self) -> Vec<SlaveTypeDescription> {
        self.slave_types.values().map(|entry| entry.description.clone()).collect()
    }

    /// Picks an ephemeral loopback port, spawns `spawn_command` bound to it,
    /// and returns the `tcp://` endpoint the new slave agent will be
    /// listening on once it comes up. There is an unavoidable race between
    /// picking the port and the child binding it, same as `cosim-devutil`'s
    /// helpers — acceptable here since the provider is a thin directory
    /// service, not itself safety-critical.
    pub fn instantiate(&mut self, uuid: &str, instance_name: &str) -> Result<String, String> {
        let entry = match self.slave_types.get(uuid) {
            Some(entry) => entry,
            None => {
                logging::info!(self.log, "instantiate"; "result" => "unknown_type", "uuid" => uuid);
                return Err(format!("unknown slave type {}", uuid));
            }
        };

        let listener = TcpListener::bind("127.0.0.1:0").map_err(|err| err.to_string())?;
        let addr = listener.local_addr().map_err(|err| err.to_string())?;
        drop(listener);
        let control_endpoint = format!("tcp://{}", addr);

        let args: Vec<String> = entry
            .spawn_args
            .iter()
            .map(|arg| arg.replace("{control_addr}", &addr.to_string()).replace("{instance_name}", instance_name))
            .collect();

        match Command::new(&entry.spawn_command).args(&args).spawn() {
            Ok(child) => {
                logging::info!(
                    self.log, "instantiate";
                    "result" => "ok", "uuid" => uuid, "instance" => instance_name, "endpoint" => %control_endpoint
                );
                self.children.push(child);
                Ok(control_endpoint)
            }
            Err(err) => {
                logging::info!(self.log, "instantiate"; "result" => "spawn_failed", "uuid" => uuid, "error" => %err);
                Err(format!("failed to spawn slave type {}: {}", uuid, err))
            }
        }
    }

    /// Drops handles for children that have already exited, so a
    /// long-running provider doesn't accumulate zombie process entries.
    pub fn reap_finished(&mut self) {
        let mut index = 0;
        while index < self.children.len() {
            match self.children[index].try_wait() {
                Ok(Some(_)) => {
                    self.children.remove(index);
                }
                _ => index += 1,
            }
        }
    }
}
