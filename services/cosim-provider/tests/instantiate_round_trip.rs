//! Drives a real `ProviderAgent` over loopback TCP with a bare
//! `mio`-backed client connection (no reactor of its own, mirroring how
//! `cosim_master::network::SlaveConnHandler` talks to a slave agent):
//! asks for the directory, then instantiates the one configured slave type
//! and checks the returned endpoint looks like a real `tcp://` address.

use cosim_proto::model::{Causality, DataType, VariableDescription, VariableId, Variability, SlaveTypeDescription};
use cosim_proto::provider::{InstantiateBody, ProviderMessage, PROVIDER_PROTOCOL_VERSION};
use cosim_provider::{ProviderAgent, ProviderConfig, SlaveTypeEntry};
use mio::net::TcpStream;
use std::time::{Duration, Instant};

const UUID: &str = "00000000-0000-0000-0000-000000000001";

fn sample_entry() -> SlaveTypeEntry {
    SlaveTypeEntry {
        description: SlaveTypeDescription {
            name: "integrator".into(),
            uuid: UUID.to_string(),
            description: "".into(),
            author: "".into(),
            version: "1.0".into(),
            variables: vec![VariableDescription {
                id: VariableId(0),
                name: "y".into(),
                data_type: DataType::Real,
                causality: Causality::Output,
                variability: Variability::Continuous,
            }],
        },
        spawn_command: "true".to_string(),
        spawn_args: vec!["{control_addr}".to_string(), "{instance_name}".to_string()],
    }
}

/// Pumps the agent and reads from `client` until a full message arrives or
/// the budget runs out.
fn recv_one(agent: &mut ProviderAgent, client: &mut cosim_wire::Connection, budget: Duration) -> Option<cosim_wire::message::Message> {
    let deadline = Instant::now() + budget;
    while Instant::now() < deadline {
        agent.run_once();
        let _ = client.fill();
        if let Ok(Some(message)) = client.try_recv() {
            return Some(message);
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    None
}

#[test]
fn get_slave_types_then_instantiate_round_trip_over_tcp() {
    let listen_addr = cosim_devutil::free_tcp_addr().to_string();
    let config = ProviderConfig { listen_addr: listen_addr.clone(), slave_types: vec![sample_entry()] };

    let mut agent = ProviderAgent::bind(&listen_addr, config, cosim_support::logging::discard()).expect("provider agent binds its listener");

    let stream = TcpStream::connect(&listen_addr.parse().unwrap()).expect("loopback connect always succeeds immediately");
    let mut client = cosim_wire::Connection::new(stream);

    client.enqueue(&ProviderMessage::GetSlaveTypes.encode(PROVIDER_PROTOCOL_VERSION));
    let _ = client.flush();

    let message = recv_one(&mut agent, &mut client, Duration::from_secs(2)).expect("GetSlaveTypes reply arrives");
    let (_, reply) = ProviderMessage::decode(&message).unwrap();
    match reply {
        ProviderMessage::GetSlaveTypesOk(body) => {
            assert_eq!(body.slave_types.len(), 1);
            assert_eq!(body.slave_types[0].uuid, UUID);
        }
        other => panic!("expected GetSlaveTypesOk, got {:?}", other),
    }

    client.enqueue(&ProviderMessage::Instantiate(InstantiateBody {
        slave_type_uuid: UUID.to_string(),
        instance_name: "instance1".to_string(),
    })
    .encode(PROVIDER_PROTOCOL_VERSION));
    let _ = client.flush();

    let message = recv_one(&mut agent, &mut client, Duration::from_secs(2)).expect("Instantiate reply arrives");
    let (_, reply) = ProviderMessage::decode(&message).unwrap();
    match reply {
        ProviderMessage::InstantiateOk(body) => assert!(body.control_endpoint.starts_with("tcp://127.0.0.1:")),
        other => panic!("expected InstantiateOk, got {:?}", other),
    }
}

#[test]
fn instantiate_unknown_uuid_replies_with_instantiate_fail() {
    let listen_addr = cosim_devutil::free_tcp_addr().to_string();
    let config = ProviderConfig { listen_addr: listen_addr.clone(), slave_types: vec![] };

    let mut agent = ProviderAgent::bind(&listen_addr, config, cosim_support::logging::discard()).expect("provider agent binds its listener");

    let stream = TcpStream::connect(&listen_addr.parse().unwrap()).expect("loopback connect always succeeds immediately");
    let mut client = cosim_wire::Connection::new(stream);

    client.enqueue(&ProviderMessage::Instantiate(InstantiateBody {
        slave_type_uuid: "unknown".to_string(),
        instance_name: "instance1".to_string(),
    })
    .encode(PROVIDER_PROTOCOL_VERSION));
    let _ = client.flush();

    let message = recv_one(&mut agent, &mut client, Duration::from_secs(2)).expect("InstantiateFail reply arrives");
    let (_, reply) = ProviderMessage::decode(&message).unwrap();
    assert!(matches!(reply, ProviderMessage::InstantiateFail(_)));
}
