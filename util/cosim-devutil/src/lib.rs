//! Test-only helpers shared by `cosim-slave`'s and `cosim-master`'s
//! integration tests: picking free loopback ports and scratch directories
//! for scenario-file tests, mirroring the teacher's `server/util` binaries'
//! ad hoc `TcpListener::bind("127.0.0.1:0")` idiom, pulled out once three
//! different test suites needed the same trick.

use std::net::{SocketAddr, TcpListener};

/// Binds an ephemeral loopback TCP port and returns its resolved address as
/// a `tcp://host:port` string, then drops the listener so the caller's own
/// bind (e.g. `mio::net::TcpListener::bind`) can reuse the port. There is an
/// unavoidable race between the drop and the caller's bind; acceptable for
/// test use, never for production code.
pub fn free_tcp_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind ephemeral port");
    let addr = listener.local_addr().expect("bound listener always has a local address");
    format!("tcp://{}", addr)
}

pub fn free_tcp_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind ephemeral port");
    listener.local_addr().expect("bound listener always has a local address")
}

/// A scratch directory for tests that load scenario TOML files, deleted
/// when it drops.
pub struct ScratchDir(tempfile::TempDir);

impl ScratchDir {
    pub fn new() -> ScratchDir {
        ScratchDir(tempfile::tempdir().expect("failed to create scratch directory"))
    }

    pub fn path(&self) -> &std::path::Path {
        self.0.path()
    }

    pub fn write(&self, name: &str, contents: &str) -> std::path::PathBuf {
        let path = self.path().join(name);
        std::fs::write(&path, contents).expect("failed to write scratch file");
        path
    }
}

impl Default for ScratchDir {
    fn default() -> ScratchDir {
        ScratchDir::new()
    }
}
