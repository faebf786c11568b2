//! Connection tracking and display-name bookkeeping for the relay
//!
//! This module owns the server side of every registered client:
//! - Connection lifecycle (admission, eviction, shutdown teardown)
//! - Display-name uniqueness across all currently registered clients
//! - The non-blocking transport primitives the relay cycle polls with
//!
//! A connection enters the registry only after a successful join handshake
//! and leaves it exactly once, either through disconnect detection or
//! server shutdown.

use log::info;
use shared::BUFFER_SIZE;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpStream;

/// Identifies a registered connection for the lifetime of the process.
pub type ConnectionId = u64;

/// Why a registration attempt was refused.
///
/// A refused peer is closed without explanation; these variants exist for
/// the server's own logs and for callers that need to distinguish the two.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Another live connection already holds the requested name.
    #[error("display name \"{0}\" is already taken")]
    NameConflict(String),
    /// The candidate name was empty.
    #[error("display name must not be empty")]
    InvalidName,
}

/// Result of a read-readiness probe against one connection.
#[derive(Debug)]
pub enum Probe {
    /// The peer is quiet but alive.
    Idle,
    /// Bytes arrived and were staged for `take_inbound`.
    Data,
    /// The peer half-closed the connection (readable with zero bytes).
    Closed,
    /// A transport-level error. Treated as a disconnect, never propagated.
    Dead(io::Error),
}

/// One registered participant: the transport endpoint plus bookkeeping.
///
/// The remote address is kept for diagnostics only; the display name is the
/// identity everything user-visible goes by.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub name: String,
    pub addr: SocketAddr,
    stream: TcpStream,
    staged: Vec<u8>,
}

impl Connection {
    fn new(id: ConnectionId, name: String, addr: SocketAddr, stream: TcpStream) -> Self {
        Connection {
            id,
            name,
            addr,
            stream,
            staged: Vec::new(),
        }
    }

    /// Classifies the read side of the connection without losing input:
    /// bytes that happen to arrive are staged for `take_inbound`.
    pub fn probe(&mut self) -> Probe {
        let mut buf = [0u8; BUFFER_SIZE];
        match self.stream.try_read(&mut buf) {
            Ok(0) => Probe::Closed,
            Ok(n) => {
                self.staged.extend_from_slice(&buf[..n]);
                Probe::Data
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Probe::Idle,
            Err(e) => Probe::Dead(e),
        }
    }

    /// Drains everything currently readable: staged probe bytes plus any
    /// further data, until the socket would block. The result may span
    /// several logical lines or end mid-line; no framing is applied.
    pub fn take_inbound(&mut self) -> Vec<u8> {
        let mut data = std::mem::take(&mut self.staged);
        let mut buf = [0u8; BUFFER_SIZE];
        loop {
            match self.stream.try_read(&mut buf) {
                Ok(0) => break, // half-close; the next probe evicts us
                Ok(n) => data.extend_from_slice(&buf[..n]),
                Err(_) => break,
            }
        }
        data
    }

    /// Best-effort non-blocking write of one rendered message. The error is
    /// the caller's to log; eviction happens via the next probe.
    pub fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut written = 0;
        while written < bytes.len() {
            match self.stream.try_write(&bytes[written..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => written += n,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Tracks every registered connection and enforces name uniqueness.
///
/// Uniqueness is judged only among currently registered names; a name freed
/// by `unregister` is immediately reusable. Ids are sequential and never
/// recycled.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    next_id: ConnectionId,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        ConnectionRegistry {
            connections: HashMap::new(),
            next_id: 1,
        }
    }

    /// Admits a connection under `name`.
    ///
    /// Fails with `InvalidName` for an empty name and `NameConflict` when
    /// another live connection holds the name. On failure the stream is
    /// dropped, which closes the socket: a refused peer sees only the
    /// closure.
    pub fn register(
        &mut self,
        stream: TcpStream,
        addr: SocketAddr,
        name: &str,
    ) -> Result<ConnectionId, RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::InvalidName);
        }
        if self.connections.values().any(|c| c.name == name) {
            return Err(RegistryError::NameConflict(name.to_string()));
        }

        let id = self.next_id;
        self.next_id += 1;

        info!("{} is a messenger with the name {}", addr, name);
        self.connections
            .insert(id, Connection::new(id, name.to_string(), addr, stream));
        Ok(id)
    }

    /// Removes a connection and frees its name. Returns the connection if
    /// it was present; calling again for the same id is a no-op.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<Connection> {
        self.connections.remove(&id)
    }

    /// The display name associated with `id`, if it is registered.
    pub fn name_of(&self, id: ConnectionId) -> Option<&str> {
        self.connections.get(&id).map(|c| c.name.as_str())
    }

    /// Snapshot of the live ids taken at call time, so callers can evict
    /// entries while iterating.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Removes every connection, for shutdown teardown.
    pub fn drain(&mut self) -> Vec<Connection> {
        self.connections.drain().map(|(_, conn)| conn).collect()
    }
}
