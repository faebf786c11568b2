//! Server network layer: connection acceptance, the join handshake, and the
//! relay cycle that fans messages out to every registered client

use crate::history::ChatHistory;
use crate::outbound::OutboundQueue;
use crate::registry::{ConnectionRegistry, Probe};
use log::{debug, error, info, warn};
use shared::{candidate_name, ChatMessage, BUFFER_SIZE, NAME_PROMPT};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};

/// How long a newcomer may take to answer the name prompt before the
/// connection is dropped.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause between cycles when nothing happened, to avoid busy-spinning.
const IDLE_DELAY: Duration = Duration::from_millis(10);

/// A finished name negotiation waiting for the relay loop to admit it.
#[derive(Debug)]
struct JoinRequest {
    stream: TcpStream,
    addr: SocketAddr,
    name: String,
}

/// Requests shutdown of a running [`Server`] from outside its loop.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    running: Arc<watch::Sender<bool>>,
}

impl ServerHandle {
    /// Flips the running flag. The loop honors it at the next cycle
    /// boundary; a cycle in flight always finishes first.
    pub fn shutdown(&self) {
        let _ = self.running.send(false);
    }
}

/// A text-chat relay.
///
/// Accepts TCP clients, negotiates a unique display name with each, and
/// fans every line received from one client out to all of them. A single
/// task drives the whole relay through a cooperative polling cycle; the
/// registry, history buffer, and outbound queue are touched from that task
/// only, so none of them needs a lock.
pub struct Server {
    chat_name: String,
    local_addr: SocketAddr,
    listener: Option<TcpListener>,
    registry: ConnectionRegistry,
    history: ChatHistory,
    outbound: OutboundQueue,
    join_tx: mpsc::UnboundedSender<JoinRequest>,
    join_rx: mpsc::UnboundedReceiver<JoinRequest>,
    handle: ServerHandle,
    running: watch::Receiver<bool>,
}

impl Server {
    /// Binds the listening socket and prepares the relay. Nothing is
    /// accepted until [`Server::run`] starts the loop.
    pub async fn bind(
        addr: &str,
        chat_name: &str,
        history_capacity: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let (join_tx, join_rx) = mpsc::unbounded_channel();
        let (running_tx, running_rx) = watch::channel(true);

        Ok(Server {
            chat_name: chat_name.to_string(),
            local_addr,
            listener: Some(listener),
            registry: ConnectionRegistry::new(),
            history: ChatHistory::new(history_capacity),
            outbound: OutboundQueue::new(),
            join_tx,
            join_rx,
            handle: ServerHandle {
                running: Arc::new(running_tx),
            },
            running: running_rx,
        })
    }

    /// The address the listener actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A handle for requesting shutdown, cloneable and usable from any task.
    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Drives the relay until [`ServerHandle::shutdown`] is called.
    ///
    /// Each cycle admits at most one newcomer, evicts dead connections,
    /// flushes the outbound queue to everyone, collects fresh input, and
    /// then yields. Every failure is contained to the connection it
    /// happened on; the loop itself never stops early.
    pub async fn run(mut self) {
        info!(
            "Starting the \"{}\" chat relay on {}",
            self.chat_name, self.local_addr
        );

        if let Some(listener) = self.listener.take() {
            spawn_acceptor(listener, self.join_tx.clone(), self.running.clone());
        }

        while *self.running.borrow() {
            let mut progressed = false;
            progressed |= self.admit_joiner();
            progressed |= self.evict_disconnected();
            progressed |= self.flush_outbound();
            progressed |= self.collect_inbound();

            if progressed {
                // Keep the reactor breathing between back-to-back cycles.
                tokio::task::yield_now().await;
            } else {
                sleep(IDLE_DELAY).await;
            }
        }

        for conn in self.registry.drain() {
            debug!("closing {} ({})", conn.name, conn.addr);
        }
        info!("Server is shut down");
    }

    /// Accept phase: admit at most one completed handshake per cycle.
    ///
    /// Admission registers the connection, replays the history snapshot
    /// directly to it (bypassing the outbound queue), and queues the join
    /// announcement for everyone, the newcomer included.
    fn admit_joiner(&mut self) -> bool {
        let JoinRequest { stream, addr, name } = match self.join_rx.try_recv() {
            Ok(join) => join,
            Err(_) => return false,
        };

        let id = match self.registry.register(stream, addr, &name) {
            Ok(id) => id,
            Err(e) => {
                // Registration dropped the stream; the peer sees only the close.
                info!("refused {} from {}: {}", name, addr, e);
                return true;
            }
        };

        let mut replay = Vec::new();
        for message in self.history.snapshot() {
            replay.extend_from_slice(message.to_string().as_bytes());
        }
        if !replay.is_empty() {
            if let Some(conn) = self.registry.get_mut(id) {
                if let Err(e) = conn.send(&replay) {
                    warn!("failed to replay history to {}: {}", name, e);
                }
            }
        }

        let joined = ChatMessage::joined(&name);
        self.history.append(joined.clone());
        self.outbound.enqueue(joined);
        true
    }

    /// Disconnect phase: evict peers that half-closed or errored out, and
    /// announce each departure under the stored display name.
    fn evict_disconnected(&mut self) -> bool {
        let mut evicted = false;
        for id in self.registry.ids() {
            let gone = match self.registry.get_mut(id) {
                Some(conn) => match conn.probe() {
                    Probe::Idle | Probe::Data => false,
                    Probe::Closed => true,
                    Probe::Dead(e) => {
                        debug!("transport error on {}: {}", conn.addr, e);
                        true
                    }
                },
                None => false,
            };
            if !gone {
                continue;
            }
            if let Some(conn) = self.registry.unregister(id) {
                info!("Messenger {} has left", conn.name);
                let left = ChatMessage::left(&conn.name);
                self.history.append(left.clone());
                self.outbound.enqueue(left);
                evicted = true;
            }
        }
        evicted
    }

    /// Flush phase: deliver every queued message, in order, to every
    /// registered connection, then leave the queue empty. One failing
    /// write never aborts delivery to the rest; the failing peer is
    /// reaped by the next disconnect scan.
    fn flush_outbound(&mut self) -> bool {
        let pending = self.outbound.drain();
        if pending.is_empty() {
            return false;
        }

        let ids = self.registry.ids();
        for message in &pending {
            let bytes = message.to_string().into_bytes();
            for &id in &ids {
                if let Some(conn) = self.registry.get_mut(id) {
                    if let Err(e) = conn.send(&bytes) {
                        warn!("failed to send to {} ({}): {}", conn.name, conn.addr, e);
                    }
                }
            }
        }
        true
    }

    /// Inbound phase: turn whatever bytes each peer has ready into one
    /// message attributed to its display name. No framing is applied; a
    /// single read may hold several lines or a partial one.
    fn collect_inbound(&mut self) -> bool {
        let mut received = false;
        for id in self.registry.ids() {
            let (name, data) = match self.registry.get_mut(id) {
                Some(conn) => (conn.name.clone(), conn.take_inbound()),
                None => continue,
            };
            if data.is_empty() {
                continue;
            }

            let text = String::from_utf8_lossy(&data).into_owned();
            let message = ChatMessage::user(name, text);
            self.history.append(message.clone());
            self.outbound.enqueue(message);
            received = true;
        }
        received
    }
}

/// Spawns the task that accepts connections as they arrive and hands each
/// one to its own handshake task. Completed handshakes reach the relay
/// loop through the join channel.
fn spawn_acceptor(
    listener: TcpListener,
    join_tx: mpsc::UnboundedSender<JoinRequest>,
    mut running: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!("handling a new client from {}", addr);
                        tokio::spawn(negotiate(stream, addr, join_tx.clone()));
                    }
                    Err(e) => {
                        error!("failed to accept connection: {}", e);
                        sleep(Duration::from_millis(10)).await;
                    }
                },
                changed = running.changed() => {
                    if changed.is_err() || !*running.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("acceptor stopped");
    });
}

/// Runs the join handshake with one pending connection: prompt, a single
/// read, name extraction. Every failure (timeout, zero bytes, bad UTF-8,
/// blank name) ends in a silent close; the loop only ever sees successes.
async fn negotiate(
    mut stream: TcpStream,
    addr: SocketAddr,
    join_tx: mpsc::UnboundedSender<JoinRequest>,
) {
    let exchange = async {
        stream.write_all(NAME_PROMPT.as_bytes()).await?;
        let mut buf = [0u8; BUFFER_SIZE];
        let n = stream.read(&mut buf).await?;
        Ok::<Vec<u8>, std::io::Error>(buf[..n].to_vec())
    };

    let payload = match timeout(HANDSHAKE_TIMEOUT, exchange).await {
        Ok(Ok(payload)) if !payload.is_empty() => payload,
        Ok(Ok(_)) => {
            debug!("{} closed before sending a name", addr);
            return;
        }
        Ok(Err(e)) => {
            debug!("handshake with {} failed: {}", addr, e);
            return;
        }
        Err(_) => {
            debug!("{} took too long to pick a name", addr);
            return;
        }
    };

    let name = match std::str::from_utf8(&payload).ok().and_then(candidate_name) {
        Some(name) => name.to_string(),
        None => {
            debug!("{} sent an unusable name", addr);
            return;
        }
    };

    // If the relay is already gone, dropping the stream closes it.
    let _ = join_tx.send(JoinRequest { stream, addr, name });
}
