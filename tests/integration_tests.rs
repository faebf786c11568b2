//! Integration tests for the chat relay
//!
//! These tests validate cross-component interactions over real TCP sockets:
//! the join handshake, history replay, broadcast fan-out, disconnect
//! notifications, and shutdown.

use server::network::{Server, ServerHandle};
use shared::NAME_PROMPT;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_test::assert_ok;

/// Upper bound on any single wait; generous so slow CI cannot flake these.
const DEADLINE: Duration = Duration::from_secs(5);

/// Long enough that consecutive writes land in different relay cycles.
const CYCLE_GAP: Duration = Duration::from_millis(100);

async fn start_relay(history: usize) -> (SocketAddr, ServerHandle, JoinHandle<()>) {
    let relay = Server::bind("127.0.0.1:0", "test room", history)
        .await
        .expect("failed to bind relay");
    let addr = relay.local_addr();
    let handle = relay.handle();
    let task = tokio::spawn(relay.run());
    (addr, handle, task)
}

/// Reads until the accumulated bytes contain `needle`, with a deadline.
async fn read_until(stream: &mut TcpStream, seen: &mut Vec<u8>, needle: &str) {
    let wait = timeout(DEADLINE, async {
        loop {
            if String::from_utf8_lossy(seen).contains(needle) {
                return;
            }
            let mut buf = [0u8; 2048];
            let n = stream.read(&mut buf).await.expect("read failed");
            assert!(
                n > 0,
                "connection closed while waiting for {:?}; got {:?}",
                needle,
                String::from_utf8_lossy(seen)
            );
            seen.extend_from_slice(&buf[..n]);
        }
    })
    .await;
    assert!(
        wait.is_ok(),
        "timed out waiting for {:?}; got {:?}",
        needle,
        String::from_utf8_lossy(seen)
    );
}

/// Connects and completes the join handshake under `name`.
async fn join(addr: SocketAddr, name: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.expect("connect failed");
    let mut seen = Vec::new();
    read_until(&mut stream, &mut seen, NAME_PROMPT).await;
    stream.write_all(name.as_bytes()).await.expect("send name");
    stream
}

fn index_of(haystack: &[u8], needle: &str) -> usize {
    let text = String::from_utf8_lossy(haystack).into_owned();
    text.find(needle)
        .unwrap_or_else(|| panic!("{:?} not found in {:?}", needle, text))
}

/// JOIN HANDSHAKE TESTS
mod handshake_tests {
    use super::*;

    /// The first joiner has no history to replay: the very first bytes it
    /// receives after naming itself are its own join announcement.
    #[tokio::test]
    async fn first_joiner_sees_empty_replay_then_join_broadcast() {
        let (addr, handle, task) = start_relay(10).await;

        let mut alice = join(addr, "Alice").await;
        let mut seen = Vec::new();
        read_until(&mut alice, &mut seen, "System : Alice has joined the chat.").await;

        let text = String::from_utf8_lossy(&seen);
        assert!(
            text.starts_with("System : Alice has joined the chat."),
            "expected no replay before the join broadcast, got {:?}",
            text
        );

        handle.shutdown();
        assert_ok!(timeout(DEADLINE, task).await);
    }

    /// A duplicate name is refused with nothing but a closed socket, and
    /// the incumbent keeps chatting undisturbed.
    #[tokio::test]
    async fn duplicate_name_is_closed_silently() {
        let (addr, handle, task) = start_relay(10).await;

        let mut alice = join(addr, "Alice").await;
        let mut alice_seen = Vec::new();
        read_until(&mut alice, &mut alice_seen, "Alice has joined").await;

        let mut impostor = join(addr, "Alice").await;
        let mut buf = [0u8; 2048];
        let n = timeout(DEADLINE, impostor.read(&mut buf))
            .await
            .expect("no closure observed")
            .expect("read failed");
        assert_eq!(n, 0, "impostor should see a silent close, not data");

        // The incumbent still works.
        alice.write_all(b"still here\n").await.unwrap();
        read_until(&mut alice, &mut alice_seen, "Alice: still here").await;

        handle.shutdown();
        assert_ok!(timeout(DEADLINE, task).await);
    }

    /// A second, distinctly named joiner is announced to everyone and gets
    /// the prior history replayed before its own announcement.
    #[tokio::test]
    async fn newcomer_gets_replay_and_everyone_gets_the_announcement() {
        let (addr, handle, task) = start_relay(10).await;

        let mut alice = join(addr, "Alice").await;
        let mut alice_seen = Vec::new();
        read_until(&mut alice, &mut alice_seen, "Alice has joined").await;

        let mut bob = join(addr, "Bob").await;
        let mut bob_seen = Vec::new();
        read_until(&mut bob, &mut bob_seen, "System : Bob has joined the chat.").await;

        // Bob's replay (Alice's join) precedes Bob's own announcement.
        let alice_joined = index_of(&bob_seen, "System : Alice has joined the chat.");
        let bob_joined = index_of(&bob_seen, "System : Bob has joined the chat.");
        assert!(alice_joined < bob_joined);

        // Alice hears about Bob too.
        read_until(&mut alice, &mut alice_seen, "System : Bob has joined the chat.").await;

        handle.shutdown();
        assert_ok!(timeout(DEADLINE, task).await);
    }

    /// The client library's session handshake interoperates with the relay.
    #[tokio::test]
    async fn client_session_completes_the_handshake() {
        let (addr, handle, task) = start_relay(10).await;

        let stream = TcpStream::connect(addr).await.expect("connect failed");
        let mut session = client::session::Session::new(stream, "Carol");
        assert_ok!(session.join().await);

        let mut stream = session.into_inner();
        let mut seen = Vec::new();
        read_until(&mut stream, &mut seen, "System : Carol has joined the chat.").await;

        handle.shutdown();
        assert_ok!(timeout(DEADLINE, task).await);
    }

    /// Only the most recent messages are replayed once the window is full.
    #[tokio::test]
    async fn replay_respects_the_history_capacity() {
        let (addr, handle, task) = start_relay(2).await;

        let mut alice = join(addr, "Alice").await;
        let mut alice_seen = Vec::new();
        read_until(&mut alice, &mut alice_seen, "Alice has joined").await;

        for text in ["m1\n", "m2\n", "m3\n"] {
            alice.write_all(text.as_bytes()).await.unwrap();
            sleep(CYCLE_GAP).await;
        }
        read_until(&mut alice, &mut alice_seen, "Alice: m3").await;

        // Window of 2: the join and m1 have been evicted by m2 and m3.
        let mut bob = join(addr, "Bob").await;
        let mut bob_seen = Vec::new();
        read_until(&mut bob, &mut bob_seen, "System : Bob has joined the chat.").await;

        let replay = String::from_utf8_lossy(&bob_seen);
        assert!(replay.contains("Alice: m2"));
        assert!(replay.contains("Alice: m3"));
        assert!(!replay.contains("Alice: m1"), "evicted entry replayed: {:?}", replay);
        assert!(!replay.contains("Alice has joined"));

        handle.shutdown();
        assert_ok!(timeout(DEADLINE, task).await);
    }
}

/// BROADCAST TESTS
mod broadcast_tests {
    use super::*;

    /// Messages reach every registered client in the order they were sent.
    #[tokio::test]
    async fn messages_fan_out_in_order() {
        let (addr, handle, task) = start_relay(10).await;

        let mut alice = join(addr, "Alice").await;
        let mut alice_seen = Vec::new();
        read_until(&mut alice, &mut alice_seen, "Alice has joined").await;

        let mut bob = join(addr, "Bob").await;
        let mut bob_seen = Vec::new();
        read_until(&mut bob, &mut bob_seen, "Bob has joined").await;

        alice.write_all(b"m1\n").await.unwrap();
        sleep(CYCLE_GAP).await;
        bob.write_all(b"m2\n").await.unwrap();
        sleep(CYCLE_GAP).await;
        alice.write_all(b"m3\n").await.unwrap();

        for (stream, seen) in [(&mut alice, &mut alice_seen), (&mut bob, &mut bob_seen)] {
            read_until(stream, seen, "Alice: m3").await;
            let first = index_of(seen, "Alice: m1");
            let second = index_of(seen, "Bob: m2");
            let third = index_of(seen, "Alice: m3");
            assert!(first < second && second < third);
        }

        handle.shutdown();
        assert_ok!(timeout(DEADLINE, task).await);
    }

    /// A client that disconnects is announced to the remaining clients
    /// under its display name.
    #[tokio::test]
    async fn departure_is_broadcast_to_the_rest() {
        let (addr, handle, task) = start_relay(10).await;

        let mut alice = join(addr, "Alice").await;
        let mut alice_seen = Vec::new();
        read_until(&mut alice, &mut alice_seen, "Alice has joined").await;

        let mut bob = join(addr, "Bob").await;
        let mut bob_seen = Vec::new();
        read_until(&mut bob, &mut bob_seen, "Bob has joined").await;

        drop(bob);
        read_until(&mut alice, &mut alice_seen, "System : Bob has left the chat.").await;

        handle.shutdown();
        assert_ok!(timeout(DEADLINE, task).await);
    }
}

/// SHUTDOWN TESTS
mod shutdown_tests {
    use super::*;

    /// Shutdown closes every registered connection and the loop returns.
    #[tokio::test]
    async fn shutdown_closes_clients_and_stops_the_loop() {
        let (addr, handle, task) = start_relay(10).await;

        let mut alice = join(addr, "Alice").await;
        let mut seen = Vec::new();
        read_until(&mut alice, &mut seen, "Alice has joined").await;

        handle.shutdown();
        assert_ok!(timeout(DEADLINE, task).await);

        // Drain whatever was in flight; the socket must then report EOF.
        let eof = timeout(DEADLINE, async {
            let mut buf = [0u8; 2048];
            loop {
                match alice.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(_) => continue,
                    Err(_) => break,
                }
            }
        })
        .await;
        assert!(eof.is_ok(), "connection not closed after shutdown");
    }
}
