//! # Chat Relay Server Library
//!
//! This library implements a minimal multi-client text-chat relay over raw
//! TCP. Clients connect, announce a display name, and exchange line-based
//! text messages that are broadcast to every currently connected client.
//!
//! ## Core Responsibilities
//!
//! ### Connection Management
//! Handles the complete lifecycle of client connections:
//! - Acceptance and the one-shot name-registration handshake
//! - Display-name uniqueness across all live connections
//! - Disconnect detection and eviction, announced to the remaining clients
//!
//! ### Message Fan-Out
//! Every message a client sends is attributed to its display name and
//! delivered to all registered clients in the order it was queued. Join
//! and leave events are broadcast the same way under the `System` label.
//!
//! ### Catch-Up Replay
//! A bounded, FIFO-evicted history buffer keeps the most recent broadcast
//! messages; a newly joined client receives its contents once, during the
//! handshake, as conversational context.
//!
//! ## Architecture Design
//!
//! ### Single Driving Task
//! One task drives the whole relay through a cooperative polling cycle:
//! admit a newcomer, evict dead connections, flush the outbound queue,
//! collect inbound bytes, yield. All shared state (registry, history,
//! outbound queue) is touched from that task only, so nothing needs a
//! lock and no per-connection failure can stop the loop.
//!
//! ### Off-Loop Handshakes
//! Accepting sockets and negotiating names happens in short-lived helper
//! tasks that communicate with the driving task exclusively over a
//! channel, so a slow or silent newcomer cannot stall the chat for
//! everyone else. Handshakes are bounded by a timeout.
//!
//! ## Module Organization
//!
//! - [`registry`] — connection tracking, name bookkeeping, and the
//!   non-blocking transport primitives the cycle polls with
//! - [`history`] — the bounded replay window for newcomers
//! - [`outbound`] — the pending-broadcast queue drained each cycle
//! - [`network`] — the `Server` itself: acceptor, handshake, relay cycle
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Bind the relay with a 10-message replay window.
//!     let server = Server::bind("0.0.0.0:5353", "Letta ChatRoom", 10).await?;
//!
//!     // Run until a handle requests shutdown.
//!     server.run().await;
//!     Ok(())
//! }
//! ```

pub mod history;
pub mod network;
pub mod outbound;
pub mod registry;
