//! # Chat Client Library
//!
//! Client-side implementation for the TCP chat relay. The client connects,
//! answers the server's name prompt, and from then on forwards terminal
//! input to the relay while printing everything the relay broadcasts.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! The transport-facing half: joining the chat (prompt detection plus the
//! name reply) over any async stream, so it can be unit-tested without a
//! real socket. The terminal wiring lives in the binary.

pub mod session;
