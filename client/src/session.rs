//! Join-handshake logic, generic over the transport.

use log::debug;
use shared::{BUFFER_SIZE, NAME_PROMPT};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// A chat session in the joining state.
///
/// Wraps any async byte stream so the handshake can be exercised against
/// an in-memory duplex in tests and a `TcpStream` in the binary.
pub struct Session<S> {
    stream: S,
    name: String,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Session<S> {
    pub fn new(stream: S, name: impl Into<String>) -> Self {
        Session {
            stream,
            name: name.into(),
        }
    }

    /// Waits for the server's name prompt and answers it with our display
    /// name. The server sends no acknowledgement; a rejected name shows up
    /// as the connection simply closing.
    pub async fn join(&mut self) -> io::Result<()> {
        let mut seen = Vec::new();
        let mut buf = [0u8; BUFFER_SIZE];
        loop {
            if contains_prompt(&seen) {
                break;
            }
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "server closed before prompting for a name",
                ));
            }
            seen.extend_from_slice(&buf[..n]);
        }

        debug!("answering name prompt as {}", self.name);
        self.stream.write_all(self.name.as_bytes()).await
    }

    /// Hands back the underlying stream once the handshake is done.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

/// True once the accumulated bytes contain the server's name prompt.
pub fn contains_prompt(seen: &[u8]) -> bool {
    seen.windows(NAME_PROMPT.len())
        .any(|window| window == NAME_PROMPT.as_bytes())
}
