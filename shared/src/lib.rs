use std::fmt;

/// Prompt written to every new connection before it may take part in the
/// chat. Sent verbatim, with no trailing newline.
pub const NAME_PROMPT: &str = "Please Enter Your User Name:";

/// Sender label attached to synthetic join/leave notifications.
pub const SYSTEM_LABEL: &str = "System";

/// Read buffer size used on both ends of the wire (2 KiB).
pub const BUFFER_SIZE: usize = 2 * 1024;

/// Who produced a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sender {
    /// A registered participant, identified by display name.
    User(String),
    /// The relay itself, announcing joins and leaves.
    System,
}

impl Sender {
    pub fn label(&self) -> &str {
        match self {
            Sender::User(name) => name,
            Sender::System => SYSTEM_LABEL,
        }
    }
}

/// A single broadcast line: an immutable text body plus the label of
/// whoever produced it. Messages carry no identity beyond their content, so
/// duplicates are perfectly legal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender: Sender,
    pub body: String,
}

impl ChatMessage {
    /// A message typed by a participant. The body is taken as-is; whatever
    /// line endings the sender transmitted stay part of the text.
    pub fn user(name: impl Into<String>, text: impl Into<String>) -> Self {
        ChatMessage {
            sender: Sender::User(name.into()),
            body: text.into(),
        }
    }

    /// The join announcement broadcast when `name` enters the chat.
    pub fn joined(name: &str) -> Self {
        ChatMessage {
            sender: Sender::System,
            body: format!("{} has joined the chat.", name),
        }
    }

    /// The leave announcement broadcast when `name` drops off.
    pub fn left(name: &str) -> Self {
        ChatMessage {
            sender: Sender::System,
            body: format!("{} has left the chat.", name),
        }
    }
}

impl fmt::Display for ChatMessage {
    /// Renders the broadcast wire format. User messages read
    /// `"<name>: <text>"`; system notifications keep their historical
    /// `"System : <text>"` spacing.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sender {
            Sender::User(name) => write!(f, "{}: {}", name, self.body),
            Sender::System => write!(f, "{} : {}", SYSTEM_LABEL, self.body),
        }
    }
}

/// Extracts the candidate display name from a join-handshake payload.
///
/// Everything before the first `:` is the candidate; without a separator the
/// whole payload is. Bytes after the separator are discarded. The candidate
/// is trimmed of surrounding whitespace so line-mode clients (telnet, netcat)
/// can answer the prompt; `None` means nothing usable remained.
pub fn candidate_name(payload: &str) -> Option<&str> {
    let head = match payload.split_once(':') {
        Some((head, _)) => head,
        None => payload,
    };
    let name = head.trim();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
