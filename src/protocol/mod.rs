// (c) 2024 sendplz contributors

//! Protocol definitions
//!
#![allow(clippy::doc_markdown)]
//! # The sendplz protocol
//!
//! sendplz moves one item per connection: either the sender's clipboard text, or one file.
//! Everything runs over a [WebSocket] connection, which gives us ordered, reliable delivery
//! of discrete messages, each tagged as either _text_ or _binary_.
//!
//! 1. The _receiver_ listens on an address and port.
//! 1. The _sender_ opens a connection to `ws://host:port/<selector>` (or `wss://` for TLS).
//!    * The path component is the [`Selector`]. It is chosen at connect time and governs the
//!      whole connection; there is no in-band negotiation.
//! 1. The receiver authenticates the remote address, then dispatches on the selector.
//! 1. The sender transmits one of the two [message sequences](wire), then closes the connection.
//!
//! ## Clipboard sequence
//!
//! * S ➡️ R: one text message containing the entire clipboard.
//!
//! ## File sequence
//!
//! * S ➡️ R: one text message containing the file's base name
//! * S ➡️ R: zero or more binary messages, each a chunk of file data in order
//!    (chunk boundaries are not significant)
//! * S ➡️ R: one text message marking the end of the stream (the sender uses the empty string)
//!
//! The end-of-stream marker is recognised by its _message type_, never by its content,
//! so a zero-length binary chunk is never confused with it.
//!
//! There is no acknowledgement, handshake or version negotiation beyond the WebSocket handshake itself.
//! Malformed connections (for example, the first message being binary) are dropped by the receiver.
//!
//! [WebSocket]: <https://www.rfc-editor.org/rfc/rfc6455.html>

mod endpoint;
pub use endpoint::{Endpoint, Scheme};

mod selector;
pub use selector::Selector;

pub mod wire;

/// A single protocol message, as delivered by the transport.
///
/// The protocol distinguishes messages by framing type, so this is checked once per receive
/// rather than by inspecting payloads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// A UTF-8 text message
    Text(String),
    /// A binary message
    Binary(Vec<u8>),
}

impl Message {
    /// Short human-readable name for the message type, for logging
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Text(_) => "text",
            Message::Binary(_) => "binary",
        }
    }

    /// Payload length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Message::Text(t) => t.len(),
            Message::Binary(b) => b.len(),
        }
    }

    /// Is the payload empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} message ({} bytes)", self.kind(), self.len())
    }
}
