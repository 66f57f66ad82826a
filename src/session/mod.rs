// (c) 2024 sendplz contributors
//! Receiver-side session state machine
//!
//! One [`Session`] handles exactly one accepted connection. It authenticates the remote
//! address, dispatches on the connection's [`Selector`], then consumes the inbound
//! [message sequence](crate::protocol::wire) for that selector, handing the payload to
//! its [`SessionHandler`].
//!
//! ```text
//! Connected → Authenticating → Rejected
//!                            → Dispatching → ReceivingClipboard → Closed
//!                                          → ReceivingFile      → Closed
//! ```
//!
//! An unknown selector goes straight from `Connected` to `Closed`.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context as _;
use human_repr::HumanDuration as _;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::protocol::{Message, Selector};
use crate::transport::MessageChannel;
use crate::util::io::sanitise_filename;

mod handler;
pub use handler::{FileSink, SessionHandler};

mod console;
pub use console::{ConsoleHandler, LocalFileSink, ReceiverSettings};

/// Where a [`Session`] is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum SessionState {
    /// Accepted, nothing done yet
    Connected,
    /// Waiting on the authentication hook
    Authenticating,
    /// The authentication hook said no (terminal)
    Rejected,
    /// Authenticated, about to act on the selector
    Dispatching,
    /// Reading a clipboard sequence
    ReceivingClipboard,
    /// Reading a file sequence
    ReceivingFile,
    /// Finished (terminal)
    Closed,
}

/// Something the remote sent that the protocol does not allow.
///
/// These are handled within the session and are not errors for the process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// A text message was required. `found` is the type of what arrived,
    /// or `None` if the connection closed first.
    ExpectedText {
        /// What the text message would have been
        expected: &'static str,
        /// What we got instead
        found: Option<&'static str>,
    },
    /// The filename had no usable final component
    InvalidFilename(String),
}

impl std::fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExpectedText {
                expected,
                found: Some(found),
            } => write!(f, "expected {expected} as a text message, got a {found} message"),
            Self::ExpectedText {
                expected,
                found: None,
            } => write!(f, "connection closed while waiting for {expected}"),
            Self::InvalidFilename(name) => write!(f, "unusable filename {name:?}"),
        }
    }
}

/// How a session ended, when it did not fail with an error
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The connection selector was not one we recognise; nothing was read
    UnknownSelector(String),
    /// Authentication refused; nothing was read
    Rejected,
    /// The remote broke protocol; the handler was told via `on_fatal`
    Malformed(ProtocolViolation),
    /// Clipboard text was delivered
    Clipboard {
        /// Length of the text in bytes
        bytes: usize,
    },
    /// File data was delivered
    File {
        /// The name the file was stored under
        filename: String,
        /// Payload bytes written
        bytes: u64,
        /// Whether the end of stream marker arrived.
        /// If not, the connection closed early and the file is partial.
        complete: bool,
    },
}

/// Per-connection receiver state machine
#[derive(Debug)]
pub struct Session<H> {
    remote: SocketAddr,
    handler: H,
    state: SessionState,
    authenticated: bool,
    idle_timeout: Option<Duration>,
}

impl<H: SessionHandler> Session<H> {
    /// Creates a session for a newly accepted connection
    #[must_use]
    pub fn new(handler: H, remote: SocketAddr) -> Self {
        Self {
            remote,
            handler,
            state: SessionState::Connected,
            authenticated: false,
            idle_timeout: None,
        }
    }

    /// Sets a limit on how long we wait for each message. `None` waits forever.
    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// The remote address, as captured at accept time
    #[must_use]
    pub fn remote_address(&self) -> SocketAddr {
        self.remote
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the authentication hook accepted this connection
    #[must_use]
    pub fn authenticated(&self) -> bool {
        self.authenticated
    }

    /// Read access to the handler
    #[must_use]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Consumes the session, returning its handler
    #[must_use]
    pub fn into_handler(self) -> H {
        self.handler
    }

    fn transition(&mut self, next: SessionState) {
        trace!("{} -> {next}", self.state);
        self.state = next;
    }

    /// Runs the state machine to completion over `channel`.
    ///
    /// `path` is the selector as presented by the remote at connect time.
    ///
    /// Protocol violations, rejection and unknown selectors are reported as a [`SessionOutcome`].
    /// Transport failures and handler (sink) failures are returned as errors.
    /// Either way the session is `Closed` afterwards, and any file sink that was opened has been closed.
    pub async fn run<C: MessageChannel>(
        &mut self,
        path: &str,
        channel: &mut C,
    ) -> anyhow::Result<SessionOutcome> {
        let result = self.drive(path, channel).await;
        if self.state != SessionState::Rejected {
            self.transition(SessionState::Closed);
        }
        result
    }

    async fn drive<C: MessageChannel>(
        &mut self,
        path: &str,
        channel: &mut C,
    ) -> anyhow::Result<SessionOutcome> {
        let Some(selector) = Selector::from_path(path) else {
            debug!("unknown selector {path:?}");
            return Ok(SessionOutcome::UnknownSelector(path.to_owned()));
        };

        self.transition(SessionState::Authenticating);
        if !self.handler.authenticate(self.remote) {
            self.transition(SessionState::Rejected);
            return Ok(SessionOutcome::Rejected);
        }
        self.authenticated = true;

        self.transition(SessionState::Dispatching);
        match selector {
            Selector::Clipboard => {
                self.transition(SessionState::ReceivingClipboard);
                self.receive_clipboard(channel).await
            }
            Selector::File => {
                self.transition(SessionState::ReceivingFile);
                self.receive_file(channel).await
            }
        }
    }

    fn malformed(&mut self, violation: ProtocolViolation) -> SessionOutcome {
        debug!("protocol violation: {violation}");
        self.handler.on_fatal(&violation);
        SessionOutcome::Malformed(violation)
    }

    async fn receive_clipboard<C: MessageChannel>(
        &mut self,
        channel: &mut C,
    ) -> anyhow::Result<SessionOutcome> {
        match next_message(channel, self.idle_timeout).await? {
            Some(Message::Text(text)) => {
                let bytes = text.len();
                self.handler.write_clipboard(text).await?;
                Ok(SessionOutcome::Clipboard { bytes })
            }
            other => Ok(self.malformed(ProtocolViolation::ExpectedText {
                expected: "clipboard",
                found: other.as_ref().map(Message::kind),
            })),
        }
    }

    async fn receive_file<C: MessageChannel>(
        &mut self,
        channel: &mut C,
    ) -> anyhow::Result<SessionOutcome> {
        let wire_name = match next_message(channel, self.idle_timeout).await? {
            Some(Message::Text(name)) => name,
            other => {
                return Ok(self.malformed(ProtocolViolation::ExpectedText {
                    expected: "filename",
                    found: other.as_ref().map(Message::kind),
                }))
            }
        };
        let Some(filename) = sanitise_filename(&wire_name).map(str::to_owned) else {
            return Ok(self.malformed(ProtocolViolation::InvalidFilename(wire_name)));
        };
        if filename != wire_name {
            debug!("remote sent {wire_name:?}, using {filename:?}");
        }

        // The protocol carries no size
        let mut sink = self
            .handler
            .open_file_sink(&filename, None)
            .await
            .with_context(|| format!("could not accept file {filename:?}"))?;
        let pumped = pump(channel, &mut sink, self.idle_timeout).await;
        let released = sink.close().await;
        let (bytes, complete) = pumped?;
        released?;
        Ok(SessionOutcome::File {
            filename,
            bytes,
            complete,
        })
    }
}

/// Receives the next message, subject to the idle timeout
async fn next_message<C: MessageChannel>(
    channel: &mut C,
    idle_timeout: Option<Duration>,
) -> anyhow::Result<Option<Message>> {
    match idle_timeout {
        None => channel.recv().await,
        Some(limit) => timeout(limit, channel.recv())
            .await
            .map_err(|_| anyhow::anyhow!("no message for {}", limit.human_duration()))?,
    }
}

/// Forwards binary chunks to the sink until a text message (end of stream) or the connection closes.
/// Returns the byte count, and whether the end of stream marker was seen.
async fn pump<C: MessageChannel, K: FileSink>(
    channel: &mut C,
    sink: &mut K,
    idle_timeout: Option<Duration>,
) -> anyhow::Result<(u64, bool)> {
    let mut total = 0u64;
    loop {
        match next_message(channel, idle_timeout).await? {
            Some(Message::Binary(chunk)) => {
                trace!("chunk of {} bytes", chunk.len());
                sink.write(&chunk).await?;
                total += chunk.len() as u64;
            }
            Some(Message::Text(_)) => return Ok((total, true)),
            None => {
                warn!("connection closed before end of file ({total} bytes received)");
                return Ok((total, false));
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_handler {
    //! A [`SessionHandler`] which records what happens to it
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    use super::{FileSink, ProtocolViolation, SessionHandler};

    /// Everything a [`RecordingHandler`] saw, shared with the test
    #[derive(Debug, Default)]
    pub(crate) struct Record {
        pub(crate) authenticated: Vec<SocketAddr>,
        pub(crate) clipboard: Vec<String>,
        pub(crate) opened: Vec<String>,
        pub(crate) chunks: Vec<Vec<u8>>,
        pub(crate) closed: usize,
        pub(crate) fatal: Vec<ProtocolViolation>,
    }

    impl Record {
        pub(crate) fn calls(&self) -> usize {
            self.authenticated.len()
                + self.clipboard.len()
                + self.opened.len()
                + self.chunks.len()
                + self.closed
                + self.fatal.len()
        }
    }

    #[derive(Debug, Clone)]
    pub(crate) struct RecordingHandler {
        pub(crate) accept: bool,
        pub(crate) refuse_open: bool,
        /// Sinks fail every write (e.g. disk full)
        pub(crate) fail_writes: bool,
        pub(crate) record: Arc<Mutex<Record>>,
    }

    impl Default for RecordingHandler {
        fn default() -> Self {
            Self {
                accept: true,
                refuse_open: false,
                fail_writes: false,
                record: Arc::default(),
            }
        }
    }

    impl RecordingHandler {
        pub(crate) fn record(&self) -> std::sync::MutexGuard<'_, Record> {
            self.record.lock().unwrap()
        }
    }

    #[derive(Debug)]
    pub(crate) struct RecordingSink {
        record: Arc<Mutex<Record>>,
        fail_writes: bool,
    }

    impl FileSink for RecordingSink {
        async fn write(&mut self, chunk: &[u8]) -> anyhow::Result<()> {
            anyhow::ensure!(!self.fail_writes, "no space left on device");
            self.record.lock().unwrap().chunks.push(chunk.to_vec());
            Ok(())
        }
        async fn close(self) -> anyhow::Result<()> {
            self.record.lock().unwrap().closed += 1;
            Ok(())
        }
    }

    impl SessionHandler for RecordingHandler {
        type Sink = RecordingSink;

        fn authenticate(&mut self, remote: SocketAddr) -> bool {
            self.record().authenticated.push(remote);
            self.accept
        }

        async fn write_clipboard(&mut self, text: String) -> anyhow::Result<()> {
            self.record().clipboard.push(text);
            Ok(())
        }

        async fn open_file_sink(
            &mut self,
            filename: &str,
            _estimated_size: Option<u64>,
        ) -> anyhow::Result<Self::Sink> {
            anyhow::ensure!(!self.refuse_open, "destination {filename} already exists");
            self.record().opened.push(filename.to_owned());
            Ok(RecordingSink {
                record: self.record.clone(),
                fail_writes: self.fail_writes,
            })
        }

        fn on_fatal(&mut self, reason: &ProtocolViolation) {
            self.record().fatal.push(reason.clone());
        }
    }
}
