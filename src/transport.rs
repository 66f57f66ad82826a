// (c) 2024 sendplz contributors
//! Message transport
//!
//! The protocol needs an ordered, reliable, message-oriented connection that can tell
//! text messages apart from binary ones. [`MessageChannel`] is that abstraction;
//! [`WsChannel`] implements it over a WebSocket.

use std::future::Future;

use anyhow::Context as _;
use futures_util::{SinkExt as _, StreamExt as _};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::{self, protocol::WebSocketConfig};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use crate::protocol::{Endpoint, Message, Selector};

/// How long we wait for the peer to acknowledge our close
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

const PEER_VANISHED: &str = "peer closed without closing handshake";

/// An ordered, reliable, bidirectional message connection.
pub trait MessageChannel: Send {
    /// Sends a single message
    fn send(&mut self, message: Message) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Receives the next message.
    ///
    /// Returns `Ok(None)` when the peer has closed the connection in an orderly fashion.
    fn recv(&mut self) -> impl Future<Output = anyhow::Result<Option<Message>>> + Send;

    /// Closes the connection gracefully, waiting (for a bounded time) for the peer to acknowledge.
    ///
    /// It is an error if the peer drops the connection instead of acknowledging.
    fn close(&mut self) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Websocket transport settings.
///
/// The protocol sends whole file chunks as single messages, so size limits are lifted.
#[must_use]
pub fn websocket_config() -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = None;
    config.max_frame_size = None;
    config
}

/// [`MessageChannel`] over a websocket
#[derive(Debug)]
pub struct WsChannel<S> {
    inner: WebSocketStream<S>,
    /// The peer's close frame has been received
    peer_closed: bool,
}

impl<S> From<WebSocketStream<S>> for WsChannel<S> {
    fn from(inner: WebSocketStream<S>) -> Self {
        Self {
            inner,
            peer_closed: false,
        }
    }
}

/// The type of channel a sender obtains from [`connect`]
pub type ClientChannel = WsChannel<MaybeTlsStream<TcpStream>>;

/// Opens a websocket connection to the given endpoint, selecting the given transfer kind.
pub async fn connect(endpoint: &Endpoint, selector: Selector) -> anyhow::Result<ClientChannel> {
    let uri = endpoint.uri(selector);
    debug!("connecting to {uri}");
    let (stream, response) =
        tokio_tungstenite::connect_async_with_config(uri.as_str(), Some(websocket_config()), true)
            .await
            .with_context(|| format!("failed to connect to {uri}"))?;
    trace!("handshake response status {}", response.status());
    Ok(stream.into())
}

/// Errors which mean the connection has already gone away in an orderly fashion
fn is_closed(e: &tungstenite::Error) -> bool {
    matches!(
        e,
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed
    )
}

impl<S> MessageChannel for WsChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, message: Message) -> anyhow::Result<()> {
        let message = match message {
            Message::Text(t) => tungstenite::Message::Text(t),
            Message::Binary(b) => tungstenite::Message::Binary(b),
        };
        self.inner
            .send(message)
            .await
            .context("failed to send message")
    }

    async fn recv(&mut self) -> anyhow::Result<Option<Message>> {
        loop {
            let Some(message) = self.inner.next().await else {
                return Ok(None);
            };
            match message {
                Ok(tungstenite::Message::Text(t)) => return Ok(Some(Message::Text(t))),
                Ok(tungstenite::Message::Binary(b)) => return Ok(Some(Message::Binary(b))),
                Ok(tungstenite::Message::Close(frame)) => {
                    trace!("peer closed: {frame:?}");
                    self.peer_closed = true;
                    return Ok(None);
                }
                // Control frames are answered by tungstenite itself
                Ok(
                    tungstenite::Message::Ping(_)
                    | tungstenite::Message::Pong(_)
                    | tungstenite::Message::Frame(_),
                ) => (),
                Err(e) if is_closed(&e) => {
                    self.peer_closed = true;
                    return Ok(None);
                }
                Err(e) => return Err(e).context("failed to receive message"),
            }
        }
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        match self.inner.close(None).await {
            Ok(()) => (),
            Err(e) if is_closed(&e) => return Ok(()),
            Err(e) => return Err(e).context("failed to close connection"),
        }
        if self.peer_closed {
            return Ok(());
        }
        // The closing handshake completes when the peer's close frame arrives.
        // Anything else ending the stream means the peer went away without it.
        let drain = async {
            while let Some(message) = self.inner.next().await {
                match message {
                    Ok(tungstenite::Message::Close(_)) => return Ok(()),
                    Ok(_) => (),
                    Err(e) if is_closed(&e) => break,
                    Err(e) => return Err(e).context(PEER_VANISHED),
                }
            }
            anyhow::bail!(PEER_VANISHED)
        };
        match timeout(CLOSE_TIMEOUT, drain).await {
            Ok(result) => {
                self.peer_closed = true;
                result
            }
            Err(_) => {
                debug!("peer did not acknowledge close");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_channel {
    //! In-memory channel for exercising the protocol without a network
    use std::collections::VecDeque;

    use super::MessageChannel;
    use crate::protocol::Message;

    /// Replays a script of inbound messages and records everything sent.
    ///
    /// When the script runs out the channel reports an orderly close,
    /// unless `fail_at_end` is set, in which case it reports a transport error,
    /// or `stall_at_end` is set, in which case it never delivers anything more.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedChannel {
        pub(crate) inbound: VecDeque<Message>,
        pub(crate) sent: Vec<Message>,
        pub(crate) received: usize,
        pub(crate) fail_at_end: bool,
        pub(crate) stall_at_end: bool,
        pub(crate) closed: bool,
    }

    impl ScriptedChannel {
        pub(crate) fn new(script: impl IntoIterator<Item = Message>) -> Self {
            Self {
                inbound: script.into_iter().collect(),
                ..Default::default()
            }
        }
        pub(crate) fn failing(script: impl IntoIterator<Item = Message>) -> Self {
            Self {
                fail_at_end: true,
                ..Self::new(script)
            }
        }
        pub(crate) fn stalling(script: impl IntoIterator<Item = Message>) -> Self {
            Self {
                stall_at_end: true,
                ..Self::new(script)
            }
        }
    }

    impl MessageChannel for ScriptedChannel {
        async fn send(&mut self, message: Message) -> anyhow::Result<()> {
            anyhow::ensure!(!self.closed, "channel closed");
            self.sent.push(message);
            Ok(())
        }

        async fn recv(&mut self) -> anyhow::Result<Option<Message>> {
            match self.inbound.pop_front() {
                Some(m) => {
                    self.received += 1;
                    Ok(Some(m))
                }
                None if self.fail_at_end => anyhow::bail!("connection reset"),
                None if self.stall_at_end => std::future::pending().await,
                None => Ok(None),
            }
        }

        async fn close(&mut self) -> anyhow::Result<()> {
            self.closed = true;
            Ok(())
        }
    }
}
