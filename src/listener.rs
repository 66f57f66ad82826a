// (c) 2024 sendplz contributors
//! Receiver accept loop

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tracing::{debug, error, info, info_span, trace, warn, Instrument as _};

use crate::session::{Session, SessionHandler, SessionOutcome};
use crate::transport::{websocket_config, MessageChannel as _, WsChannel};

/// Pause after a failed accept, so a persistent condition (e.g. out of file descriptors) doesn't spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts connections and runs one [`Session`] per connection
#[derive(Debug)]
pub struct Listener {
    socket: TcpListener,
    idle_timeout: Option<Duration>,
}

impl Listener {
    /// Binds to the given address
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> anyhow::Result<Self> {
        let socket = TcpListener::bind(addr)
            .await
            .context("failed to bind listening socket")?;
        Ok(Self {
            socket,
            idle_timeout: None,
        })
    }

    /// Sets the per-session idle timeout (see [`Session::with_idle_timeout`])
    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// The address we are listening on
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Accepts connections forever.
    ///
    /// `new_handler` is called once per connection to create that session's handler.
    /// Each session runs as its own task; an error or panic in one session is logged
    /// and does not affect the listener or other sessions.
    pub async fn run<H, F>(self, new_handler: F) -> anyhow::Result<()>
    where
        H: SessionHandler + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        info!("Listening on {}", self.local_addr()?);
        let new_handler = Arc::new(new_handler);
        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                accepted = self.socket.accept() => {
                    let (stream, remote) = match accepted {
                        Ok(a) => a,
                        Err(e) => {
                            warn!("failed to accept connection: {e}");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };
                    let new_handler = new_handler.clone();
                    let idle_timeout = self.idle_timeout;
                    let _ = tasks.spawn(
                        async move {
                            let handler = (*new_handler)();
                            handle_connection(stream, remote, handler, idle_timeout).await;
                        }
                        .instrument(info_span!("session", %remote)),
                    );
                }
                Some(finished) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = finished {
                        error!("session task failed: {e}");
                    }
                }
            }
        }
    }
}

/// Runs one connection through the websocket handshake and its session
async fn handle_connection<H: SessionHandler>(
    stream: TcpStream,
    remote: SocketAddr,
    handler: H,
    idle_timeout: Option<Duration>,
) {
    trace!("accepted");
    let mut path = String::new();
    let capture_path = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        request.uri().path().clone_into(&mut path);
        Ok(response)
    };
    let handshake = tokio_tungstenite::accept_hdr_async_with_config(
        stream,
        capture_path,
        Some(websocket_config()),
    );
    let handshake = match idle_timeout {
        Some(limit) => {
            let Ok(result) = tokio::time::timeout(limit, handshake).await else {
                debug!("websocket handshake timed out");
                return;
            };
            result
        }
        None => handshake.await,
    };
    let ws = match handshake {
        Ok(ws) => ws,
        Err(e) => {
            // Port scanners and stray HTTP clients end up here
            debug!("websocket handshake failed: {e}");
            return;
        }
    };
    let mut channel = WsChannel::from(ws);
    let mut session = Session::new(handler, remote).with_idle_timeout(idle_timeout);

    match session.run(&path, &mut channel).await {
        Ok(SessionOutcome::Rejected | SessionOutcome::UnknownSelector(_)) => {
            trace!("dropping connection");
        }
        Ok(outcome) => {
            debug!("{outcome:?}");
            if let Err(e) = channel.close().await {
                debug!("{e:#}");
            }
        }
        Err(e) => error!("{e:#}"),
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::{stream, StreamExt as _};
    use tokio::task::JoinHandle;

    use super::Listener;
    use crate::clipboard::{Clipboard as _, MemoryClipboard};
    use crate::protocol::{Endpoint, Message, Scheme, Selector};
    use crate::sender::{send_clipboard, send_file, FileSource, LocalFile};
    use crate::session::{ConsoleHandler, ReceiverSettings};
    use crate::transport::{connect, MessageChannel as _};
    use crate::util::setup_tracing_for_tests;

    struct Receiver {
        endpoint: Endpoint,
        clipboard: Arc<MemoryClipboard>,
        task: JoinHandle<anyhow::Result<()>>,
    }

    impl Drop for Receiver {
        fn drop(&mut self) {
            self.task.abort();
        }
    }

    async fn receiver(dir: &Path, allow: &[&str]) -> Receiver {
        setup_tracing_for_tests();
        let clipboard = Arc::new(MemoryClipboard::default());
        let settings = Arc::new(ReceiverSettings::new(dir, allow, clipboard.clone()));
        let listener = Listener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let task = tokio::spawn(listener.run(move || ConsoleHandler::new(settings.clone())));
        Receiver {
            endpoint: Endpoint::new(Scheme::Ws, "127.0.0.1", port).unwrap(),
            clipboard,
            task,
        }
    }

    /// Waits for the receiver to finish writing a file
    async fn wait_for(path: &Path, len: usize) -> Vec<u8> {
        for _ in 0..200 {
            if let Ok(data) = std::fs::read(path) {
                if data.len() >= len {
                    return data;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("{} never arrived", path.display());
    }

    async fn wait_for_clipboard(clipboard: &MemoryClipboard, expected: &str) -> bool {
        for _ in 0..200 {
            if clipboard.read().unwrap() == expected {
                return true;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn clipboard_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let rx = receiver(dir.path(), &["*"]).await;
        send_clipboard(&rx.endpoint, "héllo").await.unwrap();
        assert!(wait_for_clipboard(&rx.clipboard, "héllo").await);
    }

    #[tokio::test]
    async fn file_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let rx = receiver(dir.path(), &["127.0.0.1"]).await;
        let source = FileSource {
            name: "report.txt".into(),
            size: Some(11),
            chunks: stream::iter(vec![Ok(b"hello ".to_vec()), Ok(b"world".to_vec())]).boxed(),
        };
        let sent = send_file(&rx.endpoint, source, None).await.unwrap();
        assert_eq!(sent, 11);
        let data = wait_for(&dir.path().join("report.txt"), 11).await;
        assert_eq!(data, b"hello world");
    }

    #[tokio::test]
    async fn local_file_with_small_chunks() {
        let src_dir = tempfile::tempdir().unwrap();
        let dest_dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = std::iter::repeat_with(|| fastrand::u8(..))
            .take(100_000)
            .collect();
        let src = src_dir.path().join("random.bin");
        std::fs::write(&src, &data).unwrap();

        let rx = receiver(dest_dir.path(), &["*"]).await;
        let sent = send_file(&rx.endpoint, LocalFile::new(&src, 4096), None)
            .await
            .unwrap();
        assert_eq!(sent, 100_000);
        let received = wait_for(&dest_dir.path().join("random.bin"), data.len()).await;
        assert_eq!(received, data);
    }

    #[tokio::test]
    async fn empty_file_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let rx = receiver(dir.path(), &["*"]).await;
        let source = FileSource {
            name: "empty".into(),
            size: Some(0),
            chunks: stream::empty().boxed(),
        };
        assert_eq!(send_file(&rx.endpoint, source, None).await.unwrap(), 0);
        let dest = dir.path().join("empty");
        for _ in 0..200 {
            if dest.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(std::fs::read(dest).unwrap(), b"");
    }

    #[tokio::test]
    async fn existing_file_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("taken"), b"original").unwrap();
        let rx = receiver(dir.path(), &["*"]).await;
        let source = FileSource {
            name: "taken".into(),
            size: Some(3),
            chunks: stream::iter(vec![Ok(b"new".to_vec())]).boxed(),
        };
        assert!(send_file(&rx.endpoint, source, None).await.is_err());
        assert_eq!(std::fs::read(dir.path().join("taken")).unwrap(), b"original");
    }

    #[tokio::test]
    async fn rejected_peer_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let rx = receiver(dir.path(), &["10.*"]).await;
        // The receiver drops the connection without a closing handshake
        assert!(send_clipboard(&rx.endpoint, "sneaky").await.is_err());
        assert_eq!(rx.clipboard.read().unwrap(), "");
    }

    #[tokio::test]
    async fn stalled_handshake_is_dropped() {
        use tokio::io::AsyncReadExt as _;

        setup_tracing_for_tests();
        let dir = tempfile::tempdir().unwrap();
        let settings = Arc::new(ReceiverSettings::new(
            dir.path(),
            &["*"],
            Arc::new(MemoryClipboard::default()),
        ));
        let listener = Listener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .with_idle_timeout(Some(Duration::from_millis(200)));
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(listener.run(move || ConsoleHandler::new(settings.clone())));

        let mut idle = tokio::net::TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_secs(5), idle.read(&mut buf))
            .await
            .expect("receiver kept the stalled connection open");
        assert!(matches!(read, Ok(0) | Err(_)));
        task.abort();
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let rx = receiver(dir.path(), &["*"]).await;

        // A malformed clipboard session...
        let mut bad = connect(&rx.endpoint, Selector::Clipboard).await.unwrap();
        bad.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
        // ...and a scanner that never completes the handshake
        let _idle = tokio::net::TcpStream::connect((rx.endpoint.host(), rx.endpoint.port()))
            .await
            .unwrap();

        send_clipboard(&rx.endpoint, "still here").await.unwrap();
        assert!(wait_for_clipboard(&rx.clipboard, "still here").await);
        assert!(!rx.task.is_finished());
        let _ = bad.close().await;
    }
}
