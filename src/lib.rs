//! sendplz: send the clipboard or a file to another machine over a WebSocket
// (c) 2024 sendplz contributors

mod cli;
pub use cli::cli;
/// Local clipboard access
pub mod clipboard;
/// Configuration management
pub mod config;
/// Receiver accept loop
pub mod listener;
/// Wire protocol
pub mod protocol;
/// The sending side
pub mod sender;
/// Receiver-side session state machine
pub mod session;
/// Message transport
pub mod transport;
/// Utilities
pub mod util;
