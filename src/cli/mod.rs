//! Command Line Interface for sendplz
// (c) 2024 sendplz contributors
mod args;
mod cli_main;
pub(crate) mod styles;
pub use cli_main::cli;
