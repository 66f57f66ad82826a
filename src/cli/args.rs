// sendplz command-line arguments
// (c) 2024 sendplz contributors

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::ConfigurationOverrides;

#[derive(Debug, Parser, Clone)]
#[command(
    author,
    version(env!("SENDPLZ_VERSION_STRING")),
    about,
    before_help = "e.g.   sendplz receive 0.0.0.0 9001\n       sendplz send 192.168.1.20 9001 -f report.txt",
    infer_long_args(true),
    arg_required_else_help(true)
)]
#[command(help_template(
    "\
{name} version {version}
{about-with-newline}
{usage-heading} {usage}
{before-help}
{all-args}{after-help}
"
))]
#[command(styles=super::styles::CLAP_STYLES)]
pub(crate) struct CliArgs {
    #[command(subcommand)]
    pub(crate) command: Option<Command>,

    /// Quiet mode
    ///
    /// Switches off progress display and reports only errors
    #[arg(short, long, action, global = true, conflicts_with("debug"))]
    pub(crate) quiet: bool,

    /// Enable detailed debug output
    ///
    /// This has the same effect as setting `RUST_LOG=sendplz=trace` in the environment.
    /// If present, `RUST_LOG` overrides this option.
    #[arg(short, long, action, global = true, help_heading("Debug"))]
    pub(crate) debug: bool,

    /// Log to a file
    ///
    /// By default the log receives everything printed to stderr.
    /// To override this behaviour, set the environment variable `RUST_LOG_FILE_DETAIL` (same semantics as `RUST_LOG`).
    #[arg(
        short('l'),
        long,
        action,
        global = true,
        help_heading("Debug"),
        value_name("FILE")
    )]
    pub(crate) log_file: Option<String>,

    /// Reads an additional configuration file, which must exist
    ///
    /// Settings in this file take priority over the system and user configuration files.
    #[arg(
        short,
        long,
        global = true,
        help_heading("Configuration"),
        value_name("FILE")
    )]
    pub(crate) config: Option<PathBuf>,

    /// Outputs the configuration, then exits
    #[arg(long, help_heading("Configuration"))]
    pub(crate) show_config: bool,

    /// Outputs the paths to configuration file(s), then exits
    #[arg(long, help_heading("Configuration"))]
    pub(crate) config_files: bool,

    #[command(flatten)]
    pub(crate) overrides: ConfigurationOverrides,
}

impl CliArgs {
    pub(crate) fn trace_level(&self) -> &'static str {
        if self.debug {
            "trace"
        } else if self.quiet {
            "error"
        } else {
            "info"
        }
    }
}

#[derive(Debug, Subcommand, Clone)]
pub(crate) enum Command {
    /// Sends the local clipboard, or a file, to a receiver
    Send(SendArgs),
    /// Listens for transfers until interrupted
    #[command(alias("recieve"))]
    Receive(ReceiveArgs),
}

#[derive(Debug, Args, Clone)]
pub(crate) struct SendArgs {
    /// Address or hostname of the receiver
    pub(crate) ip: String,
    /// Port the receiver is listening on
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    pub(crate) port: u16,
    /// Sends this file instead of the clipboard
    #[arg(short, long, value_name("FILE"))]
    pub(crate) file: Option<PathBuf>,
    /// Connects with TLS (`wss://`)
    #[arg(short, long)]
    pub(crate) secure: bool,
}

#[derive(Debug, Args, Clone)]
pub(crate) struct ReceiveArgs {
    /// Local address to listen on (e.g. `0.0.0.0` for all IPv4 interfaces)
    pub(crate) network: String,
    /// Port to listen on
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    pub(crate) port: u16,
}

#[cfg(test)]
mod test {
    use clap::{CommandFactory as _, Parser as _};

    use super::{CliArgs, Command};

    #[test]
    fn cli_is_consistent() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn send_file() {
        let args =
            CliArgs::try_parse_from(["sendplz", "send", "10.0.0.1", "9001", "-f", "x.txt"]).unwrap();
        let Some(Command::Send(send)) = args.command else {
            panic!("wrong command");
        };
        assert_eq!(send.ip, "10.0.0.1");
        assert_eq!(send.port, 9001);
        assert_eq!(send.file.unwrap().to_str(), Some("x.txt"));
        assert!(!send.secure);
    }

    #[test]
    fn receive_has_the_old_spelling() {
        let args = CliArgs::try_parse_from(["sendplz", "recieve", "0.0.0.0", "9001"]).unwrap();
        assert!(matches!(args.command, Some(Command::Receive(_))));
    }

    #[test]
    fn port_range() {
        assert!(CliArgs::try_parse_from(["sendplz", "receive", "::", "0"]).is_err());
        assert!(CliArgs::try_parse_from(["sendplz", "receive", "::", "65536"]).is_err());
        assert!(CliArgs::try_parse_from(["sendplz", "receive", "::", "65535"]).is_ok());
    }

    #[test]
    fn overrides_after_subcommand() {
        let args = CliArgs::try_parse_from([
            "sendplz",
            "receive",
            "0.0.0.0",
            "9001",
            "--directory",
            "/tmp",
            "-a",
            "10.*",
            "-a",
            "127.0.0.1",
            "--chunk-size",
            "1M",
        ])
        .unwrap();
        assert_eq!(args.overrides.directory.as_deref(), Some("/tmp"));
        assert_eq!(args.overrides.allow, vec!["10.*", "127.0.0.1"]);
        assert_eq!(args.overrides.chunk_size.map(|c| *c), Some(1_000_000));
    }

    #[test]
    fn quiet_and_debug_conflict() {
        assert!(CliArgs::try_parse_from(["sendplz", "-q", "-d", "receive", "::", "1"]).is_err());
    }
}
