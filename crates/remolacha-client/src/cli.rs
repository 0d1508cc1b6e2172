//! Command-line interface definition.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// remolacha - multiplexed services over one WebSocket
#[derive(Debug, Parser)]
#[command(name = "remolacha")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "REMOLACHA_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Server URL (overrides client.url)
    #[arg(long, env = "REMOLACHA_URL", global = true)]
    pub url: Option<String>,

    /// Seconds to wait for a call before giving up (overrides client.timeout)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the server in the foreground
    Serve {
        /// Address to listen on (overrides server.listen)
        #[arg(long)]
        listen: Option<SocketAddr>,
    },

    /// Call a service once and print its answer as JSON
    Call {
        /// Application ID, e.g. remolacha.Taskbar
        app_id: String,
        /// Service name, e.g. getCurrentTime
        service: String,
        /// Parameters as JSON
        params: Option<String>,
    },

    /// Open a stream and print every data event as a JSON line
    Stream {
        /// Application ID
        app_id: String,
        /// Service name
        service: String,
        /// Parameters as JSON
        params: Option<String>,
        /// Close after this many data events
        #[arg(long, short = 'n')]
        count: Option<usize>,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Dump,
    /// Validate the configuration
    Validate,
    /// Print the default configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_stream_with_count() {
        let cli = Cli::try_parse_from([
            "remolacha",
            "stream",
            "remolacha.Taskbar",
            "getCurrentTime",
            "--count",
            "3",
            "--debug",
        ])
        .unwrap();

        assert!(cli.debug);
        match cli.command {
            Command::Stream {
                app_id,
                service,
                params,
                count,
            } => {
                assert_eq!(app_id, "remolacha.Taskbar");
                assert_eq!(service, "getCurrentTime");
                assert_eq!(params, None);
                assert_eq!(count, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_serve_listen_address() {
        let cli = Cli::try_parse_from(["remolacha", "serve", "--listen", "0.0.0.0:4000"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Serve { listen: Some(addr) } if addr.port() == 4000
        ));
    }
}
