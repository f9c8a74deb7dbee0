use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Command line arguments for irbridge
#[derive(Parser, Debug)]
#[command(
    name = "irbridge",
    version = env!("CARGO_PKG_VERSION"),
    about = "USB-serial bridge for infrared capture and replay devices",
    long_about = "Connects to the first attached USB-serial IR bridge, captures infrared signals with RECEIVE and replays them with SEND over a line-based protocol at 115200 8N1."
)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress log output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Talk to a simulated IR device instead of real hardware
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List attached serial devices
    List {
        /// Include non-USB ports (built-in UARTs, pseudo terminals)
        #[arg(short, long)]
        all: bool,
    },
    /// Capture one infrared signal
    Receive {
        /// Receive deadline in milliseconds (defaults to the configured value)
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },
    /// Replay a captured signal (e.g. "IR_RAW:9000,4500,560")
    Send {
        /// Payload to send, usually the output of `receive`
        payload: String,
    },
    /// Capture one signal and immediately replay it
    Relay {
        /// Receive deadline in milliseconds (defaults to the configured value)
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },
    /// Configuration management commands
    Config(ConfigArgs),
    /// Display version information
    Version,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output
    Json,
    /// Table output
    Table,
}

/// Configuration management arguments
#[derive(ClapArgs, Debug)]
pub struct ConfigArgs {
    /// Configuration subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,
    /// Write a default configuration to <dir>/.irbridge/config.toml
    Init {
        /// Project directory
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Print which configuration file is in use
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_receive() {
        let args = Args::try_parse_from(["irbridge", "--simulate", "receive", "--timeout-ms", "1500"]).unwrap();
        assert!(args.simulate);
        assert!(matches!(args.command, Command::Receive { timeout_ms: Some(1500) }));
        assert_eq!(args.output, OutputFormat::Text);
    }

    #[test]
    fn test_parse_send_with_global_flags_after_subcommand() {
        let args = Args::try_parse_from(["irbridge", "send", "IR_RAW:1,2,3", "-o", "json", "-q"]).unwrap();
        assert!(args.quiet);
        assert_eq!(args.output, OutputFormat::Json);
        match args.command {
            Command::Send { payload } => assert_eq!(payload, "IR_RAW:1,2,3"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_config_init_default_dir() {
        let args = Args::try_parse_from(["irbridge", "config", "init"]).unwrap();
        match args.command {
            Command::Config(ConfigArgs { command: ConfigCommand::Init { dir } }) => {
                assert_eq!(dir, PathBuf::from("."))
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_list_all() {
        let args = Args::try_parse_from(["irbridge", "list", "--all"]).unwrap();
        assert!(matches!(args.command, Command::List { all: true }));
        let args = Args::try_parse_from(["irbridge", "list"]).unwrap();
        assert!(matches!(args.command, Command::List { all: false }));
    }

    #[test]
    fn test_send_requires_payload() {
        assert!(Args::try_parse_from(["irbridge", "send"]).is_err());
    }
}
