//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use contracts::Channel;
use std::path::PathBuf;

/// fpm-sync - Remote FPM acquisition, synchronization and HDR processing
#[derive(Parser, Debug)]
#[command(
    name = "fpm-sync",
    author,
    version,
    about = "Remote FPM acquisition, sync and HDR processing",
    long_about = "Drives a Fourier ptychography acquisition end to end.\n\n\
                  On the device, steps an illumination controller through every \n\
                  position and captures an exposure burst at each one. On the host, \n\
                  triggers the run, downloads completed frames as they appear and \n\
                  fuses every burst into a calibrated HDR image."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "FPM_SYNC_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "FPM_SYNC_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the acquisition sequence on the device
    Acquire(AcquireArgs),

    /// Trigger a remote run and download its frames as they complete
    Sync(SyncArgs),

    /// Demosaic and fuse a local dataset
    Process(ProcessArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `acquire` command
#[derive(Parser, Debug, Clone)]
pub struct AcquireArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "fpm.toml", env = "FPM_SYNC_CONFIG")]
    pub config: PathBuf,

    /// Use an in-process illumination controller and the synthetic camera
    #[arg(long)]
    pub simulate: bool,

    /// Override the artifact directory from configuration
    #[arg(long, env = "FPM_SYNC_ARTIFACT_DIR")]
    pub artifact_dir: Option<PathBuf>,

    /// Override the message broker host from configuration
    #[arg(long, env = "FPM_SYNC_BROKER")]
    pub broker: Option<String>,

    /// Override the number of illumination positions
    #[arg(long)]
    pub positions: Option<u32>,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "FPM_SYNC_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `sync` command
#[derive(Parser, Debug, Clone)]
pub struct SyncArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "fpm.toml", env = "FPM_SYNC_CONFIG")]
    pub config: PathBuf,

    /// Override the device host from configuration
    #[arg(long, env = "FPM_SYNC_HOST")]
    pub host: Option<String>,

    /// Override the local dataset directory from configuration
    #[arg(long, env = "FPM_SYNC_LOCAL_DIR")]
    pub local_dir: Option<PathBuf>,

    /// Synchronize a dataset already on the device instead of starting a run
    #[arg(long)]
    pub existing: bool,

    /// Run the batch processing pipeline once every frame is downloaded
    #[arg(long)]
    pub process: bool,

    /// Validate configuration and exit without contacting the device
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "FPM_SYNC_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `process` command
#[derive(Parser, Debug, Clone)]
pub struct ProcessArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "fpm.toml", env = "FPM_SYNC_CONFIG")]
    pub config: PathBuf,

    /// Dataset directory (defaults to processing.input_dir, then sync.local_dir)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Output directory for processed images
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Select one exposure per position instead of fusing the burst
    #[arg(long)]
    pub no_fusion: bool,

    /// Only produce this channel
    #[arg(long, value_enum)]
    pub channel: Option<ChannelArg>,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "fpm.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "fpm.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// List every artifact name the run will produce
    #[arg(long)]
    pub artifacts: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

/// Output channel selection
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ChannelArg {
    #[value(alias = "r")]
    Red,
    #[value(alias = "g")]
    Green,
    #[value(alias = "b")]
    Blue,
}

impl From<ChannelArg> for Channel {
    fn from(arg: ChannelArg) -> Self {
        match arg {
            ChannelArg::Red => Channel::Red,
            ChannelArg::Green => Channel::Green,
            ChannelArg::Blue => Channel::Blue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_sync_flags() {
        let cli = Cli::parse_from([
            "fpm-sync",
            "sync",
            "--host",
            "10.0.0.5",
            "--existing",
            "--process",
        ]);
        match cli.command {
            Commands::Sync(args) => {
                assert_eq!(args.host.as_deref(), Some("10.0.0.5"));
                assert!(args.existing);
                assert!(args.process);
                assert!(!args.dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_channel_alias() {
        let cli = Cli::parse_from(["fpm-sync", "process", "--channel", "g", "--no-fusion"]);
        match cli.command {
            Commands::Process(args) => {
                assert_eq!(args.channel.map(Channel::from), Some(Channel::Green));
                assert!(args.no_fusion);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
