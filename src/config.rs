use std::path::PathBuf;

use clap::Parser;

use crate::collectors::capture::{CaptureOptions, SourceKind, TOOL_PROGRAM};
use crate::collectors::history::HISTORY_CAPACITY;

#[derive(Parser, Debug)]
#[command(name = "framewatch")]
#[command(about = "Terminal network diagnostics with a live frame analyzer", long_about = None)]
pub struct Cli {
    /// Interface to capture on
    #[arg(short, long, default_value = "any")]
    pub interface: String,

    /// Capture source
    #[arg(short, long, value_enum, default_value_t = SourceKind::Auto)]
    pub source: SourceKind,

    /// Dump tool run by the tool source
    #[arg(long, default_value = TOOL_PROGRAM)]
    pub tool: String,

    /// UI tick interval in milliseconds
    #[arg(long, default_value_t = 16)]
    pub tick_ms: u64,

    /// Records kept by the frame analyzer
    #[arg(long, default_value_t = HISTORY_CAPACITY)]
    pub history: usize,

    /// Log file (the terminal belongs to the UI)
    #[arg(long, default_value = "framewatch.log")]
    pub log_file: PathBuf,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Runtime settings resolved from the command line.
#[derive(Debug, Clone)]
pub struct Config {
    pub capture: CaptureOptions,
    pub tick_ms: u64,
    pub history: usize,
    pub log_file: PathBuf,
    pub log_level: String,
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        Self {
            capture: CaptureOptions {
                interface: cli.interface,
                source: cli.source,
                tool: cli.tool,
            },
            tick_ms: cli.tick_ms.max(1),
            history: cli.history.max(1),
            log_file: cli.log_file,
            log_level: cli.log_level,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureOptions::default(),
            tick_ms: 16,
            history: HISTORY_CAPACITY,
            log_file: PathBuf::from("framewatch.log"),
            log_level: "info".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let argv = std::iter::once("framewatch").chain(args.iter().copied());
        Config::from(Cli::try_parse_from(argv).unwrap())
    }

    #[test]
    fn test_defaults() {
        let cfg = parse(&[]);
        assert_eq!(cfg.capture.interface, "any");
        assert_eq!(cfg.capture.source, SourceKind::Auto);
        assert_eq!(cfg.capture.tool, "tcpdump");
        assert_eq!(cfg.tick_ms, 16);
        assert_eq!(cfg.history, 1000);
        assert_eq!(cfg.log_file, PathBuf::from("framewatch.log"));
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn test_flags() {
        let cfg = parse(&[
            "-i", "eth0", "--source", "tool", "--tool", "/usr/sbin/tcpdump", "--tick-ms", "50", "--history", "20",
        ]);
        assert_eq!(cfg.capture.interface, "eth0");
        assert_eq!(cfg.capture.tool, "/usr/sbin/tcpdump");
        assert_eq!(cfg.capture.source, SourceKind::Tool);
        assert_eq!(cfg.tick_ms, 50);
        assert_eq!(cfg.history, 20);
    }

    #[test]
    fn test_zero_values_clamped() {
        let cfg = parse(&["--tick-ms", "0", "--history", "0"]);
        assert_eq!(cfg.tick_ms, 1);
        assert_eq!(cfg.history, 1);
    }

    #[test]
    fn test_unknown_source_rejected() {
        assert!(Cli::try_parse_from(["framewatch", "--source", "magic"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
