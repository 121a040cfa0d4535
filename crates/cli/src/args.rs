use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xlatbench")]
#[command(version)]
#[command(about = "RFC 2544 / RFC 8219 benchmarking tester for IPv4/IPv6 translators", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (JSON)
    #[arg(short, long, default_value = "xlatbench.json", global = true)]
    pub config: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Print the report as JSON instead of text lines
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Throughput / frame-loss measurement
    Throughput {
        #[command(flatten)]
        test: TestArgs,
    },
    /// Latency measurement; appends `delay` and `timestamps` to the test
    /// parameters
    Latency {
        #[command(flatten)]
        test: TestArgs,
    },
}

impl Commands {
    pub fn test_args(&self) -> &TestArgs {
        match self {
            Commands::Throughput { test } | Commands::Latency { test } => test,
        }
    }
}

/// The traditional positional parameters. With a stateful configuration the
/// five preliminary-phase values follow; a latency run appends its two
/// parameters last, so everything after the first six stays positional.
#[derive(clap::Args)]
pub struct TestArgs {
    /// IPv6 frame size in bytes, FCS included (84-1538)
    pub frame_size: u16,

    /// Target frame rate (frames per second)
    pub frame_rate: u32,

    /// Test duration in seconds (1-3600)
    pub duration: u16,

    /// Global timeout in milliseconds (0-60000)
    pub global_timeout: u16,

    /// Foreground modulus n (>= 2)
    pub n: u32,

    /// Foreground threshold m (<= n)
    pub m: u32,

    /// Stateful: N M R T D; latency appends: delay timestamps
    #[arg(trailing_var_arg = true)]
    pub rest: Vec<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stateless_throughput() {
        let cli =
            Cli::try_parse_from(["xlatbench", "throughput", "84", "1000", "60", "2000", "2", "1"])
                .unwrap();
        let t = cli.command.test_args();
        assert_eq!(t.frame_size, 84);
        assert_eq!(t.frame_rate, 1000);
        assert_eq!(t.duration, 60);
        assert_eq!(t.global_timeout, 2000);
        assert_eq!((t.n, t.m), (2, 1));
        assert!(t.rest.is_empty());
    }

    #[test]
    fn parses_stateful_latency_tail() {
        let cli = Cli::try_parse_from([
            "xlatbench", "latency", "84", "1000", "60", "2000", "2", "2", "100000", "100000",
            "10000", "1000", "15000", "5", "500",
        ])
        .unwrap();
        let t = cli.command.test_args();
        assert_eq!(t.rest, vec![100000, 100000, 10000, 1000, 15000, 5, 500]);
        assert!(matches!(cli.command, Commands::Latency { .. }));
    }

    #[test]
    fn rejects_non_numeric_tail() {
        assert!(Cli::try_parse_from([
            "xlatbench", "throughput", "84", "1000", "60", "2000", "2", "1", "abc"
        ])
        .is_err());
    }
}
