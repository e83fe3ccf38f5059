use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "ncl",
    about = "NeuroGuard Consent Ledger: append-only, auditable consent records",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Ledger data directory (overrides the config file)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Decision {
    Grant,
    Revoke,
}

impl Decision {
    pub fn status(self) -> bool {
        matches!(self, Self::Grant)
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Record a consent decision for a subject
    Set(SetArgs),
    /// Show a subject's current consent status
    Status(SubjectArgs),
    /// Show a subject's full consent history
    History(SubjectArgs),
    /// Verify hash chains (one subject, or all)
    Verify(VerifyArgs),
    /// Replay the log from empty state and report what was found
    Replay(ReplayArgs),
    /// Start the HTTP server
    Serve(ServeArgs),
}

#[derive(Args)]
pub struct SetArgs {
    pub subject: String,
    pub decision: Decision,
    /// Commit time as unix seconds (defaults to now)
    #[arg(long)]
    pub at: Option<u64>,
}

#[derive(Args)]
pub struct SubjectArgs {
    pub subject: String,
}

#[derive(Args)]
pub struct VerifyArgs {
    pub subject: Option<String>,
}

#[derive(Args)]
pub struct ReplayArgs {
    /// Skip damaged entries instead of refusing to open
    #[arg(long)]
    pub lenient: bool,
}

#[derive(Args)]
pub struct ServeArgs {
    /// Address to listen on (overrides the config file)
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_set_with_global_flags() {
        let cli = Cli::try_parse_from([
            "ncl", "--data-dir", "/tmp/ncl", "set", "alice", "revoke", "--format", "json",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/ncl")));
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Command::Set(args) => {
                assert_eq!(args.subject, "alice");
                assert_eq!(args.decision, Decision::Revoke);
                assert!(!args.decision.status());
            }
            _ => panic!("expected set"),
        }
    }

    #[test]
    fn rejects_unknown_decision() {
        assert!(Cli::try_parse_from(["ncl", "set", "alice", "maybe"]).is_err());
    }
}
