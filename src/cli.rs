//! Command-line interface definitions.

use crate::config::{SyncConfig, SyncMode};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for the task-sync binary.
#[derive(Parser, Debug)]
#[command(name = "task-sync")]
#[command(about = "Reconcile Google Tasks and Microsoft To Do into one task list", long_about = None)]
pub struct Cli {
    /// Directory holding sync state, tombstones, and the conflict log
    #[arg(long, value_name = "DIR", default_value = ".task-sync")]
    pub state_dir: PathBuf,

    /// Reconciliation mode
    #[arg(long, value_enum, default_value_t = SyncMode::Bidirectional)]
    pub mode: SyncMode,

    /// Days a tombstone suppresses recreation
    #[arg(long, value_name = "DAYS", default_value_t = 30)]
    pub ttl_days: i64,

    /// Compute and report actions without writing anywhere
    #[arg(long)]
    pub dry_run: bool,

    /// Ordered provider list; the first entry is the privileged side in
    /// one-way modes
    #[arg(long, value_delimiter = ',', default_value = "google,microsoft")]
    pub providers: Vec<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a single reconciliation cycle (the default)
    Sync,

    /// Run cycles on an interval until interrupted
    Poll {
        /// Minutes between cycles
        #[arg(long, value_name = "MINUTES", default_value_t = 5)]
        interval_minutes: u64,
    },

    /// Authorize a provider and store its tokens
    Login {
        /// Provider to authorize (google or microsoft)
        provider: String,
    },

    /// Print a summary of the persisted state
    Status,
}

impl Cli {
    /// The engine configuration implied by the global flags.
    pub fn sync_config(&self) -> SyncConfig {
        let poll_interval_minutes = match &self.command {
            Some(Command::Poll { interval_minutes }) => Some(*interval_minutes),
            _ => None,
        };
        SyncConfig {
            state_dir: self.state_dir.clone(),
            mode: self.mode,
            tombstone_ttl_days: self.ttl_days,
            dry_run: self.dry_run,
            poll_interval_minutes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cli = Cli::parse_from(["task-sync"]);
        assert_eq!(cli.state_dir, PathBuf::from(".task-sync"));
        assert_eq!(cli.mode, SyncMode::Bidirectional);
        assert_eq!(cli.ttl_days, 30);
        assert_eq!(cli.providers, vec!["google", "microsoft"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn poll_interval_reaches_config() {
        let cli = Cli::parse_from(["task-sync", "poll", "--interval-minutes", "10"]);
        assert_eq!(cli.sync_config().poll_interval_minutes, Some(10));
    }

    #[test]
    fn mode_parses_kebab_case() {
        let cli = Cli::parse_from(["task-sync", "--mode", "a-to-b-only"]);
        assert_eq!(cli.mode, SyncMode::AToBOnly);
    }
}
