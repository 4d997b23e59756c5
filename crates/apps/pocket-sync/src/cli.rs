use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pocket-sync")]
#[command(about = "Save Pocket data to a SQLite database")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Save authentication credentials to a JSON file
    Auth {
        /// Path to save tokens to
        #[arg(short, long, value_name = "PATH", default_value = pocket::DEFAULT_AUTH_FILE)]
        auth: PathBuf,
    },
    /// Fetch saved items into a SQLite database
    Fetch {
        /// Database file to create or update
        db_path: PathBuf,
        /// Path to auth tokens
        #[arg(short, long, value_name = "PATH", default_value = pocket::DEFAULT_AUTH_FILE)]
        auth: PathBuf,
        /// Fetch all items (not just new ones)
        #[arg(long)]
        all: bool,
        /// Don't show progress
        #[arg(short, long)]
        silent: bool,
    },
    /// Export items from the database
    Export(ExportArgs),
    /// Full-text search over titles and excerpts
    Search {
        /// Database file
        db_path: PathBuf,
        /// Search query
        query: String,
        /// Number of items to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
pub struct ExportArgs {
    /// Database file
    pub db_path: PathBuf,
    /// Output format: json, csv or karakeep
    pub format: String,
    /// Output path (stdout when omitted)
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
    /// Table to export: items or item_tags
    #[arg(long, default_value = "items")]
    pub table: String,
    /// Only export items with this status (0=unread, 1=archived, 2=deleted)
    #[arg(long, value_name = "STATUS")]
    pub filter_status: Option<String>,
    /// Only export favorited items
    #[arg(long)]
    pub filter_favorite: bool,
    /// Maximum number of rows to export
    #[arg(long)]
    pub limit: Option<usize>,
    /// Number of rows to skip
    #[arg(long, default_value = "0")]
    pub offset: usize,
    /// Show what would be exported without writing anything
    #[arg(long)]
    pub dry_run: bool,
    /// Path to auth tokens (the karakeep format needs a karakeep_token)
    #[arg(short, long, value_name = "PATH", default_value = pocket::DEFAULT_AUTH_FILE)]
    pub auth: PathBuf,
    /// Suppress progress output
    #[arg(short, long)]
    pub silent: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_export_flags() {
        let cli = Cli::try_parse_from([
            "pocket-sync",
            "export",
            "pocket.db",
            "CSV",
            "--filter-status",
            "1",
            "--filter-favorite",
            "--limit",
            "5",
            "--dry-run",
        ])
        .unwrap();

        let Commands::Export(args) = cli.command else {
            panic!("expected export command");
        };
        assert_eq!(args.format, "CSV");
        assert_eq!(args.filter_status.as_deref(), Some("1"));
        assert!(args.filter_favorite);
        assert_eq!(args.limit, Some(5));
        assert_eq!(args.offset, 0);
        assert_eq!(args.table, "items");
        assert!(args.dry_run);
        assert_eq!(args.auth, PathBuf::from("auth.json"));
    }

    #[test]
    fn test_parse_fetch_with_global_debug() {
        let cli = Cli::try_parse_from(["pocket-sync", "fetch", "pocket.db", "--all", "--debug"]).unwrap();
        assert!(cli.debug);
        assert!(matches!(cli.command, Commands::Fetch { all: true, silent: false, .. }));
    }
}
