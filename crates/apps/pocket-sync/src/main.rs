//! pocket-sync - save Pocket data to a SQLite database
//!
//! Subcommands: `auth`, `fetch`, `export` and `search`.

mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use env_logger::Env;
use log::error;

use cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.debug {
        "debug"
    } else if is_silent(&cli.command) {
        "warn"
    } else {
        "info"
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();

    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {e:#}");
    }

    let result = match cli.command {
        Commands::Auth { auth } => commands::run_auth(&auth),
        Commands::Fetch {
            db_path,
            auth,
            all,
            silent,
        } => commands::run_fetch(&db_path, &auth, all, silent),
        Commands::Export(args) => commands::run_export(&args),
        Commands::Search {
            db_path,
            query,
            limit,
            json,
        } => commands::run_search(&db_path, &query, limit, json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

fn is_silent(command: &Commands) -> bool {
    match command {
        Commands::Fetch { silent, .. } => *silent,
        Commands::Export(args) => args.silent,
        Commands::Auth { .. } | Commands::Search { .. } => false,
    }
}

/// Map the first crate error in the chain to a process exit code
fn exit_code(err: &anyhow::Error) -> u8 {
    let pocket_error = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<pocket::Error>());

    match pocket_error {
        Some(e) if e.is_configuration() => 3,
        Some(pocket::Error::AuthMissing(_)) => 2,
        Some(
            pocket::Error::SyncFailed { .. }
            | pocket::Error::Remote(_)
            | pocket::Error::MergeFailed(_),
        ) => 4,
        _ => 1,
    }
}
