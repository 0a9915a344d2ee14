//! Org runtime CLI.
//!
//! Opens (or creates) a session from a TOML configuration, submits any
//! transactions given on the command line, and prints the session's
//! sequence and canonical hash.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde::Deserialize;
use tracing::info;

use org_kernel::apps::CodeLibrary;
use org_kernel::domain::Address;
use org_kernel::events::Transaction;
use org_runtime::config::RuntimeConfig;
use org_runtime::session::Session;

#[derive(Parser, Debug)]
#[command(name = "org-runtime", about = "Drive a persistent organization session")]
struct Args {
    /// Runtime configuration (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Session to open under the configured data directory.
    #[arg(short, long, default_value = "default")]
    session: String,

    /// JSON array of `{sender, tx}` to submit in order.
    #[arg(short, long)]
    transactions: Option<PathBuf>,

    /// Rebuild from the full log, ignoring snapshots, before submitting.
    #[arg(long)]
    replay: bool,

    /// Write a snapshot after submitting.
    #[arg(long)]
    snapshot: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Submission {
    sender: Address,
    tx: Transaction,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("error: {}", msg);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), String> {
    let config = match &args.config {
        Some(path) => RuntimeConfig::from_file(path).map_err(|e| format!("{}: {}", path.display(), e))?,
        None => RuntimeConfig::default(),
    };
    config.init_tracing().map_err(|e| e.to_string())?;

    let mut session = Session::open_with_config(&config, &args.session, CodeLibrary::builtin())
        .map_err(|e| e.to_string())?;

    if args.replay {
        let (_, hash) = session.replay_full().map_err(|e| e.to_string())?;
        info!(hash = %hash, "replayed full log");
    }

    if let Some(path) = &args.transactions {
        let data = fs::read_to_string(path).map_err(|e| format!("reading {}: {}", path.display(), e))?;
        let submissions: Vec<Submission> =
            serde_json::from_str(&data).map_err(|e| format!("parsing {}: {}", path.display(), e))?;
        for (i, s) in submissions.into_iter().enumerate() {
            let kind = s.tx.type_name();
            session
                .submit(s.sender, s.tx)
                .map_err(|e| format!("transaction {} ({}) rejected: {}", i, kind, e))?;
        }
    }

    if args.snapshot {
        let path = session.snapshot_now().map_err(|e| e.to_string())?;
        println!("snapshot: {}", path.display());
    }

    println!(
        "session={} sequence={} hash={}",
        session.session_id(),
        session.current_sequence(),
        session.current_hash()
    );
    Ok(())
}
