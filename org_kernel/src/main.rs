//! OrgKernel v1 — Determinism Harness
//!
//! Loads transaction scenarios from JSON, replays each one twice through
//! independent engines, and compares canonical hashes (and the expected
//! hash, when the scenario pins one).

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use org_kernel::engine::OrgEngine;
use org_kernel::events::TxEnvelope;
use org_kernel::hashing::canonical_hash;

#[derive(Parser, Debug)]
#[command(name = "org-kernel-harness", about = "Replay kernel scenarios and check determinism")]
struct Args {
    /// Scenario file: a JSON array of `{name, transactions, expected_hash?}`.
    #[arg(default_value = "org_kernel/tests/fixtures/scenarios.json")]
    scenarios: PathBuf,

    /// Print the canonical JSON of every final state.
    #[arg(long)]
    dump: bool,
}

#[derive(Deserialize)]
struct Scenario {
    name: String,
    transactions: Vec<TxEnvelope>,
    #[serde(default)]
    expected_hash: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(msg) => {
            eprintln!("error: {}", msg);
            ExitCode::from(2)
        }
    }
}

fn run(args: &Args) -> Result<bool, String> {
    let data = fs::read_to_string(&args.scenarios)
        .map_err(|e| format!("reading {}: {}", args.scenarios.display(), e))?;
    let scenarios: Vec<Scenario> = serde_json::from_str(&data)
        .map_err(|e| format!("parsing {}: {}", args.scenarios.display(), e))?;
    println!("Loaded {} scenario(s) from {}", scenarios.len(), args.scenarios.display());

    let mut passed = 0;
    for scenario in &scenarios {
        // Run 1
        let mut engine = OrgEngine::default();
        let run1 = engine.replay(&scenario.transactions).map(canonical_hash);
        let h1 = match run1 {
            Ok(hash) => hash,
            Err(e) => {
                println!(
                    "[FAIL] {}: rejected at sequence {}: {}",
                    scenario.name,
                    engine.last_sequence() + 1,
                    e
                );
                continue;
            }
        };

        // Run 2 (determinism check)
        let mut engine2 = OrgEngine::default();
        let h2 = engine2
            .replay(&scenario.transactions)
            .map(canonical_hash)
            .map_err(|e| format!("{}: second replay diverged: {}", scenario.name, e))?;

        let determ_match = h1 == h2;
        let hash_match = scenario.expected_hash.as_ref().map_or(true, |h| *h == h1);

        if determ_match && hash_match {
            passed += 1;
            println!(
                "[PASS] {}: txs={}, hash={}, grants={}, proxies={}",
                scenario.name,
                scenario.transactions.len(),
                h1,
                engine.state().acl.len(),
                engine.state().proxies.len()
            );
        } else {
            println!("[FAIL] {}:", scenario.name);
            if !determ_match {
                println!("  Determinism fail: run1={} run2={}", h1, h2);
            }
            if let Some(expected) = scenario.expected_hash.as_ref().filter(|_| !hash_match) {
                println!("  Hash mismatch: got={} expected={}", h1, expected);
            }
        }

        if args.dump {
            let json = org_kernel::hashing::canonical_serialize(engine.state());
            println!("{}", String::from_utf8_lossy(&json));
        }
    }

    println!("\n===========================================");
    println!("Results: {}/{} passed", passed, scenarios.len());
    Ok(passed == scenarios.len())
}
