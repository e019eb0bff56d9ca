//! `corowork-cli` — a test harness binary exercising the end-to-end
//! scenarios described in the project's testable-properties section,
//! outside of `cargo test`, at realistic wall-clock scale. Exits 0 if every
//! requested scenario passes, non-zero otherwise.

mod scenarios;

use clap::{Parser, Subcommand};
use scenarios::ScenarioResult;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "corowork-cli")]
#[command(author, version, about = "corowork scenario test harness", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one named scenario, or `all` of them.
    Run {
        /// One of: parallel-adds, spmc-integrity, task-fan-in,
        /// generator-fan-out, mutex-exclusion, scheduler-binding, all
        scenario: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("corowork=info")))
        .init();

    let cli = Cli::parse();
    let Commands::Run { scenario } = cli.command;

    let results = if scenario == "all" {
        scenarios::ALL.iter().map(|(name, f)| scenarios::run_one(*name, *f)).collect::<Vec<_>>()
    } else {
        match scenarios::by_name(&scenario) {
            Some(f) => vec![scenarios::run_one(scenario.clone(), f)],
            None => {
                eprintln!("unknown scenario '{scenario}'; run with 'all' to see the full list");
                std::process::exit(2);
            }
        }
    };

    let failed = print_summary(&results);
    std::process::exit(if failed == 0 { 0 } else { 1 });
}

fn print_summary(results: &[ScenarioResult]) -> usize {
    let mut failed = 0;
    println!("{:<20} {:>10} {:>10}", "scenario", "elapsed", "result");
    for r in results {
        let elapsed = fmt_duration(r.elapsed);
        match &r.outcome {
            Ok(()) => println!("{:<20} {:>10} {:>10}", r.name, elapsed, "PASS"),
            Err(reason) => {
                failed += 1;
                println!("{:<20} {:>10} {:>10}", r.name, elapsed, "FAIL");
                println!("  -> {reason}");
            }
        }
    }
    failed
}

fn fmt_duration(d: Duration) -> String {
    if d.as_secs() > 0 {
        format!("{:.2}s", d.as_secs_f64())
    } else {
        format!("{}ms", d.as_millis())
    }
}
