use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use datapath_harness::runner::{find, run_all, NamedScenario, RunSummary, SCENARIOS};
use datapath_harness::{create_harness_runtime, HarnessConfig, ScenarioGenerator, SimTime};
use eyre::{eyre, Result, WrapErr};

#[derive(Parser)]
#[command(name = "datapath-harness")]
#[command(version)]
#[command(about = "Clock-synchronised verification harness for a bus/register/ALU datapath")]
struct Cli {
    /// Log protocol steps (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scenarios, all of them unless some are named
    Run {
        /// Scenario to run; repeat to run several
        #[arg(short, long = "scenario")]
        scenarios: Vec<String>,
        /// Seed for random stimulus
        #[arg(long)]
        seed: Option<u64>,
        /// JSON config file
        #[arg(short, long)]
        config: Option<Utf8PathBuf>,
        /// ALU convergence budget in ns
        #[arg(long)]
        timeout: Option<SimTime>,
        /// Settle margin in clock cycles
        #[arg(long)]
        settle: Option<u32>,
        /// Settle latency of the reference ALU in cycles
        #[arg(long)]
        alu_latency: Option<u32>,
        /// Write the scenario reports as JSON
        #[arg(long)]
        report: Option<Utf8PathBuf>,
    },
    /// List the available scenarios
    List,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match execute(cli.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("❌ {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn execute(command: Option<Commands>) -> Result<bool> {
    match command {
        Some(Commands::Run {
            scenarios,
            seed,
            config,
            timeout,
            settle,
            alu_latency,
            report,
        }) => {
            let mut config = match config {
                Some(path) => HarnessConfig::load(&path)?,
                None => HarnessConfig::default(),
            };
            if let Some(seed) = seed {
                config.seed = Some(seed);
            }
            if let Some(timeout) = timeout {
                config.alu_timeout_ns = timeout;
            }
            if let Some(settle) = settle {
                config.settle_cycles = settle;
            }
            if let Some(latency) = alu_latency {
                config.device.alu_latency_cycles = latency;
            }
            config.validate()?;

            let selected = select(&scenarios)?;
            let summary = run(&selected, &config)?;
            if let Some(path) = report {
                let json = serde_json::to_string_pretty(&summary)?;
                std::fs::write(&path, json)
                    .wrap_err_with(|| format!("Failed to write report {path}"))?;
                println!("📝 Report written to {path}");
            }
            Ok(summary.passed())
        }
        Some(Commands::List) => {
            for scenario in SCENARIOS {
                println!("{:<28} {}", scenario.name, scenario.description);
            }
            Ok(true)
        }
        None => {
            println!("Datapath harness v{}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Use --help for available commands");
            Ok(true)
        }
    }
}

fn select(names: &[String]) -> Result<Vec<&'static NamedScenario>> {
    if names.is_empty() {
        return Ok(SCENARIOS.iter().collect());
    }
    names
        .iter()
        .map(|name| find(name).ok_or_else(|| eyre!("Unknown scenario: {name}")))
        .collect()
}

fn run(selected: &[&'static NamedScenario], config: &HarnessConfig) -> Result<RunSummary> {
    let seed = config
        .seed
        .unwrap_or_else(|| ScenarioGenerator::from_entropy().seed());
    println!("🚀 Running {} scenario(s), seed {seed}", selected.len());

    let runtime = create_harness_runtime()?;
    let summary = runtime.block_on(run_all(selected, config, seed));

    for report in &summary.reports {
        let mark = if report.passed { "✅" } else { "❌" };
        println!("{mark} {} ({} ns)", report.name, report.sim_time_ns);
    }
    match summary.first_failure() {
        None => println!("🎉 All {} scenarios passed!", summary.reports.len()),
        Some(report) => {
            println!(
                "💥 {} of {} scenarios failed",
                summary.failed_count(),
                summary.reports.len()
            );
            if let Some(failure) = &report.failure {
                println!("First failure in {}: {}", report.name, failure.message);
            }
        }
    }
    Ok(summary)
}
