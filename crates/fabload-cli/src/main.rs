use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use fabload_core::app::{HarnessConfig, RunBuilder, failure_report, response_line, summary_block};
use fabload_core::domain::CallMode;
use fabload_core::impls::{SimulatedTransport, SimulationProfile};

mod logging;

use logging::LogFormat;

/// Drive batches of ledger calls concurrently and report statistics.
#[derive(Debug, Parser)]
#[command(name = "fabload", version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// How the final report is printed.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Failure list and summary block.
    Text,
    /// Full run statistics as JSON.
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Submit mutating calls and wait for them to commit.
    Invoke(RunArgs),

    /// Send read-only calls and validate their endorsements.
    Query(RunArgs),
}

impl Command {
    fn into_parts(self) -> (CallMode, RunArgs) {
        match self {
            Command::Invoke(args) => (CallMode::Submit, args),
            Command::Query(args) => (CallMode::Query, args),
        }
    }
}

#[derive(Debug, Args)]
struct RunArgs {
    /// JSON config file; missing keys take defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Batch as inline JSON: [{"Func":"put","Args":["k$seq()","v"]}]
    #[arg(long, required_unless_present = "args_file", conflicts_with = "args_file")]
    args: Option<String>,

    /// Batch read from a JSON file.
    #[arg(long)]
    args_file: Option<PathBuf>,

    /// Worker count, overrides the config file.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Number of times the batch is run, overrides the config file.
    #[arg(long)]
    iterations: Option<usize>,

    /// Share of simulated calls that hit a read conflict.
    #[arg(long, default_value_t = 0.05)]
    transient_rate: f64,

    /// Share of simulated calls that fail terminally.
    #[arg(long, default_value_t = 0.01)]
    persistent_rate: f64,

    /// Share of simulated calls that get no response.
    #[arg(long, default_value_t = 0.01)]
    transport_rate: f64,
}

impl RunArgs {
    fn load_config(&self) -> anyhow::Result<HarnessConfig> {
        let mut config = match &self.config {
            Some(path) => HarnessConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => HarnessConfig::default(),
        };

        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(iterations) = self.iterations {
            config.iterations = iterations;
            if iterations > config.queue_capacity {
                tracing::debug!(iterations, "raising queue capacity to fit all iterations");
                config.queue_capacity = iterations;
            }
        }
        Ok(config)
    }

    fn load_batch(&self) -> anyhow::Result<String> {
        match (&self.args, &self.args_file) {
            (Some(inline), _) => Ok(inline.clone()),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("reading batch file {}", path.display())),
            (None, None) => bail!("either --args or --args-file is required"),
        }
    }

    fn profile(&self) -> SimulationProfile {
        SimulationProfile {
            transient_rate: self.transient_rate,
            persistent_rate: self.persistent_rate,
            transport_rate: self.transport_rate,
            ..SimulationProfile::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_format)?;

    let output = cli.output;
    let (mode, args) = cli.command.into_parts();
    let config = args.load_config()?;
    let batch = args.load_batch()?;

    let transport = Arc::new(SimulatedTransport::new(args.profile()));
    let orchestrator = RunBuilder::new(config)
        .transport_with_verifier(transport)
        .build()
        .context("invalid run configuration")?;

    let stats = orchestrator.run(&batch, mode).await?;

    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        OutputFormat::Text => {
            if let Some(report) = failure_report(&stats) {
                println!("{report}");
            }
            if let Some(summary) = summary_block(&stats) {
                println!("{summary}");
            } else if let Some(line) = response_line(&stats) {
                println!("{line}");
            }
        }
    }

    if !stats.is_success() {
        bail!(
            "{} of {} invocation(s) failed",
            stats.failures.len(),
            stats.invocations()
        );
    }
    Ok(())
}
