//! Load test CLI driving virtual users against an HTTP service.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use vu_load::{FileSource, ReqwestClient, ResultsReport, TestConfig, TestReport, TestRunner};

#[derive(Parser)]
#[command(name = "vu-load")]
#[command(about = "Virtual-user load testing tool for HTTP services", long_about = None)]
struct Cli {
    /// Log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a load test from a scenario file
    Run {
        /// Path to scenario YAML file
        #[arg(short, long)]
        scenario: PathBuf,

        /// Override dataset path
        #[arg(long)]
        data: Option<PathBuf>,

        /// Override number of virtual users
        #[arg(short, long)]
        vus: Option<u32>,

        /// Override test duration in seconds
        #[arg(short, long)]
        duration: Option<f64>,

        /// Override target base URL
        #[arg(short, long)]
        url: Option<String>,

        /// Seed for reproducible sampling
        #[arg(long)]
        seed: Option<u64>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,

        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// POST name/message records to /api/says and expect 200
    Quick {
        /// Dataset with `name` and `message` columns
        #[arg(long)]
        data: PathBuf,

        /// Base URL
        #[arg(short, long, default_value = "http://localhost:8282")]
        url: String,

        /// Number of virtual users
        #[arg(short, long, default_value = "20")]
        vus: u32,

        /// Test duration in seconds
        #[arg(short, long, default_value = "10")]
        duration: f64,
    },

    /// List available scenarios
    List {
        /// Scenarios directory
        #[arg(short, long, default_value = "scenarios")]
        dir: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    match cli.command {
        Commands::Run {
            scenario,
            data,
            vus,
            duration,
            url,
            seed,
            output,
            no_progress,
        } => {
            println!("Loading scenario: {}", scenario.display());

            let mut config = TestConfig::from_file(&scenario)?;

            // Apply overrides
            if let Some(v) = vus {
                config.vus = v;
            }
            if let Some(d) = duration {
                config.duration_secs = d;
            }
            if let Some(u) = url {
                config.base_url = u;
            }
            if seed.is_some() {
                config.seed = seed;
            }

            config.validate()?;

            let label = config
                .dataset
                .as_ref()
                .map(|d| d.name.clone())
                .unwrap_or_else(|| "dataset".to_string());
            let data = data
                .or_else(|| config.dataset.as_ref().map(|d| d.path.clone()))
                .context("no dataset: pass --data or set `dataset.path` in the scenario")?;

            println!("✓ Configuration loaded successfully");
            println!("  Name: {}", config.name);
            println!("  Description: {}", config.description);
            println!("  Duration: {}s", config.duration_secs);
            println!("  VUs: {}", config.vus);
            println!("  Dataset: {} ({})", label, data.display());
            println!();

            let report = execute(config, FileSource::named(label, data), !no_progress).await?;
            print_report(&report, output)?;
            Ok(())
        }
        Commands::Quick {
            data,
            url,
            vus,
            duration,
        } => {
            println!("Running quick test:");
            println!("  URL: {}", url);
            println!("  VUs: {}", vus);
            println!("  Duration: {}s", duration);
            println!();

            let config = TestConfig::quick(url, vus, duration);
            let report = execute(config, FileSource::new(data), true).await?;
            print_report(&report, OutputFormat::Table)?;
            Ok(())
        }
        Commands::List { dir } => {
            println!("Available scenarios in {}:", dir.display());
            println!();

            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    eprintln!("Error reading directory: {}", e);
                    eprintln!("Make sure the directory exists and is readable");
                    return Ok(());
                }
            };

            let mut scenarios = Vec::new();
            for entry in entries.flatten() {
                let path = entry.path();
                let is_yaml = matches!(
                    path.extension().and_then(|s| s.to_str()),
                    Some("yaml") | Some("yml")
                );
                if !is_yaml {
                    continue;
                }
                match TestConfig::from_file(&path) {
                    Ok(config) => scenarios.push((
                        entry.file_name().to_string_lossy().to_string(),
                        config.name,
                        config.description,
                    )),
                    Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping scenario"),
                }
            }

            scenarios.sort_by(|a, b| a.0.cmp(&b.0));

            if scenarios.is_empty() {
                println!("No scenario files found");
            } else {
                for (filename, name, desc) in scenarios {
                    println!("  {} - {}", filename, name);
                    println!("    {}", desc);
                    println!();
                }
            }
            Ok(())
        }
    }
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = fmt().with_env_filter(filter).with_target(true).with_level(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn execute(
    config: TestConfig,
    source: FileSource,
    progress: bool,
) -> anyhow::Result<TestReport> {
    let client = ReqwestClient::new(config.timeout(), config.vus as usize)?;
    let duration_secs = config.duration_secs.ceil() as u64;
    let mut runner = TestRunner::new(config, Arc::new(client));

    if progress {
        let pb = ProgressBar::new(duration_secs);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len}s {msg}")?
                .progress_chars("##-"),
        );
        runner = runner.with_progress(pb);
    }

    let stop = runner.stop_token();
    let signal_handle = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received Ctrl+C, stopping virtual users...");
                stop.cancel();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C"),
        }
    });

    let result = runner.run(&source).await;
    signal_handle.abort();
    Ok(result?)
}

fn print_report(report: &TestReport, output: OutputFormat) -> anyhow::Result<()> {
    match output {
        OutputFormat::Json => println!("{}", ResultsReport::format_json(report)?),
        OutputFormat::Csv => {
            println!("{}", ResultsReport::csv_header());
            println!("{}", ResultsReport::format_csv(report)?);
        }
        OutputFormat::Table => println!("{}", ResultsReport::format_table(report)),
    }
    Ok(())
}
