use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use supervisor::{
    list_candidates, Overrides, Report, Summary, Supervisor, SupervisorConfig, SupervisorResult,
};
use tracing::{error, info_span, Instrument};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "supervisor=info,client=info,backend=info";

#[derive(Parser)]
#[command(name = "supervisor")]
#[command(about = "Launch the bundled backend, wait for it to become healthy and check its API")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Backend host
    #[arg(long, global = true)]
    host: Option<String>,
    /// Backend port
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Seconds to wait for the backend to become healthy
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,
    /// Search packaged-mode locations first
    #[arg(long, global = true)]
    packaged: bool,
    /// Root of the default search locations (defaults to the working directory)
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
    /// Print the report as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Start the backend, wait for health, check its endpoints and stop it (default)
    Run,
    /// List candidate backend locations in search order
    Candidates,
    /// Check a backend that is already running
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> SupervisorResult<SupervisorConfig> {
    let base_dir = match &cli.base_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };

    let overrides = Overrides {
        host: cli.host.clone(),
        port: cli.port,
        health_timeout_secs: cli.timeout,
        packaged: cli.packaged,
        base_dir: Some(base_dir),
    };
    Ok(SupervisorConfig::load(cli.config.as_deref(), overrides)?)
}

async fn execute(cli: Cli) -> SupervisorResult<ExitCode> {
    let config = load_config(&cli)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let mut supervisor = Supervisor::new(config)?;
            let span = info_span!("run", id = %supervisor.report().run_id);
            let summary = supervisor.run().instrument(span).await;
            print_report(supervisor.report(), cli.json)?;
            Ok(exit_code(&summary))
        }
        Commands::Check => {
            let mut supervisor = Supervisor::new(config)?;
            let span = info_span!("check", id = %supervisor.report().run_id);
            let summary = supervisor.check().instrument(span).await;
            print_report(supervisor.report(), cli.json)?;
            Ok(exit_code(&summary))
        }
        Commands::Candidates => {
            let candidates = list_candidates(&config);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&candidates)?);
            } else {
                println!("Backend search order:");
                for candidate in candidates {
                    println!(
                        "  [{}] {:<10} {}",
                        if candidate.exists { "x" } else { " " },
                        candidate.kind.to_string(),
                        candidate.path.display()
                    );
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_report(report: &Report, json: bool) -> SupervisorResult<()> {
    if json {
        println!("{}", report.to_json()?);
    } else {
        println!("\nBackend test results");
        println!("====================");
        print!("{}", report.render());
    }
    Ok(())
}

fn exit_code(summary: &Summary) -> ExitCode {
    ExitCode::from(summary.exit_code())
}
