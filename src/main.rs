use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use espherd::config;
use espherd::dispatch::Dispatcher;
use espherd::report::AggregateReport;
use espherd::web;

const DEFAULT_CONFIG_PATH: &str = "cluster.toml";

#[derive(Parser, Debug)]
#[command(
    name = "cluster-host",
    about = "Serial command dispatcher for a bench of ESP32 boards."
)]
struct Cli {
    /// Path to a TOML config file (the default cluster.toml may be absent)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address for the web API (overrides the config file)
    #[arg(long)]
    bind: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the web API server (default)
    Serve,
    /// List attached candidate boards and exit
    Ports,
    /// Send one command to every attached board and print the report
    Send {
        /// Command words, joined with spaces before sending
        cmd: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .init();

    // An explicitly named config file must exist and parse; only the
    // default path is allowed to be absent.
    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            config::load_config(path)?
        }
        None => config::load_or_default(Path::new(DEFAULT_CONFIG_PATH))?,
    };
    tracing::info!(
        "Link: {} baud, {} ms I/O timeout, {} ms response deadline",
        config.link.baud,
        config.link.io_timeout_ms,
        config.link.read_deadline_ms
    );
    tracing::info!("Dispatch pool: {} board(s) at a time", config.dispatch.pool_size);

    let dispatcher = Dispatcher::with_system_links(config.clone());

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let bind = cli.bind.unwrap_or_else(|| config.web.socket_addr());
            serve(dispatcher, &bind).await
        }
        Commands::Ports => {
            let ports = dispatcher.list_ports()?;
            if ports.is_empty() {
                println!("No ESP32 boards found!");
            } else {
                for port in ports {
                    println!("{port}");
                }
            }
            Ok(())
        }
        Commands::Send { cmd } => {
            let command = cmd.join(" ");
            let report = dispatcher.dispatch(command.trim()).await?;
            print_report(&report);
            Ok(())
        }
    }
}

async fn serve(
    dispatcher: Dispatcher,
    bind: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let app = web::api::create_router(dispatcher);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Web API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

fn print_report(report: &AggregateReport) {
    for result in &report.results {
        println!("{}:", result.port);
        let lines = result.lines();
        if lines.is_empty() {
            println!("  (no data)");
        }
        for line in lines {
            println!("  {line}");
        }
    }
    if report.total_hs > 0.0 {
        println!("Total: {}", fmt_rate(report.total_hs));
    }
}

/// Human-readable rate scaled from H/s up to GH/s.
fn fmt_rate(rate: f64) -> String {
    if rate >= 1e9 {
        format!("{:.2} GH/s", rate / 1e9)
    } else if rate >= 1e6 {
        format!("{:.2} MH/s", rate / 1e6)
    } else if rate >= 1e3 {
        format!("{:.2} kH/s", rate / 1e3)
    } else {
        format!("{rate:.2} H/s")
    }
}
