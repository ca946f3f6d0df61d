//! SeaTable MySync CLI

use clap::{Parser, Subcommand};
use seatable_mysync::{AppConfig, SyncClient};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "seatable-mysync")]
#[command(author, version, about = "Sync MySQL query results into SeaTable tables")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log level
    #[arg(long, default_value = "info", global = true, env = "LOG_LEVEL")]
    log_level: String,

    /// JSON output
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run sync tasks (default)
    Sync {
        /// Task names to run; all configured tasks when omitted
        tasks: Vec<String>,
    },
    /// Test connectivity for every configured task
    Test,
    /// List configured tasks
    Tasks,
    /// Generate sample config files
    Init {
        #[arg(short, long, default_value = "seatable-mysync.toml")]
        output: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.quiet, cli.json);

    match run(cli).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    // Handle init first - it doesn't need config
    if let Some(Commands::Init { output }) = cli.command {
        return run_init(&output);
    }

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        None => run_sync(config, vec![], cli.json, cli.quiet).await,
        Some(Commands::Sync { tasks }) => run_sync(config, tasks, cli.json, cli.quiet).await,
        Some(Commands::Test) => run_test(config, cli.json).await,
        Some(Commands::Tasks) => run_tasks_list(config, cli.json),
        Some(Commands::Init { .. }) => unreachable!(), // Handled above
    }
}

fn load_config(path: Option<&str>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    if let Some(p) = path {
        info!("Loading config from: {}", p);
        return Ok(AppConfig::from_file(p)?);
    }

    for default in &["seatable-mysync.toml", ".seatable-mysync.toml"] {
        if std::path::Path::new(default).exists() {
            info!("Loading config from: {}", default);
            return Ok(AppConfig::from_file(default)?);
        }
    }

    info!("Loading config from environment");
    Ok(AppConfig::from_env()?)
}

async fn run_sync(
    config: AppConfig,
    tasks: Vec<String>,
    json: bool,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let names: Vec<String> = if tasks.is_empty() {
        config.tasks.iter().map(|t| t.name.clone()).collect()
    } else {
        tasks
    };

    if names.is_empty() {
        return Err("No tasks configured and none given on the command line".into());
    }

    if !quiet && !json {
        println!("SeaTable MySync v{}", seatable_mysync::VERSION);
        println!("Tasks: {}\n", names.join(", "));
    }

    let client = SyncClient::new(config);
    let summary = client.run_tasks(&names).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if !quiet {
        if summary.success {
            println!("✓ Sync completed successfully");
        } else {
            println!("✗ Sync completed with errors");
        }
        println!(
            "\nDuration: {}",
            humantime::format_duration(Duration::from_millis(summary.duration_ms))
        );
        println!("Total rows loaded: {}\n", summary.total_rows_loaded());

        for report in &summary.tasks {
            let icon = if report.success { "✓" } else { "✗" };
            println!(
                "  {} {} → {}: {} deleted, {} loaded ({}ms)",
                icon,
                report.task,
                report.table_name,
                report.rows_deleted,
                report.rows_loaded,
                report.duration_ms
            );
            if let Some(ref e) = report.error {
                println!("      Error: {}", e);
            }
        }
    }

    if summary.success {
        Ok(())
    } else {
        Err("Sync failed".into())
    }
}

async fn run_test(config: AppConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !json {
        println!("Testing connectivity...\n");
    }

    let client = SyncClient::new(config);
    client.test_connectivity().await?;

    if json {
        println!(r#"{{"mysql":"ok","seatable":"ok"}}"#);
    } else {
        println!("\n✓ All connectivity tests passed!");
    }
    Ok(())
}

fn run_tasks_list(config: AppConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(&config.tasks)?);
        return Ok(());
    }

    println!("Configured tasks\n");
    for task in &config.tasks {
        println!(
            "  • {} ({} on {}, config: {})",
            task.name, task.database, task.source, task.config_file
        );
    }
    println!("\nTotal: {} tasks", config.tasks.len());
    Ok(())
}

fn run_init(output: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = r#"# SeaTable MySync Configuration

[seatable]
server_url = "https://cloud.seatable.io"

[[sources]]
name = "primary"
host = "localhost"
port = 3306
username = "sync"
password = ""

[retry]
max_retries = 3

[[tasks]]
name = "contract"
config_file = "tasks/contract.json"
source = "primary"
database = "chpm_v2"
token_env = "SEATABLE_TOKEN_CONTRACT"
"#;

    let task = r#"{
  "seatable": { "table_name": "Contracts" },
  "chunk_size": 100,
  "data_mappings": [
    {
      "description": "contracts",
      "sql_query": "SELECT id, amount, signed_at FROM contract",
      "field_mappings": { "id": "ID", "amount": "Amount", "signed_at": "Signed" }
    }
  ]
}
"#;

    std::fs::write(output, config)?;
    println!("✓ Created: {}", output);

    std::fs::create_dir_all("tasks")?;
    std::fs::write("tasks/contract.json", task)?;
    println!("✓ Created: tasks/contract.json");

    println!("\nEdit the files, then export the task token:");
    println!("  export SEATABLE_TOKEN_CONTRACT=...");
    Ok(())
}

fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if quiet {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // When JSON output is enabled, send logs to stderr to avoid mixing with JSON on stdout
    if json_output {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt().with_env_filter(filter).with_target(false).init();
    }
}
