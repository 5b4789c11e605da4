// ==========================================
// 外勤运营平台 - 批量导入命令行入口
// ==========================================
// 子命令: import / template / export / seed-demo / config
// 全局参数: --db / --endpoint / --report-dir / --yes
// ==========================================

use anyhow::Context;
use clap::{Parser, Subcommand};
use fieldops_import::app::{get_default_db_path, AppState};
use fieldops_import::config::config_keys;
use fieldops_import::importer::{render_template, ConfirmMode, DirectorySink, Importer};
use fieldops_import::{logging, EntityKind, ReconcileOutcome};
use std::path::{Path, PathBuf};

fn parse_kind(raw: &str) -> Result<EntityKind, String> {
    EntityKind::parse(raw).ok_or_else(|| format!("unknown entity kind '{}' (expected appointment or client)", raw))
}

#[derive(Parser)]
#[command(
    name = "fieldops-import",
    version,
    about = "Bulk import and reconciliation for field-service appointments and clients"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite database path (default: user data directory)
    #[arg(long, env = "FIELDOPS_DB_PATH", global = true)]
    db: Option<PathBuf>,

    /// Remote server base URL; imports are written to the local database when omitted
    #[arg(long, env = "FIELDOPS_ENDPOINT", global = true)]
    endpoint: Option<String>,

    /// Bearer token for the remote server
    #[arg(long, env = "FIELDOPS_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    /// Directory for downloadable reports (default: download directory)
    #[arg(long, global = true)]
    report_dir: Option<PathBuf>,

    /// Save the report without asking for confirmation
    #[arg(short, long, global = true)]
    yes: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a .csv/.txt/.xlsx/.xls file
    Import {
        file: PathBuf,
        /// appointment | client
        #[arg(long, value_parser = parse_kind)]
        kind: EntityKind,
        /// Print the machine-readable result to stdout
        #[arg(long)]
        json: bool,
    },
    /// Write an import template (header + example row)
    Template {
        #[arg(long, value_parser = parse_kind)]
        kind: EntityKind,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Export stored records in import column order
    Export {
        #[arg(long, value_parser = parse_kind)]
        kind: EntityKind,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Load demo services, technicians, teams and clients
    SeedDemo,
    /// Show or change import settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective settings
    Show,
    /// Store a setting
    Set { key: String, value: String },
}

async fn write_output(output: Option<&Path>, contents: &str) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            tokio::fs::write(path, contents)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Written to {}", path.display());
        }
        None => print!("{}", contents),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.log_json {
        logging::init_json();
    } else {
        logging::init();
    }
    tracing::info!(version = fieldops_import::VERSION, "{}", fieldops_import::APP_NAME);

    // 模板生成不需要数据库
    if let Commands::Template { kind, output } = &cli.command {
        let text = render_template(*kind)?;
        return write_output(output.as_deref(), &text).await;
    }

    let db_path = cli
        .db
        .as_ref()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(get_default_db_path);
    let state = AppState::new(db_path).context("failed to open the local database")?;

    match cli.command {
        Commands::Import { file, kind, json } => {
            let engine = state
                .build_engine(cli.endpoint.as_deref(), cli.token.clone())
                .await?;
            let result = engine
                .import_file(&file, kind)
                .await
                .with_context(|| format!("import of {} aborted", file.display()))?;

            let report_dir = cli
                .report_dir
                .clone()
                .unwrap_or_else(|| engine.config().resolved_report_dir());
            let confirm = if cli.yes {
                ConfirmMode::AssumeYes
            } else {
                ConfirmMode::Prompt
            };
            let sink = DirectorySink::new(report_dir, confirm);
            if let Some(path) = engine.deliver(&result, &sink).await? {
                eprintln!("Report saved to {}", path.display());
            }

            if json {
                println!("{}", engine.report_builder().render_json(&result)?);
            }
            if result.outcome() == ReconcileOutcome::Failed {
                std::process::exit(1);
            }
        }
        Commands::Export { kind, output } => {
            let text = state.export(kind).await?;
            write_output(output.as_deref(), &text).await?;
        }
        Commands::SeedDemo => {
            let summary = state.store.seed_demo()?;
            println!(
                "Seeded {} services, {} technicians, {} teams, {} clients into {}",
                summary.services, summary.technicians, summary.teams, summary.clients, state.db_path
            );
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let config = state.load_config().await?;
                println!("{}", serde_json::to_string_pretty(&config)?);
                let stored = state.config_manager.list_global_config()?;
                if !stored.is_empty() {
                    println!("\nStored overrides ({}):", state.db_path);
                    for (key, value) in stored {
                        println!("  {} = {}", key, value);
                    }
                }
            }
            ConfigAction::Set { key, value } => {
                if !config_keys::ALL.contains(&key.as_str()) {
                    anyhow::bail!(
                        "unknown setting '{}' (known: {})",
                        key,
                        config_keys::ALL.join(", ")
                    );
                }
                state.config_manager.set_global_config_value(&key, &value)?;
                // 立即校验，非法值直接报错
                state.load_config().await?;
                println!("{} = {}", key, value);
            }
        },
        Commands::Template { .. } => unreachable!("handled before opening the database"),
    }

    Ok(())
}
