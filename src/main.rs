use anomaly_gateway::config::GatewayConfig;
use anomaly_gateway::engine::{AnalysisEngine, RulesEngine};
use anomaly_gateway::envelope::{error_envelope, AnalysisEnvelope};
use anomaly_gateway::error::GatewayError;
use anomaly_gateway::model::schema::{self, ALL_TABLES};
use anomaly_gateway::model::BaselineStats;
use anomaly_gateway::storage::SqliteStore;
use anomaly_gateway::validate;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "anomaly-gateway",
    about = "Root-cause analysis gateway for detected metric anomalies",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the gateway TOML config
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Bind address (overrides the config file)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Validate and analyze an anomaly event locally; nothing is persisted
    Analyze {
        /// JSON file holding one anomaly event
        #[arg(long)]
        file: PathBuf,

        /// Print the response envelope instead of the plain-language report
        #[arg(long)]
        json: bool,
    },

    /// Validate an anomaly event and print its normalized form
    Validate {
        /// JSON file holding one anomaly event
        #[arg(long)]
        file: PathBuf,
    },

    /// Print the persisted table schemas
    Schema {
        /// Only this table: anomaly, analysis or baseline
        #[arg(long)]
        table: Option<String>,
    },

    /// Load baseline statistics from a JSON array into the store
    ImportBaselines {
        /// JSON file holding an array of baselines
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = GatewayConfig::resolve(cli.config.as_deref())?;
    anomaly_gateway::init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting anomaly gateway");
            anomaly_gateway::serve(config).await?;
        }
        Commands::Analyze { file, json } => {
            let raw = read_event(&file)?;
            let anomaly = match validate::normalize(&raw) {
                Ok(anomaly) => anomaly,
                Err(e) => return report_failure(GatewayError::from(e)),
            };

            let mut engine = RulesEngine::new(config.engine.model_name.clone());
            // Only consult baselines that already exist; a dry run never creates the database.
            if Path::new(&config.storage.db_path).exists() {
                engine = engine.with_baselines(Arc::new(SqliteStore::open(&config.storage.db_path)?));
            }

            let analysis = match engine.analyze(&anomaly).await {
                Ok(analysis) => analysis,
                Err(e) => return report_failure(GatewayError::from(e)),
            };

            if json {
                let envelope = AnalysisEnvelope::new(&analysis, false);
                println!("{}", serde_json::to_string_pretty(&envelope)?);
            } else {
                println!("\n=== Anomaly Analysis: {} ===", analysis.anomaly.anomaly_id);
                println!("Metric:     {}", analysis.anomaly.metric_name);
                println!("Severity:   {}", analysis.anomaly.severity);
                println!("Root cause: {}", analysis.root_cause.primary_cause);
                println!();
                println!("{}", analysis.plain_language_report());
                println!("\nRecommendations:");
                for rec in &analysis.recommendations {
                    println!(" - [{}] {}", rec.priority, rec.action);
                }
                println!();
            }
        }
        Commands::Validate { file } => {
            let raw = read_event(&file)?;
            match validate::normalize(&raw) {
                Ok(anomaly) => println!("{}", serde_json::to_string_pretty(&anomaly.to_dict()?)?),
                Err(e) => return report_failure(GatewayError::from(e)),
            }
        }
        Commands::Schema { table } => {
            let output = match table {
                Some(name) => match schema::by_name(&name) {
                    Some(table) => serde_json::to_string_pretty(table)?,
                    None => bail!("unknown table '{}' (expected anomaly, analysis or baseline)", name),
                },
                None => serde_json::to_string_pretty(&ALL_TABLES)?,
            };
            println!("{}", output);
        }
        Commands::ImportBaselines { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let baselines: Vec<BaselineStats> = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse baselines from {}", file.display()))?;

            let store = SqliteStore::open(&config.storage.db_path)?;
            for baseline in &baselines {
                store.save_baseline(baseline)?;
            }
            tracing::info!(count = baselines.len(), db_path = %config.storage.db_path, "baselines imported");
            println!("Imported {} baseline(s).", baselines.len());
        }
    }

    Ok(())
}

/// Read a file holding one JSON object.
fn read_event(path: &Path) -> Result<Map<String, Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) if !map.is_empty() => Ok(map),
        _ => bail!("{} does not hold a JSON object", path.display()),
    }
}

/// Print the error envelope on stdout and fail the command.
fn report_failure(err: GatewayError) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&error_envelope(&err))?);
    bail!("{}: {}", err.category(), err)
}
