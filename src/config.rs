use clap::{Parser, Subcommand};
use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub connection_string: String,
    pub pool_size: usize,
    /// Upper bound for a single statement, enforced server-side.
    pub statement_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub backend: String, // "gemini" or "remote"
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    /// Client-side bound on one model call.
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub llm: LlmConfig,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// PostgreSQL connection string
    #[arg(long)]
    pub database_url: Option<String>,

    /// Generative model name
    #[arg(long)]
    pub model: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the batch evaluation harness instead of the server
    Eval(EvalArgs),
}

#[derive(clap::Args, Debug)]
pub struct EvalArgs {
    /// Path to the labeled dataset (JSONL: id, question, expected_sql)
    #[arg(long)]
    pub dataset: PathBuf,

    /// Output JSONL file for per-sample records
    #[arg(long, default_value = "eval_results.jsonl")]
    pub out: PathBuf,

    /// Max samples to evaluate (default: all)
    #[arg(long)]
    pub limit: Option<usize>,

    /// Samples evaluated in flight at once
    #[arg(long, default_value_t = 1)]
    pub concurrency: usize,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config_builder = Config::builder();
        let mut file_found = args.config.is_some();

        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/viet2sql/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    file_found = true;
                    break;
                }
            }
        }

        let mut config: AppConfig = if file_found {
            config_builder.build()?.try_deserialize()?
        } else {
            AppConfig::default()
        };

        // Command line args take precedence over the file.
        if let Some(host) = &args.host {
            config.web.host = host.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }
        if let Some(url) = &args.database_url {
            config.database.connection_string = url.clone();
        }
        if let Some(model) = &args.model {
            config.llm.model = model.clone();
        }

        // The key is resolved once here so nothing else reads the
        // environment; the finished AppConfig is read-only afterwards.
        if config.llm.api_key.is_none() {
            config.llm.api_key = std::env::var("GEMINI_API_KEY").ok();
        }

        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                connection_string: "host=localhost user=postgres dbname=viet2sql".to_string(),
                pool_size: 5,
                statement_timeout_ms: 10_000,
            },
            web: WebConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            llm: LlmConfig {
                backend: "gemini".to_string(),
                model: "gemini-2.5-flash".to_string(),
                api_key: None,
                api_url: None,
                request_timeout_secs: 60,
            },
        }
    }
}
