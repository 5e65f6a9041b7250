use clap::Parser;
use r2d2::Pool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

mod config;
mod db;
mod error;
mod eval;
mod llm;
mod pipeline;
mod util;
mod validate;
mod web;

use crate::config::{AppConfig, CliArgs, Command, EvalArgs};
use crate::db::executor::QueryExecutor;
use crate::db::pool::PostgresConnectionManager;
use crate::db::schema_manager::SchemaManager;
use crate::llm::LlmManager;
use crate::pipeline::QueryPipeline;
use crate::util::logging::init_tracing;
use crate::web::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_tracing();

    // Parse command line arguments
    let args = CliArgs::parse();

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    info!("Initializing PostgreSQL connection pool");
    let db_manager =
        PostgresConnectionManager::new(config.database.connection_string.clone());
    let pool = Pool::builder()
        .max_size(config.database.pool_size as u32)
        .build(db_manager)?;

    info!(
        "Initializing LLM manager with backend: {}",
        config.llm.backend
    );
    let llm_manager = Arc::new(LlmManager::new(&config.llm)?);

    let schema_manager = Arc::new(SchemaManager::new(pool.clone()));
    let executor = QueryExecutor::new(
        pool.clone(),
        Duration::from_millis(config.database.statement_timeout_ms),
    );
    let query_pipeline = Arc::new(QueryPipeline::new(
        Arc::clone(&schema_manager),
        llm_manager,
        executor,
    ));

    // Warm the schema cache
    info!("Initializing schema cache");
    match schema_manager.refresh().await {
        Ok(schema) if schema.is_empty() => {
            warn!("No tables found in the public schema; every generated query will be rejected");
        }
        Ok(_) => {}
        Err(e) => {
            error!("Failed to initialize schema cache: {}", e);
            // Continue anyway, it will be refreshed on first use
        }
    }

    match args.command {
        Some(Command::Eval(eval_args)) => run_eval(query_pipeline, eval_args).await,
        None => {
            let app_state = Arc::new(AppState::new(config.clone(), pool, query_pipeline));
            info!(
                "Starting viet2sql server on {}:{}",
                config.web.host, config.web.port
            );
            match web::run_server(config.web, app_state).await {
                Ok(_) => {
                    info!("Server stopped gracefully");
                    Ok(())
                }
                Err(e) => {
                    error!("Server error: {}", e);
                    Err(std::io::Error::other(e.to_string()).into())
                }
            }
        }
    }
}

async fn run_eval(
    query_pipeline: Arc<QueryPipeline>,
    args: EvalArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Loading dataset from {}", args.dataset.display());
    let samples = eval::dataset::load_jsonl(&args.dataset, args.limit)?;
    info!("Loaded {} samples", samples.len());

    let options = eval::EvalOptions {
        concurrency: args.concurrency,
    };
    let summary = eval::run(query_pipeline, samples, &options, &args.out).await?;

    info!(
        "Evaluation complete: {} samples, exact match {:?}, execution success {:?}, result accuracy {:?}",
        summary.total,
        summary.exact_match_rate,
        summary.execution_success_rate,
        summary.result_accuracy_rate
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    info!(
        "Records written to {}, summary to {}",
        args.out.display(),
        eval::report::summary_path(&args.out).display()
    );

    Ok(())
}
