//! Pipeline Runtime
//!
//! Runs the order pipeline stages over file-backed topics:
//! - Opens the SQLite database and applies the schema
//! - Builds the selected stage processors (stg, dds, cdm)
//! - Runs one batch per stage every `RUN_INTERVAL_SECS` until CTRL+C
//!
//! Usage:
//!   cargo run --release --bin pipeline_runtime -- [--stage stg|dds|cdm|all] [--once]
//!
//! Environment variables: see `PipelineConfig::from_env`.

use dotenv::dotenv;
use log::{error, info};
use orderflow::config::PipelineConfig;
use orderflow::db::open_database;
use orderflow::runtime::{build_processors, parse_once_from_args, run_scheduled, Stage};
use std::env;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let stage = Stage::parse_from_args(&args)?;
    let config = PipelineConfig::from_env()?;
    let interval_secs = if parse_once_from_args(&args) {
        0
    } else {
        config.run_interval_secs
    };

    info!("🚀 Order pipeline runtime");
    info!("   ├─ Stage: {:?}", stage);
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Topics: {}", config.topic_dir);
    info!("   ├─ Batch size: {}", config.batch_size);
    info!("   ├─ Satellite mode: {:?}", config.satellite_mode);
    if interval_secs == 0 {
        info!("   └─ Schedule: single run");
    } else {
        info!("   └─ Schedule: every {}s", interval_secs);
    }

    let conn = open_database(&config.db_path, &config.schema_dir)?;
    let mut processors = build_processors(stage, &config, conn)?;

    if interval_secs == 0 {
        run_scheduled(&mut processors, 0).await?;
        info!("✅ Single run complete");
        return Ok(());
    }

    info!("🔄 Press CTRL+C to shutdown gracefully");

    tokio::select! {
        result = run_scheduled(&mut processors, interval_secs) => {
            if let Err(e) = result {
                error!("❌ Scheduler stopped: {}", e);
                return Err(e.into());
            }
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("⚠️  Received CTRL+C, shutting down..."),
                Err(err) => error!("❌ Failed to listen for CTRL+C: {}", err),
            }
        }
    }

    info!("✅ Pipeline runtime stopped");
    Ok(())
}
