use std::env;
use std::path::PathBuf;

use crate::scheduler::{Cadence, ExecutionMode};
use crate::timeframe::Timeframe;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub data_dir: PathBuf,
    pub api_port: u16,
    /// Bearer token for the data routes; unset disables the auth check.
    pub api_token: Option<String>,
    pub batch_size: usize,
    /// First pass backfills a one-year window instead of the steady interval.
    pub bootstrap: bool,
    pub scrape_interval: Timeframe,
    pub cadence: Cadence,
    pub execution_mode: ExecutionMode,
    /// 0 disables the retention sweep.
    pub retention_days: i64,
}

impl Config {
    /// Read configuration from the environment (and `.env` if present).
    /// Missing or invalid required settings are fatal — there is no point
    /// starting with a broken configuration.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let database_path = env::var("DATABASE_PATH")
            .expect("DATABASE_PATH must be set")
            .into();

        let data_dir = env::var("DATA_DIR")
            .unwrap_or_else(|_| "data_const".to_string())
            .into();

        let api_port = env::var("API_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .expect("API_PORT must be a valid port number (1-65535)");

        let api_token = env::var("API_TOKEN").ok().filter(|t| !t.is_empty());

        let batch_size = env::var("BATCH_SIZE")
            .unwrap_or_else(|_| "50".to_string())
            .parse::<usize>()
            .expect("BATCH_SIZE must be a positive integer");

        let bootstrap = matches!(
            env::var("FIRST_RUN").unwrap_or_else(|_| "n".to_string()).to_lowercase().as_str(),
            "y" | "yes"
        );

        let scrape_interval = env::var("SCRAPE_INTERVAL")
            .unwrap_or_else(|_| "1h".to_string())
            .parse::<Timeframe>()
            .expect("SCRAPE_INTERVAL must be one of 1h, 1d, 7d, 1M, 1y");

        let cadence = match env::var("SCHEDULE_MODE")
            .unwrap_or_else(|_| "hourly".to_string())
            .to_lowercase()
            .as_str()
        {
            "interval" => {
                let secs = env::var("SCHEDULE_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse::<u64>()
                    .expect("SCHEDULE_INTERVAL_SECONDS must be a positive integer");
                Cadence::EverySeconds(secs)
            }
            "hourly" => {
                let minute = env::var("SCHEDULE_MINUTE")
                    .unwrap_or_else(|_| "0".to_string())
                    .parse::<u32>()
                    .expect("SCHEDULE_MINUTE must be a minute (0-59)");
                assert!(minute < 60, "SCHEDULE_MINUTE must be a minute (0-59)");
                Cadence::HourlyAt(minute)
            }
            other => panic!("SCHEDULE_MODE must be 'interval' or 'hourly', got '{other}'"),
        };

        let execution_mode = env::var("EXECUTION_MODE")
            .unwrap_or_else(|_| "parallel".to_string())
            .parse::<ExecutionMode>()
            .expect("EXECUTION_MODE must be 'sequential' or 'parallel'");

        let retention_days = env::var("RETENTION_DAYS")
            .unwrap_or_else(|_| "366".to_string())
            .parse::<i64>()
            .expect("RETENTION_DAYS must be a non-negative integer");

        Self {
            database_path,
            data_dir,
            api_port,
            api_token,
            batch_size,
            bootstrap,
            scrape_interval,
            cadence,
            execution_mode,
            retention_days,
        }
    }
}
