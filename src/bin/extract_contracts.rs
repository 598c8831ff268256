use contracts_extract::{run_extraction, ExtractConfig, QueryWindow};
use log::{error, info};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenv::dotenv();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    let _ = env_logger::try_init();

    let config = match ExtractConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    // RUN_DAY=YYYY-MM-DD re-extracts a specific day
    let day = match std::env::var("RUN_DAY") {
        Ok(raw) if !raw.trim().is_empty() => match QueryWindow::parse(&raw) {
            Ok(window) => Some(window),
            Err(e) => {
                error!("Invalid RUN_DAY '{}': {}", raw, e);
                return ExitCode::FAILURE;
            }
        },
        _ => None,
    };

    info!("Publishing to {} via {:?}", config.bucket, config.storage_backend);

    match run_extraction(config, day).await {
        Ok(summary) => match serde_json::to_string(&summary) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Failed to serialize result: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            error!("Extraction failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
