//! User service entry point.
//!
//! Exit code 0 after a signal-driven shutdown (even if some resource failed
//! to close), 1 on any startup failure or a lost subscription.

use std::process::ExitCode;
use user_service::{NodeEnv, ServiceConfig, telemetry};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine; the environment may already be set.
    let _ = dotenvy::dotenv();

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            let _ = telemetry::init(NodeEnv::default());
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = telemetry::init(config.node_env) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    match user_service::run(&config).await {
        Ok(report) => {
            for error in report.errors() {
                tracing::warn!(component = %error.component(), error = %error, "Unclean shutdown");
            }
            ExitCode::SUCCESS
        },
        Err(e) => {
            tracing::error!(error = %e, "User service failed");
            ExitCode::FAILURE
        },
    }
}
