//! Tracing subscriber setup.
//!
//! `RUST_LOG` overrides the default filter. Production emits one JSON object
//! per line for log shippers; other environments get human-readable output.

use crate::config::NodeEnv;
use crate::error::ServiceError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "user_service=info,user_service_rabbitmq=info,user_service_projections=info,user_service_web=info,tower_http=info";

/// Install the global subscriber.
///
/// # Errors
///
/// Returns [`ServiceError::Telemetry`] if a global subscriber is already set.
pub fn init(node_env: NodeEnv) -> Result<(), ServiceError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());

    let (json, pretty) = if node_env.is_production() {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .try_init()
        .map_err(|e| ServiceError::Telemetry(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn second_init_fails_instead_of_panicking() {
        let _ = init(NodeEnv::Test);
        assert!(matches!(init(NodeEnv::Test), Err(ServiceError::Telemetry(_))));
    }
}
