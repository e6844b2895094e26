use std::collections::HashSet;

use super::{types::Config, ConfigError, QUERY_PLACEHOLDER};

/// Validate configuration
/// Currently validates:
/// - Server and stream ports are not 0 and differ
/// - At least one quality tag
/// - Download-ahead percentage is at most 100
/// - Provider ids are unique and every URL template takes the query
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }
    if config.stream.port == 0 {
        return Err(invalid("stream.port cannot be 0"));
    }
    if config.server.port == config.stream.port {
        return Err(invalid(format!(
            "server.port and stream.port must differ (both {})",
            config.server.port
        )));
    }

    if config.discovery.qualities.is_empty() {
        return Err(invalid("discovery.qualities cannot be empty"));
    }
    if config.session.download_ahead_percent > 100 {
        return Err(invalid(format!(
            "session.download_ahead_percent must be at most 100, got {}",
            config.session.download_ahead_percent
        )));
    }

    let mut seen = HashSet::new();
    for provider in &config.discovery.providers {
        if !seen.insert(provider.id.as_str()) {
            return Err(invalid(format!("duplicate provider id '{}'", provider.id)));
        }
        if !provider.url.contains(QUERY_PLACEHOLDER) {
            return Err(invalid(format!(
                "provider '{}' url must contain {}",
                provider.id, QUERY_PLACEHOLDER
            )));
        }
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}
