use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Prefix of environment overrides. Sections and keys are separated by a
/// double underscore so keys may contain single ones:
/// `REELSTREAM_SESSION__LISTEN_PORT=6881`.
const ENV_PREFIX: &str = "REELSTREAM_";

/// Names the config file; never a config key.
const PATH_VAR: &str = "CONFIG";

fn env_overrides() -> Env {
    Env::prefixed(ENV_PREFIX).ignore(&[PATH_VAR]).split("__")
}

/// Load `path` and apply environment overrides on top.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    Figment::new()
        .merge(Toml::file(path))
        .merge(env_overrides())
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Parse a TOML document without environment overrides.
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}
