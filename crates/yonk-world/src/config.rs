//! Layered configuration loading.
//!
//! Sources, lowest precedence first: built-in defaults, an optional config
//! file (format chosen by extension), then `YONK_*` environment variables.
//! Nested keys use a double underscore, e.g. `YONK_MAX_LIFE_SECONDS` or
//! `YONK_ACCESS__RESOLVE_IDENTITY`.

use std::path::Path;

use tracing::debug;
use yonk_core::config::WorldConfig;
use yonk_core::error::ConfigError;

fn load_error(e: config::ConfigError) -> ConfigError {
    ConfigError::Load(e.to_string())
}

/// Load and validate a [`WorldConfig`].
///
/// A missing `path` is an error; pass `None` to use defaults and the
/// environment only.
pub fn load(path: Option<&Path>) -> Result<WorldConfig, ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(config::Config::try_from(&WorldConfig::default()).map_err(load_error)?);

    if let Some(path) = path {
        debug!(path = %path.display(), "loading config file");
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("YONK")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let cfg: WorldConfig = builder
        .build()
        .map_err(load_error)?
        .try_deserialize()
        .map_err(load_error)?;
    cfg.validate()?;
    Ok(cfg)
}
