//! Process-wide configuration knobs, loaded once at startup.
//!
//! Grounded in the teacher crate's use of the `config` crate for layered
//! configuration (defaults, then an optional file, then environment
//! variables prefixed `HEAPBASE_`).

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    /// Number of frames in the buffer pool.
    pub pool_size: usize,
    /// Path to the backing database file.
    pub db_path: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        DbConfig {
            pool_size: 64,
            db_path: "heapbase.db".to_string(),
        }
    }
}

impl DbConfig {
    /// Loads configuration from (in increasing priority): built-in defaults,
    /// an optional `heapbase.toml` in the working directory, then
    /// `HEAPBASE_*` environment variables.
    pub fn load() -> crate::common::error::Result<Self> {
        let defaults = DbConfig::default();
        let settings = config::Config::builder()
            .set_default("pool_size", defaults.pool_size as i64)
            .map_err(config_err)?
            .set_default("db_path", defaults.db_path.clone())
            .map_err(config_err)?
            .add_source(config::File::with_name("heapbase").required(false))
            .add_source(config::Environment::with_prefix("HEAPBASE"))
            .build()
            .map_err(config_err)?;

        settings.try_deserialize().map_err(config_err)
    }
}

fn config_err(err: config::ConfigError) -> crate::common::error::Error {
    crate::common::error::Error::invalid_argument(err.to_string())
}
