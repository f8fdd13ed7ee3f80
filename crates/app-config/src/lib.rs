// In crates/app-config/src/lib.rs

use std::path::Path;

use config::{Config, Environment, File};
use cost_model::LiquidityInfo;

pub mod error;
pub mod types;

// Re-export the most important types for easy access.
pub use error::{Error, Result};
pub use types::{AppSettings, LiquidityFile, Settings};

/// Loads the application settings from the `config/` directory.
pub fn load_settings() -> Result<Settings> {
    load_settings_from(Path::new("config"))
}

/// Loads and validates settings from `dir`.
///
/// Layers, later ones winning:
/// 1. `base.toml`, required.
/// 2. `<APP_ENVIRONMENT>.toml`, optional; the environment defaults to "development".
/// 3. Environment variables with prefix `APP` and separator `__`
///    (e.g., `APP_MONTE_CARLO__TRIALS=5000`).
pub fn load_settings_from(dir: &Path) -> Result<Settings> {
    let environment = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "development".into());

    let settings = Config::builder()
        .add_source(File::from(dir.join("base")))
        .add_source(File::from(dir.join(&environment)).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let mut settings: Settings = settings.try_deserialize()?;
    settings.app.environment = environment;
    settings.validate()?;
    Ok(settings)
}

/// Reads a standalone liquidity table (`[[symbols]]` entries).
pub fn load_liquidity_file(path: &Path) -> Result<Vec<LiquidityInfo>> {
    let content = std::fs::read_to_string(path)?;
    let file: LiquidityFile = toml::from_str(&content)?;
    Ok(file.symbols)
}
