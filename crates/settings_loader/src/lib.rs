//! # Settings Loader
//!
//! Loads [`ImportSettings`] for the trade import pipeline from JSON files,
//! usually `settings.json` next to the binary's working directory.
//!
//! Every field of the settings file is optional; a missing file falls back to
//! the defaults so an import never depends on configuration being present.
//!
//! ## Usage Examples
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//!
//! // Load settings from a specific path
//! let settings = settings_loader::load_settings("config/import.json")?;
//!
//! // Load optional settings, falling back to ./settings.json and then defaults
//! let path = Some(PathBuf::from("settings.json"));
//! let settings = settings_loader::load_settings_or_default(path.as_ref())?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use models::ImportSettings;
use tracing::{debug, info};

pub const DEFAULT_SETTINGS_FILE: &str = "settings.json";

/// Loads settings from a JSON file
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<ImportSettings> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Reading settings file: {}", path.display()))?;
    let settings: ImportSettings = serde_json::from_str(&raw)
        .with_context(|| format!("Parsing settings JSON in {}", path.display()))?;
    validate_settings(&settings).with_context(|| format!("Invalid settings in {}", path.display()))?;
    info!("Loaded import settings from {}", path.display());
    Ok(settings)
}

/// Loads the explicit path if given (errors are reported), otherwise
/// `settings.json` if it exists, otherwise defaults.
pub fn load_settings_or_default(path: Option<&PathBuf>) -> Result<ImportSettings> {
    if let Some(settings_path) = path {
        return load_settings(settings_path);
    }

    if settings_file_exists(DEFAULT_SETTINGS_FILE) {
        return load_settings(DEFAULT_SETTINGS_FILE);
    }

    debug!("No settings file found, using defaults");
    Ok(ImportSettings::default())
}

/// Checks if a settings file exists at the given path
pub fn settings_file_exists<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref().exists() && path.as_ref().is_file()
}

fn validate_settings(settings: &ImportSettings) -> Result<()> {
    for (symbol, multiplier) in &settings.contract_multipliers {
        if !multiplier.is_finite() || *multiplier <= 0.0 {
            bail!("contract multiplier for {} must be positive, got {}", symbol, multiplier);
        }
    }
    if let Some(account) = &settings.account_id {
        if account.trim().is_empty() {
            bail!("account_id must not be blank");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::Direction;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("settings_loader_{}_{}.json", name, std::process::id()));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_settings_reads_fields() {
        let path = write_temp(
            "full",
            r#"{"default_direction":"short","contract_multipliers":{"XYZ":12.5},"account_id":"ACC-1","timezone":"America/Chicago"}"#,
        );
        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.default_direction, Direction::Short);
        assert_eq!(settings.contract_multipliers.get("XYZ"), Some(&12.5));
        assert_eq!(settings.account_id.as_deref(), Some("ACC-1"));
        assert_eq!(settings.timezone.name(), "America/Chicago");
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_load_settings_rejects_bad_multiplier() {
        let path = write_temp("bad", r#"{"contract_multipliers":{"ES":0}}"#);
        let err = load_settings(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("must be positive"));
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_missing_explicit_path_is_an_error() {
        let path = PathBuf::from("/definitely/not/here/settings.json");
        assert!(load_settings_or_default(Some(&path)).is_err());
    }

    #[test]
    fn test_malformed_json_reports_path() {
        let path = write_temp("malformed", "{ not json");
        let err = load_settings(&path).unwrap_err();
        assert!(err.to_string().contains("Parsing settings JSON"));
        fs::remove_file(path).unwrap();
    }
}
