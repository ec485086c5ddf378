//! # Config Loader
//!
//! Loads the run configuration shared by the device (`acquire`) and the host
//! (`sync`, `process`).
//!
//! - TOML or JSON, chosen by file extension
//! - Every section is optional; missing fields take the device defaults
//! - The result is validated before it is returned
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("fpm.toml")).unwrap();
//! println!("Artifacts per run: {}", blueprint.expected_artifacts());
//! ```

mod parser;
mod validator;

pub use contracts::RunBlueprint;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate the file at `path`
    ///
    /// # Errors
    /// Unknown extension, unreadable file, parse failure or the first
    /// validation failure.
    pub fn load_from_path(path: &Path) -> Result<RunBlueprint, ContractError> {
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content, format)
    }

    /// Parse and validate `content`
    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<RunBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Validate an already constructed blueprint (e.g. after CLI overrides)
    pub fn validate(blueprint: &RunBlueprint) -> Result<(), ContractError> {
        validator::validate(blueprint)
    }

    /// Serialize to TOML; every default is written out
    pub fn to_toml(blueprint: &RunBlueprint) -> Result<String, ContractError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize to JSON
    pub fn to_json(blueprint: &RunBlueprint) -> Result<String, ContractError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_TOML: &str = r#"
[acquisition]
positions = 8
exposures = [1000, 5000, 10000]

[remote]
host = "fpmscope.lan"

[sync]
local_dir = "/tmp/fpm_data"

[processing]
reference_position = 3
chunk_size = 4
"#;

    #[test]
    fn test_load_from_str_toml() {
        let result = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.acquisition.positions, 8);
        assert_eq!(bp.remote.host, "fpmscope.lan");
        assert_eq!(bp.expected_artifacts(), 24);
    }

    #[test]
    fn test_round_trip_toml() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(bp.acquisition.exposures, bp2.acquisition.exposures);
        assert_eq!(bp.sync.local_dir, bp2.sync.local_dir);
        assert_eq!(bp.processing.chunk_size, bp2.processing.chunk_size);
    }

    #[test]
    fn test_round_trip_json() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(bp.remote.host, bp2.remote.host);
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = r#"
[acquisition]
positions = 4
exposures = [1000, 1000]

[processing]
reference_position = 0
"#;
        let result = ConfigLoader::load_from_str(content, ConfigFormat::Toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn test_load_from_path_detects_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, MINIMAL_TOML).unwrap();
        let bp = ConfigLoader::load_from_path(&path).unwrap();
        assert_eq!(bp.acquisition.positions, 8);

        let bad = dir.path().join("run.yaml");
        std::fs::write(&bad, MINIMAL_TOML).unwrap();
        assert!(ConfigLoader::load_from_path(&bad).is_err());
    }
}
