//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::RunBlueprint;
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    positions: u32,
    exposures: usize,
    expected_artifacts: usize,
    device: String,
    fusion: bool,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    positions: blueprint.acquisition.positions,
                    exposures: blueprint.acquisition.exposures.len(),
                    expected_artifacts: blueprint.expected_artifacts(),
                    device: blueprint.remote.host.clone(),
                    fusion: blueprint.processing.fusion,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &RunBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.camera.capture_command.is_none() {
        warnings.push(
            "camera.capture_command is not set - the device will capture synthetic frames"
                .to_string(),
        );
    }

    if blueprint.processing.fusion && blueprint.acquisition.exposures.len() < 2 {
        warnings.push("processing.fusion with a single exposure only rescales the image".to_string());
    }

    if blueprint.illumination.stall_timeout_ms == 0 {
        warnings.push(
            "illumination.stall_timeout_ms is 0 - a silent controller blocks acquisition forever"
                .to_string(),
        );
    }

    if blueprint.remote.artifact_dir != blueprint.acquisition.artifact_dir {
        warnings.push(format!(
            "remote.artifact_dir ({}) differs from acquisition.artifact_dir ({})",
            blueprint.remote.artifact_dir.display(),
            blueprint.acquisition.artifact_dir.display()
        ));
    }

    if !blueprint.sync.remove_dark_level {
        warnings.push("sync.remove_dark_level is disabled - HDR fusion sees the sensor pedestal".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Positions: {}", summary.positions);
            println!("  Exposures: {}", summary.exposures);
            println!("  Artifacts per run: {}", summary.expected_artifacts);
            println!("  Device: {}", summary.device);
            println!("  HDR fusion: {}", summary.fusion);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_blueprint_warnings() {
        let warnings = collect_warnings(&RunBlueprint::default());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("capture_command"));
    }

    #[test]
    fn test_missing_file_is_invalid() {
        let args = ValidateArgs {
            config: "/nonexistent/fpm.toml".into(),
            json: true,
        };
        let result = validate_config(&args);
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("File not found"));
    }

    #[test]
    fn test_valid_file_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fpm.toml");
        std::fs::write(
            &path,
            "[acquisition]\npositions = 4\nexposures = [1000, 5000]\n\n[processing]\nreference_position = 1\n",
        )
        .unwrap();

        let result = validate_config(&ValidateArgs {
            config: path,
            json: false,
        });
        assert!(result.valid, "{:?}", result.error);
        let summary = result.summary.unwrap();
        assert_eq!(summary.positions, 4);
        assert_eq!(summary.expected_artifacts, 8);
    }
}
