//! 配置解析模块
//!
//! 支持 TOML (主要) 和 JSON (可选) 格式。

use std::path::Path;

use contracts::{ContractError, RunBlueprint};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Format of the file at `path`
    pub fn from_path(path: &Path) -> Result<Self, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;
        Self::from_extension(ext)
            .ok_or_else(|| ContractError::config_parse(format!("unsupported config format: .{ext}")))
    }
}

/// 解析 TOML 格式配置（错误信息含行列位置）
pub fn parse_toml(content: &str) -> Result<RunBlueprint, ContractError> {
    toml::from_str(content).map_err(|e| parse_error("TOML", e))
}

/// 解析 JSON 格式配置
pub fn parse_json(content: &str) -> Result<RunBlueprint, ContractError> {
    serde_json::from_str(content).map_err(|e| parse_error("JSON", e))
}

fn parse_error<E>(format: &str, e: E) -> ContractError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ContractError::ConfigParse {
        message: format!("{format} parse error: {}", e.to_string().trim_end()),
        source: Some(Box::new(e)),
    }
}

/// 根据格式解析配置
pub fn parse(content: &str, format: ConfigFormat) -> Result<RunBlueprint, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{CfaPattern, Channel};

    #[test]
    fn test_parse_toml_sections() {
        let content = r#"
[acquisition]
positions = 16
exposures = [1000, 20000]

[camera]
width = 64
height = 48
pattern = "rggb"

[processing]
channel = "green"
fusion = false
"#;
        let result = parse_toml(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.acquisition.positions, 16);
        assert_eq!(bp.acquisition.exposures.len(), 2);
        assert_eq!(bp.camera.pattern, CfaPattern::Rggb);
        assert_eq!(bp.processing.channel, Some(Channel::Green));
        assert!(!bp.processing.fusion);
        // untouched sections keep their defaults
        assert_eq!(bp.remote.user, "pi");
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "remote": { "host": "10.0.0.7", "trigger_run": false },
            "sync": { "local_dir": "/tmp/fpm", "dark_level": 128 }
        }"#;
        let result = parse_json(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.remote.host, "10.0.0.7");
        assert!(!bp.remote.trigger_run);
        assert_eq!(bp.sync.dark_level, 128);
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let content = "invalid toml [[[";
        let result = parse_toml(content);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_parse_rejects_negative_exposure() {
        let result = parse_toml("[acquisition]\nexposures = [-5]\n");
        assert!(matches!(result, Err(ContractError::ConfigParse { .. })));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_extension("toml"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("TOML"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("json"),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("/etc/fpm/run.json")).unwrap(),
            ConfigFormat::Json
        );
        assert!(ConfigFormat::from_path(Path::new("fpm")).is_err());
    }
}
