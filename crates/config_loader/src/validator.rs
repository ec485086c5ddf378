//! 配置校验模块
//!
//! 校验规则：
//! - positions > 0，exposures 非空、为正且不重复
//! - topic 段非空且不含 '/'
//! - 相机尺寸与位深合法
//! - 远端 host / 启动命令齐全
//! - 同步与批处理参数在范围内 (dark_level、chunk_size、reference_position ...)

use std::collections::HashSet;

use contracts::{max_value_for, ContractError, RunBlueprint};

/// 校验 RunBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &RunBlueprint) -> Result<(), ContractError> {
    validate_acquisition(blueprint)?;
    validate_illumination(blueprint)?;
    validate_camera(blueprint)?;
    validate_remote(blueprint)?;
    validate_sync(blueprint)?;
    validate_processing(blueprint)?;
    Ok(())
}

/// 校验采集序列
fn validate_acquisition(blueprint: &RunBlueprint) -> Result<(), ContractError> {
    let acq = &blueprint.acquisition;

    if acq.positions == 0 {
        return Err(ContractError::config_validation(
            "acquisition.positions",
            "positions must be > 0",
        ));
    }

    if acq.exposures.is_empty() {
        return Err(ContractError::config_validation(
            "acquisition.exposures",
            "at least one exposure is required",
        ));
    }

    // 相同曝光会生成同名文件
    let mut seen = HashSet::new();
    for (idx, exposure) in acq.exposures.iter().enumerate() {
        if exposure.micros() == 0 {
            return Err(ContractError::config_validation(
                format!("acquisition.exposures[{idx}]"),
                "exposure must be > 0 us",
            ));
        }
        if !seen.insert(exposure.micros()) {
            return Err(ContractError::config_validation(
                format!("acquisition.exposures[{idx}]"),
                format!("duplicate exposure {exposure}"),
            ));
        }
    }

    if acq.artifact_dir.as_os_str().is_empty() {
        return Err(ContractError::config_validation(
            "acquisition.artifact_dir",
            "artifact_dir cannot be empty",
        ));
    }

    Ok(())
}

/// 校验照明控制器配置
fn validate_illumination(blueprint: &RunBlueprint) -> Result<(), ContractError> {
    let ill = &blueprint.illumination;

    for (field, value) in [
        ("illumination.setup_id", &ill.setup_id),
        ("illumination.device_id", &ill.device_id),
    ] {
        if value.is_empty() || value.contains('/') {
            return Err(ContractError::config_validation(
                field,
                format!("'{value}' must be a non-empty topic segment without '/'"),
            ));
        }
    }

    if ill.broker_host.is_empty() {
        return Err(ContractError::config_validation(
            "illumination.broker_host",
            "broker_host cannot be empty",
        ));
    }

    if ill.ack_poll_ms == 0 {
        return Err(ContractError::config_validation(
            "illumination.ack_poll_ms",
            "ack_poll_ms must be > 0",
        ));
    }

    Ok(())
}

/// 校验相机参数
fn validate_camera(blueprint: &RunBlueprint) -> Result<(), ContractError> {
    let cam = &blueprint.camera;

    if cam.width < 2 || cam.height < 2 {
        return Err(ContractError::config_validation(
            "camera.width / camera.height",
            format!(
                "sensor must be at least 2x2, got {}x{}",
                cam.width, cam.height
            ),
        ));
    }

    if !(1..=16).contains(&cam.bit_depth) {
        return Err(ContractError::config_validation(
            "camera.bit_depth",
            format!("bit_depth must be within 1..=16, got {}", cam.bit_depth),
        ));
    }

    if cam.analog_gain <= 0.0 || cam.digital_gain <= 0.0 {
        return Err(ContractError::config_validation(
            "camera.analog_gain / camera.digital_gain",
            "gains must be > 0",
        ));
    }

    Ok(())
}

/// 校验远端设备配置
fn validate_remote(blueprint: &RunBlueprint) -> Result<(), ContractError> {
    let remote = &blueprint.remote;

    if remote.host.is_empty() {
        return Err(ContractError::config_validation(
            "remote.host",
            "host cannot be empty",
        ));
    }

    if remote.trigger_run && remote.launch_command.trim().is_empty() {
        return Err(ContractError::config_validation(
            "remote.launch_command",
            "launch_command is required when trigger_run = true",
        ));
    }

    // 触发前会执行 rm -f <dir>/*
    let dir = remote.artifact_dir.to_string_lossy();
    if dir.trim_matches('/').is_empty() {
        return Err(ContractError::config_validation(
            "remote.artifact_dir",
            format!("refusing to clear '{dir}' on the device"),
        ));
    }

    if remote.poll_interval_ms == 0 {
        return Err(ContractError::config_validation(
            "remote.poll_interval_ms",
            "poll_interval_ms must be > 0",
        ));
    }

    Ok(())
}

/// 校验同步配置
fn validate_sync(blueprint: &RunBlueprint) -> Result<(), ContractError> {
    let sync = &blueprint.sync;

    let max = max_value_for(blueprint.camera.bit_depth);
    if sync.remove_dark_level && sync.dark_level >= max {
        return Err(ContractError::config_validation(
            "sync.dark_level",
            format!(
                "dark_level ({}) must be below the sensor maximum ({max})",
                sync.dark_level
            ),
        ));
    }

    if sync.max_in_flight == 0 {
        return Err(ContractError::config_validation(
            "sync.max_in_flight",
            "max_in_flight must be > 0",
        ));
    }

    if sync.memory_recheck_ms == 0 {
        return Err(ContractError::config_validation(
            "sync.memory_recheck_ms",
            "memory_recheck_ms must be > 0",
        ));
    }

    if sync.http_timeout_secs == 0 {
        return Err(ContractError::config_validation(
            "sync.http_timeout_secs",
            "http_timeout_secs must be > 0",
        ));
    }

    Ok(())
}

/// 校验批处理配置
fn validate_processing(blueprint: &RunBlueprint) -> Result<(), ContractError> {
    let proc = &blueprint.processing;

    if proc.chunk_size == 0 {
        return Err(ContractError::config_validation(
            "processing.chunk_size",
            "chunk_size must be > 0",
        ));
    }

    if proc.reference_position >= blueprint.acquisition.positions {
        return Err(ContractError::config_validation(
            "processing.reference_position",
            format!(
                "reference_position ({}) must be < acquisition.positions ({})",
                proc.reference_position, blueprint.acquisition.positions
            ),
        ));
    }

    if proc.exposure_chosen_idx >= blueprint.acquisition.exposures.len() {
        return Err(ContractError::config_validation(
            "processing.exposure_chosen_idx",
            format!(
                "exposure_chosen_idx ({}) out of range for {} exposures",
                proc.exposure_chosen_idx,
                blueprint.acquisition.exposures.len()
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Exposure;
    use std::path::PathBuf;

    fn exposures(micros: &[u32]) -> Vec<Exposure> {
        micros.iter().filter_map(|m| Exposure::from_micros(*m)).collect()
    }

    #[test]
    fn test_valid_config() {
        let bp = RunBlueprint::default();
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_zero_positions() {
        let mut bp = RunBlueprint::default();
        bp.acquisition.positions = 0;
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("acquisition.positions"));
    }

    #[test]
    fn test_duplicate_exposure() {
        let mut bp = RunBlueprint::default();
        bp.acquisition.exposures = exposures(&[1000, 5000, 1000]);
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_empty_exposures() {
        let mut bp = RunBlueprint::default();
        bp.acquisition.exposures.clear();
        assert!(validate(&bp).is_err());
    }

    #[test]
    fn test_topic_segment_with_slash() {
        let mut bp = RunBlueprint::default();
        bp.illumination.device_id = "LED/MATRIX".into();
        let err = validate(&bp).unwrap_err();
        assert!(matches!(err, ContractError::ConfigValidation { ref field, .. } if field == "illumination.device_id"));
    }

    #[test]
    fn test_bit_depth_range() {
        let mut bp = RunBlueprint::default();
        bp.camera.bit_depth = 0;
        assert!(validate(&bp).is_err());
        bp.camera.bit_depth = 17;
        assert!(validate(&bp).is_err());
    }

    #[test]
    fn test_root_artifact_dir_rejected() {
        let mut bp = RunBlueprint::default();
        bp.remote.artifact_dir = PathBuf::from("/");
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("refusing"));
    }

    #[test]
    fn test_dark_level_above_sensor_max() {
        let mut bp = RunBlueprint::default();
        bp.camera.bit_depth = 8;
        assert!(validate(&bp).is_err());

        bp.sync.remove_dark_level = false;
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_reference_position_out_of_range() {
        let mut bp = RunBlueprint::default();
        bp.acquisition.positions = 16;
        assert!(validate(&bp).is_err());

        bp.processing.reference_position = 8;
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_exposure_index_out_of_range() {
        let mut bp = RunBlueprint::default();
        bp.processing.exposure_chosen_idx = 5;
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("exposure_chosen_idx"));
    }

    #[test]
    fn test_zero_chunk_size() {
        let mut bp = RunBlueprint::default();
        bp.processing.chunk_size = 0;
        assert!(validate(&bp).is_err());
    }
}
