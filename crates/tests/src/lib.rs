//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 设备端与主机端的命名约定一致性
//! - 模拟 e2e 测试（模拟照明控制器 + 合成相机，无需硬件）
//! - 采集中断后的部分同步

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{marker_for, ArtifactKey, Exposure, Position};
    use sync_engine::ready_artifacts;

    #[test]
    fn test_marker_naming_shared_by_device_and_host() {
        let key = ArtifactKey::new(Position(12), Exposure::from_micros(50_000).unwrap());
        let listing = [key.raw_name(), key.marker_name()];
        assert_eq!(marker_for(&key.raw_name()), Some(key.marker_name()));
        assert_eq!(ready_artifacts(&listing), vec![key.raw_name()]);
    }

    #[test]
    fn test_default_config_round_trips() {
        let toml = ConfigLoader::to_toml(&Default::default()).unwrap();
        let blueprint = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();
        assert_eq!(blueprint.expected_artifacts(), 320);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;

    use acquisition::{
        AcquisitionController, AcquisitionPlan, ArtifactStore, SyntheticCamera, SyntheticFaults,
    };
    use contracts::{CameraConfig, Channel, Exposure, Position, ProcessingConfig, Rgb, Topics};
    use illumination::{ClientConfig, IlluminationClient, SimulatedBehavior, SimulatedController};
    use processing::{load_image, output_name, BatchPipeline, Dataset, PipelineSettings};
    use sync_engine::{
        read_gray16_png, DirectoryWatcher, DownloadPool, FixedMemory, GateConfig, LocalFetcher,
        LocalIndex, MemoryGate, RunExit, RunHandle, SessionConfig, SessionMode, SessionReport,
        SyncSession, TranscodeOptions,
    };
    use tempfile::tempdir;

    const EXPOSURES: [u32; 3] = [1_000, 5_000, 20_000];

    fn camera_config() -> CameraConfig {
        CameraConfig {
            width: 8,
            height: 6,
            ..CameraConfig::default()
        }
    }

    fn plan(positions: u32) -> AcquisitionPlan {
        AcquisitionPlan {
            positions,
            exposures: EXPOSURES
                .iter()
                .filter_map(|m| Exposure::from_micros(*m))
                .collect(),
            color: Rgb::RED,
            clean_artifact_dir: true,
        }
    }

    fn gate() -> Arc<MemoryGate> {
        Arc::new(MemoryGate::new(
            Arc::new(FixedMemory::new(u64::MAX)),
            GateConfig {
                threshold_bytes: 0,
                recheck: Duration::from_millis(1),
                max_in_flight: 4,
            },
        ))
    }

    /// Simulated device run writing into `device_dir`, wrapped as a remote run
    fn device_run(device_dir: PathBuf, positions: u32, faults: SyntheticFaults) -> RunHandle {
        RunHandle::from_future(async move {
            let topics = Topics::new("FPMSCOPE", "LEDMATRIX");
            let (sim, status) = SimulatedController::new(
                topics.clone(),
                SimulatedBehavior::responsive(Duration::from_millis(1))
                    .with_busy([1], Duration::from_millis(5)),
            );
            let client = IlluminationClient::new(
                sim,
                topics,
                status,
                ClientConfig {
                    ack_poll: Duration::from_millis(1),
                    max_resends: 3,
                    stall_timeout: Some(Duration::from_millis(500)),
                    clear_settle: Duration::from_millis(1),
                },
            );
            let camera = SyntheticCamera::new(&camera_config()).with_faults(faults);
            let mut controller = AcquisitionController::new(
                client,
                camera,
                ArtifactStore::new(device_dir),
                plan(positions),
            );
            let success = controller.run().await.is_ok();
            Ok(RunExit {
                code: Some(if success { 0 } else { 1 }),
                success,
                lines: 0,
            })
        })
    }

    async fn sync(device_dir: &Path, local_dir: &Path, handle: RunHandle) -> SessionReport {
        let pool = DownloadPool::new(
            LocalFetcher::new(device_dir),
            gate(),
            TranscodeOptions::default(),
            local_dir,
        )
        .unwrap();
        SyncSession::new(
            DirectoryWatcher::new(LocalIndex::new(device_dir)),
            pool,
            SessionConfig {
                poll_interval: Duration::from_millis(2),
                startup_delay: Duration::ZERO,
                clean_local_dir: true,
            },
        )
        .run(SessionMode::NewRun(handle))
        .await
        .unwrap()
    }

    fn settings(output_dir: &Path, fusion: bool) -> PipelineSettings {
        let processing = ProcessingConfig {
            output_dir: output_dir.to_path_buf(),
            chunk_size: 2,
            fusion,
            reference_position: 1,
            exposure_chosen_idx: 1,
            ..ProcessingConfig::default()
        };
        PipelineSettings::from_config(&processing, &camera_config())
    }

    /// Simulated device -> local sync -> HDR fusion
    ///
    /// 验证完整的数据流：
    /// 1. 采集控制器逐位置设置照明并拍摄曝光序列
    /// 2. 同步会话仅下载带完成标记的文件并去除暗电平
    /// 3. 批处理流水线按块融合并写出每个通道
    #[tokio::test]
    async fn test_e2e_simulated_run_fused() {
        let device = tempdir().unwrap();
        let local = tempdir().unwrap();
        let output = tempdir().unwrap();

        let handle = device_run(device.path().to_path_buf(), 5, SyntheticFaults::default());
        let report = sync(device.path(), local.path(), handle).await;

        assert!(report.run_exit.unwrap().success);
        assert_eq!(report.discovered, 15);
        assert_eq!(report.pool.succeeded(), 15);
        assert_eq!(report.pool.failed(), 0);

        let dataset = Dataset::scan(local.path()).unwrap();
        assert_eq!(dataset.positions(), 5);
        assert_eq!(dataset.exposures().len(), 3);

        let processed = BatchPipeline::new(settings(output.path(), true), gate())
            .run(&dataset)
            .await
            .unwrap();
        assert_eq!(processed.chunks, 3);
        assert_eq!(processed.images_written, 15);
        assert!(processed.calibrated);

        for position in 0..5 {
            for channel in Channel::ALL {
                let path = output.path().join(output_name(Position(position), channel));
                let (width, height, samples) = read_gray16_png(&path).unwrap();
                assert_eq!((width, height), (8, 6));
                assert!(samples.iter().any(|&s| s > 0), "{} is black", path.display());
            }
        }
    }

    #[tokio::test]
    async fn test_e2e_selection_matches_chosen_exposure() {
        let device = tempdir().unwrap();
        let local = tempdir().unwrap();
        let output = tempdir().unwrap();

        let handle = device_run(device.path().to_path_buf(), 3, SyntheticFaults::default());
        sync(device.path(), local.path(), handle).await;

        let dataset = Dataset::scan(local.path()).unwrap();
        let processed = BatchPipeline::new(settings(output.path(), false), gate())
            .run(&dataset)
            .await
            .unwrap();
        assert!(!processed.calibrated);

        let chosen = local.path().join("img2_5000us.png");
        let expected = load_image(&chosen, camera_config().pattern, &[]).unwrap();
        for channel in Channel::ALL {
            let (_, _, written) =
                read_gray16_png(&output.path().join(output_name(Position(2), channel))).unwrap();
            assert_eq!(written, expected.plane(channel).unwrap());
        }
    }

    #[tokio::test]
    async fn test_e2e_aborted_run_syncs_committed_frames() {
        let device = tempdir().unwrap();
        let local = tempdir().unwrap();

        // fails on the seventh capture: positions 0 and 1 are complete
        let faults = SyntheticFaults {
            busy: false,
            fail_at: Some(6),
        };
        let handle = device_run(device.path().to_path_buf(), 4, faults);
        let report = sync(device.path(), local.path(), handle).await;

        assert!(!report.run_exit.unwrap().success);
        assert_eq!(report.discovered, 6);
        assert_eq!(report.pool.succeeded(), 6);
        assert!(Dataset::scan(local.path()).is_ok());
    }
}
