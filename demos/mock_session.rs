//! Mock Session Example
//!
//! Runs a whole acquisition without hardware: a simulated illumination
//! controller and the synthetic camera write into a scratch "device"
//! directory, a sync session downloads frames as their markers appear, and
//! the batch pipeline fuses every burst.
//!
//! Run with: cargo run -p fpm_demos --bin mock_session [config.toml] [work_dir]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use acquisition::{AcquisitionController, AcquisitionPlan, ArtifactStore, SyntheticCamera};
use config_loader::ConfigLoader;
use contracts::{RunBlueprint, Topics};
use illumination::{ClientConfig, IlluminationClient, SimulatedBehavior, SimulatedController};
use processing::{BatchPipeline, Dataset, PipelineSettings};
use sync_engine::{
    DirectoryWatcher, DownloadPool, GateConfig, LocalFetcher, LocalIndex, MemoryGate, RunExit,
    RunHandle, SessionConfig, SessionMode, SyncSession, TranscodeOptions,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    tracing::info!("Starting Mock Session Demo");

    // ==== Stage 1: Use default config or load from file ====
    let blueprint = match std::env::args().nth(1) {
        Some(path) => {
            tracing::info!(path = %path, "Loading blueprint config");
            ConfigLoader::load_from_path(Path::new(&path))?
        }
        None => demo_blueprint(),
    };
    let work_dir = std::env::args()
        .nth(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("fpm_mock_session"));
    let device_dir = work_dir.join("device");
    let local_dir = work_dir.join("local");
    let output_dir = work_dir.join("processed");

    // ==== Stage 2: Start the simulated device ====
    tracing::info!(dir = %device_dir.display(), "Starting simulated device run...");
    let handle = start_device(&blueprint, device_dir.clone());

    // ==== Stage 3: Sync while the device runs ====
    let sync = &blueprint.sync;
    let gate = Arc::new(MemoryGate::system(GateConfig {
        threshold_bytes: sync.memory_threshold_bytes,
        recheck: Duration::from_millis(sync.memory_recheck_ms),
        max_in_flight: sync.max_in_flight,
    }));
    let pool = DownloadPool::new(
        LocalFetcher::new(&device_dir),
        gate,
        TranscodeOptions {
            remove_dark_level: sync.remove_dark_level,
            dark_level: sync.dark_level,
        },
        &local_dir,
    )?;
    let session = SyncSession::new(
        DirectoryWatcher::new(LocalIndex::new(&device_dir)),
        pool,
        SessionConfig {
            poll_interval: Duration::from_millis(50),
            startup_delay: Duration::ZERO,
            clean_local_dir: true,
        },
    );
    let report = session.run(SessionMode::NewRun(handle)).await?;
    tracing::info!(
        discovered = report.discovered,
        downloaded = report.pool.succeeded(),
        failed = report.pool.failed(),
        "Sync complete"
    );
    println!("\n{}", report.summary);

    // ==== Stage 4: Batch processing ====
    let dataset = Dataset::scan(&local_dir)?;
    let mut processing = blueprint.processing.clone();
    processing.output_dir = output_dir.clone();
    let settings = PipelineSettings::from_config(&processing, &blueprint.camera);
    let gate = Arc::new(MemoryGate::system(GateConfig {
        threshold_bytes: processing.memory_threshold_bytes,
        ..GateConfig::default()
    }));
    let processed = BatchPipeline::new(settings, gate).run(&dataset).await?;

    tracing::info!(
        chunks = processed.chunks,
        images = processed.images_written,
        output = %output_dir.display(),
        "Mock session finished"
    );
    Ok(())
}

/// Small sensor and few positions so the demo finishes in seconds
fn demo_blueprint() -> RunBlueprint {
    let mut blueprint = RunBlueprint::default();
    blueprint.acquisition.positions = 9;
    blueprint.camera.width = 64;
    blueprint.camera.height = 48;
    blueprint.processing.reference_position = 4;
    blueprint.processing.chunk_size = 4;
    blueprint.processing.memory_threshold_bytes = 0;
    blueprint.sync.memory_threshold_bytes = 0;
    blueprint.illumination.clear_settle_ms = 10;
    blueprint
}

fn start_device(blueprint: &RunBlueprint, device_dir: PathBuf) -> RunHandle {
    let ill = blueprint.illumination.clone();
    let camera = SyntheticCamera::new(&blueprint.camera).with_exposure_delay(true);
    let plan = AcquisitionPlan::from(&blueprint.acquisition);

    RunHandle::from_future(async move {
        let topics = Topics::new(&ill.setup_id, &ill.device_id);
        let (controller, inbound) = SimulatedController::new(
            topics.clone(),
            SimulatedBehavior::responsive(Duration::from_millis(20)),
        );
        let client = IlluminationClient::new(controller, topics, inbound, ClientConfig::from(&ill));
        let mut acquisition =
            AcquisitionController::new(client, camera, ArtifactStore::new(device_dir), plan);

        let success = match acquisition.run().await {
            Ok(report) => {
                tracing::info!(frames = report.frames, "Device run finished");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Device run failed");
                false
            }
        };
        Ok(RunExit {
            code: Some(if success { 0 } else { 1 }),
            success,
            lines: 0,
        })
    })
}
