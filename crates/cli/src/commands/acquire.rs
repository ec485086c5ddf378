//! `acquire` command implementation.

use std::time::Duration;

use acquisition::{
    AcquisitionController, AcquisitionPlan, AcquisitionReport, ArtifactStore, SyntheticCamera,
};
use anyhow::{Context, Result};
use contracts::{Camera, MessageTransport, RunBlueprint, Topics};
use illumination::{ClientConfig, IlluminationClient, SimulatedBehavior, SimulatedController};
use tracing::{info, warn};

use super::{init_metrics, load_blueprint, revalidate, setup_shutdown_signal};
use crate::cli::AcquireArgs;
use crate::error::CliError;

/// Ack latency of the in-process controller used by `--simulate`
const SIMULATED_ACK_DELAY: Duration = Duration::from_millis(5);

/// Execute the `acquire` command
pub async fn run_acquire(args: &AcquireArgs) -> Result<()> {
    let mut blueprint = load_blueprint(&args.config)?;

    if let Some(ref dir) = args.artifact_dir {
        info!(dir = %dir.display(), "Overriding artifact directory from CLI");
        blueprint.acquisition.artifact_dir = dir.clone();
    }
    if let Some(ref broker) = args.broker {
        info!(broker = %broker, "Overriding broker host from CLI");
        blueprint.illumination.broker_host = broker.clone();
    }
    if let Some(positions) = args.positions {
        info!(positions, "Overriding position count from CLI");
        blueprint.acquisition.positions = positions;
    }
    revalidate(&blueprint)?;
    init_metrics(args.metrics_port)?;

    let plan = AcquisitionPlan::from(&blueprint.acquisition);
    info!(
        positions = plan.positions,
        exposures = plan.exposures.len(),
        frames = plan.total_frames(),
        artifact_dir = %blueprint.acquisition.artifact_dir.display(),
        simulate = args.simulate,
        "Acquisition configured"
    );

    let report = if args.simulate {
        acquire_simulated(&blueprint, plan).await?
    } else {
        acquire_with_broker(&blueprint, plan).await?
    };

    print_report(&report);
    Ok(())
}

async fn acquire_simulated(
    blueprint: &RunBlueprint,
    plan: AcquisitionPlan,
) -> Result<AcquisitionReport> {
    let topics = topics_for(blueprint);
    let (controller, inbound) = SimulatedController::new(
        topics.clone(),
        SimulatedBehavior::responsive(SIMULATED_ACK_DELAY),
    );
    let client = IlluminationClient::new(
        controller,
        topics,
        inbound,
        ClientConfig::from(&blueprint.illumination),
    );
    let camera = SyntheticCamera::new(&blueprint.camera);
    let store = ArtifactStore::new(&blueprint.acquisition.artifact_dir);

    drive(AcquisitionController::new(client, camera, store, plan)).await
}

#[cfg(feature = "mqtt")]
async fn acquire_with_broker(
    blueprint: &RunBlueprint,
    plan: AcquisitionPlan,
) -> Result<AcquisitionReport> {
    use acquisition::CommandCamera;
    use illumination::MqttTransport;

    let ill = &blueprint.illumination;
    let topics = topics_for(blueprint);
    let (transport, inbound) = MqttTransport::connect(ill, &topics)
        .await
        .with_context(|| {
            format!(
                "Failed to connect to broker at {}:{}",
                ill.broker_host, ill.broker_port
            )
        })?;
    let client = IlluminationClient::new(transport, topics, inbound, ClientConfig::from(ill));
    let store = ArtifactStore::new(&blueprint.acquisition.artifact_dir);

    match blueprint.camera.capture_command {
        Some(ref template) => {
            let camera = CommandCamera::new(template.clone(), std::env::temp_dir())
                .with_probe(blueprint.camera.probe_command.clone());
            drive(AcquisitionController::new(client, camera, store, plan)).await
        }
        None => {
            warn!("camera.capture_command is not set, capturing with the synthetic camera");
            let camera = SyntheticCamera::new(&blueprint.camera);
            drive(AcquisitionController::new(client, camera, store, plan)).await
        }
    }
}

#[cfg(not(feature = "mqtt"))]
async fn acquire_with_broker(
    _blueprint: &RunBlueprint,
    _plan: AcquisitionPlan,
) -> Result<AcquisitionReport> {
    Err(CliError::transport_unavailable("built without the `mqtt` feature, use --simulate").into())
}

/// Run the controller until it finishes or a shutdown signal arrives
async fn drive<T, C>(mut controller: AcquisitionController<T, C>) -> Result<AcquisitionReport>
where
    T: MessageTransport,
    C: Camera,
{
    tokio::select! {
        result = controller.run() => result.context("Acquisition failed"),
        _ = setup_shutdown_signal() => {
            warn!("Received shutdown signal, abandoning acquisition");
            Err(CliError::interrupted("acquisition").into())
        }
    }
}

fn topics_for(blueprint: &RunBlueprint) -> Topics {
    Topics::new(
        &blueprint.illumination.setup_id,
        &blueprint.illumination.device_id,
    )
}

fn print_report(report: &AcquisitionReport) {
    println!("\n=== Acquisition Summary ===\n");
    println!("  Positions: {}", report.positions);
    println!("  Frames committed: {}", report.frames);
    println!("  Stale files removed: {}", report.stale_removed);
    println!("  Duration: {:.2}s", report.elapsed.as_secs_f64());
    println!();
}
