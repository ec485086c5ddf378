//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{ArtifactKey, Position, RunBlueprint, Topics};
use serde::Serialize;

use super::load_blueprint;
use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    acquisition: AcquisitionInfo,
    illumination: IlluminationInfo,
    remote: RemoteInfo,
    processing: ProcessingInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    artifacts: Vec<String>,
}

#[derive(Serialize)]
struct AcquisitionInfo {
    positions: u32,
    exposures_us: Vec<u32>,
    color: String,
    artifact_dir: String,
    frame_bytes: usize,
}

#[derive(Serialize)]
struct IlluminationInfo {
    broker: String,
    request_topic: String,
    status_topic: String,
    max_resends: u32,
    stall_timeout_ms: u64,
}

#[derive(Serialize)]
struct RemoteInfo {
    host: String,
    user: String,
    listing_url: String,
    launch_command: String,
    trigger_run: bool,
}

#[derive(Serialize)]
struct ProcessingInfo {
    fusion: bool,
    reference_position: u32,
    chunk_size: usize,
    chunks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<String>,
    output_dir: String,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    let blueprint = load_blueprint(&args.config)?;
    let info = build_config_info(&blueprint, args.artifacts);

    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

/// Raw artifact names a complete run produces, in capture order
fn artifact_names(blueprint: &RunBlueprint) -> Vec<String> {
    (0..blueprint.acquisition.positions)
        .flat_map(|p| {
            blueprint
                .acquisition
                .exposures
                .iter()
                .map(move |&e| ArtifactKey::new(Position(p), e).raw_name())
        })
        .collect()
}

fn build_config_info(blueprint: &RunBlueprint, with_artifacts: bool) -> ConfigInfo {
    let acq = &blueprint.acquisition;
    let ill = &blueprint.illumination;
    let topics = Topics::new(&ill.setup_id, &ill.device_id);
    let camera = &blueprint.camera;
    let proc = &blueprint.processing;

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        acquisition: AcquisitionInfo {
            positions: acq.positions,
            exposures_us: acq.exposures.iter().map(|e| e.micros()).collect(),
            color: acq.color.to_string(),
            artifact_dir: acq.artifact_dir.display().to_string(),
            frame_bytes: camera.width as usize * camera.height as usize * 2,
        },
        illumination: IlluminationInfo {
            broker: format!("{}:{}", ill.broker_host, ill.broker_port),
            request_topic: topics.request,
            status_topic: topics.status,
            max_resends: ill.max_resends,
            stall_timeout_ms: ill.stall_timeout_ms,
        },
        remote: RemoteInfo {
            host: blueprint.remote.host.clone(),
            user: blueprint.remote.user.clone(),
            listing_url: blueprint.remote.listing_url(),
            launch_command: blueprint.remote.launch_command.clone(),
            trigger_run: blueprint.remote.trigger_run,
        },
        processing: ProcessingInfo {
            fusion: proc.fusion,
            reference_position: proc.reference_position,
            chunk_size: proc.chunk_size,
            chunks: (acq.positions as usize).div_ceil(proc.chunk_size.max(1)),
            channel: proc.channel.map(|c| format!("{c:?}")),
            output_dir: proc.output_dir.display().to_string(),
        },
        artifacts: if with_artifacts {
            artifact_names(blueprint)
        } else {
            Vec::new()
        },
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                 fpm-sync Configuration                       ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let acq = &info.acquisition;
    println!("📷 Acquisition");
    println!("   ├─ Version: {}", info.version);
    println!("   ├─ Positions: {}", acq.positions);
    println!("   ├─ Exposures (us): {:?}", acq.exposures_us);
    println!("   ├─ Color: {}", acq.color);
    println!("   ├─ Frame size: {} bytes", acq.frame_bytes);
    println!("   └─ Artifact dir: {}", acq.artifact_dir);

    let ill = &info.illumination;
    println!("\n💡 Illumination");
    println!("   ├─ Broker: {}", ill.broker);
    println!("   ├─ Request topic: {}", ill.request_topic);
    println!("   ├─ Status topic: {}", ill.status_topic);
    println!("   ├─ Max resends: {}", ill.max_resends);
    if ill.stall_timeout_ms == 0 {
        println!("   └─ Stall timeout: disabled");
    } else {
        println!("   └─ Stall timeout: {} ms", ill.stall_timeout_ms);
    }

    let remote = &info.remote;
    println!("\n🌐 Remote");
    println!("   ├─ Device: {}@{}", remote.user, remote.host);
    println!("   ├─ Listing: {}", remote.listing_url);
    println!("   ├─ Launch: {}", remote.launch_command);
    println!("   └─ Trigger run: {}", remote.trigger_run);

    let proc = &info.processing;
    println!("\n🧮 Processing");
    println!("   ├─ Fusion: {}", proc.fusion);
    println!("   ├─ Reference position: {}", proc.reference_position);
    println!("   ├─ Chunks: {} x {} positions", proc.chunks, proc.chunk_size);
    if let Some(ref channel) = proc.channel {
        println!("   ├─ Channel: {}", channel);
    }
    println!("   └─ Output: {}", proc.output_dir);

    if !info.artifacts.is_empty() {
        println!("\n📦 Artifacts ({})", info.artifacts.len());
        for (i, name) in info.artifacts.iter().enumerate() {
            let prefix = if i == info.artifacts.len() - 1 { "└─" } else { "├─" };
            println!("   {} {}", prefix, name);
        }
    }

    println!();
}
