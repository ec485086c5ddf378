//! Batch Processing Pipeline
//!
//! Positions are processed in contiguous chunks. A chunk is loaded and
//! demosaiced image by image behind the memory gate, then every position of
//! the chunk is fused (or its chosen exposure selected) and written. Only
//! after the whole chunk is flushed is the next one loaded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{
    max_value_for, CameraConfig, CfaPattern, Channel, Exposure, Position, ProcessingConfig,
};
use sync_engine::{read_gray16_png, MemoryGate};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use crate::dataset::Dataset;
use crate::demosaic::{demosaic_bilinear, ColorImage, Mosaic};
use crate::error::{ProcessingError, Result};
use crate::hdr::{calibrate, fuse_hdr, CalibrationResponse, DebevecParams};
use crate::output::write_position;

/// Pipeline settings
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub output_dir: PathBuf,
    /// Positions per chunk
    pub chunk_size: usize,
    pub fusion: bool,
    /// Position whose burst calibrates the response
    pub reference_position: Position,
    /// Exposure index used when fusion is off
    pub exposure_chosen_idx: usize,
    /// Single channel to produce, all three when `None`
    pub channel: Option<Channel>,
    pub pattern: CfaPattern,
    pub bit_depth: u8,
    pub debevec: DebevecParams,
}

impl PipelineSettings {
    pub fn from_config(processing: &ProcessingConfig, camera: &CameraConfig) -> Self {
        Self {
            output_dir: processing.output_dir.clone(),
            chunk_size: processing.chunk_size,
            fusion: processing.fusion,
            reference_position: Position(processing.reference_position),
            exposure_chosen_idx: processing.exposure_chosen_idx,
            channel: processing.channel,
            pattern: camera.pattern,
            bit_depth: camera.bit_depth,
            debevec: DebevecParams::default(),
        }
    }

    fn channels(&self) -> Vec<Channel> {
        self.channel.into_iter().collect()
    }
}

/// Pipeline result
#[derive(Debug, Clone)]
pub struct ProcessingReport {
    pub positions: u32,
    pub chunks: usize,
    pub images_written: usize,
    /// Whether a response curve was computed
    pub calibrated: bool,
    pub elapsed: Duration,
}

/// Batch Processing Pipeline
pub struct BatchPipeline {
    settings: PipelineSettings,
    gate: Arc<MemoryGate>,
}

impl BatchPipeline {
    pub fn new(settings: PipelineSettings, gate: Arc<MemoryGate>) -> Self {
        Self { settings, gate }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Process the whole dataset
    ///
    /// # Errors
    /// Fails on unreadable images, a missing reference position or chosen
    /// exposure, or a fusion precondition violation. Any error aborts the
    /// dataset; chunks already flushed stay on disk.
    #[instrument(
        name = "batch_pipeline_run",
        skip(self, dataset),
        fields(positions = dataset.positions(), fusion = self.settings.fusion)
    )]
    pub async fn run(&self, dataset: &Dataset) -> Result<ProcessingReport> {
        let start = Instant::now();
        let out_dir = &self.settings.output_dir;
        std::fs::create_dir_all(out_dir)
            .map_err(|e| ProcessingError::dataset(out_dir, e.to_string()))?;

        let exposures = self.selected_exposures(dataset)?;
        let response = if self.settings.fusion {
            Some(Arc::new(self.calibrate_reference(dataset, &exposures).await?))
        } else {
            None
        };

        let positions: Vec<Position> = (0..dataset.positions()).map(Position).collect();
        let mut images_written = 0;
        let mut chunks = 0;
        for chunk in positions.chunks(self.settings.chunk_size.max(1)) {
            let chunk_start = Instant::now();
            let bursts = self.load_chunk(dataset, chunk, &exposures).await?;
            images_written += self.flush_chunk(bursts, &exposures, response.clone()).await?;
            chunks += 1;

            observability::record_chunk_processed(chunk.len(), chunk_start.elapsed());
            info!(
                chunk = chunks,
                first = %chunk[0],
                positions = chunk.len(),
                elapsed_ms = chunk_start.elapsed().as_millis() as u64,
                "Chunk flushed"
            );
        }

        Ok(ProcessingReport {
            positions: dataset.positions(),
            chunks,
            images_written,
            calibrated: response.is_some(),
            elapsed: start.elapsed(),
        })
    }

    fn selected_exposures(&self, dataset: &Dataset) -> Result<Vec<Exposure>> {
        let all = dataset.exposures();
        if self.settings.fusion {
            return Ok(all.to_vec());
        }
        all.get(self.settings.exposure_chosen_idx)
            .map(|e| vec![*e])
            .ok_or_else(|| {
                ProcessingError::dataset(
                    dataset.dir(),
                    format!(
                        "exposure index {} out of range ({} exposures)",
                        self.settings.exposure_chosen_idx,
                        all.len()
                    ),
                )
            })
    }

    async fn calibrate_reference(
        &self,
        dataset: &Dataset,
        exposures: &[Exposure],
    ) -> Result<CalibrationResponse> {
        let reference = self.settings.reference_position;
        if reference.index() >= dataset.positions() {
            return Err(ProcessingError::dataset(
                dataset.dir(),
                format!(
                    "reference position {reference} out of range ({} positions)",
                    dataset.positions()
                ),
            ));
        }

        let burst = self
            .load_chunk(dataset, &[reference], exposures)
            .await?
            .remove(&reference)
            .unwrap_or_default();

        let exposures = exposures.to_vec();
        let max_value = max_value_for(self.settings.bit_depth);
        let params = self.settings.debevec;
        let response = tokio::task::spawn_blocking(move || {
            calibrate(&burst, &exposures, max_value, params)
        })
        .await
        .map_err(|e| ProcessingError::worker(e.to_string()))??;

        info!(
            reference = %reference,
            channels = response.channels().count(),
            "Response curve calibrated"
        );
        Ok(response)
    }

    /// Load and demosaic every image of `chunk`, bursts ordered by exposure
    async fn load_chunk(
        &self,
        dataset: &Dataset,
        chunk: &[Position],
        exposures: &[Exposure],
    ) -> Result<BTreeMap<Position, Vec<ColorImage>>> {
        let channels = self.settings.channels();
        let pattern = self.settings.pattern;

        let mut loads: Vec<(Position, JoinHandle<Result<ColorImage>>)> = Vec::new();
        for &position in chunk {
            for &exposure in exposures {
                let path = dataset
                    .path(position, exposure)
                    .ok_or_else(|| {
                        ProcessingError::dataset(
                            dataset.dir(),
                            format!("missing image for position {position} at {exposure}"),
                        )
                    })?
                    .to_path_buf();

                let permit = self.gate.admit().await?;
                let channels = channels.clone();
                let handle = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    load_image(&path, pattern, &channels)
                });
                loads.push((position, handle));
            }
        }

        let mut bursts: BTreeMap<Position, Vec<ColorImage>> = BTreeMap::new();
        for (position, handle) in loads {
            let image = handle
                .await
                .map_err(|e| ProcessingError::worker(e.to_string()))??;
            bursts.entry(position).or_default().push(image);
        }
        debug!(positions = bursts.len(), "Chunk loaded");
        Ok(bursts)
    }

    /// Fuse or select, then write; returns the number of files written
    async fn flush_chunk(
        &self,
        bursts: BTreeMap<Position, Vec<ColorImage>>,
        exposures: &[Exposure],
        response: Option<Arc<CalibrationResponse>>,
    ) -> Result<usize> {
        let max_value = max_value_for(self.settings.bit_depth);

        let mut writes = Vec::with_capacity(bursts.len());
        for (position, burst) in bursts {
            let exposures = exposures.to_vec();
            let response = response.clone();
            let out_dir = self.settings.output_dir.clone();
            writes.push(tokio::task::spawn_blocking(move || {
                let image = match response {
                    Some(response) => fuse_hdr(&burst, &exposures, &response, max_value)?,
                    None => burst.into_iter().next().ok_or(
                        ProcessingError::FusionPrecondition {
                            exposures: exposures.len(),
                            images: 0,
                        },
                    )?,
                };
                write_position(&out_dir, position, &image)
            }));
        }

        let mut written = 0;
        for handle in writes {
            written += handle
                .await
                .map_err(|e| ProcessingError::worker(e.to_string()))??
                .len();
        }
        Ok(written)
    }
}

/// Read one normalized image and demosaic it
pub fn load_image(path: &Path, pattern: CfaPattern, channels: &[Channel]) -> Result<ColorImage> {
    let (width, height, samples) = read_gray16_png(path)?;
    let mosaic = Mosaic::new(width, height, samples)?;
    Ok(demosaic_bilinear(&mosaic, pattern, channels))
}
