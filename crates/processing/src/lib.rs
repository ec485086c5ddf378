//! # Processing
//!
//! 批处理流水线：去马赛克 + 多曝光 HDR 融合。
//!
//! - `Dataset`：扫描本地数据集，校验 位置数 × 曝光数 完整性
//! - `demosaic`：双线性 CFA 插值（默认 BGGR）
//! - `hdr`：Debevec 响应曲线标定、加权对数融合、色调映射与重新量化
//! - `BatchPipeline`：按位置分块处理，每块落盘后才加载下一块

pub mod dataset;
pub mod demosaic;
pub mod error;
pub mod hdr;
pub mod output;
pub mod pipeline;

pub use dataset::Dataset;
pub use demosaic::{demosaic_bilinear, ColorImage, Mosaic};
pub use error::{ProcessingError, Result};
pub use hdr::{
    calibrate, fuse_hdr, CalibrationResponse, DebevecParams, ResponseCurve, RESPONSE_BINS,
};
pub use output::{output_name, write_position};
pub use pipeline::{load_image, BatchPipeline, PipelineSettings, ProcessingReport};
