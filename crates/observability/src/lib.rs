//! # Observability
//!
//! 可观测性模块：Tracing + Prometheus 指标。
//!
//! ## 功能
//!
//! - Tracing 初始化 (JSON/Pretty/Compact 格式)
//! - Prometheus 指标导出 (可选)
//! - 同步会话指标聚合与摘要
//!
//! ## 使用示例
//!
//! ```ignore
//! use observability::{init, metrics};
//!
//! observability::init()?;
//!
//! let outcome = watcher.poll(&mut state).await?;
//! metrics::record_poll(outcome.ready, outcome.new.len());
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use ::metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// Re-exports
pub use crate::metrics::{
    record_chunk_processed, record_download, record_downloads_in_flight, record_frame_captured,
    record_memory_gate_wait, record_pattern_resend, record_pattern_set, record_poll,
    record_protocol_failure, MetricsSummary, RunningStats, SessionStatsAggregator, StatsSummary,
};

/// 初始化可观测性（Tracing + Prometheus）
///
/// - Tracing: JSON 格式，支持 RUST_LOG 环境变量
/// - Prometheus: 默认关闭 (`metrics_port = None`)
pub fn init() -> Result<()> {
    init_with_config(ObservabilityConfig::default())
}

/// 可观测性配置
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// 日志格式
    pub log_format: LogFormat,
    /// Prometheus 端口 (None = 禁用)
    pub metrics_port: Option<u16>,
    /// RUST_LOG 未设置时的日志级别
    pub default_log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            metrics_port: None,
            default_log_level: "info".to_string(),
        }
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON 结构化日志（设备端默认，便于远端收集）
    #[default]
    Json,
    /// 人类可读格式
    Pretty,
    /// 紧凑单行格式
    Compact,
}

/// 使用自定义配置初始化
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_log_level));

    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        install_exporter(port)?;
    }

    tracing::debug!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );
    Ok(())
}

/// 仅初始化 Prometheus 指标（Tracing 已由调用方初始化）
pub fn init_metrics_only(port: u16) -> Result<()> {
    install_exporter(port)
}

fn install_exporter(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .with_context(|| format!("Failed to install Prometheus recorder on port {port}"))?;
    describe_metrics();

    tracing::info!(port, "Prometheus metrics endpoint initialized");
    Ok(())
}

/// 为 `fpm_sync_*` 指标注册说明与单位
fn describe_metrics() {
    describe_counter!("fpm_sync_patterns_set_total", "Illumination patterns acknowledged");
    describe_counter!(
        "fpm_sync_pattern_resends_total",
        "Commands re-published after a busy controller became ready"
    );
    describe_counter!(
        "fpm_sync_protocol_failures_total",
        "Illumination commands abandoned, by kind"
    );
    describe_histogram!(
        "fpm_sync_ack_latency_ms",
        Unit::Milliseconds,
        "Time from publish to acknowledgment"
    );
    describe_counter!(
        "fpm_sync_frames_captured_total",
        "Raw frames committed with their marker"
    );
    describe_counter!(
        "fpm_sync_bytes_written_total",
        Unit::Bytes,
        "Raw bytes committed on the device"
    );
    describe_counter!("fpm_sync_polls_total", "Directory listing polls");
    describe_counter!(
        "fpm_sync_artifacts_discovered_total",
        "Marked artifacts dispatched for download"
    );
    describe_counter!("fpm_sync_downloads_total", "Finished download workers, by status");
    describe_histogram!(
        "fpm_sync_download_duration_ms",
        Unit::Milliseconds,
        "Fetch plus transcode time per artifact"
    );
    describe_gauge!("fpm_sync_downloads_in_flight", "Download workers holding a permit");
    describe_counter!(
        "fpm_sync_memory_gate_waits_total",
        "Admissions delayed by low available memory"
    );
    describe_gauge!(
        "fpm_sync_available_memory_bytes",
        Unit::Bytes,
        "Available memory at the last gate wait"
    );
    describe_counter!("fpm_sync_chunks_processed_total", "Batch chunks flushed");
    describe_histogram!(
        "fpm_sync_chunk_duration_ms",
        Unit::Milliseconds,
        "Load, fuse and write time per chunk"
    );
}
