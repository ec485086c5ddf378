//! FPM 采集/同步指标收集模块
//!
//! 照明协议、采集、目录轮询、下载转码与批处理的运行指标。

use std::collections::BTreeMap;
use std::time::Duration;

use contracts::{Exposure, Position};
use metrics::{counter, gauge, histogram};

/// 记录照明图案设置成功 (收到 ack)
pub fn record_pattern_set(position: Position, ack_latency: Duration) {
    counter!("fpm_sync_patterns_set_total").increment(1);
    gauge!("fpm_sync_last_position").set(f64::from(position.index()));
    histogram!("fpm_sync_ack_latency_ms").record(ack_latency.as_secs_f64() * 1000.0);
}

/// 记录命令重发 (控制器 Busy → Ready)
pub fn record_pattern_resend() {
    counter!("fpm_sync_pattern_resends_total").increment(1);
}

/// 记录照明协议失败 (停滞或重发耗尽)
pub fn record_protocol_failure(kind: &str) {
    counter!(
        "fpm_sync_protocol_failures_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// 记录一帧已落盘并写入 marker
pub fn record_frame_captured(exposure: Exposure, bytes: usize) {
    counter!(
        "fpm_sync_frames_captured_total",
        "exposure_us" => exposure.micros().to_string()
    )
    .increment(1);
    counter!("fpm_sync_bytes_written_total").increment(bytes as u64);
}

/// 记录一次目录轮询
pub fn record_poll(ready: usize, new: usize) {
    counter!("fpm_sync_polls_total").increment(1);
    gauge!("fpm_sync_artifacts_ready").set(ready as f64);
    if new > 0 {
        counter!("fpm_sync_artifacts_discovered_total").increment(new as u64);
    }
}

/// 记录下载转码结果
pub fn record_download(success: bool, duration: Duration) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "fpm_sync_downloads_total",
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("fpm_sync_download_duration_ms").record(duration.as_secs_f64() * 1000.0);
}

/// 记录当前在途下载数
pub fn record_downloads_in_flight(in_flight: usize) {
    gauge!("fpm_sync_downloads_in_flight").set(in_flight as f64);
}

/// 记录内存闸门等待
pub fn record_memory_gate_wait(available_bytes: u64) {
    counter!("fpm_sync_memory_gate_waits_total").increment(1);
    gauge!("fpm_sync_available_memory_bytes").set(available_bytes as f64);
}

/// 记录批处理分块完成
pub fn record_chunk_processed(positions: usize, duration: Duration) {
    counter!("fpm_sync_chunks_processed_total").increment(1);
    counter!("fpm_sync_positions_processed_total").increment(positions as u64);
    histogram!("fpm_sync_chunk_duration_ms").record(duration.as_secs_f64() * 1000.0);
}

/// 同步会话指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct SessionStatsAggregator {
    /// 轮询次数
    pub polls: u64,

    /// 发现的新 artifact 总数
    pub discovered: u64,

    /// 下载成功数
    pub downloads_ok: u64,

    /// 下载失败数
    pub downloads_failed: u64,

    /// 内存闸门等待次数
    pub memory_waits: u64,

    /// 每次轮询新增数量统计
    pub poll_new_stats: RunningStats,

    /// 下载耗时统计 (毫秒)
    pub download_ms_stats: RunningStats,

    /// 各失败原因计数
    pub failure_counts: BTreeMap<String, u64>,
}

impl SessionStatsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次轮询
    pub fn update_poll(&mut self, new: usize) {
        self.polls += 1;
        self.discovered += new as u64;
        self.poll_new_stats.push(new as f64);
    }

    /// 记录一次下载结果
    pub fn update_download(&mut self, duration: Duration, failure: Option<&str>) {
        self.download_ms_stats.push(duration.as_secs_f64() * 1000.0);
        match failure {
            None => self.downloads_ok += 1,
            Some(reason) => {
                self.downloads_failed += 1;
                *self.failure_counts.entry(reason.to_string()).or_insert(0) += 1;
            }
        }
    }

    /// 记录内存闸门等待
    pub fn update_memory_wait(&mut self) {
        self.memory_waits += 1;
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        let downloads = self.downloads_ok + self.downloads_failed;
        MetricsSummary {
            polls: self.polls,
            discovered: self.discovered,
            downloads_ok: self.downloads_ok,
            downloads_failed: self.downloads_failed,
            failure_rate: if downloads > 0 {
                self.downloads_failed as f64 / downloads as f64 * 100.0
            } else {
                0.0
            },
            memory_waits: self.memory_waits,
            poll_new: StatsSummary::from(&self.poll_new_stats),
            download_ms: StatsSummary::from(&self.download_ms_stats),
            failure_counts: self.failure_counts.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub polls: u64,
    pub discovered: u64,
    pub downloads_ok: u64,
    pub downloads_failed: u64,
    pub failure_rate: f64,
    pub memory_waits: u64,
    pub poll_new: StatsSummary,
    pub download_ms: StatsSummary,
    pub failure_counts: BTreeMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Sync Session Summary ===")?;
        writeln!(f, "Polls: {}", self.polls)?;
        writeln!(f, "Artifacts discovered: {}", self.discovered)?;
        writeln!(
            f,
            "Downloads: {} ok, {} failed ({:.2}%)",
            self.downloads_ok, self.downloads_failed, self.failure_rate
        )?;
        writeln!(f, "Memory gate waits: {}", self.memory_waits)?;
        writeln!(f, "New per poll: {}", self.poll_new)?;
        writeln!(f, "Download time (ms): {}", self.download_ms)?;

        if !self.failure_counts.is_empty() {
            writeln!(f, "Failures:")?;
            for (reason, count) in &self.failure_counts {
                writeln!(f, "  {}: {}", reason, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// 最小值
    pub fn min(&self) -> f64 {
        self.min
    }

    /// 最大值
    pub fn max(&self) -> f64 {
        self.max
    }
}
