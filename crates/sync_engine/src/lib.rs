//! # Sync Engine
//!
//! 主机侧同步编排（远程触发、目录轮询、下载转码）。
//!
//! 负责：
//! - 通过命令通道（ssh / 本地 shell）启动设备端采集，并清理旧 artifact
//! - 轮询 artifact 目录，仅当 `.done` marker 存在时才视为就绪
//! - 内存闸门控制下的并发下载、暗电平校正与 16 位 PNG 转码
//!
//! ## 使用示例
//!
//! ```ignore
//! use sync_engine::*;
//!
//! let client = http_client(Duration::from_secs(30))?;
//! let index = HttpIndex::new(client.clone(), "http://fpmscope.local/fpm_data/")?;
//! let fetcher = HttpFetcher::new(client, "http://fpmscope.local/fpm_data/");
//!
//! let trigger = RemoteTrigger::new(SshChannel, "/var/www/fpm_data");
//! let run = trigger.start_run("fpmscope.local", &credentials, "fpm-sync acquire")?;
//!
//! let gate = Arc::new(MemoryGate::system(GateConfig::default()));
//! let pool = DownloadPool::new(fetcher, gate, TranscodeOptions::default(), "fpm_data")?;
//! let report = SyncSession::new(DirectoryWatcher::new(index), pool, SessionConfig::default())
//!     .run(SessionMode::NewRun(run))
//!     .await?;
//! ```

mod error;
mod http;
mod local;
mod memory;
mod pool;
mod session;
mod transcode;
mod trigger;
mod watcher;

pub use error::{Result, SyncError};
pub use http::{http_client, HttpFetcher, HttpIndex, ListingParser};
pub use local::{LocalFetcher, LocalIndex};
pub use memory::{FixedMemory, GateConfig, MemoryGate, MemoryPermit, MemoryProbe, SystemMemory};
pub use pool::{
    ArtifactFetcher, DownloadPool, FailureStage, LocalArtifactFetcher, PoolReport, TranscodeOutcome,
};
pub use session::{SessionConfig, SessionMode, SessionReport, SyncSession};
pub use transcode::{
    correct_dark_level, read_gray16_png, transcode, write_gray16_png, TranscodeOptions,
};
pub use trigger::{
    compose_command, CommandChannel, Credentials, LocalShell, RemoteTrigger, RunExit, RunHandle,
    SshChannel,
};
pub use watcher::{
    ready_artifacts, ArtifactIndex, DirectoryWatcher, LocalArtifactIndex, PollOutcome,
};
