//! Pipeline statistics.

use std::time::Duration;

use chrono::{DateTime, Local};
use processing::ProcessingReport;
use sync_engine::SessionReport;

/// Statistics from a host-side run
#[derive(Debug)]
pub struct PipelineStats {
    /// Wall-clock start
    pub started_at: DateTime<Local>,

    /// Total duration of the run
    pub duration: Duration,

    /// Sync session result (absent for `process`)
    pub session: Option<SessionReport>,

    /// Batch pipeline result (absent unless processing ran)
    pub processing: Option<ProcessingReport>,
}

impl PipelineStats {
    /// Downloaded artifacts per second
    pub fn download_rate(&self) -> f64 {
        let Some(ref session) = self.session else {
            return 0.0;
        };
        let secs = session.elapsed.as_secs_f64();
        if secs > 0.0 {
            session.pool.succeeded() as f64 / secs
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    fpm-sync Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Started: {}", self.started_at.format("%Y-%m-%d %H:%M:%S"));
        println!("   └─ Duration: {:.2}s", self.duration.as_secs_f64());

        if let Some(ref session) = self.session {
            println!("\n📥 Sync");
            match session.run_exit {
                Some(ref exit) => println!(
                    "   ├─ Remote run: {} (code {:?}, {} lines)",
                    if exit.success { "ok" } else { "failed" },
                    exit.code,
                    exit.lines
                ),
                None => println!("   ├─ Remote run: (existing dataset)"),
            }
            println!("   ├─ Discovered: {}", session.discovered);
            println!("   ├─ Downloaded: {}", session.pool.succeeded());
            println!("   ├─ Failed: {}", session.pool.failed());
            println!("   ├─ Rate: {:.2} artifacts/s", self.download_rate());
            println!("   ├─ Polls: {}", session.summary.polls);
            println!("   ├─ New per poll: {}", session.summary.poll_new);
            println!("   ├─ Download time (ms): {}", session.summary.download_ms);
            println!("   └─ Memory gate waits: {}", session.summary.memory_waits);

            let failures: Vec<_> = session.pool.failures().collect();
            if !failures.is_empty() {
                println!("\n⚠️  Failed Artifacts");
                for (name, stage, reason) in failures {
                    println!("   ├─ {} [{}]: {}", name, stage, reason);
                }
            }
        }

        if let Some(ref report) = self.processing {
            println!("\n🧮 Processing");
            println!("   ├─ Positions: {}", report.positions);
            println!("   ├─ Chunks: {}", report.chunks);
            println!("   ├─ Images written: {}", report.images_written);
            println!(
                "   ├─ Mode: {}",
                if report.calibrated { "HDR fusion" } else { "exposure selection" }
            );
            println!("   └─ Duration: {:.2}s", report.elapsed.as_secs_f64());
        }

        println!();
    }
}
