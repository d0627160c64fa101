//! Ordered inference demo
//!
//! Pushes a stream of frames through a pipeline whose workers finish in
//! random order, then checks that results came back in submission order
//! and prints the perf counters.
//!
//! Environment:
//!   INFERPIPE_FRAMES            frames to submit (default 200)
//!   INFERPIPE_JITTER_MS         max simulated inference time (default 20)
//!   INFERPIPE_FAIL_AT           frame whose inference fails (default none)
//!   INFERPIPE_MAX_CONCURRENCY   worker slots
//!   INFERPIPE_OUTPUT            output selector (default "prob")
//!   INFERPIPE_EXECUTOR_THREADS  executor threads
//!   RUST_LOG                    log filter (default info)
//!
//! Run: RUST_LOG=debug ./target/release/ordered-infer

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use inferpipe::{
    env_get, env_get_opt, ExecutorConfig, PipelineConfig, SeqId, ThreadedExecutor, WorkerError,
};
use log::{error, info};
use rand::Rng;

const DEFAULT_OUTPUT: &str = "prob";

// ── Report harness ──

struct Report {
    total: usize,
    passed: usize,
    failed: usize,
}

const LINE: &str = "────────────────────────────────────────────────────────────";

impl Report {
    fn new() -> Self {
        Self { total: 0, passed: 0, failed: 0 }
    }

    fn section(&self, name: &str) {
        println!("\n{}", LINE);
        println!("  {}", name);
        println!("{}", LINE);
    }

    fn check(&mut self, name: &str, ok: bool, reason: &str) {
        self.total += 1;
        if ok {
            self.passed += 1;
            println!("  [{:2}] {:<52} PASS", self.total, name);
        } else {
            self.failed += 1;
            println!("  [{:2}] {:<52} FAIL: {}", self.total, name, reason);
        }
    }

    fn summary(&self) {
        println!("\n{}", LINE);
        println!(
            "  Total: {}  Passed: {}  Failed: {}",
            self.total, self.passed, self.failed
        );
        println!("{}", LINE);
    }
}

/// Stand-in for a model: sleeps a random amount and scores the frame.
fn infer(frame: u64, jitter_ms: u64, fail_at: Option<u64>) -> Result<Vec<(String, f32)>, WorkerError> {
    let delay = rand::rng().random_range(0..=jitter_ms);
    thread::sleep(Duration::from_millis(delay));
    if fail_at == Some(frame) {
        return Err(WorkerError::execution(format!("frame {} rejected by model", frame)));
    }
    let score = (frame % 100) as f32 / 100.0;
    Ok(vec![
        (DEFAULT_OUTPUT.to_string(), score),
        ("delay_ms".to_string(), delay as f32),
    ])
}

// ════════════════════════════════════════════════════════════

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let frames: u64 = env_get("INFERPIPE_FRAMES", 200);
    let jitter_ms: u64 = env_get("INFERPIPE_JITTER_MS", 20);
    let fail_at: Option<u64> = env_get_opt("INFERPIPE_FAIL_AT");

    let mut config = PipelineConfig::from_env();
    if config.selector().is_none() {
        config = config.output_selector(DEFAULT_OUTPUT);
    }
    let exec_config = ExecutorConfig::from_env();

    println!("=== inferpipe ordered inference ===");
    println!(
        "    frames: {}  slots: {}  threads: {}  jitter: 0..={} ms",
        frames, config.max_concurrency, exec_config.threads, jitter_ms
    );

    let mut report = Report::new();

    let executor = match ThreadedExecutor::new(exec_config) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            println!("\nFATAL: executor start failed: {}", e);
            std::process::exit(1);
        }
    };
    let pipeline = match inferpipe::threaded_pipeline(&executor, config, move |frame: u64| {
        infer(frame, jitter_ms, fail_at)
    }) {
        Ok(p) => p,
        Err(e) => {
            println!("\nFATAL: pipeline setup failed: {}", e);
            std::process::exit(1);
        }
    };

    report.section("Run");
    let mut delivered: Vec<SeqId> = Vec::with_capacity(frames as usize);
    let mut failure = None;

    for frame in 0..frames {
        if let Err(e) = pipeline.submit_blocking(frame) {
            error!("submit of frame {} failed: {}", frame, e);
            failure = Some(e.to_string());
            break;
        }
        while let Some(result) = pipeline.get_result() {
            delivered.push(result.id);
        }
    }

    if failure.is_none() {
        loop {
            match pipeline.next_result() {
                Ok(Some(result)) => delivered.push(result.id),
                Ok(None) => break,
                Err(e) => {
                    error!("pipeline reported: {}", e);
                    failure = Some(e.to_string());
                    break;
                }
            }
        }
    }
    pipeline.wait_for_total_completion();
    info!(
        "run finished: {} delivered, {} buffered",
        delivered.len(),
        pipeline.buffered_count()
    );

    let in_order = delivered
        .iter()
        .enumerate()
        .all(|(i, id)| id.as_i64() == i as i64);
    report.check("results delivered in submission order", in_order, "order broken");

    match fail_at {
        Some(n) if n < frames => {
            report.check(
                "injected failure surfaced",
                failure.is_some(),
                "no failure reported",
            );
            report.check(
                "nothing delivered past the failed frame",
                delivered.len() as u64 <= n,
                "results leaked past failure",
            );
        }
        _ => {
            report.check(
                "every frame delivered",
                delivered.len() as u64 == frames,
                &format!("{} of {}", delivered.len(), frames),
            );
            report.check(
                "no failure reported",
                failure.is_none(),
                failure.as_deref().unwrap_or(""),
            );
        }
    }

    report.section("Perf");
    let perf = pipeline.perf_info();
    println!("    frames:        {}", perf.frames_count);
    println!("    mean latency:  {:.2} ms", perf.mean_latency().as_secs_f64() * 1000.0);
    println!("    fps:           {:.1}", perf.fps);
    println!("    in use (last): {}", perf.requests_in_use);
    report.check(
        "perf frame count matches delivered",
        perf.frames_count == delivered.len() as u64,
        "counter mismatch",
    );

    drop(pipeline);
    drop(executor);

    report.summary();
    std::process::exit(if report.failed > 0 { 1 } else { 0 });
}
