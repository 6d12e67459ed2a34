//! Drives a full run: sequential warm-up, the concurrent measured phase and
//! the final report.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use reqwest::Method;
use sketches_ddsketch::DDSketch;
use yansi::Paint;

use crate::config::Config;
use crate::executor::Executor;
use crate::http::Transport;
use crate::keyspace::Keyspace;
use crate::metrics::{Metrics, MetricsSnapshot, Outcome};
use crate::workload::{Action, OpKind, Workload};

/// Everything a finished run produced, per phase.
pub struct RunSummary {
    /// Outcome accounting of the sequential warm-up pass.
    pub warmup: MetricsSnapshot,
    /// Wall time of the warm-up pass.
    pub warmup_elapsed: Duration,
    /// Outcome accounting of the measured phase.
    pub measured: MetricsSnapshot,
    /// Wall time of the measured phase.
    pub elapsed: Duration,
}

impl RunSummary {
    /// Measured operations. Every worker records exactly one outcome per
    /// iteration, so this always equals `workers * ops_per_worker`.
    pub fn total_ops(&self) -> u64 {
        self.measured.total()
    }

    /// Measured operations per second.
    pub fn throughput(&self) -> f64 {
        self.total_ops() as f64 / self.elapsed.as_secs_f64()
    }
}

/// Runs the warm-up pass and the measured phase, prints the report and
/// returns the collected numbers.
pub async fn run(transport: Transport, config: &Config) -> Result<RunSummary> {
    config.validate()?;

    let keyspace = Keyspace::new(config.keyspace_size);
    let workload = Arc::new(Workload::from_config(config)?);
    let seed = config.seed.unwrap_or_else(rand::random);

    // the sequential warm-up pass, with its own accounting
    let warmup_metrics = Arc::new(Metrics::default());
    let warmup_executor = Executor::new(transport.clone(), Arc::clone(&warmup_metrics));
    let mut warmup_rng = SmallRng::seed_from_u64(seed);

    tracing::info!(keys = config.keyspace_size, "starting warm-up");
    let warmup_start = Instant::now();
    for n in 1..=config.keyspace_size {
        let action = Action::Set {
            key: Keyspace::key_for(n),
            value: keyspace.pick_value(&mut warmup_rng),
        };
        warmup_executor.execute(&action).await;
    }
    let warmup_elapsed = warmup_start.elapsed();
    tracing::info!(elapsed = ?warmup_elapsed, "warm-up complete");

    if config.compact_after_warmup {
        match transport.send(Method::POST, "/compact", None).await {
            Ok(exchange) => tracing::info!(status = %exchange.status, "compaction triggered"),
            Err(error) => tracing::warn!(%error, "compaction request failed"),
        }
    }

    // the measured phase: a fixed pool of workers, joined before reporting
    let metrics = Arc::new(Metrics::default());
    let executor = Executor::new(transport, Arc::clone(&metrics));
    let total_ops = config.workers as u64 * config.ops_per_worker as u64;

    // per-call trace lines and a redrawing bar do not mix
    let bar = if config.verbose {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(total_ops)
            .with_style(ProgressStyle::with_template("{msg}\n{wide_bar} {pos}/{len}")?)
            .with_message("Running workload...")
    };
    bar.enable_steady_tick(Duration::from_millis(100));

    tracing::info!(
        workers = config.workers,
        ops_per_worker = config.ops_per_worker,
        "starting workers"
    );
    let start = Instant::now();
    let tasks: Vec<_> = (0..config.workers)
        .map(|worker| {
            let workload = Arc::clone(&workload);
            let executor = executor.clone();
            let rng = SmallRng::seed_from_u64(seed ^ ((worker as u64) << 32));
            let bar = bar.clone();
            let ops = config.ops_per_worker;
            let verbose = config.verbose;
            tokio::spawn(run_worker(worker, ops, workload, executor, rng, verbose, bar))
        })
        .collect();

    for task in futures::future::join_all(tasks).await {
        task.context("worker task panicked")?;
    }
    let elapsed = start.elapsed();
    bar.finish_and_clear();

    let summary = RunSummary {
        warmup: warmup_metrics.snapshot(),
        warmup_elapsed,
        measured: metrics.snapshot(),
        elapsed,
    };
    print_summary(&summary, config);

    Ok(summary)
}

async fn run_worker(
    worker: u32,
    ops: u32,
    workload: Arc<Workload>,
    executor: Executor,
    mut rng: SmallRng,
    verbose: bool,
    bar: ProgressBar,
) {
    for _ in 0..ops {
        let think = workload.jitter(&mut rng);
        if !think.is_zero() {
            tokio::time::sleep(think).await;
        }

        let action = workload.next_action(&mut rng);
        let outcome = executor.execute(&action).await;
        if verbose {
            println!(
                "[worker-{worker}] {} {} -> {outcome}",
                action.kind(),
                action.key()
            );
        }
        bar.inc(1);
    }
}

fn print_summary(summary: &RunSummary, config: &Config) {
    println!();
    println!(
        "{} ({} keys, {:.2?})",
        "## Warm-up".bold(),
        summary.warmup.total().bold().blue(),
        summary.warmup_elapsed
    );
    print_phase(&summary.warmup, summary.warmup_elapsed);

    println!();
    println!(
        "{} ({} workers x {} ops)",
        "## Measured".bold(),
        config.workers.bold().blue(),
        config.ops_per_worker.bold()
    );
    print_phase(&summary.measured, summary.elapsed);

    println!();
    println!(
        "Completed {} ops in {:.2}s ({:.2} ops/sec)",
        summary.total_ops().bold(),
        summary.elapsed.as_secs_f64(),
        summary.throughput().bold()
    );
}

fn print_phase(snapshot: &MetricsSnapshot, elapsed: Duration) {
    let total = snapshot.total();
    if total == 0 {
        return;
    }

    let ratio = 100.0 * snapshot.success as f64 / total as f64;
    let line = format!("{}/{} ok ({ratio:.1}%)", snapshot.success, total);
    if snapshot.success == total {
        println!("  {}", line.bold().green());
    } else {
        println!("  {}", line.bold().red());
    }

    for kind in OpKind::ALL {
        let ops = snapshot.kind_total(kind);
        if ops == 0 {
            continue;
        }

        println!("{} ({} ops)", format!("{kind}:").bold().green(), ops.bold());
        print_breakdown(snapshot, kind);
        print_ops(snapshot.timing(kind), elapsed);
        println!();
        print_percentiles(snapshot.timing(kind), Duration::from_secs_f64);
    }
}

fn print_breakdown(snapshot: &MetricsSnapshot, kind: OpKind) {
    print!("  outcomes:");
    for ((k, outcome), count) in &snapshot.breakdown {
        if *k != kind {
            continue;
        }
        match outcome {
            Outcome::Error => print!(" {}", format!("{outcome}={count}").bold().red()),
            _ => print!(" {outcome}={count}"),
        }
    }
    println!();
}

fn print_ops(sketch: &DDSketch, duration: Duration) {
    let ops = sketch.count();
    let ops_ps = ops as f64 / duration.as_secs_f64();
    print!("  {:.2} operations/s", ops_ps.bold());
}

fn print_percentiles<T: fmt::Debug>(sketch: &DDSketch, map: impl Fn(f64) -> T) {
    if sketch.count() == 0 {
        return;
    }
    let avg = map(sketch.sum().unwrap() / sketch.count() as f64);
    let p50 = map(sketch.quantile(0.5).unwrap().unwrap());
    let p90 = map(sketch.quantile(0.9).unwrap().unwrap());
    let p99 = map(sketch.quantile(0.99).unwrap().unwrap());
    println!(
        "  avg: {:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}",
        avg.bold()
    );
}
