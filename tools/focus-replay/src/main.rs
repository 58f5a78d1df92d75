//! Replay recorded attention-state captures through the alarm policies.
//!
//! Useful for tuning: run a capture through one policy and watch where
//! it switches, or through all of them to compare how often each one
//! fires.

mod capture;

use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use strum::IntoEnumIterator;
use tokio::time::Instant;

use capture::TimedSample;
use focus_alarm::stats::SessionStats;
use focus_alarm::{AlarmConfig, PolicyKind, build_policy};

#[derive(Parser, Debug)]
#[command(name = "focus-replay")]
#[command(about = "Replay attention-state captures through focus-alarm policies")]
struct Args {
    /// CSV capture with `timestamp_s,state` columns
    #[arg(conflicts_with = "samples", required_unless_present = "samples")]
    capture: Option<PathBuf>,

    /// Inline sample sequence instead of a capture, e.g. 0,0,1,1,1,0
    #[arg(long, value_delimiter = ',')]
    samples: Vec<f64>,

    /// Seconds between inline samples
    #[arg(long, default_value_t = 1.0)]
    interval: f64,

    /// Policy to replay through
    #[arg(short, long, default_value_t = PolicyKind::Smart)]
    policy: PolicyKind,

    /// Replay through every policy and print a comparison
    #[arg(long, conflicts_with = "policy")]
    all: bool,

    /// JSON file with an AlarmConfig preset; flags below override it
    #[arg(long)]
    preset: Option<PathBuf>,

    #[arg(long)]
    window_size: Option<usize>,

    #[arg(long)]
    threshold: Option<f64>,

    /// Minimum dwell time in seconds
    #[arg(long)]
    dwell: Option<f64>,

    #[arg(long)]
    alpha: Option<f64>,

    #[arg(long)]
    margin: Option<f64>,

    /// Print every sample with the policy's estimate
    #[arg(short, long)]
    verbose: bool,
}

/// What [`replay`] prints as it goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Output {
    Silent,
    Transitions,
    EverySample,
}

#[derive(Debug, Default)]
struct Summary {
    stats: SessionStats,
    time_on: Duration,
    duration: Duration,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    config.validate()?;
    tracing::debug!(?config, "Replay configuration");

    let samples = match &args.capture {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("opening {}", path.display()))?;
            capture::load(file).with_context(|| format!("reading {}", path.display()))?
        }
        None => {
            let interval = Duration::try_from_secs_f64(args.interval)
                .with_context(|| format!("--interval {}", args.interval))?;
            capture::evenly_spaced(&args.samples, interval)?
        }
    };

    println!(
        "{} samples, window {}, threshold {:.2} (release {:.2}), dwell {:.1}s, alpha {:.2}",
        samples.len(),
        config.window_size,
        config.threshold,
        config.release_threshold(),
        config.min_dwell_time.as_secs_f64(),
        config.ema_alpha,
    );

    if args.all {
        println!();
        println!(
            "{:<16} {:>8} {:>10} {:>8}",
            "policy".bold(),
            "alarms".bold(),
            "time on".bold(),
            "focus".bold()
        );
        for kind in PolicyKind::iter() {
            let summary = replay(kind, &config, &samples, Output::Silent)?;
            println!(
                "{:<16} {:>8} {:>9.1}s {:>7.1}%",
                kind.to_string(),
                summary.stats.alarm_triggers,
                summary.time_on.as_secs_f64(),
                summary.stats.focus_percent().unwrap_or_default(),
            );
        }
    } else {
        println!("policy: {}", args.policy.to_string().bold());
        println!();
        let output = if args.verbose {
            Output::EverySample
        } else {
            Output::Transitions
        };
        let summary = replay(args.policy, &config, &samples, output)?;
        print_summary(&summary);
    }

    Ok(())
}

fn load_config(args: &Args) -> Result<AlarmConfig> {
    let mut config = match &args.preset {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("opening {}", path.display()))?;
            serde_json::from_reader(file)
                .with_context(|| format!("parsing preset {}", path.display()))?
        }
        None => AlarmConfig::production(),
    };

    if let Some(window_size) = args.window_size {
        config.window_size = window_size;
    }
    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    if let Some(dwell) = args.dwell {
        config.min_dwell_time =
            Duration::try_from_secs_f64(dwell).with_context(|| format!("--dwell {dwell}"))?;
    }
    if let Some(alpha) = args.alpha {
        config.ema_alpha = alpha;
    }
    if let Some(margin) = args.margin {
        config.hysteresis_margin = margin;
    }

    Ok(config)
}

/// Run `samples` through a fresh policy, stamping each with the
/// capture's own timing so dwell gates see the recorded pace.
fn replay(
    kind: PolicyKind,
    config: &AlarmConfig,
    samples: &[TimedSample],
    output: Output,
) -> Result<Summary> {
    let mut policy = build_policy(kind, config.clone(), None)?;
    let base = Instant::now();

    let mut summary = Summary::default();
    let mut on_since: Option<Duration> = None;

    for sample in samples {
        let now = base.checked_add(sample.offset).with_context(|| {
            format!(
                "sample at {:.3}s is beyond the clock range",
                sample.offset.as_secs_f64()
            )
        })?;
        let was_on = policy.is_on();
        let on = policy.update_at(sample.value, now);
        summary.stats.record_sample(sample.value);

        if output == Output::EverySample {
            let status = policy.status_at(now);
            println!(
                "{:>9.3}s  sample {:.2}  estimate {:.3}  {}",
                sample.offset.as_secs_f64(),
                sample.value,
                status.estimate,
                if on { "on".red() } else { "off".dimmed() }
            );
        }

        if on == was_on {
            continue;
        }

        if on {
            summary.stats.record_trigger();
            on_since = Some(sample.offset);
            if output == Output::Transitions {
                println!("{:>9.3}s  {}", sample.offset.as_secs_f64(), "ALARM ON".red().bold());
            }
        } else {
            if let Some(since) = on_since.take() {
                summary.time_on += sample.offset - since;
            }
            if output == Output::Transitions {
                println!("{:>9.3}s  {}", sample.offset.as_secs_f64(), "alarm off".green());
            }
        }
    }

    summary.duration = samples.last().map(|s| s.offset).unwrap_or_default();
    if let Some(since) = on_since {
        summary.time_on += summary.duration - since;
    }

    Ok(summary)
}

fn print_summary(summary: &Summary) {
    let stats = &summary.stats;
    println!();
    println!("{}", "Summary".bold());
    println!("  samples:   {}", stats.total_samples);
    println!(
        "  focus:     {:.1}%",
        stats.focus_percent().unwrap_or_default()
    );
    println!("  alarms:    {}", stats.alarm_triggers);
    println!(
        "  time on:   {:.1}s of {:.1}s",
        summary.time_on.as_secs_f64(),
        summary.duration.as_secs_f64()
    );
}
