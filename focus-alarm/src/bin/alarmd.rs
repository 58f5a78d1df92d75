//! Distraction alarm daemon.
//!
//! Reads attention samples from stdin, one per line (`0`, `1`, a
//! probability, or a classifier JSON event), and raises the alarm when
//! the user stays distracted. Runs until Ctrl-C or end of input, then
//! prints the session telemetry as JSON.
//!
//! Pass `--demo` to replay a built-in session instead of reading stdin.

use std::env;
use std::io::{self, BufReader};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;

use focus_alarm::engine::EngineHandles;
use focus_alarm::producer::SampleProducer;
use focus_alarm::source::{LineSource, ReplaySource};
use focus_alarm::tracing::prelude::*;
use focus_alarm::{AlarmConfig, AlarmEngine, AlarmEvent, PolicyKind};

const ENV_POLICY: &str = "FOCUS_ALARM_POLICY";
const ENV_TICK_MS: &str = "FOCUS_ALARM_TICK_MS";

const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// A blocked stdin read cannot be interrupted, so don't wait long.
const PRODUCER_STOP_TIMEOUT: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    focus_alarm::tracing::init_journald_or_stdout();

    let demo = env::args().skip(1).any(|arg| arg == "--demo");
    let config = AlarmConfig::from_env()?;
    let kind = policy_from_env()?;
    let tick = tick_from_env()?;

    info!(
        policy = %kind,
        window_size = config.window_size,
        threshold = config.threshold,
        release_threshold = config.release_threshold(),
        dwell_s = config.min_dwell_time.as_secs_f64(),
        ema_alpha = config.ema_alpha,
        tick_ms = tick.as_millis() as u64,
        demo,
        "Starting focus alarm"
    );

    let (engine, handles) = AlarmEngine::new(config, kind)?;
    let engine = engine.with_tick_duration(tick);
    let EngineHandles {
        sample_tx,
        telemetry_rx,
        mut event_rx,
    } = handles;

    let cancellation = CancellationToken::new();
    let producer = if demo {
        SampleProducer::spawn(ReplaySource::demo(tick), sample_tx, cancellation.child_token())?
    } else {
        let stdin = LineSource::new(BufReader::new(io::stdin()));
        SampleProducer::spawn(stdin, sample_tx, cancellation.child_token())?
    };

    let notifier = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                AlarmEvent::Triggered => warn!("Distracted! Alarm ON"),
                AlarmEvent::Cleared => info!("Focused again, alarm OFF"),
            }
        }
    });

    let mut engine_task = tokio::spawn(engine.run(cancellation.clone()));
    let stats = tokio::select! {
        stats = &mut engine_task => stats?,
        _ = signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down");
            cancellation.cancel();
            engine_task.await?
        }
    };

    match tokio::task::spawn_blocking(move || producer.stop(PRODUCER_STOP_TIMEOUT)).await? {
        Ok(published) => debug!(published, "Sample producer joined"),
        Err(e) => warn!(error = %e, "Leaving sample producer behind"),
    }
    notifier.await?;

    let telemetry = telemetry_rx.borrow().clone();
    if stats.alarm_triggers == 0 && stats.total_samples > 0 {
        info!("No distractions this session");
    }
    println!("{}", serde_json::to_string_pretty(&telemetry)?);

    Ok(())
}

fn policy_from_env() -> Result<PolicyKind> {
    match env::var(ENV_POLICY) {
        Ok(name) => name
            .trim()
            .parse()
            .with_context(|| format!("{ENV_POLICY}={name}: unknown policy")),
        Err(_) => Ok(PolicyKind::default()),
    }
}

fn tick_from_env() -> Result<Duration> {
    match env::var(ENV_TICK_MS) {
        Ok(raw) => {
            let ms: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_TICK_MS}={raw}"))?;
            anyhow::ensure!(ms > 0, "{ENV_TICK_MS} must be positive");
            Ok(Duration::from_millis(ms))
        }
        Err(_) => Ok(DEFAULT_TICK),
    }
}
