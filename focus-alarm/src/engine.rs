//! Decision loop tying a sample stream to an alarm policy.
//!
//! ```text
//!  SampleProducer ──mpsc<f64>──► AlarmEngine ──mpsc<AlarmEvent>──► notifier
//!   (OS thread)     bounded       (tokio task,  ──watch<Telemetry>─► exporter
//!                                  1 Hz tick)
//! ```
//!
//! The engine owns the policy outright, so every decision happens on
//! one task. Each tick feeds every sample queued since the previous
//! tick through the policy in arrival order; a tick with no new sample
//! still re-evaluates the policy so an expired dwell gate takes effect
//! on time.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::alarm::{AlarmPolicy, AlarmStatus, PolicyKind, build_policy};
use crate::config::AlarmConfig;
use crate::error::Result;
use crate::stats::SessionStats;
use crate::tracing::prelude::*;

const DEFAULT_TICK_DURATION: Duration = Duration::from_secs(1);

const EVENT_CHANNEL_CAPACITY: usize = 16;

const SAMPLE_CHANNEL_CAPACITY: usize = 256;

/// Upper bound on samples decided in one tick. A larger backlog is
/// worked off on immediately following ticks, keeping cancellation
/// responsive.
const MAX_SAMPLES_PER_TICK: usize = SAMPLE_CHANNEL_CAPACITY;

/// Log a session summary every this many samples.
const STATUS_LOG_INTERVAL: u64 = 10;

/// Alarm edge published to notifiers (sound, desktop notification,
/// remote feed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmEvent {
    /// Alarm switched on: the user appears distracted.
    Triggered,
    /// Alarm switched off: the user is focused again.
    Cleared,
}

/// Everything a telemetry exporter needs in one value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub status: AlarmStatus,
    pub stats: SessionStats,
    pub focus_percent: Option<f64>,
}

/// Channel ends handed to the rest of the process by
/// [`AlarmEngine::new`].
#[derive(Debug)]
pub struct EngineHandles {
    /// Give this to the [`SampleProducer`](crate::producer::SampleProducer).
    pub sample_tx: mpsc::Sender<f64>,
    pub telemetry_rx: watch::Receiver<TelemetrySnapshot>,
    pub event_rx: mpsc::Receiver<AlarmEvent>,
}

pub struct AlarmEngine {
    policy: Box<dyn AlarmPolicy>,
    tick_duration: Duration,
    sample_rx: mpsc::Receiver<f64>,
    telemetry_tx: watch::Sender<TelemetrySnapshot>,
    event_tx: mpsc::Sender<AlarmEvent>,
    stats: SessionStats,
}

impl AlarmEngine {
    /// Build the policy selected by `kind` and wire up its channels.
    pub fn new(config: AlarmConfig, kind: PolicyKind) -> Result<(Self, EngineHandles)> {
        let policy = build_policy(kind, config, None)?;
        Ok(Self::with_policy(policy))
    }

    /// Wrap an already-built policy, e.g. one carrying its own callback.
    pub fn with_policy(policy: Box<dyn AlarmPolicy>) -> (Self, EngineHandles) {
        let stats = SessionStats::default();
        let (sample_tx, sample_rx) = mpsc::channel(SAMPLE_CHANNEL_CAPACITY);
        let (telemetry_tx, telemetry_rx) = watch::channel(snapshot(policy.as_ref(), stats));
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let engine = Self {
            policy,
            tick_duration: DEFAULT_TICK_DURATION,
            sample_rx,
            telemetry_tx,
            event_tx,
            stats,
        };
        let handles = EngineHandles {
            sample_tx,
            telemetry_rx,
            event_rx,
        };
        (engine, handles)
    }

    /// Decision cadence of [`run`](Self::run).
    pub fn with_tick_duration(mut self, tick_duration: Duration) -> Self {
        self.tick_duration = tick_duration;
        self
    }

    pub fn kind(&self) -> PolicyKind {
        self.policy.kind()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn status(&self) -> AlarmStatus {
        self.policy.status()
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        snapshot(self.policy.as_ref(), self.stats)
    }

    /// Feed one sample synchronously, bypassing the sample channel.
    ///
    /// For callers that own their own loop; [`run`](Self::run) does the
    /// same thing for each queued sample.
    pub fn update(&mut self, sample: f64) -> bool {
        self.tick(Some(sample), Instant::now())
    }

    /// Run the decision loop until cancelled or the sample channel
    /// closes. Returns the session statistics.
    pub async fn run(mut self, cancellation: CancellationToken) -> SessionStats {
        trace!(policy = %self.kind(), "Alarm engine started.");

        let mut interval = tokio::time::interval(self.tick_duration);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    info!("Alarm engine shutdown requested");
                    break;
                }
                _ = interval.tick() => {
                    match self.drain(Instant::now()) {
                        Queue::Empty => {}
                        Queue::Backlog => interval.reset_immediately(),
                        Queue::Closed => {
                            debug!("Sample channel closed");
                            break;
                        }
                    }
                }
            }
        }

        self.log_summary();
        trace!("Alarm engine stopped.");
        self.stats
    }

    /// Decide on the samples queued since the last tick, oldest first.
    fn drain(&mut self, now: Instant) -> Queue {
        let mut consumed = 0;

        let queue = loop {
            if consumed == MAX_SAMPLES_PER_TICK {
                break Queue::Backlog;
            }
            match self.sample_rx.try_recv() {
                Ok(sample) => {
                    self.tick(Some(sample), now);
                    consumed += 1;
                }
                Err(mpsc::error::TryRecvError::Empty) => break Queue::Empty,
                Err(mpsc::error::TryRecvError::Disconnected) => break Queue::Closed,
            }
        };

        if consumed == 0 {
            self.tick(None, now);
        } else if consumed > 1 {
            trace!(consumed, "Decided on queued samples");
        }
        queue
    }

    fn tick(&mut self, sample: Option<f64>, now: Instant) -> bool {
        let was_on = self.policy.is_on();

        let alarm_on = match sample {
            Some(sample) => {
                self.stats.record_sample(sample);
                self.policy.update_at(sample, now)
            }
            None => self.policy.evaluate_at(now),
        };

        if alarm_on != was_on {
            let event = if alarm_on {
                self.stats.record_trigger();
                AlarmEvent::Triggered
            } else {
                AlarmEvent::Cleared
            };
            self.emit(event);
        }

        let telemetry = snapshot(self.policy.as_ref(), self.stats);
        trace!(
            sample = ?sample,
            alarm_on,
            estimate = telemetry.status.estimate,
            "Alarm decision tick"
        );

        if sample.is_some() && self.stats.total_samples % STATUS_LOG_INTERVAL == 0 {
            info!(
                samples = self.stats.total_samples,
                focus_pct = telemetry.focus_percent.unwrap_or_default(),
                alarms = self.stats.alarm_triggers,
                estimate = telemetry.status.estimate,
                "Session status"
            );
        }

        self.telemetry_tx.send_replace(telemetry);
        alarm_on
    }

    fn emit(&self, event: AlarmEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(event = ?event, "Alarm event channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                debug!(event = ?event, "Alarm event channel closed");
            }
        }
    }

    fn log_summary(&self) {
        info!(
            policy = %self.kind(),
            samples = self.stats.total_samples,
            focus_pct = self.stats.focus_percent().unwrap_or_default(),
            alarms = self.stats.alarm_triggers,
            "Session finished"
        );
    }
}

/// State of the sample queue after a drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Queue {
    /// Caught up; wait for the next tick.
    Empty,
    /// Hit the per-tick limit with samples still queued.
    Backlog,
    /// Producer gone and nothing left to decide on.
    Closed,
}

fn snapshot(policy: &dyn AlarmPolicy, stats: SessionStats) -> TelemetrySnapshot {
    TelemetrySnapshot {
        status: policy.status(),
        stats,
        focus_percent: stats.focus_percent(),
    }
}
