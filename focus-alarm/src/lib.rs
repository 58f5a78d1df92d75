//! Debounced, hysteretic alarm over a noisy attention-state stream.
//!
//! An external classifier emits one attention state per tick (focused =
//! 0, distracted = 1, or a probability in between). This crate turns
//! that jittery stream into a stable boolean alarm:
//!
//! - [`buffer::SampleBuffer`] keeps the most recent samples in a
//!   thread-safe ring.
//! - [`smoothing::Ema`] tracks an exponential moving average.
//! - [`alarm`] holds the four policies that apply hysteresis and
//!   dwell-time debouncing to those estimates.
//! - [`engine::AlarmEngine`] runs a policy at decision cadence against a
//!   [`producer::SampleProducer`] filling samples from a background
//!   thread.

pub mod alarm;
pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod producer;
pub mod smoothing;
pub mod source;
pub mod stats;
pub mod tracing;

pub use alarm::{AlarmPolicy, AlarmStatus, PolicyKind, TransitionCallback, build_policy};
pub use buffer::SampleBuffer;
pub use config::AlarmConfig;
pub use engine::{AlarmEngine, AlarmEvent, EngineHandles, TelemetrySnapshot};
pub use error::{Error, Result};
