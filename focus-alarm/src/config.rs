use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tracing::prelude::*;

pub const ENV_WINDOW_SIZE: &str = "FOCUS_ALARM_WINDOW_SIZE";
pub const ENV_THRESHOLD: &str = "FOCUS_ALARM_THRESHOLD";
pub const ENV_MIN_DWELL_SECS: &str = "FOCUS_ALARM_MIN_DWELL_SECS";
pub const ENV_EMA_ALPHA: &str = "FOCUS_ALARM_EMA_ALPHA";
pub const ENV_HYSTERESIS_MARGIN: &str = "FOCUS_ALARM_HYSTERESIS_MARGIN";

/// Tuning shared by every alarm policy.
///
/// Immutable once handed to a policy or engine. Only `window_size` is
/// validated; out-of-range thresholds, alphas and margins are accepted
/// and produce degenerate but well-defined behavior (a threshold above
/// 1.0 can never turn the alarm on).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    /// Number of samples held by the sliding window.
    pub window_size: usize,

    /// Distraction level above which the alarm may turn on.
    pub threshold: f64,

    /// Minimum time a debounced policy stays in its current state
    /// before it may switch again.
    #[serde(with = "duration_secs")]
    pub min_dwell_time: Duration,

    /// Weight of the newest sample in the exponential moving average.
    pub ema_alpha: f64,

    /// Gap below `threshold` the estimate must cross to clear the
    /// alarm.
    pub hysteresis_margin: f64,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            window_size: 30,
            threshold: 0.4,
            min_dwell_time: Duration::from_secs(3),
            ema_alpha: 0.1,
            hysteresis_margin: 0.1,
        }
    }
}

impl AlarmConfig {
    /// Build a config, rejecting a zero window size.
    pub fn new(
        window_size: usize,
        threshold: f64,
        min_dwell_time: Duration,
        ema_alpha: f64,
        hysteresis_margin: f64,
    ) -> Result<Self> {
        let config = Self {
            window_size,
            threshold,
            min_dwell_time,
            ema_alpha,
            hysteresis_margin,
        };
        config.validate()?;
        Ok(config)
    }

    /// Tuning used for live sessions: a slightly faster EMA and a wider
    /// release band than the defaults.
    pub fn production() -> Self {
        Self {
            ema_alpha: 0.15,
            hysteresis_margin: 0.15,
            ..Self::default()
        }
    }

    /// Level the estimate must drop strictly below to clear the alarm.
    ///
    /// May be negative, in which case the alarm can never clear.
    pub fn release_threshold(&self) -> f64 {
        self.threshold - self.hysteresis_margin
    }

    /// Check the one hard constraint and warn about suspicious values.
    pub fn validate(&self) -> Result<()> {
        self.ensure_window()?;

        if !(0.0..=1.0).contains(&self.threshold) {
            warn!(threshold = self.threshold, "Threshold outside [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.ema_alpha) {
            warn!(ema_alpha = self.ema_alpha, "EMA alpha outside [0, 1]");
        }
        if self.release_threshold() < 0.0 {
            warn!(
                release_threshold = self.release_threshold(),
                "Release threshold is negative, alarm can never clear"
            );
        }

        Ok(())
    }

    pub(crate) fn ensure_window(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(Error::InvalidConfig(
                "window_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Start from `base` and apply any `FOCUS_ALARM_*` overrides found
    /// in the environment. The result is already validated.
    pub fn from_env_with(base: Self) -> Result<Self> {
        let mut config = base;

        if let Some(v) = env_parse::<usize>(ENV_WINDOW_SIZE)? {
            config.window_size = v;
        }
        if let Some(v) = env_parse::<f64>(ENV_THRESHOLD)? {
            config.threshold = v;
        }
        if let Some(v) = env_parse::<f64>(ENV_MIN_DWELL_SECS)? {
            config.min_dwell_time = Duration::try_from_secs_f64(v).map_err(|e| {
                Error::InvalidConfig(format!("{ENV_MIN_DWELL_SECS}={v}: {e}"))
            })?;
        }
        if let Some(v) = env_parse::<f64>(ENV_EMA_ALPHA)? {
            config.ema_alpha = v;
        }
        if let Some(v) = env_parse::<f64>(ENV_HYSTERESIS_MARGIN)? {
            config.hysteresis_margin = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// [`from_env_with`](Self::from_env_with) starting from
    /// [`production`](Self::production).
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(Self::production())
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::InvalidConfig(format!("{key}={raw}: {e}"))),
        Err(_) => Ok(None),
    }
}

pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
