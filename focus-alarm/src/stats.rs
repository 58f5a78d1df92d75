use serde::{Deserialize, Serialize};

/// Running counters for one monitoring session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total_samples: u64,
    pub focused_samples: u64,
    pub distracted_samples: u64,
    /// Number of OFF → ON switches.
    pub alarm_triggers: u64,
}

impl SessionStats {
    /// Count one sample. Anything other than exactly 0.0 counts as
    /// distracted.
    pub fn record_sample(&mut self, sample: f64) {
        self.total_samples += 1;
        if sample == 0.0 {
            self.focused_samples += 1;
        } else {
            self.distracted_samples += 1;
        }
    }

    pub fn record_trigger(&mut self) {
        self.alarm_triggers += 1;
    }

    /// Share of focused samples, in percent. `None` before any sample.
    pub fn focus_percent(&self) -> Option<f64> {
        if self.total_samples == 0 {
            return None;
        }
        Some(self.focused_samples as f64 / self.total_samples as f64 * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_have_no_focus_percent_when_empty() {
        assert_eq!(SessionStats::default().focus_percent(), None);
    }

    #[test]
    fn should_count_samples_and_triggers() {
        let mut stats = SessionStats::default();

        for sample in [0.0, 0.0, 1.0, 0.0] {
            stats.record_sample(sample);
        }
        stats.record_trigger();

        assert_eq!(stats.total_samples, 4);
        assert_eq!(stats.focused_samples, 3);
        assert_eq!(stats.distracted_samples, 1);
        assert_eq!(stats.alarm_triggers, 1);
        assert_eq!(stats.focus_percent(), Some(75.0));
    }
}
