/// Seed reported before the first sample arrives.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Exponential moving average of the distraction level.
///
/// The first sample seeds the average directly so a fresh estimator
/// does not drift up from [`NEUTRAL_SCORE`] over several half-lives.
/// Afterwards each sample is blended as
/// `ema = alpha * sample + (1 - alpha) * ema`.
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f64,
    value: f64,
    initialized: bool,
}

impl Ema {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            value: NEUTRAL_SCORE,
            initialized: false,
        }
    }

    /// Folds a sample into the average and returns the new value.
    pub fn update(&mut self, sample: f64) -> f64 {
        if self.initialized {
            self.value = self.alpha * sample + (1.0 - self.alpha) * self.value;
        } else {
            self.value = sample;
            self.initialized = true;
        }
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Forget all history and return to the neutral seed.
    pub fn reset(&mut self) {
        self.value = NEUTRAL_SCORE;
        self.initialized = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_start_at_neutral_score() {
        let ema = Ema::new(0.1);

        assert_eq!(ema.value(), NEUTRAL_SCORE);
        assert!(!ema.is_initialized());
    }

    #[test]
    fn should_take_first_sample_exactly() {
        let mut ema = Ema::new(0.1);

        assert_eq!(ema.update(1.0), 1.0);
        assert!(ema.is_initialized());
    }

    #[test]
    fn should_blend_subsequent_samples() {
        let mut ema = Ema::new(0.25);

        ema.update(1.0);
        let value = ema.update(0.0);

        assert!((value - 0.75).abs() < 1e-12);
    }

    #[test]
    fn should_converge_monotonically_without_overshoot() {
        let mut ema = Ema::new(0.2);
        ema.update(0.0);

        let mut previous = ema.value();
        for _ in 0..200 {
            let value = ema.update(1.0);
            assert!(value >= previous - f64::EPSILON);
            assert!(value <= 1.0 + f64::EPSILON);
            previous = value;
        }
        assert!((previous - 1.0).abs() < 1e-9);
    }

    #[test]
    fn should_halve_distance_after_half_life() {
        let alpha: f64 = 0.1;
        let half_life = (0.5f64.ln() / (1.0 - alpha).ln()).round() as usize;
        let mut ema = Ema::new(alpha);
        ema.update(0.0);

        for _ in 0..half_life {
            ema.update(1.0);
        }

        assert!((ema.value() - 0.5).abs() < 0.05);
    }

    #[test]
    fn should_hold_value_when_alpha_is_zero() {
        let mut ema = Ema::new(0.0);
        ema.update(0.3);

        ema.update(1.0);

        assert_eq!(ema.value(), 0.3);
    }

    #[test]
    fn should_reset_to_neutral() {
        let mut ema = Ema::new(0.5);
        ema.update(1.0);

        ema.reset();

        assert_eq!(ema.value(), NEUTRAL_SCORE);
        assert_eq!(ema.update(0.0), 0.0);
    }
}
