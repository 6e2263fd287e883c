use std::time::Duration;

use rand::Rng;

use crate::domain::errors::ConfigError;

/// Exponential backoff with symmetric jitter for forwarding retries
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: f64,
}

impl BackoffPolicy {
    pub fn new(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        jitter: f64,
    ) -> Result<Self, ConfigError> {
        if !multiplier.is_finite() || multiplier <= 1.0 {
            return Err(ConfigError::InvalidSetting(
                "reconnect multiplier must be a finite number > 1.0".to_string(),
            ));
        }
        if initial_delay.is_zero() {
            return Err(ConfigError::InvalidSetting(
                "initial reconnect delay cannot be 0".to_string(),
            ));
        }
        if max_delay < initial_delay {
            return Err(ConfigError::InvalidSetting(format!(
                "maximum reconnect delay ({:?}) cannot be less than initial delay ({:?})",
                max_delay, initial_delay
            )));
        }
        if !(0.0..1.0).contains(&jitter) {
            return Err(ConfigError::InvalidSetting(
                "reconnect jitter must be within [0.0, 1.0)".to_string(),
            ));
        }

        Ok(Self {
            initial_delay,
            max_delay,
            multiplier,
            jitter,
        })
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Nominal delay after `failures` earlier consecutive failures:
    /// `min(max_delay, initial_delay * multiplier^failures)`.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);

        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    /// Spread `nominal` by up to ±jitter, never above `max_delay`.
    pub fn apply_jitter<R: Rng + ?Sized>(&self, nominal: Duration, rng: &mut R) -> Duration {
        if self.jitter == 0.0 {
            return nominal.min(self.max_delay);
        }
        let factor = 1.0 + rng.gen_range(-self.jitter..=self.jitter);
        Duration::from_secs_f64(nominal.as_secs_f64() * factor).min(self.max_delay)
    }

    pub fn jittered_delay_for(&self, failures: u32) -> Duration {
        self.apply_jitter(self.delay_for(failures), &mut rand::thread_rng())
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}
