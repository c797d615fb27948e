//! Age decay applied to importance during retrieval
//!
//! Score formula: `importance * decay(age)`, where `decay` is one of:
//! - hyperbolic: `1 / (1 + age_h / scale)`
//! - exponential: `0.5 ^ (age_h / scale)`, so `scale` is the half-life
//!
//! Both curves equal 1.0 at age zero and never increase with age. Entries
//! dated in the future are treated as age zero.

use chrono::{DateTime, Utc};

use crate::config::{DecayConfig, DecayCurveKind};

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Configured decay curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayCurve {
    kind: DecayCurveKind,
    scale_hours: f64,
}

impl Default for DecayCurve {
    fn default() -> Self {
        Self::from_config(&DecayConfig::default())
    }
}

impl DecayCurve {
    pub fn new(kind: DecayCurveKind, scale_hours: f64) -> Self {
        Self { kind, scale_hours }
    }

    pub fn from_config(config: &DecayConfig) -> Self {
        Self::new(config.curve, config.scale_hours)
    }

    /// Multiplier in (0, 1] for an entry of the given age in hours
    pub fn factor(&self, age_hours: f64) -> f64 {
        let age = age_hours.max(0.0);
        match self.kind {
            DecayCurveKind::Hyperbolic => 1.0 / (1.0 + age / self.scale_hours),
            DecayCurveKind::Exponential => 0.5_f64.powf(age / self.scale_hours),
        }
    }

    /// Importance weighted by the age of `created` relative to `now`
    pub fn score(&self, importance: f32, created: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let age_hours = (now - created).num_milliseconds() as f64 / MILLIS_PER_HOUR;
        f64::from(importance) * self.factor(age_hours)
    }
}
