//! Discrete scale ladder shared by detection and pruning.

use crate::config::{DetectionConfig, PruneSigmas};
use crate::error::{Error, Result};

/// One Gaussian blur scale: kernel half-length and standard deviation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleLevel {
    pub radius: usize,
    pub sigma: f32,
}

/// Ordered, immutable list of detection scales.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleLadder {
    levels: Vec<ScaleLevel>,
}

impl ScaleLadder {
    pub fn new(levels: Vec<ScaleLevel>) -> Result<Self> {
        if levels.is_empty() {
            return Err(Error::InvalidConfig("scale ladder is empty".to_string()));
        }
        if let Some(bad) = levels.iter().find(|l| l.sigma <= 0.0 || l.radius == 0) {
            return Err(Error::InvalidConfig(format!(
                "scale level needs positive sigma and radius, got {:?}",
                bad
            )));
        }
        Ok(Self { levels })
    }

    pub fn from_config(config: &DetectionConfig) -> Result<Self> {
        Self::new(
            config
                .scales
                .iter()
                .map(|s| ScaleLevel {
                    radius: s.radius,
                    sigma: s.sigma,
                })
                .collect(),
        )
    }

    #[inline]
    pub fn levels(&self) -> &[ScaleLevel] {
        &self.levels
    }

    pub fn sigmas(&self) -> Vec<f32> {
        self.levels.iter().map(|l| l.sigma).collect()
    }

    /// Sigma table the pruner maps scale indices through.
    pub fn prune_sigmas(&self, source: &PruneSigmas) -> Vec<f32> {
        match *source {
            PruneSigmas::Shared => self.sigmas(),
            PruneSigmas::Linspace {
                min_sigma,
                max_sigma,
                count,
            } => linspace(min_sigma, max_sigma, count),
        }
    }
}

/// `count` evenly spaced values from `start` to `end` inclusive.
pub fn linspace(start: f32, end: f32, count: usize) -> Vec<f32> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (count - 1) as f32;
            (0..count).map(|i| start + step * i as f32).collect()
        }
    }
}
