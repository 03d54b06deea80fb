//! Learning-rate schedules indexed by training iteration.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainingError};

/// Learning rate as a function of the iteration count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LearningRateSchedule {
    Constant { lr: f64 },
    /// Multiply by `gamma` every `step_size` iterations
    Step {
        initial_lr: f64,
        gamma: f64,
        step_size: usize,
    },
    /// Multiply by `gamma` every iteration
    Exponential { initial_lr: f64, gamma: f64 },
    /// `min_lr + (initial_lr - min_lr) · (1 + cos(π · t / T)) / 2`, held at
    /// `min_lr` once `t ≥ T`
    CosineAnnealing {
        initial_lr: f64,
        min_lr: f64,
        max_iterations: usize,
    },
    /// `end_lr + (initial_lr - end_lr) · (1 - t / T)^power`
    Polynomial {
        initial_lr: f64,
        end_lr: f64,
        max_iterations: usize,
        power: f64,
    },
}

impl Default for LearningRateSchedule {
    fn default() -> Self {
        Self::Constant { lr: 1e-3 }
    }
}

impl LearningRateSchedule {
    pub fn constant(lr: f64) -> Self {
        Self::Constant { lr }
    }

    pub fn step(initial_lr: f64, gamma: f64, step_size: usize) -> Self {
        Self::Step {
            initial_lr,
            gamma,
            step_size,
        }
    }

    pub fn exponential(initial_lr: f64, gamma: f64) -> Self {
        Self::Exponential { initial_lr, gamma }
    }

    pub fn cosine_annealing(initial_lr: f64, min_lr: f64, max_iterations: usize) -> Self {
        Self::CosineAnnealing {
            initial_lr,
            min_lr,
            max_iterations,
        }
    }

    pub fn polynomial(initial_lr: f64, end_lr: f64, max_iterations: usize, power: f64) -> Self {
        Self::Polynomial {
            initial_lr,
            end_lr,
            max_iterations,
            power,
        }
    }

    /// Learning rate for `iteration` (0-based).
    pub fn learning_rate(&self, iteration: usize) -> f64 {
        match *self {
            Self::Constant { lr } => lr,
            Self::Step {
                initial_lr,
                gamma,
                step_size,
            } => initial_lr * gamma.powi((iteration / step_size.max(1)) as i32),
            Self::Exponential { initial_lr, gamma } => initial_lr * gamma.powi(iteration as i32),
            Self::CosineAnnealing {
                initial_lr,
                min_lr,
                max_iterations,
            } => {
                let progress = progress(iteration, max_iterations);
                let cosine = (1.0 + (std::f64::consts::PI * progress).cos()) / 2.0;
                min_lr + (initial_lr - min_lr) * cosine
            }
            Self::Polynomial {
                initial_lr,
                end_lr,
                max_iterations,
                power,
            } => {
                let decay = (1.0 - progress(iteration, max_iterations)).powf(power);
                end_lr + (initial_lr - end_lr) * decay
            }
        }
    }

    pub fn initial_lr(&self) -> f64 {
        self.learning_rate(0)
    }

    pub fn validate(&self) -> Result<()> {
        let initial = self.initial_lr();
        if !(initial.is_finite() && initial > 0.0) {
            return Err(TrainingError::invalid_configuration(format!(
                "initial learning rate must be positive, got {}",
                initial
            )));
        }
        match *self {
            Self::Step { step_size: 0, .. } => Err(TrainingError::invalid_configuration(
                "step schedule needs a positive step_size",
            )),
            Self::CosineAnnealing { max_iterations: 0, .. } | Self::Polynomial { max_iterations: 0, .. } => {
                Err(TrainingError::invalid_configuration(
                    "annealing schedules need a positive max_iterations",
                ))
            }
            _ => Ok(()),
        }
    }
}

fn progress(iteration: usize, max_iterations: usize) -> f64 {
    (iteration.min(max_iterations) as f64) / (max_iterations.max(1) as f64)
}
