//! Normalization Layer - Batch Normalization
//!
//! @version 0.1.0

use cnnkit_autograd::{current_mode, Mode, Variable};
use cnnkit_core::error::{Error, Result};
use cnnkit_tensor::Tensor;
use parking_lot::RwLock;
use tracing::trace;

use crate::init::{ones, zeros};
use crate::module::Module;
use crate::parameter::Parameter;

/// Running averages tracked across training batches.
#[derive(Debug, Clone)]
struct RunningStats {
    mean: Tensor<f32>,
    var: Tensor<f32>,
}

// =============================================================================
// BatchNorm2d
// =============================================================================

/// Batch normalization over the channel axis of `[N, C, H, W]` inputs.
///
/// In `Training` mode the batch's own statistics are used and folded into
/// running averages; in `Evaluating` mode the running averages are used.
pub struct BatchNorm2d {
    /// Per-channel scale.
    pub gamma: Parameter,
    /// Per-channel shift.
    pub beta: Parameter,
    running: RwLock<Option<RunningStats>>,
    momentum: f32,
    eps: f64,
}

impl BatchNorm2d {
    /// Momentum of the running averages.
    pub const DEFAULT_MOMENTUM: f32 = 0.1;
    /// Added to the variance before the square root.
    pub const DEFAULT_EPS: f64 = 2e-5;

    /// Creates a layer that infers its channel count on first use.
    pub fn lazy() -> Self {
        Self {
            gamma: Parameter::uninitialized("gamma"),
            beta: Parameter::uninitialized("beta"),
            running: RwLock::new(None),
            momentum: Self::DEFAULT_MOMENTUM,
            eps: Self::DEFAULT_EPS,
        }
    }

    /// Creates a layer for `num_features` channels.
    pub fn new(num_features: usize) -> Self {
        Self {
            gamma: Parameter::named("gamma", ones(&[num_features])),
            beta: Parameter::named("beta", zeros(&[num_features])),
            running: RwLock::new(Some(RunningStats {
                mean: zeros(&[num_features]),
                var: ones(&[num_features]),
            })),
            momentum: Self::DEFAULT_MOMENTUM,
            eps: Self::DEFAULT_EPS,
        }
    }

    /// Channel count, once known.
    pub fn num_features(&self) -> Option<usize> {
        self.gamma.is_initialized().then(|| self.gamma.numel())
    }

    /// Current running mean, once known.
    pub fn running_mean(&self) -> Option<Tensor<f32>> {
        self.running.read().as_ref().map(|r| r.mean.clone())
    }

    /// Current running variance, once known.
    pub fn running_var(&self) -> Option<Tensor<f32>> {
        self.running.read().as_ref().map(|r| r.var.clone())
    }

    fn ensure_initialized(&self, channels: usize, input: &Variable) -> Result<()> {
        let device = input.device();
        if self
            .gamma
            .initialize_with(|| ones(&[channels]).to_device(device))?
        {
            trace!(channels, "BatchNorm2d inferred its channel count");
        }
        self.beta
            .initialize_with(|| zeros(&[channels]).to_device(device))?;
        let mut running = self.running.write();
        if running.is_none() {
            *running = Some(RunningStats {
                mean: zeros(&[channels]),
                var: ones(&[channels]),
            });
        }
        Ok(())
    }

    fn fold_into_running(&self, mean: &Tensor<f32>, var: &Tensor<f32>, count: usize) -> Result<()> {
        let mut guard = self.running.write();
        let Some(running) = guard.as_mut() else {
            return Err(Error::invalid_operation("BatchNorm2d running stats missing"));
        };
        let m = self.momentum;
        let unbias = if count > 1 { count as f32 / (count - 1) as f32 } else { 1.0 };
        running.mean = running.mean.zip_map(mean, |r, b| (1.0 - m) * r + m * b)?;
        running.var = running.var.zip_map(var, |r, b| (1.0 - m) * r + m * b * unbias)?;
        Ok(())
    }
}

impl Module for BatchNorm2d {
    fn forward(&self, input: &Variable) -> Result<Variable> {
        let shape = input.shape();
        let [n, c, h, w] = shape[..] else {
            return Err(Error::invalid_shape(&shape, "BatchNorm2d expects [N, C, H, W]"));
        };
        self.ensure_initialized(c, input)?;
        let expected = self.gamma.numel();
        if c != expected {
            return Err(Error::shape_mismatch(self.name(), &[n, expected, h, w], &shape));
        }

        let (gamma, beta) = (self.gamma.variable(), self.beta.variable());
        match current_mode() {
            Mode::Training => {
                let (y, mean, var) = input.batch_norm2d(gamma, beta, None, self.eps)?;
                self.fold_into_running(&mean, &var, n * h * w)?;
                Ok(y)
            }
            Mode::Evaluating => {
                let stats = self.running.read().clone();
                let Some(stats) = stats else {
                    return Err(Error::invalid_operation("BatchNorm2d running stats missing"));
                };
                let (y, _, _) =
                    input.batch_norm2d(gamma, beta, Some((&stats.mean, &stats.var)), self.eps)?;
                Ok(y)
            }
        }
    }

    fn named_parameters(&self) -> Vec<(String, Parameter)> {
        vec![
            ("gamma".to_string(), self.gamma.clone()),
            ("beta".to_string(), self.beta.clone()),
        ]
    }

    fn name(&self) -> &'static str {
        "BatchNorm2d"
    }
}

// =============================================================================
// Tests
// =============================================================================
