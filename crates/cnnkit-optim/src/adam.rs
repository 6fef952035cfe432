//! Adam Optimizer - Adaptive Moment Estimation
//!
//! @version 0.1.0

use cnnkit_core::error::{Error, Result};
use cnnkit_nn::{Module, Parameter};
use cnnkit_tensor::Tensor;
use tracing::debug;

use crate::optimizer::Optimizer;

// =============================================================================
// Adam
// =============================================================================

/// Adam optimizer.
///
/// Update rule:
/// ```text
/// m_t = beta1 * m_{t-1} + (1 - beta1) * grad
/// v_t = beta2 * v_{t-1} + (1 - beta2) * grad^2
/// m_hat = m_t / (1 - beta1^t)
/// v_hat = v_t / (1 - beta2^t)
/// param = param - lr * m_hat / (sqrt(v_hat) + eps)
/// ```
///
/// Moment buffers are created per parameter on its first update, so a model
/// whose layers are shaped lazily can be bound before its first forward.
///
/// # Example
/// ```rust
/// use cnnkit_nn::Linear;
/// use cnnkit_optim::{Adam, Optimizer};
///
/// let model = Linear::new(4, 2);
/// let optimizer = Adam::new(1e-3).bind(&model);
/// assert!(optimizer.is_bound());
/// ```
#[derive(Debug)]
pub struct Adam {
    params: Option<Vec<Parameter>>,
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    state: Vec<Option<AdamState>>,
}

/// Per-parameter moments.
#[derive(Debug, Clone)]
struct AdamState {
    exp_avg: Vec<f32>,
    exp_avg_sq: Vec<f32>,
    step: u32,
}

impl AdamState {
    fn new(size: usize) -> Self {
        Self {
            exp_avg: vec![0.0; size],
            exp_avg_sq: vec![0.0; size],
            step: 0,
        }
    }
}

impl Adam {
    /// Default learning rate.
    pub const DEFAULT_LR: f32 = 1e-3;

    /// Creates an unbound Adam with learning rate `lr` and default betas.
    pub fn new(lr: f32) -> Self {
        Self {
            params: None,
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            state: Vec::new(),
        }
    }

    /// Builder method to set betas.
    #[must_use]
    pub fn betas(mut self, betas: (f32, f32)) -> Self {
        self.beta1 = betas.0;
        self.beta2 = betas.1;
        self
    }

    /// Builder method to set epsilon.
    #[must_use]
    pub fn eps(mut self, eps: f32) -> Self {
        self.eps = eps;
        self
    }

    /// Binds to `model`'s parameters, replacing any earlier binding and
    /// discarding accumulated moments.
    #[must_use]
    pub fn bind<M: Module + ?Sized>(mut self, model: &M) -> Self {
        let params = model.parameters();
        debug!(
            optimizer = "Adam",
            model = model.name(),
            parameters = params.len(),
            lr = self.lr,
            "optimizer bound"
        );
        self.state = vec![None; params.len()];
        self.params = Some(params);
        self
    }

    /// Number of updates applied to the parameter at `index`.
    pub fn steps_taken(&self, index: usize) -> u32 {
        self.state
            .get(index)
            .and_then(Option::as_ref)
            .map_or(0, |s| s.step)
    }

    fn update_one(
        &self,
        param: &Parameter,
        state: &mut Option<AdamState>,
    ) -> Result<()> {
        if !param.is_initialized() {
            return Ok(());
        }
        let Some(grad) = param.grad() else {
            return Ok(());
        };
        let data = param.data();
        let numel = data.numel();
        if grad.numel() != numel {
            return Err(Error::shape_mismatch(
                format!("Adam update of {}", param.name()),
                data.shape(),
                grad.shape(),
            ));
        }
        let state = match state {
            Some(s) if s.exp_avg.len() == numel => s,
            slot => slot.insert(AdamState::new(numel)),
        };
        state.step += 1;

        let bias_correction1 = 1.0 - self.beta1.powi(state.step as i32);
        let bias_correction2 = 1.0 - self.beta2.powi(state.step as i32);
        let step_size = self.lr / bias_correction1;

        let grad = grad.to_vec();
        let mut values = data.to_vec();
        for (((p, &g), m), v) in values
            .iter_mut()
            .zip(&grad)
            .zip(state.exp_avg.iter_mut())
            .zip(state.exp_avg_sq.iter_mut())
        {
            *m = self.beta1 * *m + (1.0 - self.beta1) * g;
            *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
            let denom = (*v / bias_correction2).sqrt() + self.eps;
            *p -= step_size * *m / denom;
        }
        let updated = Tensor::from_vec(values, data.shape())?.to_device(data.device())?;
        param.update_data(updated)
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LR)
    }
}

impl Optimizer for Adam {
    fn update(&mut self) -> Result<()> {
        let Some(params) = self.params.take() else {
            return Err(Error::OptimizerNotBound { optimizer: "Adam" });
        };
        let mut state = std::mem::take(&mut self.state);
        let result = params
            .iter()
            .zip(state.iter_mut())
            .try_for_each(|(param, slot)| self.update_one(param, slot));
        self.params = Some(params);
        self.state = state;
        result
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    fn parameters(&self) -> &[Parameter] {
        self.params.as_deref().unwrap_or(&[])
    }

    fn is_bound(&self) -> bool {
        self.params.is_some()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cnnkit_autograd::Variable;
    use cnnkit_nn::Linear;

    #[test]
    fn test_update_before_bind_fails() {
        let mut adam = Adam::default();
        assert_eq!(adam.lr(), 1e-3);
        assert_eq!(
            adam.update(),
            Err(Error::OptimizerNotBound { optimizer: "Adam" })
        );
        assert!(adam.parameters().is_empty());
    }

    #[test]
    fn test_first_step_moves_by_lr() {
        let model = Linear::new(2, 1);
        let before = model.weight.data().to_vec();
        let mut adam = Adam::new(0.1).bind(&model);

        let x = Variable::from_tensor(Tensor::from_vec(vec![1.0, -1.0], &[1, 2]).unwrap());
        model.forward(&x).unwrap().sum().backward().unwrap();
        adam.update().unwrap();

        // With bias correction the first step is lr * sign(grad).
        let after = model.weight.data().to_vec();
        assert_relative_eq!(after[0], before[0] - 0.1, epsilon = 1e-5);
        assert_relative_eq!(after[1], before[1] + 0.1, epsilon = 1e-5);
        assert_eq!(adam.steps_taken(0), 1);
    }

    #[test]
    fn test_parameters_without_grad_are_untouched() {
        let model = Linear::new(2, 2);
        let before = model.weight.data().to_vec();
        let mut adam = Adam::default().bind(&model);
        adam.update().unwrap();
        assert_eq!(model.weight.data().to_vec(), before);
        assert_eq!(adam.steps_taken(0), 0);
    }

    #[test]
    fn test_binds_lazy_model_before_first_forward() {
        let model = Linear::lazy(3);
        let mut adam = Adam::default().bind(&model);
        assert_eq!(adam.parameters().len(), 2);
        adam.update().unwrap();

        let x = Variable::from_tensor(Tensor::ones(&[2, 5]));
        model.forward(&x).unwrap().sum().backward().unwrap();
        let before = model.weight.data().to_vec();
        adam.update().unwrap();
        assert_eq!(adam.parameters()[0].shape(), vec![3, 5]);
        assert_ne!(model.weight.data().to_vec(), before);
    }

    #[test]
    fn test_zero_grad_clears_bound_parameters() {
        let model = Linear::new(2, 2);
        let adam = Adam::default().bind(&model);
        let x = Variable::from_tensor(Tensor::ones(&[1, 2]));
        model.forward(&x).unwrap().sum().backward().unwrap();
        adam.zero_grad();
        assert!(model.weight.grad().is_none());
    }
}
