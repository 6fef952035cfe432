//! Variable - Tensor with Gradient Tracking
//!
//! A `Variable` wraps an `f32` tensor and, while the thread is in
//! [`Mode::Training`](crate::Mode::Training), records every operation that
//! touches a gradient-requiring input so the loss can be differentiated.
//! In [`Mode::Evaluating`](crate::Mode::Evaluating) operations return plain
//! values and no graph node is created.
//!
//! Operations that can reject their inputs return `Result`.
//!
//! @version 0.1.0

use std::sync::Arc;

use parking_lot::RwLock;
use rand::Rng;

use cnnkit_core::error::{Error, Result};
use cnnkit_core::random::with_rng;
use cnnkit_core::Device;
use cnnkit_tensor::ops::{self, Conv2dGeometry, LrnParams};
use cnnkit_tensor::Tensor;

use crate::functions::{
    AddBackward, AvgPool2dBackward, BatchNorm2dBackward, Conv2dBackward, DropoutBackward,
    LinearBackward, LrnBackward, MatMulBackward, MaxPool2dBackward, MeanBackward, MulBackward,
    MulScalarBackward, ReluBackward, ReshapeBackward, SoftmaxCrossEntropyBackward, SumBackward,
    TanhBackward, TransposeBackward,
};
use crate::grad_fn::{AccumulateGrad, GradAccumulator, GradFn, GradientFunction};
use crate::graph::record_operation;
use crate::mode::{current_mode, is_grad_enabled, Mode};

// =============================================================================
// Variable Struct
// =============================================================================

/// A tensor with automatic differentiation support.
///
/// Cloning a variable yields another handle to the same value and gradient.
#[derive(Clone)]
pub struct Variable {
    data: Arc<RwLock<Tensor<f32>>>,
    grad: GradAccumulator,
    requires_grad: bool,
    is_leaf: bool,
    grad_fn: Option<GradFn>,
}

impl Variable {
    /// Creates a leaf variable.
    #[must_use]
    pub fn new(data: Tensor<f32>, requires_grad: bool) -> Self {
        let grad: GradAccumulator = Arc::new(RwLock::new(None));
        let grad_fn =
            requires_grad.then(|| GradFn::new(AccumulateGrad::new(Arc::clone(&grad))));
        Self {
            data: Arc::new(RwLock::new(data)),
            grad,
            requires_grad,
            is_leaf: true,
            grad_fn,
        }
    }

    /// Creates a variable that doesn't require gradients.
    #[must_use]
    pub fn from_tensor(data: Tensor<f32>) -> Self {
        Self::new(data, false)
    }

    fn from_operation(data: Tensor<f32>, grad_fn: GradFn) -> Self {
        record_operation();
        Self {
            data: Arc::new(RwLock::new(data)),
            grad: Arc::new(RwLock::new(None)),
            requires_grad: true,
            is_leaf: false,
            grad_fn: Some(grad_fn),
        }
    }

    /// Wraps an operation result, recording a graph node only when the mode
    /// is `Training` and at least one input requires a gradient.
    fn record<F, G>(data: Tensor<f32>, inputs: &[Option<&Variable>], make: F) -> Self
    where
        F: FnOnce(Vec<Option<GradFn>>) -> G,
        G: GradientFunction + 'static,
    {
        let tracked = is_grad_enabled() && inputs.iter().flatten().any(|v| v.requires_grad);
        if !tracked {
            return Self::from_tensor(data);
        }
        let next_fns = inputs
            .iter()
            .map(|v| v.and_then(|v| v.grad_fn.clone()))
            .collect();
        Self::from_operation(data, GradFn::new(make(next_fns)))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Returns a handle to the current value (shares storage).
    #[must_use]
    pub fn data(&self) -> Tensor<f32> {
        self.data.read().clone()
    }

    /// Replaces the value, keeping the gradient slot and graph identity.
    ///
    /// Every clone of this variable observes the new value.
    pub fn set_data(&self, data: Tensor<f32>) {
        *self.data.write() = data;
    }

    /// Returns the shape of the tensor.
    #[must_use]
    pub fn shape(&self) -> Vec<usize> {
        self.data.read().shape().to_vec()
    }

    /// Returns the number of dimensions.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.data.read().ndim()
    }

    /// Returns the total number of elements.
    #[must_use]
    pub fn numel(&self) -> usize {
        self.data.read().numel()
    }

    /// Returns the device holding the value.
    #[must_use]
    pub fn device(&self) -> Device {
        self.data.read().device()
    }

    /// Returns whether this variable requires gradients.
    #[must_use]
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Returns whether this is a leaf variable.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.is_leaf
    }

    /// Returns the accumulated gradient, if any.
    #[must_use]
    pub fn grad(&self) -> Option<Tensor<f32>> {
        self.grad.read().clone()
    }

    /// Returns the gradient function of this variable.
    #[must_use]
    pub fn grad_fn(&self) -> Option<&GradFn> {
        self.grad_fn.as_ref()
    }

    /// Clears the accumulated gradient.
    pub fn zero_grad(&self) {
        *self.grad.write() = None;
    }

    /// Returns a variable with the same value that is cut off from the graph.
    #[must_use]
    pub fn detach(&self) -> Self {
        Self::from_tensor(self.data())
    }

    /// Moves the value to `device` in place.
    pub fn to_device(&self, device: Device) -> Result<()> {
        let moved = self.data.read().to_device(device)?;
        self.set_data(moved);
        Ok(())
    }

    // =========================================================================
    // Backward
    // =========================================================================

    /// Back-propagates from this scalar variable into every leaf that
    /// requires a gradient. Gradients accumulate until cleared.
    pub fn backward(&self) -> Result<()> {
        if !self.requires_grad {
            return Err(Error::gradient(
                "backward() called on a variable that does not require gradients",
            ));
        }
        if self.numel() != 1 {
            return Err(Error::gradient(format!(
                "backward() needs a scalar output, got shape {:?}",
                self.shape()
            )));
        }
        let seed = Tensor::ones(&self.shape());
        crate::backward::backward(self, &seed)
    }

    // =========================================================================
    // Arithmetic
    // =========================================================================

    /// Broadcasting addition.
    pub fn add_var(&self, other: &Variable) -> Result<Variable> {
        let (a, b) = (self.data(), other.data());
        let out = a.add(&b)?;
        Ok(Self::record(out, &[Some(self), Some(other)], |next| {
            AddBackward::new(next, a.shape().to_vec(), b.shape().to_vec())
        }))
    }

    /// Broadcasting elementwise multiplication.
    pub fn mul_var(&self, other: &Variable) -> Result<Variable> {
        let (a, b) = (self.data(), other.data());
        let out = a.mul(&b)?;
        Ok(Self::record(out, &[Some(self), Some(other)], |next| {
            MulBackward::new(next, a, b)
        }))
    }

    /// Multiplication by a constant.
    #[must_use]
    pub fn mul_scalar(&self, scalar: f32) -> Variable {
        let out = self.data().mul_scalar(scalar);
        Self::record(out, &[Some(self)], |mut next| {
            MulScalarBackward::new(next.remove(0), scalar)
        })
    }

    /// Matrix multiplication of 2D variables.
    pub fn matmul(&self, other: &Variable) -> Result<Variable> {
        let (a, b) = (self.data(), other.data());
        let out = a.matmul(&b)?;
        Ok(Self::record(out, &[Some(self), Some(other)], |next| {
            MatMulBackward::new(next, a, b)
        }))
    }

    /// Transpose of a 2D variable.
    pub fn t(&self) -> Result<Variable> {
        let out = self.data().t()?;
        Ok(Self::record(out, &[Some(self)], |mut next| {
            TransposeBackward::new(next.remove(0))
        }))
    }

    // =========================================================================
    // Reductions and Shape
    // =========================================================================

    /// Sum of all elements.
    #[must_use]
    pub fn sum(&self) -> Variable {
        let data = self.data();
        let out = data.sum();
        Self::record(out, &[Some(self)], |mut next| {
            SumBackward::new(next.remove(0), data.shape().to_vec())
        })
    }

    /// Mean of all elements.
    pub fn mean(&self) -> Result<Variable> {
        let data = self.data();
        let out = data.mean()?;
        Ok(Self::record(out, &[Some(self)], |mut next| {
            MeanBackward::new(next.remove(0), data.shape().to_vec())
        }))
    }

    /// Reshape; one dimension may be `-1`.
    pub fn reshape(&self, shape: &[isize]) -> Result<Variable> {
        let data = self.data();
        let out = data.reshape(shape)?;
        Ok(Self::record(out, &[Some(self)], |mut next| {
            ReshapeBackward::new(next.remove(0), data.shape().to_vec())
        }))
    }

    /// Collapses every dimension after the batch: `[N, ...] -> [N, D]`.
    pub fn flatten(&self) -> Result<Variable> {
        let data = self.data();
        let out = data.flatten_batch()?;
        Ok(Self::record(out, &[Some(self)], |mut next| {
            ReshapeBackward::new(next.remove(0), data.shape().to_vec())
        }))
    }

    // =========================================================================
    // Activations
    // =========================================================================

    /// Rectified linear unit.
    #[must_use]
    pub fn relu(&self) -> Variable {
        let data = self.data();
        let out = data.relu();
        Self::record(out, &[Some(self)], |mut next| ReluBackward::new(next.remove(0), data))
    }

    /// Hyperbolic tangent.
    #[must_use]
    pub fn tanh(&self) -> Variable {
        let out = self.data().tanh();
        let saved = out.clone();
        Self::record(out, &[Some(self)], |mut next| TanhBackward::new(next.remove(0), saved))
    }

    /// Inverted dropout: in `Training` mode each element is zeroed with
    /// probability `ratio` and survivors are scaled by `1 / (1 - ratio)`.
    /// In `Evaluating` mode this is the identity.
    pub fn dropout(&self, ratio: f32) -> Result<Variable> {
        if !(0.0..1.0).contains(&ratio) {
            return Err(Error::invalid_operation(format!(
                "dropout ratio must be in [0, 1), got {ratio}"
            )));
        }
        if current_mode() == Mode::Evaluating || ratio == 0.0 {
            return Ok(self.clone());
        }
        let data = self.data();
        let keep = 1.0 - ratio;
        let scale = 1.0 / keep;
        let mask_vals: Vec<f32> = with_rng(|rng| {
            (0..data.numel())
                .map(|_| if rng.gen::<f32>() < keep { scale } else { 0.0 })
                .collect()
        });
        let mask = Tensor::from_vec(mask_vals, data.shape())?;
        let out = data.mul(&mask)?;
        Ok(Self::record(out, &[Some(self)], |mut next| {
            DropoutBackward::new(next.remove(0), mask)
        }))
    }

    // =========================================================================
    // Layers
    // =========================================================================

    /// Affine map `x @ W^T + b` with `x: [N, in]`, `W: [out, in]`, `b: [out]`.
    pub fn linear(&self, weight: &Variable, bias: Option<&Variable>) -> Result<Variable> {
        let x = self.data();
        let w = weight.data();
        let mut out = x.matmul(&w.t()?)?;
        if let Some(b) = bias {
            out = out.add(&b.data())?;
        }
        Ok(Self::record(out, &[Some(self), Some(weight), bias], |next| {
            LinearBackward::new(next, x, w)
        }))
    }

    /// 2D convolution of `[N, C, H, W]` with `W: [O, C, KH, KW]`.
    pub fn conv2d(
        &self,
        weight: &Variable,
        bias: Option<&Variable>,
        geometry: Conv2dGeometry,
    ) -> Result<Variable> {
        let x = self.data();
        let w = weight.data();
        let b = bias.map(Variable::data);
        let out = ops::conv2d(&x, &w, b.as_ref(), geometry)?;
        Ok(Self::record(out, &[Some(self), Some(weight), bias], |next| {
            Conv2dBackward::new(next, x, w, geometry)
        }))
    }

    /// Max pooling over complete windows.
    pub fn max_pool2d(&self, kernel: (usize, usize), stride: (usize, usize)) -> Result<Variable> {
        let x = self.data();
        let (out, argmax) = ops::max_pool2d(&x, kernel, stride)?;
        Ok(Self::record(out, &[Some(self)], |mut next| {
            MaxPool2dBackward::new(next.remove(0), argmax, x.shape().to_vec())
        }))
    }

    /// Average pooling over complete windows.
    pub fn avg_pool2d(&self, kernel: (usize, usize), stride: (usize, usize)) -> Result<Variable> {
        let x = self.data();
        let out = ops::avg_pool2d(&x, kernel, stride)?;
        Ok(Self::record(out, &[Some(self)], |mut next| {
            AvgPool2dBackward::new(next.remove(0), x.shape().to_vec(), kernel, stride)
        }))
    }

    /// Cross-channel local response normalization.
    pub fn local_response_norm(&self, params: LrnParams) -> Result<Variable> {
        let x = self.data();
        let (out, scale) = ops::local_response_norm(&x, params)?;
        Ok(Self::record(out, &[Some(self)], |mut next| {
            LrnBackward::new(next.remove(0), x, scale, params)
        }))
    }

    /// Batch normalization over `[N, C, H, W]` with per-channel `gamma` and
    /// `beta`.
    ///
    /// With `stats = None` the batch's own mean and biased variance are used
    /// and returned so the caller can maintain running averages. With
    /// `Some((mean, var))` those fixed statistics are used instead.
    pub fn batch_norm2d(
        &self,
        gamma: &Variable,
        beta: &Variable,
        stats: Option<(&Tensor<f32>, &Tensor<f32>)>,
        eps: f64,
    ) -> Result<(Variable, Tensor<f32>, Tensor<f32>)> {
        let x = self.data();
        let (mean, var) = match stats {
            Some((mean, var)) => (mean.clone(), var.clone()),
            None => ops::channel_stats(&x)?,
        };
        let g = gamma.data();
        let (out, xhat) = ops::batch_norm2d(&x, &mean, &var, &g, &beta.data(), eps)?;
        let batch_stats = stats.is_none();
        let saved_var = var.clone();
        let y = Self::record(out, &[Some(self), Some(gamma), Some(beta)], |next| {
            BatchNorm2dBackward::new(next, xhat, g, saved_var, eps, batch_stats)
        });
        Ok((y, mean, var))
    }

    // =========================================================================
    // Loss
    // =========================================================================

    /// Mean softmax cross-entropy of `[N, C]` logits against `N` class
    /// indices stored as `f32`.
    pub fn softmax_cross_entropy(&self, targets: &Tensor<f32>) -> Result<Variable> {
        let logits = self.data();
        let [n, c] = *logits.shape() else {
            return Err(Error::invalid_shape(
                logits.shape(),
                "softmax_cross_entropy expects [batch, classes] logits",
            ));
        };
        if targets.numel() != n {
            return Err(Error::shape_mismatch(
                "softmax_cross_entropy targets",
                &[n],
                targets.shape(),
            ));
        }
        if n == 0 || c == 0 {
            return Err(Error::EmptyTensor);
        }
        let classes: Vec<usize> = targets
            .to_vec()
            .into_iter()
            .map(|t| {
                if t >= 0.0 && t.fract() == 0.0 && (t as usize) < c {
                    Ok(t as usize)
                } else {
                    Err(Error::invalid_operation(format!(
                        "target {t} is not a class index below {c}"
                    )))
                }
            })
            .collect::<Result<_>>()?;

        let x = logits.to_vec();
        let mut probs = vec![0.0f32; n * c];
        let mut total = 0.0f64;
        for (row, &t) in classes.iter().enumerate() {
            let r = &x[row * c..(row + 1) * c];
            let max = r.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let sum_exp: f32 = r.iter().map(|&v| (v - max).exp()).sum();
            let log_z = max + sum_exp.ln();
            for (j, &v) in r.iter().enumerate() {
                probs[row * c + j] = (v - log_z).exp();
            }
            total += f64::from(log_z - r[t]);
        }
        let loss = Tensor::scalar((total / n as f64) as f32);
        let probs = Tensor::from_vec(probs, &[n, c])?;
        Ok(Self::record(loss, &[Some(self)], |mut next| {
            SoftmaxCrossEntropyBackward::new(next.remove(0), probs, classes)
        }))
    }
}

impl std::fmt::Debug for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variable")
            .field("shape", &self.shape())
            .field("requires_grad", &self.requires_grad)
            .field("is_leaf", &self.is_leaf)
            .field("grad_fn", &self.grad_fn)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::count_recorded;
    use crate::mode::{no_grad, NoGradGuard};
    use approx::assert_relative_eq;

    fn leaf(data: Vec<f32>, shape: &[usize]) -> Variable {
        Variable::new(Tensor::from_vec(data, shape).unwrap(), true)
    }

    #[test]
    fn test_variable_creation() {
        let v = leaf(vec![1.0, 2.0, 3.0], &[3]);
        assert!(v.requires_grad());
        assert!(v.is_leaf());
        assert_eq!(v.shape(), vec![3]);
        assert!(v.grad().is_none());
    }

    #[test]
    fn test_add_mul_backward() {
        let a = leaf(vec![1.0, 2.0], &[2]);
        let b = leaf(vec![3.0, 4.0], &[2]);
        let loss = a.mul_var(&b).unwrap().add_var(&a).unwrap().sum();
        loss.backward().unwrap();
        assert_eq!(a.grad().unwrap().to_vec(), vec![4.0, 5.0]);
        assert_eq!(b.grad().unwrap().to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_gradients_accumulate_until_cleared() {
        let a = leaf(vec![1.0, 2.0], &[2]);
        a.sum().backward().unwrap();
        a.sum().backward().unwrap();
        assert_eq!(a.grad().unwrap().to_vec(), vec![2.0, 2.0]);
        a.zero_grad();
        assert!(a.grad().is_none());
    }

    #[test]
    fn test_backward_rejects_non_scalar() {
        let a = leaf(vec![1.0, 2.0], &[2]);
        assert!(a.relu().backward().is_err());
        let plain = Variable::from_tensor(Tensor::scalar(1.0));
        assert!(plain.backward().is_err());
    }

    #[test]
    fn test_linear_matches_matmul() {
        let x = Variable::from_tensor(Tensor::from_vec(vec![1.0, 2.0], &[1, 2]).unwrap());
        let w = leaf(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], &[3, 2]);
        let b = leaf(vec![0.5, 0.5, 0.5], &[3]);
        let y = x.linear(&w, Some(&b)).unwrap();
        assert_eq!(y.data().to_vec(), vec![1.5, 2.5, 3.5]);
        y.sum().backward().unwrap();
        assert_eq!(w.grad().unwrap().to_vec(), vec![1.0, 2.0, 1.0, 2.0, 1.0, 2.0]);
        assert_eq!(b.grad().unwrap().to_vec(), vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_softmax_cross_entropy_uniform_logits() {
        let logits = leaf(vec![0.0; 6], &[2, 3]);
        let targets = Tensor::from_vec(vec![0.0, 2.0], &[2]).unwrap();
        let loss = logits.softmax_cross_entropy(&targets).unwrap();
        assert_relative_eq!(loss.data().item().unwrap(), 3f32.ln(), epsilon = 1e-6);
        loss.backward().unwrap();
        let g = logits.grad().unwrap().to_vec();
        assert_relative_eq!(g[0], (1.0 / 3.0 - 1.0) / 2.0, epsilon = 1e-6);
        assert_relative_eq!(g[1], 1.0 / 6.0, epsilon = 1e-6);
    }

    #[test]
    fn test_softmax_cross_entropy_rejects_bad_targets() {
        let logits = leaf(vec![0.0; 4], &[2, 2]);
        let out_of_range = Tensor::from_vec(vec![0.0, 2.0], &[2]).unwrap();
        assert!(logits.softmax_cross_entropy(&out_of_range).is_err());
        let wrong_batch = Tensor::from_vec(vec![0.0], &[1]).unwrap();
        assert!(matches!(
            logits.softmax_cross_entropy(&wrong_batch),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_eval_mode_records_nothing() {
        let x = leaf(vec![1.0, -1.0, 2.0, -2.0], &[1, 4]);
        let w = leaf(vec![0.1; 8], &[2, 4]);
        let (y, recorded) = count_recorded(|| {
            no_grad(|| x.linear(&w, None).unwrap().relu().sum())
        });
        assert_eq!(recorded, 0);
        assert!(!y.requires_grad());
        assert!(y.grad_fn().is_none());

        let (_, recorded) = count_recorded(|| x.linear(&w, None).unwrap().relu().sum());
        assert_eq!(recorded, 3);
    }

    #[test]
    fn test_dropout_is_identity_when_evaluating() {
        let x = leaf(vec![1.0; 100], &[100]);
        let _guard = NoGradGuard::new();
        let y = x.dropout(0.5).unwrap();
        assert_eq!(y.data().to_vec(), vec![1.0; 100]);
    }

    #[test]
    fn test_dropout_scales_survivors_when_training() {
        let x = Variable::from_tensor(Tensor::full(&[1000], 1.0));
        let y = x.dropout(0.5).unwrap().data().to_vec();
        assert!(y.iter().all(|&v| v == 0.0 || v == 2.0));
        let kept = y.iter().filter(|&&v| v > 0.0).count();
        assert!(kept > 350 && kept < 650, "kept {kept}");
        assert!(x.dropout(1.0).is_err());
    }

    #[test]
    fn test_conv_pool_chain_backward() {
        let x = Variable::from_tensor(Tensor::full(&[1, 1, 4, 4], 1.0));
        let w = leaf(vec![1.0; 4], &[1, 1, 2, 2]);
        let b = leaf(vec![0.0], &[1]);
        let y = x
            .conv2d(&w, Some(&b), Conv2dGeometry::new(1, 0))
            .unwrap()
            .max_pool2d((2, 2), (1, 1))
            .unwrap();
        assert_eq!(y.shape(), vec![1, 1, 2, 2]);
        y.sum().backward().unwrap();
        assert_eq!(b.grad().unwrap().to_vec(), vec![4.0]);
        assert!(x.grad().is_none());
    }

    #[test]
    fn test_batch_norm_parameter_gradients() {
        let x = Variable::from_tensor(
            Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 1, 1, 2]).unwrap(),
        );
        let gamma = leaf(vec![1.0], &[1]);
        let beta = leaf(vec![0.0], &[1]);
        let (y, mean, var) = x.batch_norm2d(&gamma, &beta, None, 1e-5).unwrap();
        assert_eq!(mean.to_vec(), vec![2.5]);
        assert_eq!(var.to_vec(), vec![1.25]);
        y.sum().backward().unwrap();
        assert_relative_eq!(beta.grad().unwrap().to_vec()[0], 4.0);
        assert_relative_eq!(gamma.grad().unwrap().to_vec()[0], 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_set_data_visible_through_clones() {
        let a = leaf(vec![0.0], &[1]);
        let alias = a.clone();
        a.set_data(Tensor::from_vec(vec![5.0, 6.0], &[2]).unwrap());
        assert_eq!(alias.data().to_vec(), vec![5.0, 6.0]);
    }
}
