//! Trainer - Epoch Loop for Classification Models
//!
//! [`Trainer::fit`] alternates a training phase and an evaluation phase for
//! a fixed number of epochs and reports the mean loss and accuracy of each.
//!
//! Training step order: forward, loss, accuracy, `zero_grad`, backward,
//! `update`, accumulate. Evaluation runs forward, loss and accuracy inside a
//! single [`EvalGuard`], so no graph is recorded and no parameter changes.
//!
//! # Example
//! ```rust
//! use cnnkit::prelude::*;
//!
//! let train = DataIterator::new(TransformedDataset::new(SyntheticMNIST::new(8), lenet_pipeline()), 4);
//! let eval = DataIterator::new(TransformedDataset::new(SyntheticMNIST::new(4), lenet_pipeline()), 4);
//! let model = LeNet5::default();
//! let mut optimizer = Adam::default().bind(&model);
//!
//! let history = Trainer::default()
//!     .fit(&model, &mut optimizer, &train, &eval, 1, softmax_cross_entropy, accuracy)
//!     .unwrap();
//! assert_eq!(history.len(), 1);
//! ```
//!
//! @version 0.1.0

use std::fmt;

use tracing::{debug, info};

use cnnkit_autograd::{EvalGuard, Mode, ModeGuard, Variable};
use cnnkit_core::error::{Error, Result};
use cnnkit_data::{Batch, BatchSource};
use cnnkit_nn::Module;
use cnnkit_optim::Optimizer;
use cnnkit_tensor::Tensor;

use crate::config::TrainingConfig;

// =============================================================================
// Phase
// =============================================================================

/// The two halves of an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Parameters are updated.
    Train,
    /// Parameters are only read.
    Eval,
}

impl Phase {
    /// Lowercase name used in logs and errors.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Eval => "eval",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Metrics and Reports
// =============================================================================

/// Loss and accuracy of one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepMetrics {
    /// Scalar loss value.
    pub loss: f32,
    /// Fraction of correct predictions in the batch.
    pub accuracy: f32,
}

/// Running sums over one phase.
#[derive(Debug, Clone, Default)]
pub struct PhaseAccumulator {
    loss_sum: f64,
    accuracy_sum: f64,
    steps: usize,
}

impl PhaseAccumulator {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one step.
    pub fn add(&mut self, metrics: StepMetrics) {
        self.loss_sum += f64::from(metrics.loss);
        self.accuracy_sum += f64::from(metrics.accuracy);
        self.steps += 1;
    }

    /// Steps added so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Divides the sums by `max_iter`, the step count the iterator reported.
    ///
    /// Fails with `Error::StepCountMismatch` if a different number of steps
    /// was added. An empty phase reports zero means.
    pub fn finish(&self, phase: Phase, max_iter: usize) -> Result<PhaseReport> {
        if self.steps != max_iter {
            return Err(Error::StepCountMismatch {
                phase: phase.as_str(),
                expected: max_iter,
                actual: self.steps,
            });
        }
        let mean = |sum: f64| {
            if max_iter == 0 {
                0.0
            } else {
                (sum / max_iter as f64) as f32
            }
        };
        Ok(PhaseReport {
            phase,
            loss: mean(self.loss_sum),
            accuracy: mean(self.accuracy_sum),
            steps: self.steps,
        })
    }
}

/// Mean metrics of one phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseReport {
    /// Which phase.
    pub phase: Phase,
    /// Mean loss per step.
    pub loss: f32,
    /// Mean accuracy per step.
    pub accuracy: f32,
    /// Steps taken.
    pub steps: usize,
}

/// Both phases of one epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Training phase.
    pub train: PhaseReport,
    /// Evaluation phase.
    pub eval: PhaseReport,
}

/// Reports of every completed epoch, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingHistory {
    epochs: Vec<EpochReport>,
}

impl TrainingHistory {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an epoch.
    pub fn push(&mut self, report: EpochReport) {
        self.epochs.push(report);
    }

    /// Number of completed epochs.
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    /// Returns true if no epoch completed.
    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// Reports in epoch order.
    pub fn epochs(&self) -> &[EpochReport] {
        &self.epochs
    }

    /// The final epoch.
    pub fn last(&self) -> Option<&EpochReport> {
        self.epochs.last()
    }

    /// Highest evaluation accuracy seen.
    pub fn best_eval_accuracy(&self) -> Option<f32> {
        self.epochs.iter().map(|e| e.eval.accuracy).reduce(f32::max)
    }

    /// Training loss per epoch.
    pub fn train_losses(&self) -> Vec<f32> {
        self.epochs.iter().map(|e| e.train.loss).collect()
    }

    /// Evaluation loss per epoch.
    pub fn eval_losses(&self) -> Vec<f32> {
        self.epochs.iter().map(|e| e.eval.loss).collect()
    }
}

// =============================================================================
// Callback
// =============================================================================

/// Observer of training progress. Every method defaults to doing nothing.
pub trait Callback {
    /// Called before the training phase of `epoch` (1-based).
    fn on_epoch_begin(&mut self, _epoch: usize) {}

    /// Called when a phase starts.
    fn on_phase_begin(&mut self, _epoch: usize, _phase: Phase) {}

    /// Called after each step with its 0-based index within the phase.
    fn on_step_end(&mut self, _epoch: usize, _phase: Phase, _step: usize, _metrics: StepMetrics) {}

    /// Called when a phase's report is ready.
    fn on_phase_end(&mut self, _epoch: usize, _report: &PhaseReport) {}

    /// Called after both phases of an epoch.
    fn on_epoch_end(&mut self, _report: &EpochReport) {}
}

// =============================================================================
// Trainer
// =============================================================================

/// Runs the epoch loop.
#[derive(Default)]
pub struct Trainer {
    config: TrainingConfig,
    callbacks: Vec<Box<dyn Callback>>,
}

impl Trainer {
    /// Creates a trainer. Only `seed` and `log_every` are read from `config`;
    /// the caller builds iterators and the optimizer from the rest.
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            callbacks: Vec::new(),
        }
    }

    /// Builder: register an observer.
    #[must_use]
    pub fn callback<C: Callback + 'static>(mut self, callback: C) -> Self {
        self.callbacks.push(Box::new(callback));
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Trains `model` for `epochs` epochs.
    ///
    /// `loss_fn` maps `(logits, targets)` to a scalar loss variable and
    /// `acc_fn` to an accuracy in `[0, 1]`. The first error from any step
    /// aborts the run and is returned unchanged.
    #[allow(clippy::too_many_arguments)]
    pub fn fit<M, O, T, E, L, A>(
        &mut self,
        model: &M,
        optimizer: &mut O,
        train_iter: &T,
        eval_iter: &E,
        epochs: usize,
        loss_fn: L,
        acc_fn: A,
    ) -> Result<TrainingHistory>
    where
        M: Module + ?Sized,
        O: Optimizer + ?Sized,
        T: BatchSource + ?Sized,
        E: BatchSource + ?Sized,
        L: Fn(&Variable, &Tensor<f32>) -> Result<Variable>,
        A: Fn(&Variable, &Tensor<f32>) -> Result<f32>,
    {
        if let Some(seed) = self.config.seed {
            cnnkit_core::random::seed(seed);
        }
        info!(
            model = model.name(),
            epochs,
            train_steps = train_iter.max_iter(),
            eval_steps = eval_iter.max_iter(),
            "training started"
        );

        let mut history = TrainingHistory::new();
        for epoch in 1..=epochs {
            self.emit(|c| c.on_epoch_begin(epoch));

            let train = {
                let _train = ModeGuard::enter(Mode::Training);
                self.run_phase(epoch, Phase::Train, train_iter, |batch| {
                    let (loss, metrics) = evaluate(model, batch, &loss_fn, &acc_fn)?;
                    model.zero_grad();
                    loss.backward()?;
                    optimizer.update()?;
                    Ok(metrics)
                })?
            };

            let eval = {
                let _eval = EvalGuard::new();
                self.run_phase(epoch, Phase::Eval, eval_iter, |batch| {
                    evaluate(model, batch, &loss_fn, &acc_fn).map(|(_, metrics)| metrics)
                })?
            };

            info!(
                epoch,
                train_loss = train.loss,
                train_accuracy = train.accuracy,
                test_loss = eval.loss,
                test_accuracy = eval.accuracy,
                "epoch finished"
            );
            let report = EpochReport { epoch, train, eval };
            self.emit(|c| c.on_epoch_end(&report));
            history.push(report);
        }
        Ok(history)
    }

    fn run_phase<S, F>(
        &mut self,
        epoch: usize,
        phase: Phase,
        source: &S,
        mut step: F,
    ) -> Result<PhaseReport>
    where
        S: BatchSource + ?Sized,
        F: FnMut(&Batch) -> Result<StepMetrics>,
    {
        self.emit(|c| c.on_phase_begin(epoch, phase));
        let log_every = self.config.log_every.max(1);
        let mut acc = PhaseAccumulator::new();
        for (index, batch) in source.epoch().enumerate() {
            let metrics = step(&batch?)?;
            acc.add(metrics);
            if (index + 1) % log_every == 0 {
                debug!(
                    epoch,
                    phase = phase.as_str(),
                    step = index + 1,
                    loss = metrics.loss,
                    accuracy = metrics.accuracy,
                    "step"
                );
            }
            self.emit(|c| c.on_step_end(epoch, phase, index, metrics));
        }
        let report = acc.finish(phase, source.max_iter())?;
        self.emit(|c| c.on_phase_end(epoch, &report));
        Ok(report)
    }

    fn emit(&mut self, mut event: impl FnMut(&mut dyn Callback)) {
        for callback in &mut self.callbacks {
            event(callback.as_mut());
        }
    }
}

/// Forward, loss and accuracy for one batch. The metrics are detached scalars.
fn evaluate<M, L, A>(
    model: &M,
    batch: &Batch,
    loss_fn: &L,
    acc_fn: &A,
) -> Result<(Variable, StepMetrics)>
where
    M: Module + ?Sized,
    L: Fn(&Variable, &Tensor<f32>) -> Result<Variable>,
    A: Fn(&Variable, &Tensor<f32>) -> Result<f32>,
{
    let input = Variable::from_tensor(batch.input.clone());
    let output = model.forward(&input)?;
    let loss = loss_fn(&output, &batch.target)?;
    let accuracy = acc_fn(&output, &batch.target)?;
    let metrics = StepMetrics {
        loss: loss.data().item()?,
        accuracy,
    };
    Ok((loss, metrics))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_accumulator_mean() {
        let mut acc = PhaseAccumulator::new();
        for loss in [1.0, 2.0, 3.0] {
            acc.add(StepMetrics {
                loss,
                accuracy: 0.5,
            });
        }
        let report = acc.finish(Phase::Train, 3).unwrap();
        assert_relative_eq!(report.loss, 2.0);
        assert_relative_eq!(report.accuracy, 0.5);
        assert_eq!(report.steps, 3);
    }

    #[test]
    fn test_accumulator_step_mismatch() {
        let mut acc = PhaseAccumulator::new();
        acc.add(StepMetrics {
            loss: 1.0,
            accuracy: 1.0,
        });
        assert_eq!(
            acc.finish(Phase::Eval, 2).unwrap_err(),
            Error::StepCountMismatch {
                phase: "eval",
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_empty_phase() {
        let report = PhaseAccumulator::new().finish(Phase::Eval, 0).unwrap();
        assert_eq!(report.loss, 0.0);
        assert_eq!(report.steps, 0);
    }

    #[test]
    fn test_history_queries() {
        let phase = |phase, loss, accuracy| PhaseReport {
            phase,
            loss,
            accuracy,
            steps: 1,
        };
        let mut history = TrainingHistory::new();
        for (epoch, acc) in [(1, 0.4), (2, 0.7), (3, 0.6)] {
            history.push(EpochReport {
                epoch,
                train: phase(Phase::Train, 1.0 / epoch as f32, acc),
                eval: phase(Phase::Eval, 2.0, acc),
            });
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.best_eval_accuracy(), Some(0.7));
        assert_eq!(history.eval_losses(), vec![2.0; 3]);
        assert_eq!(history.last().map(|e| e.epoch), Some(3));
        assert_eq!(Phase::Train.to_string(), "train");
    }
}
