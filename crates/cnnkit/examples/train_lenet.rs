//! LeNet-5 on MNIST
//!
//! Usage: `cargo run --example train_lenet -- [config.toml]`
//!
//! Reads MNIST from `data.root` when set, otherwise trains on synthetic
//! digits. Set `RUST_LOG=cnnkit=debug` for per-step output.
//!
//! @version 0.1.0

use cnnkit::prelude::*;
use tracing::{info, warn};

type Sample = (Tensor<f32>, Tensor<f32>);

fn main() -> Result<()> {
    cnnkit::logging::init();

    let config = match std::env::args().nth(1) {
        Some(path) => ExperimentConfig::from_file(path)?,
        None => ExperimentConfig::lenet(),
    };

    let history = match &config.data.root {
        Some(root) => run(&config, MNIST::new(root, true)?, MNIST::new(root, false)?)?,
        None => {
            warn!("data.root not set, training on synthetic digits");
            run(&config, SyntheticMNIST::new(1000), SyntheticMNIST::new(200))?
        }
    };

    if let Some(best) = history.best_eval_accuracy() {
        info!(best_test_accuracy = best, "done");
    }
    Ok(())
}

fn run<D>(config: &ExperimentConfig, train: D, test: D) -> Result<TrainingHistory>
where
    D: Dataset<Item = Sample>,
{
    let training = &config.training;
    let device = training.select_device()?;

    let (train_iter, test_iter) = config.iterators(train, test, device)?;

    let model = LeNet5::new(10);
    model.to_device(device)?;
    let mut optimizer = Adam::new(training.learning_rate).bind(&model);

    info!(
        model = model.name(),
        device = %device,
        train_batches = train_iter.max_iter(),
        test_batches = test_iter.max_iter(),
        "starting"
    );
    Trainer::new(training.clone()).fit(
        &model,
        &mut optimizer,
        &train_iter,
        &test_iter,
        training.epochs,
        softmax_cross_entropy,
        accuracy,
    )
}
