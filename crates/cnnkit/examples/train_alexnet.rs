//! AlexNet or ZFNet on CIFAR-10
//!
//! Usage: `cargo run --release --example train_alexnet -- [alexnet|zfnet] [config.toml]`
//!
//! Inputs are resized to 227x227, so an epoch over the full dataset is slow
//! on CPU. Without `data.root` a small synthetic set is used.
//!
//! @version 0.1.0

use cnnkit::prelude::*;
use tracing::{info, warn};

type Sample = (Tensor<f32>, Tensor<f32>);

fn main() -> Result<()> {
    cnnkit::logging::init();

    let mut args = std::env::args().skip(1);
    let arch = args.next().unwrap_or_else(|| "alexnet".to_string());
    let config = match args.next() {
        Some(path) => ExperimentConfig::from_file(path)?,
        None => ExperimentConfig::alexnet(),
    };

    let model: Box<dyn Module> = match arch.as_str() {
        "alexnet" => Box::new(AlexNet::new(10)),
        "zfnet" => Box::new(ZFNet::new(10)),
        other => return Err(Error::config(format!("unknown architecture '{other}'"))),
    };

    let history = match &config.data.root {
        Some(root) => run(
            &config,
            model.as_ref(),
            CIFAR10::new(root, true)?,
            CIFAR10::new(root, false)?,
        )?,
        None => {
            warn!("data.root not set, training on synthetic images");
            run(
                &config,
                model.as_ref(),
                SyntheticCIFAR10::new(64),
                SyntheticCIFAR10::new(16),
            )?
        }
    };

    for report in history.epochs() {
        info!(
            epoch = report.epoch,
            train_loss = report.train.loss,
            test_accuracy = report.eval.accuracy,
            "summary"
        );
    }
    Ok(())
}

fn run<D>(
    config: &ExperimentConfig,
    model: &dyn Module,
    train: D,
    test: D,
) -> Result<TrainingHistory>
where
    D: Dataset<Item = Sample>,
{
    let training = &config.training;
    let device = training.select_device()?;

    let (train_iter, test_iter) = config.iterators(train, test, device)?;
    let (train_iter, test_iter) = (train_iter.num_workers(4), test_iter.num_workers(4));
    model.to_device(device)?;

    let mut optimizer = Adam::new(training.learning_rate).bind(model);
    info!(model = model.name(), device = %device, "starting");

    Trainer::new(training.clone()).fit(
        model,
        &mut optimizer,
        &train_iter,
        &test_iter,
        training.epochs,
        softmax_cross_entropy,
        accuracy,
    )
}
