//! Architecture-level properties shared by LeNet5, AlexNet and ZFNet.

use cnnkit_autograd::{count_recorded, no_grad, EvalGuard, Variable};
use cnnkit_core::Error;
use cnnkit_nn::Module;
use cnnkit_tensor::Tensor;
use cnnkit_vision::{AlexNet, LeNet5, ZFNet};

fn input(batch: usize, channels: usize, side: usize) -> Variable {
    Variable::from_tensor(Tensor::randn(&[batch, channels, side, side]))
}

fn snapshot(model: &dyn Module) -> Vec<Vec<f32>> {
    model.parameters().iter().map(|p| p.data().to_vec()).collect()
}

#[test]
fn output_width_is_class_count() {
    for classes in [10, 3] {
        let lenet = LeNet5::new(classes);
        assert_eq!(lenet.forward(&input(2, 1, 32)).unwrap().shape(), vec![2, classes]);
    }
    let alexnet = AlexNet::new(6);
    assert_eq!(alexnet.forward(&input(1, 3, 67)).unwrap().shape(), vec![1, 6]);
    let zfnet = ZFNet::default();
    assert_eq!(zfnet.forward(&input(2, 3, 67)).unwrap().shape(), vec![2, 10]);
}

#[test]
#[ignore = "full resolution; slow without optimisations"]
fn full_resolution_forward() {
    let x = input(1, 3, 227);
    assert_eq!(AlexNet::default().forward(&x).unwrap().shape(), vec![1, 10]);
    assert_eq!(ZFNet::default().forward(&x).unwrap().shape(), vec![1, 10]);
}

#[test]
fn evaluation_records_nothing_and_leaves_parameters_untouched() {
    let model = LeNet5::default();
    let x = input(4, 1, 32);
    model.forward(&x).unwrap();
    let before = snapshot(&model);

    let (out, recorded) = count_recorded(|| {
        let _eval = EvalGuard::new();
        model.forward(&x)
    });
    let out = out.unwrap();
    assert_eq!(recorded, 0);
    assert!(out.grad_fn().is_none());
    assert_eq!(snapshot(&model), before);
    assert!(model.parameters().iter().all(|p| p.grad().is_none()));

    let (_, recorded) = count_recorded(|| model.forward(&x));
    assert!(recorded > 0);
}

#[test]
fn dropout_is_stochastic_only_while_training() {
    let model = AlexNet::default();
    let x = input(2, 3, 67);

    let a = model.forward(&x).unwrap().data().to_vec();
    let b = model.forward(&x).unwrap().data().to_vec();
    assert_ne!(a, b);

    let c = no_grad(|| model.forward(&x)).unwrap().data().to_vec();
    let d = no_grad(|| model.forward(&x)).unwrap().data().to_vec();
    assert_eq!(c, d);
}

#[test]
fn shape_mismatch_names_the_layer() {
    let model = AlexNet::default();
    model.forward(&input(1, 3, 67)).unwrap();

    // A 4-channel batch no longer fits conv1's inferred input channels.
    match model.forward(&input(1, 4, 67)).unwrap_err() {
        Error::ShapeMismatch { layer, .. } => assert_eq!(layer, "conv1"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn zero_grad_clears_every_parameter() {
    let model = LeNet5::default();
    model.forward(&input(2, 1, 32)).unwrap().sum().backward().unwrap();
    assert!(model.parameters().iter().all(|p| p.grad().is_some()));
    model.zero_grad();
    assert!(model.parameters().iter().all(|p| p.grad().is_none()));
}
