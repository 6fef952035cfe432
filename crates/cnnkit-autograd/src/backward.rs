//! Backward Pass - Gradient Computation
//!
//! Reverse-mode traversal of the graph hanging off a variable, plus the
//! finite-difference helpers used to check analytical gradients.
//!
//! @version 0.1.0

use std::collections::{HashMap, HashSet};

use cnnkit_core::error::{Error, Result};
use cnnkit_tensor::Tensor;

use crate::grad_fn::{GradFn, GradFnId};
use crate::mode::no_grad;
use crate::variable::Variable;

// =============================================================================
// Backward Function
// =============================================================================

/// Propagates `grad_output` from `output` to every reachable leaf.
pub fn backward(output: &Variable, grad_output: &Tensor<f32>) -> Result<()> {
    let Some(grad_fn) = output.grad_fn().cloned() else {
        return Err(Error::gradient("variable is not part of a graph"));
    };

    let mut topo_order: Vec<GradFn> = Vec::new();
    let mut visited: HashSet<GradFnId> = HashSet::new();
    build_topo_order(&grad_fn, &mut topo_order, &mut visited);

    let mut grad_map: HashMap<GradFnId, Tensor<f32>> = HashMap::new();
    grad_map.insert(grad_fn.id(), grad_output.clone());

    for node in topo_order.iter().rev() {
        let Some(grad) = grad_map.remove(&node.id()) else {
            continue;
        };
        let input_grads = node.apply(&grad)?;

        for (next_fn, input_grad) in node.next_functions().iter().zip(input_grads) {
            let (Some(next_fn), Some(input_grad)) = (next_fn, input_grad) else {
                continue;
            };
            match grad_map.remove(&next_fn.id()) {
                Some(existing) => {
                    grad_map.insert(next_fn.id(), existing.add(&input_grad)?);
                }
                None => {
                    grad_map.insert(next_fn.id(), input_grad);
                }
            }
        }
    }
    Ok(())
}

/// Depth-first post-order over the graph; iterative so deep graphs cannot
/// overflow the stack.
fn build_topo_order(root: &GradFn, order: &mut Vec<GradFn>, visited: &mut HashSet<GradFnId>) {
    let mut stack: Vec<(GradFn, bool)> = vec![(root.clone(), false)];
    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            order.push(node);
            continue;
        }
        if !visited.insert(node.id()) {
            continue;
        }
        stack.push((node.clone(), true));
        for next in node.next_functions().iter().flatten() {
            if !visited.contains(&next.id()) {
                stack.push((next.clone(), false));
            }
        }
    }
}

// =============================================================================
// Gradient Checking
// =============================================================================

/// Central-difference estimate of d`func`/d`input` for a scalar `func`.
pub fn numerical_gradient<F>(func: F, input: &Tensor<f32>, eps: f32) -> Result<Tensor<f32>>
where
    F: Fn(&Variable) -> Result<Variable>,
{
    let base = input.to_vec();
    let mut grad = vec![0.0f32; base.len()];
    let eval = |data: Vec<f32>| -> Result<f32> {
        let v = Variable::from_tensor(Tensor::from_vec(data, input.shape())?);
        no_grad(|| func(&v))?.data().item()
    };
    for i in 0..base.len() {
        let mut plus = base.clone();
        plus[i] += eps;
        let mut minus = base.clone();
        minus[i] -= eps;
        grad[i] = (eval(plus)? - eval(minus)?) / (2.0 * eps);
    }
    Tensor::from_vec(grad, input.shape())
}

/// Returns true when every element of `analytical` is within `atol + rtol *
/// |numerical|` of `numerical`.
#[must_use]
pub fn gradcheck(analytical: &Tensor<f32>, numerical: &Tensor<f32>, rtol: f32, atol: f32) -> bool {
    if analytical.shape() != numerical.shape() {
        return false;
    }
    analytical
        .to_vec()
        .iter()
        .zip(numerical.to_vec())
        .all(|(&a, n)| (a - n).abs() <= atol + rtol * n.abs())
}

// =============================================================================
// Tests
// =============================================================================
