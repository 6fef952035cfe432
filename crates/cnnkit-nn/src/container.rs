//! Layers - Ordered Named Layer Container
//!
//! A model owns its layers through a `Layers` map that keeps declaration
//! order. Forward passes address layers by name; parameter enumeration walks
//! them in order, yielding names such as `conv1.W`.
//!
//! # Example
//! ```rust
//! use cnnkit_nn::{Conv2d, Layers, Linear};
//!
//! let layers = Layers::new()
//!     .with("conv1", Conv2d::lazy(6, 5))
//!     .with("fc1", Linear::lazy(10));
//! assert_eq!(layers.names().collect::<Vec<_>>(), ["conv1", "fc1"]);
//! ```
//!
//! @version 0.1.0

use std::fmt::Write as _;

use cnnkit_autograd::Variable;
use cnnkit_core::error::{Error, Result};
use cnnkit_core::Device;

use crate::module::Module;
use crate::parameter::Parameter;

// =============================================================================
// Layers
// =============================================================================

/// Ordered mapping from layer name to layer.
#[derive(Default)]
pub struct Layers {
    entries: Vec<(String, Box<dyn Module>)>,
}

impl Layers {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a layer (builder form). Names must be unique.
    #[must_use]
    pub fn with<M: Module + 'static>(mut self, name: impl Into<String>, layer: M) -> Self {
        let name = name.into();
        debug_assert!(self.get(&name).is_none(), "duplicate layer name {name}");
        self.entries.push((name, Box::new(layer)));
        self
    }

    /// Appends a layer, rejecting duplicate names.
    pub fn push<M: Module + 'static>(&mut self, name: impl Into<String>, layer: M) -> Result<()> {
        let name = name.into();
        if self.get(&name).is_some() {
            return Err(Error::invalid_operation(format!("duplicate layer name {name}")));
        }
        self.entries.push((name, Box::new(layer)));
        Ok(())
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no layers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks a layer up by name.
    pub fn get(&self, name: &str) -> Option<&dyn Module> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, layer)| layer.as_ref())
    }

    /// Layer names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Iterates over `(name, layer)` in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn Module)> {
        self.entries.iter().map(|(n, l)| (n.as_str(), l.as_ref()))
    }

    /// Runs the named layer. Shape errors are attributed to `name`.
    pub fn forward(&self, name: &str, input: &Variable) -> Result<Variable> {
        let layer = self
            .get(name)
            .ok_or_else(|| Error::invalid_operation(format!("no layer named {name}")))?;
        layer.forward(input).map_err(|e| e.in_layer(name))
    }

    /// Parameters of every layer in declaration order, as `layer.param`.
    pub fn named_parameters(&self) -> Vec<(String, Parameter)> {
        self.entries
            .iter()
            .flat_map(|(layer_name, layer)| {
                layer
                    .named_parameters()
                    .into_iter()
                    .map(move |(p, param)| (format!("{layer_name}.{p}"), param))
            })
            .collect()
    }

    /// Clears every parameter gradient.
    pub fn zero_grad(&self) {
        for (_, layer) in &self.entries {
            layer.zero_grad();
        }
    }

    /// Moves every layer to `device`.
    pub fn to_device(&self, device: Device) -> Result<()> {
        device.ensure_available()?;
        for (_, layer) in &self.entries {
            layer.to_device(device)?;
        }
        Ok(())
    }

    /// One line per layer with its kind and current parameter count.
    ///
    /// Lazily shaped layers show zero parameters before the first forward.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let mut total = 0;
        for (name, layer) in &self.entries {
            let count = layer.num_parameters();
            total += count;
            let _ = writeln!(out, "{name:<12} {:<12} {count:>12}", layer.name());
        }
        let _ = write!(out, "{:<25} {total:>12}", "total");
        out
    }
}

impl std::fmt::Debug for Layers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(n, l)| (n, l.name())))
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{BatchNorm2d, Conv2d, Linear};
    use cnnkit_tensor::Tensor;

    fn layers() -> Layers {
        Layers::new()
            .with("conv1", Conv2d::new(1, 2, 3))
            .with("bn1", BatchNorm2d::new(2))
            .with("fc2", Linear::new(8, 3))
    }

    #[test]
    fn test_parameter_order_follows_declaration() {
        let names: Vec<String> = layers().named_parameters().into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            ["conv1.W", "conv1.b", "bn1.gamma", "bn1.beta", "fc2.W", "fc2.b"]
        );
    }

    #[test]
    fn test_forward_attributes_errors_to_layer_name() {
        let layers = layers();
        let x = Variable::from_tensor(Tensor::ones(&[1, 9]));
        let err = layers.forward("fc2", &x).unwrap_err();
        assert_eq!(err, Error::shape_mismatch("fc2", &[1, 8], &[1, 9]));
        assert!(layers.forward("fc9", &x).is_err());
    }

    #[test]
    fn test_push_rejects_duplicates() {
        let mut layers = layers();
        assert!(layers.push("conv1", Linear::lazy(2)).is_err());
        layers.push("fc3", Linear::lazy(2)).unwrap();
        assert_eq!(layers.len(), 4);
    }

    #[test]
    fn test_summary_lists_layers() {
        let summary = layers().summary();
        assert!(summary.contains("conv1"));
        assert!(summary.contains("Linear"));
        let total = 2 * 9 + 2 + 4 + 8 * 3 + 3;
        assert!(summary.trim_end().ends_with(&total.to_string()));
    }
}
