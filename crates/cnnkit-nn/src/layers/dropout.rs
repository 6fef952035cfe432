//! Dropout Layer
//!
//! @version 0.1.0

use cnnkit_autograd::Variable;
use cnnkit_core::error::{Error, Result};

use crate::module::Module;

/// Inverted dropout as a module. Active only in `Training` mode.
#[derive(Debug, Clone, Copy)]
pub struct Dropout {
    ratio: f32,
}

impl Dropout {
    /// Creates a dropout layer; `ratio` must be in `[0, 1)`.
    pub fn new(ratio: f32) -> Result<Self> {
        if (0.0..1.0).contains(&ratio) {
            Ok(Self { ratio })
        } else {
            Err(Error::invalid_operation(format!(
                "dropout ratio must be in [0, 1), got {ratio}"
            )))
        }
    }

    /// Probability of zeroing an element.
    pub fn ratio(&self) -> f32 {
        self.ratio
    }
}

impl Default for Dropout {
    fn default() -> Self {
        Self { ratio: 0.5 }
    }
}

impl Module for Dropout {
    fn forward(&self, input: &Variable) -> Result<Variable> {
        input.dropout(self.ratio)
    }

    fn name(&self) -> &'static str {
        "Dropout"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cnnkit_autograd::no_grad;
    use cnnkit_tensor::Tensor;

    #[test]
    fn test_dropout_modes() {
        let layer = Dropout::default();
        let x = Variable::from_tensor(Tensor::ones(&[256]));
        let eval = no_grad(|| layer.forward(&x)).unwrap();
        assert_eq!(eval.data().to_vec(), vec![1.0; 256]);

        let train = layer.forward(&x).unwrap().data().to_vec();
        assert!(train.iter().any(|&v| v == 0.0));
        assert!(train.iter().any(|&v| v == 2.0));
    }

    #[test]
    fn test_invalid_ratio() {
        assert!(Dropout::new(1.0).is_err());
        assert_eq!(Dropout::new(0.25).unwrap().ratio(), 0.25);
    }
}
