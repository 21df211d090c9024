//! Model input description consumed at lazy-initialization time.

use serde::{Deserialize, Serialize};
use crate::error::{BatchingError, Result};

/// NHWC shape of one model input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorShape {
    pub n: u32,
    pub h: u32,
    pub w: u32,
    pub c: u32,
}

impl TensorShape {
    pub fn new(n: u32, h: u32, w: u32, c: u32) -> Self {
        Self { n, h, w, c }
    }

    /// Number of elements of a single sample (`h * w * c`).
    pub fn sample_len(&self) -> usize {
        self.h as usize * self.w as usize * self.c as usize
    }
}

/// Supplies the declared input shapes of a loaded model.
pub trait ModelShapes: Send + Sync {
    fn input_shapes(&self) -> &[TensorShape];

    /// Shape of input `index`, or an error when the model declares fewer inputs.
    fn input_shape(&self, index: usize) -> Result<TensorShape> {
        self.input_shapes()
            .get(index)
            .copied()
            .ok_or(BatchingError::MissingInputShape(index))
    }
}

/// Static list of input shapes, for models whose description is known up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    inputs: Vec<TensorShape>,
}

impl ModelInfo {
    pub fn new(inputs: Vec<TensorShape>) -> Self {
        Self { inputs }
    }
}

impl ModelShapes for ModelInfo {
    fn input_shapes(&self) -> &[TensorShape] {
        &self.inputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_shape_lookup() {
        let model = ModelInfo::new(vec![TensorShape::new(4, 224, 224, 3)]);
        assert_eq!(model.input_shape(0).unwrap().sample_len(), 224 * 224 * 3);
        assert!(matches!(model.input_shape(1), Err(BatchingError::MissingInputShape(1))));
    }
}
