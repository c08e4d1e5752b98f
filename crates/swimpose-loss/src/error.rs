//! Error types for joint heatmap loss computation.

use thiserror::Error;

/// Errors that can occur while configuring or evaluating a joints loss.
///
/// Every variant describes a configuration or shape bug on the caller's side.
/// None of them are transient, so a training loop should stop rather than retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JointsLossError {
    /// Prediction and target heatmaps disagree in shape.
    #[error(
        "incompatible tensor shapes: predictions shape {pred_shape:?} does not match targets shape {target_shape:?}"
    )]
    IncompatibleShapes {
        pred_shape: Vec<usize>,
        target_shape: Vec<usize>,
    },

    /// The joint weight tensor is not `[batch, joints]`.
    #[error("target weight shape mismatch: expected {expected:?}, got {actual:?}")]
    WeightShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// One of the batch, joint or spatial dimensions is zero.
    #[error("heatmaps must have non-zero batch, joint and spatial dimensions, got {shape:?}")]
    EmptyInput { shape: Vec<usize> },

    /// Hard keypoint mining was configured to keep no joints at all.
    #[error("invalid topk 0: hard keypoint mining must keep at least one joint")]
    ZeroTopK,

    /// Hard keypoint mining was asked to select more joints than exist.
    #[error("invalid topk {topk}: must satisfy 1 <= topk <= {num_joints}")]
    InvalidTopK { topk: usize, num_joints: usize },
}

/// A specialized `Result` type for joints loss operations.
pub type JointsLossResult<T> = Result<T, JointsLossError>;
