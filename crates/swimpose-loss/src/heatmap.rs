//! Heatmap flattening and weighting shared by the joint losses.
//!
//! Both losses look at each joint's heatmap as a flat vector of `height * width`
//! values and compare prediction against ground truth elementwise. The only thing
//! that differs between them is which axes the squared error is averaged over.

use burn::tensor::{backend::Backend, Tensor};

use crate::error::{JointsLossError, JointsLossResult};

/// Checks that prediction, target and weight agree and returns the flattened
/// heatmap shape `[batch, joints, height * width]`.
pub(crate) fn flattened_shape<B: Backend>(
    predictions: &Tensor<B, 4>,
    targets: &Tensor<B, 4>,
    target_weight: &Tensor<B, 2>,
) -> JointsLossResult<[usize; 3]> {
    let pred_dims = predictions.dims();
    let target_dims = targets.dims();
    if pred_dims != target_dims {
        return Err(JointsLossError::IncompatibleShapes {
            pred_shape: pred_dims.to_vec(),
            target_shape: target_dims.to_vec(),
        });
    }

    if pred_dims.contains(&0) {
        return Err(JointsLossError::EmptyInput {
            shape: pred_dims.to_vec(),
        });
    }

    let [batch, joints, height, width] = pred_dims;
    let weight_dims = target_weight.dims();
    if weight_dims != [batch, joints] {
        return Err(JointsLossError::WeightShapeMismatch {
            expected: vec![batch, joints],
            actual: weight_dims.to_vec(),
        });
    }

    Ok([batch, joints, height * width])
}

/// Half squared error of every heatmap element.
///
/// # Shapes
///
/// - predictions: `[batch, joints, height, width]`
/// - targets: `[batch, joints, height, width]`
/// - target_weight: `[batch, joints]`
/// - output: `[batch, joints, height * width]`
///
/// With `use_target_weight` the weight of each joint is expanded over its whole
/// flattened heatmap and multiplied into both prediction and target before the
/// difference is taken. Targets and weights are detached from the graph.
pub(crate) fn half_squared_error<B: Backend>(
    predictions: Tensor<B, 4>,
    targets: Tensor<B, 4>,
    target_weight: Tensor<B, 2>,
    use_target_weight: bool,
) -> JointsLossResult<Tensor<B, 3>> {
    let shape = flattened_shape(&predictions, &targets, &target_weight)?;
    let [batch, joints, _] = shape;

    // Reshape rather than squeeze so a batch of one keeps its batch axis.
    let heatmaps_pred = predictions.reshape(shape);
    let heatmaps_gt = targets.detach().reshape(shape);

    let (heatmaps_pred, heatmaps_gt) = if use_target_weight {
        let weight = target_weight
            .detach()
            .reshape([batch, joints, 1])
            .expand(shape);
        (heatmaps_pred * weight.clone(), heatmaps_gt * weight)
    } else {
        (heatmaps_pred, heatmaps_gt)
    };

    Ok((heatmaps_pred - heatmaps_gt).powi_scalar(2).mul_scalar(0.5))
}
