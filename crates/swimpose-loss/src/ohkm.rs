//! Joints MSE loss with online hard keypoint mining (OHKM).
//!
//! Instead of averaging every joint, each sample contributes only the mean of its
//! `topk` worst joints:
//!
//! ```text
//! l_bj = 0.5 * mean_s((w_bj * x_bjs - w_bj * y_bjs)^2)
//! L    = 1/B * Σ_b (1/topk * Σ_{j ∈ topk(l_b)} l_bj)
//! ```
//!
//! Joints that are already predicted well stop diluting the gradient, so training
//! concentrates on occluded or ambiguous keypoints.

use burn::{
    config::Config,
    module::{Content, DisplaySettings, Module, ModuleDisplay},
    tensor::{backend::Backend, Tensor},
};

use crate::{
    error::{JointsLossError, JointsLossResult},
    heatmap::half_squared_error,
};

/// Configuration for creating a [hard keypoint mining loss](JointsOhkmMseLoss).
#[derive(Config, Debug)]
pub struct JointsOhkmMseLossConfig {
    /// Multiply heatmaps by the per-joint target weight before comparing them.
    pub use_target_weight: bool,
    /// Number of hardest joints kept per sample.
    #[config(default = 8)]
    pub topk: usize,
    /// Number of joints the model predicts, when known up front.
    ///
    /// Lets [`init`](Self::init) reject a `topk` that can never be satisfied.
    pub num_joints: Option<usize>,
}

impl JointsOhkmMseLossConfig {
    /// Initialize [hard keypoint mining loss](JointsOhkmMseLoss).
    ///
    /// # Errors
    ///
    /// Returns [`JointsLossError::ZeroTopK`] if `topk` is zero and
    /// [`JointsLossError::InvalidTopK`] if it is larger than `num_joints`.
    pub fn init(&self) -> JointsLossResult<JointsOhkmMseLoss> {
        self.validate()?;

        if self.num_joints == Some(self.topk) {
            tracing::warn!(
                topk = self.topk,
                "topk equals the joint count, hard keypoint mining keeps every joint"
            );
        }
        tracing::debug!(
            use_target_weight = self.use_target_weight,
            topk = self.topk,
            num_joints = ?self.num_joints,
            "initialized joints OHKM MSE loss"
        );

        Ok(JointsOhkmMseLoss {
            use_target_weight: self.use_target_weight,
            topk: self.topk,
        })
    }

    fn validate(&self) -> JointsLossResult<()> {
        if self.topk == 0 {
            return Err(JointsLossError::ZeroTopK);
        }
        match self.num_joints {
            Some(num_joints) if self.topk > num_joints => Err(JointsLossError::InvalidTopK {
                topk: self.topk,
                num_joints,
            }),
            _ => Ok(()),
        }
    }
}

/// Joints MSE loss averaged over the `topk` hardest joints of every sample.
#[derive(Module, Clone, Debug)]
#[module(custom_display)]
pub struct JointsOhkmMseLoss {
    /// Whether the per-joint target weight masks the heatmaps.
    pub use_target_weight: bool,
    /// Number of hardest joints kept per sample.
    pub topk: usize,
}

impl ModuleDisplay for JointsOhkmMseLoss {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("use_target_weight", &self.use_target_weight)
            .add("topk", &self.topk)
            .optional()
    }
}

impl JointsOhkmMseLoss {
    /// Compute the hard-mined loss.
    ///
    /// # Shapes
    ///
    /// - predictions: `[batch, joints, height, width]`
    /// - targets: `[batch, joints, height, width]`
    /// - target_weight: `[batch, joints]`
    /// - output: `[1]`
    ///
    /// # Errors
    ///
    /// Returns an error if the inputs disagree in shape, are empty, or have
    /// fewer joints than `topk`.
    pub fn forward<B: Backend>(
        &self,
        predictions: Tensor<B, 4>,
        targets: Tensor<B, 4>,
        target_weight: Tensor<B, 2>,
    ) -> JointsLossResult<Tensor<B, 1>> {
        let loss = self.forward_no_reduction(predictions, targets, target_weight)?;
        self.ohkm(loss)
    }

    /// Compute the per-sample, per-joint loss matrix without mining.
    ///
    /// Entry `(b, j)` is half the squared error of joint `j` in sample `b`,
    /// averaged over the flattened heatmap only.
    ///
    /// # Shapes
    ///
    /// - predictions: `[batch, joints, height, width]`
    /// - targets: `[batch, joints, height, width]`
    /// - target_weight: `[batch, joints]`
    /// - output: `[batch, joints]`
    ///
    /// # Errors
    ///
    /// Returns an error if the three inputs disagree in shape or are empty.
    pub fn forward_no_reduction<B: Backend>(
        &self,
        predictions: Tensor<B, 4>,
        targets: Tensor<B, 4>,
        target_weight: Tensor<B, 2>,
    ) -> JointsLossResult<Tensor<B, 2>> {
        let [batch, joints, _, _] = predictions.dims();
        tracing::trace!(
            shape = ?predictions.dims(),
            topk = self.topk,
            "computing joints OHKM MSE loss"
        );

        let error =
            half_squared_error(predictions, targets, target_weight, self.use_target_weight)?;
        Ok(error.mean_dim(2).reshape([batch, joints]))
    }

    /// Reduce a `[batch, joints]` loss matrix by online hard keypoint mining.
    ///
    /// For every row the `topk` largest losses are averaged, then the rows are
    /// averaged over the batch. Ties between equal losses may be broken either
    /// way; only the selected values matter. The values are gathered back from the
    /// matrix by index, so gradients reach the selected joints only.
    ///
    /// # Errors
    ///
    /// Returns [`JointsLossError::InvalidTopK`] if the matrix has fewer than
    /// `topk` columns, and [`JointsLossError::EmptyInput`] if it has no rows.
    pub fn ohkm<B: Backend>(&self, loss: Tensor<B, 2>) -> JointsLossResult<Tensor<B, 1>> {
        let [batch, joints] = loss.dims();
        if self.topk == 0 {
            return Err(JointsLossError::ZeroTopK);
        }
        if self.topk > joints {
            return Err(JointsLossError::InvalidTopK {
                topk: self.topk,
                num_joints: joints,
            });
        }
        if batch == 0 {
            return Err(JointsLossError::EmptyInput {
                shape: vec![batch, joints],
            });
        }

        let (_, topk_idx) = loss.clone().topk_with_indices(self.topk, 1);
        let hard_loss = loss.gather(1, topk_idx);

        Ok(hard_loss
            .sum_dim(1)
            .div_scalar(self.topk as f64)
            .mean())
    }
}
