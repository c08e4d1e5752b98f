//! Weighted joints MSE loss.
//!
//! Measures how far every predicted joint heatmap is from its ground truth and
//! averages the result over joints:
//!
//! ```text
//! L = 1/K * Σ_j 0.5 * mean_{b,s}((w_bj * x_bjs - w_bj * y_bjs)^2)
//! ```
//!
//! where `K` is the number of joints, `s` runs over the flattened heatmap and
//! `w_bj` is the per-sample joint weight (taken as 1 when weighting is off).

use burn::{
    config::Config,
    module::{Content, DisplaySettings, Module, ModuleDisplay},
    tensor::{backend::Backend, Tensor},
};

use crate::{error::JointsLossResult, heatmap::half_squared_error};

/// Configuration for creating a [weighted joints MSE loss](JointsMseLoss).
#[derive(Config, Debug)]
pub struct JointsMseLossConfig {
    /// Multiply heatmaps by the per-joint target weight before comparing them.
    pub use_target_weight: bool,
}

impl JointsMseLossConfig {
    /// Initialize [weighted joints MSE loss](JointsMseLoss).
    pub fn init(&self) -> JointsMseLoss {
        tracing::debug!(
            use_target_weight = self.use_target_weight,
            "initialized joints MSE loss"
        );
        JointsMseLoss {
            use_target_weight: self.use_target_weight,
        }
    }
}

/// Weighted mean squared error over joint heatmaps.
#[derive(Module, Clone, Debug)]
#[module(custom_display)]
pub struct JointsMseLoss {
    /// Whether the per-joint target weight masks the heatmaps.
    pub use_target_weight: bool,
}

impl ModuleDisplay for JointsMseLoss {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("use_target_weight", &self.use_target_weight)
            .optional()
    }
}

impl JointsMseLoss {
    /// Create a new joints MSE loss.
    pub fn new(use_target_weight: bool) -> Self {
        JointsMseLossConfig::new(use_target_weight).init()
    }

    /// Compute the loss averaged over joints.
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
    /// Returns an error if the three inputs disagree in shape or are empty.
    pub fn forward<B: Backend>(
        &self,
        predictions: Tensor<B, 4>,
        targets: Tensor<B, 4>,
        target_weight: Tensor<B, 2>,
    ) -> JointsLossResult<Tensor<B, 1>> {
        let per_joint = self.forward_no_reduction(predictions, targets, target_weight)?;
        Ok(per_joint.mean())
    }

    /// Compute the loss of every joint without averaging over joints.
    ///
    /// Entry `j` is `0.5 * mse_j`, where `mse_j` averages the squared error of
    /// joint `j` over the batch and the flattened heatmap.
    ///
    /// # Shapes
    ///
    /// - predictions: `[batch, joints, height, width]`
    /// - targets: `[batch, joints, height, width]`
    /// - target_weight: `[batch, joints]`
    /// - output: `[joints]`
    ///
    /// # Errors
    ///
    /// Returns an error if the three inputs disagree in shape or are empty.
    pub fn forward_no_reduction<B: Backend>(
        &self,
        predictions: Tensor<B, 4>,
        targets: Tensor<B, 4>,
        target_weight: Tensor<B, 2>,
    ) -> JointsLossResult<Tensor<B, 1>> {
        let [_, joints, _, _] = predictions.dims();
        tracing::trace!(shape = ?predictions.dims(), "computing joints MSE loss");

        let error =
            half_squared_error(predictions, targets, target_weight, self.use_target_weight)?;

        // Every joint covers batch * height * width elements, so averaging the
        // spatial axis and then the batch axis is the per-joint MSE.
        Ok(error.mean_dim(2).mean_dim(0).reshape([joints]))
    }
}

#[cfg(test)]
mod tests {
    use burn::{
        backend::{ndarray::NdArray, Autodiff},
        tensor::{cast::ToElement, ops::FloatElem, Distribution, TensorData, Tolerance, Transaction},
    };

    use super::*;
    use crate::{error::JointsLossError, tests::TestBackend};

    type FT = FloatElem<TestBackend>;

    #[test]
    fn joints_mse_masks_unweighted_joint() {
        let device = Default::default();
        let loss = JointsMseLoss::new(true);

        let pred = Tensor::<TestBackend, 4>::ones([1, 2, 2, 2], &device);
        let target = Tensor::<TestBackend, 4>::zeros([1, 2, 2, 2], &device);
        let weight = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0]], &device);

        let result = loss
            .forward(pred.clone(), target.clone(), weight.clone())
            .unwrap();
        let per_joint = loss.forward_no_reduction(pred, target, weight).unwrap();

        let [result_data, per_joint_data] = Transaction::default()
            .register(result)
            .register(per_joint)
            .execute()
            .try_into()
            .expect("Correct amount of tensor data");

        // Joint 0: 0.5 * mean(1^2) = 0.5, joint 1 is masked: 0. Mean over joints = 0.25
        result_data.assert_approx_eq::<FT>(&TensorData::from([0.25]), Tolerance::default());
        per_joint_data.assert_approx_eq::<FT>(&TensorData::from([0.5, 0.0]), Tolerance::default());
    }

    #[test]
    fn joints_mse_identical_heatmaps_returns_zero() {
        let device = Default::default();
        let loss = JointsMseLoss::new(true);

        let pred = Tensor::<TestBackend, 4>::zeros([2, 3, 4, 4], &device);
        let target = Tensor::<TestBackend, 4>::zeros([2, 3, 4, 4], &device);
        let weight = Tensor::<TestBackend, 2>::ones([2, 3], &device);

        let result = loss.forward(pred, target, weight).unwrap();

        result
            .into_data()
            .assert_approx_eq::<FT>(&TensorData::from([0.0]), Tolerance::default());
    }

    #[test]
    fn joints_mse_is_symmetric_in_prediction_and_target() {
        let device = Default::default();
        let loss = JointsMseLoss::new(true);

        let pred = Tensor::<TestBackend, 4>::random(
            [2, 3, 4, 4],
            Distribution::Uniform(0.0, 1.0),
            &device,
        );
        let target = Tensor::<TestBackend, 4>::random(
            [2, 3, 4, 4],
            Distribution::Uniform(0.0, 1.0),
            &device,
        );
        let weight = Tensor::<TestBackend, 2>::random(
            [2, 3],
            Distribution::Uniform(0.0, 1.0),
            &device,
        );

        let forward = loss
            .forward(pred.clone(), target.clone(), weight.clone())
            .unwrap();
        let swapped = loss.forward(target, pred, weight).unwrap();

        let [forward_data, swapped_data] = Transaction::default()
            .register(forward)
            .register(swapped)
            .execute()
            .try_into()
            .expect("Correct amount of tensor data");

        forward_data.assert_approx_eq::<FT>(&swapped_data, Tolerance::default());
    }

    #[test]
    fn joints_mse_zero_weight_returns_zero() {
        let device = Default::default();
        let loss = JointsMseLoss::new(true);

        let pred = Tensor::<TestBackend, 4>::random(
            [2, 3, 4, 4],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let target = Tensor::<TestBackend, 4>::random(
            [2, 3, 4, 4],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let weight = Tensor::<TestBackend, 2>::zeros([2, 3], &device);

        let result = loss.forward(pred, target, weight).unwrap();

        result
            .into_data()
            .assert_approx_eq::<FT>(&TensorData::from([0.0]), Tolerance::default());
    }

    #[test]
    fn joints_mse_without_target_weight_ignores_weight_values() {
        let device = Default::default();
        let loss = JointsMseLoss::new(false);

        let pred = Tensor::<TestBackend, 4>::random(
            [2, 3, 4, 4],
            Distribution::Uniform(0.0, 1.0),
            &device,
        );
        let target = Tensor::<TestBackend, 4>::random(
            [2, 3, 4, 4],
            Distribution::Uniform(0.0, 1.0),
            &device,
        );
        let ones = Tensor::<TestBackend, 2>::ones([2, 3], &device);
        let mixed =
            Tensor::<TestBackend, 2>::from_floats([[0.0, 1.0, 0.5], [3.0, 0.0, 0.0]], &device);

        let with_ones = loss.forward(pred.clone(), target.clone(), ones).unwrap();
        let with_mixed = loss.forward(pred, target, mixed).unwrap();

        let [ones_data, mixed_data] = Transaction::default()
            .register(with_ones)
            .register(with_mixed)
            .execute()
            .try_into()
            .expect("Correct amount of tensor data");

        ones_data.assert_approx_eq::<FT>(&mixed_data, Tolerance::default());
    }

    #[test]
    fn joints_mse_single_sample_batch_averages_over_heatmap() {
        let device = Default::default();
        let loss = JointsMseLoss::new(false);

        let pred = Tensor::<TestBackend, 4>::from_floats(
            [[[[1.0, 3.0], [0.0, 0.0]], [[2.0, 2.0], [2.0, 2.0]]]],
            &device,
        );
        let target = Tensor::<TestBackend, 4>::zeros([1, 2, 2, 2], &device);
        let weight = Tensor::<TestBackend, 2>::ones([1, 2], &device);

        let per_joint = loss.forward_no_reduction(pred, target, weight).unwrap();

        // Joint 0: 0.5 * (1 + 9) / 4 = 1.25, joint 1: 0.5 * 16 / 4 = 2.0
        per_joint
            .into_data()
            .assert_approx_eq::<FT>(&TensorData::from([1.25, 2.0]), Tolerance::default());
    }

    #[test]
    fn joints_mse_matches_per_joint_average_over_batch() {
        let device = Default::default();
        let loss = JointsMseLoss::new(true);

        // Two samples, one joint, 1x2 heatmaps
        let pred = Tensor::<TestBackend, 4>::from_floats([[[[1.0, 1.0]]], [[[2.0, 0.0]]]], &device);
        let target = Tensor::<TestBackend, 4>::zeros([2, 1, 1, 2], &device);
        let weight = Tensor::<TestBackend, 2>::from_floats([[1.0], [0.5]], &device);

        let result = loss.forward(pred, target, weight).unwrap();

        // Weighted squares: [1, 1] and [1, 0]; mean = 0.75; times 0.5 = 0.375
        result
            .into_data()
            .assert_approx_eq::<FT>(&TensorData::from([0.375]), Tolerance::default());
    }

    #[test]
    fn joints_mse_gradient_flows_to_predictions_only() {
        type AutodiffBackend = Autodiff<NdArray<f32>>;
        let device = Default::default();
        let loss = JointsMseLoss::new(true);

        let pred = Tensor::<AutodiffBackend, 4>::ones([1, 2, 2, 2], &device).require_grad();
        let target = Tensor::<AutodiffBackend, 4>::zeros([1, 2, 2, 2], &device).require_grad();
        let weight = Tensor::<AutodiffBackend, 2>::from_floats([[1.0, 0.0]], &device);

        let result = loss.forward(pred.clone(), target.clone(), weight).unwrap();
        let grads = result.backward();

        // dL/dx = w^2 * (x - y) / (joints * batch * height * width) = 1 / 8 on joint 0
        let pred_grad = pred.grad(&grads).expect("prediction gradient");
        pred_grad.into_data().assert_approx_eq::<FT>(
            &TensorData::from([[[[0.125, 0.125], [0.125, 0.125]], [[0.0, 0.0], [0.0, 0.0]]]]),
            Tolerance::default(),
        );
        assert!(target.grad(&grads).is_none());
    }

    #[test]
    fn joints_mse_mismatched_shapes_returns_error() {
        let device = Default::default();
        let loss = JointsMseLoss::new(true);

        let pred = Tensor::<TestBackend, 4>::zeros([2, 3, 4, 4], &device);
        let target = Tensor::<TestBackend, 4>::zeros([2, 4, 4, 4], &device);
        let weight = Tensor::<TestBackend, 2>::ones([2, 3], &device);

        let result = loss.forward(pred, target, weight);

        assert!(matches!(
            result,
            Err(JointsLossError::IncompatibleShapes { .. })
        ));
    }

    #[test]
    fn joints_mse_output_is_finite_for_random_heatmaps() {
        let device = Default::default();
        let loss = JointsMseLossConfig::new(true).init();

        let pred = Tensor::<TestBackend, 4>::random(
            [4, 17, 16, 12],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let target = Tensor::<TestBackend, 4>::random(
            [4, 17, 16, 12],
            Distribution::Uniform(0.0, 1.0),
            &device,
        );
        let weight = Tensor::<TestBackend, 2>::ones([4, 17], &device);

        let result = loss.forward(pred, target, weight).unwrap();

        assert!(result.into_scalar().to_f64().is_finite());
    }

    #[test]
    fn joints_mse_display_shows_target_weight_flag() {
        let loss = JointsMseLoss::new(true);

        assert_eq!(format!("{loss}"), "JointsMseLoss {use_target_weight: true}");
    }
}
