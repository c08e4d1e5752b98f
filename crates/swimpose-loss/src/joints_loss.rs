//! Training objective selection between the plain and hard-mined joints losses.
//!
//! A trainer usually reads its loss settings from a configuration file and should
//! not care which concrete loss it ends up with. [`JointsLossConfig`] carries the
//! same three switches as a pose training configuration (`use_target_weight`,
//! `use_ohkm`, `topk`) and [`JointsLoss`] dispatches to the chosen loss.

use std::collections::HashMap;

use burn::{
    config::Config,
    tensor::{backend::Backend, cast::ToElement, Tensor},
};

use crate::{
    error::JointsLossResult,
    heatmap::half_squared_error,
    mse::{JointsMseLoss, JointsMseLossConfig},
    ohkm::{JointsOhkmMseLoss, JointsOhkmMseLossConfig},
};

/// Configuration of the joints training objective.
#[derive(Config, Debug)]
pub struct JointsLossConfig {
    /// Multiply heatmaps by the per-joint target weight before comparing them.
    #[config(default = true)]
    pub use_target_weight: bool,
    /// Use online hard keypoint mining instead of the plain joints MSE.
    #[config(default = false)]
    pub use_ohkm: bool,
    /// Number of hardest joints kept per sample when `use_ohkm` is set.
    #[config(default = 8)]
    pub topk: usize,
    /// Number of joints the model predicts, used to validate `topk` eagerly.
    pub num_joints: Option<usize>,
}

impl JointsLossConfig {
    /// Initialize the configured [joints loss](JointsLoss).
    ///
    /// # Errors
    ///
    /// Returns an error if hard keypoint mining is enabled with an invalid `topk`.
    pub fn init(&self) -> JointsLossResult<JointsLoss> {
        let loss = if self.use_ohkm {
            JointsLoss::Ohkm(
                JointsOhkmMseLossConfig::new(self.use_target_weight)
                    .with_topk(self.topk)
                    .with_num_joints(self.num_joints)
                    .init()?,
            )
        } else {
            JointsLoss::Mse(JointsMseLossConfig::new(self.use_target_weight).init())
        };

        tracing::info!(loss = loss.name(), "joints loss selected");
        Ok(loss)
    }
}

/// The joints training objective chosen by a [`JointsLossConfig`].
#[derive(Clone, Debug)]
pub enum JointsLoss {
    /// Weighted joints MSE averaged over every joint.
    Mse(JointsMseLoss),
    /// Weighted joints MSE averaged over the hardest joints of each sample.
    Ohkm(JointsOhkmMseLoss),
}

impl From<JointsMseLoss> for JointsLoss {
    fn from(loss: JointsMseLoss) -> Self {
        Self::Mse(loss)
    }
}

impl From<JointsOhkmMseLoss> for JointsLoss {
    fn from(loss: JointsOhkmMseLoss) -> Self {
        Self::Ohkm(loss)
    }
}

impl JointsLoss {
    /// Short identifier of the selected loss, suitable for log fields and metric names.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Mse(_) => "joints_mse",
            Self::Ohkm(_) => "joints_ohkm_mse",
        }
    }

    /// Whether the selected loss masks heatmaps with the target weight.
    pub const fn use_target_weight(&self) -> bool {
        match self {
            Self::Mse(loss) => loss.use_target_weight,
            Self::Ohkm(loss) => loss.use_target_weight,
        }
    }

    /// Compute the selected loss.
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
    /// Propagates shape and `topk` errors from the selected loss.
    pub fn forward<B: Backend>(
        &self,
        predictions: Tensor<B, 4>,
        targets: Tensor<B, 4>,
        target_weight: Tensor<B, 2>,
    ) -> JointsLossResult<Tensor<B, 1>> {
        match self {
            Self::Mse(loss) => loss.forward(predictions, targets, target_weight),
            Self::Ohkm(loss) => loss.forward(predictions, targets, target_weight),
        }
    }

    /// Compute the selected loss together with a per-joint breakdown.
    ///
    /// The dictionary holds `"total"` and one `"joint_{j}"` entry per joint with
    /// that joint's loss averaged over the batch. For hard keypoint mining these are
    /// the losses mining chooses from, before any joint is discarded.
    ///
    /// # Errors
    ///
    /// Propagates shape and `topk` errors from the selected loss.
    pub fn forward_detailed<B: Backend>(
        &self,
        predictions: Tensor<B, 4>,
        targets: Tensor<B, 4>,
        target_weight: Tensor<B, 2>,
    ) -> JointsLossResult<(Tensor<B, 1>, HashMap<String, f64>)> {
        let [_, joints, _, _] = predictions.dims();
        let breakdown = half_squared_error(
            predictions.clone().detach(),
            targets.clone(),
            target_weight.clone(),
            self.use_target_weight(),
        )?
        .mean_dim(2)
        .mean_dim(0)
        .reshape([joints]);

        let total_loss = self.forward(predictions, targets, target_weight)?;

        let mut loss_dict: HashMap<String, f64> = breakdown
            .into_data()
            .iter::<f64>()
            .enumerate()
            .map(|(joint, value)| (format!("joint_{joint}"), value))
            .collect();
        loss_dict.insert(
            "total".to_owned(),
            total_loss.clone().into_scalar().to_f64(),
        );

        Ok((total_loss, loss_dict))
    }
}
