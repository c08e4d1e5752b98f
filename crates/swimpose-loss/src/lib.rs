//! Joint heatmap losses for keypoint and pose estimation training.
//!
//! Pose models in the heatmap family predict one 2-D confidence map per joint.
//! This crate provides the training objectives that compare those maps with
//! ground-truth heatmaps, built on the Burn deep learning framework and generic
//! over any Burn backend.
//!
//! ## Loss Functions
//!
//! - **[`JointsMseLoss`]**: mean squared error per joint, optionally masked by a
//!   per-joint target weight, averaged over all joints
//! - **[`JointsOhkmMseLoss`]**: the same per-joint error, but each sample only
//!   contributes its `topk` hardest joints (online hard keypoint mining)
//! - **[`JointsLoss`]**: selects one of the two from a [`JointsLossConfig`]
//!
//! All losses take the same three tensors:
//!
//! | input | shape |
//! |---|---|
//! | predictions | `[batch, joints, height, width]` |
//! | targets | `[batch, joints, height, width]` |
//! | target weight | `[batch, joints]` |
//!
//! and return a single-element `Tensor<B, 1>`. Gradients flow into the
//! predictions only; targets and weights are treated as constants.
//!
//! ## Usage Example
//!
//! ```rust
//! use burn::prelude::*;
//! use swimpose_loss::{JointsLossConfig, JointsLossResult};
//!
//! fn training_loss<B: Backend>(
//!     heatmaps: Tensor<B, 4>,
//!     targets: Tensor<B, 4>,
//!     target_weight: Tensor<B, 2>,
//! ) -> JointsLossResult<Tensor<B, 1>> {
//!     let loss = JointsLossConfig::new()
//!         .with_use_ohkm(true)
//!         .with_topk(8)
//!         .with_num_joints(Some(17))
//!         .init()?;
//!
//!     loss.forward(heatmaps, targets, target_weight)
//! }
//! ```
//!
//! Shape disagreements and impossible `topk` values are reported as
//! [`JointsLossError`]s; they indicate a configuration bug and are never
//! recovered from inside the crate.

mod error;
mod heatmap;
mod joints_loss;
mod mse;
mod ohkm;

pub use error::{JointsLossError, JointsLossResult};
pub use joints_loss::{JointsLoss, JointsLossConfig};
pub use mse::{JointsMseLoss, JointsMseLossConfig};
pub use ohkm::{JointsOhkmMseLoss, JointsOhkmMseLossConfig};
