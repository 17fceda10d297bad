#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Error types for the calibration module.
pub mod error;

/// planar homography estimation.
pub mod homography;

/// single camera calibration.
pub mod intrinsic;

/// small fixed-size linear algebra helpers.
pub mod linalg;

/// non-linear least squares solver.
pub mod optim;

/// stereo rectification.
pub mod rectify;

/// stereo extrinsic calibration.
pub mod stereo;

pub use crate::error::CalibError;
pub use crate::intrinsic::{calibrate_camera, IntrinsicCalibration, IntrinsicFlags, IntrinsicModel};
pub use crate::optim::LevenbergMarquardt;
pub use crate::rectify::{stereo_rectify, RectificationModel, RectifyFlags};
pub use crate::stereo::{stereo_calibrate, ExtrinsicModel, StereoCalibration, StereoFlags};
