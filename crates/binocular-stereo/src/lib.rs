#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// fixed-point disparity maps.
pub mod disparity;

/// Error types for the stereo module.
pub mod error;

/// point clouds and their text export.
pub mod pointcloud;

/// undistort and rectify maps of a calibrated pair.
pub mod rectifier;

/// disparity to 3d reprojection.
pub mod reproject;

/// semi-global block matching.
pub mod sgbm;

/// removal of small disparity blobs.
pub mod speckle;

pub use crate::disparity::DisparityMap;
pub use crate::error::StereoError;
pub use crate::pointcloud::PointCloud;
pub use crate::rectifier::Rectifier;
pub use crate::reproject::{point_cloud_from_disparity, reproject_image_to_3d, MAX_Z};
pub use crate::sgbm::{compute_disparity, SgbmMode, SgbmParams};
pub use crate::speckle::filter_speckles;
