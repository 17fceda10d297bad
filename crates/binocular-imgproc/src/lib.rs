#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// camera models, lens distortion and calibration pattern detection.
pub mod calibration;

/// color transformations module.
pub mod color;

/// image cropping module.
pub mod crop;

/// utilities for interpolation.
pub mod interpolation;

/// module containing parallization utilities.
pub mod parallel;
