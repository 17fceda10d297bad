//! Pixel interpolation methods for image resampling.
//!
//! - **Nearest**: uses the nearest pixel value
//! - **Bilinear**: linear interpolation between the four surrounding pixels
//!
//! Samples that fall outside the source image take their value from the [`BorderMode`].

mod bilinear;
mod interpolate;
mod nearest;
mod remap;

pub use interpolate::{interpolate_pixel, BorderMode, InterpolationMode};
pub use remap::remap;
