#![doc = env!("CARGO_PKG_DESCRIPTION")]

#[doc(inline)]
pub use binocular_image as image;

#[doc(inline)]
pub use binocular_imgproc as imgproc;

#[doc(inline)]
pub use binocular_calib as calib;

#[doc(inline)]
pub use binocular_stereo as stereo;

#[doc(inline)]
pub use binocular_pipeline as pipeline;
