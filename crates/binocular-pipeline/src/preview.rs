use binocular_image::Image;

use crate::observation::Camera;

/// What the run does after a preview callback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PreviewControl {
    /// Keep processing frames.
    #[default]
    Continue,
    /// Stop the whole run after the current frame.
    Abort,
}

/// Receives intermediate results for display.
///
/// Every method defaults to doing nothing. Returning [`PreviewControl::Abort`] ends
/// the scan or the video run early; a calibration solve in flight is never interrupted.
pub trait PreviewSink {
    /// Corners detected by one camera in a frame.
    fn corners(
        &mut self,
        _frame_index: usize,
        _camera: Camera,
        _image: &Image<u8, 3>,
        _corners: &[[f64; 2]],
    ) -> PreviewControl {
        PreviewControl::Continue
    }

    /// A rectified pair.
    fn rectified(
        &mut self,
        _frame_index: usize,
        _left: &Image<u8, 3>,
        _right: &Image<u8, 3>,
    ) -> PreviewControl {
        PreviewControl::Continue
    }

    /// A disparity map scaled to `u8` for display.
    fn disparity(&mut self, _frame_index: usize, _disparity: &Image<u8, 1>) -> PreviewControl {
        PreviewControl::Continue
    }
}

/// The sink that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPreview;

impl PreviewSink for NoPreview {}

impl<S: PreviewSink + ?Sized> PreviewSink for &mut S {
    fn corners(
        &mut self,
        frame_index: usize,
        camera: Camera,
        image: &Image<u8, 3>,
        corners: &[[f64; 2]],
    ) -> PreviewControl {
        (**self).corners(frame_index, camera, image, corners)
    }

    fn rectified(
        &mut self,
        frame_index: usize,
        left: &Image<u8, 3>,
        right: &Image<u8, 3>,
    ) -> PreviewControl {
        (**self).rectified(frame_index, left, right)
    }

    fn disparity(&mut self, frame_index: usize, disparity: &Image<u8, 1>) -> PreviewControl {
        (**self).disparity(frame_index, disparity)
    }
}
