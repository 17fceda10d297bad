use binocular_calib::{IntrinsicModel, RectificationModel};
use binocular_image::{Image, ImageSize};
use binocular_imgproc::{
    calibration::{distortion::generate_correction_map_polynomial, CameraExtrinsic},
    interpolation::{remap, BorderMode, InterpolationMode},
};

use crate::error::StereoError;

/// Remap tables of one camera, from rectified pixels to source pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct RemapTable {
    /// Source column of every rectified pixel.
    pub map_x: Image<f32, 1>,
    /// Source row of every rectified pixel.
    pub map_y: Image<f32, 1>,
}

impl RemapTable {
    /// Undistort-rectify table of a camera.
    ///
    /// # Arguments
    ///
    /// * `model` - The camera that took the source images.
    /// * `rotation` - The rectifying rotation of the camera.
    /// * `projection` - Projection matrix of the rectified camera.
    /// * `size` - Size of the rectified image.
    pub fn new(
        model: &IntrinsicModel,
        rotation: &[[f64; 3]; 3],
        projection: &[[f64; 4]; 3],
        size: ImageSize,
    ) -> Result<Self, StereoError> {
        let new_camera = binocular_imgproc::calibration::CameraIntrinsic {
            fx: projection[0][0],
            fy: projection[1][1],
            cx: projection[0][2],
            cy: projection[1][2],
        };
        let extrinsic = CameraExtrinsic {
            rotation: *rotation,
            translation: [0.0; 3],
        };
        let (map_x, map_y) = generate_correction_map_polynomial(
            &model.camera,
            &extrinsic,
            &new_camera,
            &model.distortion,
            &size,
        )?;
        Ok(Self { map_x, map_y })
    }

    /// Resample `src` through the table with bilinear interpolation and a zero border.
    pub fn apply<const C: usize>(&self, src: &Image<u8, C>) -> Result<Image<u8, C>, StereoError> {
        let mut dst = Image::from_size_val(self.map_x.size(), 0u8)?;
        remap(
            src,
            &mut dst,
            &self.map_x,
            &self.map_y,
            InterpolationMode::Bilinear,
            BorderMode::Constant(0.0),
        )?;
        Ok(dst)
    }
}

/// Rectifies the frames of a calibrated stereo pair.
///
/// The tables are built once and only read afterwards, so one rectifier can serve any
/// number of frames, from several threads.
#[derive(Clone, Debug, PartialEq)]
pub struct Rectifier {
    left: RemapTable,
    right: RemapTable,
    mask: Image<u8, 1>,
    size: ImageSize,
}

impl Rectifier {
    /// Build the tables of both cameras and the validity mask.
    ///
    /// The mask is a 255-filled image warped with the left table: pixels that sample
    /// outside the left source image are 0.
    pub fn new(
        left: &IntrinsicModel,
        right: &IntrinsicModel,
        rectification: &RectificationModel,
        size: ImageSize,
    ) -> Result<Self, StereoError> {
        let left_table = RemapTable::new(left, &rectification.r1, &rectification.p1, size)?;
        let right_table = RemapTable::new(right, &rectification.r2, &rectification.p2, size)?;
        let full = Image::<u8, 1>::from_size_val(size, 255)?;
        let mask = left_table.apply(&full)?;

        log::debug!(
            "rectify tables {}x{}: {} of {} pixels inside the left image",
            size.width,
            size.height,
            mask.as_slice().iter().filter(|&&m| m != 0).count(),
            size.area()
        );

        Ok(Self {
            left: left_table,
            right: right_table,
            mask,
            size,
        })
    }

    /// Size of the rectified images.
    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// The left camera table.
    pub fn left_table(&self) -> &RemapTable {
        &self.left
    }

    /// The right camera table.
    pub fn right_table(&self) -> &RemapTable {
        &self.right
    }

    /// Validity mask of the rectified left image.
    pub fn mask(&self) -> &Image<u8, 1> {
        &self.mask
    }

    /// Rectify a left frame.
    pub fn rectify_left<const C: usize>(&self, src: &Image<u8, C>) -> Result<Image<u8, C>, StereoError> {
        self.check_size(src.size())?;
        self.left.apply(src)
    }

    /// Rectify a right frame.
    pub fn rectify_right<const C: usize>(&self, src: &Image<u8, C>) -> Result<Image<u8, C>, StereoError> {
        self.check_size(src.size())?;
        self.right.apply(src)
    }

    /// Rectify both frames of a pair.
    pub fn rectify_pair<const C: usize>(
        &self,
        left: &Image<u8, C>,
        right: &Image<u8, C>,
    ) -> Result<(Image<u8, C>, Image<u8, C>), StereoError> {
        Ok((self.rectify_left(left)?, self.rectify_right(right)?))
    }

    fn check_size(&self, size: ImageSize) -> Result<(), StereoError> {
        if size != self.size {
            return Err(StereoError::SizeMismatch(
                size.width,
                size.height,
                self.size.width,
                self.size.height,
            ));
        }
        Ok(())
    }
}
