use super::bilinear::bilinear_interpolation;
use super::nearest::nearest_neighbor_interpolation;
use binocular_image::{Image, ImageDtype};

/// Interpolation mode for resampling operations
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InterpolationMode {
    /// Bilinear interpolation
    Bilinear,
    /// Nearest neighbor interpolation
    Nearest,
}

/// How pixels outside the source image are filled
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BorderMode {
    /// Every out-of-bounds neighbour reads this value.
    Constant(f32),
    /// Out-of-bounds neighbours read the closest edge pixel.
    Replicate,
}

impl Default for BorderMode {
    fn default() -> Self {
        BorderMode::Constant(0.0)
    }
}

/// Kernel for interpolating a pixel value
///
/// # Arguments
///
/// * `image` - The input image container with shape (height, width, C).
/// * `u` - The x coordinate of the pixel to interpolate.
/// * `v` - The y coordinate of the pixel to interpolate.
/// * `c` - The channel of the pixel to interpolate.
/// * `interpolation` - The interpolation mode to use.
/// * `border` - The border policy for out-of-bounds neighbours.
///
/// # Returns
///
/// The interpolated pixel value.
pub fn interpolate_pixel<T: ImageDtype, const C: usize>(
    image: &Image<T, C>,
    u: f32,
    v: f32,
    c: usize,
    interpolation: InterpolationMode,
    border: BorderMode,
) -> f32 {
    match interpolation {
        InterpolationMode::Bilinear => bilinear_interpolation(image, u, v, c, border),
        InterpolationMode::Nearest => nearest_neighbor_interpolation(image, u, v, c, border),
    }
}

/// Read a pixel applying the border policy for out-of-bounds coordinates.
#[inline]
pub(crate) fn fetch<T: ImageDtype, const C: usize>(
    image: &Image<T, C>,
    x: i64,
    y: i64,
    c: usize,
    border: BorderMode,
) -> f32 {
    let (cols, rows) = (image.cols() as i64, image.rows() as i64);
    let (x, y) = if x >= 0 && x < cols && y >= 0 && y < rows {
        (x, y)
    } else {
        match border {
            BorderMode::Constant(val) => return val,
            BorderMode::Replicate => (x.clamp(0, cols - 1), y.clamp(0, rows - 1)),
        }
    };
    image.as_slice()[(y as usize * image.cols() + x as usize) * C + c].into()
}
