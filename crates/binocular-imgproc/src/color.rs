use crate::parallel;
use binocular_image::{Image, ImageError};

/// Convert an RGB8 image to grayscale with 14-bit fixed point weights.
///
/// Y = (4899 * R + 9617 * G + 1868 * B + 2^13) >> 14
///
/// Precondition: the input and output images must have the same size.
pub fn gray_from_rgb_u8(src: &Image<u8, 3>, dst: &mut Image<u8, 1>) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    parallel::par_iter_rows(src, dst, |src_pixel, dst_pixel| {
        let r = src_pixel[0] as u32;
        let g = src_pixel[1] as u32;
        let b = src_pixel[2] as u32;
        dst_pixel[0] = ((r * 4899 + g * 9617 + b * 1868 + (1 << 13)) >> 14) as u8;
    });

    Ok(())
}
