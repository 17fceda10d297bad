use crate::parallel;

use super::interpolate::{interpolate_pixel, BorderMode, InterpolationMode};
use binocular_image::{Image, ImageDtype, ImageError};

/// Apply generic geometric transformation to an image.
///
/// # Arguments
///
/// * `src` - The input image container with shape (height, width, C).
/// * `dst` - The output image container with shape (height, width, C).
/// * `map_x` - The x coordinates of the pixels to interpolate.
/// * `map_y` - The y coordinates of the pixels to interpolate.
/// * `interpolation` - The interpolation mode to use.
/// * `border` - The value policy for samples outside `src`.
///
/// # Errors
///
/// * The mapx and mapy must have the same size.
/// * The output image must have the same size as the mapx and mapy.
pub fn remap<T: ImageDtype, const C: usize>(
    src: &Image<T, C>,
    dst: &mut Image<T, C>,
    map_x: &Image<f32, 1>,
    map_y: &Image<f32, 1>,
    interpolation: InterpolationMode,
    border: BorderMode,
) -> Result<(), ImageError> {
    if map_x.size() != map_y.size() {
        return Err(ImageError::InvalidImageSize(
            map_x.cols(),
            map_x.rows(),
            map_y.cols(),
            map_y.rows(),
        ));
    }

    if dst.size() != map_x.size() {
        return Err(ImageError::InvalidImageSize(
            map_x.cols(),
            map_x.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    // parallelize the remap operation by rows
    parallel::par_iter_rows_resample(dst, map_x, map_y, |&x, &y, dst_pixel| {
        dst_pixel.iter_mut().enumerate().for_each(|(c, pixel)| {
            *pixel = T::from_f32(interpolate_pixel(src, x, y, c, interpolation, border));
        });
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use binocular_image::ImageSize;

    #[test]
    fn remap_smoke() -> Result<(), ImageError> {
        let image = Image::<_, 1>::new(
            ImageSize {
                width: 3,
                height: 3,
            },
            vec![0f32, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0],
        )?;

        let new_size: ImageSize = [2, 2].into();
        let map_x = Image::new(new_size, vec![0.0, 2.0, 0.0, 2.0])?;
        let map_y = Image::new(new_size, vec![0.0, 0.0, 2.0, 2.0])?;

        let mut image_transformed = Image::<_, 1>::from_size_val(new_size, 0.0)?;

        remap(
            &image,
            &mut image_transformed,
            &map_x,
            &map_y,
            InterpolationMode::Bilinear,
            BorderMode::default(),
        )?;

        for (a, b) in image_transformed.as_slice().iter().zip([0.0, 2.0, 6.0, 8.0]) {
            approx::assert_relative_eq!(*a, b, epsilon = 1e-6);
        }

        Ok(())
    }

    #[test]
    fn remap_mask_constant_border() -> Result<(), ImageError> {
        let mask = Image::<u8, 1>::from_size_val([4, 4].into(), 255)?;
        let size: ImageSize = [3, 1].into();
        let map_x = Image::new(size, vec![1.0, -3.0, 3.5])?;
        let map_y = Image::new(size, vec![1.0, 1.0, 1.0])?;
        let mut out = Image::<u8, 1>::from_size_val(size, 9)?;

        remap(
            &mask,
            &mut out,
            &map_x,
            &map_y,
            InterpolationMode::Bilinear,
            BorderMode::Constant(0.0),
        )?;

        assert_eq!(out.as_slice(), &[255, 0, 128]);
        Ok(())
    }

    #[test]
    fn remap_size_mismatch() -> Result<(), ImageError> {
        let image = Image::<u8, 1>::from_size_val([4, 4].into(), 0)?;
        let map_x = Image::<f32, 1>::from_size_val([2, 2].into(), 0.0)?;
        let map_y = Image::<f32, 1>::from_size_val([2, 3].into(), 0.0)?;
        let mut out = Image::<u8, 1>::from_size_val([2, 2].into(), 0)?;
        let res = remap(
            &image,
            &mut out,
            &map_x,
            &map_y,
            InterpolationMode::Nearest,
            BorderMode::default(),
        );
        assert!(res.is_err());
        Ok(())
    }
}
