use binocular_image::{Image, ImageError, ImageSize};
use rayon::{
    iter::{IndexedParallelIterator, ParallelIterator},
    slice::ParallelSliceMut,
};

/// Crop an image to a specified region.
///
/// # Arguments
///
/// * `src` - The source image to crop.
/// * `dst` - The destination image to store the cropped image.
/// * `x` - The x-coordinate of the top-left corner of the region to crop.
/// * `y` - The y-coordinate of the top-left corner of the region to crop.
///
/// # Examples
///
/// ```rust
/// use binocular_image::{Image, ImageSize};
/// use binocular_imgproc::crop::crop_image;
///
/// let image = Image::<_, 1>::new(ImageSize { width: 4, height: 4 }, vec![
///     0u8, 1, 2, 3,
///     4u8, 5, 6, 7,
///     8u8, 9, 10, 11,
///     12u8, 13, 14, 15
/// ]).unwrap();
///
/// let mut cropped = Image::<_, 1>::from_size_val(ImageSize { width: 2, height: 2 }, 0u8).unwrap();
///
/// crop_image(&image, &mut cropped, 1, 1).unwrap();
///
/// assert_eq!(cropped.as_slice(), &[5u8, 6, 9, 10]);
/// ```
pub fn crop_image<T, const C: usize>(
    src: &Image<T, C>,
    dst: &mut Image<T, C>,
    x: usize,
    y: usize,
) -> Result<(), ImageError>
where
    T: Copy + Send + Sync,
{
    if x + dst.cols() > src.cols() || y + dst.rows() > src.rows() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            x + dst.cols(),
            y + dst.rows(),
        ));
    }

    let dst_cols = dst.cols();
    let src_cols = src.cols();
    let src_data = src.as_slice();

    dst.as_slice_mut()
        .par_chunks_exact_mut(dst_cols * C)
        .enumerate()
        .for_each(|(i, dst_row)| {
            // get the slice at the top left corner
            let offset = (y + i) * src_cols * C + x * C;
            dst_row.copy_from_slice(&src_data[offset..offset + dst_cols * C]);
        });

    Ok(())
}

/// Split a dual-lens frame into its left and right halves.
///
/// The left half of the frame is the left camera and the right half is the right camera.
/// An odd trailing column is dropped.
///
/// # Errors
///
/// Returns an error if the frame is narrower than two pixels.
pub fn split_side_by_side<T, const C: usize>(
    frame: &Image<T, C>,
) -> Result<(Image<T, C>, Image<T, C>), ImageError>
where
    T: Copy + Default + Send + Sync,
{
    let half = ImageSize {
        width: frame.cols() / 2,
        height: frame.rows(),
    };
    if half.width == 0 {
        return Err(ImageError::InvalidImageSize(
            frame.cols(),
            frame.rows(),
            2,
            frame.rows(),
        ));
    }

    let mut left = Image::from_size_val(half, T::default())?;
    let mut right = Image::from_size_val(half, T::default())?;
    crop_image(frame, &mut left, 0, 0)?;
    crop_image(frame, &mut right, half.width, 0)?;

    Ok((left, right))
}
