use binocular_image::Image;

use crate::disparity::{DisparityMap, DISP_SCALE};
use crate::error::StereoError;
use crate::pointcloud::PointCloud;

/// Depth given to pixels without a disparity, and the sanity ceiling of exported depths.
pub const MAX_Z: f64 = 1.0e4;

/// Map `(x, y, d)` through `Q` to a 3d point, `None` when the homogeneous scale vanishes.
#[inline]
fn reproject_pixel(q: &[[f64; 4]; 4], x: f64, y: f64, d: f64) -> Option<[f64; 3]> {
    let v = [x, y, d, 1.0];
    let row = |r: usize| q[r][0] * v[0] + q[r][1] * v[1] + q[r][2] * v[2] + q[r][3] * v[3];
    let w = row(3);
    if w.abs() < f64::EPSILON {
        return None;
    }
    Some([row(0) / w, row(1) / w, row(2) / w])
}

/// Reproject every pixel of a disparity map to 3d.
///
/// Unmatched pixels, and pixels whose homogeneous scale vanishes, are set to
/// `(0, 0, MAX_Z)`.
///
/// # Arguments
///
/// * `disparity` - Fixed-point disparity of the rectified left image.
/// * `q` - The disparity to depth matrix of the rectification.
pub fn reproject_image_to_3d(
    disparity: &DisparityMap,
    q: &[[f64; 4]; 4],
) -> Result<Image<f32, 3>, StereoError> {
    let size = disparity.size();
    let invalid = disparity.invalid_value();
    let mut data = Vec::with_capacity(size.area() * 3);

    for (i, &raw) in disparity.as_slice().iter().enumerate() {
        let (x, y) = ((i % size.width) as f64, (i / size.width) as f64);
        let point = (raw != invalid)
            .then(|| reproject_pixel(q, x, y, raw as f64 / DISP_SCALE as f64))
            .flatten()
            .unwrap_or([0.0, 0.0, MAX_Z]);
        data.extend(point.iter().map(|&v| v as f32));
    }

    Ok(Image::new(size, data)?)
}

/// Build a colored point cloud from a disparity map.
///
/// A pixel contributes a point when it has a disparity, its mask value is non-zero and
/// its depth is finite with `|z| <= max_z` and `z` not at the `max_z` ceiling. Points
/// keep the color of the same pixel in `color`; single channel images give gray points.
///
/// # Arguments
///
/// * `disparity` - Fixed-point disparity of the rectified left image.
/// * `q` - The disparity to depth matrix of the rectification.
/// * `color` - The rectified left image, same size as the disparity.
/// * `mask` - Optional validity mask of the rectified left image.
/// * `max_z` - Depth ceiling.
pub fn point_cloud_from_disparity<const C: usize>(
    disparity: &DisparityMap,
    q: &[[f64; 4]; 4],
    color: &Image<u8, C>,
    mask: Option<&Image<u8, 1>>,
    max_z: f64,
) -> Result<PointCloud, StereoError> {
    let size = disparity.size();
    if color.size() != size {
        return Err(StereoError::SizeMismatch(
            color.cols(),
            color.rows(),
            size.width,
            size.height,
        ));
    }
    if let Some(mask) = mask {
        if mask.size() != size {
            return Err(StereoError::SizeMismatch(
                mask.cols(),
                mask.rows(),
                size.width,
                size.height,
            ));
        }
    }

    let invalid = disparity.invalid_value();
    let pixels = color.as_slice();
    let mut cloud = PointCloud::default();

    for (i, &raw) in disparity.as_slice().iter().enumerate() {
        if raw == invalid {
            continue;
        }
        if mask.is_some_and(|m| m.as_slice()[i] == 0) {
            continue;
        }
        let (x, y) = ((i % size.width) as f64, (i / size.width) as f64);
        let Some(point) = reproject_pixel(q, x, y, raw as f64 / DISP_SCALE as f64) else {
            continue;
        };
        let z = point[2];
        if !point.iter().all(|v| v.is_finite())
            || (z - max_z).abs() < f32::EPSILON as f64
            || z.abs() > max_z
        {
            continue;
        }

        let px = &pixels[i * C..(i + 1) * C];
        let rgb = if C >= 3 {
            [px[0], px[1], px[2]]
        } else {
            [px[0]; 3]
        };
        cloud.push(
            [point[0] as f32, point[1] as f32, point[2] as f32],
            rgb,
        );
    }

    log::debug!(
        "point cloud: {} points from {} matched pixels",
        cloud.len(),
        disparity.count_valid()
    );
    Ok(cloud)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use binocular_image::ImageSize;

    /// Q of a parallel rig with focal length 100, principal point (16, 12) and baseline 0.2.
    fn q_matrix() -> [[f64; 4]; 4] {
        let (f, cx, cy, tx) = (100.0, 16.0, 12.0, -0.2);
        [
            [1.0, 0.0, 0.0, -cx],
            [0.0, 1.0, 0.0, -cy],
            [0.0, 0.0, 0.0, f],
            [0.0, 0.0, -1.0 / tx, 0.0],
        ]
    }

    fn size() -> ImageSize {
        ImageSize {
            width: 32,
            height: 24,
        }
    }

    #[test]
    fn test_constant_disparity_is_a_plane() -> Result<(), Box<dyn std::error::Error>> {
        // 5 px disparity: z = f * b / d = 100 * 0.2 / 5
        let disparity = DisparityMap::from_image(Image::from_size_val(size(), 80)?, 0, 16);
        let color = Image::<u8, 3>::from_size_val(size(), 7)?;
        let cloud = point_cloud_from_disparity(&disparity, &q_matrix(), &color, None, MAX_Z)?;

        assert_eq!(cloud.len(), size().area());
        for (p, c) in cloud.points().iter().zip(cloud.colors()) {
            assert_relative_eq!(p[2], 4.0, epsilon = 1e-5);
            assert_eq!(*c, [7, 7, 7]);
        }
        // the principal point lies on the optical axis
        let center = cloud.points()[12 * 32 + 16];
        assert_relative_eq!(center[0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(center[1], 0.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn test_invalid_and_masked_pixels_are_dropped() -> Result<(), Box<dyn std::error::Error>> {
        let mut disparity = DisparityMap::from_image(Image::from_size_val(size(), 80)?, 0, 16);
        let invalid = disparity.invalid_value();
        disparity.as_slice_mut()[0] = invalid;
        // far too small a disparity: z above the ceiling
        disparity.as_slice_mut()[1] = 0;

        let mut mask = Image::<u8, 1>::from_size_val(size(), 255)?;
        mask.as_slice_mut()[2] = 0;

        let gray = Image::<u8, 1>::from_size_val(size(), 99)?;
        let cloud = point_cloud_from_disparity(&disparity, &q_matrix(), &gray, Some(&mask), MAX_Z)?;
        assert_eq!(cloud.len(), size().area() - 3);
        assert_eq!(cloud.colors()[0], [99, 99, 99]);
        Ok(())
    }

    #[test]
    fn test_reproject_image_to_3d() -> Result<(), Box<dyn std::error::Error>> {
        let mut disparity = DisparityMap::from_image(Image::from_size_val(size(), 160)?, 0, 16);
        let invalid = disparity.invalid_value();
        disparity.as_slice_mut()[5] = invalid;

        let xyz = reproject_image_to_3d(&disparity, &q_matrix())?;
        assert_eq!(xyz.size(), size());
        assert_relative_eq!(xyz.as_slice()[2], 2.0, epsilon = 1e-5);
        assert_eq!(&xyz.as_slice()[15..18], &[0.0, 0.0, MAX_Z as f32]);
        Ok(())
    }

    #[test]
    fn test_size_mismatch() -> Result<(), Box<dyn std::error::Error>> {
        let disparity = DisparityMap::new(size(), 0, 16)?;
        let color = Image::<u8, 3>::from_size_val([8, 8].into(), 0)?;
        assert!(matches!(
            point_cloud_from_disparity(&disparity, &q_matrix(), &color, None, MAX_Z),
            Err(StereoError::SizeMismatch(8, 8, 32, 24))
        ));
        Ok(())
    }
}
