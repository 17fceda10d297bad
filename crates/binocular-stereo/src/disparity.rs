use binocular_image::{Image, ImageError, ImageSize};

/// Number of fractional bits of the fixed-point disparity.
pub const DISP_SHIFT: u32 = 4;

/// Fixed-point scale of the disparity: one pixel is `DISP_SCALE` units.
pub const DISP_SCALE: i32 = 1 << DISP_SHIFT;

/// A disparity map with 4 fractional bits.
///
/// Each value is the horizontal offset `x_left - x_right` multiplied by 16. Unmatched
/// pixels hold `(min_disparity - 1) * 16`.
#[derive(Clone, Debug, PartialEq)]
pub struct DisparityMap {
    data: Image<i16, 1>,
    min_disparity: i32,
    num_disparities: i32,
}

impl DisparityMap {
    /// Create a map with every pixel invalid.
    pub fn new(size: ImageSize, min_disparity: i32, num_disparities: i32) -> Result<Self, ImageError> {
        let invalid = Self::invalid_for(min_disparity);
        Ok(Self {
            data: Image::from_size_val(size, invalid)?,
            min_disparity,
            num_disparities,
        })
    }

    /// Wrap fixed-point data computed elsewhere.
    pub fn from_image(data: Image<i16, 1>, min_disparity: i32, num_disparities: i32) -> Self {
        Self {
            data,
            min_disparity,
            num_disparities,
        }
    }

    fn invalid_for(min_disparity: i32) -> i16 {
        ((min_disparity - 1) * DISP_SCALE) as i16
    }

    /// The sentinel marking unmatched pixels.
    pub fn invalid_value(&self) -> i16 {
        Self::invalid_for(self.min_disparity)
    }

    /// Smallest searched disparity, in pixels.
    pub fn min_disparity(&self) -> i32 {
        self.min_disparity
    }

    /// Number of searched disparities.
    pub fn num_disparities(&self) -> i32 {
        self.num_disparities
    }

    /// Size of the map.
    pub fn size(&self) -> ImageSize {
        self.data.size()
    }

    /// The raw fixed-point image.
    pub fn image(&self) -> &Image<i16, 1> {
        &self.data
    }

    /// The raw fixed-point values, row-major.
    pub fn as_slice(&self) -> &[i16] {
        self.data.as_slice()
    }

    /// The raw fixed-point values, row-major.
    pub fn as_slice_mut(&mut self) -> &mut [i16] {
        self.data.as_slice_mut()
    }

    /// The fixed-point value at `(x, y)`.
    pub fn raw(&self, x: usize, y: usize) -> Option<i16> {
        if x >= self.data.cols() || y >= self.data.rows() {
            return None;
        }
        Some(self.data.as_slice()[y * self.data.cols() + x])
    }

    /// `true` if the value is a matched disparity.
    #[inline]
    pub fn is_valid_value(&self, value: i16) -> bool {
        value != self.invalid_value()
    }

    /// The disparity at `(x, y)` in pixels, `None` for unmatched pixels.
    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        self.raw(x, y)
            .filter(|&v| self.is_valid_value(v))
            .map(|v| v as f32 / DISP_SCALE as f32)
    }

    /// Number of matched pixels.
    pub fn count_valid(&self) -> usize {
        let invalid = self.invalid_value();
        self.as_slice().iter().filter(|&&v| v != invalid).count()
    }

    /// Stretch the fixed-point range `[min, max]` of the map to `0..=255`.
    ///
    /// The sentinel takes part in the range, like any other value.
    pub fn to_u8_normalized(&self) -> Result<Image<u8, 1>, ImageError> {
        let (min, max) = self
            .as_slice()
            .iter()
            .fold((i16::MAX, i16::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let range = max as f32 - min as f32;
        let scale = if range > 0.0 { 256.0 / range } else { 0.0 };
        let data = self
            .as_slice()
            .iter()
            .map(|&v| ((v as f32 - min as f32) * scale).round().clamp(0.0, 255.0) as u8)
            .collect();
        Image::new(self.size(), data)
    }

    /// Scale the fixed-point values by `255 / (num_disparities * 16)` to `u8`.
    ///
    /// This mapping does not depend on the content, so consecutive frames share it.
    pub fn to_u8_scaled(&self) -> Result<Image<u8, 1>, ImageError> {
        let scale = 255.0 / (self.num_disparities.max(1) * DISP_SCALE) as f32;
        let data = self
            .as_slice()
            .iter()
            .map(|&v| (v as f32 * scale).round().clamp(0.0, 255.0) as u8)
            .collect();
        Image::new(self.size(), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_map_is_invalid() -> Result<(), ImageError> {
        let map = DisparityMap::new([4, 3].into(), 0, 16)?;
        assert_eq!(map.invalid_value(), -16);
        assert_eq!(map.count_valid(), 0);
        assert_eq!(map.get(1, 1), None);
        assert_eq!(map.raw(4, 0), None);

        let shifted = DisparityMap::new([4, 3].into(), -8, 16)?;
        assert_eq!(shifted.invalid_value(), -144);
        Ok(())
    }

    #[test]
    fn test_get_fixed_point() -> Result<(), ImageError> {
        let data = Image::new([3, 1].into(), vec![-16, 40, 160])?;
        let map = DisparityMap::from_image(data, 0, 16);
        assert_eq!(map.get(0, 0), None);
        assert_eq!(map.get(1, 0), Some(2.5));
        assert_eq!(map.get(2, 0), Some(10.0));
        assert_eq!(map.count_valid(), 2);
        Ok(())
    }

    #[test]
    fn test_visualisation() -> Result<(), ImageError> {
        let data = Image::new([3, 1].into(), vec![-16, 64, 240])?;
        let map = DisparityMap::from_image(data, 0, 16);

        let normalized = map.to_u8_normalized()?;
        assert_eq!(normalized.as_slice(), &[0, 80, 255]);

        let scaled = map.to_u8_scaled()?;
        assert_eq!(scaled.as_slice(), &[0, 64, 239]);
        Ok(())
    }
}
