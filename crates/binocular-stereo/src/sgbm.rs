//! Semi-global block matching.
//!
//! The matching cost is the Birchfield-Tomasi dissimilarity of the horizontally Sobel
//! filtered images plus a quarter of the dissimilarity of the raw intensities, summed
//! over a square block. Costs are aggregated along 5 or 8 scanline directions with the
//! smoothness penalties `p1` (one level steps) and `p2` (larger steps), the best
//! aggregated cost wins, and the result is filtered for ambiguity, left-right
//! consistency and speckles.

use binocular_image::{Image, ImageSize};
use serde::{Deserialize, Serialize};

use crate::disparity::{DisparityMap, DISP_SCALE, DISP_SHIFT};
use crate::error::StereoError;
use crate::speckle::filter_speckles;

/// Cost aggregation directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SgbmMode {
    /// Five directions: the left, the right and the three from the rows above.
    Sgbm,
    /// All eight directions around a pixel.
    Hh,
}

impl SgbmMode {
    /// Scanline steps `(dx, dy)`; the predecessor of `(x, y)` is `(x - dx, y - dy)`.
    fn directions(&self) -> &'static [(isize, isize)] {
        match self {
            SgbmMode::Sgbm => &[(1, 0), (1, 1), (0, 1), (-1, 1), (-1, 0)],
            SgbmMode::Hh => &[
                (1, 0),
                (-1, 0),
                (0, 1),
                (0, -1),
                (1, 1),
                (-1, 1),
                (1, -1),
                (-1, -1),
            ],
        }
    }
}

/// Parameters of the semi-global matcher.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SgbmParams {
    /// Smallest searched disparity, in pixels.
    pub min_disparity: i32,
    /// Number of searched disparities, a positive multiple of 16.
    pub num_disparities: i32,
    /// Side of the square matching block, odd.
    pub block_size: usize,
    /// Penalty for a disparity change of one level between neighbours.
    pub p1: u32,
    /// Penalty for larger disparity changes between neighbours, greater than `p1`.
    pub p2: u32,
    /// Largest allowed left-right disagreement in pixels; negative disables the check.
    pub disp12_max_diff: i32,
    /// Clip value of the Sobel prefilter.
    pub pre_filter_cap: i32,
    /// Margin in percent by which the best cost must beat every other candidate.
    pub uniqueness_ratio: u32,
    /// Largest blob, in pixels, removed by the speckle filter; 0 disables it.
    pub speckle_window_size: usize,
    /// Largest disparity step in pixels inside one speckle blob.
    pub speckle_range: i32,
    /// Cost aggregation directions.
    pub mode: SgbmMode,
}

impl SgbmParams {
    /// Matcher with penalties derived from the block size, for 3-channel images.
    pub fn new(min_disparity: i32, num_disparities: i32, block_size: usize) -> Self {
        let area = (block_size * block_size) as u32;
        Self {
            min_disparity,
            num_disparities,
            block_size,
            p1: 8 * 3 * area,
            p2: 32 * 3 * area,
            disp12_max_diff: 1,
            pre_filter_cap: 63,
            uniqueness_ratio: 2,
            speckle_window_size: 50,
            speckle_range: 2,
            mode: SgbmMode::Hh,
        }
    }

    /// Settings for still images, searching about an eighth of the image width.
    pub fn for_width(width: usize, block_size: usize) -> Self {
        let num_disparities = ((width / 8) as i32 + 15) & -16;
        Self::new(0, num_disparities, block_size)
    }

    /// Settings for video frames: a fixed range of 128 and stronger speckle removal.
    pub fn video_preset(block_size: usize) -> Self {
        Self {
            disp12_max_diff: 2,
            pre_filter_cap: 5,
            speckle_window_size: 75,
            ..Self::new(0, 128, block_size)
        }
    }

    /// Set the searched range.
    pub fn with_disparity_range(mut self, min_disparity: i32, num_disparities: i32) -> Self {
        self.min_disparity = min_disparity;
        self.num_disparities = num_disparities;
        self
    }

    /// Set the smoothness penalties.
    pub fn with_penalties(mut self, p1: u32, p2: u32) -> Self {
        self.p1 = p1;
        self.p2 = p2;
        self
    }

    /// Set the speckle filter window and range.
    pub fn with_speckle(mut self, window_size: usize, range: i32) -> Self {
        self.speckle_window_size = window_size;
        self.speckle_range = range;
        self
    }

    /// Set the aggregation mode.
    pub fn with_mode(mut self, mode: SgbmMode) -> Self {
        self.mode = mode;
        self
    }

    /// Check the parameter ranges.
    pub fn validate(&self) -> Result<(), StereoError> {
        if self.num_disparities <= 0 || self.num_disparities % 16 != 0 {
            return Err(StereoError::InvalidParameter(format!(
                "num_disparities must be a positive multiple of 16, got {}",
                self.num_disparities
            )));
        }
        if self.block_size == 0 || self.block_size % 2 == 0 {
            return Err(StereoError::InvalidParameter(format!(
                "block_size must be odd, got {}",
                self.block_size
            )));
        }
        if self.p1 >= self.p2 {
            return Err(StereoError::InvalidParameter(format!(
                "p1 ({}) must be smaller than p2 ({})",
                self.p1, self.p2
            )));
        }
        if self.pre_filter_cap <= 0 || self.pre_filter_cap > 63 {
            return Err(StereoError::InvalidParameter(format!(
                "pre_filter_cap must be in 1..=63, got {}",
                self.pre_filter_cap
            )));
        }
        if self.uniqueness_ratio >= 100 {
            return Err(StereoError::InvalidParameter(format!(
                "uniqueness_ratio must be below 100, got {}",
                self.uniqueness_ratio
            )));
        }
        Ok(())
    }
}

/// Horizontal Sobel response clipped to `[-cap, cap]` and offset by `cap`.
///
/// Rows are mirrored at the top and bottom; the first and last columns are `cap`.
fn prefilter_x_sobel<const C: usize>(image: &Image<u8, C>, channel: usize, cap: i32) -> Vec<u8> {
    let (width, height) = (image.cols(), image.rows());
    let data = image.as_slice();
    let at = |x: usize, y: usize| data[(y * width + x) * C + channel] as i32;
    let mut out = vec![cap as u8; width * height];

    for y in 0..height {
        let y0 = if y > 0 { y - 1 } else { 1usize.min(height - 1) };
        let y2 = if y + 1 < height { y + 1 } else { height.saturating_sub(2) };
        for x in 1..width.saturating_sub(1) {
            let d = at(x + 1, y0) - at(x - 1, y0)
                + 2 * (at(x + 1, y) - at(x - 1, y))
                + at(x + 1, y2)
                - at(x - 1, y2);
            out[y * width + x] = (d.clamp(-cap, cap) + cap) as u8;
        }
    }
    out
}

/// Lower and upper half-pixel interpolated envelope of a row.
fn row_envelope(row: &[u8]) -> (Vec<i32>, Vec<i32>) {
    let n = row.len();
    let mut lo = vec![0; n];
    let mut hi = vec![0; n];
    for x in 0..n {
        let v = row[x] as i32;
        let vl = if x > 0 { (v + row[x - 1] as i32) / 2 } else { v };
        let vr = if x + 1 < n { (v + row[x + 1] as i32) / 2 } else { v };
        lo[x] = v.min(vl).min(vr);
        hi[x] = v.max(vl).max(vr);
    }
    (lo, hi)
}

/// Dense matching geometry shared by the stages.
struct Layout {
    width: usize,
    height: usize,
    /// First column with every candidate inside the right image.
    x0: usize,
    /// Number of matched columns.
    cols: usize,
    /// Number of disparity levels.
    levels: usize,
    min_disparity: i32,
}

impl Layout {
    #[inline]
    fn index(&self, i: usize, y: usize) -> usize {
        (y * self.cols + i) * self.levels
    }
}

/// Add the Birchfield-Tomasi dissimilarity of one row pair, shifted right by `scale`.
fn accumulate_bt(
    layout: &Layout,
    left: &[u8],
    right: &[u8],
    scale: u32,
    costs: &mut [u16],
) {
    let (lo_l, hi_l) = row_envelope(left);
    let (lo_r, hi_r) = row_envelope(right);
    for i in 0..layout.cols {
        let x = layout.x0 + i;
        let u = left[x] as i32;
        for d in 0..layout.levels {
            let xr = (x as i32 - layout.min_disparity - d as i32) as usize;
            let v = right[xr] as i32;
            let c0 = 0.max(u - hi_r[xr]).max(lo_r[xr] - u);
            let c1 = 0.max(v - hi_l[x]).max(lo_l[x] - v);
            let cost = &mut costs[i * layout.levels + d];
            *cost = cost.saturating_add((c0.min(c1) as u16) >> scale);
        }
    }
}

#[inline]
fn saturate(value: u32) -> u16 {
    value.min(u16::MAX as u32) as u16
}

/// Block-summed matching cost for every matched column, row and level.
///
/// Costs are 16 bit and saturate; only the row being summed keeps per pixel costs.
fn matching_cost<const C: usize>(
    layout: &Layout,
    left: &Image<u8, C>,
    right: &Image<u8, C>,
    params: &SgbmParams,
) -> Vec<u16> {
    let (w, h, levels, cols) = (layout.width, layout.height, layout.levels, layout.cols);
    let row_len = cols * levels;
    let radius = params.block_size / 2;

    let channels = (0..C)
        .map(|c| {
            let raw = |image: &Image<u8, C>| {
                image.as_slice().iter().skip(c).step_by(C).copied().collect::<Vec<_>>()
            };
            (
                prefilter_x_sobel(left, c, params.pre_filter_cap),
                prefilter_x_sobel(right, c, params.pre_filter_cap),
                raw(left),
                raw(right),
            )
        })
        .collect::<Vec<_>>();

    // per pixel costs of one row, summed horizontally straight away
    let mut horizontal = vec![0u16; h * row_len];
    let mut pixel = vec![0u16; row_len];
    let mut acc = vec![0u32; levels];
    for y in 0..h {
        pixel.fill(0);
        let row = y * w..(y + 1) * w;
        for (sobel_l, sobel_r, raw_l, raw_r) in &channels {
            accumulate_bt(layout, &sobel_l[row.clone()], &sobel_r[row.clone()], 0, &mut pixel);
            accumulate_bt(layout, &raw_l[row.clone()], &raw_r[row.clone()], 2, &mut pixel);
        }

        let dst_row = &mut horizontal[y * row_len..(y + 1) * row_len];
        if radius == 0 {
            dst_row.copy_from_slice(&pixel);
            continue;
        }
        for i in 0..cols {
            acc.fill(0);
            for k in 0..=2 * radius {
                let j = (i + k).saturating_sub(radius).min(cols - 1);
                for (a, &p) in acc.iter_mut().zip(&pixel[j * levels..(j + 1) * levels]) {
                    *a += p as u32;
                }
            }
            for (dst, &a) in dst_row[i * levels..(i + 1) * levels].iter_mut().zip(&acc) {
                *dst = saturate(a);
            }
        }
    }
    if radius == 0 {
        return horizontal;
    }

    // vertical sum, clamping at the borders
    let mut block = vec![0u16; h * row_len];
    for y in 0..h {
        let dst = &mut block[y * row_len..(y + 1) * row_len];
        for k in 0..=2 * radius {
            let yy = (y + k).saturating_sub(radius).min(h - 1);
            let src = &horizontal[yy * row_len..(yy + 1) * row_len];
            for (b, &v) in dst.iter_mut().zip(src) {
                *b = b.saturating_add(v);
            }
        }
    }
    block
}

/// Sum of the path costs over all directions of `mode`.
///
/// A path only looks back one row, so the path costs live in two row buffers.
fn aggregate(layout: &Layout, cost: &[u16], params: &SgbmParams) -> Vec<u32> {
    let (cols, h, levels) = (layout.cols, layout.height, layout.levels);
    let row_len = cols * levels;
    let mut total = vec![0u32; cost.len()];
    let mut prev_row = vec![0u16; row_len];
    let mut cur_row = vec![0u16; row_len];
    let mut prev = vec![0u32; levels];

    for &(dx, dy) in params.mode.directions() {
        let xs: Vec<usize> = if dx >= 0 {
            (0..cols).collect()
        } else {
            (0..cols).rev().collect()
        };
        let ys: Vec<usize> = if dy >= 0 {
            (0..h).collect()
        } else {
            (0..h).rev().collect()
        };

        for (n, &y) in ys.iter().enumerate() {
            for &i in &xs {
                let idx = layout.index(i, y);
                let off = i * levels;
                let px = i as isize - dx;
                let has_prev = px >= 0 && px < cols as isize && (dy == 0 || n > 0);
                if !has_prev {
                    cur_row[off..off + levels].copy_from_slice(&cost[idx..idx + levels]);
                } else {
                    // dy == 0 looks back within the current row
                    let poff = px as usize * levels;
                    let src = if dy == 0 { &cur_row } else { &prev_row };
                    for (p, &v) in prev.iter_mut().zip(&src[poff..poff + levels]) {
                        *p = v as u32;
                    }
                    let prev_min = prev.iter().copied().min().unwrap_or(0);
                    let jump = prev_min + params.p2;
                    for d in 0..levels {
                        let mut best = prev[d].min(jump);
                        if d > 0 {
                            best = best.min(prev[d - 1] + params.p1);
                        }
                        if d + 1 < levels {
                            best = best.min(prev[d + 1] + params.p1);
                        }
                        cur_row[off + d] = saturate(cost[idx + d] as u32 + best - prev_min);
                    }
                }
                for (t, &v) in total[idx..idx + levels].iter_mut().zip(&cur_row[off..off + levels]) {
                    *t += v as u32;
                }
            }
            std::mem::swap(&mut prev_row, &mut cur_row);
        }
    }
    total
}

/// 3x3 median with replicated borders.
fn median_3x3(image: &Image<i16, 1>) -> Result<Image<i16, 1>, StereoError> {
    let (w, h) = (image.cols(), image.rows());
    let src = image.as_slice();
    let mut out = vec![0i16; w * h];
    let mut window = [0i16; 9];
    for y in 0..h {
        for x in 0..w {
            let mut n = 0;
            for yy in [y.saturating_sub(1), y, (y + 1).min(h - 1)] {
                for xx in [x.saturating_sub(1), x, (x + 1).min(w - 1)] {
                    window[n] = src[yy * w + xx];
                    n += 1;
                }
            }
            window.sort_unstable();
            out[y * w + x] = window[4];
        }
    }
    Ok(Image::new(image.size(), out)?)
}

/// Compute the disparity of a rectified pair with semi-global matching.
///
/// The output has the size of the input and stores `16 * (x_left - x_right)`. Columns
/// left of `min_disparity + num_disparities - 1` cannot see every candidate and stay
/// invalid, as do ambiguous matches, left-right inconsistent matches and speckles.
///
/// # Arguments
///
/// * `left` - The rectified left image.
/// * `right` - The rectified right image, same size.
/// * `params` - Matcher settings.
pub fn compute_disparity<const C: usize>(
    left: &Image<u8, C>,
    right: &Image<u8, C>,
    params: &SgbmParams,
) -> Result<DisparityMap, StereoError> {
    params.validate()?;
    if left.size() != right.size() {
        return Err(StereoError::SizeMismatch(
            left.cols(),
            left.rows(),
            right.cols(),
            right.rows(),
        ));
    }

    let ImageSize { width, height } = left.size();
    let min_d = params.min_disparity;
    let levels = params.num_disparities as usize;
    let mut map = DisparityMap::new(left.size(), min_d, params.num_disparities)?;

    let x0 = (min_d + params.num_disparities - 1).max(0) as usize;
    let x1 = (width as i32 + min_d.min(0)).max(0) as usize;
    if x1 <= x0 || height == 0 {
        log::warn!(
            "image width {width} is too small for {} disparities",
            params.num_disparities
        );
        return Ok(map);
    }
    let layout = Layout {
        width,
        height,
        x0,
        cols: x1 - x0,
        levels,
        min_disparity: min_d,
    };

    let cost = matching_cost(&layout, left, right, params);
    let total = aggregate(&layout, &cost, params);

    let invalid = map.invalid_value();
    let disp = map.as_slice_mut();
    let mut disp2 = vec![min_d - 1; width];
    let mut disp2_cost = vec![u32::MAX; width];

    for y in 0..height {
        disp2.fill(min_d - 1);
        disp2_cost.fill(u32::MAX);
        let row = &mut disp[y * width..(y + 1) * width];

        for i in (0..layout.cols).rev() {
            let s = &total[layout.index(i, y)..layout.index(i, y) + levels];
            let (best, min_s) = s
                .iter()
                .enumerate()
                .fold((0usize, u32::MAX), |(bd, bs), (d, &v)| {
                    if v < bs {
                        (d, v)
                    } else {
                        (bd, bs)
                    }
                });

            let ambiguous = s.iter().enumerate().any(|(d, &v)| {
                (v as u64) * (100 - params.uniqueness_ratio as u64) < (min_s as u64) * 100
                    && best.abs_diff(d) > 1
            });
            if ambiguous {
                continue;
            }

            let x = x0 + i;
            let xr = (x as i32 - min_d - best as i32) as usize;
            if disp2_cost[xr] > min_s {
                disp2_cost[xr] = min_s;
                disp2[xr] = best as i32 + min_d;
            }

            let mut d = best as i64 * DISP_SCALE as i64;
            if best > 0 && best + 1 < levels {
                let (sm, s0, sp) = (s[best - 1] as i64, s[best] as i64, s[best + 1] as i64);
                let denom2 = (sm + sp - 2 * s0).max(1);
                d += ((sm - sp) * DISP_SCALE as i64 + denom2) / (denom2 * 2);
            }
            row[x] = (d + (min_d * DISP_SCALE) as i64) as i16;
        }

        if params.disp12_max_diff >= 0 {
            for x in x0..x1 {
                let d1 = row[x] as i32;
                if d1 == invalid as i32 {
                    continue;
                }
                let lo = d1 >> DISP_SHIFT;
                let hi = (d1 + DISP_SCALE - 1) >> DISP_SHIFT;
                let disagrees = |d: i32| {
                    let xr = x as i32 - d;
                    xr >= 0
                        && xr < width as i32
                        && disp2[xr as usize] >= min_d
                        && (disp2[xr as usize] - d).abs() > params.disp12_max_diff
                };
                if disagrees(lo) && disagrees(hi) {
                    row[x] = invalid;
                }
            }
        }
    }

    let filtered = median_3x3(map.image())?;
    let mut map = DisparityMap::from_image(filtered, min_d, params.num_disparities);

    if params.speckle_window_size > 0 {
        filter_speckles(
            &mut map,
            params.speckle_window_size,
            params.speckle_range * DISP_SCALE,
        );
    }

    log::debug!(
        "disparity {width}x{height}: {} of {} pixels matched",
        map.count_valid(),
        width * height
    );
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    /// Random texture with 2x2 blobs, and the same texture seen with disparity `shift`.
    fn shifted_pair(
        width: usize,
        height: usize,
        shift: usize,
    ) -> Result<(Image<u8, 1>, Image<u8, 1>), StereoError> {
        let mut rng = StdRng::seed_from_u64(7);
        let tex_w = width + shift + 2;
        let texture = (0..(height / 2 + 1) * (tex_w / 2 + 1))
            .map(|_| rng.random_range(0..=255u8))
            .collect::<Vec<_>>();
        let at = |x: usize, y: usize| texture[(y / 2) * (tex_w / 2 + 1) + x / 2];

        let mut left = vec![0u8; width * height];
        let mut right = vec![0u8; width * height];
        for y in 0..height {
            for x in 0..width {
                left[y * width + x] = at(x, y);
                right[y * width + x] = at(x + shift, y);
            }
        }
        let size = ImageSize { width, height };
        Ok((Image::new(size, left)?, Image::new(size, right)?))
    }

    #[test]
    fn test_params_for_width() {
        let params = SgbmParams::for_width(640, 7);
        assert_eq!(params.num_disparities, 80);
        assert_eq!(params.p1, 8 * 3 * 49);
        assert_eq!(params.p2, 32 * 3 * 49);
        assert_eq!(params.mode, SgbmMode::Hh);
        assert!(params.validate().is_ok());

        assert_eq!(SgbmParams::for_width(320, 7).num_disparities, 48);
        assert!(SgbmParams::for_width(4, 7).validate().is_err());

        let video = SgbmParams::video_preset(9);
        assert_eq!(video.num_disparities, 128);
        assert_eq!(video.pre_filter_cap, 5);
        assert_eq!(video.speckle_window_size, 75);
        assert_eq!(video.disp12_max_diff, 2);
    }

    #[test]
    fn test_invalid_params() {
        let base = SgbmParams::new(0, 16, 5);
        assert!(SgbmParams { block_size: 4, ..base }.validate().is_err());
        assert!(SgbmParams { num_disparities: 20, ..base }.validate().is_err());
        assert!(base.with_penalties(100, 10).validate().is_err());
    }

    #[test]
    fn test_constant_shift_is_recovered() -> Result<(), StereoError> {
        let shift = 6;
        let (left, right) = shifted_pair(96, 48, shift)?;
        let params = SgbmParams::new(0, 16, 5).with_penalties(8 * 25, 32 * 25);
        let map = compute_disparity(&left, &right, &params)?;

        assert_eq!(map.size(), left.size());
        let margin = 4;
        let mut checked = 0;
        for y in margin..48 - margin {
            // columns left of 15 cannot be matched
            for x in 0..15 {
                assert_eq!(map.get(x, y), None);
            }
            for x in 15 + margin..96 - margin {
                // one fixed point unit, a sixteenth of a pixel
                let raw = map.raw(x, y).unwrap_or(i16::MIN);
                assert!(
                    (raw as i32 - shift as i32 * DISP_SCALE).abs() <= 1,
                    "({x}, {y}): {raw}"
                );
                checked += 1;
            }
        }
        assert!(checked > 0);
        Ok(())
    }

    #[test]
    fn test_color_and_sgbm_mode() -> Result<(), StereoError> {
        let shift = 3;
        let (left, right) = shifted_pair(80, 40, shift)?;
        let to_rgb = |img: &Image<u8, 1>| -> Result<Image<u8, 3>, StereoError> {
            let data = img.as_slice().iter().flat_map(|&v| [v, v / 2, 255 - v]).collect();
            Ok(Image::new(img.size(), data)?)
        };
        let params = SgbmParams::new(0, 16, 3).with_mode(SgbmMode::Sgbm);
        let map = compute_disparity(&to_rgb(&left)?, &to_rgb(&right)?, &params)?;
        let d = map.get(50, 20).unwrap_or(f32::NAN);
        assert!((d - shift as f32).abs() <= 1.0, "disparity {d}");
        Ok(())
    }

    #[test]
    fn test_large_block_saturates_the_cost() -> Result<(), StereoError> {
        let size = ImageSize {
            width: 48,
            height: 24,
        };
        let left = Image::<u8, 3>::from_size_val(size, 255)?;
        let right = Image::<u8, 3>::from_size_val(size, 0)?;
        // 3 channels of 63 summed over a 21x21 block exceed 16 bits
        let params = SgbmParams::new(0, 16, 21);
        let layout = Layout {
            width: size.width,
            height: size.height,
            x0: 15,
            cols: size.width - 15,
            levels: 16,
            min_disparity: 0,
        };
        let cost = matching_cost(&layout, &left, &right, &params);
        assert_eq!(cost.len(), size.height * layout.cols * layout.levels);
        assert!(cost.iter().any(|&c| c == u16::MAX));

        let map = compute_disparity(&left, &right, &params)?;
        assert_eq!(map.size(), size);
        Ok(())
    }

    #[test]
    fn test_size_mismatch() -> Result<(), StereoError> {
        let left = Image::<u8, 1>::from_size_val([32, 16].into(), 0)?;
        let right = Image::<u8, 1>::from_size_val([30, 16].into(), 0)?;
        assert!(matches!(
            compute_disparity(&left, &right, &SgbmParams::new(0, 16, 3)),
            Err(StereoError::SizeMismatch(32, 16, 30, 16))
        ));
        Ok(())
    }

    #[test]
    fn test_narrow_image_is_all_invalid() -> Result<(), StereoError> {
        let image = Image::<u8, 1>::from_size_val([12, 8].into(), 10)?;
        let map = compute_disparity(&image, &image, &SgbmParams::new(0, 16, 3))?;
        assert_eq!(map.count_valid(), 0);
        Ok(())
    }

    #[test]
    fn test_prefilter_is_capped() -> Result<(), StereoError> {
        let data = (0..8u8).flat_map(|_| [0u8, 0, 0, 255, 255, 255]).collect();
        let image = Image::<u8, 1>::new([6, 8].into(), data)?;
        let out = prefilter_x_sobel(&image, 0, 31);
        assert_eq!(&out[6..12], &[31, 31, 62, 62, 31, 31]);
        Ok(())
    }
}
