//! Chessboard detection.
//!
//! Interior corners are found with the ChESS saddle response on a 16 sample ring of
//! radius 5, kept by non-maximum suppression and then linked into a lattice by walking
//! from a seed corner to its four neighbours. A detection is only reported when the
//! lattice has exactly the expected `width x height` nodes.

use std::collections::{HashMap, VecDeque};

use binocular_image::{Image, ImageDtype};
use serde::{Deserialize, Serialize};

use super::subpix::{corner_subpix, SubPixParams};

/// Radius of the sampling ring.
const RING_RADIUS: i64 = 5;

/// Sample ring around the candidate pixel, ordered by angle.
const RING: [(i64, i64); 16] = [
    (5, 0),
    (5, 2),
    (4, 4),
    (2, 5),
    (0, 5),
    (-2, 5),
    (-4, 4),
    (-5, 2),
    (-5, 0),
    (-5, -2),
    (-4, -4),
    (-2, -5),
    (0, -5),
    (2, -5),
    (4, -4),
    (5, -2),
];

/// Number of interior corners of a chessboard along each axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternSize {
    /// Interior corners per row.
    pub width: usize,
    /// Interior corners per column.
    pub height: usize,
}

impl PatternSize {
    /// Total number of interior corners.
    pub fn count(&self) -> usize {
        self.width * self.height
    }
}

/// Parameters of the chessboard detector.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChessboardParams {
    /// Candidates must exceed this fraction of the strongest response.
    pub relative_threshold: f32,
    /// Candidates must exceed this absolute response.
    pub absolute_threshold: f32,
    /// Radius of the non-maximum suppression window.
    pub nms_radius: usize,
    /// Search radius around a predicted lattice node, as a fraction of the lattice step.
    pub lattice_tolerance: f64,
    /// Number of seed corners tried before giving up.
    pub max_seeds: usize,
    /// Sub-pixel refinement applied to a complete detection.
    pub subpix: SubPixParams,
}

impl Default for ChessboardParams {
    fn default() -> Self {
        Self {
            relative_threshold: 0.1,
            absolute_threshold: 100.0,
            nms_radius: 3,
            lattice_tolerance: 0.35,
            max_seeds: 8,
            subpix: SubPixParams::default(),
        }
    }
}

impl ChessboardParams {
    /// Set the sub-pixel refinement parameters.
    pub fn with_subpix(mut self, subpix: SubPixParams) -> Self {
        self.subpix = subpix;
        self
    }

    /// Set the relative response threshold.
    pub fn with_relative_threshold(mut self, relative_threshold: f32) -> Self {
        self.relative_threshold = relative_threshold;
        self
    }
}

/// Compute the ChESS corner response of every pixel.
///
/// Pixels closer than the ring radius to the border have a zero response.
pub fn chess_response<T: ImageDtype>(image: &Image<T, 1>) -> Vec<f32> {
    let (cols, rows) = (image.cols() as i64, image.rows() as i64);
    let src = image.as_slice();
    let mut response = vec![0.0f32; src.len()];
    let at = |x: i64, y: i64| -> f32 { src[(y * cols + x) as usize].into() };

    for y in RING_RADIUS..rows - RING_RADIUS {
        for x in RING_RADIUS..cols - RING_RADIUS {
            let mut ring = [0.0f32; 16];
            for (sample, (dx, dy)) in ring.iter_mut().zip(RING.iter()) {
                *sample = at(x + dx, y + dy);
            }

            let sum_resp: f32 = (0..4)
                .map(|n| (ring[n] + ring[n + 8] - ring[n + 4] - ring[n + 12]).abs())
                .sum();
            let diff_resp: f32 = (0..8).map(|n| (ring[n] - ring[n + 8]).abs()).sum();
            let ring_mean = ring.iter().sum::<f32>() / 16.0;
            let local_mean =
                (at(x, y) + at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1)) / 5.0;

            response[(y * cols + x) as usize] =
                sum_resp - diff_resp - 16.0 * (local_mean - ring_mean).abs();
        }
    }

    response
}

/// Find the strong local maxima of the response, refined to the response centroid.
fn response_peaks(response: &[f32], cols: usize, rows: usize, params: &ChessboardParams) -> Vec<[f64; 2]> {
    let max_response = response.iter().copied().fold(0.0f32, f32::max);
    let threshold = params
        .absolute_threshold
        .max(params.relative_threshold * max_response);
    let radius = params.nms_radius as i64;
    let (cols_i, rows_i) = (cols as i64, rows as i64);

    let mut peaks = Vec::new();
    for y in 0..rows_i {
        for x in 0..cols_i {
            let idx = (y * cols_i + x) as usize;
            let value = response[idx];
            if value <= threshold {
                continue;
            }

            // ties go to the earlier pixel in raster order
            let mut is_max = true;
            'nms: for ny in (y - radius).max(0)..=(y + radius).min(rows_i - 1) {
                for nx in (x - radius).max(0)..=(x + radius).min(cols_i - 1) {
                    let nidx = (ny * cols_i + nx) as usize;
                    if nidx == idx {
                        continue;
                    }
                    let other = response[nidx];
                    if other > value || (other == value && nidx < idx) {
                        is_max = false;
                        break 'nms;
                    }
                }
            }
            if !is_max {
                continue;
            }

            let (mut sx, mut sy, mut sw) = (0.0f64, 0.0f64, 0.0f64);
            for ny in (y - 2).max(0)..=(y + 2).min(rows_i - 1) {
                for nx in (x - 2).max(0)..=(x + 2).min(cols_i - 1) {
                    let w = response[(ny * cols_i + nx) as usize].max(0.0) as f64;
                    sx += w * nx as f64;
                    sy += w * ny as f64;
                    sw += w;
                }
            }
            peaks.push([sx / sw, sy / sw]);
        }
    }

    peaks
}

#[derive(Clone, Copy)]
struct LatticeNode {
    index: usize,
    u: [f64; 2],
    v: [f64; 2],
}

fn sub(a: [f64; 2], b: [f64; 2]) -> [f64; 2] {
    [a[0] - b[0], a[1] - b[1]]
}

fn norm(a: [f64; 2]) -> f64 {
    a[0].hypot(a[1])
}

fn scale(a: [f64; 2], s: f64) -> [f64; 2] {
    [a[0] * s, a[1] * s]
}

/// Pick the two lattice directions at `seed` from its nearest neighbours.
fn seed_directions(points: &[[f64; 2]], seed: usize) -> Option<([f64; 2], [f64; 2])> {
    let mut neighbours = (0..points.len())
        .filter(|&k| k != seed)
        .map(|k| (norm(sub(points[k], points[seed])), k))
        .collect::<Vec<_>>();
    neighbours.sort_by(|a, b| a.0.total_cmp(&b.0));
    neighbours.truncate(4);

    let &(len_u, first) = neighbours.first()?;
    if len_u <= f64::EPSILON {
        return None;
    }
    let u = sub(points[first], points[seed]);

    neighbours
        .iter()
        .skip(1)
        .filter_map(|&(len_v, k)| {
            let v = sub(points[k], points[seed]);
            let cos = (u[0] * v[0] + u[1] * v[1]) / (len_u * len_v);
            let ratio = len_v / len_u;
            (cos.abs() < 0.5 && (0.5..=2.0).contains(&ratio)).then_some((cos.abs(), v))
        })
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, v)| (u, v))
}

/// Grow a lattice from `seed` by predicting each neighbour from the local steps.
fn grow_lattice(
    points: &[[f64; 2]],
    seed: usize,
    tolerance: f64,
    limit: usize,
) -> Option<HashMap<(i64, i64), LatticeNode>> {
    let (u, v) = seed_directions(points, seed)?;
    let mut used = vec![false; points.len()];
    let mut grid = HashMap::new();
    let mut queue = VecDeque::new();

    grid.insert((0, 0), LatticeNode { index: seed, u, v });
    used[seed] = true;
    queue.push_back((0i64, 0i64));

    while let Some(cell) = queue.pop_front() {
        let node = grid[&cell];
        for (di, dj) in [(1i64, 0i64), (-1, 0), (0, 1), (0, -1)] {
            let target = (cell.0 + di, cell.1 + dj);
            if grid.contains_key(&target) {
                continue;
            }
            let step = if di != 0 {
                scale(node.u, di as f64)
            } else {
                scale(node.v, dj as f64)
            };
            let origin = points[node.index];
            let predicted = [origin[0] + step[0], origin[1] + step[1]];
            let radius = tolerance * norm(step);

            let found = (0..points.len())
                .filter(|&k| !used[k])
                .map(|k| (norm(sub(points[k], predicted)), k))
                .filter(|&(d, _)| d < radius)
                .min_by(|a, b| a.0.total_cmp(&b.0));
            let Some((_, k)) = found else {
                continue;
            };

            let actual = sub(points[k], origin);
            let (mut new_u, mut new_v) = if di != 0 {
                (scale(actual, di as f64), node.v)
            } else {
                (node.u, scale(actual, dj as f64))
            };
            // prefer a measured step along the other axis when a neighbour exists
            if di != 0 {
                if let Some(n) = grid.get(&(target.0, target.1 - 1)) {
                    new_v = sub(points[k], points[n.index]);
                } else if let Some(n) = grid.get(&(target.0, target.1 + 1)) {
                    new_v = sub(points[n.index], points[k]);
                }
            } else if let Some(n) = grid.get(&(target.0 - 1, target.1)) {
                new_u = sub(points[k], points[n.index]);
            } else if let Some(n) = grid.get(&(target.0 + 1, target.1)) {
                new_u = sub(points[n.index], points[k]);
            }

            used[k] = true;
            grid.insert(
                target,
                LatticeNode {
                    index: k,
                    u: new_u,
                    v: new_v,
                },
            );
            if grid.len() > limit {
                return None;
            }
            queue.push_back(target);
        }
    }

    Some(grid)
}

/// Order a complete lattice row-major from the top-left corner.
fn order_lattice(
    points: &[[f64; 2]],
    grid: &HashMap<(i64, i64), LatticeNode>,
    pattern: PatternSize,
) -> Option<Vec<[f64; 2]>> {
    let imin = grid.keys().map(|c| c.0).min()?;
    let imax = grid.keys().map(|c| c.0).max()?;
    let jmin = grid.keys().map(|c| c.1).min()?;
    let jmax = grid.keys().map(|c| c.1).max()?;
    let ni = (imax - imin + 1) as usize;
    let nj = (jmax - jmin + 1) as usize;

    if grid.len() != pattern.count() || ni * nj != pattern.count() {
        return None;
    }
    if !((ni, nj) == (pattern.width, pattern.height) || (ni, nj) == (pattern.height, pattern.width))
    {
        return None;
    }

    let at = |i: i64, j: i64| -> Option<[f64; 2]> { grid.get(&(i, j)).map(|n| points[n.index]) };
    let mean_step = |along_i: bool| -> Option<[f64; 2]> {
        let mut acc = [0.0, 0.0];
        let mut count = 0.0;
        for (&(i, j), node) in grid.iter() {
            let next = if along_i { at(i + 1, j) } else { at(i, j + 1) };
            if let Some(q) = next {
                let d = sub(q, points[node.index]);
                acc = [acc[0] + d[0], acc[1] + d[1]];
                count += 1.0;
            }
        }
        (count > 0.0).then(|| scale(acc, 1.0 / count))
    };
    let step_i = mean_step(true)?;
    let step_j = mean_step(false)?;

    // the column index runs along the axis with `pattern.width` nodes
    let columns_along_i = if pattern.width != pattern.height {
        ni == pattern.width
    } else {
        step_i[0].abs() >= step_j[0].abs()
    };
    let (col_step, row_step) = if columns_along_i {
        (step_i, step_j)
    } else {
        (step_j, step_i)
    };
    let flip_col = col_step[0] < 0.0;
    let flip_row = row_step[1] < 0.0;

    let mut ordered = Vec::with_capacity(pattern.count());
    for r in 0..pattern.height {
        for c in 0..pattern.width {
            let c = (if flip_col { pattern.width - 1 - c } else { c }) as i64;
            let r = (if flip_row { pattern.height - 1 - r } else { r }) as i64;
            let (i, j) = if columns_along_i {
                (imin + c, jmin + r)
            } else {
                (imin + r, jmin + c)
            };
            ordered.push(at(i, j)?);
        }
    }

    Some(ordered)
}

/// Locate the interior corners of a chessboard at pixel accuracy.
///
/// Returns exactly `pattern.width * pattern.height` corners ordered row-major from the
/// top-left corner of the board, or `None` when the complete pattern is not visible.
pub fn find_chessboard_corners<T: ImageDtype>(
    image: &Image<T, 1>,
    pattern: PatternSize,
    params: &ChessboardParams,
) -> Option<Vec<[f64; 2]>> {
    if pattern.width < 2 || pattern.height < 2 {
        return None;
    }

    let response = chess_response(image);
    let peaks = response_peaks(&response, image.cols(), image.rows(), params);
    if peaks.len() < pattern.count() {
        return None;
    }

    let centroid = scale(
        peaks
            .iter()
            .fold([0.0, 0.0], |acc, p| [acc[0] + p[0], acc[1] + p[1]]),
        1.0 / peaks.len() as f64,
    );
    let mut seeds = (0..peaks.len()).collect::<Vec<_>>();
    seeds.sort_by(|&a, &b| norm(sub(peaks[a], centroid)).total_cmp(&norm(sub(peaks[b], centroid))));

    seeds
        .into_iter()
        .take(params.max_seeds)
        .filter_map(|seed| grow_lattice(&peaks, seed, params.lattice_tolerance, pattern.count()))
        .find_map(|grid| order_lattice(&peaks, &grid, pattern))
}

/// Locate the chessboard and refine every corner to sub-pixel accuracy.
pub fn detect_chessboard<T: ImageDtype>(
    image: &Image<T, 1>,
    pattern: PatternSize,
    params: &ChessboardParams,
) -> Option<Vec<[f64; 2]>> {
    let mut corners = find_chessboard_corners(image, pattern, params)?;
    corner_subpix(image, &mut corners, &params.subpix);
    Some(corners)
}

#[cfg(test)]
mod tests {
    use super::*;
    use binocular_image::{ImageError, ImageSize};

    /// Render an axis-aligned board whose first interior corner is at `origin`.
    fn render_board(
        size: ImageSize,
        pattern: PatternSize,
        square: f64,
        origin: [f64; 2],
        angle: f64,
    ) -> Result<Image<u8, 1>, ImageError> {
        let samples = 4;
        let (ca, sa) = (angle.cos(), angle.sin());
        let mut data = vec![255u8; size.area()];
        for y in 0..size.height {
            for x in 0..size.width {
                let mut acc = 0u32;
                for sy in 0..samples {
                    for sx in 0..samples {
                        let u = x as f64 + (sx as f64 + 0.5) / samples as f64 - 0.5 - origin[0];
                        let v = y as f64 + (sy as f64 + 0.5) / samples as f64 - 0.5 - origin[1];
                        // board coordinates in squares, interior corners on integers
                        let bu = (ca * u + sa * v) / square + 1.0;
                        let bv = (-sa * u + ca * v) / square + 1.0;
                        let inside = bu >= 0.0
                            && bv >= 0.0
                            && bu < (pattern.width + 1) as f64
                            && bv < (pattern.height + 1) as f64;
                        let black = inside && (bu.floor() as i64 + bv.floor() as i64) % 2 == 0;
                        if !black {
                            acc += 255;
                        }
                    }
                }
                data[y * size.width + x] = (acc / (samples * samples) as u32) as u8;
            }
        }
        Image::new(size, data)
    }

    fn expected_corners(pattern: PatternSize, square: f64, origin: [f64; 2], angle: f64) -> Vec<[f64; 2]> {
        let (ca, sa) = (angle.cos(), angle.sin());
        let mut out = Vec::new();
        for r in 0..pattern.height {
            for c in 0..pattern.width {
                let (bu, bv) = (c as f64 * square, r as f64 * square);
                out.push([origin[0] + ca * bu - sa * bv, origin[1] + sa * bu + ca * bv]);
            }
        }
        out
    }

    #[test]
    fn detect_axis_aligned_board() -> Result<(), ImageError> {
        let pattern = PatternSize {
            width: 7,
            height: 5,
        };
        let size = ImageSize {
            width: 320,
            height: 240,
        };
        let origin = [60.3, 50.7];
        let image = render_board(size, pattern, 30.0, origin, 0.0)?;
        let params = ChessboardParams::default();

        let coarse = find_chessboard_corners(&image, pattern, &params).expect("coarse corners");
        let refined = detect_chessboard(&image, pattern, &params).expect("refined corners");
        let expected = expected_corners(pattern, 30.0, origin, 0.0);

        assert_eq!(refined.len(), pattern.count());
        for ((c, r), e) in coarse.iter().zip(&refined).zip(&expected) {
            assert!(norm(sub(*r, *c)) < 2.0);
            assert!(norm(sub(*r, *e)) < 0.15, "refined {:?} expected {:?}", r, e);
        }
        Ok(())
    }

    #[test]
    fn detect_rotated_board_row_major() -> Result<(), ImageError> {
        let pattern = PatternSize {
            width: 6,
            height: 4,
        };
        let size = ImageSize {
            width: 320,
            height: 240,
        };
        let origin = [90.0, 60.0];
        let angle = 0.2;
        let image = render_board(size, pattern, 28.0, origin, angle)?;

        let corners =
            detect_chessboard(&image, pattern, &ChessboardParams::default()).expect("corners");
        let expected = expected_corners(pattern, 28.0, origin, angle);
        for (r, e) in corners.iter().zip(&expected) {
            assert!(norm(sub(*r, *e)) < 0.2, "refined {:?} expected {:?}", r, e);
        }
        Ok(())
    }

    #[test]
    fn blank_image_not_found() -> Result<(), ImageError> {
        let image = Image::<u8, 1>::from_size_val([160, 120].into(), 200)?;
        let pattern = PatternSize {
            width: 5,
            height: 4,
        };
        assert!(find_chessboard_corners(&image, pattern, &ChessboardParams::default()).is_none());
        Ok(())
    }

    #[test]
    fn occluded_board_not_found() -> Result<(), ImageError> {
        let pattern = PatternSize {
            width: 7,
            height: 5,
        };
        let size = ImageSize {
            width: 320,
            height: 240,
        };
        let mut image = render_board(size, pattern, 30.0, [60.0, 50.0], 0.0)?;
        // cover the right third of the board
        for y in 0..size.height {
            for x in 200..size.width {
                image.set_pixel(x, y, 0, 255)?;
            }
        }
        assert!(detect_chessboard(&image, pattern, &ChessboardParams::default()).is_none());
        Ok(())
    }

    #[test]
    fn wrong_pattern_size_not_found() -> Result<(), ImageError> {
        let pattern = PatternSize {
            width: 7,
            height: 5,
        };
        let size = ImageSize {
            width: 320,
            height: 240,
        };
        let image = render_board(size, pattern, 30.0, [60.0, 50.0], 0.0)?;
        let other = PatternSize {
            width: 6,
            height: 5,
        };
        assert!(find_chessboard_corners(&image, other, &ChessboardParams::default()).is_none());
        Ok(())
    }

    #[test]
    fn response_peaks_at_saddle() -> Result<(), ImageError> {
        let pattern = PatternSize {
            width: 2,
            height: 2,
        };
        let image = render_board([80, 80].into(), pattern, 20.0, [30.0, 30.0], 0.0)?;
        let response = chess_response(&image);
        let at = |x: usize, y: usize| response[y * 80 + x];
        assert!(at(30, 30) > 1000.0);
        // flat region and straight edge respond weakly
        assert!(at(5, 5) <= 0.0);
        assert!(at(30, 20) < at(30, 30) * 0.1);
        Ok(())
    }
}
