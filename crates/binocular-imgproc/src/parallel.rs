use rayon::prelude::*;

use binocular_image::Image;

/// Apply a function to each pixel in the image in parallel.
pub fn par_iter_rows<T1, const C1: usize, T2, const C2: usize>(
    src: &Image<T1, C1>,
    dst: &mut Image<T2, C2>,
    f: impl Fn(&[T1], &mut [T2]) + Send + Sync,
) where
    T1: Clone + Send + Sync,
    T2: Clone + Send + Sync,
{
    let cols = src.cols();
    src.as_slice()
        .par_chunks_exact(C1 * cols)
        .zip(dst.as_slice_mut().par_chunks_exact_mut(C2 * cols))
        .for_each(|(src_chunk, dst_chunk)| {
            src_chunk
                .chunks_exact(C1)
                .zip(dst_chunk.chunks_exact_mut(C2))
                .for_each(|(src_pixel, dst_pixel)| {
                    f(src_pixel, dst_pixel);
                });
        });
}

/// Apply a function to each pixel for grid sampling in parallel.
pub fn par_iter_rows_resample<T, const C: usize>(
    dst: &mut Image<T, C>,
    map_x: &Image<f32, 1>,
    map_y: &Image<f32, 1>,
    f: impl Fn(&f32, &f32, &mut [T]) + Send + Sync,
) where
    T: Send + Sync,
{
    let cols = dst.cols();
    let map_x_slice = map_x.as_slice();
    let map_y_slice = map_y.as_slice();

    dst.as_slice_mut()
        .par_chunks_exact_mut(C * cols)
        .zip(map_x_slice.par_chunks_exact(cols))
        .zip(map_y_slice.par_chunks_exact(cols))
        .for_each(|((dst_chunk, map_x_chunk), map_y_chunk)| {
            dst_chunk
                .chunks_exact_mut(C)
                .zip(map_x_chunk.iter().zip(map_y_chunk.iter()))
                .for_each(|(dst_pixel, (x, y))| {
                    f(x, y, dst_pixel);
                });
        });
}

/// Fill two coordinate grids of the same size in parallel from a per-pixel function.
///
/// The closure receives the column and row of the destination pixel.
pub fn par_fill_grid(
    map_x: &mut Image<f32, 1>,
    map_y: &mut Image<f32, 1>,
    f: impl Fn(usize, usize) -> (f32, f32) + Send + Sync,
) {
    let cols = map_x.cols();
    map_x
        .as_slice_mut()
        .par_chunks_exact_mut(cols)
        .zip(map_y.as_slice_mut().par_chunks_exact_mut(cols))
        .enumerate()
        .for_each(|(row, (xs, ys))| {
            xs.iter_mut()
                .zip(ys.iter_mut())
                .enumerate()
                .for_each(|(col, (x, y))| {
                    let (u, v) = f(col, row);
                    *x = u;
                    *y = v;
                });
        });
}
