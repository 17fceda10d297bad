use crate::disparity::DisparityMap;

/// Invalidate small connected blobs of a disparity map.
///
/// Two 4-connected pixels belong to the same blob when their fixed-point values differ
/// by at most `max_diff`. Blobs of at most `max_speckle_size` pixels are set to the
/// map's invalid value. Invalid pixels never join a blob.
///
/// # Arguments
///
/// * `disparity` - The map to filter in place.
/// * `max_speckle_size` - Largest blob size, in pixels, that is removed.
/// * `max_diff` - Largest fixed-point step between neighbours of one blob.
///
/// Returns the number of invalidated pixels.
pub fn filter_speckles(disparity: &mut DisparityMap, max_speckle_size: usize, max_diff: i32) -> usize {
    if max_speckle_size == 0 {
        return 0;
    }
    let invalid = disparity.invalid_value();
    let (width, height) = (disparity.size().width, disparity.size().height);
    let data = disparity.as_slice_mut();

    // 0: unvisited, otherwise 1 + index of the blob
    let mut labels = vec![0u32; width * height];
    let mut small_blob = Vec::<bool>::new();
    let mut stack = Vec::new();
    let mut removed = 0;

    for start in 0..width * height {
        if data[start] == invalid {
            continue;
        }
        if labels[start] != 0 {
            if small_blob[labels[start] as usize - 1] {
                data[start] = invalid;
            }
            continue;
        }

        let label = small_blob.len() as u32 + 1;
        labels[start] = label;
        stack.push(start);
        let mut count = 0usize;

        while let Some(p) = stack.pop() {
            count += 1;
            let value = data[p] as i32;
            let (x, y) = (p % width, p / width);

            let mut visit = |q: usize| {
                let dq = data[q];
                if labels[q] == 0 && dq != invalid && (dq as i32 - value).abs() <= max_diff {
                    labels[q] = label;
                    stack.push(q);
                }
            };
            if x + 1 < width {
                visit(p + 1);
            }
            if x > 0 {
                visit(p - 1);
            }
            if y + 1 < height {
                visit(p + width);
            }
            if y > 0 {
                visit(p - width);
            }
        }

        let is_small = count <= max_speckle_size;
        small_blob.push(is_small);
        if is_small {
            data[start] = invalid;
            removed += count;
        }
    }

    removed
}
