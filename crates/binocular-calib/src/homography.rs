use crate::error::CalibError;
use crate::linalg;

/// Similarity transform that moves the centroid to the origin and scales the mean
/// distance to sqrt(2).
fn normalization_transform(points: &[[f64; 2]]) -> [[f64; 3]; 3] {
    let n = points.len() as f64;
    let (mx, my) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p[0], sy + p[1]));
    let (mx, my) = (mx / n, my / n);
    let mean_dist = points
        .iter()
        .map(|p| (p[0] - mx).hypot(p[1] - my))
        .sum::<f64>()
        / n;
    let s = if mean_dist > f64::EPSILON {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    [[s, 0.0, -s * mx], [0.0, s, -s * my], [0.0, 0.0, 1.0]]
}

fn apply(t: &[[f64; 3]; 3], p: &[f64; 2]) -> [f64; 2] {
    [
        t[0][0] * p[0] + t[0][1] * p[1] + t[0][2],
        t[1][0] * p[0] + t[1][1] * p[1] + t[1][2],
    ]
}

/// Compute the homography mapping `src` to `dst` with the normalized DLT.
///
/// Both point sets are conditioned before building the `2n x 9` system, whose null
/// vector is taken from the last column of `V` in its SVD. The result is scaled so that
/// `H[2][2] = 1`.
///
/// # Arguments
///
/// * `src` - The source 2d points with shape (N, 2), N >= 4.
/// * `dst` - The destination 2d points with shape (N, 2).
///
/// # Errors
///
/// Returns an error if fewer than 4 correspondences are given or the estimate is singular.
pub fn find_homography_dlt(src: &[[f64; 2]], dst: &[[f64; 2]]) -> Result<[[f64; 3]; 3], CalibError> {
    if src.len() != dst.len() {
        return Err(CalibError::MismatchedLengths("points", src.len(), dst.len()));
    }
    if src.len() < 4 {
        return Err(CalibError::InsufficientPoints(0, src.len(), 4));
    }

    let t_src = normalization_transform(src);
    let t_dst = normalization_transform(dst);

    // construct matrix A
    let n = src.len();
    let mut mat_a = faer::Mat::<f64>::zeros(2 * n, 9);
    for i in 0..n {
        let x1 = apply(&t_src, &src[i]);
        let x2 = apply(&t_dst, &dst[i]);

        mat_a.write(2 * i, 0, x1[0]);
        mat_a.write(2 * i, 1, x1[1]);
        mat_a.write(2 * i, 2, 1.0);
        mat_a.write(2 * i, 6, -x2[0] * x1[0]);
        mat_a.write(2 * i, 7, -x2[0] * x1[1]);
        mat_a.write(2 * i, 8, -x2[0]);

        mat_a.write(2 * i + 1, 3, x1[0]);
        mat_a.write(2 * i + 1, 4, x1[1]);
        mat_a.write(2 * i + 1, 5, 1.0);
        mat_a.write(2 * i + 1, 6, -x2[1] * x1[0]);
        mat_a.write(2 * i + 1, 7, -x2[1] * x1[1]);
        mat_a.write(2 * i + 1, 8, -x2[1]);
    }

    // take the right singular vector of the smallest singular value
    let svd = mat_a.svd();
    let h = svd.v().col(8);
    let h_norm = [
        [h.read(0), h.read(1), h.read(2)],
        [h.read(3), h.read(4), h.read(5)],
        [h.read(6), h.read(7), h.read(8)],
    ];

    // denormalize: H = T_dst^-1 * Hn * T_src
    let t_dst_inv = linalg::inverse33(&t_dst)
        .ok_or_else(|| CalibError::Degenerate("degenerate point normalization".into()))?;
    let mut homo = linalg::matmul33(&t_dst_inv, &linalg::matmul33(&h_norm, &t_src));

    if homo[2][2].abs() < f64::EPSILON || linalg::det33(&homo).abs() < 1e-12 {
        return Err(CalibError::Degenerate("singular homography".into()));
    }
    let scale = 1.0 / homo[2][2];
    for row in homo.iter_mut() {
        for val in row.iter_mut() {
            *val *= scale;
        }
    }

    Ok(homo)
}

/// Map a point with a homography.
pub fn apply_homography(homo: &[[f64; 3]; 3], p: &[f64; 2]) -> [f64; 2] {
    let w = homo[2][0] * p[0] + homo[2][1] * p[1] + homo[2][2];
    [
        (homo[0][0] * p[0] + homo[0][1] * p[1] + homo[0][2]) / w,
        (homo[1][0] * p[0] + homo[1][1] * p[1] + homo[1][2]) / w,
    ]
}
