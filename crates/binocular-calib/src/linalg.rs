/// The 3x3 identity matrix.
pub const IDENTITY33: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// Multiply two 3x3 matrices.
pub fn matmul33(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut m = [[0.0; 3]; 3];
    for (i, row) in m.iter_mut().enumerate() {
        for (j, val) in row.iter_mut().enumerate() {
            *val = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
        }
    }
    m
}

/// Transpose a 3x3 matrix.
pub fn transpose33(a: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    [
        [a[0][0], a[1][0], a[2][0]],
        [a[0][1], a[1][1], a[2][1]],
        [a[0][2], a[1][2], a[2][2]],
    ]
}

/// Multiply a 3x3 matrix by a 3-vector.
pub fn mat33_vec3(a: &[[f64; 3]; 3], v: &[f64; 3]) -> [f64; 3] {
    [
        a[0][0] * v[0] + a[0][1] * v[1] + a[0][2] * v[2],
        a[1][0] * v[0] + a[1][1] * v[1] + a[1][2] * v[2],
        a[2][0] * v[0] + a[2][1] * v[1] + a[2][2] * v[2],
    ]
}

/// Determinant of a 3x3 matrix.
pub fn det33(a: &[[f64; 3]; 3]) -> f64 {
    a[0][0] * (a[1][1] * a[2][2] - a[1][2] * a[2][1])
        - a[0][1] * (a[1][0] * a[2][2] - a[1][2] * a[2][0])
        + a[0][2] * (a[1][0] * a[2][1] - a[1][1] * a[2][0])
}

/// Inverse of a 3x3 matrix, `None` when it is singular.
pub fn inverse33(a: &[[f64; 3]; 3]) -> Option<[[f64; 3]; 3]> {
    let det = det33(a);
    if det.abs() < f64::EPSILON || !det.is_finite() {
        return None;
    }
    let inv_det = 1.0 / det;
    Some([
        [
            (a[1][1] * a[2][2] - a[1][2] * a[2][1]) * inv_det,
            (a[0][2] * a[2][1] - a[0][1] * a[2][2]) * inv_det,
            (a[0][1] * a[1][2] - a[0][2] * a[1][1]) * inv_det,
        ],
        [
            (a[1][2] * a[2][0] - a[1][0] * a[2][2]) * inv_det,
            (a[0][0] * a[2][2] - a[0][2] * a[2][0]) * inv_det,
            (a[0][2] * a[1][0] - a[0][0] * a[1][2]) * inv_det,
        ],
        [
            (a[1][0] * a[2][1] - a[1][1] * a[2][0]) * inv_det,
            (a[0][1] * a[2][0] - a[0][0] * a[2][1]) * inv_det,
            (a[0][0] * a[1][1] - a[0][1] * a[1][0]) * inv_det,
        ],
    ])
}

/// Cross product of two 3-vectors.
pub fn cross3(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Dot product of two 3-vectors.
pub fn dot3(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Euclidean norm of a 3-vector.
pub fn norm3(a: &[f64; 3]) -> f64 {
    dot3(a, a).sqrt()
}

/// The cross product matrix `[v]x` such that `[v]x * w = v x w`.
pub fn skew3(v: &[f64; 3]) -> [[f64; 3]; 3] {
    [[0.0, -v[2], v[1]], [v[2], 0.0, -v[0]], [-v[1], v[0], 0.0]]
}

/// Convert an axis-angle (Rodrigues) vector to a rotation matrix.
pub fn rodrigues(rvec: &[f64; 3]) -> [[f64; 3]; 3] {
    let theta = norm3(rvec);
    let k = skew3(rvec);
    let k2 = matmul33(&k, &k);

    // first order expansion near the identity
    let (a, b) = if theta < 1e-12 {
        (1.0, 0.5)
    } else {
        (theta.sin() / theta, (1.0 - theta.cos()) / (theta * theta))
    };

    let mut r = IDENTITY33;
    for i in 0..3 {
        for j in 0..3 {
            r[i][j] += a * k[i][j] + b * k2[i][j];
        }
    }
    r
}

/// Convert a rotation matrix to an axis-angle (Rodrigues) vector.
pub fn rodrigues_inverse(r: &[[f64; 3]; 3]) -> [f64; 3] {
    let rx = r[2][1] - r[1][2];
    let ry = r[0][2] - r[2][0];
    let rz = r[1][0] - r[0][1];
    let s = (rx * rx + ry * ry + rz * rz).sqrt() * 0.5;
    let c = ((r[0][0] + r[1][1] + r[2][2] - 1.0) * 0.5).clamp(-1.0, 1.0);

    if s < 1e-8 {
        if c > 0.0 {
            return [rx * 0.5, ry * 0.5, rz * 0.5];
        }

        // rotation by pi: recover the axis from (R + I) / 2 = k k^T
        let t = [
            ((r[0][0] + 1.0) * 0.5).max(0.0).sqrt(),
            ((r[1][1] + 1.0) * 0.5).max(0.0).sqrt(),
            ((r[2][2] + 1.0) * 0.5).max(0.0).sqrt(),
        ];
        let mut axis = t;
        if r[0][1] < 0.0 {
            axis[1] = -axis[1];
        }
        if r[0][2] < 0.0 {
            axis[2] = -axis[2];
        }
        if axis[0].abs() < axis[1].abs()
            && axis[0].abs() < axis[2].abs()
            && (r[1][2] > 0.0) != (axis[1] * axis[2] > 0.0)
        {
            axis[2] = -axis[2];
        }
        let n = norm3(&axis);
        let scale = std::f64::consts::PI / n;
        return [axis[0] * scale, axis[1] * scale, axis[2] * scale];
    }

    let theta = s.atan2(c);
    let scale = theta / (2.0 * s);
    [rx * scale, ry * scale, rz * scale]
}

/// Singular value decomposition of a 3x3 matrix: `a = u * diag(s) * v^T`.
///
/// Singular values are sorted in decreasing order.
pub fn svd33(a: &[[f64; 3]; 3]) -> ([[f64; 3]; 3], [f64; 3], [[f64; 3]; 3]) {
    let mat = faer::Mat::<f64>::from_fn(3, 3, |i, j| a[i][j]);
    let svd = mat.svd();
    let (u_ref, v_ref, s_ref) = (svd.u(), svd.v(), svd.s_diagonal());

    let mut u = [[0.0; 3]; 3];
    let mut v = [[0.0; 3]; 3];
    let mut s = [0.0; 3];
    for i in 0..3 {
        s[i] = s_ref.read(i);
        for j in 0..3 {
            u[i][j] = u_ref.read(i, j);
            v[i][j] = v_ref.read(i, j);
        }
    }
    (u, s, v)
}

/// The rotation matrix closest to `a` in the Frobenius norm.
pub fn closest_rotation(a: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let (u, _, v) = svd33(a);
    let mut r = matmul33(&u, &transpose33(&v));
    if det33(&r) < 0.0 {
        let mut u_flip = u;
        for row in u_flip.iter_mut() {
            row[2] = -row[2];
        }
        r = matmul33(&u_flip, &transpose33(&v));
    }
    r
}

/// Component-wise median of a set of 3-vectors.
pub fn median3(values: &[[f64; 3]]) -> Option<[f64; 3]> {
    if values.is_empty() {
        return None;
    }
    let mut out = [0.0; 3];
    for (k, o) in out.iter_mut().enumerate() {
        let mut column = values.iter().map(|v| v[k]).collect::<Vec<_>>();
        column.sort_by(|a, b| a.total_cmp(b));
        let n = column.len();
        *o = if n % 2 == 1 {
            column[n / 2]
        } else {
            0.5 * (column[n / 2 - 1] + column[n / 2])
        };
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_mat_eq(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3], eps: f64) {
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(a[i][j], b[i][j], epsilon = eps);
            }
        }
    }

    #[test]
    fn test_inverse33() {
        let a = [[4.0, 7.0, 2.0], [3.0, 6.0, 1.0], [2.0, 5.0, 3.0]];
        let inv = inverse33(&a).expect("invertible");
        assert_mat_eq(&matmul33(&a, &inv), &IDENTITY33, 1e-12);
        assert!(inverse33(&[[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [0.0, 0.0, 1.0]]).is_none());
    }

    #[test]
    fn test_rodrigues_round_trip() {
        for rvec in [
            [0.1, -0.2, 0.3],
            [0.0, 0.0, 0.0],
            [1e-9, 0.0, -2e-9],
            [0.0, 2.5, 0.0],
            [-1.2, 0.4, 0.9],
        ] {
            let r = rodrigues(&rvec);
            assert_relative_eq!(det33(&r), 1.0, epsilon = 1e-12);
            assert_mat_eq(&matmul33(&r, &transpose33(&r)), &IDENTITY33, 1e-12);
            let back = rodrigues_inverse(&r);
            for k in 0..3 {
                assert_relative_eq!(back[k], rvec[k], epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_rodrigues_pi() {
        let rvec = [0.0, std::f64::consts::PI, 0.0];
        let back = rodrigues_inverse(&rodrigues(&rvec));
        assert_relative_eq!(norm3(&back), std::f64::consts::PI, epsilon = 1e-9);
        assert_relative_eq!(back[1].abs(), std::f64::consts::PI, epsilon = 1e-9);
    }

    #[test]
    fn test_rodrigues_z_rotation() {
        let angle = 0.3f64;
        let r = rodrigues(&[0.0, 0.0, angle]);
        let expected = [
            [angle.cos(), -angle.sin(), 0.0],
            [angle.sin(), angle.cos(), 0.0],
            [0.0, 0.0, 1.0],
        ];
        assert_mat_eq(&r, &expected, 1e-12);
    }

    #[test]
    fn test_closest_rotation() {
        let r = rodrigues(&[0.2, -0.1, 0.05]);
        let mut noisy = r;
        noisy[0][1] += 1e-3;
        noisy[2][0] -= 1e-3;
        let fixed = closest_rotation(&noisy);
        assert_relative_eq!(det33(&fixed), 1.0, epsilon = 1e-9);
        assert_mat_eq(&fixed, &r, 2e-3);
    }

    #[test]
    fn test_svd33_reconstructs() {
        let a = [[2.0, 0.5, 0.1], [0.3, 1.0, -0.4], [0.0, 0.2, 3.0]];
        let (u, s, v) = svd33(&a);
        assert!(s[0] >= s[1] && s[1] >= s[2]);
        let mut us = u;
        for row in us.iter_mut() {
            for (k, val) in row.iter_mut().enumerate() {
                *val *= s[k];
            }
        }
        assert_mat_eq(&matmul33(&us, &transpose33(&v)), &a, 1e-12);
    }

    #[test]
    fn test_cross_and_skew() {
        let a = [1.0, 2.0, 3.0];
        let b = [-2.0, 0.5, 4.0];
        let c = cross3(&a, &b);
        let d = mat33_vec3(&skew3(&a), &b);
        for k in 0..3 {
            assert_relative_eq!(c[k], d[k]);
        }
        assert_relative_eq!(dot3(&c, &a), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_median3() {
        let values = [[1.0, 5.0, -1.0], [3.0, 4.0, -2.0], [2.0, 6.0, 10.0]];
        assert_eq!(median3(&values), Some([2.0, 5.0, -1.0]));
        assert_eq!(median3(&[]), None);
    }
}
