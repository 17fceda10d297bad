#![allow(dead_code)]

use binocular_calib::{linalg, IntrinsicModel};
use binocular_image::{Image, ImageError, ImageSize};
use binocular_imgproc::calibration::{distortion::PolynomialDistortion, CameraIntrinsic};
use binocular_pipeline::BoardSpec;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// A pinhole stereo rig; `rotation` and `translation` map left camera points to the
/// right camera.
pub struct Rig {
    pub left: IntrinsicModel,
    pub right: IntrinsicModel,
    pub rotation: [[f64; 3]; 3],
    pub translation: [f64; 3],
    pub size: ImageSize,
}

impl Rig {
    pub fn new() -> Self {
        let camera = |fx: f64, cx: f64| IntrinsicModel {
            camera: CameraIntrinsic {
                fx,
                fy: fx,
                cx,
                cy: 149.5,
            },
            distortion: PolynomialDistortion::default(),
        };
        Self {
            left: camera(400.0, 199.5),
            right: camera(400.0, 201.0),
            rotation: linalg::rodrigues(&[0.0, 0.01, 0.0]),
            translation: [-0.06, 0.0, 0.0],
            size: ImageSize {
                width: 400,
                height: 300,
            },
        }
    }

    /// Pose of a plane in the right camera from its pose in the left camera.
    pub fn right_pose(&self, rotation: &[[f64; 3]; 3], translation: &[f64; 3]) -> ([[f64; 3]; 3], [f64; 3]) {
        let r = linalg::matmul33(&self.rotation, rotation);
        let t = linalg::mat33_vec3(&self.rotation, translation);
        (
            r,
            [
                t[0] + self.translation[0],
                t[1] + self.translation[1],
                t[2] + self.translation[2],
            ],
        )
    }

    /// Render both cameras into one side-by-side frame.
    pub fn render_frame(
        &self,
        rotation: &[[f64; 3]; 3],
        translation: &[f64; 3],
        shade: &dyn Fn(f64, f64) -> u8,
    ) -> Result<Image<u8, 3>, ImageError> {
        let left = render_plane(&self.left, self.size, rotation, translation, shade);
        let (r, t) = self.right_pose(rotation, translation);
        let right = render_plane(&self.right, self.size, &r, &t, shade);

        let row = self.size.width * 3;
        let mut data = Vec::with_capacity(left.len() * 2);
        for y in 0..self.size.height {
            data.extend_from_slice(&left[y * row..(y + 1) * row]);
            data.extend_from_slice(&right[y * row..(y + 1) * row]);
        }
        Image::new([self.size.width * 2, self.size.height].into(), data)
    }
}

/// Render the `z = 0` plane of a frame posed at `(rotation, translation)` in the camera.
///
/// `shade` gives the intensity at plane coordinates. A pixel is first sampled on a 3x3
/// grid through its corners and center; if the samples differ it is integrated with
/// 16x16 samples, so edges are placed to a small fraction of a pixel.
pub fn render_plane(
    model: &IntrinsicModel,
    size: ImageSize,
    rotation: &[[f64; 3]; 3],
    translation: &[f64; 3],
    shade: &dyn Fn(f64, f64) -> u8,
) -> Vec<u8> {
    const FINE: usize = 16;
    let cam = &model.camera;
    let rt = linalg::transpose33(rotation);
    // camera center in plane coordinates
    let t = linalg::mat33_vec3(&rt, translation);
    let origin = [-t[0], -t[1], -t[2]];
    let sample = |u: f64, v: f64| -> u32 {
        let ray = [(u - cam.cx) / cam.fx, (v - cam.cy) / cam.fy, 1.0];
        let dir = linalg::mat33_vec3(&rt, &ray);
        let s = -origin[2] / dir[2];
        if s > 0.0 {
            shade(origin[0] + s * dir[0], origin[1] + s * dir[1]) as u32
        } else {
            255
        }
    };

    let mut data = vec![255u8; size.area() * 3];
    for y in 0..size.height {
        for x in 0..size.width {
            let (xf, yf) = (x as f64, y as f64);
            let first = sample(xf, yf);
            let uniform = [-0.5, 0.0, 0.5]
                .iter()
                .all(|dv| [-0.5, 0.0, 0.5].iter().all(|du| sample(xf + du, yf + dv) == first));
            let value = if uniform {
                first
            } else {
                let mut acc = 0u32;
                for sy in 0..FINE {
                    for sx in 0..FINE {
                        let u = xf + (sx as f64 + 0.5) / FINE as f64 - 0.5;
                        let v = yf + (sy as f64 + 0.5) / FINE as f64 - 0.5;
                        acc += sample(u, v);
                    }
                }
                let n = (FINE * FINE) as u32;
                (acc + n / 2) / n
            };
            let i = (y * size.width + x) * 3;
            data[i..i + 3].fill(value as u8);
        }
    }
    data
}

/// Chessboard shading; interior corners sit at multiples of the square size.
pub fn board_shade(board: BoardSpec) -> impl Fn(f64, f64) -> u8 {
    move |bx, by| {
        let bu = bx / board.square_size + 1.0;
        let bv = by / board.square_size + 1.0;
        let inside = bu >= 0.0 && bv >= 0.0 && bu < (board.width + 1) as f64 && bv < (board.height + 1) as f64;
        if inside && (bu.floor() as i64 + bv.floor() as i64) % 2 == 0 {
            0
        } else {
            255
        }
    }
}

/// Random blocks of `cell` side, fixed by `seed`.
pub fn texture_shade(cell: f64, seed: u64) -> impl Fn(f64, f64) -> u8 {
    const N: usize = 512;
    let mut rng = StdRng::seed_from_u64(seed);
    let table: Vec<u8> = (0..N * N).map(|_| rng.random_range(0..=255u8)).collect();
    move |px, py| {
        let i = ((px / cell).floor() as i64).rem_euclid(N as i64) as usize;
        let j = ((py / cell).floor() as i64).rem_euclid(N as i64) as usize;
        table[j * N + i]
    }
}

/// Board poses in the left camera, each centering the board slightly right of the
/// optical axis so both cameras see it whole. Tilts of up to 0.3 rad and vertical
/// offsets spread the corners over the image.
pub fn board_poses(board: &BoardSpec) -> Vec<([[f64; 3]; 3], [f64; 3])> {
    let center = [
        (board.width - 1) as f64 * board.square_size / 2.0,
        (board.height - 1) as f64 * board.square_size / 2.0,
        0.0,
    ];
    [
        ([0.3, 0.0, 0.0], [0.0, 0.0, 0.50]),
        ([-0.3, 0.0, 0.0], [0.0, 0.0, 0.52]),
        ([0.0, 0.3, 0.0], [0.0, 0.0, 0.48]),
        ([0.0, -0.3, 0.0], [0.0, 0.0, 0.50]),
        ([0.2, 0.2, 0.05], [0.0, 0.0, 0.55]),
        ([-0.2, 0.2, -0.05], [0.0, 0.0, 0.47]),
        ([0.2, -0.2, 0.1], [0.0, 0.0, 0.53]),
        ([-0.2, -0.25, 0.0], [0.0, 0.0, 0.50]),
        ([0.15, 0.0, 0.0], [0.0, 0.025, 0.50]),
        ([-0.15, 0.0, 0.0], [0.0, -0.025, 0.50]),
        ([0.0, 0.15, 0.1], [0.005, 0.02, 0.52]),
        ([0.1, -0.15, -0.1], [-0.005, -0.02, 0.49]),
    ]
    .iter()
    .map(|(rvec, offset)| {
        let r = linalg::rodrigues(rvec);
        let c = linalg::mat33_vec3(&r, &center);
        (
            r,
            [0.03 + offset[0] - c[0], offset[1] - c[1], offset[2] - c[2]],
        )
    })
    .collect()
}
