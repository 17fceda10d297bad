/// image distortion module.
pub mod distortion;

/// chessboard pattern detection.
pub mod chessboard;

/// sub-pixel corner refinement.
pub mod subpix;

/// Represents the intrinsic parameters of a pinhole camera
///
/// # Fields
///
/// * `fx` - The focal length in the x direction
/// * `fy` - The focal length in the y direction
/// * `cx` - The x coordinate of the principal point
/// * `cy` - The y coordinate of the principal point
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraIntrinsic {
    /// The focal length in the x direction
    pub fx: f64,
    /// The focal length in the y direction
    pub fy: f64,
    /// The x coordinate of the principal point
    pub cx: f64,
    /// The y coordinate of the principal point
    pub cy: f64,
}

impl CameraIntrinsic {
    /// The 3x3 camera matrix `[[fx, 0, cx], [0, fy, cy], [0, 0, 1]]`.
    pub fn k_matrix(&self) -> [[f64; 3]; 3] {
        [
            [self.fx, 0.0, self.cx],
            [0.0, self.fy, self.cy],
            [0.0, 0.0, 1.0],
        ]
    }

    /// Read the focal lengths and principal point from a camera matrix.
    ///
    /// The skew term and the last row are ignored.
    pub fn from_k_matrix(k: &[[f64; 3]; 3]) -> Self {
        Self {
            fx: k[0][0],
            fy: k[1][1],
            cx: k[0][2],
            cy: k[1][2],
        }
    }

    /// Pixel coordinates to normalized image coordinates.
    #[inline]
    pub fn normalize(&self, u: f64, v: f64) -> (f64, f64) {
        ((u - self.cx) / self.fx, (v - self.cy) / self.fy)
    }

    /// Normalized image coordinates to pixel coordinates.
    #[inline]
    pub fn denormalize(&self, x: f64, y: f64) -> (f64, f64) {
        (self.fx * x + self.cx, self.fy * y + self.cy)
    }
}

/// Represents the extrinsic parameters of a pinhole camera
///
/// # Fields
///
/// * `rotation` - The rotation matrix of the camera 3x3
/// * `translation` - The translation vector of the camera 3x1
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraExtrinsic {
    /// The rotation matrix of the camera 3x3
    pub rotation: [[f64; 3]; 3],
    /// The translation vector of the camera 3x1
    pub translation: [f64; 3],
}

impl Default for CameraExtrinsic {
    fn default() -> Self {
        Self {
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            translation: [0.0; 3],
        }
    }
}
