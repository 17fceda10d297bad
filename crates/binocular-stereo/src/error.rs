use binocular_image::ImageError;

/// An error type for the stereo module.
#[derive(thiserror::Error, Debug)]
pub enum StereoError {
    /// Error from an image operation.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// A matcher or filter parameter is out of its valid range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Two images that must have the same size do not.
    #[error("Image size mismatch: {0}x{1} vs {2}x{3}")]
    SizeMismatch(usize, usize, usize, usize),

    /// Writing an export failed.
    #[error("Failed to write point cloud")]
    Io(#[from] std::io::Error),
}
