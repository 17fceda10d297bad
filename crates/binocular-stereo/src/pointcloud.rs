use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::StereoError;

/// A colored point cloud in the rectified left camera frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointCloud {
    points: Vec<[f32; 3]>,
    colors: Vec<[u8; 3]>,
}

impl PointCloud {
    /// Append a point and its rgb color.
    pub fn push(&mut self, point: [f32; 3], color: [u8; 3]) {
        self.points.push(point);
        self.colors.push(color);
    }

    /// The 3d points.
    pub fn points(&self) -> &[[f32; 3]] {
        &self.points
    }

    /// The rgb color of each point.
    pub fn colors(&self) -> &[[u8; 3]] {
        &self.colors
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// `true` if the cloud has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Write the cloud as text, one `x;y;z;r;g;b` line per point.
    pub fn write_xyz<W: Write>(&self, writer: W) -> Result<(), StereoError> {
        let mut writer = BufWriter::new(writer);
        for (p, c) in self.points.iter().zip(&self.colors) {
            writeln!(
                writer,
                "{:.6};{:.6};{:.6};{};{};{}",
                p[0], p[1], p[2], c[0], c[1], c[2]
            )?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the cloud to a text file, see [`PointCloud::write_xyz`].
    pub fn save_xyz(&self, path: impl AsRef<Path>) -> Result<(), StereoError> {
        let file = std::fs::File::create(path.as_ref())?;
        self.write_xyz(file)?;
        log::info!("wrote {} points to {}", self.len(), path.as_ref().display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_xyz_format() -> Result<(), StereoError> {
        let mut cloud = PointCloud::default();
        assert!(cloud.is_empty());
        cloud.push([0.5, -1.25, 3.0], [255, 0, 12]);
        cloud.push([0.0, 0.0, 1.0e4], [1, 2, 3]);

        let mut out = Vec::new();
        cloud.write_xyz(&mut out)?;
        let text = String::from_utf8(out).map_err(|e| StereoError::InvalidParameter(e.to_string()))?;
        assert_eq!(
            text,
            "0.500000;-1.250000;3.000000;255;0;12\n0.000000;0.000000;10000.000000;1;2;3\n"
        );
        Ok(())
    }

    #[test]
    fn test_save_xyz() -> Result<(), Box<dyn std::error::Error>> {
        let tmp_dir = tempfile::tempdir()?;
        let path = tmp_dir.path().join("cloud.xyz");

        let mut cloud = PointCloud::default();
        for i in 0..10 {
            cloud.push([i as f32, 0.0, 1.0], [i as u8; 3]);
        }
        cloud.save_xyz(&path)?;

        let text = std::fs::read_to_string(&path)?;
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[9], "9.000000;0.000000;1.000000;9;9;9");
        Ok(())
    }

    #[test]
    fn test_save_to_missing_directory_fails() {
        let cloud = PointCloud::default();
        let result = cloud.save_xyz("/nonexistent-dir/cloud.xyz");
        assert!(matches!(result, Err(StereoError::Io(_))));
    }
}
