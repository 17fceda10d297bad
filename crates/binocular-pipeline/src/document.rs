//! Persisted calibration bundles.
//!
//! A bundle is a keyed document of matrices and scalars. The key names are shared
//! with the files written by earlier runs: `K1`, `K2`, `D1`, `D2`, `R`, `T`, `E`, `F`,
//! `R1`, `R2`, `P1`, `P2`, `Q`, `board_width`, `board_height` and `square_size`.
//! The document is written as JSON.

use std::collections::BTreeMap;
use std::path::Path;

use binocular_calib::{ExtrinsicModel, IntrinsicModel, RectificationModel};
use binocular_imgproc::calibration::{distortion::PolynomialDistortion, CameraIntrinsic};
use serde::{Deserialize, Serialize};

use crate::board::BoardSpec;
use crate::error::PipelineError;

/// A value of a calibration document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// A row-major matrix.
    Matrix {
        /// Number of rows.
        rows: usize,
        /// Number of columns.
        cols: usize,
        /// `rows * cols` values, row-major.
        data: Vec<f64>,
    },
    /// An integer scalar.
    Int(i64),
    /// A real scalar.
    Real(f64),
}

/// Keyed fields of a calibration file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationDocument {
    fields: BTreeMap<String, Field>,
}

impl CalibrationDocument {
    /// An empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if the document has a field named `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// The field named `key`.
    pub fn get(&self, key: &str) -> Option<&Field> {
        self.fields.get(key)
    }

    /// Names of all fields, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    fn field(&self, key: &str) -> Result<&Field, PipelineError> {
        self.fields
            .get(key)
            .ok_or_else(|| PipelineError::Input(format!("missing field {key}")))
    }

    /// Store a row-major matrix.
    pub fn set_matrix(&mut self, key: &str, rows: usize, cols: usize, data: Vec<f64>) {
        debug_assert_eq!(rows * cols, data.len());
        self.fields
            .insert(key.to_string(), Field::Matrix { rows, cols, data });
    }

    /// Store an integer.
    pub fn set_int(&mut self, key: &str, value: i64) {
        self.fields.insert(key.to_string(), Field::Int(value));
    }

    /// Store a real number.
    pub fn set_real(&mut self, key: &str, value: f64) {
        self.fields.insert(key.to_string(), Field::Real(value));
    }

    /// A matrix with its shape.
    pub fn matrix(&self, key: &str) -> Result<(usize, usize, &[f64]), PipelineError> {
        match self.field(key)? {
            Field::Matrix { rows, cols, data } if rows * cols == data.len() => {
                Ok((*rows, *cols, data))
            }
            Field::Matrix { rows, cols, data } => Err(PipelineError::Input(format!(
                "field {key} declares {rows}x{cols} but holds {} values",
                data.len()
            ))),
            _ => Err(PipelineError::Input(format!("field {key} is not a matrix"))),
        }
    }

    /// A matrix of a fixed shape.
    pub fn fixed_matrix<const R: usize, const C: usize>(
        &self,
        key: &str,
    ) -> Result<[[f64; C]; R], PipelineError> {
        let (rows, cols, data) = self.matrix(key)?;
        if rows != R || cols != C {
            return Err(PipelineError::Input(format!(
                "field {key} is {rows}x{cols}, expected {R}x{C}"
            )));
        }
        let mut out = [[0.0; C]; R];
        for (r, row) in out.iter_mut().enumerate() {
            row.copy_from_slice(&data[r * C..(r + 1) * C]);
        }
        Ok(out)
    }

    /// A 3-vector stored as a 3x1 or 1x3 matrix.
    pub fn vector3(&self, key: &str) -> Result<[f64; 3], PipelineError> {
        match self.matrix(key)? {
            (3, 1, data) | (1, 3, data) => Ok([data[0], data[1], data[2]]),
            (rows, cols, _) => Err(PipelineError::Input(format!(
                "field {key} is {rows}x{cols}, expected a 3-vector"
            ))),
        }
    }

    /// An integer; reals with an integral value are accepted.
    pub fn int(&self, key: &str) -> Result<i64, PipelineError> {
        match self.field(key)? {
            Field::Int(v) => Ok(*v),
            Field::Real(v) if v.fract() == 0.0 => Ok(*v as i64),
            _ => Err(PipelineError::Input(format!("field {key} is not an integer"))),
        }
    }

    /// A real number; integers are accepted.
    pub fn real(&self, key: &str) -> Result<f64, PipelineError> {
        match self.field(key)? {
            Field::Real(v) => Ok(*v),
            Field::Int(v) => Ok(*v as f64),
            _ => Err(PipelineError::Input(format!("field {key} is not a number"))),
        }
    }

    fn set_mat33(&mut self, key: &str, m: &[[f64; 3]; 3]) {
        self.set_matrix(key, 3, 3, m.iter().flatten().copied().collect());
    }

    fn set_mat34(&mut self, key: &str, m: &[[f64; 4]; 3]) {
        self.set_matrix(key, 3, 4, m.iter().flatten().copied().collect());
    }

    fn set_intrinsic(&mut self, k_key: &str, d_key: &str, model: &IntrinsicModel) {
        self.set_mat33(k_key, &model.k_matrix());
        let coeffs = model.distortion.coefficients();
        self.set_matrix(d_key, 1, coeffs.len(), coeffs);
    }

    fn intrinsic(&self, k_key: &str, d_key: &str) -> Result<IntrinsicModel, PipelineError> {
        let k = self.fixed_matrix::<3, 3>(k_key)?;
        if k[0][0] <= 0.0 || k[1][1] <= 0.0 {
            return Err(PipelineError::Input(format!(
                "field {k_key} has a non-positive focal length"
            )));
        }
        let (_, _, coeffs) = self.matrix(d_key)?;
        let distortion = PolynomialDistortion::from_coefficients(coeffs)
            .map_err(|e| PipelineError::Input(format!("field {d_key}: {e}")))?;
        Ok(IntrinsicModel {
            camera: CameraIntrinsic::from_k_matrix(&k),
            distortion,
        })
    }

    /// Encode as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, PipelineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decode from JSON.
    pub fn from_json(text: &str) -> Result<Self, PipelineError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Write the document to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PipelineError> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        log::info!("wrote calibration document {}", path.as_ref().display());
        Ok(())
    }

    /// Read a document from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            PipelineError::Input(format!(
                "cannot read calibration document {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_json(&text)
    }
}

/// Intrinsics of both cameras and the board they were calibrated with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IntrinsicsBundle {
    /// The left camera.
    pub left: IntrinsicModel,
    /// The right camera.
    pub right: IntrinsicModel,
    /// The calibration board.
    pub board: BoardSpec,
}

impl IntrinsicsBundle {
    /// Fields `K1`, `D1`, `K2`, `D2`, `board_width`, `board_height`, `square_size`.
    pub fn to_document(&self) -> CalibrationDocument {
        let mut doc = CalibrationDocument::new();
        doc.set_intrinsic("K1", "D1", &self.left);
        doc.set_intrinsic("K2", "D2", &self.right);
        doc.set_int("board_width", self.board.width as i64);
        doc.set_int("board_height", self.board.height as i64);
        doc.set_real("square_size", self.board.square_size);
        doc
    }

    /// Read the bundle back.
    pub fn from_document(doc: &CalibrationDocument) -> Result<Self, PipelineError> {
        let dim = |key: &str| -> Result<usize, PipelineError> {
            usize::try_from(doc.int(key)?)
                .map_err(|_| PipelineError::Input(format!("field {key} is negative")))
        };
        Ok(Self {
            left: doc.intrinsic("K1", "D1")?,
            right: doc.intrinsic("K2", "D2")?,
            board: BoardSpec::new(dim("board_width")?, dim("board_height")?, doc.real("square_size")?)?,
        })
    }

    /// Write the bundle to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PipelineError> {
        self.to_document().save(path)
    }

    /// Read a bundle from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        Self::from_document(&CalibrationDocument::load(path)?)
    }
}

/// Everything the rectify and match stages need.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExtrinsicsBundle {
    /// The left camera.
    pub left: IntrinsicModel,
    /// The right camera.
    pub right: IntrinsicModel,
    /// Pose of the right camera relative to the left one.
    pub extrinsic: ExtrinsicModel,
    /// Rectifying rotations and projections.
    pub rectification: RectificationModel,
}

impl ExtrinsicsBundle {
    /// Fields `K1`, `K2`, `D1`, `D2`, `R`, `T`, `E`, `F`, `R1`, `R2`, `P1`, `P2`, `Q`.
    pub fn to_document(&self) -> CalibrationDocument {
        let mut doc = CalibrationDocument::new();
        doc.set_intrinsic("K1", "D1", &self.left);
        doc.set_intrinsic("K2", "D2", &self.right);
        doc.set_mat33("R", &self.extrinsic.rotation);
        doc.set_matrix("T", 3, 1, self.extrinsic.translation.to_vec());
        doc.set_mat33("E", &self.extrinsic.essential);
        doc.set_mat33("F", &self.extrinsic.fundamental);

        let rect = &self.rectification;
        doc.set_mat33("R1", &rect.r1);
        doc.set_mat33("R2", &rect.r2);
        doc.set_mat34("P1", &rect.p1);
        doc.set_mat34("P2", &rect.p2);
        doc.set_matrix("Q", 4, 4, rect.q.iter().flatten().copied().collect());
        doc
    }

    /// Read the bundle back.
    pub fn from_document(doc: &CalibrationDocument) -> Result<Self, PipelineError> {
        Ok(Self {
            left: doc.intrinsic("K1", "D1")?,
            right: doc.intrinsic("K2", "D2")?,
            extrinsic: ExtrinsicModel {
                rotation: doc.fixed_matrix("R")?,
                translation: doc.vector3("T")?,
                essential: doc.fixed_matrix("E")?,
                fundamental: doc.fixed_matrix("F")?,
            },
            rectification: RectificationModel {
                r1: doc.fixed_matrix("R1")?,
                r2: doc.fixed_matrix("R2")?,
                p1: doc.fixed_matrix("P1")?,
                p2: doc.fixed_matrix("P2")?,
                q: doc.fixed_matrix("Q")?,
            },
        })
    }

    /// Write the bundle to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PipelineError> {
        self.to_document().save(path)
    }

    /// Read a bundle from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        Self::from_document(&CalibrationDocument::load(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binocular_calib::{linalg, stereo_rectify, RectifyFlags};

    fn model(fx: f64, k1: f64) -> IntrinsicModel {
        IntrinsicModel {
            camera: CameraIntrinsic {
                fx,
                fy: fx * 0.99,
                cx: 160.3,
                cy: 119.8,
            },
            distortion: PolynomialDistortion {
                k1,
                k2: 0.01,
                p1: 1e-4,
                p2: -2e-4,
                k3: 0.001,
                ..Default::default()
            },
        }
    }

    fn extrinsics_bundle() -> Result<ExtrinsicsBundle, Box<dyn std::error::Error>> {
        let (left, right) = (model(300.0, -0.1), model(302.5, -0.08));
        let rotation = linalg::rodrigues(&[0.01, -0.02, 0.005]);
        let translation = [-0.06, 0.001, 0.0005];
        let extrinsic = ExtrinsicModel::from_pose(rotation, translation, &left, &right)?;
        let rectification = stereo_rectify(
            &left,
            &right,
            [320, 240].into(),
            &rotation,
            &translation,
            &RectifyFlags::default(),
        )?;
        Ok(ExtrinsicsBundle {
            left,
            right,
            extrinsic,
            rectification,
        })
    }

    #[test]
    fn test_intrinsics_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
        let tmp_dir = tempfile::tempdir()?;
        let path = tmp_dir.path().join("intrinsics.json");

        let bundle = IntrinsicsBundle {
            left: model(300.0, -0.1),
            right: model(310.0, 0.05),
            board: BoardSpec::new(9, 6, 0.025)?,
        };
        bundle.save(&path)?;

        let doc = CalibrationDocument::load(&path)?;
        let keys = doc.keys().collect::<Vec<_>>();
        assert_eq!(
            keys,
            ["D1", "D2", "K1", "K2", "board_height", "board_width", "square_size"]
        );
        assert_eq!(doc.get("board_width"), Some(&Field::Int(9)));
        assert_eq!(doc.matrix("D1")?.1, 5);

        assert_eq!(IntrinsicsBundle::load(&path)?, bundle);
        Ok(())
    }

    #[test]
    fn test_extrinsics_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
        let tmp_dir = tempfile::tempdir()?;
        let path = tmp_dir.path().join("extrinsics.json");

        let bundle = extrinsics_bundle()?;
        bundle.save(&path)?;
        let loaded = ExtrinsicsBundle::load(&path)?;
        assert_eq!(loaded, bundle);

        let doc = CalibrationDocument::load(&path)?;
        for key in ["K1", "K2", "D1", "D2", "R", "T", "E", "F", "R1", "R2", "P1", "P2", "Q"] {
            assert!(doc.contains(key), "missing {key}");
        }
        assert_eq!(doc.matrix("T")?.0, 3);
        assert_eq!(doc.matrix("P2")?.1, 4);
        Ok(())
    }

    #[test]
    fn test_missing_and_malformed_fields() -> Result<(), Box<dyn std::error::Error>> {
        let mut doc = extrinsics_bundle()?.to_document();
        doc.fields.remove("Q");
        assert!(matches!(
            ExtrinsicsBundle::from_document(&doc),
            Err(PipelineError::Input(ref m)) if m.contains("Q")
        ));

        let mut doc = extrinsics_bundle()?.to_document();
        doc.set_matrix("R1", 2, 3, vec![0.0; 6]);
        assert!(matches!(
            ExtrinsicsBundle::from_document(&doc),
            Err(PipelineError::Input(_))
        ));

        let mut doc = extrinsics_bundle()?.to_document();
        doc.set_matrix("D2", 1, 3, vec![0.0; 3]);
        assert!(matches!(
            ExtrinsicsBundle::from_document(&doc),
            Err(PipelineError::Input(_))
        ));

        assert!(matches!(
            CalibrationDocument::from_json("{\"K1\": {\"int\": \"x\"}}"),
            Err(PipelineError::Json(_))
        ));
        assert!(matches!(
            CalibrationDocument::load("/nonexistent-dir/extrinsics.json"),
            Err(PipelineError::Input(_))
        ));
        Ok(())
    }

    #[test]
    fn test_scalar_coercion() -> Result<(), PipelineError> {
        let doc = CalibrationDocument::from_json(
            r#"{ "board_width": { "real": 8.0 }, "square_size": { "int": 2 } }"#,
        )?;
        assert_eq!(doc.int("board_width")?, 8);
        assert_eq!(doc.real("square_size")?, 2.0);
        assert!(doc.matrix("board_width").is_err());
        Ok(())
    }
}
