//! Saving and restoring model parameters
//!
//! A checkpoint is a flat list of named tensors serialized with bincode.
//! Loading validates shapes against the receiving model, so restoring a
//! checkpoint into an architecturally incompatible model fails loudly
//! instead of silently scrambling weights.

use std::{fs, io, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for checkpoint save/load
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint io error: {0}")]
    Io(#[from] io::Error),
    #[error("checkpoint encoding error: {0}")]
    Encoding(#[from] bincode::Error),
    #[error(
        "shape mismatch for parameter '{name}': checkpoint has {got:?}, model expects {expected:?}"
    )]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("parameter '{name}' missing from checkpoint")]
    MissingParam { name: String },
}

/// A named parameter tensor with row-major data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl ParamTensor {
    pub fn new(name: impl Into<String>, shape: Vec<usize>, data: Vec<f32>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        Self {
            name: name.into(),
            shape,
            data,
        }
    }
}

/// Writes a state dict to disk
pub fn save(path: &Path, tensors: &[ParamTensor]) -> Result<(), CheckpointError> {
    let bytes = bincode::serialize(tensors)?;
    fs::write(path, bytes)?;
    log::info!(
        "saved checkpoint ({} tensors) to '{}'",
        tensors.len(),
        path.display()
    );
    Ok(())
}

/// Reads a state dict back from disk
pub fn load(path: &Path) -> Result<Vec<ParamTensor>, CheckpointError> {
    let bytes = fs::read(path)?;
    let tensors: Vec<ParamTensor> = bincode::deserialize(&bytes)?;
    log::info!(
        "loaded checkpoint ({} tensors) from '{}'",
        tensors.len(),
        path.display()
    );
    Ok(tensors)
}

/// Finds a named tensor and validates its shape against the model's
pub fn lookup<'a>(
    tensors: &'a [ParamTensor],
    name: &str,
    expected: &[usize],
) -> Result<&'a ParamTensor, CheckpointError> {
    let tensor = tensors
        .iter()
        .find(|t| t.name == name)
        .ok_or_else(|| CheckpointError::MissingParam { name: name.into() })?;
    if tensor.shape != expected {
        return Err(CheckpointError::ShapeMismatch {
            name: name.into(),
            expected: expected.to_vec(),
            got: tensor.shape.clone(),
        });
    }
    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tensors() -> Vec<ParamTensor> {
        vec![
            ParamTensor::new("l1.weight", vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            ParamTensor::new("l1.bias", vec![2], vec![0.5, -0.5]),
        ]
    }

    #[test]
    fn test_save_load_roundtrip() {
        let path = std::env::temp_dir().join("gradlab_checkpoint_roundtrip.bin");
        let tensors = sample_tensors();
        save(&path, &tensors).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded, tensors);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_lookup_shape_mismatch() {
        let tensors = sample_tensors();
        let err = lookup(&tensors, "l1.weight", &[4, 3]).unwrap_err();
        assert!(matches!(
            err,
            CheckpointError::ShapeMismatch { name, expected, got }
                if name == "l1.weight" && expected == vec![4, 3] && got == vec![2, 3]
        ));
    }

    #[test]
    fn test_lookup_missing_param() {
        let tensors = sample_tensors();
        let err = lookup(&tensors, "l2.weight", &[2, 3]).unwrap_err();
        assert!(matches!(
            err,
            CheckpointError::MissingParam { name } if name == "l2.weight"
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load(Path::new("/nonexistent/gradlab.ckpt")).unwrap_err();
        assert!(matches!(err, CheckpointError::Io(_)));
    }
}
